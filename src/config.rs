// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Driver configuration.
//!
//! Everything is validated when the value is built, so an `S3StorageConfig` that
//! exists is usable. Nothing here touches the network.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REGION};
use crate::error::{Result, StorageError};

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;

/// A bucket name that satisfies the S3 naming rules:
/// 3-63 characters, lowercase letters, digits, `.` and `-`, starting and ending
/// with a letter or digit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BucketName(String);

impl BucketName {
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        };

        if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
            return Err(invalid("must be between 3 and 63 characters long"));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
        {
            return Err(invalid(
                "must only contain lowercase letters, numbers, dots and hyphens",
            ));
        }
        let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        let bytes = name.as_bytes();
        if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
            return Err(invalid("must start and end with a letter or number"));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BucketName {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the SDK client gets its credentials from.
#[derive(Clone, Default)]
pub enum Credentials {
    /// The SDK default provider chain (environment, profile, IMDS, ...).
    #[default]
    Default,
    /// Fixed keys, e.g. for MinIO or other S3-compatible services.
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Default => f.write_str("Default"),
            Credentials::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"** redacted **")
                .finish_non_exhaustive(),
        }
    }
}

/// Immutable configuration of one S3 object storage.
#[derive(Clone, Debug)]
pub struct S3StorageConfig {
    credentials: Credentials,
    region: String,
    bucket: BucketName,
    endpoint: Option<String>,
    public_endpoint: Option<String>,
    public_read: bool,
    connect_timeout: Duration,
    ca_bundle: Option<PathBuf>,
}

impl S3StorageConfig {
    /// Validate `bucket` and build a config with defaults for everything else.
    pub fn new(region: impl Into<String>, bucket: &str) -> Result<Self> {
        let bucket = BucketName::parse(bucket)?;
        let region = region.into();
        if region.trim().is_empty() {
            return Err(StorageError::InvalidConfiguration(
                "region must not be empty".into(),
            ));
        }
        Ok(Self {
            credentials: Credentials::Default,
            region,
            bucket,
            endpoint: None,
            public_endpoint: None,
            public_read: true,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            ca_bundle: None,
        })
    }

    /// Build from the process environment, loading `.env` first.
    ///
    /// `S3_BUCKET` is required. `AWS_REGION`, `AWS_ENDPOINT_URL`, `S3_PUBLIC_ENDPOINT`,
    /// `AWS_CA_BUNDLE_PATH` and `S3_PUBLIC_READ` are optional.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same variables as [`from_env`](Self::from_env), read through `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bucket = var("S3_BUCKET").ok_or_else(|| {
            StorageError::InvalidConfiguration("S3_BUCKET is not set".into())
        })?;
        let region = var("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut config = Self::new(region, &bucket)?;
        config.endpoint = var("AWS_ENDPOINT_URL").map(trim_slash);
        config.public_endpoint = var("S3_PUBLIC_ENDPOINT").map(trim_slash);
        config.ca_bundle = var("AWS_CA_BUNDLE_PATH").map(PathBuf::from);
        if let Some(flag) = var("S3_PUBLIC_READ") {
            config.public_read = parse_flag(&flag).ok_or_else(|| {
                StorageError::InvalidConfiguration(format!(
                    "S3_PUBLIC_READ must be a boolean, got {flag:?}"
                ))
            })?;
        }
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// API endpoint for S3-compatible services; requests then use path-style addressing.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(trim_slash(endpoint.into()));
        self
    }

    /// Base URL used by `resolve` instead of the AWS virtual-hosted form.
    pub fn with_public_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.public_endpoint = Some(trim_slash(endpoint.into()));
        self
    }

    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn public_read(&self) -> bool {
        self.public_read
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn ca_bundle(&self) -> Option<&PathBuf> {
        self.ca_bundle.as_ref()
    }

    /// Base URL objects are publicly reachable under, without trailing slash.
    ///
    /// See <http://www.wryway.com/blog/aws-s3-url-styles/> for the AWS forms.
    pub fn public_base_url(&self) -> String {
        if let Some(endpoint) = &self.public_endpoint {
            return format!("{}/{}", endpoint, self.bucket);
        }
        if self.region == DEFAULT_REGION {
            format!("https://{}.s3.amazonaws.com", self.bucket)
        } else {
            format!("https://{}.s3-{}.amazonaws.com", self.bucket, self.region)
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn valid_bucket_names() {
        for name in ["bucket", "bucket1", "1bucket1", "1bu.cke.t1", "b-cket"] {
            assert!(BucketName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_bucket_names() {
        for name in [
            ".bucket", "bucket-", "bUcket", "b(cket", "b_cket", "buck=t", "bucke+t", "bu",
        ] {
            assert!(
                matches!(
                    BucketName::parse(name),
                    Err(StorageError::InvalidBucketName { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert!(BucketName::parse(&"a".repeat(64)).is_err());
        assert!(BucketName::parse(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn config_rejects_bad_bucket_before_anything_else() {
        assert!(matches!(
            S3StorageConfig::new("", "Not_A_Bucket"),
            Err(StorageError::InvalidBucketName { .. })
        ));
        assert!(matches!(
            S3StorageConfig::new("", "bucket"),
            Err(StorageError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn public_base_url_forms() {
        let us = S3StorageConfig::new("us-east-1", "media").unwrap();
        assert_eq!(us.public_base_url(), "https://media.s3.amazonaws.com");

        let eu = S3StorageConfig::new("eu-central-1", "media").unwrap();
        assert_eq!(eu.public_base_url(), "https://media.s3-eu-central-1.amazonaws.com");

        let custom = eu.with_public_endpoint("http://localhost:9000/");
        assert_eq!(custom.public_base_url(), "http://localhost:9000/media");
    }

    #[test]
    fn static_credentials_are_redacted() {
        let creds = Credentials::Static {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "super-secret".into(),
            session_token: None,
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("AKIDEXAMPLE"));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn lookup_reads_every_variable() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("S3_BUCKET", "media"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ENDPOINT_URL", "http://localhost:9000/"),
            ("S3_PUBLIC_ENDPOINT", "https://cdn.example.com"),
            ("S3_PUBLIC_READ", "false"),
            ("AWS_CA_BUNDLE_PATH", ""),
        ]);
        let config = S3StorageConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.bucket().as_str(), "media");
        assert_eq!(config.region(), "eu-west-1");
        assert_eq!(config.endpoint(), Some("http://localhost:9000"));
        assert_eq!(config.public_base_url(), "https://cdn.example.com/media");
        assert!(!config.public_read());
        assert!(config.ca_bundle().is_none());
    }

    #[test]
    fn lookup_defaults_and_requirements() {
        let config = S3StorageConfig::from_lookup(|name| (name == "S3_BUCKET").then(|| "media".to_string())).unwrap();
        assert_eq!(config.region(), DEFAULT_REGION);
        assert!(config.public_read());
        assert_eq!(config.connect_timeout(), Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));

        assert!(matches!(
            S3StorageConfig::from_lookup(|_| None),
            Err(StorageError::InvalidConfiguration(_))
        ));
        assert!(S3StorageConfig::from_lookup(|name| match name {
            "S3_BUCKET" => Some("media".into()),
            "S3_PUBLIC_READ" => Some("sometimes".into()),
            _ => None,
        })
        .is_err());
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
