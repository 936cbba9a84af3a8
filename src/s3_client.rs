// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! AWS SDK backed [`RemoteStore`] and the client factory it runs on.
//!

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use aws_smithy_http_client::tls::rustls_provider::CryptoMode;
use aws_smithy_http_client::{tls, Builder as HttpClientBuilder};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
use tracing::debug;

use crate::config::{Credentials, S3StorageConfig};
use crate::constants::STATIC_CREDENTIALS_PROVIDER;
use crate::error::{RemoteError, Result, StorageError};
use crate::multipart::Chunk;
use crate::remote::{ByteRange, ObjectBody, ObjectHead, RemoteStore};

// -----------------------------------------------------------------------------
// TLS helper, for CA bundle
// -----------------------------------------------------------------------------

/// Create a TLS context using a CA bundle file
fn tls_context_from_pem(filename: impl AsRef<Path>) -> Result<tls::TlsContext> {
    let filename = filename.as_ref();
    let pem_contents = fs::read(filename).map_err(|e| {
        StorageError::InvalidConfiguration(format!(
            "failed to read CA bundle file {}: {e}",
            filename.display()
        ))
    })?;

    let trust_store = tls::TrustStore::empty().with_pem_certificate(pem_contents.as_slice());

    tls::TlsContext::builder()
        .with_trust_store(trust_store)
        .build()
        .map_err(|e| {
            StorageError::InvalidConfiguration(format!(
                "failed to build TLS context from PEM {}: {e}",
                filename.display()
            ))
        })
}

// -----------------------------------------------------------------------------
// Client factory
// -----------------------------------------------------------------------------

/// Build an SDK client for `config`.
///
/// Only the connect timeout is configured on the client; operation timeouts are
/// passed per call. A custom endpoint switches to path-style addressing, which is
/// what S3-compatible services (MinIO, Ceph, ...) expect.
pub async fn build_client(config: &S3StorageConfig) -> Result<Client> {
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(config.connect_timeout())
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region().to_owned()))
        .timeout_config(timeout_config);

    if let Credentials::Static {
        access_key_id,
        secret_access_key,
        session_token,
    } = config.credentials()
    {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key_id.clone(),
            secret_access_key.clone(),
            session_token.clone(),
            None,
            STATIC_CREDENTIALS_PROVIDER,
        ));
    }

    if let Some(endpoint) = config.endpoint() {
        loader = loader.endpoint_url(endpoint);
    }

    if let Some(ca_bundle_path) = config.ca_bundle() {
        debug!("Loading CA bundle from: {}", ca_bundle_path.display());
        let tls_context = tls_context_from_pem(ca_bundle_path)?;
        loader = loader.http_client(
            HttpClientBuilder::new()
                .tls_provider(tls::Provider::Rustls(CryptoMode::AwsLc))
                .tls_context(tls_context)
                .build_https(),
        );
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.endpoint().is_some())
        .build();

    debug!(
        "S3 client ready: region={}, endpoint={:?}, bucket={}",
        config.region(),
        config.endpoint(),
        config.bucket()
    );
    Ok(Client::from_conf(s3_config))
}

// -----------------------------------------------------------------------------
// RemoteStore over the SDK
// -----------------------------------------------------------------------------

/// Issues every request against one bucket.
#[derive(Clone, Debug)]
pub struct AwsS3Client {
    client: Client,
    bucket: String,
    public_read: bool,
}

impl AwsS3Client {
    pub fn new(client: Client, config: &S3StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket().to_string(),
            public_read: config.public_read(),
        }
    }

    fn acl(&self) -> Option<ObjectCannedAcl> {
        self.public_read.then_some(ObjectCannedAcl::PublicRead)
    }
}

fn sdk_error<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(status) => {
            RemoteError::new(operation, Some(status), err.code(), err.message()).with_source(err)
        }
        None => RemoteError::transport(operation, err),
    }
}

/// Request body with an exact `Content-Length`; streams are forwarded without buffering.
fn byte_stream(body: ObjectBody) -> (ByteStream, i64) {
    match body {
        ObjectBody::Bytes(bytes) => {
            let len = bytes.len() as i64;
            (ByteStream::from(bytes), len)
        }
        ObjectBody::Stream { chunks, size } => {
            let frames = StreamBody::new(chunks.map_ok(Frame::data));
            (ByteStream::from_body_1_x(frames), size as i64)
        }
    }
}

/// `CopySource` value: `bucket/key`, URL-encoded except for the path separators.
fn copy_source(bucket: &str, key: &str) -> String {
    let key = urlencoding::encode(key).replace("%2F", "/");
    format!("{bucket}/{key}")
}

#[async_trait]
impl RemoteStore for AwsS3Client {
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        let (body, len) = byte_stream(body);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(len)
            .set_acl(self.acl())
            .set_checksum_crc32(checksum_crc32.map(str::to_owned))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", e))?;
        Ok(())
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, RemoteError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(|r| r.to_header()))
            .send()
            .await
            .map_err(|e| sdk_error("GetObject", e))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| RemoteError::transport("GetObject", e))?;
        Ok(data.into_bytes())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, RemoteError> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("HeadObject", e))?;

        Ok(ObjectHead {
            content_length: resp.content_length().unwrap_or_default().max(0) as u64,
            e_tag: resp.e_tag().map(str::to_owned),
        })
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>, RemoteError> {
        let mut keys = Vec::new();
        let mut cont: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.map(str::to_owned))
                .set_continuation_token(cont.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListObjectsV2", e))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .map(str::to_owned),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    cont = Some(token.to_owned())
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source))
            .key(destination)
            .set_acl(self.acl())
            .send()
            .await
            .map_err(|e| sdk_error("CopyObject", e))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), RemoteError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObject", e))?;
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_acl(self.acl())
            .send()
            .await
            .map_err(|e| sdk_error("CreateMultipartUpload", e))?;
        Ok(resp.upload_id().map(str::to_owned))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ObjectBody,
    ) -> Result<Option<String>, RemoteError> {
        let (body, len) = byte_stream(body);
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(body)
            .content_length(len)
            .send()
            .await
            .map_err(|e| sdk_error("UploadPart", e))?;
        Ok(resp.e_tag().map(str::to_owned))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[Chunk],
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|chunk| {
                CompletedPart::builder()
                    .e_tag(&chunk.tag)
                    .part_number(chunk.part_number as i32)
                    .build()
            })
            .collect();

        let cmu = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(cmu)
            .set_checksum_crc32(checksum_crc32.map(str::to_owned))
            .send()
            .await
            .map_err(|e| sdk_error("CompleteMultipartUpload", e))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), RemoteError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_error("AbortMultipartUpload", e))?;
        Ok(())
    }
}
