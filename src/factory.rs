// src/factory.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Driver factory: owns the SDK client and hands out storages bound to it.

use std::sync::Arc;

use aws_sdk_s3::Client;
use tracing::info;

use crate::config::S3StorageConfig;
use crate::error::{Result, StorageError};
use crate::s3_client::{build_client, AwsS3Client};
use crate::storage::S3ObjectStorage;

/// Builds the SDK client once and creates [`S3ObjectStorage`] instances over it.
///
/// After [`shutdown`](Self::shutdown) the factory refuses to create storages.
/// Storages created earlier hold their own client handle and keep working until
/// they are dropped.
#[derive(Debug)]
pub struct S3DriverFactory {
    config: S3StorageConfig,
    client: Option<Client>,
}

impl S3DriverFactory {
    pub async fn new(config: S3StorageConfig) -> Result<Self> {
        let client = build_client(&config).await?;
        info!(
            "S3 driver ready for bucket {} in {}",
            config.bucket(),
            config.region()
        );
        Ok(Self {
            config,
            client: Some(client),
        })
    }

    /// Configuration loaded with [`S3StorageConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::new(S3StorageConfig::from_env()?).await
    }

    pub fn config(&self) -> &S3StorageConfig {
        &self.config
    }

    pub fn make_storage(&self) -> Result<S3ObjectStorage> {
        let client = self.client.clone().ok_or(StorageError::Shutdown)?;
        let remote = AwsS3Client::new(client, &self.config);
        Ok(S3ObjectStorage::new(self.config.clone(), Arc::new(remote)))
    }

    /// Release the factory's client handle. Idempotent.
    pub fn shutdown(&mut self) {
        if self.client.take().is_some() {
            info!("S3 driver for bucket {} shut down", self.config.bucket());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.client.is_none()
    }
}
