// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Object storage over S3-compatible services.
//!
//! [`S3ObjectStorage`] gives a flat bucket a filesystem-like face: keys are
//! `/`-delimited paths, listing returns the immediate children of a prefix, and
//! uploads and downloads come in single-shot, streamed, ranged and multipart forms
//! with optional CRC32 checksums.
//!
//! ```no_run
//! # async fn demo() -> s3_object_storage::Result<()> {
//! use s3_object_storage::{S3DriverFactory, S3StorageConfig};
//!
//! let config = S3StorageConfig::new("eu-west-1", "media")?;
//! let factory = S3DriverFactory::new(config).await?;
//! let storage = factory.make_storage()?;
//!
//! storage.upload("docs/readme.txt", b"hello world".to_vec(), None, None).await?;
//! assert_eq!(storage.list(Some("docs")).await?, vec!["readme.txt"]);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod factory;
pub mod keys;
pub mod memory;
pub mod multipart;
pub mod remote;
pub mod s3_client;
pub mod storage;

pub use checksum::{ChecksumCalculator, Crc32};
pub use config::{BucketName, Credentials, S3StorageConfig};
pub use error::{RemoteError, Result, StorageError};
pub use factory::S3DriverFactory;
pub use memory::InMemoryStore;
pub use multipart::{
    Chunk, MultipartUploadConfig, MultipartUploadSession, SessionState, UploadId, UploadSummary,
};
pub use remote::{ByteRange, ObjectBody, ObjectHead, RemoteStore};
pub use s3_client::AwsS3Client;
pub use storage::S3ObjectStorage;
