// tests/common/mod.rs
//
// Shared fixtures: storages over the in-memory store and remote stores that
// misbehave in controlled ways.
#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use rand::Rng;

use s3_object_storage::{
    ByteRange, Chunk, InMemoryStore, ObjectBody, ObjectHead, RemoteError, RemoteStore,
    S3ObjectStorage, S3StorageConfig,
};

pub const TEST_BUCKET: &str = "test-bucket";
pub const LOREM: &[u8] = b"lorem ipsum dolor sit amet";
pub const MIB: usize = 1024 * 1024;

pub fn test_config() -> S3StorageConfig {
    S3StorageConfig::new("us-east-1", TEST_BUCKET).expect("valid test bucket")
}

/// Storage over a fresh in-memory store; the store handle is returned for inspection.
pub fn memory_storage() -> (S3ObjectStorage, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let storage = S3ObjectStorage::new(test_config(), store.clone());
    (storage, store)
}

pub fn faulty_storage(fault: Fault) -> (S3ObjectStorage, Arc<FaultyStore>) {
    let store = Arc::new(FaultyStore::new(fault));
    let storage = S3ObjectStorage::new(test_config(), store.clone());
    (storage, store)
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill(&mut buf[..]);
    buf
}

/// Single-pass stream over `data`, `chunk` bytes at a time.
pub fn chunked(
    data: &[u8],
    chunk: usize,
) -> impl Stream<Item = io::Result<Bytes>> + Send + Sync + use<> {
    let parts: Vec<io::Result<Bytes>> = data
        .chunks(chunk)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(parts)
}

/// How a [`FaultyStore`] deviates from the in-memory behavior.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Every request fails with this HTTP status and error code.
    Status(u16, &'static str),
    /// HEAD requests fail with this status; everything else works.
    HeadStatus(u16),
    /// CreateMultipartUpload answers without an upload id.
    MissingUploadId,
    /// UploadPart answers without an ETag.
    MissingETag,
    /// Every request is delayed before it is served.
    Delay(Duration),
    /// The `nth` (1-based) request of `operation` fails with `status`; the rest work.
    FailNth {
        operation: &'static str,
        nth: usize,
        status: u16,
    },
}

/// In-memory store with an injected fault.
#[derive(Debug)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    fault: Fault,
    calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fault,
            calls: AtomicUsize::new(0),
        }
    }

    async fn before(&self, operation: &'static str) -> Result<(), RemoteError> {
        match &self.fault {
            Fault::Status(status, code) => Err(RemoteError::new(
                operation,
                Some(*status),
                Some(*code),
                Some("injected failure"),
            )),
            Fault::HeadStatus(status) if operation == "HeadObject" => {
                Err(RemoteError::new(operation, Some(*status), None, None))
            }
            Fault::FailNth {
                operation: target,
                nth,
                status,
            } if *target == operation => {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call == *nth {
                    Err(RemoteError::new(
                        operation,
                        Some(*status),
                        Some("ServiceUnavailable"),
                        Some("injected failure"),
                    ))
                } else {
                    Ok(())
                }
            }
            Fault::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.before("PutObject").await?;
        self.inner.put_object(key, body, checksum_crc32).await
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, RemoteError> {
        self.before("GetObject").await?;
        self.inner.get_object(key, range).await
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, RemoteError> {
        self.before("HeadObject").await?;
        self.inner.head_object(key).await
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>, RemoteError> {
        self.before("ListObjectsV2").await?;
        self.inner.list_objects(prefix).await
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        self.before("CopyObject").await?;
        self.inner.copy_object(source, destination).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), RemoteError> {
        self.before("DeleteObject").await?;
        self.inner.delete_object(key).await
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<Option<String>, RemoteError> {
        self.before("CreateMultipartUpload").await?;
        let upload_id = self.inner.create_multipart_upload(key).await?;
        match self.fault {
            Fault::MissingUploadId => Ok(None),
            _ => Ok(upload_id),
        }
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ObjectBody,
    ) -> Result<Option<String>, RemoteError> {
        self.before("UploadPart").await?;
        let tag = self.inner.upload_part(key, upload_id, part_number, body).await?;
        match self.fault {
            Fault::MissingETag => Ok(None),
            _ => Ok(tag),
        }
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[Chunk],
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.before("CompleteMultipartUpload").await?;
        self.inner
            .complete_multipart_upload(key, upload_id, parts, checksum_crc32)
            .await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), RemoteError> {
        self.before("AbortMultipartUpload").await?;
        self.inner.abort_multipart_upload(key, upload_id).await
    }
}
