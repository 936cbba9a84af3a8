// src/remote.rs
//
// The remote object-store client as seen by the adapter.
//
// `S3ObjectStorage` only talks to a `RemoteStore`. The AWS SDK implementation lives
// in s3_client.rs, an in-process one in memory.rs. Responses keep the optional
// fields of the wire protocol (upload id, ETag) so the adapter decides what a
// missing field means.

use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::{RemoteError, Result, StorageError};
use crate::multipart::Chunk;

/// Single-pass stream of payload chunks.
pub type ByteChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync + 'static>>;

/// Request payload: either in memory or a stream with a declared length.
pub enum ObjectBody {
    Bytes(Bytes),
    Stream { chunks: ByteChunkStream, size: u64 },
}

impl ObjectBody {
    pub fn empty() -> Self {
        ObjectBody::Bytes(Bytes::new())
    }

    pub fn stream<S>(chunks: S, size: u64) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        ObjectBody::Stream {
            chunks: Box::pin(chunks),
            size,
        }
    }

    /// Length announced to the store as `Content-Length`.
    pub fn content_length(&self) -> u64 {
        match self {
            ObjectBody::Bytes(bytes) => bytes.len() as u64,
            ObjectBody::Stream { size, .. } => *size,
        }
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ObjectBody::Stream { size, .. } => f.debug_struct("Stream").field("size", size).finish(),
        }
    }
}

impl From<Bytes> for ObjectBody {
    fn from(bytes: Bytes) -> Self {
        ObjectBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ObjectBody {
    fn from(bytes: Vec<u8>) -> Self {
        ObjectBody::Bytes(Bytes::from(bytes))
    }
}

/// Inclusive byte span `[start, end]` of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(StorageError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the HTTP `Range` header.
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl TryFrom<RangeInclusive<u64>> for ByteRange {
    type Error = StorageError;

    fn try_from(range: RangeInclusive<u64>) -> Result<Self> {
        Self::new(*range.start(), *range.end())
    }
}

/// Metadata returned by a HEAD request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub e_tag: Option<String>,
}

/// Requests the adapter issues against the store, one method per wire operation.
#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError>;

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, RemoteError>;

    async fn head_object(&self, key: &str) -> Result<ObjectHead, RemoteError>;

    /// Every key starting with `prefix`, pagination already merged.
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>, RemoteError>;

    async fn copy_object(&self, source: &str, destination: &str) -> Result<(), RemoteError>;

    async fn delete_object(&self, key: &str) -> Result<(), RemoteError>;

    /// Returns the upload id, if the store sent one.
    async fn create_multipart_upload(&self, key: &str) -> Result<Option<String>, RemoteError>;

    /// Returns the part ETag, if the store sent one.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ObjectBody,
    ) -> Result<Option<String>, RemoteError>;

    /// `parts` arrive sorted by part number.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[Chunk],
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), RemoteError>;
}
