// src/storage.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! The object storage adapter.
//!
//! [`S3ObjectStorage`] exposes a filesystem-like API (create, list, copy, move,
//! exists) and the transfer operations (single-shot, streamed and multipart uploads,
//! ranged and chunked downloads) on top of a [`RemoteStore`]. It keeps no mutable
//! state: clones share the remote client and can be used from any number of tasks.

use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::checksum::Crc32;
use crate::config::S3StorageConfig;
use crate::constants::{DEFAULT_DOWNLOAD_CONCURRENCY, MAX_MULTIPART_PARTS};
use crate::error::{RemoteError, Result, StorageError};
use crate::keys;
use crate::multipart::{Chunk, MultipartUploadConfig, MultipartUploadSession, UploadId};
use crate::remote::{ByteRange, ObjectBody, RemoteStore};

/// Object storage backed by one bucket of an S3-compatible store.
#[derive(Clone, Debug)]
pub struct S3ObjectStorage {
    remote: Arc<dyn RemoteStore>,
    config: Arc<S3StorageConfig>,
}

impl S3ObjectStorage {
    /// Adapter over any remote client. `S3DriverFactory::make_storage` wires the AWS one.
    pub fn new(config: S3StorageConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &S3StorageConfig {
        &self.config
    }

    /// Fresh calculator producing the checksum format `upload` expects.
    pub fn create_checksum_calculator(&self) -> Crc32 {
        Crc32::new()
    }

    /// Object stores have no meaningful free-space figure.
    pub fn available_space(&self) -> u64 {
        u64::MAX
    }

    /// Public URL of `key`. Pure string composition, no request is made.
    pub fn resolve(&self, key: &str) -> String {
        format!("{}/{}", self.config.public_base_url(), key)
    }

    // ---------------------
    // Put operations
    // ---------------------

    /// Upload `data` in one request, optionally declaring its CRC32 checksum.
    pub async fn upload(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        checksum: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.put(key, ObjectBody::Bytes(data.into()), checksum, timeout)
            .await
    }

    /// Upload a single-pass stream of chunks whose total length is `size`.
    ///
    /// The payload is never buffered as a whole. A stream that yields more or fewer
    /// than `size` bytes makes the request fail on the store side.
    pub async fn upload_stream<S>(
        &self,
        key: &str,
        chunks: S,
        size: u64,
        checksum: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        self.put(key, ObjectBody::stream(chunks, size), checksum, timeout)
            .await
    }

    /// Zero-length object marking a directory path.
    pub async fn create(&self, key: &str) -> Result<()> {
        self.put(key, ObjectBody::empty(), None, None).await
    }

    async fn put(
        &self,
        key: &str,
        body: ObjectBody,
        checksum: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        debug!("PUT {} ({} bytes, checksum={:?})", key, body.content_length(), checksum);
        with_timeout("PutObject", timeout, async {
            self.remote
                .put_object(key, body, checksum)
                .await
                .map_err(|e| upload_error(key, e))
        })
        .await
    }

    // ---------------------
    // Namespace operations
    // ---------------------

    /// Immediate children of `prefix`, or the top-level names when `prefix` is `None`.
    ///
    /// A prefix naming a file (no deeper keys) yields an empty list.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let listed = self.remote.list_objects(prefix).await?;
        let names = keys::child_names(&listed, prefix);
        debug!(
            "LIST {:?}: {} keys, {} children",
            prefix,
            listed.len(),
            names.len()
        );
        Ok(names)
    }

    /// Server-side copy. Fails with `KeyNotExists` when `source` is absent.
    pub async fn copy(&self, source: &str, destination: &str) -> Result<()> {
        self.ensure_exists(source).await?;
        debug!("COPY {} -> {}", source, destination);
        self.remote.copy_object(source, destination).await?;
        Ok(())
    }

    /// Copy, then delete the source.
    ///
    /// Not atomic: if the delete fails the object exists under both keys.
    pub async fn move_object(&self, source: &str, destination: &str) -> Result<()> {
        self.copy(source, destination).await?;
        self.delete(source).await
    }

    /// Metadata request; only a not-found answer means `false`, other failures propagate.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.remote.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removing an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        debug!("DELETE {}", key);
        self.remote.delete_object(key).await?;
        Ok(())
    }

    // ----------------------------
    // Get operations
    // ----------------------------

    /// Whole object, or the inclusive `range` of it.
    pub async fn download(
        &self,
        key: &str,
        range: Option<ByteRange>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        self.ensure_exists(key).await?;
        debug!("GET {} range={:?}", key, range);
        with_timeout("GetObject", timeout, async {
            self.remote
                .get_object(key, range)
                .await
                .map_err(|e| missing_key(key, e))
        })
        .await
    }

    /// Object content as an ordered stream of chunks of at most `chunk_size` bytes.
    ///
    /// The object is sized with a HEAD request, then fetched with ranged GETs, a few
    /// in flight at a time; chunks are yielded in file order and only as fast as the
    /// consumer polls. A failed request ends the stream with that error. `timeout`
    /// applies to each request separately.
    pub fn download_stream(
        &self,
        key: &str,
        range: Option<ByteRange>,
        chunk_size: u64,
        timeout: Option<Duration>,
    ) -> BoxStream<'static, Result<Bytes>> {
        let storage = self.clone();
        let key = key.to_owned();

        Box::pin(try_stream! {
            if chunk_size == 0 {
                Err::<(), _>(StorageError::InvalidConfiguration(
                    "chunk_size must be positive".into(),
                ))?;
            }
            let head = with_timeout("HeadObject", timeout, async {
                storage.remote.head_object(&key).await.map_err(|e| missing_key(&key, e))
            })
            .await?;

            let spans = chunk_spans(head.content_length, range, chunk_size)?;
            debug!("GET {} as {} chunk(s) of <= {} bytes", key, spans.len(), chunk_size);

            let mut parts = pin!(stream::iter(spans)
                .map(|span| storage.fetch_span(&key, span, timeout))
                .buffered(DEFAULT_DOWNLOAD_CONCURRENCY));
            while let Some(part) = parts.next().await {
                yield part?;
            }
        })
    }

    async fn fetch_span(
        &self,
        key: &str,
        span: ByteRange,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        with_timeout("GetObject", timeout, async {
            self.remote
                .get_object(key, Some(span))
                .await
                .map_err(|e| missing_key(key, e))
        })
        .await
    }

    async fn ensure_exists(&self, key: &str) -> Result<()> {
        if self.exists(key).await? {
            Ok(())
        } else {
            Err(StorageError::KeyNotExists {
                key: key.to_owned(),
            })
        }
    }

    // ----------------------------
    // Multipart upload
    // ----------------------------

    /// CreateMultipartUpload. A response without an upload id is `InvalidResponse`.
    pub async fn create_multipart_upload(&self, key: &str) -> Result<UploadId> {
        let upload_id = self
            .remote
            .create_multipart_upload(key)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or(StorageError::InvalidResponse {
                operation: "CreateMultipartUpload",
                field: "upload id",
            })?;
        debug!("created multipart upload {} for {}", upload_id, key);
        Ok(UploadId::new(upload_id))
    }

    /// UploadPart. Parts may be sent concurrently and in any order.
    pub async fn upload_part(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        upload_id: &UploadId,
        part_number: u32,
        timeout: Option<Duration>,
    ) -> Result<Chunk> {
        self.send_part(key, ObjectBody::Bytes(data.into()), upload_id, part_number, timeout)
            .await
    }

    /// UploadPart from a single-pass stream of `size` bytes.
    pub async fn upload_part_stream<S>(
        &self,
        key: &str,
        chunks: S,
        size: u64,
        upload_id: &UploadId,
        part_number: u32,
        timeout: Option<Duration>,
    ) -> Result<Chunk>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        self.send_part(key, ObjectBody::stream(chunks, size), upload_id, part_number, timeout)
            .await
    }

    async fn send_part(
        &self,
        key: &str,
        body: ObjectBody,
        upload_id: &UploadId,
        part_number: u32,
        timeout: Option<Duration>,
    ) -> Result<Chunk> {
        if !(1..=MAX_MULTIPART_PARTS).contains(&part_number) {
            return Err(StorageError::InvalidPartNumber(part_number));
        }
        debug!(
            "UploadPart {} #{} ({} bytes)",
            key,
            part_number,
            body.content_length()
        );
        let tag = with_timeout("UploadPart", timeout, async {
            self.remote
                .upload_part(key, upload_id.as_str(), part_number, body)
                .await
                .map_err(StorageError::from)
        })
        .await?
        .filter(|tag| !tag.is_empty())
        .ok_or(StorageError::InvalidResponse {
            operation: "UploadPart",
            field: "ETag",
        })?;
        Ok(Chunk { part_number, tag })
    }

    /// CompleteMultipartUpload with every part of the upload.
    ///
    /// `chunks` may be in any order; they are submitted sorted by part number.
    /// `checksum` is the whole-object CRC32, not a per-part value.
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &UploadId,
        checksum: Option<&str>,
        chunks: &[Chunk],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut parts = chunks.to_vec();
        parts.sort_by_key(|c| c.part_number);

        debug!(
            "CompleteMultipartUpload {} ({} parts, checksum={:?})",
            key,
            parts.len(),
            checksum
        );
        with_timeout("CompleteMultipartUpload", timeout, async {
            self.remote
                .complete_multipart_upload(key, upload_id.as_str(), &parts, checksum)
                .await
                .map_err(|e| upload_error(key, e))
        })
        .await
    }

    /// AbortMultipartUpload, discarding every uploaded part.
    pub async fn cancel_multipart_upload(&self, key: &str, upload_id: &UploadId) -> Result<()> {
        debug!("AbortMultipartUpload {} ({})", key, upload_id);
        self.remote
            .abort_multipart_upload(key, upload_id.as_str())
            .await?;
        Ok(())
    }

    /// Start a sequential upload session for `key`.
    pub async fn start_multipart(
        &self,
        key: &str,
        cfg: MultipartUploadConfig,
    ) -> Result<MultipartUploadSession> {
        MultipartUploadSession::start(self.clone(), key, cfg).await
    }
}

/// Run `fut`, giving up after `timeout` if one is set. Expiry drops the request.
async fn with_timeout<T, F>(operation: &'static str, timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StorageError::Timeout {
                operation,
                timeout: limit,
            })?,
        None => fut.await,
    }
}

fn upload_error(key: &str, err: RemoteError) -> StorageError {
    let err = StorageError::from_upload(key, err);
    if matches!(err, StorageError::InvalidChecksum { .. }) {
        warn!("store rejected the checksum declared for {}", key);
    }
    err
}

fn missing_key(key: &str, err: RemoteError) -> StorageError {
    if err.is_not_found() {
        StorageError::KeyNotExists {
            key: key.to_owned(),
        }
    } else {
        err.into()
    }
}

/// Split the requested part of a `size`-byte object into spans of `chunk_size`.
fn chunk_spans(size: u64, range: Option<ByteRange>, chunk_size: u64) -> Result<Vec<ByteRange>> {
    let (start, end) = match range {
        None if size == 0 => return Ok(Vec::new()),
        None => (0, size - 1),
        Some(r) if r.start() >= size => {
            return Err(StorageError::InvalidRange {
                start: r.start(),
                end: r.end(),
            });
        }
        Some(r) => (r.start(), r.end().min(size - 1)),
    };

    let mut spans = Vec::new();
    let mut offset = start;
    loop {
        let last = offset.saturating_add(chunk_size - 1).min(end);
        spans.push(ByteRange::new(offset, last)?);
        if last == end {
            break;
        }
        offset = last + 1;
    }
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(spans: &[ByteRange]) -> Vec<(u64, u64)> {
        spans.iter().map(|s| (s.start(), s.end())).collect()
    }

    #[test]
    fn spans_cover_whole_object() {
        let spans = chunk_spans(10, None, 4).unwrap();
        assert_eq!(bounds(&spans), vec![(0, 3), (4, 7), (8, 9)]);
    }

    #[test]
    fn spans_of_empty_object() {
        assert!(chunk_spans(0, None, 4).unwrap().is_empty());
        assert!(chunk_spans(0, Some(ByteRange::new(0, 1).unwrap()), 4).is_err());
    }

    #[test]
    fn spans_respect_range_and_clamp_to_size() {
        let spans = chunk_spans(26, Some(ByteRange::new(1, 3).unwrap()), 2).unwrap();
        assert_eq!(bounds(&spans), vec![(1, 2), (3, 3)]);

        let spans = chunk_spans(10, Some(ByteRange::new(8, 100).unwrap()), 4).unwrap();
        assert_eq!(bounds(&spans), vec![(8, 9)]);
    }

    #[test]
    fn huge_chunk_size_does_not_overflow() {
        let spans = chunk_spans(10, None, u64::MAX).unwrap();
        assert_eq!(bounds(&spans), vec![(0, 9)]);
    }

    #[test]
    fn not_found_becomes_missing_key() {
        let err = missing_key("a", RemoteError::new("GetObject", Some(404), Some("NoSuchKey"), None));
        assert!(matches!(err, StorageError::KeyNotExists { .. }));

        let err = missing_key("a", RemoteError::new("GetObject", Some(500), None, None));
        assert!(matches!(err, StorageError::Remote(_)));
    }
}
