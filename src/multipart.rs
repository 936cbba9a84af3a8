// src/multipart.rs
//
// Multipart Upload (MPU) session state.
//
// Design:
// - UploadId / Chunk are the records the raw protocol operations on
//   S3ObjectStorage exchange with the caller.
// - MultipartUploadSession is a sequential helper over those operations:
//     - upload_part() sends one part with the next part number
//     - write() buffers until part_size and sends full parts
//     - complete() sends the buffered tail and CompleteMultipartUpload
//     - cancel() aborts the MPU
//   complete() and cancel() consume the session. Dropping an unfinished session
//   leaves the upload open on the store; the caller owns the cleanup.
// - A failed part upload poisons the session: every later call except cancel()
//   returns SessionFailed, so a gap in the part sequence can never be completed.
// - total_bytes and the whole-file CRC32 follow the bytes the caller handed over,
//   not the bytes sent so far.

use std::fmt;
use std::mem;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::checksum::{ChecksumCalculator, Crc32};
use crate::constants::{DEFAULT_S3_MULTIPART_PART_SIZE, MIN_S3_MULTIPART_PART_SIZE};
use crate::error::{Result, StorageError};
use crate::storage::S3ObjectStorage;

/// Opaque identifier the store assigns to a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One uploaded part: its number and the tag (ETag) the store returned for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub part_number: u32,
    pub tag: String,
}

#[derive(Clone, Debug)]
pub struct MultipartUploadConfig {
    /// Size of each part cut by `write()` (minimum 5 MiB, the last part may be shorter).
    pub part_size: usize,
    /// Compute the whole-file CRC32 and declare it on completion.
    pub verify_checksum: bool,
    /// Timeout applied to each part upload and to the completion request.
    pub timeout: Option<Duration>,
}

impl Default for MultipartUploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_S3_MULTIPART_PART_SIZE,
            verify_checksum: true,
            timeout: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Upload created, no part sent yet.
    Created,
    /// At least one part sent.
    Accumulating,
}

/// Sequential multipart upload of one object.
pub struct MultipartUploadSession {
    storage: S3ObjectStorage,
    key: String,
    upload_id: UploadId,
    cfg: MultipartUploadConfig,

    buf: Vec<u8>,
    next_part_number: u32,
    total_bytes: u64,
    chunks: Vec<Chunk>,
    checksum: Crc32,
    failed: bool,
}

impl MultipartUploadSession {
    /// Issue CreateMultipartUpload for `key`.
    pub async fn start(
        storage: S3ObjectStorage,
        key: &str,
        cfg: MultipartUploadConfig,
    ) -> Result<Self> {
        if cfg.part_size < MIN_S3_MULTIPART_PART_SIZE {
            return Err(StorageError::InvalidConfiguration(
                "part_size must be at least 5 MiB for S3 Multipart Upload".into(),
            ));
        }
        let upload_id = storage.create_multipart_upload(key).await?;

        Ok(Self {
            storage,
            key: key.to_owned(),
            upload_id,
            cfg,
            buf: Vec::new(),
            next_part_number: 1,
            total_bytes: 0,
            chunks: Vec::new(),
            checksum: Crc32::new(),
            failed: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    /// Parts sent so far, in part-number order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Bytes accepted so far, including the buffered tail.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn state(&self) -> SessionState {
        if self.chunks.is_empty() {
            SessionState::Created
        } else {
            SessionState::Accumulating
        }
    }

    /// True once a part upload failed; only `cancel()` is accepted afterwards.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Send `data` as the next part, as is. Any bytes buffered by `write()` go first.
    ///
    /// Every part but the last must be at least 5 MiB, so a buffered tail shorter
    /// than that is rejected here rather than by CompleteMultipartUpload later.
    pub async fn upload_part(&mut self, data: Bytes) -> Result<&Chunk> {
        self.ensure_usable()?;
        if !self.buf.is_empty() && self.buf.len() < MIN_S3_MULTIPART_PART_SIZE {
            return Err(StorageError::InvalidConfiguration(format!(
                "{} bytes buffered by write() would form a part below 5 MiB; \
                 write() more data or complete() instead",
                self.buf.len()
            )));
        }
        self.flush().await?;
        self.accept(&data);
        self.send_part(data).await?;
        Ok(&self.chunks[self.chunks.len() - 1])
    }

    /// Buffer `data`, sending a part every time `part_size` bytes are available.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        self.accept(data);

        if self.buf.is_empty() && data.len() >= self.cfg.part_size {
            // Fast path: slice full-sized parts straight out of `data`.
            let mut offset = 0usize;
            while data.len() - offset >= self.cfg.part_size {
                let end = offset + self.cfg.part_size;
                self.send_part(Bytes::copy_from_slice(&data[offset..end])).await?;
                offset = end;
            }
            self.buf.extend_from_slice(&data[offset..]);
        } else {
            self.buf.extend_from_slice(data);
            while self.buf.len() >= self.cfg.part_size {
                let rest = self.buf.split_off(self.cfg.part_size);
                let part = mem::replace(&mut self.buf, rest);
                self.send_part(Bytes::from(part)).await?;
            }
        }
        Ok(())
    }

    /// Send the buffered tail as a (possibly short) part.
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if !self.buf.is_empty() {
            let part = mem::take(&mut self.buf);
            self.send_part(Bytes::from(part)).await?;
        }
        Ok(())
    }

    /// Send the tail, then CompleteMultipartUpload with every part sent.
    ///
    /// On error the upload stays open and the session is consumed. Callers that
    /// want to abort it afterwards should copy `key()` and `upload_id()` before
    /// calling this, then pass them to `S3ObjectStorage::cancel_multipart_upload`.
    pub async fn complete(mut self) -> Result<UploadSummary> {
        self.flush().await?;

        let checksum = self.cfg.verify_checksum.then(|| self.checksum.finalize());
        self.storage
            .complete_multipart_upload(
                &self.key,
                &self.upload_id,
                checksum.as_deref(),
                &self.chunks,
                self.cfg.timeout,
            )
            .await?;

        debug!(
            "completed multipart upload {} for {} ({} parts, {} bytes)",
            self.upload_id,
            self.key,
            self.chunks.len(),
            self.total_bytes
        );
        Ok(UploadSummary {
            key: self.key,
            parts: self.chunks.len(),
            total_bytes: self.total_bytes,
            checksum,
        })
    }

    /// AbortMultipartUpload. Buffered bytes are discarded. Also valid on a failed session.
    pub async fn cancel(self) -> Result<()> {
        self.storage
            .cancel_multipart_upload(&self.key, &self.upload_id)
            .await
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.failed {
            return Err(StorageError::SessionFailed {
                key: self.key.clone(),
                upload_id: self.upload_id.to_string(),
            });
        }
        Ok(())
    }

    fn accept(&mut self, data: &[u8]) {
        self.total_bytes += data.len() as u64;
        if self.cfg.verify_checksum {
            self.checksum.update(data);
        }
    }

    async fn send_part(&mut self, data: Bytes) -> Result<()> {
        let part_number = self.next_part_number;
        match self
            .storage
            .upload_part(&self.key, data, &self.upload_id, part_number, self.cfg.timeout)
            .await
        {
            Ok(chunk) => {
                self.next_part_number += 1;
                self.chunks.push(chunk);
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                warn!(
                    "part {} of multipart upload {} for {} failed: {}",
                    part_number, self.upload_id, self.key, e
                );
                Err(e)
            }
        }
    }
}

impl fmt::Debug for MultipartUploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartUploadSession")
            .field("key", &self.key)
            .field("upload_id", &self.upload_id)
            .field("parts", &self.chunks.len())
            .field("buffered", &self.buf.len())
            .field("failed", &self.failed)
            .finish()
    }
}

/// Result of a completed session.
#[derive(Clone, Debug)]
pub struct UploadSummary {
    pub key: String,
    pub parts: usize,
    pub total_bytes: u64,
    /// Whole-file checksum declared on completion, if verification was on.
    pub checksum: Option<String>,
}
