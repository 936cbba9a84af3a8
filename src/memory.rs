// src/memory.rs
//
// Process-local RemoteStore.
//
// Emulates the parts of the S3 wire behavior the adapter relies on: 404 codes for
// absent keys and uploads, inclusive ranges with 416 past the end, CRC32 header
// validation, declared-length checks on streamed bodies and multipart assembly with
// the usual part ordering and minimum-size rules. Error statuses, codes and messages
// mirror what S3 returns so error classification is exercised as in production.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::checksum::Crc32;
use crate::constants::MIN_S3_MULTIPART_PART_SIZE;
use crate::error::RemoteError;
use crate::multipart::Chunk;
use crate::remote::{ByteRange, ObjectBody, ObjectHead, RemoteStore};

#[derive(Debug, Default)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    uploads: HashMap<String, PendingUpload>,
    upload_seq: u64,
}

/// In-memory bucket.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored object count.
    pub async fn object_count(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    /// Multipart uploads neither completed nor aborted.
    pub async fn pending_uploads(&self) -> usize {
        self.state.lock().await.uploads.len()
    }

    /// Raw object content, bypassing the request path.
    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().await.objects.get(key).cloned()
    }
}

fn etag(data: &[u8]) -> String {
    format!("\"{:08x}\"", crc32fast::hash(data))
}

fn no_such_key(operation: &'static str) -> RemoteError {
    RemoteError::new(
        operation,
        Some(404),
        Some("NoSuchKey"),
        Some("The specified key does not exist."),
    )
}

fn no_such_upload(operation: &'static str) -> RemoteError {
    RemoteError::new(
        operation,
        Some(404),
        Some("NoSuchUpload"),
        Some("The specified upload does not exist."),
    )
}

fn bad_request(operation: &'static str, code: &str, message: &str) -> RemoteError {
    RemoteError::new(operation, Some(400), Some(code), Some(message))
}

/// Drain the body, enforcing the declared length of streams.
async fn read_body(operation: &'static str, body: ObjectBody) -> Result<Bytes, RemoteError> {
    match body {
        ObjectBody::Bytes(bytes) => Ok(bytes),
        ObjectBody::Stream { mut chunks, size } => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = chunks
                .try_next()
                .await
                .map_err(|e| RemoteError::transport(operation, e))?
            {
                buf.extend_from_slice(&chunk);
            }
            if buf.len() as u64 != size {
                return Err(bad_request(
                    operation,
                    "IncompleteBody",
                    "You did not provide the number of bytes specified by the Content-Length HTTP header.",
                ));
            }
            Ok(buf.freeze())
        }
    }
}

fn verify_checksum(
    operation: &'static str,
    data: &[u8],
    checksum_crc32: Option<&str>,
) -> Result<(), RemoteError> {
    let Some(declared) = checksum_crc32 else {
        return Ok(());
    };
    let Some(expected) = Crc32::decode(declared) else {
        return Err(bad_request(
            operation,
            "InvalidRequest",
            "Value for x-amz-checksum-crc32 header is invalid.",
        ));
    };
    if crc32fast::hash(data) != expected {
        return Err(bad_request(
            operation,
            "BadDigest",
            "The CRC32 you specified did not match the calculated checksum.",
        ));
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        let data = read_body("PutObject", body).await?;
        verify_checksum("PutObject", &data, checksum_crc32)?;
        self.state.lock().await.objects.insert(key.to_owned(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<Bytes, RemoteError> {
        let state = self.state.lock().await;
        let data = state.objects.get(key).ok_or_else(|| no_such_key("GetObject"))?;
        let Some(range) = range else {
            return Ok(data.clone());
        };
        let len = data.len() as u64;
        if range.start() >= len {
            return Err(RemoteError::new(
                "GetObject",
                Some(416),
                Some("InvalidRange"),
                Some("The requested range is not satisfiable"),
            ));
        }
        let end = range.end().min(len - 1);
        Ok(data.slice(range.start() as usize..=end as usize))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, RemoteError> {
        let state = self.state.lock().await;
        let data = state
            .objects
            .get(key)
            .ok_or_else(|| RemoteError::new("HeadObject", Some(404), Some("NotFound"), None))?;
        Ok(ObjectHead {
            content_length: data.len() as u64,
            e_tag: Some(etag(data)),
        })
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>, RemoteError> {
        let prefix = prefix.unwrap_or("");
        let state = self.state.lock().await;
        Ok(state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        let data = state
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| no_such_key("CopyObject"))?;
        state.objects.insert(destination.to_owned(), data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), RemoteError> {
        self.state.lock().await.objects.remove(key);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let mut state = self.state.lock().await;
        state.upload_seq += 1;
        let upload_id = format!("mem-upload-{:06}", state.upload_seq);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_owned(),
                parts: BTreeMap::new(),
            },
        );
        Ok(Some(upload_id))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ObjectBody,
    ) -> Result<Option<String>, RemoteError> {
        let data = read_body("UploadPart", body).await?;
        let mut state = self.state.lock().await;
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| no_such_upload("UploadPart"))?;
        let tag = etag(&data);
        upload.parts.insert(part_number, (tag.clone(), data));
        Ok(Some(tag))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[Chunk],
        checksum_crc32: Option<&str>,
    ) -> Result<(), RemoteError> {
        const OP: &str = "CompleteMultipartUpload";

        let mut state = self.state.lock().await;
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| no_such_upload(OP))?;

        if parts.is_empty() {
            return Err(bad_request(
                OP,
                "MalformedXML",
                "The XML you provided was not well-formed or did not validate against our published schema.",
            ));
        }

        let mut assembled = BytesMut::new();
        let mut last_number = 0;
        for (i, chunk) in parts.iter().enumerate() {
            if chunk.part_number <= last_number {
                return Err(bad_request(
                    OP,
                    "InvalidPartOrder",
                    "The list of parts was not in ascending order.",
                ));
            }
            last_number = chunk.part_number;

            let (tag, data) = upload
                .parts
                .get(&chunk.part_number)
                .filter(|(tag, _)| *tag == chunk.tag)
                .ok_or_else(|| {
                    bad_request(
                        OP,
                        "InvalidPart",
                        "One or more of the specified parts could not be found.",
                    )
                })?;
            if i + 1 < parts.len() && data.len() < MIN_S3_MULTIPART_PART_SIZE {
                return Err(bad_request(
                    OP,
                    "EntityTooSmall",
                    "Your proposed upload is smaller than the minimum allowed object size.",
                ));
            }
            debug!("assembling part {} ({}, {} bytes)", chunk.part_number, tag, data.len());
            assembled.extend_from_slice(data);
        }

        let assembled = assembled.freeze();
        verify_checksum(OP, &assembled, checksum_crc32)?;

        state.uploads.remove(upload_id);
        state.objects.insert(key.to_owned(), assembled);
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        if !state.uploads.get(upload_id).is_some_and(|u| u.key == key) {
            return Err(no_such_upload("AbortMultipartUpload"));
        }
        state.uploads.remove(upload_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ranges_are_clamped_and_checked() {
        let store = InMemoryStore::new();
        store
            .put_object("k", Bytes::from_static(b"abcdef").into(), None)
            .await
            .unwrap();

        let got = store.get_object("k", Some(ByteRange::new(4, 100).unwrap())).await.unwrap();
        assert_eq!(&got[..], b"ef");

        let err = store
            .get_object("k", Some(ByteRange::new(6, 7).unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(416));
    }

    #[tokio::test]
    async fn listing_is_textual_prefix_match() {
        let store = InMemoryStore::new();
        for key in ["a/1", "a/2", "ab/3", "b"] {
            store.put_object(key, ObjectBody::empty(), None).await.unwrap();
        }
        let keys = store.list_objects(Some("a")).await.unwrap();
        assert_eq!(keys, vec!["a/1", "a/2", "ab/3"]);
    }

    #[tokio::test]
    async fn short_stream_is_rejected() {
        let store = InMemoryStore::new();
        let chunks = futures::stream::iter(vec![Ok(Bytes::from_static(b"abc"))]);
        let err = store
            .put_object("k", ObjectBody::stream(chunks, 10), None)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("IncompleteBody"));
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn small_middle_part_is_rejected() {
        let store = InMemoryStore::new();
        let id = store.create_multipart_upload("k").await.unwrap().unwrap();
        let mut chunks = Vec::new();
        for n in 1..=2 {
            let tag = store
                .upload_part("k", &id, n, Bytes::from_static(b"tiny").into())
                .await
                .unwrap()
                .unwrap();
            chunks.push(Chunk { part_number: n, tag });
        }
        let err = store
            .complete_multipart_upload("k", &id, &chunks, None)
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("EntityTooSmall"));
        assert_eq!(store.pending_uploads().await, 1);
    }
}
