// src/constants.rs
//
// Centralized constants for the driver to avoid hardcoded values throughout the codebase

/// Region used when neither configuration nor environment names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Minimum S3 multipart upload part size (5 MB - AWS requirement, last part exempt)
pub const MIN_S3_MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default multipart upload part size for S3 (16 MB)
pub const DEFAULT_S3_MULTIPART_PART_SIZE: usize = 16 * 1024 * 1024;

/// Maximum number of parts in a multipart upload
pub const MAX_MULTIPART_PARTS: u32 = 10000;

/// Default chunk size for streamed downloads (5 MB)
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Ranged GETs kept in flight by a streamed download.
/// Chunks are still yielded strictly in file order.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

/// Connect timeout for the SDK HTTP client (seconds). There is no default
/// operation timeout; callers pass one per call.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Credential provider name reported for statically configured keys
pub const STATIC_CREDENTIALS_PROVIDER: &str = "s3-object-storage-static";
