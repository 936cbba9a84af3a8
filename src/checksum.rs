// src/checksum.rs
//
// Incremental checksums for upload integrity.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crc32fast::Hasher;

/// Incremental digest over the exact bytes of an upload.
///
/// `finalize` consumes the calculator, so a calculator is good for one payload.
pub trait ChecksumCalculator: Send {
    /// Feed the next slice of payload bytes.
    fn update(&mut self, bytes: &[u8]);

    /// Wire-encoded digest of everything fed so far.
    fn finalize(self) -> String
    where
        Self: Sized;
}

/// CRC32 in the form S3 expects for `x-amz-checksum-crc32`:
/// base64 of the big-endian 32-bit value.
#[derive(Clone, Debug, Default)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot helper.
    pub fn checksum(bytes: &[u8]) -> String {
        let mut calc = Self::new();
        calc.update(bytes);
        calc.finalize()
    }

    /// Encode a raw CRC32 value the way the store expects it.
    pub fn encode(value: u32) -> String {
        STANDARD.encode(value.to_be_bytes())
    }

    /// Decode a wire value; `None` if it is not base64 of exactly four bytes.
    pub fn decode(encoded: &str) -> Option<u32> {
        let raw = STANDARD.decode(encoded).ok()?;
        let bytes: [u8; 4] = raw.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

impl ChecksumCalculator for Crc32 {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(self) -> String {
        Self::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(Crc32::checksum(b""), "AAAAAA==");
        assert_eq!(Crc32::checksum(b"hello world"), "DUoRhQ==");
        assert_eq!(Crc32::checksum(b"lorem ipsum dolor sit amet"), "0Pxk0A==");
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"lorem ipsum dolor sit amet";
        let mut calc = Crc32::new();
        for piece in data.chunks(5) {
            calc.update(piece);
        }
        assert_eq!(calc.finalize(), Crc32::checksum(data));
    }

    #[test]
    fn decode_rejects_malformed_values() {
        assert_eq!(Crc32::decode("DUoRhQ=="), Some(0x0d4a_1185));
        assert_eq!(Crc32::decode("invalid"), None);
        // valid base64, wrong length
        assert_eq!(Crc32::decode("aGVsbG8="), None);
    }
}
