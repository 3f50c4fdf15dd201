//! Hash computation utilities.
//!
//! Cache keys are SHA-1 digests of the *logical path string*, never of file
//! content. The rendering (40 lowercase hex characters) is part of the
//! on-disk cache layout and must not change.

use sha1::{Digest, Sha1};

/// Length of a hex-encoded SHA-1 digest.
pub const SHA1_HEX_LEN: usize = 40;

/// Compute the SHA-1 digest of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 40-character lowercase hex string (160 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    hex::encode(digest)
}

/// Compute the SHA-1 digest of a string's UTF-8 bytes.
///
/// # Arguments
/// * `value` - String to hash
///
/// # Returns
/// 40-character lowercase hex string (160 bits).
pub fn hash_string(value: &str) -> String {
    hash_bytes(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_string_known_vector() {
        assert_eq!(
            hash_string("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_hash_string_empty() {
        let hash: String = hash_string("");
        assert_eq!(hash, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(hash.len(), SHA1_HEX_LEN);
    }

    #[test]
    fn test_hash_string_deterministic() {
        let owned: String = String::from("/abs/local/file.txt");
        assert_eq!(hash_string(&owned), hash_string("/abs/local/file.txt"));
    }

    #[test]
    fn test_hash_string_different_inputs() {
        assert_ne!(hash_string("s3://bucket/a"), hash_string("s3://bucket/b"));
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let hash: String = hash_string("icgc:obj-1");
        assert!(hash
            .chars()
            .all(|c: char| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
