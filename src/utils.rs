//! Utility functions for name normalization and content hashing

use crate::error::Result;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Normalize a target name for abort-list matching
///
/// Percent-decodes repeatedly until the string stops changing, trimming
/// surrounding whitespace and lowercasing on every pass. Double-encoded
/// names (`%2541` for `%41` for `A`) therefore collapse all the way down.
///
/// # Examples
///
/// ```
/// use warc_pipeline::utils::normalize;
///
/// assert_eq!(normalize("A%2520b "), "a b");
/// assert_eq!(normalize(&normalize("A%2520b ")), "a b");
/// ```
pub fn normalize(name: &str) -> String {
    let mut current = name.to_string();
    loop {
        let decoded = match urlencoding::decode(&current) {
            Ok(d) => d.into_owned(),
            // Invalid UTF-8 after decoding: stop decoding, keep the raw form
            Err(_) => current.clone(),
        };
        let next = decoded.trim().to_lowercase();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Lowercase SHA-1 hex digest of `bytes`
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lowercase SHA-256 hex digest of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-1 hex digest of a file's contents
pub async fn file_sha1(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(sha1_hex(&bytes))
}

/// Size of a file in bytes
pub async fn file_size(path: &Path) -> Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    // --- normalize ---

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Example.COM  "), "example.com");
    }

    #[test]
    fn normalize_decodes_percent_escapes() {
        assert_eq!(normalize("domain%3Aexample.com"), "domain:example.com");
    }

    #[test]
    fn normalize_collapses_double_encoding() {
        // %2541 -> %41 -> A -> a
        assert_eq!(normalize("%2541"), "a");
    }

    #[test]
    fn normalize_handles_encoded_space_then_trim() {
        // The decoded trailing space must be trimmed on the following pass
        assert_eq!(normalize("A%2520b "), "a b");
    }

    #[test]
    fn normalize_is_idempotent() {
        let cases = [
            "domain:Example.com",
            "  asset:CDN.example/path%20with%20spaces  ",
            "%2541%2542",
            "already-normal",
            "",
        ];
        for case in cases {
            let once = normalize(case);
            let twice = normalize(&once);
            assert_eq!(
                once, twice,
                "normalize must be a fixed point for input {case:?}"
            );
        }
    }

    #[test]
    fn normalize_leaves_plain_names_alone() {
        assert_eq!(normalize("domain:a.example"), "domain:a.example");
    }

    #[test]
    fn normalize_keeps_invalid_escape_sequences_literal() {
        // "%zz" is not a valid escape and passes through undecoded
        assert_eq!(normalize("a%zzB"), "a%zzb");
    }

    // --- hashing ---

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha1_of_empty_input() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn file_sha1_hashes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let digest = file_sha1(&path).await.unwrap();
        assert_eq!(digest, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn file_sha1_errors_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(file_sha1(&missing).await.is_err());
    }

    #[tokio::test]
    async fn file_size_reports_byte_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sized.bin");
        tokio::fs::write(&path, vec![0_u8; 1234]).await.unwrap();

        assert_eq!(file_size(&path).await.unwrap(), 1234);
    }
}
