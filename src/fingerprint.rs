//! # Fingerprint
//!
//! Pure, stateless content hashing and snapshot-ID derivation. Uses SHA-256
//! rather than a faster non-cryptographic or BLAKE3-style hash because the
//! checksum doubles as the tamper-evidence primitive for restore (spec §4.1):
//! every snapshot is re-verified against this hash before it is trusted.
//!
//! The hash is also the deduplication key — two snapshots of files with
//! identical bytes collapse to the same `content_hash` and therefore the
//! same index entry (spec §3 invariant 4).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of the read buffer for streaming hash computation (64 KiB).
const BUF_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 hash of in-memory data, returning lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the SHA-256 hash of a file's contents via streaming reads, so
/// hashing does not require loading the whole file into memory.
pub fn content_hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let bytes_read = file.read(&mut buf)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buf[..bytes_read]);
    }

    Ok(hex_encode(&hasher.finalize()))
}

/// Derives a 16-hex-char snapshot ID from `(timestamp_nanos, content_hash)`.
///
/// SHA-256 of the ASCII concatenation `"{timestamp_nanos}-{content_hash}"`,
/// truncated to the first 16 hex characters. Deterministic: identical inputs
/// always produce the identical ID (spec §8, "Id determinism").
pub fn snapshot_id(timestamp_nanos: i64, content_hash: &str) -> String {
    let input = format!("{timestamp_nanos}-{content_hash}");
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let full = hex_encode(&hasher.finalize());
    full[..16].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        let a = content_hash(b"hello world");
        let b = content_hash(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_hash_differs_by_input() {
        let a = content_hash(b"data A");
        let b = content_hash(b"data B");
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let from_file = content_hash_file(&path).unwrap();
        let from_bytes = content_hash(b"hello world");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn snapshot_id_is_16_hex_chars() {
        let h = content_hash(b"some content");
        let id = snapshot_id(1_700_000_000_000_000_000, &h);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn snapshot_id_deterministic() {
        let h = content_hash(b"some content");
        let id1 = snapshot_id(42, &h);
        let id2 = snapshot_id(42, &h);
        assert_eq!(id1, id2);
    }

    #[test]
    fn snapshot_id_differs_by_timestamp() {
        let h = content_hash(b"some content");
        let id1 = snapshot_id(1, &h);
        let id2 = snapshot_id(2, &h);
        assert_ne!(id1, id2);
    }
}
