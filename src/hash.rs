// src/hash.rs

//! SHA-256 hashing for archive integrity
//!
//! Downloads are hashed while they stream to disk ([`HashingWriter`]), then
//! compared against the entry published in the distribution's
//! `SHASUMS256.txt` ([`parse_shasums`]).

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{self, Write};

/// Length of a SHA-256 digest as lowercase hex
pub const SHA256_HEX_LEN: usize = 64;

/// Incremental SHA-256 hasher producing lowercase hex
#[derive(Default, Clone)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    pub fn finalize(self) -> String {
        format!("{:x}", self.state.finalize())
    }
}

/// Writer adapter that hashes everything written through it
pub struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            written: 0,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Return the inner writer and the hex digest of everything written
    pub fn finish(self) -> (W, String) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// SHA-256 of a byte slice
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Case-insensitive digest comparison
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Parse a `sha256sum`-style listing into file name → lowercase digest
///
/// Accepts both text (`digest  name`) and binary (`digest *name`) markers.
/// Lines without a valid 64-character hex digest are skipped.
pub fn parse_shasums(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let (digest, name) = line.trim().split_once(char::is_whitespace)?;
            let name = name.trim_start().trim_start_matches('*');
            let valid = digest.len() == SHA256_HEX_LEN
                && digest.chars().all(|c| c.is_ascii_hexdigit())
                && !name.is_empty();
            valid.then(|| (name.to_string(), digest.to_lowercase()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(sha256(b"hello world"), HELLO_WORLD);
        assert_eq!(sha256(b"hello world").len(), SHA256_HEX_LEN);
    }

    #[test]
    fn test_hasher_incremental() {
        let mut hasher = Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), HELLO_WORLD);
    }

    #[test]
    fn test_hashing_writer_passes_data_through() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello world").unwrap();
        assert_eq!(writer.written(), 11);
        let (inner, digest) = writer.finish();
        assert_eq!(inner, b"hello world");
        assert_eq!(digest, HELLO_WORLD);
    }

    #[test]
    fn test_parse_shasums() {
        let listing = format!(
            "{HELLO_WORLD}  node-v20.11.1-linux-x64.tar.xz\n\
             {}  *node-v20.11.1-win-x64.zip\n\
             not-a-digest  junk.txt\n\n",
            "A".repeat(SHA256_HEX_LEN)
        );
        let sums = parse_shasums(&listing);
        assert_eq!(sums.len(), 2);
        assert_eq!(sums["node-v20.11.1-linux-x64.tar.xz"], HELLO_WORLD);
        assert_eq!(sums["node-v20.11.1-win-x64.zip"], "a".repeat(SHA256_HEX_LEN));
    }
}
