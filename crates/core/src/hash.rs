//! BLAKE3 content hashing for note identity checks
//!
//! A note's content hash is what lets the watcher tell "our own write landing
//! on disk" apart from an edit made by another program, so hashing must be
//! deterministic over raw bytes with no canonicalization.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A BLAKE3 hash (32 bytes) over note content
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(64);
        for &byte in &self.0 {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 {
            anyhow::bail!("Invalid hex length: expected 64 characters, got {}", hex.len());
        }

        let mut bytes = [0u8; 32];
        for i in 0..32 {
            let high = hex_char_to_nibble(hex.as_bytes()[i * 2])?;
            let low = hex_char_to_nibble(hex.as_bytes()[i * 2 + 1])?;
            bytes[i] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }
}

fn hex_char_to_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => anyhow::bail!("Invalid hex character: {}", c as char),
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let hash = blake3::hash(data);
    ContentHash::from_bytes(*hash.as_bytes())
}

/// Hash a string's UTF-8 bytes
pub fn hash_str(data: &str) -> ContentHash {
    hash_bytes(data.as_bytes())
}

/// Hash a file using BLAKE3 (streaming for large files)
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    use std::fs::File;
    use std::io::{BufReader, Read};

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0u8; 8192]; // 8KB buffer
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(ContentHash::from_bytes(*hash.as_bytes()))
}

/// Read a file with stability verification (double-stat pattern)
///
/// Ensures the file is not changing during the read by comparing metadata
/// before and after. Callers that need both the bytes and their hash (event
/// classification, reconciliation scans) read once through this and hash
/// the returned buffer.
///
/// # Arguments
/// * `path` - File to read
/// * `max_retries` - Maximum retry attempts
///
/// # Returns
/// * `Ok(bytes)` - File was stable across the read
/// * `Err(...)` - File kept changing, or an I/O error occurred
pub fn read_file_stable(path: &Path, max_retries: u8) -> Result<Vec<u8>> {
    use std::fs;

    for attempt in 0..max_retries {
        // 1. Stat before read
        let stat1 = fs::metadata(path)
            .with_context(|| format!("Failed to stat (pre): {}", path.display()))?;

        // 2. Read contents
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read: {}", path.display()))?;

        // 3. Stat after read
        let stat2 = fs::metadata(path)
            .with_context(|| format!("Failed to stat (post): {}", path.display()))?;

        // 4. Verify stability (size + mtime unchanged)
        if stat1.len() == stat2.len() &&
           stat1.modified()? == stat2.modified()? {
            return Ok(bytes);
        }

        // File changed during read - exponential backoff
        if attempt < max_retries - 1 {
            let backoff_ms = 50 << attempt;  // 50ms, 100ms, 200ms
            sleep(Duration::from_millis(backoff_ms));
        }
    }

    Err(anyhow::anyhow!(
        "File {} is unstable after {} read attempts (file changing too rapidly)",
        path.display(),
        max_retries
    ))
}
