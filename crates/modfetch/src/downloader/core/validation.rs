//! Streaming xxHash64 computation and the manifest hash comparison rule
//!
//! Manifests store each artifact's hash as the base64 encoding of the xxHash64
//! digest in little-endian byte order, while the canonical digest bytes are
//! big-endian. Verification therefore serialises the running `u64` digest as
//! little-endian bytes before encoding; using the big-endian bytes makes every
//! comparison fail.

use base64::Engine;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

use crate::downloader::core::error::{DownloadError, FileOperation, Result};

/// Buffer size used when re-hashing bytes already on disk
const READ_CHUNK_SIZE: usize = 256 * 1024;

/// Encode a digest the way manifests store it
pub fn encode_reference(digest: u64) -> String {
    base64::engine::general_purpose::STANDARD.encode(digest.to_le_bytes())
}

/// Check a digest against a manifest hash
pub fn verify(digest: u64, reference: &str) -> bool {
    encode_reference(digest) == reference
}

/// Running xxHash64 over a byte stream
#[derive(Clone)]
pub struct IncrementalHasher {
    inner: Xxh64,
    bytes_hashed: u64,
}

impl std::fmt::Debug for IncrementalHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalHasher")
            .field("bytes_hashed", &self.bytes_hashed)
            .field("digest", &self.digest())
            .finish()
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            inner: Xxh64::new(0),
            bytes_hashed: 0,
        }
    }

    /// Build a hasher primed with the contents of `path`
    ///
    /// A missing file yields a fresh hasher, which is the state a transfer
    /// starting from offset zero expects.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let mut hasher = Self::new();

        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hasher),
            Err(e) => return Err(DownloadError::file_system(path, FileOperation::Read, e)),
        };

        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| DownloadError::file_system(path, FileOperation::Read, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        debug!("Primed hasher with {} bytes from {}", hasher.bytes_hashed, path.display());
        Ok(hasher)
    }

    /// Fold a chunk into the running digest
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
        self.bytes_hashed += bytes.len() as u64;
    }

    /// Current digest value; the hasher stays usable afterwards
    pub fn digest(&self) -> u64 {
        self.inner.digest()
    }

    /// Number of bytes folded in so far
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// The current digest in manifest encoding
    pub fn reference_encoding(&self) -> String {
        encode_reference(self.digest())
    }

    /// Compare the current digest with a manifest hash
    pub fn matches(&self, reference: &str) -> bool {
        verify(self.digest(), reference)
    }
}

/// Hash the whole file at `path` and compare it with a manifest hash
pub async fn file_matches(path: &Path, reference: &str) -> Result<bool> {
    let hasher = IncrementalHasher::from_file(path).await?;
    let matched = hasher.matches(reference);
    debug!(
        "Hash check for {}: expected={}, actual={}, matched={}",
        path.display(),
        reference,
        hasher.reference_encoding(),
        matched
    );
    Ok(matched)
}
