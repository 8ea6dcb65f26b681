//! Manifest of artifacts to fetch
//!
//! A manifest is a JSON array of entries with fixed field names:
//!
//! ```json
//! [
//!   { "FileName": "SkyUI_5_2_SE-12604-5-2SE.7z", "Size": 2781972,
//!     "Hash": "menYUTfbRu8=", "GameID": 1704, "FileID": 35407 }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::downloader::core::files::part_path;
use crate::downloader::core::{DownloadError, FileOperation, Result};

/// One artifact to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Destination name, also the stem of the part file
    #[serde(rename = "FileName")]
    pub file_name: String,
    /// Size in bytes
    #[serde(rename = "Size")]
    pub size: u64,
    /// Base64 of the little-endian xxHash64 digest
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "GameID")]
    pub game_id: u64,
    #[serde(rename = "FileID")]
    pub file_id: u64,
}

impl ManifestEntry {
    /// Final location of this artifact under `dir`
    pub fn destination(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    /// In-progress location of this artifact under `dir`
    pub fn part_path(&self, dir: &Path) -> PathBuf {
        part_path(&self.destination(dir))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let name = self.file_name.as_str();
        if name.is_empty() {
            return Err("FileName is empty".to_string());
        }
        if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            return Err(format!("FileName '{}' is not a plain file name", name));
        }
        if self.size == 0 {
            return Err(format!("Size of '{}' must be greater than zero", name));
        }
        if self.hash.trim().is_empty() {
            return Err(format!("Hash of '{}' is empty", name));
        }
        Ok(())
    }
}

/// An ordered, validated list of manifest entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read and validate the manifest at `path`
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DownloadError::file_system(path, FileOperation::Read, e))?;
        let manifest = Self::parse_at(&contents, path)?;
        debug!("Loaded {} manifest entries from {}", manifest.len(), path.display());
        Ok(manifest)
    }

    /// Parse and validate manifest text
    pub fn parse(contents: &str) -> Result<Self> {
        Self::parse_at(contents, Path::new("<inline>"))
    }

    fn parse_at(contents: &str, path: &Path) -> Result<Self> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(contents).map_err(|e| DownloadError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_entries_at(entries, path)
    }

    /// Build a manifest from already constructed entries, validating each
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self> {
        Self::from_entries_at(entries, Path::new("<inline>"))
    }

    fn from_entries_at(entries: Vec<ManifestEntry>, path: &Path) -> Result<Self> {
        for (index, entry) in entries.iter().enumerate() {
            entry.validate().map_err(|reason| DownloadError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("entry {}: {}", index, reason),
            })?;
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"[
        {"FileName": "SkyUI_5_2_SE-12604-5-2SE.7z", "Size": 2781972, "Hash": "menYUTfbRu8=", "GameID": 1704, "FileID": 35407},
        {"FileName": "USSEP-266-4-2-5.7z", "Size": 10, "Hash": "AAAAAAAAAAA=", "GameID": 1704, "FileID": 451234}
    ]"#;

    fn reason_of(err: DownloadError) -> String {
        match err {
            DownloadError::InvalidManifest { reason, .. } => reason,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_uses_fixed_field_names() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.len(), 2);

        let first = &manifest.entries()[0];
        assert_eq!(first.file_name, "SkyUI_5_2_SE-12604-5-2SE.7z");
        assert_eq!(first.size, 2781972);
        assert_eq!(first.hash, "menYUTfbRu8=");
        assert_eq!(first.game_id, 1704);
        assert_eq!(first.file_id, 35407);
        assert_eq!(manifest.total_size(), 2781982);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = Manifest::parse(r#"[{"FileName": "a.7z", "Size": 1, "Hash": "x", "GameID": 1}]"#).unwrap_err();
        assert!(reason_of(err).contains("FileID"));
    }

    #[test]
    fn test_invalid_entries_name_their_index() {
        let zero_size = r#"[
            {"FileName": "a.7z", "Size": 1, "Hash": "x", "GameID": 1, "FileID": 1},
            {"FileName": "b.7z", "Size": 0, "Hash": "x", "GameID": 1, "FileID": 2}
        ]"#;
        assert!(reason_of(Manifest::parse(zero_size).unwrap_err()).starts_with("entry 1:"));

        let empty_hash = r#"[{"FileName": "a.7z", "Size": 1, "Hash": "", "GameID": 1, "FileID": 1}]"#;
        assert!(reason_of(Manifest::parse(empty_hash).unwrap_err()).contains("Hash"));

        for name in ["", ".", "..", "../escape.7z", "dir/file.7z", "dir\\file.7z"] {
            let entry = ManifestEntry {
                file_name: name.to_string(),
                size: 1,
                hash: "x".to_string(),
                game_id: 1,
                file_id: 1,
            };
            assert!(Manifest::from_entries(vec![entry]).is_err(), "accepted '{}'", name);
        }
    }

    #[test]
    fn test_entry_paths() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let entry = &manifest.entries()[1];
        let dir = Path::new("/downloads");

        assert_eq!(entry.destination(dir), PathBuf::from("/downloads/USSEP-266-4-2-5.7z"));
        assert_eq!(entry.part_path(dir), PathBuf::from("/downloads/USSEP-266-4-2-5.7z.part"));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modlist.json");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let manifest = Manifest::load(&path).await.unwrap();
        assert_eq!(manifest.len(), 2);

        let missing = Manifest::load(&dir.path().join("absent.json")).await.unwrap_err();
        assert_eq!(missing.category(), "file_system");
    }
}
