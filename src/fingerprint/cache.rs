//! On-disk fingerprint cache record.
//!
//! Line 1 holds the hex digest, every following line one tracked path.

use super::{Result, io_error};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// Digest plus the sorted file list it was computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub digest: String,
    pub files: Vec<String>,
}

impl CacheRecord {
    /// Parse cache file text. Returns `None` when there is no digest line.
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(str::trim);
        let digest = lines.next().filter(|line| !line.is_empty())?.to_string();
        let files = lines
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self { digest, files })
    }

    /// Render the record in its on-disk form.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.digest.len() + 1);
        out.push_str(&self.digest);
        out.push('\n');
        for file in &self.files {
            out.push_str(file);
            out.push('\n');
        }
        out
    }

    /// Load a record, returning `None` when the cache file is absent.
    pub fn load(path: &Path) -> Result<Option<(Self, SystemTime)>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(path)(err)),
        };
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(io_error(path))?;

        Ok(Self::parse(&content).map(|record| (record, modified)))
    }

    /// Publish the record by writing a sibling temporary file and renaming it
    /// over `path`, so readers never observe a partial record.
    pub fn store(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fingerprint".to_string());
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

        fs::write(&temp_path, self.render()).map_err(io_error(&temp_path))?;
        if let Err(err) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(path)(err));
        }

        debug!("Stored fingerprint cache {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_digest_and_files() {
        let record = CacheRecord::parse("abc\nDockerfile\nsrc/main.rs\n").unwrap();
        assert_eq!(record.digest, "abc");
        assert_eq!(record.files, vec!["Dockerfile", "src/main.rs"]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(CacheRecord::parse("").is_none());
        assert!(CacheRecord::parse("\nDockerfile\n").is_none());
    }

    #[test]
    fn test_store_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".ctx_sha");
        let record = CacheRecord {
            digest: "0123".to_string(),
            files: vec![".dockerignore".to_string(), "Dockerfile".to_string()],
        };

        record.store(&path).unwrap();
        let (loaded, _) = CacheRecord::load(&path).unwrap().unwrap();

        assert_eq!(loaded, record);
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(CacheRecord::load(&temp.path().join("absent")).unwrap().is_none());
    }
}
