//! Build-context expansion, hashing and cache validation.

use super::{CacheRecord, FingerprintError, Result, io_error};
use crate::env::context::{HASH_CHUNK_SIZE, IGNORE_FILE, IMAGE_DEFINITION};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Parsed ignore file: the re-inclusion globs, without their `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreFile {
    pub patterns: Vec<String>,
}

impl IgnoreFile {
    /// Parse ignore file text. `path` is only used for error reporting.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let format_error = |line| FingerprintError::IgnoreFormat {
            path: path.to_path_buf(),
            line,
        };

        let mut lines = content.lines();
        match lines.next() {
            Some(first) if first.trim_end() == "*" => {}
            _ => return Err(format_error(1)),
        }

        let mut patterns = Vec::new();
        for (idx, line) in lines.enumerate() {
            let pattern = line.strip_prefix('!').ok_or_else(|| format_error(idx + 2))?;
            patterns.push(pattern.trim().to_string());
        }

        Ok(Self { patterns })
    }

    /// Load the ignore file from `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        if !path.is_file() {
            return Err(FingerprintError::MissingIgnoreFile { path });
        }
        let content = fs::read_to_string(&path).map_err(io_error(&path))?;
        Self::parse(&content, &path)
    }
}

/// Outcome of a fingerprint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Hex SHA-1 digest
    pub digest: String,
    /// Sorted tracked paths, relative to the build root
    pub files: Vec<String>,
    /// Cache file consulted and possibly rewritten
    pub cache_file: PathBuf,
    /// Whether the digest was recomputed rather than served from cache
    pub recomputed: bool,
}

/// Computes and caches the content fingerprint of a build context.
#[derive(Debug)]
pub struct ContextFingerprinter {
    root: PathBuf,
    cache_file: PathBuf,
    files_hashed: usize,
}

impl ContextFingerprinter {
    /// Create a fingerprinter for the context rooted at `root`. A relative
    /// `cache_file` is resolved against `root`.
    pub fn new(root: impl Into<PathBuf>, cache_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        let cache_file = if cache_file.as_ref().is_absolute() {
            cache_file.as_ref().to_path_buf()
        } else {
            root.join(cache_file)
        };
        Self {
            root,
            cache_file,
            files_hashed: 0,
        }
    }

    /// Number of files read for hashing since this fingerprinter was created.
    pub fn files_hashed(&self) -> usize {
        self.files_hashed
    }

    /// Cache file location.
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Expand the ignore file into the sorted list of tracked regular files.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let ignore = IgnoreFile::load(&self.root)?;
        let root_str = self
            .root
            .to_str()
            .ok_or_else(|| FingerprintError::NonUtf8Root(self.root.clone()))?;
        let root_glob = glob::Pattern::escape(root_str);

        let mut candidates: Vec<PathBuf> = vec![
            self.root.join(IMAGE_DEFINITION),
            self.root.join(IGNORE_FILE),
        ];

        for pattern in &ignore.patterns {
            let full = format!("{}/{}", root_glob.trim_end_matches('/'), pattern);
            let paths = glob::glob(&full).map_err(|source| FingerprintError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            // Unreadable entries are skipped, as a shell glob would
            candidates.extend(paths.filter_map(|entry| entry.ok()));
        }

        let mut files = BTreeSet::new();
        for candidate in candidates {
            if candidate.is_dir() {
                for entry in WalkDir::new(&candidate) {
                    let entry = entry?;
                    if entry.path().is_file() {
                        files.insert(self.relative(entry.path()));
                    }
                }
            } else if candidate.is_file() {
                files.insert(self.relative(&candidate));
            }
        }

        Ok(files.into_iter().collect())
    }

    /// Whether the cache must be recomputed for `files`.
    pub fn is_dirty(&self, files: &[String]) -> Result<bool> {
        let Some((record, cache_mtime)) = CacheRecord::load(&self.cache_file)? else {
            debug!("Fingerprint cache {:?} missing", self.cache_file);
            return Ok(true);
        };

        if record.files != files {
            debug!("Fingerprint cache {:?} tracks a different file set", self.cache_file);
            return Ok(true);
        }

        for file in files {
            let path = self.root.join(file);
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .map_err(io_error(&path))?;
            if modified > cache_mtime {
                debug!("{} is newer than the fingerprint cache", file);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Return the context fingerprint, recomputing and republishing the cache
    /// only when it is dirty.
    pub fn fingerprint(&mut self) -> Result<Fingerprint> {
        let files = self.tracked_files()?;

        if !self.is_dirty(&files)? {
            if let Some((record, _)) = CacheRecord::load(&self.cache_file)? {
                debug!("Using cached build context fingerprint {}", record.digest);
                return Ok(Fingerprint {
                    digest: record.digest,
                    files,
                    cache_file: self.cache_file.clone(),
                    recomputed: false,
                });
            }
        }

        info!("Hashing {} build context files", files.len());
        let digest = hash_files(&self.root, &files)?;
        self.files_hashed += files.len();

        let record = CacheRecord {
            digest: digest.clone(),
            files: files.clone(),
        };
        record.store(&self.cache_file)?;

        Ok(Fingerprint {
            digest,
            files,
            cache_file: self.cache_file.clone(),
            recomputed: true,
        })
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Streaming SHA-1 over the contents of `files` (relative to `root`) in the
/// given order.
pub fn hash_files(root: &Path, files: &[String]) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    for file in files {
        let path = root.join(file);
        let mut handle = File::open(&path).map_err(io_error(&path))?;
        loop {
            let read = handle.read(&mut buffer).map_err(io_error(&path))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
