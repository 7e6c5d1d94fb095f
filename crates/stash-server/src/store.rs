//! File store scoped to a root directory.
//!
//! Every filesystem-touching command resolves the client-supplied relative
//! path through [`resolve`] first; there is no default-allow path. The
//! resolver is a pure lexical check, so it also covers paths that do not
//! exist yet (upload targets).
//!
//! NIST 800-53: SI-10 (Input Validation), AC-3 (Access Enforcement)

use chrono::{DateTime, Utc};
use stash_core::{Result, StashError};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Canonicalize `requested` against `root`, rejecting any path whose
/// normalized form would escape the root.
///
/// Leading slashes are treated as store-relative (matching the wire
/// protocol, where every path is relative to the shared root). `.` and
/// `..` components are resolved lexically; a `..` that would climb above
/// the root fails with a traversal error.
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf> {
    if requested.contains('\0') {
        warn!("Path contains null bytes: {:?}", requested);
        return Err(StashError::PathTraversal(requested.to_string()));
    }

    let trimmed = requested.trim().trim_start_matches('/');
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => stack.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    warn!("Path traversal attempt detected: {}", requested);
                    return Err(StashError::PathTraversal(requested.to_string()));
                }
            }
            // Prefix / RootDir cannot appear after the leading-slash strip
            // on Unix, but reject them outright rather than assume.
            _ => {
                warn!("Path traversal attempt detected: {}", requested);
                return Err(StashError::PathTraversal(requested.to_string()));
            }
        }
    }

    let mut resolved = root.to_path_buf();
    for part in stack {
        resolved.push(part);
    }
    Ok(resolved)
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Metadata reported by `/info`.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Stateless wrapper over the store root. All operations resolve their
/// path argument before touching the filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List entries of a directory under the root.
    pub async fn list(&self, dir: &str) -> Result<Vec<StoreEntry>> {
        let path = resolve(&self.root, dir)?;
        let mut read_dir = fs::read_dir(&path)
            .await
            .map_err(|_| StashError::NotFound(format!("Directory not found: {}", dir)))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(StoreEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Read a whole file as text. Directories are rejected.
    pub async fn read(&self, file: &str) -> Result<String> {
        let path = resolve(&self.root, file)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| StashError::NotFound(format!("File not found: {}", file)))?;

        if metadata.is_dir() {
            return Err(StashError::Protocol(format!("Not a file: {}", file)));
        }

        let bytes = fs::read(&path).await?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    /// Write a whole file, creating parent directories as needed.
    pub async fn write(&self, file: &str, content: &str) -> Result<()> {
        let path = resolve(&self.root, file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await?;
        debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(())
    }

    /// Delete a file. Missing files are reported, not ignored.
    pub async fn delete(&self, file: &str) -> Result<()> {
        let path = resolve(&self.root, file)?;
        if !fs::try_exists(&path).await? {
            return Err(StashError::NotFound(format!("File not found: {}", file)));
        }
        fs::remove_file(&path).await?;
        Ok(())
    }

    /// Stat a file or directory.
    pub async fn stat(&self, file: &str) -> Result<FileInfo> {
        let path = resolve(&self.root, file)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| StashError::NotFound(format!("File not found: {}", file)))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string());

        Ok(FileInfo {
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Case-insensitive substring match over top-level entry names only.
    pub async fn search(&self, keyword: &str) -> Result<Vec<String>> {
        let needle = keyword.to_lowercase();
        let entries = self.list(".").await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .map(|e| e.name)
            .collect())
    }
}
