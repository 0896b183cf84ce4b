//! Destinations for converted files.
//!
//! The browser version of this flow triggered a download; here a
//! [`ResultSink`] decides where the bytes end up.

use crate::error::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Receives converted files, both on auto-save and on explicit download.
///
/// Sinks never replace an earlier result: when `file_name` is taken they
/// store under the next free name (`report (1).pdf`, `report (2).pdf`, …)
/// and return where the bytes actually went.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist `bytes` under `file_name` (or a free variant of it) and
    /// return where they went.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, Error>;
}

/// Give up looking for a free name after this many attempts.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// `n`-th candidate for `base`: `base` itself, then `stem (n).ext`.
fn numbered_name(base: &str, n: u32) -> String {
    if n == 0 {
        return base.to_string();
    }
    match base.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({}){}", &base[..idx], n, &base[idx..]),
        _ => format!("{base} ({n})"),
    }
}

/// Writes results into a directory.
///
/// Writes are atomic (temp file + rename) so a crash never leaves a
/// truncated document behind. A target name is reserved with
/// `create_new` before the rename, so concurrent writers never pick the
/// same name either.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty file at the first free candidate name.
    async fn reserve(&self, base: &str) -> Result<PathBuf, Error> {
        for n in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(numbered_name(base, n));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::SaveFailed { path, source: e }),
            }
        }
        let path = self.dir.join(base);
        Err(Error::SaveFailed {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free file name left",
            ),
        })
    }
}

#[async_trait]
impl ResultSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
        // Only the final path component is used; names may come from a server.
        let base = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "converted-file".to_string());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::SaveFailed {
                path: self.dir.join(&base),
                source: e,
            })?;

        let path = self.reserve(&base).await?;
        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".part");
        let tmp_path = PathBuf::from(tmp_name);

        let written = match tokio::fs::write(&tmp_path, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            let _ = tokio::fs::remove_file(&path).await;
            return Err(Error::SaveFailed { path, source: e });
        }

        debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }
}

/// Keeps results in memory, keyed by file name.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(file_name).cloned())
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::Internal("memory sink lock poisoned".into()))?;
        let name = (0..MAX_NAME_ATTEMPTS)
            .map(|n| numbered_name(file_name, n))
            .find(|candidate| !files.contains_key(candidate))
            .ok_or_else(|| Error::Internal(format!("no free name for '{file_name}'")))?;
        files.insert(name.clone(), bytes.to_vec());
        Ok(PathBuf::from(name))
    }
}
