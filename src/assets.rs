//! External script sources on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::ScriptError;

/// A script file plus enough metadata to tell whether it changed since it was last read.
#[derive(Debug, Clone)]
pub struct ScriptAsset {
    path: PathBuf,
    contents: String,
    modified: Option<SystemTime>,
    fingerprint: blake3::Hash,
}

impl ScriptAsset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref().to_path_buf();
        let contents = read(&path)?;
        let modified = fs::metadata(&path).ok().and_then(|meta| meta.modified().ok());
        let fingerprint = blake3::hash(contents.as_bytes());
        Ok(Self { path, contents, modified, fingerprint })
    }

    /// In-memory asset, used when a host is handed source text with a display path.
    pub fn from_source(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        let fingerprint = blake3::hash(contents.as_bytes());
        Self { path: path.into(), contents, modified: None, fingerprint }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn fingerprint(&self) -> blake3::Hash {
        self.fingerprint
    }

    /// Chunk name used for error messages (`@path`, like `luaL_loadfile`).
    pub fn chunk_name(&self) -> String {
        format!("@{}", self.path.display())
    }

    /// Re-reads the file when its modification time moved. Returns `true` only when the content
    /// actually changed; touching a file without editing it is not a change.
    pub fn refresh(&mut self) -> Result<bool, ScriptError> {
        let modified = fs::metadata(&self.path).ok().and_then(|meta| meta.modified().ok());
        if modified.is_some() && modified == self.modified {
            return Ok(false);
        }
        let contents = read(&self.path)?;
        let fingerprint = blake3::hash(contents.as_bytes());
        self.modified = modified;
        if fingerprint == self.fingerprint {
            return Ok(false);
        }
        self.contents = contents;
        self.fingerprint = fingerprint;
        Ok(true)
    }
}

fn read(path: &Path) -> Result<String, ScriptError> {
    fs::read_to_string(path).map_err(|source| ScriptError::Io { path: path.to_path_buf(), source })
}
