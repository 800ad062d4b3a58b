//! Where `use` and the environment read script sources from.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

pub trait SourceLoader: Send + Sync {
    fn read(&self, name: &str) -> io::Result<String>;
}

/// Reads files relative to a base directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    base: PathBuf,
}

impl FsLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl Default for FsLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SourceLoader for FsLoader {
    fn read(&self, name: &str) -> io::Result<String> {
        std::fs::read_to_string(self.base.join(name))
    }
}

/// In-memory sources keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<String, String>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.files.insert(name.to_string(), source.to_string());
    }
}

impl SourceLoader for MemoryLoader {
    fn read(&self, name: &str) -> io::Result<String> {
        self.files.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no source named '{name}'"))
        })
    }
}

/// Namespace label for a loaded file: its stem.
#[must_use]
pub fn label_for(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}
