//! Filesystem port used by the orchestrator.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub trait FileSystem {
    fn ensure_directory(&self, path: &Path) -> Result<()>;
    fn path_exists(&self, path: &Path) -> bool;
}

pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn ensure_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create {}", path.display()))
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
