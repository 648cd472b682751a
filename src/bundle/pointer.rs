//! Persisted fallback pointer.
//!
//! A single directory path, written atomically through tmp+rename so a
//! crash never leaves a torn value behind.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File holding the last-known-good bundle directory.
#[derive(Debug, Clone)]
pub struct FallbackPointer {
    path: PathBuf,
}

impl FallbackPointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the pointer. `Ok(None)` if it was never written.
    pub fn load(&self) -> io::Result<Option<PathBuf>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(PathBuf::from(trimmed)))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Point at `dir`.
    pub fn store(&self, dir: &Path) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(dir.to_string_lossy().as_bytes())?;
        f.write_all(b"\n")?;
        f.sync_all()?;

        fs::rename(&tmp, &self.path)
    }
}
