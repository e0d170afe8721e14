use core::fmt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Resolves the directory holding the server executable.
pub trait BinaryLocator: fmt::Debug + Send + Sync {
    fn locate(&self, executable: &str) -> Result<PathBuf, Error>;
}

/// Looks the executable up in a search path, `$PATH` by default.
#[derive(Debug, Clone, Default)]
pub struct SearchPathLocator {
    paths: Option<OsString>,
}

impl SearchPathLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches `paths` (same syntax as `$PATH`) instead of the process environment.
    pub fn with_paths(paths: impl Into<OsString>) -> Self {
        Self {
            paths: Some(paths.into()),
        }
    }
}

impl BinaryLocator for SearchPathLocator {
    fn locate(&self, executable: &str) -> Result<PathBuf, Error> {
        let found = match &self.paths {
            Some(paths) => std::env::current_dir()
                .ok()
                .and_then(|cwd| which::which_in(executable, Some(paths), cwd).ok()),
            None => which::which(executable).ok(),
        };

        found
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::ExecutableNotFound {
                executable: executable.to_owned(),
            })
    }
}

/// Always answers with the same directory, as long as it actually holds the executable.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    dir: PathBuf,
}

impl FixedLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BinaryLocator for FixedLocator {
    fn locate(&self, executable: &str) -> Result<PathBuf, Error> {
        if self.dir.join(executable).is_file() {
            Ok(self.dir.clone())
        } else {
            Err(Error::ExecutableNotFound {
                executable: executable.to_owned(),
            })
        }
    }
}
