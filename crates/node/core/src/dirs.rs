//! Data directory layout.

use crate::args::DataDirArgs;
use directories::ProjectDirs;
use eyre::{Result, WrapErr};
use std::{fs, path::PathBuf};

/// Returns the default project directories for ember.
pub fn default_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "ember", "ember")
}

/// Returns the default data directory path.
pub fn default_data_dir() -> Option<PathBuf> {
    default_project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Paths under one node's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    pub root: PathBuf,
}

impl DataDirs {
    /// Resolve the data directory from `args`, creating it if needed.
    pub fn new(args: &DataDirArgs) -> Result<Self> {
        let root = args
            .datadir
            .clone()
            .unwrap_or_else(|| default_data_dir().unwrap_or_else(|| PathBuf::from(".ember")));

        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create directory {}", root.display()))?;

        Ok(Self { root })
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keystore")
    }

    /// Generated keystore password, used when none is supplied.
    pub fn password_file(&self) -> PathBuf {
        self.root.join("password")
    }

    pub fn channel_db_file(&self) -> PathBuf {
        self.root.join("channels.toml")
    }
}
