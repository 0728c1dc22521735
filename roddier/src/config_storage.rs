//! Named telescope profiles on disk.
//!
//! Profiles are stored as pretty-printed JSON in ~/.roddier/telescopes/ by default.

use std::path::{Path, PathBuf};

use crate::config::TelescopeParams;
use crate::error::{Result, RoddierError};

/// Storage manager for named [`TelescopeParams`] profiles.
#[derive(Debug, Clone)]
pub struct TelescopeStore {
    /// Root directory for all configuration (e.g., ~/.roddier)
    root_path: PathBuf,
}

impl TelescopeStore {
    /// Create a store rooted at ~/.roddier
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        Ok(Self {
            root_path: PathBuf::from(home).join(".roddier"),
        })
    }

    /// Create a store with a custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn telescopes_dir(&self) -> PathBuf {
        self.root_path.join("telescopes")
    }

    fn profile_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RoddierError::InvalidParameter(format!(
                "invalid telescope profile name {name:?}"
            )));
        }
        Ok(self.telescopes_dir().join(format!("{name}.json")))
    }

    /// Load the profile called `name`.
    ///
    /// Returns None if no such profile exists.
    /// Returns Some(Err) if the file exists but cannot be parsed.
    pub fn load(&self, name: &str) -> Option<Result<TelescopeParams>> {
        let path = match self.profile_path(name) {
            Ok(path) => path,
            Err(e) => return Some(Err(e)),
        };
        if !path.exists() {
            return None;
        }
        Some(TelescopeParams::load_from_file(&path))
    }

    /// Validate and save `params` under `name`, returning the file path.
    ///
    /// Creates the telescopes directory if it doesn't exist.
    pub fn save(&self, name: &str, params: &TelescopeParams) -> Result<PathBuf> {
        params.validate()?;
        let path = self.profile_path(name)?;
        std::fs::create_dir_all(self.telescopes_dir())?;
        params.save_to_file(&path)?;
        log::debug!("saved telescope profile {name:?} to {}", path.display());
        Ok(path)
    }

    /// Names of all stored profiles, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.telescopes_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a profile.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.profile_path(name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }
}

impl Default for TelescopeStore {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".roddier")))
    }
}
