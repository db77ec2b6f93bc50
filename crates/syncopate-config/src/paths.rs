// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result};

/// Resolved filesystem locations used by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub global_config: PathBuf,
    pub syncs_dir: PathBuf,
}

impl ConfigPaths {
    /// Default layout under the user's home directory (`~/.syncopate`).
    pub fn default_locations() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::from_base_dir(home.join(".syncopate")))
    }

    /// Construct the layout rooted at `base_dir`.
    pub fn from_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            global_config: base_dir.join("config.yml"),
            syncs_dir: base_dir.join("syncs"),
            base_dir,
        }
    }

    /// Default directory for sync state files.
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    /// Default directory for user-defined templates.
    pub fn templates_dir(&self) -> PathBuf {
        self.base_dir.join("templates")
    }

    /// Default directory for uploaded assets (e.g. cover images).
    pub fn assets_dir(&self) -> PathBuf {
        self.base_dir.join("assets")
    }

    /// Default IPC socket location.
    pub fn ipc_socket(&self) -> PathBuf {
        self.base_dir.join("ipc.sock")
    }

    /// Anchor a possibly-relative path at the base directory.
    pub fn resolve(&self, candidate: &Path) -> PathBuf {
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_base_dir() {
        let paths = ConfigPaths::from_base_dir("/srv/syncopate");
        assert_eq!(paths.global_config, PathBuf::from("/srv/syncopate/config.yml"));
        assert_eq!(paths.syncs_dir, PathBuf::from("/srv/syncopate/syncs"));
        assert_eq!(paths.state_dir(), PathBuf::from("/srv/syncopate/state"));
        assert_eq!(paths.ipc_socket(), PathBuf::from("/srv/syncopate/ipc.sock"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let paths = ConfigPaths::from_base_dir("/srv/syncopate");
        assert_eq!(paths.resolve(Path::new("/etc/x")), PathBuf::from("/etc/x"));
        assert_eq!(
            paths.resolve(Path::new("assets/a.png")),
            PathBuf::from("/srv/syncopate/assets/a.png")
        );
    }
}
