// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::Path;

use crate::{ConfigError, ConfigPaths, GlobalConfig, Result};

/// Summary of files and directories created during initialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub base_created: bool,
    pub state_dir_created: bool,
    pub syncs_dir_created: bool,
    pub templates_dir_created: bool,
    pub assets_dir_created: bool,
    pub global_config_created: bool,
    pub global_config_overwritten: bool,
}

/// Ensure the configuration tree exists. With `overwrite` the global config
/// file is re-written even if present.
pub fn bootstrap(paths: &ConfigPaths, overwrite: bool) -> Result<BootstrapReport> {
    let mut report = BootstrapReport {
        base_created: ensure_dir(&paths.base_dir)?,
        state_dir_created: ensure_dir(&paths.state_dir())?,
        syncs_dir_created: ensure_dir(&paths.syncs_dir)?,
        templates_dir_created: ensure_dir(&paths.templates_dir())?,
        assets_dir_created: ensure_dir(&paths.assets_dir())?,
        ..Default::default()
    };

    let existing = paths.global_config.exists();
    if !existing || overwrite {
        let defaults = GlobalConfig::defaults_for(paths);
        let raw = serde_yaml::to_string(&defaults).map_err(|source| ConfigError::Yaml {
            path: paths.global_config.clone(),
            source,
        })?;
        fs::write(&paths.global_config, raw).map_err(|source| ConfigError::Io {
            path: paths.global_config.clone(),
            source,
        })?;
        report.global_config_created = true;
        report.global_config_overwritten = existing && overwrite;
    }

    Ok(report)
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::create_dir_all(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_global_config;

    #[test]
    fn creates_tree_and_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base_dir(dir.path().join("home"));

        let report = bootstrap(&paths, false).unwrap();
        assert!(report.base_created);
        assert!(report.syncs_dir_created);
        assert!(report.global_config_created);
        assert!(!report.global_config_overwritten);

        // the generated file round-trips through the loader
        let config = load_global_config(&paths).unwrap();
        assert!(!config.spotify.is_configured());
        assert_eq!(config.runtime.storage_dir, paths.state_dir());
    }

    #[test]
    fn second_run_is_a_noop_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base_dir(dir.path().join("home"));

        bootstrap(&paths, false).unwrap();
        let report = bootstrap(&paths, false).unwrap();
        assert_eq!(report, BootstrapReport::default());

        let overwritten = bootstrap(&paths, true).unwrap();
        assert!(overwritten.global_config_created);
        assert!(overwritten.global_config_overwritten);
    }
}
