//! Backup-target configuration.
//!
//! A YAML file lists the classes of pods to back up:
//!
//! ```yaml
//! backupTypes:
//!   - labelSelector: app.kubernetes.io/name=mariadb
//!     command: mysqldump -u root -p$MARIADB_ROOT_PASSWORD --all-databases
//!     suffix: -all
//!   - labelSelector: app.kubernetes.io/name=postgresql
//!     container: postgresql
//!     command: pg_dumpall -U postgres
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// One class of pods to back up.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackupTarget {
    /// Label selector matching the pods to dump.
    pub label_selector: String,

    /// Container to exec in; defaults to the pod's default container.
    #[serde(default)]
    pub container: Option<String>,

    /// Shell command whose stdout becomes the backup payload.
    pub command: String,

    /// Appended to the pod name in the object key, before the format
    /// extensions.
    #[serde(default)]
    pub suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub backup_types: Vec<BackupTarget>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw)?;
        if config.backup_types.is_empty() {
            return Err(Error::Config("no backupTypes configured".into()));
        }
        Ok(config)
    }
}
