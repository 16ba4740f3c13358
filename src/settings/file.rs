//! YAML file settings store.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{SettingsError, SettingsRecord, SettingsStore};

/// Settings kept in a YAML file, replaced atomically on save.
#[derive(Clone, Debug)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for FileSettings {
    fn save(&mut self, record: &SettingsRecord) -> Result<(), SettingsError> {
        let yaml = serde_yaml::to_string(record)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, yaml).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), role = ?record.role, "Settings saved");
        Ok(())
    }

    fn restore(&self) -> Result<SettingsRecord, SettingsError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SettingsError::NotFound);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    fn clear(&mut self) -> Result<(), SettingsError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
