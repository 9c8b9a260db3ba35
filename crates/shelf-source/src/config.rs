//! Source configuration, loadable from a TOML file.
//!
//! ```toml
//! uuid = "shelf"
//! data_path = "/var/lib/shelf/bookmarks.json"
//! check_duplicates = true
//! event_capacity = 64
//! ```
//!
//! Missing fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};

/// Default source UUID, the prefix of every object id.
pub const DEFAULT_UUID: &str = "shelf";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Prefix of every object id this source hands out.
    pub uuid: String,
    /// Snapshot file used by file-backed stores.
    pub data_path: PathBuf,
    /// Skip bootstrap entries whose URI is already stored.
    pub check_duplicates: bool,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uuid: DEFAULT_UUID.to_string(),
            data_path: PathBuf::from("shelf.json"),
            check_duplicates: true,
            event_capacity: 64,
        }
    }
}

impl SourceConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> SourceResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SourceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> SourceResult<String> {
        toml::to_string_pretty(self).map_err(|e| SourceError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SourceResult<()> {
        if self.uuid.is_empty() {
            return Err(SourceError::Config("uuid must not be empty".into()));
        }
        if self.uuid.contains("::") {
            return Err(SourceError::Config(format!(
                "uuid {:?} must not contain \"::\"",
                self.uuid
            )));
        }
        if self.event_capacity == 0 {
            return Err(SourceError::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = SourceConfig::default();
        assert_eq!(c.uuid, "shelf");
        assert_eq!(c.data_path, PathBuf::from("shelf.json"));
        assert!(c.check_duplicates);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let c = SourceConfig::from_toml_str("uuid = \"radio\"").unwrap();
        assert_eq!(c.uuid, "radio");
        assert_eq!(c.event_capacity, 64);
    }

    #[test]
    fn invalid_uuid_rejected() {
        assert!(SourceConfig::from_toml_str("uuid = \"\"").is_err());
        assert!(SourceConfig::from_toml_str("uuid = \"a::b\"").is_err());
        assert!(SourceConfig::from_toml_str("uuid = 5").is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        let config = SourceConfig {
            uuid: "radio".into(),
            check_duplicates: false,
            ..SourceConfig::default()
        };
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(SourceConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = SourceConfig::from_file(Path::new("/nonexistent/shelf.toml")).unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }
}
