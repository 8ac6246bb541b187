//! Settings file and endpoint policy.
//!
//! The settings file is a JSON array, one entry per space:
//!
//! ```json
//! [
//!   { "id": "bio", "scmFile": "data/bio.scm" },
//!   { "id": "chem", "pathDir": "data/chem" }
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// One settings file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub id: String,
    /// Single knowledge file to load.
    #[serde(rename = "scmFile", default, skip_serializing_if = "Option::is_none")]
    pub scm_file: Option<PathBuf>,
    /// Directory whose files are all loaded into the space.
    #[serde(rename = "pathDir", default, skip_serializing_if = "Option::is_none")]
    pub path_dir: Option<PathBuf>,
}

/// Where a space's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceSource {
    File(PathBuf),
    Directory(PathBuf),
}

impl SpaceEntry {
    pub fn file(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            scm_file: Some(path.into()),
            path_dir: None,
        }
    }

    pub fn directory(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            scm_file: None,
            path_dir: Some(path.into()),
        }
    }

    /// Resolve the entry's source. `scmFile` takes precedence when both are set.
    pub fn source(&self) -> HubResult<SpaceSource> {
        match (&self.scm_file, &self.path_dir) {
            (Some(file), _) => Ok(SpaceSource::File(file.clone())),
            (None, Some(dir)) => Ok(SpaceSource::Directory(dir.clone())),
            (None, None) => Err(HubError::Config {
                message: format!("entry \"{}\" has neither scmFile nor pathDir", self.id),
            }),
        }
    }
}

/// Read and parse a settings file.
pub fn load_settings(path: &Path) -> HubResult<Vec<SpaceEntry>> {
    if !path.is_file() {
        return Err(HubError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| HubError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_settings(&content)
}

/// Parse settings from JSON text.
pub fn parse_settings(content: &str) -> HubResult<Vec<SpaceEntry>> {
    serde_json::from_str(content).map_err(|e| HubError::Config {
        message: e.to_string(),
    })
}

/// Per-endpoint connection policy, uniform across all spaces.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted inbound message, in bytes.
    pub max_payload: usize,
    /// Close connections with no inbound traffic for this long.
    pub idle_timeout: Option<Duration>,
    /// Queued-but-unsent bytes above which result emission pauses.
    pub max_backpressure: usize,
    /// How long a paused connection may take to drain before it is closed.
    pub drain_timeout: Duration,
    /// Bound on waiting for a deferred query stream. `None` waits forever.
    pub query_timeout: Option<Duration>,
    /// Request permessage-deflate.
    pub compression: bool,
}

impl ServerConfig {
    /// Convert a seconds value where 0 means "disabled".
    pub fn secs_or_none(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_payload: 16 * 1024 * 1024,
            idle_timeout: None,
            max_backpressure: 1024 * 1024,
            drain_timeout: Duration::from_secs(10),
            query_timeout: None,
            compression: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_entries() {
        let entries = parse_settings(
            r#"[
                {"id": "bio", "scmFile": "bio.scm"},
                {"id": "chem", "pathDir": "chem/"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                SpaceEntry::file("bio", "bio.scm"),
                SpaceEntry::directory("chem", "chem/"),
            ]
        );
        assert_eq!(
            entries[1].source().unwrap(),
            SpaceSource::Directory("chem/".into())
        );
    }

    #[test]
    fn file_wins_over_directory() {
        let entry = SpaceEntry {
            id: "x".into(),
            scm_file: Some("x.scm".into()),
            path_dir: Some("x/".into()),
        };
        assert_eq!(entry.source().unwrap(), SpaceSource::File("x.scm".into()));
    }

    #[test]
    fn entry_without_source_is_a_config_error() {
        let entries = parse_settings(r#"[{"id": "empty"}]"#).unwrap();
        assert!(matches!(entries[0].source(), Err(HubError::Config { .. })));
    }

    #[test]
    fn malformed_json_and_missing_id() {
        assert!(matches!(parse_settings("{"), Err(HubError::Config { .. })));
        assert!(matches!(
            parse_settings(r#"[{"scmFile": "a.scm"}]"#),
            Err(HubError::Config { .. })
        ));
    }

    #[test]
    fn missing_settings_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_settings(&dir.path().join("settings.json")).unwrap_err();
        assert!(matches!(err, HubError::FileNotFound { .. }));
    }

    #[test]
    fn zero_seconds_disables() {
        assert_eq!(ServerConfig::secs_or_none(0), None);
        assert_eq!(ServerConfig::secs_or_none(3), Some(Duration::from_secs(3)));
    }
}
