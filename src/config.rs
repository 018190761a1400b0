//! Repository-level configuration (`sheetbranch.toml`).
//!
//! Parsed with `serde` + `toml`, in the shape of the codebase's existing
//! `ManifoldConfig`: missing file → defaults, no error; unknown fields are
//! rejected so typos in the config surface immediately.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Top-level `SheetBranchConfig`.
///
/// Covers the two knobs `spec.md` §4.8/§4.9 leave to the implementer: the
/// snapshot policy's thresholds, and the move-detector's opt-out.
#[derive(Clone, Debug, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SheetBranchConfig {
    /// Snapshot policy settings (§4.8).
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Merge engine settings (§4.5).
    #[serde(default)]
    pub merge: MergeConfig,
}

/// Snapshot policy thresholds (§4.8).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Snapshot once a commit's distance from the nearest ancestor snapshot
    /// reaches this many commits.
    #[serde(default = "default_snapshot_distance")]
    pub distance_threshold: u32,

    /// Snapshot once a commit's serialized patch exceeds this many bytes.
    #[serde(default = "default_snapshot_bytes")]
    pub byte_threshold: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { distance_threshold: default_snapshot_distance(), byte_threshold: default_snapshot_bytes() }
    }
}

const fn default_snapshot_distance() -> u32 {
    50
}

const fn default_snapshot_bytes() -> u64 {
    4096
}

/// Merge engine settings (§4.5).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// When `false`, the merge engine treats every cell as appearing or
    /// disappearing in place rather than running move detection (§4.3);
    /// conflicts then fall back to plain delete-vs-edit handling.
    #[serde(default = "default_move_detection")]
    pub move_detection: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { move_detection: default_move_detection() }
    }
}

const fn default_move_detection() -> bool {
    true
}

/// Error loading a `SheetBranchConfig`.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded, if any.
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl SheetBranchConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields all defaults, not an error.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on I/O errors (other than not-found) or
    /// parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError { path: Some(path.to_owned()), message: format!("could not read file: {e}") }),
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError { path: None, message }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = SheetBranchConfig::default();
        assert_eq!(cfg.snapshot.distance_threshold, 50);
        assert_eq!(cfg.snapshot.byte_threshold, 4096);
        assert!(cfg.merge.move_detection);
    }

    #[test]
    fn missing_file_is_default_not_error() {
        let cfg = SheetBranchConfig::load(Path::new("/nonexistent/sheetbranch.toml")).unwrap();
        assert_eq!(cfg, SheetBranchConfig::default());
    }

    #[test]
    fn parses_partial_overrides() {
        let cfg = SheetBranchConfig::parse("[snapshot]\ndistance_threshold = 10\n").unwrap();
        assert_eq!(cfg.snapshot.distance_threshold, 10);
        assert_eq!(cfg.snapshot.byte_threshold, 4096);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = SheetBranchConfig::parse("bogus = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_reports_line() {
        let result = SheetBranchConfig::parse("not valid toml [[[");
        let err = result.unwrap_err();
        assert!(err.message.contains("line"));
    }

    #[test]
    fn config_error_display_with_path() {
        let err = ConfigError { path: Some(std::path::PathBuf::from("sheetbranch.toml")), message: "bad field".to_owned() };
        assert_eq!(format!("{err}"), "sheetbranch.toml: bad field");
    }
}
