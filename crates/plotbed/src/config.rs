//! Application configuration.
//!
//! One JSON document holds everything the console needs. Every section
//! has defaults, so a file only lists what differs:
//!
//! ```json
//! {
//!   "printer": { "url": "http://octopi.local", "api_key": "..." },
//!   "gcode_folder": "gcode",
//!   "trace": { "interior_offset_mm": 4.0 }
//! }
//! ```
//!
//! The configuration is loaded and validated once at startup and then
//! passed around by reference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use plotbed_io::{ArtifactPaths, PacingConfig};
use plotbed_io::camera::DEFAULT_SNAPSHOT_PATH;
use plotbed_pipeline::{PatternConfig, PipelineError, TraceConfig};
use serde::{Deserialize, Serialize};

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Errors from loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A pipeline or sweep parameter is out of range.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Another parameter is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Controller connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// OctoPrint base URL.
    pub url: String,
    /// OctoPrint API key, sent as `X-Api-Key`.
    pub api_key: String,
    /// Per-request timeout (ms).
    pub timeout_ms: u64,
}

impl PrinterConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            url: "http://octopi.local".to_owned(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Everything the console reads from its configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller connection.
    pub printer: PrinterConfig,
    /// Webcam snapshot path on the controller host.
    pub snapshot_path: String,
    /// Folder listed by the send-file menu entry.
    pub gcode_folder: PathBuf,
    /// Where capture artifacts are written.
    pub artifacts: ArtifactPaths,
    /// Capture-to-path parameters.
    pub trace: TraceConfig,
    /// Extrusion sweep parameters.
    pub pattern: PatternConfig,
    /// Motion pacing.
    pub pacing: PacingConfig,
}

impl AppConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and a
    /// validation error for out-of-range values.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// see [`from_json`](Self::from_json).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path` if given. Without a path the default location is
    /// used when it exists, built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.is_file() {
            Self::load(default)
        } else {
            tracing::warn!(path = DEFAULT_CONFIG_PATH, "no configuration file, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trace.validate()?;
        self.pattern.validate()?;
        let url = self.printer.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "printer.url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.printer.timeout_ms == 0 {
            return Err(ConfigError::Invalid("printer.timeout_ms must be positive".into()));
        }
        if !self.snapshot_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "snapshot_path must start with '/', got {:?}",
                self.snapshot_path
            )));
        }
        if self.pacing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pacing.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printer: PrinterConfig::default(),
            snapshot_path: DEFAULT_SNAPSHOT_PATH.to_owned(),
            gcode_folder: PathBuf::from("gcode"),
            artifacts: ArtifactPaths::default(),
            trace: TraceConfig::default(),
            pattern: PatternConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn defaults_survive_serialization() {
        let json = serde_json::to_string_pretty(&AppConfig::default()).unwrap();
        assert_eq!(AppConfig::from_json(&json).unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "printer": { "url": "http://10.0.0.5:5000", "api_key": "abc" },
                "trace": { "interior_offset_mm": 3.5, "motion": { "close_loop": true } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.printer.url, "http://10.0.0.5:5000");
        assert_eq!(config.printer.timeout_ms, 10_000);
        assert!((config.trace.interior_offset_mm - 3.5).abs() < f64::EPSILON);
        assert!(config.trace.motion.close_loop);
        assert_eq!(config.trace.motion.draw_z.to_bits(), 6.0f64.to_bits());
        assert_eq!(config.pattern, PatternConfig::default());
    }

    #[test]
    fn out_of_range_pipeline_value_is_rejected() {
        let err = AppConfig::from_json(r#"{"trace": {"interior_offset_mm": -1.0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Pipeline(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pattern_outside_work_area_is_rejected() {
        let err = AppConfig::from_json(r#"{"pattern": {"start": {"x": 20.0, "y": 15.0}}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Pipeline(_)));
    }

    #[test]
    fn url_must_be_http() {
        let err = AppConfig::from_json(r#"{"printer": {"url": "octopi.local"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("printer.url")));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");
        assert!(matches!(
            AppConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
        std::fs::write(&missing, r#"{"gcode_folder": "jobs"}"#).unwrap();
        let config = AppConfig::resolve(Some(&missing)).unwrap();
        assert_eq!(config.gcode_folder, PathBuf::from("jobs"));
    }
}
