//! Configuration for package ingestion and the learner runtime.
//!
//! Settings live in a `scorm.json` file next to the packages. Every key is
//! optional; a missing file yields the validated defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attempt::MAX_SUSPEND_DATA_BYTES;
use crate::error::{Result, ScormError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "scorm.json";

/// Default suspend data limit in bytes.
const fn default_suspend_data_limit() -> usize {
    MAX_SUSPEND_DATA_BYTES
}

/// Default maximum manifest size (10 MiB).
const fn default_max_manifest_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Default directory for persisted learner attempts.
fn default_attempt_store_dir() -> String {
    ".scorm/attempts".to_string()
}

/// Default output directory for reports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default number of learner/package attempt sets kept in memory.
const fn default_max_cached_learners() -> usize {
    1024
}

/// Default HTTP port.
const fn default_port() -> u16 {
    3000
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Start a new attempt when a report would regress completion,
    /// instead of rejecting it.
    #[serde(default)]
    pub allow_reattempts: bool,

    /// Maximum stored suspend data in bytes. Longer data is truncated.
    #[serde(default = "default_suspend_data_limit")]
    pub suspend_data_limit: usize,

    /// Refuse to start a session on a locked SCO the learner never attempted.
    #[serde(default = "default_true")]
    pub enforce_prerequisites_on_launch: bool,

    /// How the SCORM edition of a manifest is determined.
    #[serde(default)]
    pub schema_detection: SchemaDetection,

    /// Largest manifest file accepted from a package source.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: u64,

    /// Directory of the JSON attempt store.
    #[serde(default = "default_attempt_store_dir")]
    pub attempt_store_dir: String,

    /// Output directory for generated reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Learner/package attempt sets the runtime keeps in memory. Idle
    /// ones beyond this are dropped and reloaded from the store on demand.
    #[serde(default = "default_max_cached_learners")]
    pub max_cached_learners: usize,

    /// Port of the HTTP runtime.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_reattempts: false,
            suspend_data_limit: default_suspend_data_limit(),
            enforce_prerequisites_on_launch: default_true(),
            schema_detection: SchemaDetection::default(),
            max_manifest_bytes: default_max_manifest_bytes(),
            attempt_store_dir: default_attempt_store_dir(),
            output_dir: default_output_dir(),
            max_cached_learners: default_max_cached_learners(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `scorm.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ScormError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `scorm.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ScormError::ConfigParseError` if the file cannot be read or
    /// holds invalid JSON, and `ScormError::ConfigValidationError` if a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ScormError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ScormError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ScormError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.suspend_data_limit == 0 || self.suspend_data_limit > MAX_SUSPEND_DATA_BYTES {
            return Err(ScormError::config_validation(
                format!(
                    "suspendDataLimit must be between 1 and {MAX_SUSPEND_DATA_BYTES}, got {}",
                    self.suspend_data_limit
                ),
                format!("Set suspendDataLimit to at most {MAX_SUSPEND_DATA_BYTES} in your scorm.json"),
            ));
        }
        if self.max_manifest_bytes == 0 {
            return Err(ScormError::config_validation(
                "maxManifestBytes must be greater than 0",
                "Remove maxManifestBytes from your scorm.json to use the 10 MiB default",
            ));
        }
        if self.attempt_store_dir.trim().is_empty() {
            return Err(ScormError::config_validation(
                "attemptStoreDir must not be empty",
                "Provide a directory for learner attempts in your scorm.json",
            ));
        }
        if self.output_dir.trim().is_empty() {
            return Err(ScormError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your scorm.json (use '.' for current directory)",
            ));
        }
        if self.max_cached_learners == 0 {
            return Err(ScormError::config_validation(
                "maxCachedLearners must be greater than 0",
                "Remove maxCachedLearners from your scorm.json to use the default of 1024",
            ));
        }
        if self.port == 0 {
            return Err(ScormError::config_validation(
                "port must be greater than 0",
                "Set port to a free TCP port in your scorm.json",
            ));
        }
        Ok(())
    }
}

/// How the SCORM edition of a manifest is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaDetection {
    /// Inspect namespaces, `schemaversion` and sequencing elements (default).
    #[default]
    Auto,
    /// Treat every manifest as SCORM 1.2.
    Scorm12,
    /// Treat every manifest as SCORM 2004.
    Scorm2004,
}

impl SchemaDetection {
    /// Parses a string into a `SchemaDetection`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "scorm12" => Some(Self::Scorm12),
            "scorm2004" => Some(Self::Scorm2004),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for SchemaDetection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid schema detection '{s}': expected one of 'auto', 'scorm12', 'scorm2004'"
            ))
        })
    }
}

impl Serialize for SchemaDetection {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Auto => "auto",
            Self::Scorm12 => "scorm12",
            Self::Scorm2004 => "scorm2004",
        };
        serializer.serialize_str(s)
    }
}
