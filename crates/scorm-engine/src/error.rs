//! Error types for the SCORM engine.
//!
//! Ingestion errors ([`ParseError`], [`ResolveError`]) reject a whole package:
//! there is no partially ingested state. [`AttemptError`] rejects a single
//! runtime call and leaves the learner's prior attempt state untouched.
//! [`ScormError`] wraps all of them together with configuration, package
//! source and persistence failures.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attempt::CompletionStatus;

/// A specialized `Result` type for SCORM engine operations.
pub type Result<T> = std::result::Result<T, ScormError>;

/// A 1-based line/column location inside a manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1.
    pub column: u32,
}

impl TextPosition {
    /// Creates a position from a line and column.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The manifest could not be turned into a [`crate::Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A required element (`manifest`, `organizations`, `resources`) is absent.
    #[error("manifest is missing required section <{0}>")]
    MissingSection(String),

    /// The document is not well-formed XML or not valid UTF-8.
    #[error("malformed manifest XML at {0}: {1}")]
    Malformed(TextPosition, String),

    /// An item carries a prerequisite expression that does not parse.
    #[error("item '{item}' has an invalid prerequisite expression: {reason}")]
    InvalidPrerequisite {
        /// Identifier of the item declaring the expression.
        item: String,
        /// Why the expression was rejected.
        reason: String,
    },
}

/// Items could not be matched to their resources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// An item's `identifierref` names a resource that does not exist.
    #[error("item '{item_id}' references missing resource '{resource_ref}'")]
    DanglingReference {
        /// The referencing item.
        item_id: String,
        /// The resource identifier that could not be found.
        resource_ref: String,
    },

    /// A SCO resource declares an empty `href`.
    #[error("SCO resource '{0}' has an empty launch href")]
    EmptyLaunchTarget(String),
}

/// A runtime call was rejected. The attempt record is unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError {
    /// Reported score is outside 0-100 or not a finite number.
    #[error("score {0} is outside the range 0-100")]
    InvalidScore(f64),

    /// Completion status would move backwards without re-attempts enabled.
    #[error("completion status of '{sco_id}' cannot move from {from} to {to}")]
    IllegalRegression {
        /// The SCO whose record was targeted.
        sco_id: String,
        /// Status currently stored.
        from: CompletionStatus,
        /// Status that was reported.
        to: CompletionStatus,
    },

    /// A commit arrived for a SCO that was never launched.
    #[error("no session has been started for '{0}'")]
    NotStarted(String),

    /// The SCO is an asset and cannot be tracked.
    #[error("'{0}' is not a launchable SCO")]
    NotLaunchable(String),

    /// The SCO's prerequisites are not met yet.
    #[error("'{0}' is locked until its prerequisites are met")]
    Locked(String),

    /// A data model element outside the supported CMI vocabulary.
    #[error("unsupported data model element '{0}'")]
    UnsupportedElement(String),

    /// A data model element carried a value outside its vocabulary or range.
    #[error("invalid value '{value}' for {element}: {reason}")]
    InvalidValue {
        /// The CMI element name.
        element: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors that can occur anywhere in the engine.
///
/// Variants are organized by subsystem and include actionable suggestions
/// where possible.
#[derive(Debug, thiserror::Error)]
pub enum ScormError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your scorm.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Ingestion Errors
    // ========================================================================
    /// The manifest could not be parsed.
    #[error("Package rejected: {0}\n\nSuggestion: Fix imsmanifest.xml and upload the package again")]
    Parse(#[from] ParseError),

    /// Items could not be resolved against resources.
    #[error("Package rejected: {0}\n\nSuggestion: Check that every identifierref matches a resource and that the archive was uploaded completely")]
    Resolve(#[from] ResolveError),

    // ========================================================================
    // Package Source Errors
    // ========================================================================
    /// No manifest exists for the package reference.
    #[error("Manifest not found: '{path}'\n\nSuggestion: Point at an extracted package directory containing imsmanifest.xml")]
    ManifestNotFound {
        /// Where the manifest was expected.
        path: PathBuf,
    },

    /// The manifest exceeds the configured size limit.
    #[error("Manifest exceeds size limit ({limit_bytes} bytes): '{path}' is {size_bytes} bytes\n\nSuggestion: Raise maxManifestBytes in scorm.json if the package is trusted")]
    ManifestTooLarge {
        /// Path to the oversized manifest.
        path: PathBuf,
        /// Actual size in bytes.
        size_bytes: u64,
        /// Configured limit in bytes.
        limit_bytes: u64,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// A runtime call was rejected.
    #[error("Commit rejected: {0}\n\nSuggestion: Correct the reported values and commit again")]
    Attempt(#[from] AttemptError),

    /// No package is registered under this identifier.
    #[error("Unknown package: '{package_id}'")]
    UnknownPackage {
        /// The requested package identifier.
        package_id: String,
    },

    /// The package has no SCO with this identifier.
    #[error("Unknown SCO '{sco_id}' in package '{package_id}'")]
    UnknownSco {
        /// The package that was searched.
        package_id: String,
        /// The requested SCO identifier.
        sco_id: String,
    },

    /// The package failed validation and cannot be launched.
    #[error("Package '{package_id}' failed validation with {errors} error(s)\n\nSuggestion: Review the validation report, fix the manifest and ingest it again")]
    PackageInactive {
        /// The inactive package.
        package_id: String,
        /// Number of validation errors.
        errors: usize,
    },

    /// A learner or package identifier cannot be used as a storage key.
    #[error("Invalid {kind} identifier '{value}'\n\nSuggestion: Use letters, digits, '.', '_', '-' or '@' only")]
    InvalidKey {
        /// Which identifier was rejected (`learner` or `package`).
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// A stored attempt document is not valid JSON.
    #[error("Corrupted attempt store file '{path}': {message}\n\nSuggestion: Restore the file from backup or remove it to reset the learner's progress")]
    StoreCorrupted {
        /// Path to the corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// Failed to write a report to disk.
    #[error("Failed to write report to '{path}': {message}\n\nSuggestion: Check write permissions and available disk space")]
    ReportWriteError {
        /// Path where the report was to be written.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScormError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ManifestNotFound` error.
    #[must_use]
    pub fn manifest_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ManifestNotFound { path: path.into() }
    }

    /// Creates a new `ManifestTooLarge` error.
    #[must_use]
    pub fn manifest_too_large(path: impl Into<PathBuf>, size_bytes: u64, limit_bytes: u64) -> Self {
        Self::ManifestTooLarge {
            path: path.into(),
            size_bytes,
            limit_bytes,
        }
    }

    /// Creates a new `UnknownPackage` error.
    #[must_use]
    pub fn unknown_package(package_id: impl Into<String>) -> Self {
        Self::UnknownPackage {
            package_id: package_id.into(),
        }
    }

    /// Creates a new `UnknownSco` error.
    #[must_use]
    pub fn unknown_sco(package_id: impl Into<String>, sco_id: impl Into<String>) -> Self {
        Self::UnknownSco {
            package_id: package_id.into(),
            sco_id: sco_id.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidKey {
            kind,
            value: value.into(),
        }
    }

    /// Creates a new `StoreCorrupted` error.
    #[must_use]
    pub fn store_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ReportWriteError`.
    #[must_use]
    pub fn report_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ReportWriteError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error rejects a package or stops the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::Parse(_)
                | Self::Resolve(_)
                | Self::ManifestNotFound { .. }
                | Self::ManifestTooLarge { .. }
                | Self::StoreCorrupted { .. }
        )
    }

    /// Returns `true` if this error rejects a single runtime call.
    ///
    /// Rejections leave stored state untouched; the caller corrects its
    /// request and tries again.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Attempt(_)
                | Self::UnknownPackage { .. }
                | Self::UnknownSco { .. }
                | Self::PackageInactive { .. }
                | Self::InvalidKey { .. }
        )
    }
}
