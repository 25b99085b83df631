//! The ingestion pipeline: parse, resolve, build, validate.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::parser::{parse_with, ParseOptions};
use crate::resolver::resolve_manifest;
use crate::tree::{build, CourseStructure};
use crate::validator::{validate, ValidationReport};

/// A package after ingestion.
///
/// Packages with validation errors are kept so they can be inspected, but
/// the runtime refuses to deliver them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedPackage {
    /// The immutable course structure.
    pub structure: CourseStructure,
    /// Outcome of validation.
    pub validation: ValidationReport,
}

impl IngestedPackage {
    /// Returns `true` if the package may be delivered to learners.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.validation.is_valid
    }

    /// Manifest identifier of the package.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.structure.manifest.identifier
    }
}

/// Ingests manifest bytes with default options.
///
/// # Errors
///
/// Returns `ScormError::Parse` or `ScormError::Resolve` when the package is
/// rejected outright. Validation problems are reported in the result.
pub fn ingest(xml: &[u8]) -> Result<IngestedPackage> {
    ingest_with(xml, ParseOptions::default())
}

/// Ingests manifest bytes.
///
/// # Errors
///
/// See [`ingest`].
pub fn ingest_with(xml: &[u8], options: ParseOptions) -> Result<IngestedPackage> {
    let manifest = parse_with(xml, options)?;
    let organizations = resolve_manifest(&manifest)?;
    let structure = build(manifest, organizations);
    let validation = validate(&structure);

    for warning in &validation.warnings {
        warn!(manifest = %structure.manifest.identifier, "{warning}");
    }
    for error in &validation.errors {
        warn!(manifest = %structure.manifest.identifier, error = %error, "Validation error");
    }
    info!(
        manifest = %structure.manifest.identifier,
        schema = %structure.manifest.schema_version,
        scos = structure.scos.len(),
        valid = validation.is_valid,
        "Ingested package"
    );

    Ok(IngestedPackage {
        structure,
        validation,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ParseError, ResolveError, ScormError};

    const VALID: &str = r#"<manifest identifier="course"><organizations default="o">
        <organization identifier="o"><title>Course</title>
          <item identifier="sco1" identifierref="r1"><title>One</title></item>
        </organization></organizations>
        <resources><resource identifier="r1" scormtype="sco" href="one.html"/></resources></manifest>"#;

    #[test]
    fn test_ingest_valid_package() {
        let package = ingest(VALID.as_bytes()).unwrap();
        assert!(package.is_active());
        assert_eq!(package.identifier(), "course");
        assert_eq!(package.structure.scos.len(), 1);
    }

    #[test]
    fn test_ingest_invalid_package_is_inactive() {
        let xml = VALID.replace("scormtype=\"sco\"", "scormtype=\"asset\"");
        let package = ingest(xml.as_bytes()).unwrap();
        assert!(!package.is_active());
        assert!(!package.validation.errors.is_empty());
    }

    #[test]
    fn test_ingest_rejects_dangling_reference() {
        let xml = VALID.replace("identifierref=\"r1\"", "identifierref=\"res_missing\"");
        let err = ingest(xml.as_bytes()).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ScormError::Resolve(ResolveError::DanglingReference { ref resource_ref, .. }) if resource_ref == "res_missing"
        ));
    }

    #[test]
    fn test_ingest_rejects_malformed_xml() {
        let err = ingest(b"<manifest").unwrap_err();
        assert!(matches!(err, ScormError::Parse(ParseError::Malformed(..))));
    }

    #[test]
    fn test_ingest_is_deterministic() {
        let first = serde_json::to_string(&ingest(VALID.as_bytes()).unwrap()).unwrap();
        let second = serde_json::to_string(&ingest(VALID.as_bytes()).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
