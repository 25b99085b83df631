//! End-to-end ingestion tests
//!
//! These tests read the fixture packages from disk through a
//! `DirectoryPackageSource`, run the whole ingestion pipeline and feed the
//! result to the report generators.

use std::path::PathBuf;

use scorm_engine::{
    ingest, ingest_with, Config, DirectoryPackageSource, PackageSource, ParseOptions,
    PrerequisiteExpr, ResolveError, SchemaDetection, SchemaVersion, ScormError, ScormType,
};
use scorm_report::{
    json::JsonGenerator, MarkdownGenerator, OutlineEntry, PackageStatus, ReportGenerator,
    ReportInput,
};

/// Path to the fixture packages.
fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn manifest_bytes(package: &str) -> Vec<u8> {
    DirectoryPackageSource::new(fixtures(), 1024 * 1024)
        .get_manifest_bytes(package)
        .expect("Failed to read fixture manifest")
}

/// Tests that the sample config loads and keeps every value.
#[test]
fn test_fixture_config_loads() {
    let config = Config::load_from_dir(&fixtures()).expect("Failed to load config");

    assert!(config.allow_reattempts);
    assert_eq!(config.suspend_data_limit, 4096);
    assert_eq!(config.schema_detection, SchemaDetection::Auto);
    assert_eq!(config.max_manifest_bytes, 1_048_576);
    assert_eq!(config.max_cached_learners, 256);
    assert_eq!(config.attempt_store_dir, "attempts");
    assert_eq!(config.port, 8080);
}

#[test]
fn test_linear_scorm12_package() {
    let package = ingest(&manifest_bytes("linear-12")).expect("Failed to ingest");
    let structure = &package.structure;

    assert!(package.is_active(), "{:?}", package.validation.errors);
    assert_eq!(structure.manifest.schema_version, SchemaVersion::Scorm12);
    assert_eq!(structure.organization_id, "fire_safety");

    let ids: Vec<&str> = structure.scos.iter().map(|s| s.identifier.as_str()).collect();
    assert_eq!(ids, vec!["lesson_1", "lesson_2", "handout", "quiz"]);

    let orders: Vec<u32> = structure.scos.iter().map(|s| s.seq_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);

    let lesson_2 = structure.sco("lesson_2").expect("lesson_2 missing");
    assert_eq!(lesson_2.parent_id.as_deref(), Some("module_1"));
    assert_eq!(lesson_2.depth, 1);
    assert_eq!(lesson_2.prerequisites, PrerequisiteExpr::completed("lesson_1"));

    let handout = structure.sco("handout").expect("handout missing");
    assert_eq!(handout.scorm_type, ScormType::Asset);
    assert!(!handout.is_launchable);

    let quiz = structure.sco("quiz").expect("quiz missing");
    assert_eq!(quiz.launch_href, "quiz/index.html");
    assert_eq!(quiz.mastery_score, Some(80.0));
    assert_eq!(structure.launchable_count(), 3);

    assert_eq!(structure.outline.len(), 3);
    assert_eq!(structure.outline[0].children.len(), 2);
}

#[test]
fn test_sequenced_scorm2004_package() {
    let package = ingest(&manifest_bytes("sequenced-2004")).expect("Failed to ingest");
    let structure = &package.structure;

    assert!(package.is_active(), "{:?}", package.validation.errors);
    assert_eq!(structure.manifest.schema_version, SchemaVersion::Scorm2004);

    let intro = structure.sco("intro").expect("intro missing");
    assert_eq!(intro.mastery_score, Some(70.0));
    assert!(intro.prerequisites.is_always());

    let lab = structure.sco("lab").expect("lab missing");
    assert_eq!(lab.prerequisites, PrerequisiteExpr::passed("intro"));

    let exam = structure.sco("exam").expect("exam missing");
    assert_eq!(exam.prerequisites, PrerequisiteExpr::completed("lab"));
}

#[test]
fn test_forced_schema_overrides_detection() {
    let options = ParseOptions {
        schema: SchemaDetection::Scorm2004,
    };
    let package = ingest_with(&manifest_bytes("linear-12"), options).expect("Failed to ingest");
    assert_eq!(
        package.structure.manifest.schema_version,
        SchemaVersion::Scorm2004
    );
}

#[test]
fn test_duplicate_identifiers_make_package_inactive() {
    let package = ingest(&manifest_bytes("duplicate-ids")).expect("Failed to ingest");

    assert!(!package.is_active());
    assert!(package
        .validation
        .errors
        .iter()
        .any(|e| e.contains("duplicate identifier 'page'")));
}

#[test]
fn test_dangling_reference_is_fatal() {
    let err = ingest(&manifest_bytes("dangling-ref")).expect_err("Package should be rejected");

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        ScormError::Resolve(ResolveError::DanglingReference { ref resource_ref, .. })
            if resource_ref == "res_missing"
    ));
}

#[test]
fn test_missing_package_directory() {
    let err = DirectoryPackageSource::new(fixtures(), 1024)
        .get_manifest_bytes("no-such-package")
        .expect_err("Missing package should fail");
    assert!(matches!(err, ScormError::ManifestNotFound { .. }));
}

/// Tests the full path from package to both report formats.
#[test]
fn test_reports_from_ingested_package() {
    let package = ingest(&manifest_bytes("duplicate-ids")).expect("Failed to ingest");

    let input = ReportInput {
        package_name: "duplicate-ids".to_string(),
        manifest_identifier: package.identifier().to_string(),
        title: "Duplicated Course".to_string(),
        schema_version: package.structure.manifest.schema_version.to_string(),
        outline: package
            .structure
            .scos
            .iter()
            .map(|sco| {
                OutlineEntry::new(&sco.identifier, &sco.title)
                    .depth(sco.depth)
                    .launchable(sco.is_launchable)
                    .launch_href(&sco.launch_href)
            })
            .collect(),
        errors: package.validation.errors.clone(),
        warnings: package.validation.warnings.clone(),
        ..ReportInput::default()
    };
    let report = ReportGenerator::new(input).generate();
    assert_eq!(report.summary.status, PackageStatus::Invalid);
    assert_eq!(report.summary.schema_version, "SCORM 1.2");

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("# SCORM Package Report: duplicate-ids"));
    assert!(markdown.contains("duplicate identifier"));

    let json = JsonGenerator::new(&report)
        .generate()
        .expect("Failed to serialize report");
    assert!(json.contains("\"status\":\"invalid\""));
}
