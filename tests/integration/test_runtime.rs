//! End-to-end runtime tests
//!
//! These tests drive learners through the fixture packages with a
//! file-backed attempt store, both directly and over the HTTP API.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use scorm_engine::{
    create_router, ingest, AppState, AttemptError, CompletionReport, CompletionStatus, Config,
    DirectoryPackageSource, EntryMode, JsonFileAttemptStore, NavigationOutcome, PackageSource,
    RuntimeService, ScormError, SuccessStatus,
};
use tower::util::ServiceExt;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Creates an empty store directory unique to a test.
fn store_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "scorm-integration-{name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

async fn runtime_with(package: &str, dir: &PathBuf, config: &Config) -> RuntimeService {
    let bytes = DirectoryPackageSource::from_config(fixtures(), config)
        .get_manifest_bytes(package)
        .expect("Failed to read fixture manifest");
    let runtime = RuntimeService::new(config, Arc::new(JsonFileAttemptStore::new(dir)));
    runtime
        .register_package(package, ingest(&bytes).expect("Failed to ingest"))
        .await;
    runtime
}

fn launchable(set: &std::collections::BTreeSet<String>) -> Vec<&str> {
    set.iter().map(String::as_str).collect()
}

fn completed() -> CompletionReport {
    CompletionReport::new().completion(CompletionStatus::Completed)
}

#[tokio::test]
async fn test_linear_course_walkthrough() {
    let dir = store_dir("linear");
    let config = Config::default();
    let rt = runtime_with("linear-12", &dir, &config).await;
    let pkg = "linear-12";

    assert_eq!(
        launchable(&rt.launchable_scos("ann", pkg).await.unwrap()),
        vec!["lesson_1"]
    );
    assert_eq!(
        rt.next_outcome("ann", pkg, "lesson_1").await.unwrap(),
        NavigationOutcome::Locked
    );

    rt.start_session("ann", pkg, "lesson_1").await.unwrap();
    rt.report_completion("ann", pkg, "lesson_1", &completed())
        .await
        .unwrap();
    assert_eq!(
        rt.next("ann", pkg, "lesson_1").await.unwrap().as_deref(),
        Some("lesson_2")
    );

    rt.start_session("ann", pkg, "lesson_2").await.unwrap();
    rt.report_completion("ann", pkg, "lesson_2", &completed())
        .await
        .unwrap();

    // The handout is an asset and is skipped by navigation.
    assert_eq!(
        rt.next("ann", pkg, "lesson_2").await.unwrap().as_deref(),
        Some("quiz")
    );
    let err = rt.start_session("ann", pkg, "handout").await.unwrap_err();
    assert!(matches!(
        err,
        ScormError::Attempt(AttemptError::NotLaunchable(_))
    ));

    rt.start_session("ann", pkg, "quiz").await.unwrap();
    let outcome = rt
        .report_completion(
            "ann",
            pkg,
            "quiz",
            &CompletionReport::new()
                .completion(CompletionStatus::Completed)
                .score(85.0),
        )
        .await
        .unwrap();
    assert_eq!(outcome.state.success_status, SuccessStatus::Passed);
    assert_eq!(
        rt.next_outcome("ann", pkg, "quiz").await.unwrap(),
        NavigationOutcome::EndOfCourse
    );
    assert_eq!(
        rt.previous("ann", pkg, "quiz").await.unwrap().as_deref(),
        Some("lesson_2")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_attempts_survive_restart() {
    let dir = store_dir("restart");
    let config = Config::default();
    let pkg = "linear-12";

    {
        let rt = runtime_with(pkg, &dir, &config).await;
        rt.start_session("bo", pkg, "lesson_1").await.unwrap();
        rt.report_completion(
            "bo",
            pkg,
            "lesson_1",
            &CompletionReport::new()
                .completion(CompletionStatus::Incomplete)
                .suspend_data("page=3"),
        )
        .await
        .unwrap();
    }

    let rt = runtime_with(pkg, &dir, &config).await;
    let start = rt.start_session("bo", pkg, "lesson_1").await.unwrap();
    assert_eq!(start.entry, EntryMode::Resume);
    assert_eq!(start.state.suspend_data, "page=3");
    assert_eq!(start.state.session_count, 2);

    assert!(dir.join(pkg).join("bo.json").exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sequenced_course_unlocks_by_score() {
    let dir = store_dir("sequenced");
    let config = Config::default();
    let rt = runtime_with("sequenced-2004", &dir, &config).await;
    let pkg = "sequenced-2004";

    rt.start_session("cy", pkg, "intro").await.unwrap();

    let mut cmi = BTreeMap::new();
    cmi.insert("cmi.completion_status".to_string(), "completed".to_string());
    cmi.insert("cmi.score.scaled".to_string(), "0.6".to_string());
    rt.commit_cmi("cy", pkg, "intro", &cmi).await.unwrap();
    assert_eq!(
        launchable(&rt.launchable_scos("cy", pkg).await.unwrap()),
        vec!["intro"]
    );

    cmi.insert("cmi.score.scaled".to_string(), "0.9".to_string());
    rt.commit_cmi("cy", pkg, "intro", &cmi).await.unwrap();
    assert_eq!(
        launchable(&rt.launchable_scos("cy", pkg).await.unwrap()),
        vec!["intro", "lab"]
    );

    let err = rt.start_session("cy", pkg, "exam").await.unwrap_err();
    assert!(matches!(err, ScormError::Attempt(AttemptError::Locked(_))));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_regression_with_reattempts() {
    let dir = store_dir("reattempt");
    let config = Config {
        allow_reattempts: true,
        ..Config::default()
    };
    let rt = runtime_with("linear-12", &dir, &config).await;
    let pkg = "linear-12";

    rt.start_session("di", pkg, "lesson_1").await.unwrap();
    rt.report_completion("di", pkg, "lesson_1", &completed())
        .await
        .unwrap();
    let outcome = rt
        .report_completion(
            "di",
            pkg,
            "lesson_1",
            &CompletionReport::new().completion(CompletionStatus::Incomplete),
        )
        .await
        .unwrap();

    assert!(outcome.new_attempt);
    assert_eq!(outcome.state.attempt_number, 2);
    let attempts = rt.attempts("di", pkg).await.unwrap();
    assert_eq!(attempts.superseded.get("lesson_1").map(Vec::len), Some(1));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_http_walkthrough() {
    let dir = store_dir("http");
    let config = Config::default();
    let rt = runtime_with("linear-12", &dir, &config).await;
    let router = create_router(AppState::new(config, rt));
    let base = "/api/packages/linear-12/learners/eve";

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("{base}/scos/lesson_1/session"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = serde_json::json!({ "cmi": { "cmi.core.lesson_status": "passed" } });
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("{base}/scos/lesson_1/commit"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(format!("{base}/launchable"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["scos"], serde_json::json!(["lesson_1", "lesson_2"]));

    std::fs::remove_dir_all(&dir).ok();
}
