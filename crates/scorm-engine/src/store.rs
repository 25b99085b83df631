//! Persistence of learner attempts.
//!
//! The runtime calls [`AttemptStore::upsert`] on every accepted session start
//! and report, before the change becomes visible in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::attempt::LearnerAttempts;
use crate::error::{Result, ScormError};

/// Identifies one learner in one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerKey {
    /// The learner.
    pub learner_id: String,
    /// The package.
    pub package_id: String,
}

impl LearnerKey {
    /// Creates a key.
    pub fn new(learner_id: impl Into<String>, package_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            package_id: package_id.into(),
        }
    }
}

/// Durable storage for attempt records.
pub trait AttemptStore: Send + Sync {
    /// Loads every record of a learner in a package. Unknown keys yield an
    /// empty set.
    fn load<'a>(&'a self, key: &'a LearnerKey) -> BoxFuture<'a, Result<LearnerAttempts>>;

    /// Replaces the stored records of one SCO with those in `attempts`.
    fn upsert<'a>(
        &'a self,
        key: &'a LearnerKey,
        sco_id: &'a str,
        attempts: &'a LearnerAttempts,
    ) -> BoxFuture<'a, Result<()>>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Keeps attempts in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    records: Mutex<HashMap<LearnerKey, LearnerAttempts>>,
}

impl MemoryAttemptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptStore for MemoryAttemptStore {
    fn load<'a>(&'a self, key: &'a LearnerKey) -> BoxFuture<'a, Result<LearnerAttempts>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            Ok(records.get(key).cloned().unwrap_or_default())
        })
    }

    fn upsert<'a>(
        &'a self,
        key: &'a LearnerKey,
        sco_id: &'a str,
        attempts: &'a LearnerAttempts,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut records = self.records.lock().await;
            records
                .entry(key.clone())
                .or_default()
                .merge_sco(sco_id, attempts);
            Ok(())
        })
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Stores one JSON document per learner and package:
/// `<dir>/<package_id>/<learner_id>.json`.
///
/// Writes go to a temporary file that is renamed over the document, so a
/// crash never leaves a half-written record. Writes to the same document
/// are serialized.
#[derive(Debug)]
pub struct JsonFileAttemptStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileAttemptStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for a key.
    ///
    /// # Errors
    ///
    /// Returns `ScormError::InvalidKey` if an identifier is unsafe as a file name.
    pub fn document_path(&self, key: &LearnerKey) -> Result<PathBuf> {
        check_key_part("package", &key.package_id)?;
        check_key_part("learner", &key.learner_id)?;
        Ok(self
            .dir
            .join(&key.package_id)
            .join(format!("{}.json", key.learner_id)))
    }

    async fn read_document(path: &Path) -> Result<LearnerAttempts> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LearnerAttempts::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map_err(|e| ScormError::store_corrupted(path, e.to_string()))
    }
}

impl AttemptStore for JsonFileAttemptStore {
    fn load<'a>(&'a self, key: &'a LearnerKey) -> BoxFuture<'a, Result<LearnerAttempts>> {
        Box::pin(async move {
            let path = self.document_path(key)?;
            Self::read_document(&path).await
        })
    }

    fn upsert<'a>(
        &'a self,
        key: &'a LearnerKey,
        sco_id: &'a str,
        attempts: &'a LearnerAttempts,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.document_path(key)?;
            let _guard = self.write_lock.lock().await;

            let mut document = Self::read_document(&path).await?;
            document.merge_sco(sco_id, attempts);

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp_path = path.with_extension("json.tmp");
            let json = serde_json::to_string_pretty(&document)?;
            tokio::fs::write(&tmp_path, json).await?;
            tokio::fs::rename(&tmp_path, &path).await?;

            debug!(path = %path.display(), sco = %sco_id, "Attempt record persisted");
            Ok(())
        })
    }
}

fn check_key_part(kind: &'static str, value: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@');
    if value.is_empty() || value == "." || value == ".." || !value.chars().all(allowed) {
        return Err(ScormError::invalid_key(kind, value));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptState, CompletionStatus};
    use crate::prerequisite::AttemptLookup;

    fn temp_store(name: &str) -> JsonFileAttemptStore {
        let dir = std::env::temp_dir().join(format!("scorm-store-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        JsonFileAttemptStore::new(dir)
    }

    fn attempts_with(sco_id: &str, completion: CompletionStatus) -> LearnerAttempts {
        let mut attempts = LearnerAttempts::new();
        attempts.attempts.insert(
            sco_id.to_string(),
            AttemptState {
                completion_status: completion,
                session_count: 1,
                ..AttemptState::new()
            },
        );
        attempts
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryAttemptStore::new();
        let key = LearnerKey::new("alice", "course");

        assert!(tokio_test::block_on(store.load(&key)).unwrap().attempts.is_empty());

        let attempts = attempts_with("sco1", CompletionStatus::Incomplete);
        tokio_test::block_on(store.upsert(&key, "sco1", &attempts)).unwrap();

        let loaded = tokio_test::block_on(store.load(&key)).unwrap();
        assert_eq!(loaded.completion_status("sco1"), CompletionStatus::Incomplete);
    }

    #[tokio::test]
    async fn test_json_store_merges_per_sco() {
        let store = temp_store("merge");
        let key = LearnerKey::new("alice", "course");

        store
            .upsert(&key, "sco1", &attempts_with("sco1", CompletionStatus::Completed))
            .await
            .unwrap();
        store
            .upsert(&key, "sco2", &attempts_with("sco2", CompletionStatus::Incomplete))
            .await
            .unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded.attempts.len(), 2);
        assert_eq!(loaded.completion_status("sco1"), CompletionStatus::Completed);

        let path = store.document_path(&key).unwrap();
        assert!(path.ends_with("course/alice.json"));
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(store.dir()).ok();
    }

    #[tokio::test]
    async fn test_json_store_rejects_unsafe_keys() {
        let store = temp_store("keys");
        for key in [
            LearnerKey::new("../etc", "course"),
            LearnerKey::new("alice", ".."),
            LearnerKey::new("", "course"),
            LearnerKey::new("a/b", "course"),
        ] {
            let err = store.load(&key).await.unwrap_err();
            assert!(matches!(err, ScormError::InvalidKey { .. }), "{key:?}");
        }
    }

    #[tokio::test]
    async fn test_json_store_corrupted_document() {
        let store = temp_store("corrupt");
        let key = LearnerKey::new("bob", "course");
        let path = store.document_path(&key).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ nope").unwrap();

        let err = store.load(&key).await.unwrap_err();
        assert!(matches!(err, ScormError::StoreCorrupted { .. }));

        std::fs::remove_dir_all(store.dir()).ok();
    }
}
