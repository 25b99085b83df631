//! Learner-facing runtime over ingested packages.
//!
//! [`RuntimeService`] owns the package registry and the per-learner attempt
//! state. Each (learner, package) pair has its own lock, so calls for one
//! learner are serialized while different learners proceed in parallel.
//! Every mutation is computed on a copy, persisted, and only then made
//! visible.
//!
//! Loaded attempt sets are cached in memory up to a configured number of
//! learner/package pairs. Past that, the least recently used idle sets are
//! dropped; the store already holds everything they contained.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::attempt::{
    AttemptTracker, CommitOutcome, CompletionReport, LearnerAttempts, SessionStart, TrackerPolicy,
};
use crate::config::Config;
use crate::error::{AttemptError, Result, ScormError};
use crate::ingest::IngestedPackage;
use crate::prerequisite::AttemptLookup;
use crate::sequencing::{NavigationOutcome, Sequencer};
use crate::store::{AttemptStore, LearnerKey};
use crate::tree::Sco;

/// Learner/package pairs cached when no configuration says otherwise.
pub const DEFAULT_CACHED_LEARNERS: usize = 1024;

type LearnerSlot = Arc<Mutex<Option<LearnerAttempts>>>;

struct CachedSlot {
    slot: LearnerSlot,
    last_used: u64,
}

/// Per-learner lock slots with least-recently-used eviction.
///
/// A slot is only evicted while nothing outside the cache holds it, which
/// is checked under the cache lock that hands slots out.
struct LearnerCache {
    slots: HashMap<LearnerKey, CachedSlot>,
    clock: u64,
    capacity: usize,
}

impl LearnerCache {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            clock: 0,
            capacity: capacity.max(1),
        }
    }

    fn checkout(&mut self, key: &LearnerKey) -> LearnerSlot {
        self.clock += 1;
        let clock = self.clock;
        let cached = self.slots.entry(key.clone()).or_insert_with(|| CachedSlot {
            slot: LearnerSlot::default(),
            last_used: clock,
        });
        cached.last_used = clock;
        let slot = Arc::clone(&cached.slot);
        self.evict_idle();
        slot
    }

    fn evict_idle(&mut self) {
        let Some(excess) = self.slots.len().checked_sub(self.capacity).filter(|n| *n > 0) else {
            return;
        };
        let mut idle: Vec<(u64, LearnerKey)> = self
            .slots
            .iter()
            .filter(|(_, cached)| Arc::strong_count(&cached.slot) == 1)
            .map(|(key, cached)| (cached.last_used, key.clone()))
            .collect();
        idle.sort_unstable_by_key(|(last_used, _)| *last_used);

        for (_, key) in idle.into_iter().take(excess) {
            self.slots.remove(&key);
            debug!(learner = %key.learner_id, package = %key.package_id, "Attempts evicted from cache");
        }
    }
}

/// Runtime verbs keyed by learner and package.
pub struct RuntimeService {
    tracker: AttemptTracker,
    enforce_prerequisites: bool,
    packages: RwLock<HashMap<String, Arc<IngestedPackage>>>,
    learners: Mutex<LearnerCache>,
    store: Arc<dyn AttemptStore>,
}

impl std::fmt::Debug for RuntimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeService")
            .field("tracker", &self.tracker)
            .field("enforce_prerequisites", &self.enforce_prerequisites)
            .finish_non_exhaustive()
    }
}

impl RuntimeService {
    /// Creates a runtime with the policies from `config`.
    pub fn new(config: &Config, store: Arc<dyn AttemptStore>) -> Self {
        Self::with_policy(
            TrackerPolicy::from(config),
            config.enforce_prerequisites_on_launch,
            store,
        )
        .with_cache_capacity(config.max_cached_learners)
    }

    /// Creates a runtime with explicit policies.
    pub fn with_policy(
        policy: TrackerPolicy,
        enforce_prerequisites: bool,
        store: Arc<dyn AttemptStore>,
    ) -> Self {
        Self {
            tracker: AttemptTracker::new(policy),
            enforce_prerequisites,
            packages: RwLock::new(HashMap::new()),
            learners: Mutex::new(LearnerCache::new(DEFAULT_CACHED_LEARNERS)),
            store,
        }
    }

    /// Sets how many learner/package attempt sets stay in memory.
    #[must_use]
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        Self {
            learners: Mutex::new(LearnerCache::new(capacity)),
            ..self
        }
    }

    /// Number of learner/package attempt sets currently held in memory.
    pub async fn cached_learners(&self) -> usize {
        self.learners.lock().await.slots.len()
    }

    // ========================================================================
    // Package registry
    // ========================================================================

    /// Makes a package available under `package_id`, replacing any previous one.
    pub async fn register_package(
        &self,
        package_id: impl Into<String>,
        package: IngestedPackage,
    ) -> Arc<IngestedPackage> {
        let package_id = package_id.into();
        let package = Arc::new(package);
        info!(
            package = %package_id,
            manifest = %package.identifier(),
            active = package.is_active(),
            "Package registered"
        );
        self.packages
            .write()
            .await
            .insert(package_id, Arc::clone(&package));
        package
    }

    /// Looks up a registered package, active or not.
    ///
    /// # Errors
    ///
    /// Returns `ScormError::UnknownPackage` if nothing is registered under the id.
    pub async fn package(&self, package_id: &str) -> Result<Arc<IngestedPackage>> {
        self.packages
            .read()
            .await
            .get(package_id)
            .cloned()
            .ok_or_else(|| ScormError::unknown_package(package_id))
    }

    /// Identifiers of every registered package, sorted.
    pub async fn package_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.packages.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn active_package(&self, package_id: &str) -> Result<Arc<IngestedPackage>> {
        let package = self.package(package_id).await?;
        if !package.is_active() {
            return Err(ScormError::PackageInactive {
                package_id: package_id.to_string(),
                errors: package.validation.errors.len(),
            });
        }
        Ok(package)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// SCOs the learner may launch now.
    ///
    /// # Errors
    ///
    /// Fails for unknown or inactive packages and on store errors.
    pub async fn launchable_scos(&self, learner_id: &str, package_id: &str) -> Result<BTreeSet<String>> {
        let package = self.active_package(package_id).await?;
        let key = LearnerKey::new(learner_id, package_id);
        self.read_attempts(&key, |attempts| {
            Sequencer::new(&package.structure, attempts).launchable_scos()
        })
        .await
    }

    /// First unlocked SCO after `current`.
    ///
    /// # Errors
    ///
    /// Fails for unknown or inactive packages, an unknown `current` SCO and
    /// on store errors.
    pub async fn next(&self, learner_id: &str, package_id: &str, current: &str) -> Result<Option<String>> {
        Ok(self
            .next_outcome(learner_id, package_id, current)
            .await?
            .target()
            .map(str::to_string))
    }

    /// Navigation outcome after `current`, telling locked content from the end.
    ///
    /// # Errors
    ///
    /// Fails for unknown or inactive packages, an unknown `current` SCO and
    /// on store errors.
    pub async fn next_outcome(
        &self,
        learner_id: &str,
        package_id: &str,
        current: &str,
    ) -> Result<NavigationOutcome> {
        let package = self.active_package(package_id).await?;
        find_sco(&package, package_id, current)?;
        let key = LearnerKey::new(learner_id, package_id);
        self.read_attempts(&key, |attempts| {
            Sequencer::new(&package.structure, attempts).next_outcome(current)
        })
        .await
    }

    /// Closest earlier launchable SCO, regardless of prerequisites.
    ///
    /// # Errors
    ///
    /// Fails for unknown or inactive packages and an unknown `current` SCO.
    pub async fn previous(&self, learner_id: &str, package_id: &str, current: &str) -> Result<Option<String>> {
        let package = self.active_package(package_id).await?;
        find_sco(&package, package_id, current)?;
        let attempts = LearnerAttempts::new();
        debug!(learner = %learner_id, package = %package_id, current, "Previous requested");
        Ok(Sequencer::new(&package.structure, &attempts)
            .previous(current)
            .map(str::to_string))
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Starts a session on a SCO.
    ///
    /// # Errors
    ///
    /// Fails for unknown packages or SCOs, inactive packages, assets, SCOs
    /// still locked by their prerequisites (when enforced) and store errors.
    /// A failed call changes nothing.
    pub async fn start_session(&self, learner_id: &str, package_id: &str, sco_id: &str) -> Result<SessionStart> {
        let package = self.active_package(package_id).await?;
        let sco = find_sco(&package, package_id, sco_id)?;
        let key = LearnerKey::new(learner_id, package_id);

        let slot = self.slot(&key).await;
        let mut guard = slot.lock().await;
        let current = self.loaded(&key, &mut guard).await?;

        if self.enforce_prerequisites
            && sco.is_launchable
            && !current.attempted(sco_id)
            && !sco.prerequisites.evaluate(current)
        {
            return Err(AttemptError::Locked(sco_id.to_string()).into());
        }

        let mut next = current.clone();
        let start = self.tracker.start_session(&mut next, sco)?;
        self.store.upsert(&key, sco_id, &next).await?;
        *guard = Some(next);

        info!(
            learner = %learner_id,
            package = %package_id,
            sco = %sco_id,
            entry = %start.entry,
            sessions = start.state.session_count,
            "Session started"
        );
        Ok(start)
    }

    /// Applies a typed completion report.
    ///
    /// # Errors
    ///
    /// Fails for unknown packages or SCOs, inactive packages, rejected
    /// reports and store errors. A failed call changes nothing.
    pub async fn report_completion(
        &self,
        learner_id: &str,
        package_id: &str,
        sco_id: &str,
        report: &CompletionReport,
    ) -> Result<CommitOutcome> {
        let package = self.active_package(package_id).await?;
        let sco = find_sco(&package, package_id, sco_id)?;
        let key = LearnerKey::new(learner_id, package_id);

        let slot = self.slot(&key).await;
        let mut guard = slot.lock().await;
        let current = self.loaded(&key, &mut guard).await?;

        let mut next = current.clone();
        let outcome = self.tracker.report_completion(&mut next, sco, report)?;
        self.store.upsert(&key, sco_id, &next).await?;
        *guard = Some(next);

        info!(
            learner = %learner_id,
            package = %package_id,
            sco = %sco_id,
            completion = %outcome.state.completion_status,
            success = %outcome.state.success_status,
            new_attempt = outcome.new_attempt,
            "Completion reported"
        );
        Ok(outcome)
    }

    /// Applies the CMI values of one commit.
    ///
    /// # Errors
    ///
    /// As [`RuntimeService::report_completion`], plus unsupported elements
    /// and invalid values.
    pub async fn commit_cmi(
        &self,
        learner_id: &str,
        package_id: &str,
        sco_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<CommitOutcome> {
        let package = self.package(package_id).await?;
        let report = CompletionReport::from_cmi(package.structure.manifest.schema_version, values)?;
        self.report_completion(learner_id, package_id, sco_id, &report)
            .await
    }

    /// Snapshot of the learner's attempts in a package.
    ///
    /// # Errors
    ///
    /// Fails for unknown packages and on store errors.
    pub async fn attempts(&self, learner_id: &str, package_id: &str) -> Result<LearnerAttempts> {
        self.package(package_id).await?;
        let key = LearnerKey::new(learner_id, package_id);
        self.read_attempts(&key, LearnerAttempts::clone).await
    }

    // ========================================================================
    // Learner state
    // ========================================================================

    async fn slot(&self, key: &LearnerKey) -> LearnerSlot {
        self.learners.lock().await.checkout(key)
    }

    async fn loaded<'g>(
        &self,
        key: &LearnerKey,
        guard: &'g mut Option<LearnerAttempts>,
    ) -> Result<&'g LearnerAttempts> {
        if guard.is_none() {
            let attempts = self.store.load(key).await?;
            debug!(
                learner = %key.learner_id,
                package = %key.package_id,
                records = attempts.attempts.len(),
                "Attempts loaded"
            );
            *guard = Some(attempts);
        }
        Ok(guard.get_or_insert_with(LearnerAttempts::new))
    }

    async fn read_attempts<T>(&self, key: &LearnerKey, f: impl FnOnce(&LearnerAttempts) -> T) -> Result<T> {
        let slot = self.slot(key).await;
        let mut guard = slot.lock().await;
        let attempts = self.loaded(key, &mut guard).await?;
        Ok(f(attempts))
    }
}

fn find_sco<'a>(package: &'a IngestedPackage, package_id: &str, sco_id: &str) -> Result<&'a Sco> {
    package
        .structure
        .sco(sco_id)
        .ok_or_else(|| ScormError::unknown_sco(package_id, sco_id))
}
