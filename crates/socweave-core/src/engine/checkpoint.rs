//! Durable checkpoint manager with degraded-mode fallback.
//!
//! Wraps [`RunRepository`] to provide the engine's checkpoint surface: the
//! full run-state snapshot is persisted after every merged delta, and every
//! step attempt is checkpointed through its transitions so crashed runs can
//! resume from the last completed step.
//!
//! When the repository is unavailable the manager degrades to a best-effort
//! in-process snapshot cache with a surfaced warning. It never fabricates
//! state: a snapshot that exists nowhere is reported as not found, and a
//! corrupt snapshot is an error, not a default.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use socweave_types::run::{RunRecord, RunState, StepLog, StepLogStatus};

use crate::repository::RunRepository;

use super::steps::StepKind;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for triage runs.
///
/// Generic over `R: RunRepository` so it works with any storage backend
/// (SQLite, in-memory, ...).
pub struct CheckpointManager<R: RunRepository> {
    repo: R,
    /// Last-known snapshots kept for degraded mode.
    fallback: DashMap<Uuid, RunState>,
    degraded: AtomicBool,
}

impl<R: RunRepository> CheckpointManager<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            fallback: DashMap::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Whether the manager has fallen back to in-process snapshots.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Run snapshots
    // -----------------------------------------------------------------------

    /// Persist the full run-state snapshot.
    ///
    /// Called after every successfully merged delta. Repository failure does
    /// not fail the run: the snapshot is kept in the in-process cache and a
    /// warning is surfaced.
    pub async fn save_state(&self, state: &RunState, error: Option<&str>) {
        let record = RunRecord {
            run_id: state.run_id,
            alert_id: state.alert.id.clone(),
            status: state.status,
            state: state.to_snapshot(),
            error: error.map(str::to_string),
            started_at: Utc::now(),
            completed_at: state.status.is_terminal().then(Utc::now),
        };

        match self.repo.save_run(&record).await {
            Ok(()) => {
                tracing::debug!(run_id = %state.run_id, status = ?state.status, "checkpointed run state");
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(
                    run_id = %state.run_id,
                    error = %e,
                    "checkpoint store unavailable; keeping in-process snapshot only"
                );
            }
        }

        // Cache unconditionally so degraded loads see the latest merge.
        self.fallback.insert(state.run_id, state.clone());
    }

    /// Load a run state from its checkpoint.
    ///
    /// Falls back to the in-process cache (with a warning) when the
    /// repository errors or the stored snapshot is corrupt. Derived values
    /// (HITL outcome, decision routing) are always recomputed by callers
    /// from the returned content.
    pub async fn load_state(&self, run_id: Uuid) -> Result<RunState, CheckpointError> {
        match self.repo.get_run(&run_id).await {
            Ok(Some(record)) => match RunState::from_snapshot(record.state) {
                Ok(state) => Ok(state),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "corrupt checkpoint snapshot");
                    self.fallback
                        .get(&run_id)
                        .map(|s| s.clone())
                        .ok_or_else(|| CheckpointError::CorruptSnapshot(run_id, e.to_string()))
                }
            },
            Ok(None) => self
                .fallback
                .get(&run_id)
                .map(|s| s.clone())
                .ok_or(CheckpointError::RunNotFound(run_id)),
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(
                    run_id = %run_id,
                    error = %e,
                    "checkpoint store unavailable; trying in-process snapshot"
                );
                self.fallback
                    .get(&run_id)
                    .map(|s| s.clone())
                    .ok_or_else(|| CheckpointError::Repository(e.to_string()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Checkpoint a step attempt as started. Returns the step log id.
    pub async fn checkpoint_step_start(
        &self,
        run_id: Uuid,
        step: StepKind,
        attempt: u32,
    ) -> Uuid {
        let log_id = Uuid::now_v7();
        let log = StepLog {
            id: log_id,
            run_id,
            step: step.as_str().to_string(),
            status: StepLogStatus::Running,
            attempt,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        };

        if let Err(e) = self.repo.create_step_log(&log).await {
            self.degraded.store(true, Ordering::Relaxed);
            tracing::warn!(run_id = %run_id, step = step.as_str(), error = %e, "failed to checkpoint step start");
        } else {
            tracing::debug!(run_id = %run_id, step = step.as_str(), attempt, "checkpointed step start");
        }

        log_id
    }

    /// Checkpoint a step as completed, with its delta summary.
    pub async fn checkpoint_step_complete(&self, log_id: Uuid, output: Option<&Value>) {
        if let Err(e) = self
            .repo
            .update_step_status(&log_id, StepLogStatus::Completed, output, None)
            .await
        {
            tracing::warn!(log_id = %log_id, error = %e, "failed to checkpoint step completion");
        }
    }

    /// Checkpoint a step attempt as failed.
    pub async fn checkpoint_step_failed(&self, log_id: Uuid, error: &str) {
        if let Err(e) = self
            .repo
            .update_step_status(&log_id, StepLogStatus::Failed, None, Some(error))
            .await
        {
            tracing::warn!(log_id = %log_id, error = %e, "failed to checkpoint step failure");
        }
    }

    /// Checkpoint a step as skipped (route gate not taken, or upstream
    /// fields incomplete).
    pub async fn checkpoint_step_skipped(&self, run_id: Uuid, step: StepKind, reason: &str) {
        let log = StepLog {
            id: Uuid::now_v7(),
            run_id,
            step: step.as_str().to_string(),
            status: StepLogStatus::Skipped,
            attempt: 0,
            output: None,
            error: Some(reason.to_string()),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };
        if let Err(e) = self.repo.create_step_log(&log).await {
            tracing::warn!(run_id = %run_id, step = step.as_str(), error = %e, "failed to checkpoint step skip");
        }
    }

    // -----------------------------------------------------------------------
    // Recovery helpers
    // -----------------------------------------------------------------------

    /// Step names that completed successfully in a run.
    ///
    /// Used on resume to determine which steps to skip. Degrades to an empty
    /// set when the store is unavailable (steps re-run; their merges are
    /// idempotent).
    pub async fn completed_steps(&self, run_id: Uuid) -> Vec<String> {
        match self.repo.get_completed_step_ids(&run_id).await {
            Ok(steps) => steps,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "failed to load completed steps; re-running all");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed and no cached snapshot exists.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// No checkpoint lineage exists for the run id.
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// The stored snapshot does not deserialize.
    #[error("corrupt snapshot for run {0}: {1}")]
    CorruptSnapshot(Uuid, String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use socweave_types::alert::Alert;
    use socweave_types::error::RepositoryError;
    use socweave_types::run::RunStatus;

    use crate::repository::memory::MemoryRunRepository;

    fn state() -> RunState {
        RunState::new(
            Uuid::now_v7(),
            Alert {
                id: "AL-1".to_string(),
                source: "SIEM".to_string(),
                title: "test".to_string(),
                description: "test".to_string(),
                indicators: vec![],
                created_at: Utc::now(),
            },
        )
    }

    /// Repository whose every operation fails, for degraded-mode tests.
    struct BrokenRepository;

    impl crate::repository::RunRepository for BrokenRepository {
        async fn save_run(&self, _: &RunRecord) -> Result<(), RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn get_run(&self, _: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn list_runs(&self, _: u32) -> Result<Vec<RunRecord>, RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn create_step_log(&self, _: &StepLog) -> Result<(), RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn update_step_status(
            &self,
            _: &Uuid,
            _: StepLogStatus,
            _: Option<&Value>,
            _: Option<&str>,
        ) -> Result<(), RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn list_step_logs(&self, _: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
            Err(RepositoryError::Connection)
        }
        async fn get_completed_step_ids(&self, _: &Uuid) -> Result<Vec<String>, RepositoryError> {
            Err(RepositoryError::Connection)
        }
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let manager = CheckpointManager::new(MemoryRunRepository::new());
        let state = state();
        manager.save_state(&state, None).await;

        let loaded = manager.load_state(state.run_id).await.unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.status, RunStatus::Intake);
        assert!(!manager.is_degraded());
    }

    #[tokio::test]
    async fn missing_run_is_not_found() {
        let manager = CheckpointManager::new(MemoryRunRepository::new());
        let err = manager.load_state(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn broken_store_degrades_to_cached_snapshot() {
        let manager = CheckpointManager::new(BrokenRepository);
        let state = state();
        manager.save_state(&state, None).await;
        assert!(manager.is_degraded());

        // Load still works from the in-process cache.
        let loaded = manager.load_state(state.run_id).await.unwrap();
        assert_eq!(loaded.run_id, state.run_id);
    }

    #[tokio::test]
    async fn broken_store_never_fabricates_state() {
        let manager = CheckpointManager::new(BrokenRepository);
        let err = manager.load_state(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Repository(_)));
    }

    #[tokio::test]
    async fn step_checkpoints_drive_completed_set() {
        let manager = CheckpointManager::new(MemoryRunRepository::new());
        let run_id = Uuid::now_v7();

        let log_id = manager
            .checkpoint_step_start(run_id, StepKind::Enrich, 1)
            .await;
        manager.checkpoint_step_complete(log_id, None).await;

        let failed_id = manager
            .checkpoint_step_start(run_id, StepKind::ScoreValidity, 1)
            .await;
        manager.checkpoint_step_failed(failed_id, "timeout").await;

        manager
            .checkpoint_step_skipped(run_id, StepKind::NotifyTriage, "route not taken")
            .await;

        let completed = manager.completed_steps(run_id).await;
        assert_eq!(completed, vec!["enrich"]);
    }

    #[tokio::test]
    async fn distinct_run_ids_never_share_lineage() {
        let manager = CheckpointManager::new(MemoryRunRepository::new());
        let a = state();
        let b = state();
        manager.save_state(&a, None).await;
        manager.save_state(&b, None).await;

        let loaded_a = manager.load_state(a.run_id).await.unwrap();
        let loaded_b = manager.load_state(b.run_id).await.unwrap();
        assert_ne!(loaded_a.run_id, loaded_b.run_id);
        assert_eq!(loaded_a.alert.id, "AL-1");
    }
}
