//! Run repository trait definition.
//!
//! Storage interface for run checkpoints and step execution logs. The
//! infrastructure layer (socweave-infra) implements this trait with SQLite;
//! [`memory::MemoryRunRepository`] backs tests and offline runs.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use serde_json::Value;
use uuid::Uuid;

use socweave_types::error::RepositoryError;
use socweave_types::run::{RunRecord, StepLog, StepLogStatus};

pub mod memory;

/// Repository trait for run persistence.
///
/// Two entity families:
/// - **Runs:** upsert/load/query run records (the checkpoint lineage heads).
/// - **Steps:** create/update/query per-attempt step execution logs.
pub trait RunRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Upsert a run record by run id.
    ///
    /// On conflict the status, state snapshot, error, and completion time are
    /// replaced; `started_at` keeps its first-written value so the lineage
    /// records when the run actually began.
    fn save_run(
        &self,
        record: &RunRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a run record by its run id.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<RunRecord>, RepositoryError>> + Send;

    /// List run records, newest first.
    fn list_runs(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RunRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Create a new step execution log entry.
    fn create_step_log(
        &self,
        log: &StepLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a step log's status and optionally its output/error.
    fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepLogStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all step logs for a run, in execution order.
    fn list_step_logs(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepLog>, RepositoryError>> + Send;

    /// Step names that completed successfully in a run (for resume).
    fn get_completed_step_ids(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}

/// Shared handles delegate, so one store can back several executors.
impl<R: RunRepository> RunRepository for std::sync::Arc<R> {
    async fn save_run(&self, record: &RunRecord) -> Result<(), RepositoryError> {
        self.as_ref().save_run(record).await
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        self.as_ref().get_run(run_id).await
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, RepositoryError> {
        self.as_ref().list_runs(limit).await
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        self.as_ref().create_step_log(log).await
    }

    async fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepLogStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.as_ref()
            .update_step_status(log_id, status, output, error)
            .await
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        self.as_ref().list_step_logs(run_id).await
    }

    async fn get_completed_step_ids(&self, run_id: &Uuid) -> Result<Vec<String>, RepositoryError> {
        self.as_ref().get_completed_step_ids(run_id).await
    }
}
