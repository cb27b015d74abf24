//! In-memory run repository.
//!
//! DashMap-backed implementation of [`RunRepository`] for tests and offline
//! runs. Step logs rely on UUIDv7 ids being time-ordered for listing.

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use socweave_types::error::RepositoryError;
use socweave_types::run::{RunRecord, StepLog, StepLogStatus};

use super::RunRepository;

/// In-memory [`RunRepository`].
#[derive(Default)]
pub struct MemoryRunRepository {
    runs: DashMap<Uuid, RunRecord>,
    steps: DashMap<Uuid, StepLog>,
}

impl MemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunRepository for MemoryRunRepository {
    async fn save_run(&self, record: &RunRecord) -> Result<(), RepositoryError> {
        let mut record = record.clone();
        if let Some(existing) = self.runs.get(&record.run_id) {
            record.started_at = existing.started_at;
        }
        self.runs.insert(record.run_id, record);
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, RepositoryError> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|r| r.clone()).collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        self.steps.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepLogStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut entry = self
            .steps
            .get_mut(log_id)
            .ok_or(RepositoryError::NotFound)?;
        entry.status = status;
        if let Some(output) = output {
            entry.output = Some(output.clone());
        }
        if let Some(error) = error {
            entry.error = Some(error.to_string());
        }
        entry.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let mut logs: Vec<StepLog> = self
            .steps
            .iter()
            .filter(|s| s.run_id == *run_id)
            .map(|s| s.clone())
            .collect();
        // UUIDv7 ids sort by creation time
        logs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(logs)
    }

    async fn get_completed_step_ids(&self, run_id: &Uuid) -> Result<Vec<String>, RepositoryError> {
        let logs = self.list_step_logs(run_id).await?;
        let mut completed: Vec<String> = Vec::new();
        for log in logs {
            if log.status == StepLogStatus::Completed && !completed.contains(&log.step) {
                completed.push(log.step);
            }
        }
        Ok(completed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use socweave_types::run::RunStatus;

    fn record(run_id: Uuid) -> RunRecord {
        RunRecord {
            run_id,
            alert_id: "AL-1".to_string(),
            status: RunStatus::Intake,
            state: json!({}),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn step_log(run_id: Uuid, step: &str, status: StepLogStatus) -> StepLog {
        StepLog {
            id: Uuid::now_v7(),
            run_id,
            step: step.to_string(),
            status,
            attempt: 1,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn save_and_get_run_roundtrip() {
        let repo = MemoryRunRepository::new();
        let run_id = Uuid::now_v7();
        repo.save_run(&record(run_id)).await.unwrap();

        let loaded = repo.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, run_id);
        assert!(repo.get_run(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_preserves_started_at() {
        let repo = MemoryRunRepository::new();
        let run_id = Uuid::now_v7();
        let first = record(run_id);
        repo.save_run(&first).await.unwrap();

        let mut second = record(run_id);
        second.status = RunStatus::Finalized;
        second.started_at = Utc::now();
        repo.save_run(&second).await.unwrap();

        let loaded = repo.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Finalized);
        assert_eq!(loaded.started_at, first.started_at);
    }

    #[tokio::test]
    async fn completed_step_ids_exclude_failed_and_skipped() {
        let repo = MemoryRunRepository::new();
        let run_id = Uuid::now_v7();
        repo.create_step_log(&step_log(run_id, "enrich", StepLogStatus::Completed))
            .await
            .unwrap();
        repo.create_step_log(&step_log(run_id, "score_validity", StepLogStatus::Failed))
            .await
            .unwrap();
        repo.create_step_log(&step_log(run_id, "notify_triage", StepLogStatus::Skipped))
            .await
            .unwrap();

        let completed = repo.get_completed_step_ids(&run_id).await.unwrap();
        assert_eq!(completed, vec!["enrich"]);
    }

    #[tokio::test]
    async fn update_step_status_sets_output_and_error() {
        let repo = MemoryRunRepository::new();
        let run_id = Uuid::now_v7();
        let log = step_log(run_id, "enrich", StepLogStatus::Running);
        repo.create_step_log(&log).await.unwrap();

        repo.update_step_status(
            &log.id,
            StepLogStatus::Failed,
            None,
            Some("collaborator timeout"),
        )
        .await
        .unwrap();

        let logs = repo.list_step_logs(&run_id).await.unwrap();
        assert_eq!(logs[0].status, StepLogStatus::Failed);
        assert_eq!(logs[0].error.as_deref(), Some("collaborator timeout"));
        assert!(logs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn runs_are_isolated_by_id() {
        let repo = MemoryRunRepository::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        repo.create_step_log(&step_log(a, "enrich", StepLogStatus::Completed))
            .await
            .unwrap();
        repo.create_step_log(&step_log(b, "decide", StepLogStatus::Completed))
            .await
            .unwrap();

        assert_eq!(repo.get_completed_step_ids(&a).await.unwrap(), vec!["enrich"]);
        assert_eq!(repo.get_completed_step_ids(&b).await.unwrap(), vec!["decide"]);
    }
}
