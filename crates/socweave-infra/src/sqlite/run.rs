//! SQLite run repository implementation.
//!
//! Implements `RunRepository` from `socweave-core` using sqlx with split
//! read/write pools. Run-state snapshots are stored as JSON blobs; step logs
//! track per-attempt execution state for crash recovery and auditing.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use socweave_core::repository::RunRepository;
use socweave_types::error::RepositoryError;
use socweave_types::run::{RunRecord, RunStatus, StepLog, StepLogStatus};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunRepository`.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    alert_id: String,
    status: String,
    state: String,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            alert_id: row.try_get("alert_id")?,
            status: row.try_get("status")?,
            state: row.try_get("state")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<RunRecord, RepositoryError> {
        let run_id = parse_uuid(&self.id)?;
        let status = parse_run_status(&self.status)?;
        let state: serde_json::Value = serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Query(format!("invalid state JSON: {e}")))?;
        let started_at = parse_datetime(&self.started_at)?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;

        Ok(RunRecord {
            run_id,
            alert_id: self.alert_id,
            status,
            state,
            error: self.error,
            started_at,
            completed_at,
        })
    }
}

struct StepRow {
    id: String,
    run_id: String,
    step: String,
    status: String,
    attempt: i64,
    output: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            step: row.try_get("step")?,
            status: row.try_get("status")?,
            attempt: row.try_get("attempt")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step_log(self) -> Result<StepLog, RepositoryError> {
        let status: StepLogStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid step status: {}", self.status)))?;
        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output: {e}")))
            })
            .transpose()?;

        Ok(StepLog {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            step: self.step,
            status,
            attempt: u32::try_from(self.attempt.max(0))
                .map_err(|_| RepositoryError::Query("attempt out of range".to_string()))?,
            output,
            error: self.error,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|_| RepositoryError::Query(format!("invalid UUID: {s}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Query(format!("invalid datetime: {s}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn run_status_str(status: RunStatus) -> Result<String, RepositoryError> {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(RepositoryError::Query("unserializable run status".to_string())),
    }
}

fn parse_run_status(s: &str) -> Result<RunStatus, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid run status: {s}")))
}

fn step_status_str(status: StepLogStatus) -> Result<String, RepositoryError> {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(RepositoryError::Query("unserializable step status".to_string())),
    }
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn save_run(&self, record: &RunRecord) -> Result<(), RepositoryError> {
        let state = serde_json::to_string(&record.state)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // started_at keeps its first-written value on conflict
        sqlx::query(
            r#"
            INSERT INTO triage_runs (id, alert_id, status, state, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                state = excluded.state,
                error = excluded.error,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(record.run_id.to_string())
        .bind(&record.alert_id)
        .bind(run_status_str(record.status)?)
        .bind(state)
        .bind(&record.error)
        .bind(format_datetime(&record.started_at))
        .bind(record.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM triage_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.map(|r| RunRow::from_row(&r).map_err(query_err)?.into_record())
            .transpose()
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM triage_runs ORDER BY started_at DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|r| RunRow::from_row(r).map_err(query_err)?.into_record())
            .collect()
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        let output = log
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO triage_step_logs
                (id, run_id, step, status, attempt, output, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.run_id.to_string())
        .bind(&log.step)
        .bind(step_status_str(log.status)?)
        .bind(i64::from(log.attempt))
        .bind(output)
        .bind(&log.error)
        .bind(log.started_at.as_ref().map(format_datetime))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepLogStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output = output
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE triage_step_logs
            SET status = ?,
                output = COALESCE(?, output),
                error = COALESCE(?, error),
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(step_status_str(status)?)
        .bind(output)
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM triage_step_logs WHERE run_id = ? ORDER BY started_at ASC, id ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|r| StepRow::from_row(r).map_err(query_err)?.into_step_log())
            .collect()
    }

    async fn get_completed_step_ids(&self, run_id: &Uuid) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT step FROM triage_step_logs
            WHERE run_id = ? AND status = 'completed'
            ORDER BY started_at ASC, id ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut completed: Vec<String> = Vec::new();
        for row in rows {
            let step: String = row.try_get("step").map_err(query_err)?;
            if !completed.contains(&step) {
                completed.push(step);
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
    use serde_json::json;

    async fn test_repo() -> (SqliteRunRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteRunRepository::new(pool), dir)
    }

    fn sample_record(run_id: Uuid) -> RunRecord {
        RunRecord {
            run_id,
            alert_id: "AL-1".to_string(),
            status: RunStatus::Intake,
            state: json!({"run_id": run_id.to_string(), "status": "intake"}),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn sample_step(run_id: Uuid, step: &str, status: StepLogStatus) -> StepLog {
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
    async fn save_and_get_run() {
        let (repo, _dir) = test_repo().await;
        let run_id = Uuid::now_v7();
        repo.save_run(&sample_record(run_id)).await.unwrap();

        let loaded = repo.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, run_id);
        assert_eq!(loaded.alert_id, "AL-1");
        assert_eq!(loaded.status, RunStatus::Intake);
    }

    #[tokio::test]
    async fn upsert_replaces_status_but_keeps_started_at() {
        let (repo, _dir) = test_repo().await;
        let run_id = Uuid::now_v7();
        let first = sample_record(run_id);
        repo.save_run(&first).await.unwrap();

        let mut second = sample_record(run_id);
        second.status = RunStatus::Finalized;
        second.completed_at = Some(Utc::now());
        repo.save_run(&second).await.unwrap();

        let loaded = repo.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Finalized);
        assert!(loaded.completed_at.is_some());
        // RFC3339 roundtrip keeps the first start time
        assert_eq!(
            loaded.started_at.timestamp_millis(),
            first.started_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn missing_run_is_none() {
        let (repo, _dir) = test_repo().await;
        assert!(repo.get_run(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_runs_newest_first() {
        let (repo, _dir) = test_repo().await;
        let older = Uuid::now_v7();
        let newer = Uuid::now_v7();

        let mut first = sample_record(older);
        first.started_at = Utc::now() - chrono::Duration::minutes(5);
        repo.save_run(&first).await.unwrap();
        repo.save_run(&sample_record(newer)).await.unwrap();

        let runs = repo.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, newer);
        assert_eq!(runs[1].run_id, older);
    }

    #[tokio::test]
    async fn step_log_roundtrip_and_update() {
        let (repo, _dir) = test_repo().await;
        let run_id = Uuid::now_v7();
        repo.save_run(&sample_record(run_id)).await.unwrap();

        let log = sample_step(run_id, "enrich", StepLogStatus::Running);
        repo.create_step_log(&log).await.unwrap();
        repo.update_step_status(
            &log.id,
            StepLogStatus::Completed,
            Some(&json!({"fields": ["enrichment"]})),
            None,
        )
        .await
        .unwrap();

        let logs = repo.list_step_logs(&run_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, StepLogStatus::Completed);
        assert_eq!(logs[0].output.as_ref().unwrap()["fields"][0], "enrichment");
        assert!(logs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn update_missing_step_log_is_not_found() {
        let (repo, _dir) = test_repo().await;
        let err = repo
            .update_step_status(&Uuid::now_v7(), StepLogStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn completed_step_ids_deduplicate_attempts() {
        let (repo, _dir) = test_repo().await;
        let run_id = Uuid::now_v7();
        repo.save_run(&sample_record(run_id)).await.unwrap();

        repo.create_step_log(&sample_step(run_id, "enrich", StepLogStatus::Completed))
            .await
            .unwrap();
        repo.create_step_log(&sample_step(run_id, "score_validity", StepLogStatus::Failed))
            .await
            .unwrap();
        // second attempt of the same step also completed
        repo.create_step_log(&sample_step(run_id, "enrich", StepLogStatus::Completed))
            .await
            .unwrap();

        let completed = repo.get_completed_step_ids(&run_id).await.unwrap();
        assert_eq!(completed, vec!["enrich"]);
    }
}
