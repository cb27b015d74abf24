//! Wave-based parallel triage executor with durable checkpointing.
//!
//! Processes pipeline steps in topological wave order. Steps within a wave
//! run concurrently via `tokio::task::JoinSet` against a read-only state
//! snapshot; their deltas are applied serially in the join loop -- that loop
//! is the single-writer critical section of the merge contract, so no
//! interleaved partial write is ever observable. The run-state snapshot is
//! checkpointed after every merged delta, and each step attempt is
//! checkpointed through its transitions, enabling crash recovery by resuming
//! from the last completed step.
//!
//! One sibling's failure never blocks another's merge: the join loop drains
//! every finished task before reporting the first error, so the run resumes
//! from a state containing all successful sibling deltas.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use socweave_types::alert::Alert;
use socweave_types::error::MergeError;
use socweave_types::run::{RunState, RunStatus};

use crate::collaborator::StepServices;
use crate::repository::RunRepository;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::dag::{build_execution_plan, EngineError};
use super::retry::{RetryConfig, RetryPolicy};
use super::state::apply_delta;
use super::steps::{triage_pipeline, StepDefinition, StepKind, StepRunner};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default per-step timeout (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Default whole-pipeline timeout (30 minutes).
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 1800;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Result of a completed (or human-paused) triage run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    /// Final status: `Finalized` on the automated path, `AwaitingHuman` when
    /// the run paused for analyst review.
    pub status: RunStatus,
    /// Read-only snapshot of the final state.
    pub state: RunState,
    /// Step names that completed.
    pub completed_steps: Vec<String>,
}

// ---------------------------------------------------------------------------
// TriageExecutor
// ---------------------------------------------------------------------------

/// Wave-based DAG executor for the triage pipeline.
///
/// Generic over the repository and collaborator implementations.
pub struct TriageExecutor<R: RunRepository, S: StepServices> {
    checkpoint: Arc<CheckpointManager<R>>,
    runner: Arc<StepRunner<S>>,
    pipeline: Vec<StepDefinition>,
    cancellations: DashMap<Uuid, CancellationToken>,
    step_timeout: Duration,
    pipeline_timeout: Duration,
}

impl<R: RunRepository + 'static, S: StepServices + 'static> TriageExecutor<R, S> {
    /// Create an executor over the builtin parallel pipeline.
    pub fn new(repo: R, runner: StepRunner<S>) -> Self {
        Self::with_pipeline(repo, runner, triage_pipeline(true))
    }

    /// Create an executor over a custom pipeline.
    pub fn with_pipeline(repo: R, runner: StepRunner<S>, pipeline: Vec<StepDefinition>) -> Self {
        Self {
            checkpoint: Arc::new(CheckpointManager::new(repo)),
            runner: Arc::new(runner),
            pipeline,
            cancellations: DashMap::new(),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
        }
    }

    /// Override step and pipeline timeouts.
    pub fn with_timeouts(mut self, step: Duration, pipeline: Duration) -> Self {
        self.step_timeout = step;
        self.pipeline_timeout = pipeline;
        self
    }

    /// Access the checkpoint manager (HITL and presentation tiers load
    /// snapshots through it).
    pub fn checkpoint(&self) -> &CheckpointManager<R> {
        &self.checkpoint
    }

    /// Access the step runner (the HITL gate replays branch steps with it).
    pub fn runner(&self) -> &Arc<StepRunner<S>> {
        &self.runner
    }

    /// Execute the pipeline for a fresh alert.
    pub async fn execute(&self, alert: Alert) -> Result<ExecutionResult, ExecutorError> {
        let run_id = Uuid::now_v7();
        let token = CancellationToken::new();
        self.cancellations.insert(run_id, token.clone());

        let mut state = RunState::new(run_id, alert);
        self.checkpoint.save_state(&state, None).await;

        tracing::info!(
            run_id = %run_id,
            alert = state.alert.id.as_str(),
            "starting triage run"
        );

        let outcome = tokio::time::timeout(
            self.pipeline_timeout,
            self.run_waves(&mut state, &HashSet::new(), &token),
        )
        .await;

        self.cancellations.remove(&run_id);
        self.conclude(run_id, state, outcome).await
    }

    /// Resume a run from its last checkpoint, skipping completed steps.
    pub async fn resume(&self, run_id: Uuid) -> Result<ExecutionResult, ExecutorError> {
        let mut state = self.checkpoint.load_state(run_id).await?;

        if state.status.is_terminal() || state.status == RunStatus::AwaitingHuman {
            // Nothing left for the executor; HITL outcomes resolve elsewhere.
            let completed = self.checkpoint.completed_steps(run_id).await;
            return Ok(ExecutionResult {
                run_id,
                status: state.status,
                state,
                completed_steps: completed,
            });
        }

        let completed: HashSet<String> =
            self.checkpoint.completed_steps(run_id).await.into_iter().collect();
        let token = CancellationToken::new();
        self.cancellations.insert(run_id, token.clone());

        tracing::info!(
            run_id = %run_id,
            skipping = completed.len(),
            "resuming triage run"
        );

        let outcome = tokio::time::timeout(
            self.pipeline_timeout,
            self.run_waves(&mut state, &completed, &token),
        )
        .await;

        self.cancellations.remove(&run_id);
        self.conclude(run_id, state, outcome).await
    }

    /// Cancel a running pipeline. The current wave's external calls are not
    /// interrupted; the run stops between waves and stays resumable.
    pub fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        if let Some((_, token)) = self.cancellations.remove(&run_id) {
            token.cancel();
            tracing::info!(run_id = %run_id, "triage run cancelled");
            Ok(())
        } else {
            Err(ExecutorError::RunNotFound(run_id))
        }
    }

    async fn conclude(
        &self,
        run_id: Uuid,
        state: RunState,
        outcome: Result<Result<(), ExecutorError>, tokio::time::error::Elapsed>,
    ) -> Result<ExecutionResult, ExecutorError> {
        match outcome {
            Ok(Ok(())) => {
                self.checkpoint.save_state(&state, None).await;
                let completed = self.checkpoint.completed_steps(run_id).await;
                Ok(ExecutionResult {
                    run_id,
                    status: state.status,
                    state,
                    completed_steps: completed,
                })
            }
            Ok(Err(e)) => {
                self.checkpoint.save_state(&state, Some(&e.to_string())).await;
                Err(e)
            }
            Err(_elapsed) => {
                let e = ExecutorError::PipelineTimeout;
                self.checkpoint.save_state(&state, Some(&e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Execute waves of steps, skipping already-completed steps and branch
    /// steps whose route gate does not match the decision.
    async fn run_waves(
        &self,
        state: &mut RunState,
        completed: &HashSet<String>,
        token: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        let waves: Vec<Vec<StepDefinition>> = build_execution_plan(&self.pipeline)?
            .into_iter()
            .map(|wave| wave.into_iter().cloned().collect())
            .collect();

        for (wave_idx, wave) in waves.iter().enumerate() {
            if token.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }

            tracing::debug!(
                run_id = %state.run_id,
                wave = wave_idx,
                steps = wave.len(),
                "processing wave"
            );

            let mut join_set = JoinSet::new();

            for step_def in wave {
                if completed.contains(step_def.id.as_str()) {
                    tracing::debug!(step = step_def.id.as_str(), "skipping completed step");
                    continue;
                }

                // Conditional branch: dispatch only the step matching the
                // decision's routing token.
                if let Some(required) = step_def.route {
                    let taken = state.decision.as_ref().map(|d| d.route) == Some(required);
                    if !taken {
                        self.checkpoint
                            .checkpoint_step_skipped(state.run_id, step_def.id, "route not taken")
                            .await;
                        continue;
                    }
                }

                let step = step_def.clone();
                let runner = Arc::clone(&self.runner);
                let checkpoint = Arc::clone(&self.checkpoint);
                let snapshot = state.clone();
                let run_id = state.run_id;
                let step_timeout = self.step_timeout;
                let task_token = token.clone();

                join_set.spawn(async move {
                    if task_token.is_cancelled() {
                        return Err(ExecutorError::Cancelled);
                    }

                    let retry = step.retry.unwrap_or(RetryConfig { max_attempts: 1 });
                    let mut attempt = 1u32;

                    loop {
                        let log_id = checkpoint
                            .checkpoint_step_start(run_id, step.id, attempt)
                            .await;

                        let result = tokio::time::timeout(
                            step_timeout,
                            runner.run(step.id, &snapshot),
                        )
                        .await;

                        match result {
                            Ok(Ok(delta)) => {
                                if step.convergent && delta.is_empty() {
                                    // Upstream fields not present yet; not a
                                    // completion, so resume re-invokes it.
                                    checkpoint
                                        .checkpoint_step_skipped(
                                            run_id,
                                            step.id,
                                            "upstream fields incomplete",
                                        )
                                        .await;
                                } else {
                                    checkpoint
                                        .checkpoint_step_complete(log_id, Some(&delta.summary()))
                                        .await;
                                }
                                return Ok((step.id, delta));
                            }
                            Ok(Err(step_err)) => {
                                let msg = step_err.to_string();
                                checkpoint.checkpoint_step_failed(log_id, &msg).await;
                                if RetryPolicy::should_retry(&retry, attempt) {
                                    tracing::warn!(
                                        step = step.id.as_str(),
                                        attempt,
                                        error = msg.as_str(),
                                        "step failed; retrying against last-good state"
                                    );
                                    attempt += 1;
                                    continue;
                                }
                                return Err(ExecutorError::StepFailed {
                                    step: step.id.as_str(),
                                    error: msg,
                                });
                            }
                            Err(_elapsed) => {
                                checkpoint
                                    .checkpoint_step_failed(log_id, "step timed out")
                                    .await;
                                if RetryPolicy::should_retry(&retry, attempt) {
                                    attempt += 1;
                                    continue;
                                }
                                return Err(ExecutorError::StepTimeout {
                                    step: step.id.as_str(),
                                });
                            }
                        }
                    }
                });
            }

            // The join loop is the single-writer critical section: deltas
            // merge serially, and every successful sibling merges before the
            // wave reports its first failure.
            let mut first_error: Option<ExecutorError> = None;
            while let Some(joined) = join_set.join_next().await {
                let task_result =
                    joined.map_err(|e| ExecutorError::Join(e.to_string()))?;
                match task_result {
                    Ok((step_id, delta)) => {
                        apply_delta(state, delta)?;
                        self.checkpoint.save_state(state, None).await;
                        tracing::debug!(
                            run_id = %state.run_id,
                            step = step_id.as_str(),
                            "merged step delta"
                        );
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors that can occur during pipeline execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Pipeline definition error (cycle, unknown dependency).
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A delta violated the guarded merge contract.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Checkpoint load failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A step failed after exhausting its retry attempts.
    #[error("step '{step}' failed: {error}")]
    StepFailed { step: &'static str, error: String },

    /// A step exceeded its timeout after exhausting its retry attempts.
    #[error("step '{step}' timed out")]
    StepTimeout { step: &'static str },

    /// The whole pipeline exceeded its timeout.
    #[error("pipeline timed out")]
    PipelineTimeout,

    /// The run was cancelled between waves.
    #[error("run cancelled")]
    Cancelled,

    /// No such run (cancel/resume).
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// A spawned step task panicked or was aborted.
    #[error("task join error: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
