//! The triage pipeline topology and step bodies.
//!
//! Nine named steps: enrichment fans out into three concurrent scorers, the
//! playbook-selection convergence point feeds the decision gate, the decision
//! routes into exactly one of two branch steps, and both branches converge on
//! a final status update. [`StepRunner`] dispatches each step body against a
//! read-only state snapshot and returns the step's [`StateDelta`] -- steps
//! never mutate run state directly.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use socweave_types::error::CollaboratorError;
use socweave_types::log::{events, ActionLog};
use socweave_types::policy::Policy;
use socweave_types::run::{Enrichment, PlaybookChoice, RoutePath, RunState, RunStatus};

use crate::collaborator::StepServices;
use crate::decision;
use crate::policy::{forced_route, select_matching_rules};

use super::retry::RetryConfig;
use super::state::{FieldWrite, StateDelta};

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// The closed set of pipeline step identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Enrich,
    ScoreValidity,
    ScoreSeverity,
    ScoreExploitability,
    SelectPlaybooks,
    Decide,
    UploadCase,
    NotifyTriage,
    UpdateStatus,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrich => "enrich",
            Self::ScoreValidity => "score_validity",
            Self::ScoreSeverity => "score_severity",
            Self::ScoreExploitability => "score_exploitability",
            Self::SelectPlaybooks => "select_playbooks",
            Self::Decide => "decide",
            Self::UploadCase => "upload_case",
            Self::NotifyTriage => "notify_triage",
            Self::UpdateStatus => "update_status",
        }
    }
}

impl FromStr for StepKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrich" => Ok(Self::Enrich),
            "score_validity" => Ok(Self::ScoreValidity),
            "score_severity" => Ok(Self::ScoreSeverity),
            "score_exploitability" => Ok(Self::ScoreExploitability),
            "select_playbooks" => Ok(Self::SelectPlaybooks),
            "decide" => Ok(Self::Decide),
            "upload_case" => Ok(Self::UploadCase),
            "notify_triage" => Ok(Self::NotifyTriage),
            "update_status" => Ok(Self::UpdateStatus),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// StepDefinition and the builtin pipeline
// ---------------------------------------------------------------------------

/// One node of the pipeline DAG.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: StepKind,
    /// Upstream dependency edges.
    pub depends_on: Vec<StepKind>,
    /// Route gate: the step only runs when the decision carries this route;
    /// otherwise the executor checkpoints it as skipped.
    pub route: Option<RoutePath>,
    /// Convergence step: safely re-invocable before all upstream fields are
    /// present (returns the empty delta until they are).
    pub convergent: bool,
    /// In-run retry configuration; `None` disables retry.
    pub retry: Option<RetryConfig>,
}

/// The builtin triage topology.
///
/// With `parallel` set, the three scorers fan out after enrichment and rejoin
/// at playbook selection; otherwise they run as a chain (useful when the
/// scoring collaborators share a rate-limited backend).
pub fn triage_pipeline(parallel: bool) -> Vec<StepDefinition> {
    fn step(
        id: StepKind,
        depends_on: Vec<StepKind>,
        route: Option<RoutePath>,
        convergent: bool,
        retry: Option<RetryConfig>,
    ) -> StepDefinition {
        StepDefinition {
            id,
            depends_on,
            route,
            convergent,
            retry,
        }
    }
    let scorer_retry = Some(RetryConfig::default());

    let (validity_deps, severity_deps, exploit_deps) = if parallel {
        (
            vec![StepKind::Enrich],
            vec![StepKind::Enrich],
            vec![StepKind::Enrich],
        )
    } else {
        (
            vec![StepKind::Enrich],
            vec![StepKind::ScoreValidity],
            vec![StepKind::ScoreSeverity],
        )
    };

    vec![
        step(StepKind::Enrich, vec![], None, false, None),
        step(StepKind::ScoreValidity, validity_deps, None, false, scorer_retry),
        step(StepKind::ScoreSeverity, severity_deps, None, false, scorer_retry),
        step(StepKind::ScoreExploitability, exploit_deps, None, false, scorer_retry),
        step(
            StepKind::SelectPlaybooks,
            vec![
                StepKind::ScoreValidity,
                StepKind::ScoreSeverity,
                StepKind::ScoreExploitability,
            ],
            None,
            true,
            None,
        ),
        step(StepKind::Decide, vec![StepKind::SelectPlaybooks], None, true, None),
        step(
            StepKind::UploadCase,
            vec![StepKind::Decide],
            Some(RoutePath::Automate),
            false,
            None,
        ),
        step(
            StepKind::NotifyTriage,
            vec![StepKind::Decide],
            Some(RoutePath::HumanReview),
            false,
            None,
        ),
        step(
            StepKind::UpdateStatus,
            vec![StepKind::UploadCase, StepKind::NotifyTriage],
            None,
            false,
            None,
        ),
    ]
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors from a step body. The executor reports them with step identity and
/// never merges a failed step's delta.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An external collaborator call failed.
    #[error("collaborator call failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// A required upstream field is missing (dependency contract violation).
    #[error("missing upstream field: {0}")]
    MissingInput(&'static str),
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual steps by dispatching to per-kind handlers.
pub struct StepRunner<S: StepServices> {
    services: Arc<S>,
    policy: Arc<Policy>,
}

impl<S: StepServices> StepRunner<S> {
    pub fn new(services: Arc<S>, policy: Arc<Policy>) -> Self {
        Self { services, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run one step against a state snapshot and return its delta.
    pub async fn run(&self, step: StepKind, state: &RunState) -> Result<StateDelta, StepError> {
        match step {
            StepKind::Enrich => self.enrich(state).await,
            StepKind::ScoreValidity => self.score_validity(state).await,
            StepKind::ScoreSeverity => self.score_severity(state).await,
            StepKind::ScoreExploitability => self.score_exploitability(state).await,
            StepKind::SelectPlaybooks => self.select_playbooks(state),
            StepKind::Decide => self.decide(state),
            StepKind::UploadCase => self.upload_case(state).await,
            StepKind::NotifyTriage => self.notify_triage(state).await,
            StepKind::UpdateStatus => self.update_status(state).await,
        }
    }

    // -- enrichment --

    async fn enrich(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let mut enrichment = Enrichment::default();
        for indicator in &state.alert.indicators {
            enrichment
                .internal
                .extend(self.services.search_internal(&indicator.value).await?);
            if indicator.indicator_type.is_network_observable() {
                enrichment
                    .external
                    .extend(self.services.search_external(&indicator.value).await?);
            }
        }

        let (internal, external) = enrichment.counts();
        Ok(StateDelta::empty()
            .write(FieldWrite::Enrichment(enrichment))
            .log(ActionLog::now(
                events::ENRICHED,
                details(&[("internal", json!(internal)), ("external", json!(external))]),
            )))
    }

    // -- scoring fan-out --

    async fn score_validity(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let enrichment = state
            .enrichment
            .as_ref()
            .ok_or(StepError::MissingInput("enrichment"))?;
        let score = self
            .services
            .score_validity(&state.alert, enrichment)
            .await?;
        score.validate()?;
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::SCORED_VALIDITY,
                details(&[("score", json!(score))]),
            ))
            .write(FieldWrite::Validity(score)))
    }

    async fn score_severity(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let enrichment = state
            .enrichment
            .as_ref()
            .ok_or(StepError::MissingInput("enrichment"))?;
        let score = self
            .services
            .score_severity(&state.alert, enrichment)
            .await?;
        score.validate()?;
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::SCORED_SEVERITY,
                details(&[("score", json!(score))]),
            ))
            .write(FieldWrite::Severity(score)))
    }

    async fn score_exploitability(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let enrichment = state
            .enrichment
            .as_ref()
            .ok_or(StepError::MissingInput("enrichment"))?;
        let score = self
            .services
            .score_exploitability(&state.alert, enrichment)
            .await?;
        score.validate()?;
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::SCORED_EXPLOITABILITY,
                details(&[("score", json!(score))]),
            ))
            .write(FieldWrite::Exploitability(score)))
    }

    // -- playbook convergence --

    /// Convergence point with three upstream dependencies. Returns the empty
    /// delta until all scores are present, so redundant invocation (one per
    /// upstream completion, or on resume) is harmless.
    fn select_playbooks(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let (Some(validity), Some(severity), Some(exploitability)) =
            (&state.validity, &state.severity, &state.exploitability)
        else {
            return Ok(StateDelta::empty());
        };

        let matched = select_matching_rules(
            &self.policy,
            &state.alert,
            validity,
            severity,
            exploitability,
        );

        let mut names: Vec<String> = Vec::new();
        for rule in &matched {
            if let Some(action) = &rule.action.auto_action {
                push_unique(&mut names, action);
            }
            if let Some(phases) = &rule.action.phases {
                for step in phases.all_steps() {
                    push_unique(&mut names, step);
                }
            }
        }

        let rationale = if matched.is_empty() {
            names = default_playbooks(severity.level, exploitability.level);
            format!(
                "no policy rule matched; score-driven defaults (severity {}, exploitability {:?})",
                severity.level, exploitability.level
            )
        } else {
            if names.is_empty() {
                names = default_playbooks(severity.level, exploitability.level);
            }
            let ids: Vec<&str> = matched.iter().map(|r| r.id.as_str()).collect();
            format!("matched policy rules: {}", ids.join(", "))
        };

        let choice = PlaybookChoice { names, rationale };
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::SELECTED_PLAYBOOKS,
                details(&[
                    ("playbooks", json!(choice)),
                    ("policy_version", json!(self.policy.policy_version)),
                    ("rules_count", json!(self.policy.playbook_rules.len())),
                ]),
            ))
            .write(FieldWrite::Playbooks(choice)))
    }

    // -- decision gate --

    /// Also tolerant of redundant invocation: no delta until scores exist.
    fn decide(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let (Some(validity), Some(severity), Some(exploitability)) =
            (&state.validity, &state.severity, &state.exploitability)
        else {
            return Ok(StateDelta::empty());
        };

        let matched = select_matching_rules(
            &self.policy,
            &state.alert,
            validity,
            severity,
            exploitability,
        );
        let forced = forced_route(&matched);

        let decision = decision::evaluate(
            validity,
            severity,
            exploitability,
            &self.policy.thresholds,
            forced,
        );

        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::DECISION_MADE,
                details(&[("decision", json!(decision))]),
            ))
            .write(FieldWrite::Decision(decision)))
    }

    // -- automated branch --

    async fn upload_case(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let payload = json!({
            "alert": state.alert,
            "scores": {
                "validity": state.validity.as_ref().ok_or(StepError::MissingInput("validity"))?,
                "severity": state.severity.as_ref().ok_or(StepError::MissingInput("severity"))?,
                "exploitability": state.exploitability.as_ref().ok_or(StepError::MissingInput("exploitability"))?,
            },
            "playbooks": state.playbooks,
        });

        let receipt = self.services.upload_case(&payload).await?;
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::CASE_UPLOADED,
                details(&[
                    ("case_ref", json!(receipt.case_id)),
                    ("response", receipt.response.clone()),
                ]),
            ))
            .write(FieldWrite::CaseRef(receipt.case_id))
            .write(FieldWrite::StatusNote("Uploaded to case manager".to_string())))
    }

    // -- human review branch --

    async fn notify_triage(&self, state: &RunState) -> Result<StateDelta, StepError> {
        let payload = json!({
            "alert": state.alert,
            "note": "Low automation confidence; please triage.",
            "scores": {
                "validity": state.validity,
                "severity": state.severity,
                "exploitability": state.exploitability,
            },
        });

        let response = self.services.notify_analysts(&payload).await?;
        Ok(StateDelta::empty()
            .log(ActionLog::now(
                events::TRIAGE_NOTIFIED,
                details(&[("response", response)]),
            ))
            .write(FieldWrite::StatusNote("Queued for human triage".to_string()))
            .write(FieldWrite::Status(RunStatus::AwaitingHuman)))
    }

    // -- convergent status update --

    /// Final step of both branches. When a case was uploaded it opens the
    /// case and finalizes; on the human-review path there is nothing to
    /// update yet, so it records a no-op and leaves the run awaiting its
    /// analyst outcome.
    async fn update_status(&self, state: &RunState) -> Result<StateDelta, StepError> {
        if let Some(case_ref) = &state.case_ref {
            let response = self
                .services
                .update_case_status(case_ref, "Open")
                .await?;
            Ok(StateDelta::empty()
                .log(ActionLog::now(
                    events::CASE_STATUS_UPDATED,
                    details(&[("case_ref", json!(case_ref)), ("response", response)]),
                ))
                .write(FieldWrite::StatusNote("Case open".to_string()))
                .write(FieldWrite::Status(RunStatus::Finalized)))
        } else {
            Ok(StateDelta::empty().log(ActionLog::now(
                events::STATUS_NOOP,
                details(&[(
                    "status_note",
                    json!(state.status_note.clone().unwrap_or_else(|| "unknown".to_string())),
                )]),
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn details(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Score-driven fallback playbooks when no rule supplies actions.
fn default_playbooks(
    severity_level: u8,
    exploit_level: socweave_types::score::ExploitLevel,
) -> Vec<String> {
    use socweave_types::score::ExploitLevel;
    match (severity_level, exploit_level) {
        (3, _) | (_, ExploitLevel::Critical) => vec![
            "Isolate Host".to_string(),
            "Block Indicator".to_string(),
            "Collect Forensics".to_string(),
        ],
        (2, _) | (_, ExploitLevel::Medium) => vec![
            "Block Indicator".to_string(),
            "Collect Forensics".to_string(),
        ],
        _ => vec![
            "Monitor".to_string(),
            "Close If No Recurrence".to_string(),
        ],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use socweave_types::alert::{Alert, Indicator, IndicatorType};
    use socweave_types::policy::{Rule, RuleDo, RuleWhen};
    use uuid::Uuid;

    use crate::collaborator::StaticServices;
    use crate::engine::state::apply_delta;

    fn alert_with_indicators() -> Alert {
        Alert {
            id: "AL-1".to_string(),
            source: "SIEM".to_string(),
            title: "CrowdStrike EDR detection".to_string(),
            description: "suspicious process on endpoint srv-42".to_string(),
            indicators: vec![
                Indicator {
                    indicator_type: IndicatorType::Ip,
                    value: "203.0.113.7".to_string(),
                    context: None,
                },
                Indicator {
                    indicator_type: IndicatorType::Host,
                    value: "srv-42".to_string(),
                    context: None,
                },
            ],
            created_at: Utc::now(),
        }
    }

    fn runner(services: StaticServices, policy: Policy) -> StepRunner<StaticServices> {
        StepRunner::new(Arc::new(services), Arc::new(policy))
    }

    async fn state_through_scoring(runner: &StepRunner<StaticServices>) -> RunState {
        let mut state = RunState::new(Uuid::now_v7(), alert_with_indicators());
        for step in [
            StepKind::Enrich,
            StepKind::ScoreValidity,
            StepKind::ScoreSeverity,
            StepKind::ScoreExploitability,
        ] {
            let delta = runner.run(step, &state).await.unwrap();
            apply_delta(&mut state, delta).unwrap();
        }
        state
    }

    // -----------------------------------------------------------------------
    // Enrichment
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn enrich_queries_external_only_for_network_observables() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let state = RunState::new(Uuid::now_v7(), alert_with_indicators());

        let delta = runner.run(StepKind::Enrich, &state).await.unwrap();
        let mut state = state;
        apply_delta(&mut state, delta).unwrap();

        let enrichment = state.enrichment.unwrap();
        // two indicators hit internal search, only the IP hits external
        assert_eq!(enrichment.internal.len(), 4);
        assert_eq!(enrichment.external.len(), 2);
        assert_eq!(state.logs[0].event, events::ENRICHED);
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn scorer_requires_enrichment() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let state = RunState::new(Uuid::now_v7(), alert_with_indicators());
        let err = runner.run(StepKind::ScoreValidity, &state).await.unwrap_err();
        assert!(matches!(err, StepError::MissingInput("enrichment")));
    }

    #[tokio::test]
    async fn scorers_write_disjoint_fields() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let state = state_through_scoring(&runner).await;
        assert!(state.scores_complete());
        assert_eq!(state.status, RunStatus::Scored);
    }

    // -----------------------------------------------------------------------
    // Playbook convergence idempotency
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn select_playbooks_is_idempotent_over_accumulating_state() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let mut state = RunState::new(Uuid::now_v7(), alert_with_indicators());

        // Invocations before scores are present: empty deltas.
        let mut non_empty = 0;
        for step in [
            StepKind::Enrich,
            StepKind::ScoreValidity,
            StepKind::ScoreSeverity,
            StepKind::ScoreExploitability,
        ] {
            let probe = runner.run(StepKind::SelectPlaybooks, &state).await.unwrap();
            if !probe.is_empty() {
                non_empty += 1;
            }
            apply_delta(&mut state, probe).unwrap();

            let delta = runner.run(step, &state).await.unwrap();
            apply_delta(&mut state, delta).unwrap();
        }

        // First invocation with all scores present: the real delta.
        let delta = runner.run(StepKind::SelectPlaybooks, &state).await.unwrap();
        assert!(!delta.is_empty());
        non_empty += 1;
        apply_delta(&mut state, delta).unwrap();

        assert_eq!(non_empty, 1, "non-empty delta exactly once");
        assert!(state.playbooks.is_some());
    }

    #[tokio::test]
    async fn matched_rule_actions_feed_playbook_names() {
        let mut policy = Policy::default();
        policy.playbook_rules = vec![Rule {
            id: "EDR_ESCALATE".to_string(),
            enabled: true,
            priority: Some(10),
            description: String::new(),
            when: RuleWhen {
                product: Some("CrowdStrike".to_string()),
                ..RuleWhen::default()
            },
            action: RuleDo {
                decision: None,
                auto_action: Some("escalate".to_string()),
                phases: Some(socweave_types::policy::PhasePlan {
                    identification: vec!["collect_forensics".to_string()],
                    containment: vec!["isolate_host".to_string()],
                    recovery: vec![],
                }),
            },
        }];

        let runner = runner(StaticServices::escalating(), policy);
        let mut state = state_through_scoring(&runner).await;
        let delta = runner.run(StepKind::SelectPlaybooks, &state).await.unwrap();
        apply_delta(&mut state, delta).unwrap();

        let playbooks = state.playbooks.unwrap();
        assert_eq!(
            playbooks.names,
            vec!["escalate", "collect_forensics", "isolate_host"]
        );
        assert!(playbooks.rationale.contains("EDR_ESCALATE"));
    }

    #[tokio::test]
    async fn unmatched_policy_falls_back_to_score_defaults() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let mut state = state_through_scoring(&runner).await;
        let delta = runner.run(StepKind::SelectPlaybooks, &state).await.unwrap();
        apply_delta(&mut state, delta).unwrap();

        let playbooks = state.playbooks.unwrap();
        assert_eq!(playbooks.names, vec!["Block Indicator", "Collect Forensics"]);
        assert!(playbooks.rationale.contains("score-driven defaults"));
    }

    // -----------------------------------------------------------------------
    // Decide
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn decide_returns_empty_delta_before_scores() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let state = RunState::new(Uuid::now_v7(), alert_with_indicators());
        let delta = runner.run(StepKind::Decide, &state).await.unwrap();
        assert!(delta.is_empty());
    }

    #[tokio::test]
    async fn decide_applies_rule_forced_route() {
        let mut policy = Policy::default();
        policy.playbook_rules = vec![Rule {
            id: "FORCE_HUMAN".to_string(),
            enabled: true,
            priority: Some(1),
            description: String::new(),
            when: RuleWhen::default(),
            action: RuleDo {
                decision: Some(RoutePath::HumanReview),
                auto_action: None,
                phases: None,
            },
        }];

        let runner = runner(StaticServices::escalating(), policy);
        let mut state = state_through_scoring(&runner).await;
        let delta = runner.run(StepKind::Decide, &state).await.unwrap();
        apply_delta(&mut state, delta).unwrap();

        let decision = state.decision.unwrap();
        assert_eq!(decision.route, RoutePath::HumanReview);
        assert!(decision.escalate, "thresholds would have escalated");
    }

    // -----------------------------------------------------------------------
    // Branches and status update
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn automated_branch_uploads_then_finalizes() {
        let runner = runner(StaticServices::escalating(), Policy::default());
        let mut state = state_through_scoring(&runner).await;
        for step in [StepKind::SelectPlaybooks, StepKind::Decide, StepKind::UploadCase] {
            let delta = runner.run(step, &state).await.unwrap();
            apply_delta(&mut state, delta).unwrap();
        }
        assert!(state.case_ref.is_some());

        let delta = runner.run(StepKind::UpdateStatus, &state).await.unwrap();
        apply_delta(&mut state, delta).unwrap();
        assert_eq!(state.status, RunStatus::Finalized);
        assert_eq!(state.status_note.as_deref(), Some("Case open"));
        assert!(state.logs.iter().any(|l| l.event == events::CASE_STATUS_UPDATED));
    }

    #[tokio::test]
    async fn human_branch_notifies_and_stays_awaiting() {
        let runner = runner(StaticServices::inconclusive(), Policy::default());
        let mut state = state_through_scoring(&runner).await;
        for step in [StepKind::SelectPlaybooks, StepKind::Decide, StepKind::NotifyTriage] {
            let delta = runner.run(step, &state).await.unwrap();
            apply_delta(&mut state, delta).unwrap();
        }
        assert_eq!(state.status, RunStatus::AwaitingHuman);

        let delta = runner.run(StepKind::UpdateStatus, &state).await.unwrap();
        apply_delta(&mut state, delta).unwrap();
        assert_eq!(state.status, RunStatus::AwaitingHuman, "no case to open yet");
        assert!(state.logs.iter().any(|l| l.event == events::STATUS_NOOP));
    }

    // -----------------------------------------------------------------------
    // StepKind string mapping
    // -----------------------------------------------------------------------

    #[test]
    fn step_kind_string_roundtrip() {
        for kind in [
            StepKind::Enrich,
            StepKind::ScoreValidity,
            StepKind::ScoreSeverity,
            StepKind::ScoreExploitability,
            StepKind::SelectPlaybooks,
            StepKind::Decide,
            StepKind::UploadCase,
            StepKind::NotifyTriage,
            StepKind::UpdateStatus,
        ] {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
        assert!("not_a_step".parse::<StepKind>().is_err());
    }
}
