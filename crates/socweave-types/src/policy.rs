//! Policy document types.
//!
//! The policy is versioned configuration: toggles, decision thresholds, and
//! an ordered list of playbook rules. It is loaded once, validated, and
//! treated as read-only for the duration of a run. Every struct carries
//! `deny_unknown_fields` so an unknown key at any nesting level is a hard
//! load-time error, and `validate()` range-checks everything serde cannot.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::run::RoutePath;
use crate::score::ExploitLevel;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Decision-gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    /// Minimum validity likelihood for escalation, in [0, 1].
    #[serde(default = "default_validity_tp_min")]
    pub validity_tp_min: f64,
    /// Minimum severity level for escalation (1..=3).
    #[serde(default = "default_severity_min")]
    pub severity_min: u8,
    /// Exploitability levels that escalate regardless of severity.
    #[serde(default = "default_exploit_levels_escalate")]
    pub exploit_levels_escalate: Vec<ExploitLevel>,
}

fn default_validity_tp_min() -> f64 {
    0.60
}

fn default_severity_min() -> u8 {
    2
}

fn default_exploit_levels_escalate() -> Vec<ExploitLevel> {
    vec![ExploitLevel::Medium, ExploitLevel::Critical]
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            validity_tp_min: default_validity_tp_min(),
            severity_min: default_severity_min(),
            exploit_levels_escalate: default_exploit_levels_escalate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Conjunction of typed predicates. An absent key is a wildcard (always true
/// for that dimension); keys outside this set are rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleWhen {
    /// Exact match on the inferred product metadata field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Exact match on the inferred alert-type metadata field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    /// Upper bound on severity level (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_max_level: Option<u8>,
    /// Lower bound on validity likelihood (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_tp_min: Option<f64>,
    /// Upper bound on validity likelihood (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_tp_max: Option<f64>,
    /// Exploitability level must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploitability_levels_in: Option<Vec<ExploitLevel>>,
    /// Exploitability level must not be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploitability_levels_not_in: Option<Vec<ExploitLevel>>,
}

/// Phase-to-steps mapping in a rule's action bundle. Only the three incident
/// response phases are accepted as keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhasePlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identification: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containment: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery: Vec<String>,
}

impl PhasePlan {
    /// All step names across phases, in phase order.
    pub fn all_steps(&self) -> impl Iterator<Item = &String> {
        self.identification
            .iter()
            .chain(self.containment.iter())
            .chain(self.recovery.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.identification.is_empty() && self.containment.is_empty() && self.recovery.is_empty()
    }
}

/// Action bundle applied when a rule matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDo {
    /// Forced routing decision, overriding the threshold gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RoutePath>,
    /// Automated action name to include in the playbook choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_action: Option<String>,
    /// Phase-to-steps plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<PhasePlan>,
}

/// One declarative playbook rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Rule identifier. Filled as `RULE_<n>` during validation when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Match precedence: lower wins. Filled from `default_rule_priority`
    /// during validation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub when: RuleWhen,
    #[serde(default, rename = "do")]
    pub action: RuleDo,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Upper bound accepted for rule priorities.
pub const MAX_RULE_PRIORITY: i32 = 10_000;

/// The versioned policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default = "default_policy_version")]
    pub policy_version: u32,
    /// When true, rule matching returns every matched rule instead of only
    /// the highest-precedence one.
    #[serde(default)]
    pub collect_all_matches: bool,
    /// Priority assigned to rules that omit one.
    #[serde(default = "default_rule_priority")]
    pub default_rule_priority: i32,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Ordered rule list; declaration order breaks priority ties.
    #[serde(default)]
    pub playbook_rules: Vec<Rule>,
}

fn default_policy_version() -> u32 {
    1
}

fn default_rule_priority() -> i32 {
    100
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            policy_version: default_policy_version(),
            collect_all_matches: false,
            default_rule_priority: default_rule_priority(),
            thresholds: Thresholds::default(),
            playbook_rules: Vec::new(),
        }
    }
}

impl Policy {
    /// Validate ranges and normalize the rule list in place.
    ///
    /// - thresholds: likelihood in [0, 1], severity level in 1..=3
    /// - rules: empty ids filled as `RULE_<n>`, missing priorities filled
    ///   from `default_rule_priority`, priorities bounded to
    ///   `0..=MAX_RULE_PRIORITY`, per-rule bounds range-checked
    ///
    /// Any violation is a fatal [`PolicyError::Validation`] raised before a
    /// run starts.
    pub fn validate(&mut self) -> Result<(), PolicyError> {
        if !(0.0..=1.0).contains(&self.thresholds.validity_tp_min) {
            return Err(PolicyError::Validation(format!(
                "thresholds.validity_tp_min {} outside [0, 1]",
                self.thresholds.validity_tp_min
            )));
        }
        if !(1..=3).contains(&self.thresholds.severity_min) {
            return Err(PolicyError::Validation(format!(
                "thresholds.severity_min {} outside 1..=3",
                self.thresholds.severity_min
            )));
        }
        if !(0..=MAX_RULE_PRIORITY).contains(&self.default_rule_priority) {
            return Err(PolicyError::Validation(format!(
                "default_rule_priority {} outside 0..={MAX_RULE_PRIORITY}",
                self.default_rule_priority
            )));
        }

        for (i, rule) in self.playbook_rules.iter_mut().enumerate() {
            if rule.id.is_empty() {
                rule.id = format!("RULE_{}", i + 1);
            }
            let priority = rule.priority.get_or_insert(self.default_rule_priority);
            if !(0..=MAX_RULE_PRIORITY).contains(priority) {
                return Err(PolicyError::Validation(format!(
                    "{}: priority {priority} outside 0..={MAX_RULE_PRIORITY}",
                    rule.id
                )));
            }

            let w = &rule.when;
            for (key, bound) in [
                ("validity_tp_min", w.validity_tp_min),
                ("validity_tp_max", w.validity_tp_max),
            ] {
                if let Some(v) = bound {
                    if !(0.0..=1.0).contains(&v) {
                        return Err(PolicyError::Validation(format!(
                            "{}: when.{key} {v} outside [0, 1]",
                            rule.id
                        )));
                    }
                }
            }
            if let (Some(lo), Some(hi)) = (w.validity_tp_min, w.validity_tp_max) {
                if lo > hi {
                    return Err(PolicyError::Validation(format!(
                        "{}: when.validity_tp_min {lo} > when.validity_tp_max {hi}",
                        rule.id
                    )));
                }
            }
            if let Some(level) = w.severity_max_level {
                if !(1..=3).contains(&level) {
                    return Err(PolicyError::Validation(format!(
                        "{}: when.severity_max_level {level} outside 1..=3",
                        rule.id
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_documented_defaults() {
        let policy = Policy::default();
        assert_eq!(policy.policy_version, 1);
        assert!(!policy.collect_all_matches);
        assert_eq!(policy.default_rule_priority, 100);
        assert!((policy.thresholds.validity_tp_min - 0.60).abs() < f64::EPSILON);
        assert_eq!(policy.thresholds.severity_min, 2);
        assert_eq!(
            policy.thresholds.exploit_levels_escalate,
            vec![ExploitLevel::Medium, ExploitLevel::Critical]
        );
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let yaml = "policy_version: 1\nranking_model: fancy\n";
        let err = serde_yaml_ng::from_str::<Policy>(yaml).unwrap_err();
        assert!(err.to_string().contains("ranking_model"), "got: {err}");
    }

    #[test]
    fn unknown_when_key_is_rejected() {
        let yaml = r#"
playbook_rules:
  - id: R1
    when:
      product: CrowdStrike
      hostname: srv-42
"#;
        let err = serde_yaml_ng::from_str::<Policy>(yaml).unwrap_err();
        assert!(err.to_string().contains("hostname"), "got: {err}");
    }

    #[test]
    fn unknown_do_key_is_rejected() {
        let yaml = r#"
playbook_rules:
  - id: R1
    do:
      auto_action: auto_close
      escalate_to: tier2
"#;
        let err = serde_yaml_ng::from_str::<Policy>(yaml).unwrap_err();
        assert!(err.to_string().contains("escalate_to"), "got: {err}");
    }

    #[test]
    fn unknown_phase_key_is_rejected() {
        let yaml = r#"
playbook_rules:
  - id: R1
    do:
      phases:
        identification: [triage]
        eradication: [wipe]
"#;
        let err = serde_yaml_ng::from_str::<Policy>(yaml).unwrap_err();
        assert!(err.to_string().contains("eradication"), "got: {err}");
    }

    #[test]
    fn unknown_decision_token_is_rejected() {
        let yaml = r#"
playbook_rules:
  - id: R1
    do:
      decision: upload_xsoar
"#;
        assert!(serde_yaml_ng::from_str::<Policy>(yaml).is_err());
    }

    #[test]
    fn validate_fills_ids_and_priorities() {
        let yaml = r#"
default_rule_priority: 50
playbook_rules:
  - when:
      product: CrowdStrike
  - id: NAMED
    priority: 10
"#;
        let mut policy: Policy = serde_yaml_ng::from_str(yaml).unwrap();
        policy.validate().unwrap();
        assert_eq!(policy.playbook_rules[0].id, "RULE_1");
        assert_eq!(policy.playbook_rules[0].priority, Some(50));
        assert_eq!(policy.playbook_rules[1].id, "NAMED");
        assert_eq!(policy.playbook_rules[1].priority, Some(10));
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let mut policy = Policy::default();
        policy.thresholds.validity_tp_min = 1.5;
        assert!(policy.validate().is_err());

        let mut policy = Policy::default();
        policy.thresholds.severity_min = 0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_validity_bounds() {
        let mut policy = Policy::default();
        policy.playbook_rules.push(Rule {
            id: "R1".to_string(),
            enabled: true,
            priority: Some(10),
            description: String::new(),
            when: RuleWhen {
                validity_tp_min: Some(0.8),
                validity_tp_max: Some(0.2),
                ..RuleWhen::default()
            },
            action: RuleDo::default(),
        });
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("validity_tp_min"));
    }

    #[test]
    fn validate_rejects_priority_out_of_range() {
        let mut policy = Policy::default();
        policy.playbook_rules.push(Rule {
            id: "R1".to_string(),
            enabled: true,
            priority: Some(-5),
            description: String::new(),
            when: RuleWhen::default(),
            action: RuleDo::default(),
        });
        assert!(policy.validate().is_err());
    }

    #[test]
    fn phase_plan_all_steps_in_phase_order() {
        let plan = PhasePlan {
            identification: vec!["triage".to_string()],
            containment: vec!["isolate_host".to_string(), "block_ip".to_string()],
            recovery: vec!["restore".to_string()],
        };
        let steps: Vec<&String> = plan.all_steps().collect();
        assert_eq!(steps, vec!["triage", "isolate_host", "block_ip", "restore"]);
    }

    #[test]
    fn realistic_policy_yaml_parses() {
        let yaml = r#"
policy_version: 3
collect_all_matches: false
default_rule_priority: 100
thresholds:
  validity_tp_min: 0.6
  severity_min: 2
  exploit_levels_escalate: ["Medium", "Critical"]
playbook_rules:
  - id: FP_AUTOCLOSE
    priority: 10
    description: Auto-close obvious false positives
    when:
      validity_tp_max: 0.2
      exploitability_levels_not_in: ["Critical"]
    do:
      decision: human_review
      auto_action: log_false_positive
  - id: EDR_ESCALATE
    priority: 20
    when:
      product: CrowdStrike
      alert_type: EDR
      exploitability_levels_in: ["Medium", "Critical"]
    do:
      decision: automate
      auto_action: escalate
      phases:
        identification: [collect_forensics]
        containment: [isolate_host]
"#;
        let mut policy: Policy = serde_yaml_ng::from_str(yaml).unwrap();
        policy.validate().unwrap();
        assert_eq!(policy.policy_version, 3);
        assert_eq!(policy.playbook_rules.len(), 2);
        assert_eq!(
            policy.playbook_rules[1].action.decision,
            Some(RoutePath::Automate)
        );
    }
}
