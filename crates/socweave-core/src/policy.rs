//! Policy loading and the declarative rule engine.
//!
//! A rule matches iff it is enabled and every *present* predicate in its
//! `when` clause evaluates true; an absent predicate is a wildcard. Matching
//! returns either the single highest-precedence rule (lowest priority value,
//! declaration order breaking ties) or every match when the policy's
//! `collect_all_matches` toggle is set. The matched set is advisory context
//! for playbook selection and the decision gate; it never mutates run state
//! itself.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use socweave_types::alert::Alert;
use socweave_types::error::PolicyError;
use socweave_types::policy::{Policy, Rule};
use socweave_types::run::RoutePath;
use socweave_types::score::{ExploitabilityScore, SeverityScore, ValidityScore};

// ---------------------------------------------------------------------------
// Alert metadata inference
// ---------------------------------------------------------------------------

/// Coarse metadata derived from an alert's free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertMeta {
    pub product: Option<String>,
    pub alert_type: Option<String>,
}

/// Infer product and alert-type metadata by keyword scan over title and
/// description.
///
/// Known accuracy limitation: substring matching over free text is fragile
/// (a description merely *mentioning* a product will match). Preserved as
/// specified; rules that need precision should match on score predicates
/// instead.
pub fn infer_alert_meta(alert: &Alert) -> AlertMeta {
    let text = format!("{} {}", alert.title, alert.description).to_lowercase();

    let product = if text.contains("crowdstrike") || text.contains("edr") {
        Some("CrowdStrike".to_string())
    } else {
        None
    };

    let alert_type = if text.contains("brute") || text.contains("password spray") {
        Some("Auth/BruteForce".to_string())
    } else if text.contains("edr") || text.contains("endpoint") {
        Some("EDR".to_string())
    } else {
        None
    };

    AlertMeta { product, alert_type }
}

// ---------------------------------------------------------------------------
// Rule matching
// ---------------------------------------------------------------------------

/// Evaluate one rule's `when` conjunction against metadata and scores.
pub fn rule_matches(
    meta: &AlertMeta,
    validity: &ValidityScore,
    severity: &SeverityScore,
    exploitability: &ExploitabilityScore,
    rule: &Rule,
) -> bool {
    if !rule.enabled {
        return false;
    }
    let w = &rule.when;

    if let Some(product) = &w.product {
        if meta.product.as_deref() != Some(product.as_str()) {
            return false;
        }
    }
    if let Some(alert_type) = &w.alert_type {
        if meta.alert_type.as_deref() != Some(alert_type.as_str()) {
            return false;
        }
    }

    if let Some(max_level) = w.severity_max_level {
        if severity.level > max_level {
            return false;
        }
    }
    if let Some(min) = w.validity_tp_min {
        if validity.likelihood < min {
            return false;
        }
    }
    if let Some(max) = w.validity_tp_max {
        if validity.likelihood > max {
            return false;
        }
    }

    if let Some(levels) = &w.exploitability_levels_in {
        if !levels.contains(&exploitability.level) {
            return false;
        }
    }
    if let Some(levels) = &w.exploitability_levels_not_in {
        if levels.contains(&exploitability.level) {
            return false;
        }
    }

    true
}

/// Select the matching rules for an alert/score tuple.
///
/// Matches are stable-sorted ascending by priority, so declaration order
/// breaks ties. Returns only the first match unless `collect_all_matches`
/// is set.
pub fn select_matching_rules<'a>(
    policy: &'a Policy,
    alert: &Alert,
    validity: &ValidityScore,
    severity: &SeverityScore,
    exploitability: &ExploitabilityScore,
) -> Vec<&'a Rule> {
    let meta = infer_alert_meta(alert);
    let mut matches: Vec<&Rule> = policy
        .playbook_rules
        .iter()
        .filter(|r| rule_matches(&meta, validity, severity, exploitability, r))
        .collect();

    if matches.is_empty() {
        return matches;
    }

    // Vec::sort_by_key is stable; ties keep declaration order.
    matches.sort_by_key(|r| r.priority.unwrap_or(policy.default_rule_priority));

    if policy.collect_all_matches {
        matches
    } else {
        matches.truncate(1);
        matches
    }
}

/// The forced routing decision among matched rules, if any.
///
/// Matches are already precedence-ordered, so the first rule carrying a
/// `do.decision` wins.
pub fn forced_route(matches: &[&Rule]) -> Option<RoutePath> {
    matches.iter().find_map(|r| r.action.decision)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse a YAML policy document and validate it.
///
/// Unknown keys at any nesting level and out-of-range values are fatal
/// configuration errors -- a malformed policy never reaches a run.
pub fn parse_policy_yaml(yaml: &str) -> Result<Policy, PolicyError> {
    let mut policy: Policy =
        serde_yaml_ng::from_str(yaml).map_err(|e| PolicyError::Parse(e.to_string()))?;
    policy.validate()?;
    Ok(policy)
}

/// Load and validate a policy document from a YAML file.
pub fn load_policy_file(path: &Path) -> Result<Policy, PolicyError> {
    let content = std::fs::read_to_string(path)?;
    parse_policy_yaml(&content)
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// The engine's policy handle: constructed once, passed by reference, with
/// an explicit reload operation.
///
/// Reads hand out a cheap `Arc<Policy>` snapshot, so an in-flight run keeps
/// the policy version it started with even across a reload.
pub struct PolicyStore {
    current: RwLock<Arc<Policy>>,
    path: Option<PathBuf>,
}

impl PolicyStore {
    /// Load the store from a YAML file, remembering the path for reloads.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let path = path.into();
        let policy = load_policy_file(&path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(policy)),
            path: Some(path),
        })
    }

    /// Wrap an already-validated policy (tests, embedded defaults).
    pub fn from_policy(policy: Policy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
            path: None,
        }
    }

    /// Snapshot of the current policy.
    pub fn current(&self) -> Arc<Policy> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read the policy from disk. The swap happens only after the new
    /// document parses and validates; a bad reload leaves the old policy in
    /// place and returns the error.
    pub fn reload(&self) -> Result<(), PolicyError> {
        let path = self.path.as_ref().ok_or_else(|| {
            PolicyError::Validation("policy store has no backing file to reload".to_string())
        })?;
        let policy = load_policy_file(path)?;
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(policy);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
