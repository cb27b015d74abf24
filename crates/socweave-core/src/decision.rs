//! The deterministic decision gate.
//!
//! Escalate into the automated branch iff the validity likelihood clears its
//! floor AND (severity clears its floor OR the exploitability level is in the
//! escalation set). Pure and side-effect free: the convergence pattern in the
//! executor may invoke it redundantly, and identical inputs must always yield
//! the identical routing token. A rule-forced decision takes precedence over
//! the threshold computation.

use socweave_types::policy::Thresholds;
use socweave_types::run::{Decision, RoutePath};
use socweave_types::score::{ExploitabilityScore, SeverityScore, ValidityScore};

/// Evaluate the gate.
///
/// `forced` is the routing decision carried by the highest-precedence matched
/// policy rule, if any; when present it overrides the threshold result (the
/// `escalate` flag still reports the threshold computation for the audit
/// trail).
pub fn evaluate(
    validity: &ValidityScore,
    severity: &SeverityScore,
    exploitability: &ExploitabilityScore,
    thresholds: &Thresholds,
    forced: Option<RoutePath>,
) -> Decision {
    let escalate = validity.likelihood >= thresholds.validity_tp_min
        && (severity.level >= thresholds.severity_min
            || thresholds
                .exploit_levels_escalate
                .contains(&exploitability.level));

    let threshold_route = if escalate {
        RoutePath::Automate
    } else {
        RoutePath::HumanReview
    };

    let (route, rationale) = match forced {
        Some(route) if route != threshold_route => (
            route,
            format!(
                "policy rule forces route '{}' (thresholds computed '{}': validity {:.2} vs {:.2}, severity {} vs {}, exploitability {:?})",
                route.as_str(),
                threshold_route.as_str(),
                validity.likelihood,
                thresholds.validity_tp_min,
                severity.level,
                thresholds.severity_min,
                exploitability.level,
            ),
        ),
        Some(route) => (
            route,
            format!(
                "policy rule confirms route '{}' matching thresholds",
                route.as_str()
            ),
        ),
        None => (
            threshold_route,
            format!(
                "validity {:.2} {} {:.2}; severity {} {} {}; exploitability {:?} {} escalation set",
                validity.likelihood,
                if validity.likelihood >= thresholds.validity_tp_min { ">=" } else { "<" },
                thresholds.validity_tp_min,
                severity.level,
                if severity.level >= thresholds.severity_min { ">=" } else { "<" },
                thresholds.severity_min,
                exploitability.level,
                if thresholds.exploit_levels_escalate.contains(&exploitability.level) { "in" } else { "not in" },
            ),
        ),
    };

    Decision {
        escalate,
        route,
        rationale,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
