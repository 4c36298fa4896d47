//! fck-governance
//!
//! A default, non-mock `GovernanceGate` implementation.
//!
//! `spec.md` §6 describes governance as a collaborator contract the kernel
//! only ever calls through — it never evaluates policy itself. A kernel that
//! can *only* be driven by an externally-hosted governance service is
//! unusable standalone, so this crate supplies one small, local, glob- and
//! invariant-based rule engine that satisfies the contract: a pure function
//! of the frame plus its own pinned rule set.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use fck_core::CanonicalActionFrame;
use fck_glob::{IncludeExcludeGlobs, MatchDecision};
use fck_kernel::{GovernanceDecision, GovernanceGate};

/// A `GovernanceGate` that evaluates two local rules against a frame:
///
/// 1. `action_id` must pass the compiled include/exclude glob rules (the
///    same "allow/deny by pattern" shape used for tool names elsewhere,
///    applied here to the frame's `action_id` since a `CanonicalActionFrame`
///    has no separate "operation" field of its own).
/// 2. Every key in `invariant_keys_required` must be present among the
///    frame's `extensions` keys.
///
/// Both rules are pure functions of the frame; no kernel state or I/O is
/// consulted, satisfying `spec.md` §6's purity requirement.
#[derive(Debug, Clone)]
pub struct RuleBasedGovernanceGate {
    action_rules: IncludeExcludeGlobs,
    invariant_keys_required: Vec<String>,
}

impl RuleBasedGovernanceGate {
    /// Compile a gate from an include/exclude `action_id` pattern pair and
    /// the invariant keys every frame's `extensions` must carry.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern in `allowed_actions` or
    /// `denied_actions` fails to compile.
    pub fn new(
        allowed_actions: &[String],
        denied_actions: &[String],
        invariant_keys_required: &[String],
    ) -> anyhow::Result<Self> {
        Ok(Self {
            action_rules: IncludeExcludeGlobs::new(allowed_actions, denied_actions)?,
            invariant_keys_required: invariant_keys_required.to_vec(),
        })
    }

    /// Build a gate directly from a manifest's `governance.invariant_keys_required`,
    /// with no action-id allow/deny constraint beyond the invariant-key check.
    ///
    /// # Errors
    ///
    /// Never fails for an empty invariant key list; kept fallible to mirror
    /// [`Self::new`]'s signature.
    pub fn from_invariant_keys(invariant_keys_required: &[String]) -> anyhow::Result<Self> {
        Self::new(&[], &[], invariant_keys_required)
    }

    fn missing_invariant_key(&self, frame: &CanonicalActionFrame) -> Option<&str> {
        self.invariant_keys_required
            .iter()
            .find(|key| !frame.extensions.contains_key(key.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl GovernanceGate for RuleBasedGovernanceGate {
    async fn evaluate(&self, frame: &CanonicalActionFrame) -> GovernanceDecision {
        match self.action_rules.decide_str(&frame.action_id) {
            MatchDecision::DeniedByExclude => {
                return GovernanceDecision::deny(format!(
                    "action '{}' is denied by governance rule",
                    frame.action_id
                ));
            }
            MatchDecision::DeniedByMissingInclude => {
                return GovernanceDecision::deny(format!(
                    "action '{}' is not in the governance allowlist",
                    frame.action_id
                ));
            }
            MatchDecision::Allowed => {}
        }

        if let Some(missing) = self.missing_invariant_key(frame) {
            return GovernanceDecision::deny(format!("INVARIANT_KEY_MISSING:{missing}"));
        }

        GovernanceDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fck_core::RiskTier;

    fn frame(action_id: &str) -> CanonicalActionFrame {
        CanonicalActionFrame::new(
            action_id,
            "agent-1",
            RiskTier::T1Standard,
            "sdc-v1",
            true,
            true,
            false,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn allows_when_no_rules_configured() {
        let gate = RuleBasedGovernanceGate::from_invariant_keys(&[]).unwrap();
        let decision = gate.evaluate(&frame("op_anything")).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn denies_excluded_action_ids() {
        let gate = RuleBasedGovernanceGate::new(&[], &["update_*".to_string()], &[]).unwrap();
        let decision = gate.evaluate(&frame("update_pkg-7")).await;
        assert!(!decision.is_allowed());
        assert!(decision.reason.unwrap().contains("denied"));
    }

    #[tokio::test]
    async fn denies_actions_missing_from_allowlist() {
        let gate = RuleBasedGovernanceGate::new(&["op_*".to_string()], &[], &[]).unwrap();
        let decision = gate.evaluate(&frame("assist_abc123")).await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn denies_frame_missing_required_invariant_key() {
        let gate = RuleBasedGovernanceGate::from_invariant_keys(&["channel".to_string()]).unwrap();
        let decision = gate.evaluate(&frame("op_1")).await;
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason.as_deref(), Some("INVARIANT_KEY_MISSING:channel"));
    }

    #[tokio::test]
    async fn allows_frame_carrying_required_invariant_key() {
        let gate = RuleBasedGovernanceGate::from_invariant_keys(&["channel".to_string()]).unwrap();
        let f = frame("update_pkg-1").with_extension("channel", "SKILL_CAPSULE");
        let decision = gate.evaluate(&f).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn invariant_key_check_runs_after_allowlist_check() {
        let gate =
            RuleBasedGovernanceGate::new(&["op_*".to_string()], &[], &["channel".to_string()])
                .unwrap();
        // Denied by the allowlist first; the reason should not mention the
        // invariant key since the action-id check short-circuits.
        let decision = gate.evaluate(&frame("assist_xyz")).await;
        assert!(!decision.is_allowed());
        assert!(decision.reason.unwrap().contains("allowlist"));
    }
}
