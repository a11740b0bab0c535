//! Supporting types shared by all phase CRDs
//!
//! The condition ledger lives here: an ordered, type-keyed set of status
//! conditions with set-by-type upsert semantics. Every status-affecting
//! transition in the engine goes through [`PhaseStatus::set_condition`] and
//! [`PhaseStatus::remove_condition`]; the condition list is never
//! manipulated directly.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired lifecycle target for a phase resource
///
/// `Uninitialized` is a sentinel: the engine performs no lifecycle work
/// until an external actor sets a real target.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// No target set yet; the engine waits
    #[default]
    Uninitialized,
    /// Dependent resources should be installed and kept converged
    Deployed,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Deployed => write!(f, "deployed"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The closed set of condition types a phase resource can carry
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionType {
    /// The engine has accepted the resource and begun lifecycle work
    Initialized,
    /// An install or update action is in flight
    Running,
    /// Dependent resources are (or, with status False, are no longer) deployed
    Deployed,
    /// The last lifecycle action failed
    Failed,
    /// One or more dependent resources report a failure
    Error,
    /// The manager could not sync its view with the live cluster state
    Irreconcilable,
}

impl ConditionType {
    /// All recognized condition types, in ledger seeding order
    pub const ALL: [ConditionType; 6] = [
        ConditionType::Initialized,
        ConditionType::Running,
        ConditionType::Deployed,
        ConditionType::Failed,
        ConditionType::Error,
        ConditionType::Irreconcilable,
    ];
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::Running => write!(f, "Running"),
            Self::Deployed => write!(f, "Deployed"),
            Self::Failed => write!(f, "Failed"),
            Self::Error => write!(f, "Error"),
            Self::Irreconcilable => write!(f, "Irreconcilable"),
        }
    }
}

/// Machine-readable reasons attached to conditions and paired events
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    /// Dependent resources were created successfully
    InstallSuccessful,
    /// Creating dependent resources failed
    InstallError,
    /// Dependent resources were updated successfully
    UpdateSuccessful,
    /// Updating dependent resources failed
    UpdateError,
    /// Dependent resources were removed successfully
    UninstallSuccessful,
    /// Removing dependent resources failed
    UninstallError,
    /// Drift-sync or steady-state reconcile failed
    ReconcileError,
    /// One or more dependent resources report Failed or Error
    UnderlyingResourcesError,
    /// Every dependent resource reports Ready
    UnderlyingResourcesReady,
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstallSuccessful => write!(f, "InstallSuccessful"),
            Self::InstallError => write!(f, "InstallError"),
            Self::UpdateSuccessful => write!(f, "UpdateSuccessful"),
            Self::UpdateError => write!(f, "UpdateError"),
            Self::UninstallSuccessful => write!(f, "UninstallSuccessful"),
            Self::UninstallError => write!(f, "UninstallError"),
            Self::ReconcileError => write!(f, "ReconcileError"),
            Self::UnderlyingResourcesError => write!(f, "UnderlyingResourcesError"),
            Self::UnderlyingResourcesReady => write!(f, "UnderlyingResourcesReady"),
        }
    }
}

/// Kubernetes-style condition for phase status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCondition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConditionReason>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Name of the sub-resource set this condition refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl PhaseCondition {
    /// Create a new condition with the current timestamp
    pub fn new(type_: ConditionType, status: ConditionStatus) -> Self {
        Self {
            type_,
            status,
            reason: None,
            message: None,
            resource_name: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Set the machine-readable reason
    pub fn reason(mut self, reason: ConditionReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Set the human-readable message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the sub-resource set name this condition refers to
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }
}

/// Where a phase's dependent manifests are loaded from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    /// Directory containing the dependent resource manifests for this phase
    pub path: String,
}

/// Status shared by all phase CRDs
///
/// The condition list is the only durable state the engine writes. It must
/// remain well-formed after every partial failure, which the ledger methods
/// guarantee: each mutation leaves the list with at most one entry per type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    /// Target state in effect when conditions were last written
    #[serde(default)]
    pub observed_target_state: TargetState,

    /// True while the Deployed condition is True
    #[serde(default)]
    pub satisfied: bool,

    /// Ordered, type-keyed condition ledger
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PhaseCondition>,
}

impl PhaseStatus {
    /// Upsert a condition by type.
    ///
    /// If a condition of the same type exists it is replaced in place,
    /// preserving its position in the list; otherwise the condition is
    /// appended. The transition timestamp is kept when the status value is
    /// unchanged, so repeated identical upserts are true no-ops.
    pub fn set_condition(&mut self, condition: PhaseCondition, target: TargetState) {
        self.observed_target_state = target;
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => {
                let transition_time = if existing.status == condition.status {
                    existing.last_transition_time
                } else {
                    condition.last_transition_time
                };
                *existing = PhaseCondition {
                    last_transition_time: transition_time,
                    ..condition
                };
            }
            None => self.conditions.push(condition),
        }
        self.recompute_satisfied();
    }

    /// Remove the condition of the given type; no-op if absent.
    pub fn remove_condition(&mut self, type_: ConditionType) {
        self.conditions.retain(|c| c.type_ != type_);
        self.recompute_satisfied();
    }

    /// Look up the condition of the given type.
    pub fn condition(&self, type_: ConditionType) -> Option<&PhaseCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Seed the ledger with an Unknown entry per recognized type if empty.
    ///
    /// Guards against clients that expect a dense condition list before
    /// touching it. A non-empty ledger is left untouched.
    pub fn init_conditions_if_empty(&mut self) {
        if self.conditions.is_empty() {
            self.conditions = ConditionType::ALL
                .iter()
                .map(|t| PhaseCondition::new(*t, ConditionStatus::Unknown))
                .collect();
        }
    }

    fn recompute_satisfied(&mut self) {
        self.satisfied = self
            .condition(ConditionType::Deployed)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_true() -> PhaseCondition {
        PhaseCondition::new(ConditionType::Running, ConditionStatus::True)
            .reason(ConditionReason::InstallSuccessful)
            .message("Pending")
    }

    // ==========================================================================
    // Story Tests: Condition Ledger
    // ==========================================================================

    /// Story: upserts are keyed by type, so the ledger never grows duplicates
    #[test]
    fn story_set_condition_is_idempotent() {
        let mut status = PhaseStatus::default();

        status.set_condition(running_true(), TargetState::Deployed);
        status.set_condition(running_true(), TargetState::Deployed);

        let running: Vec<_> = status
            .conditions
            .iter()
            .filter(|c| c.type_ == ConditionType::Running)
            .collect();
        assert_eq!(running.len(), 1);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.observed_target_state, TargetState::Deployed);
    }

    /// Story: the transition timestamp is stable across identical upserts
    ///
    /// Re-asserting a condition that is already True must not move its
    /// lastTransitionTime, otherwise every resync pass looks like a change.
    #[test]
    fn story_transition_time_preserved_for_same_status() {
        let mut status = PhaseStatus::default();
        status.set_condition(running_true(), TargetState::Deployed);
        let first = status
            .condition(ConditionType::Running)
            .unwrap()
            .last_transition_time;

        status.set_condition(running_true(), TargetState::Deployed);
        let second = status
            .condition(ConditionType::Running)
            .unwrap()
            .last_transition_time;
        assert_eq!(first, second);

        // A genuine status flip stamps a new transition time
        status.set_condition(
            PhaseCondition::new(ConditionType::Running, ConditionStatus::False),
            TargetState::Deployed,
        );
        let third = status
            .condition(ConditionType::Running)
            .unwrap()
            .last_transition_time;
        assert!(third >= first);
        assert_eq!(
            status.condition(ConditionType::Running).unwrap().status,
            ConditionStatus::False
        );
    }

    /// Story: an upsert replaces content but keeps the list position
    #[test]
    fn story_upsert_preserves_insertion_order() {
        let mut status = PhaseStatus::default();
        status.set_condition(
            PhaseCondition::new(ConditionType::Initialized, ConditionStatus::True),
            TargetState::Deployed,
        );
        status.set_condition(running_true(), TargetState::Deployed);
        status.set_condition(
            PhaseCondition::new(ConditionType::Failed, ConditionStatus::True),
            TargetState::Deployed,
        );

        // Re-set the first condition; it must stay first
        status.set_condition(
            PhaseCondition::new(ConditionType::Initialized, ConditionStatus::True)
                .message("still initialized"),
            TargetState::Deployed,
        );

        let types: Vec<ConditionType> = status.conditions.iter().map(|c| c.type_).collect();
        assert_eq!(
            types,
            vec![
                ConditionType::Initialized,
                ConditionType::Running,
                ConditionType::Failed
            ]
        );
        assert_eq!(
            status
                .condition(ConditionType::Initialized)
                .unwrap()
                .message
                .as_deref(),
            Some("still initialized")
        );
    }

    /// Story: removing an absent condition is a no-op
    #[test]
    fn story_remove_condition_noop_when_absent() {
        let mut status = PhaseStatus::default();
        status.remove_condition(ConditionType::Failed);
        assert!(status.conditions.is_empty());

        status.set_condition(running_true(), TargetState::Deployed);
        status.remove_condition(ConditionType::Failed);
        assert_eq!(status.conditions.len(), 1);

        status.remove_condition(ConditionType::Running);
        assert!(status.conditions.is_empty());
    }

    /// Story: an empty ledger is seeded with Unknown entries for every type
    #[test]
    fn story_init_if_empty_seeds_dense_list() {
        let mut status = PhaseStatus::default();
        status.init_conditions_if_empty();

        assert_eq!(status.conditions.len(), ConditionType::ALL.len());
        assert!(status
            .conditions
            .iter()
            .all(|c| c.status == ConditionStatus::Unknown));

        // A non-empty ledger is left alone
        let mut status = PhaseStatus::default();
        status.set_condition(running_true(), TargetState::Deployed);
        status.init_conditions_if_empty();
        assert_eq!(status.conditions.len(), 1);
    }

    /// Story: satisfied tracks the Deployed condition
    #[test]
    fn story_satisfied_follows_deployed_condition() {
        let mut status = PhaseStatus::default();
        assert!(!status.satisfied);

        status.set_condition(
            PhaseCondition::new(ConditionType::Deployed, ConditionStatus::True)
                .reason(ConditionReason::UnderlyingResourcesReady),
            TargetState::Deployed,
        );
        assert!(status.satisfied);

        status.set_condition(
            PhaseCondition::new(ConditionType::Deployed, ConditionStatus::False)
                .reason(ConditionReason::UninstallSuccessful),
            TargetState::Deployed,
        );
        assert!(!status.satisfied);

        status.remove_condition(ConditionType::Deployed);
        assert!(!status.satisfied);
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn test_condition_roundtrip() {
            let cond = PhaseCondition::new(ConditionType::Deployed, ConditionStatus::True)
                .reason(ConditionReason::UnderlyingResourcesReady)
                .message("all dependents ready")
                .resource_name("planning-wf");
            let json = serde_json::to_string(&cond).unwrap();
            assert!(json.contains("\"type\":\"Deployed\""));
            assert!(json.contains("lastTransitionTime"));
            let parsed: PhaseCondition = serde_json::from_str(&json).unwrap();
            assert_eq!(cond, parsed);
        }

        #[test]
        fn test_target_state_serializes_lowercase() {
            assert_eq!(
                serde_json::to_string(&TargetState::Uninitialized).unwrap(),
                "\"uninitialized\""
            );
            assert_eq!(
                serde_json::to_string(&TargetState::Deployed).unwrap(),
                "\"deployed\""
            );
        }

        #[test]
        fn test_phase_status_roundtrip() {
            let mut status = PhaseStatus::default();
            status.set_condition(
                PhaseCondition::new(ConditionType::Initialized, ConditionStatus::True),
                TargetState::Deployed,
            );
            let json = serde_json::to_string(&status).unwrap();
            let parsed: PhaseStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, parsed);
        }

        #[test]
        fn test_empty_conditions_not_serialized() {
            let status = PhaseStatus::default();
            let json = serde_json::to_string(&status).unwrap();
            assert!(!json.contains("conditions"));
        }
    }
}
