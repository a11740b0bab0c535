//! PlanningPhase Custom Resource Definition
//!
//! The planning phase runs the pre-flight work for a service lifecycle:
//! capacity checks, dependency validation, and rollout planning jobs
//! rendered from the phase's manifest source.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::phase::impl_lifecycle_phase;
use super::types::{ManifestSource, PhaseStatus, TargetState};

/// Specification for a PlanningPhase
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "phasor.dev",
    version = "v1alpha1",
    kind = "PlanningPhase",
    plural = "planningphases",
    shortname = "plp",
    status = "PhaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetState"}"#,
    printcolumn = r#"{"name":"Satisfied","type":"boolean","jsonPath":".status.satisfied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PlanningPhaseSpec {
    /// Desired lifecycle target
    #[serde(default)]
    pub target_state: TargetState,

    /// Dependent resource manifests for this phase
    #[serde(default)]
    pub source: ManifestSource,

    /// Upper bound on planning job runtime, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl_lifecycle_phase!(PlanningPhase, "uninstall-planningphase-resource");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LifecyclePhase;

    #[test]
    fn test_finalizer_names_the_kind() {
        assert_eq!(
            PlanningPhase::FINALIZER,
            "uninstall-planningphase-resource"
        );
    }

    #[test]
    fn test_spec_defaults_to_uninitialized() {
        let spec = PlanningPhaseSpec::default();
        assert_eq!(spec.target_state, TargetState::Uninitialized);

        // A spec without targetState parses to the sentinel
        let spec: PlanningPhaseSpec =
            serde_json::from_str(r#"{"source":{"path":"/manifests/planning"}}"#).unwrap();
        assert_eq!(spec.target_state, TargetState::Uninitialized);
        assert_eq!(spec.source.path, "/manifests/planning");
    }

    #[test]
    fn test_status_accessor_initializes_default() {
        let mut phase = PlanningPhase::new("plan-a", PlanningPhaseSpec::default());
        assert!(phase.phase_status().is_none());
        phase.phase_status_mut().init_conditions_if_empty();
        assert!(!phase.phase_status().unwrap().conditions.is_empty());
    }
}
