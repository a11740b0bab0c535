//! TrafficRolloutPhase Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::phase::impl_lifecycle_phase;
use super::types::{ManifestSource, PhaseStatus, TargetState};

/// Specification for a TrafficRolloutPhase
///
/// The traffic-rollout phase shifts traffic onto a newly deployed service
/// revision. Its dependents are the jobs and workflows that reconfigure
/// routing weights step by step.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "phasor.dev",
    version = "v1alpha1",
    kind = "TrafficRolloutPhase",
    plural = "trafficrolloutphases",
    shortname = "trp",
    status = "PhaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetState"}"#,
    printcolumn = r#"{"name":"Satisfied","type":"boolean","jsonPath":".status.satisfied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRolloutPhaseSpec {
    /// Desired lifecycle target
    #[serde(default)]
    pub target_state: TargetState,

    /// Dependent resource manifests for this phase
    #[serde(default)]
    pub source: ManifestSource,

    /// Traffic weight steps, in percent, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weight_steps: Vec<u32>,
}

impl_lifecycle_phase!(
    TrafficRolloutPhase,
    "uninstall-trafficrolloutphase-resource"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_steps_parse() {
        let spec: TrafficRolloutPhaseSpec = serde_json::from_str(
            r#"{"targetState":"deployed","source":{"path":"/m/rollout"},"weightSteps":[10,50,100]}"#,
        )
        .unwrap();
        assert_eq!(spec.weight_steps, vec![10, 50, 100]);
        assert_eq!(spec.target_state, TargetState::Deployed);
    }
}
