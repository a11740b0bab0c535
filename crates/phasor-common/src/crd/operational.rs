//! OperationalPhase Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::phase::impl_lifecycle_phase;
use super::types::{ManifestSource, PhaseStatus, TargetState};

/// Specification for an OperationalPhase
///
/// The operational phase keeps a deployed service healthy: it owns the
/// recurring verification jobs and the workloads that hold the service in
/// steady state.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "phasor.dev",
    version = "v1alpha1",
    kind = "OperationalPhase",
    plural = "operationalphases",
    shortname = "opp",
    status = "PhaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetState"}"#,
    printcolumn = r#"{"name":"Satisfied","type":"boolean","jsonPath":".status.satisfied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OperationalPhaseSpec {
    /// Desired lifecycle target
    #[serde(default)]
    pub target_state: TargetState,

    /// Dependent resource manifests for this phase
    #[serde(default)]
    pub source: ManifestSource,

    /// Service endpoints the verification jobs probe
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_endpoints: Vec<String>,
}

impl_lifecycle_phase!(OperationalPhase, "uninstall-operationalphase-resource");
