//! DeletePhase Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::phase::impl_lifecycle_phase;
use super::types::{ManifestSource, PhaseStatus, TargetState};

/// Specification for a DeletePhase
///
/// The delete phase tears a service down in order. Its dependents are the
/// draining and cleanup jobs that must complete before the service is gone.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "phasor.dev",
    version = "v1alpha1",
    kind = "DeletePhase",
    plural = "deletephases",
    shortname = "dlp",
    status = "PhaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetState"}"#,
    printcolumn = r#"{"name":"Satisfied","type":"boolean","jsonPath":".status.satisfied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeletePhaseSpec {
    /// Desired lifecycle target
    #[serde(default)]
    pub target_state: TargetState,

    /// Dependent resource manifests for this phase
    #[serde(default)]
    pub source: ManifestSource,

    /// Seconds to wait for workload draining before cleanup jobs run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u64>,
}

impl_lifecycle_phase!(DeletePhase, "uninstall-deletephase-resource");
