//! UpgradePhase Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::phase::impl_lifecycle_phase;
use super::types::{ManifestSource, PhaseStatus, TargetState};

/// Specification for an UpgradePhase
///
/// The upgrade phase moves a service from one version to another. Its
/// dependents are the migration jobs and upgrade workflows for that hop.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "phasor.dev",
    version = "v1alpha1",
    kind = "UpgradePhase",
    plural = "upgradephases",
    shortname = "upp",
    status = "PhaseStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetState"}"#,
    printcolumn = r#"{"name":"From","type":"string","jsonPath":".spec.sourceVersion"}"#,
    printcolumn = r#"{"name":"To","type":"string","jsonPath":".spec.targetVersion"}"#,
    printcolumn = r#"{"name":"Satisfied","type":"boolean","jsonPath":".status.satisfied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePhaseSpec {
    /// Desired lifecycle target
    #[serde(default)]
    pub target_state: TargetState,

    /// Dependent resource manifests for this phase
    #[serde(default)]
    pub source: ManifestSource,

    /// Version the service is upgrading from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,

    /// Version the service is upgrading to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
}

impl_lifecycle_phase!(UpgradePhase, "uninstall-upgradephase-resource");
