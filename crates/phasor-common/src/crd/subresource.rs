//! Dependent sub-resource tracking for phase resources
//!
//! A lifecycle action (install, update, reconcile, uninstall) produces a
//! [`SubResourceList`]: the set of dependent objects the action touched,
//! each with an aggregate phase kind derived from its live status. The list
//! is recomputed on every pass and never persisted; it only drives watch
//! registration and status derivation.

use kube::api::GroupVersionKind;
use serde::{Deserialize, Serialize};

/// Aggregate lifecycle state of a dependent resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum PhaseKind {
    /// The dependent completed successfully
    Ready,
    /// The dependent is making progress
    Running,
    /// The dependent reported a terminal failure
    Failed,
    /// The dependent is in an error state
    Error,
    /// The dependent exists but has not reported progress yet
    #[default]
    Pending,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
            Self::Error => write!(f, "Error"),
            Self::Pending => write!(f, "Pending"),
        }
    }
}

/// One dependent object owned by a phase resource
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DependentResource {
    /// Name of the dependent object
    pub name: String,
    /// Namespace of the dependent object
    pub namespace: String,
    /// API version of the dependent object (e.g. "batch/v1")
    pub api_version: String,
    /// Kind of the dependent object (e.g. "Job")
    pub kind: String,
    /// Aggregate state derived from the dependent's live status
    pub phase: PhaseKind,
}

impl DependentResource {
    /// Group/version/kind of this dependent, for watch registration
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

/// The set of dependent objects produced by one lifecycle action
///
/// Logically owned by exactly one phase resource; the engine never mixes
/// entries across two phase instances.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SubResourceList {
    /// Name of the owning phase resource
    pub name: String,
    /// Namespace of the owning phase resource
    pub namespace: String,
    /// Dependent objects in this set
    pub items: Vec<DependentResource>,
}

impl SubResourceList {
    /// Create an empty list owned by the given phase resource
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            items: Vec::new(),
        }
    }

    /// True if every dependent reports Ready
    pub fn is_ready(&self) -> bool {
        self.items.iter().all(|d| d.phase == PhaseKind::Ready)
    }

    /// True if any dependent reports Failed or Error
    pub fn is_failed_or_error(&self) -> bool {
        self.items
            .iter()
            .any(|d| matches!(d.phase, PhaseKind::Failed | PhaseKind::Error))
    }

    /// Aggregate phase kind across all dependents
    ///
    /// Failure states dominate, then readiness, then progress.
    pub fn phase_kind(&self) -> PhaseKind {
        if self.items.iter().any(|d| d.phase == PhaseKind::Failed) {
            PhaseKind::Failed
        } else if self.items.iter().any(|d| d.phase == PhaseKind::Error) {
            PhaseKind::Error
        } else if self.is_ready() {
            PhaseKind::Ready
        } else if self.items.iter().any(|d| d.phase == PhaseKind::Running) {
            PhaseKind::Running
        } else {
            PhaseKind::Pending
        }
    }

    /// Distinct group/version/kinds present in this set, in stable order
    pub fn dependent_kinds(&self) -> Vec<GroupVersionKind> {
        let mut seen = std::collections::BTreeSet::new();
        let mut kinds = Vec::new();
        for item in &self.items {
            let gvk = item.gvk();
            if seen.insert(format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)) {
                kinds.push(gvk);
            }
        }
        kinds
    }
}
