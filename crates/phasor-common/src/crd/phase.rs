//! The capability seam between phase CRDs and the generic engine
//!
//! Each phase kind implements [`LifecyclePhase`]; the reconciliation engine
//! is written once against this trait and instantiated per kind. The trait
//! deliberately exposes only what the engine needs: the per-kind finalizer
//! string, the desired target state, the manifest source, and the status
//! ledger.

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{ManifestSource, PhaseStatus, TargetState};

/// A namespaced phase custom resource the engine can drive
pub trait LifecyclePhase:
    Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Finalizer string guarding deletion of this phase kind
    ///
    /// Present on every actively managed resource until its dependents are
    /// confirmed gone.
    const FINALIZER: &'static str;

    /// Desired lifecycle target from the spec
    fn target_state(&self) -> TargetState;

    /// Where this phase's dependent manifests are loaded from
    fn manifest_source(&self) -> &ManifestSource;

    /// Current status, if the status subresource has been written
    fn phase_status(&self) -> Option<&PhaseStatus>;

    /// Mutable status, initialized to the default when absent
    fn phase_status_mut(&mut self) -> &mut PhaseStatus;
}

/// Implement [`LifecyclePhase`] for a phase CRD with the standard
/// spec/status field layout.
macro_rules! impl_lifecycle_phase {
    ($kind:ty, $finalizer:literal) => {
        impl $crate::crd::LifecyclePhase for $kind {
            const FINALIZER: &'static str = $finalizer;

            fn target_state(&self) -> $crate::crd::TargetState {
                self.spec.target_state
            }

            fn manifest_source(&self) -> &$crate::crd::ManifestSource {
                &self.spec.source
            }

            fn phase_status(&self) -> Option<&$crate::crd::PhaseStatus> {
                self.status.as_ref()
            }

            fn phase_status_mut(&mut self) -> &mut $crate::crd::PhaseStatus {
                self.status.get_or_insert_with(Default::default)
            }
        }
    };
}

pub(crate) use impl_lifecycle_phase;
