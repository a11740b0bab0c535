//! Manager collaborator traits
//!
//! A [`PhaseManager`] owns the lifecycle facts and actions for exactly one
//! phase resource instance: whether its dependents are installed, whether
//! they drifted from the desired set, and how to install, update, reconcile,
//! and uninstall them. The engine consumes the trait and never looks behind
//! it; rendering and apply mechanics live in the implementation.

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use phasor_common::crd::{LifecyclePhase, SubResourceList};
use phasor_common::Error;

/// Lifecycle facts and actions for one phase resource instance
///
/// `sync_resource` must be called before the fact accessors return anything
/// meaningful for the current pass. An uninstall of dependents that are
/// already gone returns a not-found error (`Error::is_not_found()`), which
/// the deletion protocol treats as the idempotent re-entry case.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PhaseManager: Send + Sync {
    /// Reconcile the manager's internal view of dependents with the live
    /// cluster state
    async fn sync_resource(&self) -> Result<(), Error>;

    /// True if the dependent resources for this phase exist
    fn is_installed(&self) -> bool;

    /// True if the live dependents differ from the desired set
    fn is_update_required(&self) -> bool;

    /// Create the dependent resources for this phase
    async fn install_resource(&self) -> Result<SubResourceList, Error>;

    /// Update the dependent resources, returning the previous and updated
    /// sets for diffing and logging
    async fn update_resource(&self) -> Result<(SubResourceList, SubResourceList), Error>;

    /// Converge the dependents and report their current aggregate state
    async fn reconcile_resource(&self) -> Result<SubResourceList, Error>;

    /// Remove the dependent resources for this phase
    async fn uninstall_resource(&self) -> Result<SubResourceList, Error>;

    /// Name of the sub-resource set this manager drives
    fn resource_name(&self) -> String;
}

/// Produces one [`PhaseManager`] per phase resource instance
pub trait ManagerFactory<P: LifecyclePhase>: Send + Sync {
    /// Build the manager for the given phase resource
    fn manager_for(&self, phase: &P) -> Result<Arc<dyn PhaseManager>, Error>;
}
