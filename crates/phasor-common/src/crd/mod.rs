//! Custom Resource Definitions for Phasor
//!
//! This module contains the five phase CRDs driven by the reconciliation
//! engine, the shared status/condition types, and the [`LifecyclePhase`]
//! trait the engine is generic over.

mod delete;
mod operational;
mod phase;
mod planning;
mod subresource;
mod traffic_rollout;
mod types;
mod upgrade;

pub use delete::{DeletePhase, DeletePhaseSpec};
pub use operational::{OperationalPhase, OperationalPhaseSpec};
pub use phase::LifecyclePhase;
pub use planning::{PlanningPhase, PlanningPhaseSpec};
pub use subresource::{DependentResource, PhaseKind, SubResourceList};
pub use traffic_rollout::{TrafficRolloutPhase, TrafficRolloutPhaseSpec};
pub use types::{
    ConditionReason, ConditionStatus, ConditionType, ManifestSource, PhaseCondition, PhaseStatus,
    TargetState,
};
pub use upgrade::{UpgradePhase, UpgradePhaseSpec};
