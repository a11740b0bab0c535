//! Phase reconciliation state machine
//!
//! The per-event driver shared by every phase kind. Each invocation
//! performs at most one externally visible lifecycle action and returns a
//! requeue directive. The step order is fixed and load-bearing: finalizer
//! sync runs first and short-circuits, drift-sync runs before any branch,
//! deletion preempts everything else, and dispatch assumes the finalizer is
//! already present.
//!
//! The engine assumes the controller runtime delivers at most one
//! concurrent reconcile per resource identity; it holds no per-resource
//! locks of its own. It also never retries: action errors surface to the
//! caller so the runtime's backoff applies.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use phasor_common::crd::{
    ConditionReason, ConditionStatus, ConditionType, LifecyclePhase, PhaseCondition, TargetState,
};
use phasor_common::events::{actions, EventPublisher};
use phasor_common::{Error, DEFAULT_ERROR_REQUEUE_SECS, DEFAULT_RECONCILE_PERIOD_SECS};

use crate::client::PhaseClient;
use crate::manager::{ManagerFactory, PhaseManager};
use crate::watches::WatchRegistrar;

/// Controller context shared across all reconciliations of one phase kind
pub struct PhaseContext<P: LifecyclePhase> {
    /// Client for the phase resource itself
    pub client: Arc<dyn PhaseClient<P>>,
    /// Factory producing one manager per phase instance
    pub managers: Arc<dyn ManagerFactory<P>>,
    /// Dependent watch registrar for this kind
    pub watches: Arc<WatchRegistrar>,
    /// Event publisher paired with every condition write
    pub events: Arc<dyn EventPublisher>,
    /// Period between steady-state reconcile passes
    pub reconcile_period: Duration,
}

impl<P: LifecyclePhase> PhaseContext<P> {
    /// Create a new context with the default reconcile period
    pub fn new(
        client: Arc<dyn PhaseClient<P>>,
        managers: Arc<dyn ManagerFactory<P>>,
        watches: Arc<WatchRegistrar>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            client,
            managers,
            watches,
            events,
            reconcile_period: Duration::from_secs(DEFAULT_RECONCILE_PERIOD_SECS),
        }
    }

    /// Override the steady-state reconcile period
    pub fn with_reconcile_period(mut self, period: Duration) -> Self {
        self.reconcile_period = period;
        self
    }
}

/// Reconcile one phase resource
///
/// Called by the controller runtime whenever the phase or one of its
/// watched dependents changes significantly, and periodically via the
/// requeue-after floor.
#[instrument(skip_all, fields(
    kind = %P::kind(&()),
    namespace = %phase.namespace().unwrap_or_default(),
    name = %phase.name_any(),
))]
pub async fn reconcile<P: LifecyclePhase>(
    phase: Arc<P>,
    ctx: Arc<PhaseContext<P>>,
) -> Result<Action, Error> {
    let name = phase.name_any();
    let namespace = phase.namespace().unwrap_or_default();
    info!("reconciling phase");

    // Work from a fresh copy; events arrive asynchronously and the object
    // can already be gone or stale by the time we run.
    let mut instance = match ctx.client.get(&name, &namespace).await? {
        Some(instance) => instance,
        None => {
            debug!("phase no longer exists, nothing to do");
            return Ok(Action::await_change());
        }
    };

    let manager = ctx.managers.manager_for(&instance)?;
    debug!(resource = %manager.resource_name(), "resolved phase manager");

    if update_finalizers(&mut instance, &ctx).await? {
        // Finalizer writes don't bump metadata.generation; requeue explicitly
        return Ok(Action::requeue(Duration::ZERO));
    }

    let deleting = instance.meta().deletion_timestamp.is_some();
    if let Err(e) = ensure_synced(manager.as_ref(), &mut instance, &ctx).await {
        if !deleting {
            return Err(e);
        }
        // A phase must stay deletable even when drift-sync is broken
        warn!(error = %e, "drift-sync failed during deletion, continuing teardown");
    }

    if deleting {
        return delete_phase(manager.as_ref(), &mut instance, &ctx).await;
    }

    if instance.target_state() == TargetState::Uninitialized {
        info!("target state uninitialized, waiting for an external actor");
        ctx.client.update(&instance).await?;
        // Touch the status as-is: no ledger seeding, and a failed write is
        // telemetry-only like every other status write.
        if let Err(e) = ctx.client.update_status(&instance).await {
            warn!(error = %e, "failure to update status, ignoring");
        }
        return Ok(Action::await_change());
    }

    let target = instance.target_state();
    instance.phase_status_mut().set_condition(
        PhaseCondition::new(ConditionType::Initialized, ConditionStatus::True),
        target,
    );

    if !manager.is_installed() {
        return install_phase(manager.as_ref(), &mut instance, &ctx).await;
    }
    if manager.is_update_required() {
        return update_phase(manager.as_ref(), &mut instance, &ctx).await;
    }
    steady_state_phase(manager.as_ref(), &mut instance, &ctx).await
}

/// Error policy for phase controllers
///
/// Retryable errors requeue with a fixed backoff; permanent errors park the
/// resource until its spec changes.
pub fn error_policy<P: LifecyclePhase>(
    phase: Arc<P>,
    error: &Error,
    _ctx: Arc<PhaseContext<P>>,
) -> Action {
    error!(
        ?error,
        phase = %phase.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS))
    } else {
        Action::await_change()
    }
}

/// Assert the finalizer matches the resource's deletion state
///
/// Returns true if the finalizer set was changed and persisted, in which
/// case the pass must requeue and start over.
async fn update_finalizers<P: LifecyclePhase>(
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<bool, Error> {
    let deleting = instance.meta().deletion_timestamp.is_some();
    let present = instance.finalizers().iter().any(|f| f == P::FINALIZER);
    if !deleting && !present {
        instance
            .meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(P::FINALIZER.to_string());
        ctx.client.update(instance).await?;
        return Ok(true);
    }
    Ok(false)
}

/// Check that the manager is in sync with the cluster
async fn ensure_synced<P: LifecyclePhase>(
    manager: &dyn PhaseManager,
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<(), Error> {
    if let Err(e) = manager.sync_resource().await {
        let target = instance.target_state();
        let condition = PhaseCondition::new(ConditionType::Irreconcilable, ConditionStatus::True)
            .reason(ConditionReason::ReconcileError)
            .message(e.to_string());
        instance
            .phase_status_mut()
            .set_condition(condition.clone(), target);
        record_failure(instance, ctx, &condition, actions::SYNC).await;
        persist_status(instance, ctx).await;
        return Err(e);
    }
    instance
        .phase_status_mut()
        .remove_condition(ConditionType::Irreconcilable);
    Ok(())
}

/// Run the finalizer-guarded deletion protocol
///
/// The finalizer is only removed in the same pass that either confirms the
/// dependents are gone or observes they were already gone; it is never
/// removed speculatively.
async fn delete_phase<P: LifecyclePhase>(
    manager: &dyn PhaseManager,
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<Action, Error> {
    info!("deleting phase");
    let target = instance.target_state();

    if !instance.finalizers().iter().any(|f| f == P::FINALIZER) {
        debug!("phase is terminated, skipping reconciliation");
        return Ok(Action::await_change());
    }

    let uninstalled = match manager.uninstall_resource().await {
        Ok(list) => Some(list),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            let condition = PhaseCondition::new(ConditionType::Failed, ConditionStatus::True)
                .reason(ConditionReason::UninstallError)
                .message(e.to_string());
            instance
                .phase_status_mut()
                .set_condition(condition.clone(), target);
            record_failure(instance, ctx, &condition, actions::UNINSTALL).await;
            persist_status(instance, ctx).await;
            return Err(e);
        }
    };
    instance
        .phase_status_mut()
        .remove_condition(ConditionType::Failed);

    match uninstalled {
        None => {
            info!("dependents already uninstalled, removing finalizer");
        }
        Some(list) => {
            let condition = PhaseCondition::new(ConditionType::Deployed, ConditionStatus::False)
                .reason(ConditionReason::UninstallSuccessful)
                .resource_name(list.name.clone());
            instance
                .phase_status_mut()
                .set_condition(condition.clone(), target);
            record_success(instance, ctx, &condition, actions::UNINSTALL).await;
        }
    }
    persist_status(instance, ctx).await;

    let remaining: Vec<String> = instance
        .finalizers()
        .iter()
        .filter(|f| *f != P::FINALIZER)
        .cloned()
        .collect();
    instance.meta_mut().finalizers = Some(remaining);
    ctx.client.update(instance).await?;

    // The finalizer strip is a metadata write; requeue so the next pass
    // observes the terminated state.
    Ok(Action::requeue(Duration::ZERO))
}

/// Install the dependent resources for this phase
async fn install_phase<P: LifecyclePhase>(
    manager: &dyn PhaseManager,
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<Action, Error> {
    info!("installing dependent resources");
    let target = instance.target_state();

    let installed = match manager.install_resource().await {
        Ok(list) => list,
        Err(e) => {
            instance
                .phase_status_mut()
                .remove_condition(ConditionType::Running);
            let condition = PhaseCondition::new(ConditionType::Failed, ConditionStatus::True)
                .reason(ConditionReason::InstallError)
                .message(e.to_string());
            instance
                .phase_status_mut()
                .set_condition(condition.clone(), target);
            record_failure(instance, ctx, &condition, actions::INSTALL).await;
            persist_status(instance, ctx).await;
            return Err(e);
        }
    };
    instance
        .phase_status_mut()
        .remove_condition(ConditionType::Failed);

    if let Err(e) = ctx.watches.register(&installed).await {
        error!(error = %e, "failed to update watches on dependent resources");
        return Err(e);
    }

    let condition = PhaseCondition::new(ConditionType::Running, ConditionStatus::True)
        .reason(ConditionReason::InstallSuccessful)
        .message(installed.phase_kind().to_string())
        .resource_name(installed.name.clone());
    instance
        .phase_status_mut()
        .set_condition(condition.clone(), target);
    record_success(instance, ctx, &condition, actions::INSTALL).await;

    persist_status(instance, ctx).await;
    Ok(Action::requeue(ctx.reconcile_period))
}

/// Update the dependent resources for this phase
async fn update_phase<P: LifecyclePhase>(
    manager: &dyn PhaseManager,
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<Action, Error> {
    info!("updating dependent resources");
    let target = instance.target_state();

    let updated = match manager.update_resource().await {
        Ok((previous, updated)) => {
            debug!(
                previous = %previous.name,
                updated = %updated.name,
                "dependent set updated"
            );
            updated
        }
        Err(e) => {
            instance
                .phase_status_mut()
                .remove_condition(ConditionType::Running);
            let condition = PhaseCondition::new(ConditionType::Failed, ConditionStatus::True)
                .reason(ConditionReason::UpdateError)
                .message(e.to_string());
            instance
                .phase_status_mut()
                .set_condition(condition.clone(), target);
            record_failure(instance, ctx, &condition, actions::UPDATE).await;
            persist_status(instance, ctx).await;
            return Err(e);
        }
    };
    instance
        .phase_status_mut()
        .remove_condition(ConditionType::Failed);

    if let Err(e) = ctx.watches.register(&updated).await {
        error!(error = %e, "failed to update watches on dependent resources");
        return Err(e);
    }

    let condition = PhaseCondition::new(ConditionType::Running, ConditionStatus::True)
        .reason(ConditionReason::UpdateSuccessful)
        .message(updated.phase_kind().to_string())
        .resource_name(updated.name.clone());
    instance
        .phase_status_mut()
        .set_condition(condition.clone(), target);
    record_success(instance, ctx, &condition, actions::UPDATE).await;

    persist_status(instance, ctx).await;
    Ok(Action::requeue(ctx.reconcile_period))
}

/// Steady-state reconcile: converge dependents and derive status
async fn steady_state_phase<P: LifecyclePhase>(
    manager: &dyn PhaseManager,
    instance: &mut P,
    ctx: &PhaseContext<P>,
) -> Result<Action, Error> {
    debug!("reconciling dependent resources");
    let target = instance.target_state();

    let reconciled = match manager.reconcile_resource().await {
        Ok(list) => list,
        Err(e) => {
            instance
                .phase_status_mut()
                .remove_condition(ConditionType::Running);
            let condition =
                PhaseCondition::new(ConditionType::Irreconcilable, ConditionStatus::True)
                    .reason(ConditionReason::ReconcileError)
                    .message(e.to_string());
            instance
                .phase_status_mut()
                .set_condition(condition.clone(), target);
            record_failure(instance, ctx, &condition, actions::RECONCILE).await;
            persist_status(instance, ctx).await;
            return Err(e);
        }
    };
    instance
        .phase_status_mut()
        .remove_condition(ConditionType::Irreconcilable);

    if let Err(e) = ctx.watches.register(&reconciled).await {
        error!(error = %e, "failed to update watches on dependent resources");
        return Err(e);
    }

    if reconciled.is_failed_or_error() {
        instance
            .phase_status_mut()
            .remove_condition(ConditionType::Running);
        let condition = PhaseCondition::new(ConditionType::Error, ConditionStatus::True)
            .reason(ConditionReason::UnderlyingResourcesError)
            .message(reconciled.phase_kind().to_string())
            .resource_name(reconciled.name.clone());
        instance
            .phase_status_mut()
            .set_condition(condition.clone(), target);
        record_failure(instance, ctx, &condition, actions::RECONCILE).await;
        persist_status(instance, ctx).await;
        // Terminal until a watched dependent event or spec change re-triggers
        return Ok(Action::await_change());
    }

    if reconciled.is_ready() {
        instance
            .phase_status_mut()
            .remove_condition(ConditionType::Running);
        let condition = PhaseCondition::new(ConditionType::Deployed, ConditionStatus::True)
            .reason(ConditionReason::UnderlyingResourcesReady)
            .message(reconciled.phase_kind().to_string())
            .resource_name(reconciled.name.clone());
        instance
            .phase_status_mut()
            .set_condition(condition.clone(), target);
        record_success(instance, ctx, &condition, actions::RECONCILE).await;
    }

    persist_status(instance, ctx).await;
    Ok(Action::requeue(ctx.reconcile_period))
}

/// Persist the status subresource, best-effort
///
/// Status is telemetry; a failed write must never block lifecycle progress,
/// so errors are logged and swallowed. The ledger is seeded first so
/// consumers always see a well-formed condition list.
async fn persist_status<P: LifecyclePhase>(instance: &mut P, ctx: &PhaseContext<P>) {
    instance.phase_status_mut().init_conditions_if_empty();
    if let Err(e) = ctx.client.update_status(instance).await {
        warn!(error = %e, "failure to update status, ignoring");
    }
}

/// Log a failure condition and emit its paired Warning event
async fn record_failure<P: LifecyclePhase>(
    instance: &P,
    ctx: &PhaseContext<P>,
    condition: &PhaseCondition,
    action: &str,
) {
    let reason = condition
        .reason
        .map(|r| r.to_string())
        .unwrap_or_else(|| condition.type_.to_string());
    warn!(
        condition = %condition.type_,
        reason = %reason,
        message = condition.message.as_deref().unwrap_or_default(),
        "failure condition"
    );
    ctx.events
        .publish(
            &instance.object_ref(&()),
            EventType::Warning,
            &reason,
            action,
            condition.message.clone(),
        )
        .await;
}

/// Log a success condition and emit its paired Normal event
async fn record_success<P: LifecyclePhase>(
    instance: &P,
    ctx: &PhaseContext<P>,
    condition: &PhaseCondition,
    action: &str,
) {
    let reason = condition
        .reason
        .map(|r| r.to_string())
        .unwrap_or_else(|| condition.type_.to_string());
    info!(condition = %condition.type_, reason = %reason, "success condition");
    ctx.events
        .publish(
            &instance.object_ref(&()),
            EventType::Normal,
            &reason,
            action,
            condition.message.clone(),
        )
        .await;
}

// =============================================================================
// Tests
// =============================================================================
