//! Controller runner - builds one controller future per phase kind
//!
//! Each `build_*` function returns a boxed future that can be composed by
//! the caller. Construction is pure and testable; nothing runs until the
//! futures are awaited. All five controllers share the same generic engine,
//! instantiated per kind.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use tokio_stream::wrappers::ReceiverStream;

use phasor_common::crd::{
    DeletePhase, LifecyclePhase, OperationalPhase, PlanningPhase, TrafficRolloutPhase, UpgradePhase,
};
use phasor_common::events::KubeEventPublisher;
use phasor_common::FIELD_MANAGER;
use phasor_engine::{error_policy, reconcile, PhaseClientImpl, PhaseContext, WatchRegistrar};

use crate::config::OperatorConfig;
use crate::manager::ManifestManagerFactory;
use crate::watch_hub::DependentWatchHub;

/// Watcher timeout (seconds) - must be less than the client read timeout
/// so the API server closes idle watches before the client gives up on them.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Buffered dependent-event triggers per controller
const TRIGGER_CHANNEL_CAPACITY: usize = 64;

/// Build the controller future for one phase kind
pub fn build_phase_controller<P: LifecyclePhase>(
    client: Client,
    config: &OperatorConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
    let hub = Arc::new(DependentWatchHub::<P>::new(client.clone(), trigger_tx));

    let ctx = Arc::new(
        PhaseContext::new(
            Arc::new(PhaseClientImpl::new(client.clone())),
            Arc::new(ManifestManagerFactory::new(
                client.clone(),
                config.manifest_dir.clone(),
            )),
            Arc::new(WatchRegistrar::new(hub)),
            Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER)),
        )
        .with_reconcile_period(config.reconcile_period),
    );

    let api: Api<P> = Api::all(client);
    let kind = P::kind(&()).to_string();
    tracing::info!(kind = %kind, "- phase controller");

    Box::pin(
        Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .reconcile_on(ReceiverStream::new(trigger_rx))
            .shutdown_on_signal()
            .run(reconcile::<P>, error_policy::<P>, ctx)
            .for_each(move |result| {
                match result {
                    Ok(action) => {
                        tracing::debug!(?action, kind = %kind, "reconciliation completed");
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, kind = %kind, "reconciliation error");
                    }
                }
                std::future::ready(())
            }),
    )
}

/// Build controllers for all five phase kinds
pub fn build_all_controllers(
    client: Client,
    config: &OperatorConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    vec![
        build_phase_controller::<PlanningPhase>(client.clone(), config),
        build_phase_controller::<OperationalPhase>(client.clone(), config),
        build_phase_controller::<TrafficRolloutPhase>(client.clone(), config),
        build_phase_controller::<UpgradePhase>(client.clone(), config),
        build_phase_controller::<DeletePhase>(client, config),
    ]
}
