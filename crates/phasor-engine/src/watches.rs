//! Dependent watch registration
//!
//! The engine discovers dependent kinds at runtime (they come out of the
//! manager's rendered manifests, not the type system), so watches are
//! registered dynamically. The [`WatchRegistrar`] guarantees each distinct
//! group/version/kind is registered with the watch subsystem exactly once;
//! repeated calls with overlapping kinds are cheap no-ops.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::GroupVersionKind;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use phasor_common::crd::SubResourceList;
use phasor_common::Error;

/// Trait abstracting the watch plumbing
///
/// Implementations materialize an owner-filtered watch for the given
/// dependent kind and route significant events back into the controller's
/// work queue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatchSubsystem: Send + Sync {
    /// Ensure a watch exists for the given dependent kind
    async fn ensure_watch(&self, gvk: &GroupVersionKind) -> Result<(), Error>;
}

/// Ensures each distinct dependent kind has exactly one active watch
pub struct WatchRegistrar {
    subsystem: Arc<dyn WatchSubsystem>,
    registered: Mutex<BTreeSet<String>>,
}

impl WatchRegistrar {
    /// Create a registrar over the given watch subsystem
    pub fn new(subsystem: Arc<dyn WatchSubsystem>) -> Self {
        Self {
            subsystem,
            registered: Mutex::new(BTreeSet::new()),
        }
    }

    /// Register watches for every distinct kind in the dependent set
    ///
    /// A kind is marked registered only after the subsystem accepts it, so
    /// a failed registration is retried on the next pass.
    pub async fn register(&self, resources: &SubResourceList) -> Result<(), Error> {
        for gvk in resources.dependent_kinds() {
            let key = format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind);
            {
                let registered = self.registered.lock().expect("registrar lock poisoned");
                if registered.contains(&key) {
                    continue;
                }
            }

            debug!(gvk = %key, "registering dependent watch");
            self.subsystem.ensure_watch(&gvk).await?;
            self.registered
                .lock()
                .expect("registrar lock poisoned")
                .insert(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasor_common::crd::{DependentResource, PhaseKind};

    fn list_with(kinds: &[(&str, &str)]) -> SubResourceList {
        let mut list = SubResourceList::new("planning-wf", "test");
        for (i, (kind, api_version)) in kinds.iter().enumerate() {
            list.items.push(DependentResource {
                name: format!("dep-{i}"),
                namespace: "test".to_string(),
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                phase: PhaseKind::Pending,
            });
        }
        list
    }

    /// Story: overlapping registrations are no-ops
    #[tokio::test]
    async fn story_each_kind_registered_exactly_once() {
        let mut subsystem = MockWatchSubsystem::new();
        subsystem
            .expect_ensure_watch()
            .withf(|gvk| gvk.kind == "Job")
            .times(1)
            .returning(|_| Ok(()));
        subsystem
            .expect_ensure_watch()
            .withf(|gvk| gvk.kind == "Workflow")
            .times(1)
            .returning(|_| Ok(()));

        let registrar = WatchRegistrar::new(Arc::new(subsystem));

        registrar
            .register(&list_with(&[("Job", "batch/v1")]))
            .await
            .unwrap();
        // Second call overlaps on Job and adds Workflow
        registrar
            .register(&list_with(&[
                ("Job", "batch/v1"),
                ("Workflow", "argoproj.io/v1alpha1"),
            ]))
            .await
            .unwrap();
        // Fully redundant call
        registrar
            .register(&list_with(&[
                ("Job", "batch/v1"),
                ("Workflow", "argoproj.io/v1alpha1"),
            ]))
            .await
            .unwrap();
    }

    /// Story: a failed registration is retried on the next pass
    #[tokio::test]
    async fn story_failed_registration_not_marked() {
        let mut subsystem = MockWatchSubsystem::new();
        let mut attempts = 0;
        subsystem.expect_ensure_watch().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(Error::watch_for("Job", "stream closed"))
            } else {
                Ok(())
            }
        });

        let registrar = WatchRegistrar::new(Arc::new(subsystem));
        let list = list_with(&[("Job", "batch/v1")]);

        assert!(registrar.register(&list).await.is_err());
        // Retry succeeds and registers the kind
        registrar.register(&list).await.unwrap();
        // Now a no-op
        registrar.register(&list).await.unwrap();
    }

    /// Story: an empty dependent set registers nothing
    #[tokio::test]
    async fn story_empty_set_registers_nothing() {
        let subsystem = MockWatchSubsystem::new();
        let registrar = WatchRegistrar::new(Arc::new(subsystem));
        registrar
            .register(&SubResourceList::new("planning-wf", "test"))
            .await
            .unwrap();
    }
}
