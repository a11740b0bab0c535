//! Cluster API client abstraction for phase resources
//!
//! This trait allows mocking the Kubernetes client in tests while using
//! the real client in production. The engine only ever needs three
//! operations on the phase resource itself: fetch, persist, and persist
//! status.

use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use phasor_common::crd::LifecyclePhase;
use phasor_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for a phase kind
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PhaseClient<P: LifecyclePhase>: Send + Sync {
    /// Fetch a phase resource; None if it no longer exists
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<P>, Error>;

    /// Persist the phase resource (metadata and spec, not status)
    async fn update(&self, phase: &P) -> Result<(), Error>;

    /// Persist the status subresource of the phase resource
    async fn update_status(&self, phase: &P) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct PhaseClientImpl {
    client: Client,
}

impl PhaseClientImpl {
    /// Create a new PhaseClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<P: LifecyclePhase> PhaseClient<P> for PhaseClientImpl {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<P>, Error> {
        let api: Api<P> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update(&self, phase: &P) -> Result<(), Error> {
        let namespace = phase.namespace().unwrap_or_default();
        let api: Api<P> = Api::namespaced(self.client.clone(), &namespace);

        // Replace semantics: the resourceVersion on the fetched object acts
        // as the optimistic concurrency check, so a conflicting writer fails
        // the pass instead of being silently overwritten.
        api.replace(&phase.name_any(), &PostParams::default(), phase)
            .await?;
        Ok(())
    }

    async fn update_status(&self, phase: &P) -> Result<(), Error> {
        let namespace = phase.namespace().unwrap_or_default();
        let api: Api<P> = Api::namespaced(self.client.clone(), &namespace);

        let status_patch = serde_json::json!({ "status": phase.phase_status() });
        api.patch_status(
            &phase.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}
