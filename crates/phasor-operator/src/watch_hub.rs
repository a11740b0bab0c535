//! Dependent watch hub
//!
//! Concrete watch subsystem behind the engine's registrar. For each
//! registered dependent kind it spawns one background watcher over
//! `DynamicObject`, diffs updates against a last-seen cache, applies the
//! change filter, and maps significant events back to the owning phase via
//! owner references. Matching owners are fed into the controller's trigger
//! channel (`Controller::reconcile_on`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use phasor_common::crd::LifecyclePhase;
use phasor_common::Error;
use phasor_engine::predicate;
use phasor_engine::WatchSubsystem;

/// Watch subsystem for one phase kind's controller
pub struct DependentWatchHub<P: LifecyclePhase> {
    client: Client,
    trigger: mpsc::Sender<ObjectRef<P>>,
    watched: Mutex<BTreeSet<String>>,
}

impl<P: LifecyclePhase> DependentWatchHub<P> {
    /// Create a hub feeding the given controller trigger channel
    pub fn new(client: Client, trigger: mpsc::Sender<ObjectRef<P>>) -> Self {
        Self {
            client,
            trigger,
            watched: Mutex::new(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl<P: LifecyclePhase> WatchSubsystem for DependentWatchHub<P> {
    async fn ensure_watch(&self, gvk: &GroupVersionKind) -> Result<(), Error> {
        let key = format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind);
        {
            let mut watched = self.watched.lock().expect("watch hub lock poisoned");
            if !watched.insert(key.clone()) {
                return Ok(());
            }
        }

        let api_resource = ApiResource::from_gvk(gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);
        let trigger = self.trigger.clone();
        debug!(gvk = %key, "starting dependent watcher");
        tokio::spawn(run_watch::<P>(api, trigger, key));
        Ok(())
    }
}

/// Watch loop for one dependent kind
///
/// The cache keeps the previous copy of each object so updates can be
/// diffed; the watcher itself only delivers the new state.
async fn run_watch<P: LifecyclePhase>(
    api: Api<DynamicObject>,
    trigger: mpsc::Sender<ObjectRef<P>>,
    kind_key: String,
) {
    let mut cache: HashMap<String, DynamicObject> = HashMap::new();
    let mut stream = watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {}
            Ok(watcher::Event::InitApply(obj)) => {
                cache.insert(cache_key(&obj), obj);
            }
            Ok(watcher::Event::Apply(obj)) => {
                let significant = match cache.get(&cache_key(&obj)) {
                    Some(old) => predicate::update_significant(old, &obj),
                    None => predicate::creation_significant(&obj),
                };
                if significant {
                    notify_owners(&trigger, &obj).await;
                }
                cache.insert(cache_key(&obj), obj);
            }
            Ok(watcher::Event::Delete(obj)) => {
                cache.remove(&cache_key(&obj));
                if predicate::deletion_significant(&obj) {
                    notify_owners(&trigger, &obj).await;
                }
            }
            Err(e) => {
                warn!(error = %e, gvk = %kind_key, "dependent watch error, stream will retry");
            }
        }
    }
    debug!(gvk = %kind_key, "dependent watcher stopped");
}

fn cache_key(obj: &DynamicObject) -> String {
    obj.metadata.uid.clone().unwrap_or_else(|| {
        format!(
            "{}/{}",
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        )
    })
}

/// Enqueue every owning phase of the given dependent
async fn notify_owners<P: LifecyclePhase>(trigger: &mpsc::Sender<ObjectRef<P>>, obj: &DynamicObject) {
    let owner_kind = P::kind(&()).to_string();
    let namespace = obj.namespace().unwrap_or_default();
    for owner in obj.owner_references() {
        if owner.kind != owner_kind {
            continue;
        }
        debug!(
            dependent = %obj.name_any(),
            owner = %owner.name,
            "significant dependent event, triggering reconcile"
        );
        let obj_ref = ObjectRef::<P>::new(&owner.name).within(&namespace);
        if trigger.send(obj_ref).await.is_err() {
            debug!("controller trigger channel closed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasor_common::crd::PlanningPhase;
    use serde_json::json;

    fn dependent_with_owner(owner_kind: &str, owner_name: &str) -> DynamicObject {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
        DynamicObject {
            types: Some(kube::api::TypeMeta {
                api_version: "batch/v1".to_string(),
                kind: "Job".to_string(),
            }),
            metadata: kube::api::ObjectMeta {
                name: Some("plan-job".to_string()),
                namespace: Some("test".to_string()),
                uid: Some("uid-1".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "phasor.dev/v1alpha1".to_string(),
                    kind: owner_kind.to_string(),
                    name: owner_name.to_string(),
                    uid: "owner-uid".to_string(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                }]),
                ..Default::default()
            },
            data: json!({ "spec": {} }),
        }
    }

    /// Story: only owners of the watched phase kind are triggered
    #[tokio::test]
    async fn story_owner_mapping_filters_by_kind() {
        let (tx, mut rx) = mpsc::channel::<ObjectRef<PlanningPhase>>(8);

        // Owned by our kind: enqueued
        notify_owners(&tx, &dependent_with_owner("PlanningPhase", "planning-a")).await;
        let triggered = rx.try_recv().expect("owner should be triggered");
        assert_eq!(triggered.name, "planning-a");
        assert_eq!(triggered.namespace.as_deref(), Some("test"));

        // Owned by a different kind: ignored
        notify_owners(&tx, &dependent_with_owner("UpgradePhase", "upgrade-a")).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cache_key_prefers_uid() {
        let obj = dependent_with_owner("PlanningPhase", "planning-a");
        assert_eq!(cache_key(&obj), "uid-1");

        let mut without_uid = obj.clone();
        without_uid.metadata.uid = None;
        assert_eq!(cache_key(&without_uid), "test/plan-job");
    }
}
