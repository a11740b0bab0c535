//! Reference phase manager backed by plain manifest files
//!
//! Loads the dependent manifests for a phase from its manifest source
//! directory, stamps each with an owner reference back to the phase and a
//! spec-hash annotation, and applies them with server-side apply. The hash
//! annotation drives update detection: a live dependent whose annotation no
//! longer matches the desired manifest means an update is required.
//!
//! Chart/template rendering is deliberately not part of this manager; the
//! manifests are consumed as-is.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource, ResourceExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use phasor_common::crd::{DependentResource, LifecyclePhase, PhaseKind, SubResourceList};
use phasor_common::{Error, FIELD_MANAGER};
use phasor_engine::{ManagerFactory, PhaseManager};

/// Annotation carrying the hash of the desired manifest content
const SPEC_HASH_ANNOTATION: &str = "phasor.dev/spec-hash";

/// Label marking dependents as managed by this operator
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// One dependent object as loaded from the manifest source
#[derive(Clone, Debug)]
struct DesiredObject {
    api_resource: ApiResource,
    gvk: GroupVersionKind,
    name: String,
    json: Value,
}

impl DesiredObject {
    fn api_version(&self) -> String {
        if self.gvk.group.is_empty() {
            self.gvk.version.clone()
        } else {
            format!("{}/{}", self.gvk.group, self.gvk.version)
        }
    }
}

/// Lifecycle facts computed by the last drift-sync
#[derive(Default)]
struct SyncState {
    desired: Vec<DesiredObject>,
    live: Vec<DependentResource>,
    installed: bool,
    update_required: bool,
}

/// Manifest-backed [`PhaseManager`] for one phase resource instance
pub struct ManifestManager {
    client: Client,
    namespace: String,
    resource_name: String,
    source: PathBuf,
    owner_ref: Value,
    state: Mutex<SyncState>,
}

impl ManifestManager {
    /// Build a manager for the given phase resource
    pub fn new<P: LifecyclePhase>(
        client: Client,
        phase: &P,
        base_dir: &Path,
    ) -> Result<Self, Error> {
        let name = phase.name_any();
        let namespace = phase.namespace().unwrap_or_default();
        let owner_ref = json!({
            "apiVersion": P::api_version(&()),
            "kind": P::kind(&()),
            "name": name,
            "uid": phase.uid().unwrap_or_default(),
            "controller": true,
            "blockOwnerDeletion": true,
        });

        let path = PathBuf::from(&phase.manifest_source().path);
        let source = if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        };

        Ok(Self {
            client,
            namespace,
            resource_name: name,
            source,
            owner_ref,
            state: Mutex::new(SyncState::default()),
        })
    }

    /// Apply every desired object with server-side apply
    async fn apply_all(&self, desired: &[DesiredObject]) -> Result<(), Error> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for object in desired {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &self.namespace, &object.api_resource);
            debug!(kind = %object.gvk.kind, name = %object.name, "applying dependent");
            api.patch(&object.name, &params, &Patch::Apply(&object.json))
                .await?;
        }
        Ok(())
    }

    /// Fetch the live view of the desired set with derived phase kinds
    async fn collect_live(&self, desired: &[DesiredObject]) -> Result<Vec<DependentResource>, Error> {
        let mut live = Vec::new();
        for object in desired {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &self.namespace, &object.api_resource);
            if let Some(found) = api.get_opt(&object.name).await? {
                live.push(DependentResource {
                    name: object.name.clone(),
                    namespace: self.namespace.clone(),
                    api_version: object.api_version(),
                    kind: object.gvk.kind.clone(),
                    phase: derive_phase_kind(found.data.get("status")),
                });
            }
        }
        Ok(live)
    }

    fn sub_resource_list(&self, items: Vec<DependentResource>) -> SubResourceList {
        SubResourceList {
            name: self.resource_name.clone(),
            namespace: self.namespace.clone(),
            items,
        }
    }
}

#[async_trait]
impl PhaseManager for ManifestManager {
    async fn sync_resource(&self) -> Result<(), Error> {
        let desired = load_desired(&self.source, &self.namespace, &self.owner_ref)?;

        let mut live = Vec::new();
        let mut all_exist = true;
        let mut update_required = false;
        for object in &desired {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &self.namespace, &object.api_resource);
            match api.get_opt(&object.name).await? {
                Some(found) => {
                    let live_hash = found
                        .annotations()
                        .get(SPEC_HASH_ANNOTATION)
                        .cloned()
                        .unwrap_or_default();
                    let desired_hash = object
                        .json
                        .pointer("/metadata/annotations")
                        .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if live_hash != desired_hash {
                        update_required = true;
                    }
                    live.push(DependentResource {
                        name: object.name.clone(),
                        namespace: self.namespace.clone(),
                        api_version: object.api_version(),
                        kind: object.gvk.kind.clone(),
                        phase: derive_phase_kind(found.data.get("status")),
                    });
                }
                None => all_exist = false,
            }
        }

        let mut state = self.state.lock().expect("manager state lock poisoned");
        state.installed = all_exist;
        state.update_required = update_required;
        state.desired = desired;
        state.live = live;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.state.lock().expect("manager state lock poisoned").installed
    }

    fn is_update_required(&self) -> bool {
        self.state
            .lock()
            .expect("manager state lock poisoned")
            .update_required
    }

    async fn install_resource(&self) -> Result<SubResourceList, Error> {
        let desired = self.snapshot_desired();
        self.apply_all(&desired)
            .await
            .map_err(|e| Error::install_for(&self.resource_name, e.to_string()))?;
        let live = self
            .collect_live(&desired)
            .await
            .map_err(|e| Error::install_for(&self.resource_name, e.to_string()))?;
        Ok(self.sub_resource_list(live))
    }

    async fn update_resource(&self) -> Result<(SubResourceList, SubResourceList), Error> {
        let (desired, previous) = {
            let state = self.state.lock().expect("manager state lock poisoned");
            (state.desired.clone(), state.live.clone())
        };
        let previous = self.sub_resource_list(previous);

        self.apply_all(&desired)
            .await
            .map_err(|e| Error::update_for(&self.resource_name, e.to_string()))?;
        let live = self
            .collect_live(&desired)
            .await
            .map_err(|e| Error::update_for(&self.resource_name, e.to_string()))?;
        Ok((previous, self.sub_resource_list(live)))
    }

    async fn reconcile_resource(&self) -> Result<SubResourceList, Error> {
        let desired = self.snapshot_desired();
        // Server-side apply converges any drift back to the desired set
        self.apply_all(&desired)
            .await
            .map_err(|e| Error::reconcile_for(&self.resource_name, e.to_string()))?;
        let live = self
            .collect_live(&desired)
            .await
            .map_err(|e| Error::reconcile_for(&self.resource_name, e.to_string()))?;
        Ok(self.sub_resource_list(live))
    }

    async fn uninstall_resource(&self) -> Result<SubResourceList, Error> {
        // Deletion must work even if sync never ran; reload from the source
        let desired = match load_desired(&self.source, &self.namespace, &self.owner_ref) {
            Ok(desired) => desired,
            Err(e) => {
                // A missing source directory means nothing was ever rendered
                warn!(error = %e, "manifest source unavailable during uninstall");
                return Err(Error::not_found(&self.resource_name));
            }
        };

        let mut removed = Vec::new();
        for object in &desired {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &self.namespace, &object.api_resource);
            match api.delete(&object.name, &DeleteParams::default()).await {
                Ok(_) => removed.push(DependentResource {
                    name: object.name.clone(),
                    namespace: self.namespace.clone(),
                    api_version: object.api_version(),
                    kind: object.gvk.kind.clone(),
                    phase: PhaseKind::Pending,
                }),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => {
                    return Err(Error::uninstall_for(&self.resource_name, e.to_string()));
                }
            }
        }

        if removed.is_empty() {
            return Err(Error::not_found(&self.resource_name));
        }
        Ok(self.sub_resource_list(removed))
    }

    fn resource_name(&self) -> String {
        self.resource_name.clone()
    }
}

impl ManifestManager {
    fn snapshot_desired(&self) -> Vec<DesiredObject> {
        self.state
            .lock()
            .expect("manager state lock poisoned")
            .desired
            .clone()
    }
}

/// Load and stamp the desired objects from a manifest source directory
///
/// Every document gets the phase's owner reference, the managed-by label,
/// the target namespace, and a content-hash annotation computed before
/// stamping (so ownership metadata doesn't perturb update detection).
fn load_desired(source: &Path, namespace: &str, owner_ref: &Value) -> Result<Vec<DesiredObject>, Error> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(source)
        .map_err(|e| Error::manifest(source.display().to_string(), e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    entries.sort();

    let mut desired = Vec::new();
    for path in entries {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::manifest(path.display().to_string(), e.to_string()))?;
        for document in serde_yaml::Deserializer::from_str(&content) {
            let value = Value::deserialize(document)
                .map_err(|e| Error::manifest(path.display().to_string(), e.to_string()))?;
            if value.is_null() {
                continue;
            }
            desired.push(stamp_object(value, namespace, owner_ref, &path)?);
        }
    }
    Ok(desired)
}

/// Stamp ownership metadata onto a loaded manifest document
fn stamp_object(
    mut value: Value,
    namespace: &str,
    owner_ref: &Value,
    path: &Path,
) -> Result<DesiredObject, Error> {
    let api_version = value
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::manifest(path.display().to_string(), "missing apiVersion"))?
        .to_string();
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::manifest(path.display().to_string(), "missing kind"))?
        .to_string();
    let name = value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::manifest(path.display().to_string(), "missing metadata.name"))?
        .to_string();

    let hash = content_hash(&value);

    let metadata = value
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::manifest(path.display().to_string(), "missing metadata"))?;
    metadata.insert("namespace".to_string(), json!(namespace));
    metadata.insert("ownerReferences".to_string(), json!([owner_ref]));

    let labels = metadata
        .entry("labels")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| Error::manifest(path.display().to_string(), "metadata.labels not a map"))?;
    labels.insert(MANAGED_BY_LABEL.to_string(), json!("phasor"));

    let annotations = metadata
        .entry("annotations")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| {
            Error::manifest(path.display().to_string(), "metadata.annotations not a map")
        })?;
    annotations.insert(SPEC_HASH_ANNOTATION.to_string(), json!(hash));

    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version.as_str()),
    };
    let gvk = GroupVersionKind::gvk(group, version, &kind);

    Ok(DesiredObject {
        api_resource: ApiResource::from_gvk(&gvk),
        gvk,
        name,
        json: value,
    })
}

/// Stable content hash of a manifest document
fn content_hash(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Derive a dependent's aggregate phase kind from its live status
///
/// Understands the status shapes our dependents report: workflow-style
/// `phase` strings, job completion conditions, and job counters.
fn derive_phase_kind(status: Option<&Value>) -> PhaseKind {
    let status = match status {
        Some(status) => status,
        None => return PhaseKind::Pending,
    };

    if let Some(phase) = status.get("phase").and_then(Value::as_str) {
        return match phase {
            "Succeeded" => PhaseKind::Ready,
            "Failed" => PhaseKind::Failed,
            "Error" => PhaseKind::Error,
            "Running" => PhaseKind::Running,
            _ => PhaseKind::Pending,
        };
    }

    if let Some(conditions) = status.get("conditions").and_then(Value::as_array) {
        for condition in conditions {
            let type_ = condition.get("type").and_then(Value::as_str);
            let is_true = condition.get("status").and_then(Value::as_str) == Some("True");
            match (type_, is_true) {
                (Some("Complete"), true) => return PhaseKind::Ready,
                (Some("Failed"), true) => return PhaseKind::Failed,
                _ => {}
            }
        }
    }

    let counter = |key: &str| status.get(key).and_then(Value::as_u64).unwrap_or(0);
    if counter("succeeded") > 0 {
        return PhaseKind::Ready;
    }
    if counter("failed") > 0 {
        return PhaseKind::Failed;
    }
    if counter("active") > 0 {
        return PhaseKind::Running;
    }

    PhaseKind::Pending
}

/// Produces a [`ManifestManager`] per phase resource instance
pub struct ManifestManagerFactory {
    client: Client,
    base_dir: PathBuf,
}

impl ManifestManagerFactory {
    /// Create a factory rooted at the given manifest base directory
    pub fn new(client: Client, base_dir: PathBuf) -> Self {
        Self { client, base_dir }
    }
}

impl<P: LifecyclePhase> ManagerFactory<P> for ManifestManagerFactory {
    fn manager_for(&self, phase: &P) -> Result<Arc<dyn PhaseManager>, Error> {
        Ok(Arc::new(ManifestManager::new(
            self.client.clone(),
            phase,
            &self.base_dir,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_ref() -> Value {
        json!({
            "apiVersion": "phasor.dev/v1alpha1",
            "kind": "PlanningPhase",
            "name": "planning-a",
            "uid": "abc-123",
            "controller": true,
            "blockOwnerDeletion": true,
        })
    }

    fn write_manifest(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    /// Story: loaded manifests are stamped with ownership metadata
    #[test]
    fn story_manifests_stamped_with_owner_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "job.yaml",
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: plan-job\nspec:\n  backoffLimit: 1\n",
        );

        let desired = load_desired(dir.path(), "test", &owner_ref()).unwrap();
        assert_eq!(desired.len(), 1);

        let object = &desired[0];
        assert_eq!(object.name, "plan-job");
        assert_eq!(object.gvk.kind, "Job");
        assert_eq!(object.api_version(), "batch/v1");

        let owners = object
            .json
            .pointer("/metadata/ownerReferences")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(
            owners[0].get("kind").and_then(Value::as_str),
            Some("PlanningPhase")
        );
        assert_eq!(
            object.json.pointer("/metadata/namespace").and_then(Value::as_str),
            Some("test")
        );
        assert!(object
            .json
            .pointer("/metadata/annotations")
            .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
            .is_some());
    }

    /// Story: the content hash ignores stamped metadata but tracks spec edits
    #[test]
    fn story_hash_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "job.yaml",
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: plan-job\nspec:\n  backoffLimit: 1\n",
        );
        let first = load_desired(dir.path(), "test", &owner_ref()).unwrap();

        // Same content in a different namespace stamps the same hash
        let other_ns = load_desired(dir.path(), "other", &owner_ref()).unwrap();
        let hash_of = |d: &DesiredObject| {
            d.json
                .pointer("/metadata/annotations")
                .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
                .and_then(Value::as_str)
                .unwrap()
                .to_string()
        };
        assert_eq!(hash_of(&first[0]), hash_of(&other_ns[0]));

        // A spec edit changes the hash
        write_manifest(
            dir.path(),
            "job.yaml",
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: plan-job\nspec:\n  backoffLimit: 3\n",
        );
        let edited = load_desired(dir.path(), "test", &owner_ref()).unwrap();
        assert_ne!(hash_of(&first[0]), hash_of(&edited[0]));
    }

    /// Story: multi-document manifests load in file order
    #[test]
    fn story_multi_document_manifests() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "all.yaml",
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: job-a\n---\napiVersion: argoproj.io/v1alpha1\nkind: Workflow\nmetadata:\n  name: wf-a\n",
        );

        let desired = load_desired(dir.path(), "test", &owner_ref()).unwrap();
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0].gvk.kind, "Job");
        assert_eq!(desired[1].gvk.kind, "Workflow");
        assert_eq!(desired[1].gvk.group, "argoproj.io");
    }

    /// Story: a manifest without identity fields is rejected
    #[test]
    fn story_invalid_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "bad.yaml", "apiVersion: batch/v1\nkind: Job\n");

        let err = load_desired(dir.path(), "test", &owner_ref()).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
        assert!(!err.is_retryable());
    }

    /// Story: a missing source directory is a manifest error
    #[test]
    fn story_missing_source_directory() {
        let err = load_desired(Path::new("/nonexistent/dir"), "test", &owner_ref()).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    mod phase_kind_derivation {
        use super::*;

        #[test]
        fn test_no_status_is_pending() {
            assert_eq!(derive_phase_kind(None), PhaseKind::Pending);
        }

        #[test]
        fn test_workflow_phase_strings() {
            let status = json!({ "phase": "Succeeded" });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Ready);
            let status = json!({ "phase": "Failed" });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Failed);
            let status = json!({ "phase": "Error" });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Error);
            let status = json!({ "phase": "Running" });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Running);
        }

        #[test]
        fn test_job_conditions() {
            let status = json!({ "conditions": [{ "type": "Complete", "status": "True" }] });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Ready);
            let status = json!({ "conditions": [{ "type": "Failed", "status": "True" }] });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Failed);
            // A False condition is not a verdict
            let status = json!({ "conditions": [{ "type": "Failed", "status": "False" }] });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Pending);
        }

        #[test]
        fn test_job_counters() {
            let status = json!({ "succeeded": 1 });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Ready);
            let status = json!({ "failed": 2 });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Failed);
            let status = json!({ "active": 1 });
            assert_eq!(derive_phase_kind(Some(&status)), PhaseKind::Running);
        }
    }
}
