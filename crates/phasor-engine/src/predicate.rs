//! Change filter for dependent resource events
//!
//! Decides whether an observed event on a watched dependent is semantically
//! significant enough to trigger a reconcile of the owning phase:
//!
//! - Creations are suppressed: dependents are only ever created by this
//!   engine's own install/update actions, so the notification is redundant
//!   with the action that caused it.
//! - Deletions are always significant: a disappeared dependent must be
//!   recreated.
//! - Updates are significant only if the status summary changed, or the
//!   remaining content differs after normalizing away the status
//!   sub-structure and the resourceVersion. Pure status/resourceVersion
//!   churn from informer resyncs is suppressed to avoid reconcile storms.

use kube::api::DynamicObject;
use serde_json::{json, Value};

/// Creation events never trigger a reconcile
pub fn creation_significant(_obj: &DynamicObject) -> bool {
    false
}

/// Deletion events always trigger a reconcile so the dependent can be
/// recreated
pub fn deletion_significant(_obj: &DynamicObject) -> bool {
    true
}

/// Update events trigger a reconcile when the change is meaningful
///
/// Evaluated in order: a changed status summary short-circuits as
/// significant; otherwise both copies are deep-compared with `status` and
/// `metadata.resourceVersion` stripped.
pub fn update_significant(old: &DynamicObject, new: &DynamicObject) -> bool {
    if status_summary(old) != status_summary(new) {
        return true;
    }
    normalized(old) != normalized(new)
}

/// Extract the meaningful slice of a dependent's status
///
/// Covers the shapes our dependents actually report: a `phase` string
/// (workflows), completion counters (jobs), and condition type/status
/// pairs. Timestamps and probe noise inside conditions are ignored.
fn status_summary(obj: &DynamicObject) -> Value {
    let mut summary = serde_json::Map::new();
    if let Some(status) = obj.data.get("status") {
        for key in ["phase", "succeeded", "failed", "active", "readyReplicas"] {
            if let Some(value) = status.get(key) {
                summary.insert(key.to_string(), value.clone());
            }
        }
        if let Some(conditions) = status.get("conditions").and_then(Value::as_array) {
            let pairs: Vec<Value> = conditions
                .iter()
                .map(|c| json!({ "type": c.get("type"), "status": c.get("status") }))
                .collect();
            summary.insert("conditions".to_string(), Value::Array(pairs));
        }
    }
    Value::Object(summary)
}

/// Canonical view of a dependent with status and resourceVersion stripped
fn normalized(obj: &DynamicObject) -> Value {
    let mut value = serde_json::to_value(obj).unwrap_or(Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.remove("status");
        if let Some(meta) = map.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("resourceVersion");
        }
    }
    value
}
