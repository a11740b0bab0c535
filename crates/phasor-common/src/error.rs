//! Error types for the Phasor operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each error variant carries the phase resource it relates to and a
//! description of what failed. The not-found variant is deliberately
//! separate: a dependent that is already gone is a benign outcome, not
//! a failure, and callers probe for it with [`Error::is_not_found`].

use thiserror::Error;

/// Default context value when no specific resource is available
pub const UNKNOWN_RESOURCE: &str = "unknown";

/// Main error type for Phasor operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Resource (or its dependents) not found
    ///
    /// Benign: the object was already removed by the time we looked.
    /// Never surfaced to users as a failure condition.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Name of the resource that was not found
        resource: String,
    },

    /// Drift-sync failure: the manager could not reconcile its view of
    /// the dependents with the live cluster state
    #[error("sync error for {resource}: {message}")]
    Sync {
        /// Name of the phase resource being synced
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Failure while installing dependent resources
    #[error("install error for {resource}: {message}")]
    Install {
        /// Name of the phase resource being installed
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Failure while updating dependent resources
    #[error("update error for {resource}: {message}")]
    Update {
        /// Name of the phase resource being updated
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Failure while uninstalling dependent resources
    #[error("uninstall error for {resource}: {message}")]
    Uninstall {
        /// Name of the phase resource being uninstalled
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Failure during a steady-state reconcile of dependent resources
    #[error("reconcile error for {resource}: {message}")]
    Reconcile {
        /// Name of the phase resource being reconciled
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Failure loading or parsing a dependent manifest
    #[error("manifest error [{path}]: {message}")]
    Manifest {
        /// Path of the manifest that failed to load
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Failure registering a dependent resource watch
    #[error("watch error [{kind}]: {message}")]
    Watch {
        /// Dependent kind the watch was being registered for
        kind: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a not-found error for the given resource
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a sync error with the given message
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync {
            resource: UNKNOWN_RESOURCE.to_string(),
            message: msg.into(),
        }
    }

    /// Create a sync error with resource context
    pub fn sync_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Sync {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an install error with resource context
    pub fn install_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Install {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an update error with resource context
    pub fn update_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Update {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an uninstall error with resource context
    pub fn uninstall_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Uninstall {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a reconcile error with resource context
    pub fn reconcile_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Reconcile {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a manifest error with the path that failed
    pub fn manifest(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a watch registration error for the given dependent kind
    pub fn watch_for(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Watch {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Check if this error represents a benign not-found outcome
    ///
    /// True for the explicit not-found variant and for 404s from the
    /// Kubernetes API.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube { source } => {
                matches!(source, kube::Error::Api(ae) if ae.code == 404)
            }
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Lifecycle action errors are retryable: the cluster state they
    /// depend on may change under them. Manifest errors are not (the
    /// source needs fixing). Kubernetes errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout)
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::NotFound { .. } => false,
            Error::Sync { .. } => true,
            Error::Install { .. } => true,
            Error::Update { .. } => true,
            Error::Uninstall { .. } => true,
            Error::Reconcile { .. } => true,
            Error::Manifest { .. } => false,
            Error::Watch { .. } => true,
        }
    }

    /// Get the phase resource name if this error is associated with one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::NotFound { resource } => Some(resource),
            Error::Sync { resource, .. } => Some(resource),
            Error::Install { resource, .. } => Some(resource),
            Error::Update { resource, .. } => Some(resource),
            Error::Uninstall { resource, .. } => Some(resource),
            Error::Reconcile { resource, .. } => Some(resource),
            Error::Kube { .. } | Error::Manifest { .. } | Error::Watch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Phase Lifecycle Operations
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the system during the
    // phase lifecycle. Action errors propagate to the work queue so its
    // backoff applies; a not-found outcome is benign and never propagates
    // as a failure.

    /// Story: a dependent that is already gone is not a failure
    ///
    /// When uninstall finds the dependents already removed, the deletion
    /// protocol strips the finalizer instead of reporting an error.
    #[test]
    fn story_not_found_is_benign() {
        let err = Error::not_found("planning-wf");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(err.resource(), Some("planning-wf"));
        assert!(err.to_string().contains("not found"));

        // An action error is decidedly not a not-found outcome
        let err = Error::uninstall_for("planning-wf", "job deletion rejected");
        assert!(!err.is_not_found());
    }

    /// Story: lifecycle action errors carry the phase resource context
    #[test]
    fn story_action_errors_include_resource_context() {
        let err = Error::install_for("upgrade-2024", "workflow template invalid");
        assert!(err.to_string().contains("install error"));
        assert!(err.to_string().contains("upgrade-2024"));
        assert_eq!(err.resource(), Some("upgrade-2024"));

        let err = Error::update_for("rollout-canary", "job immutable field changed");
        assert!(err.to_string().contains("update error"));
        assert_eq!(err.resource(), Some("rollout-canary"));

        let err = Error::reconcile_for("operational-db", "dependent list failed");
        assert!(err.to_string().contains("reconcile error"));
        assert_eq!(err.resource(), Some("operational-db"));
    }

    /// Story: sync errors are fatal to the pass but still retryable
    ///
    /// A drift-sync failure surfaces as Irreconcilable and aborts the pass
    /// (unless deleting); the queue retries it with backoff.
    #[test]
    fn story_sync_errors_are_retryable() {
        let err = Error::sync_for("planning-wf", "owned dependents unreadable");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("sync error"));

        // Bare constructor falls back to the unknown placeholder
        let err = Error::sync("listing failed");
        assert_eq!(err.resource(), Some(UNKNOWN_RESOURCE));
    }

    /// Story: manifest errors require a source fix, not a retry
    #[test]
    fn story_manifest_errors_are_permanent() {
        let err = Error::manifest("/etc/phasor/manifests/planning/job.yaml", "invalid YAML");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("manifest error"));
        assert!(err.to_string().contains("job.yaml"));
        assert_eq!(err.resource(), None);
    }

    /// Story: errors have is_retryable() for the error policy
    #[test]
    fn story_error_retryability() {
        assert!(Error::install_for("p", "timeout").is_retryable());
        assert!(Error::update_for("p", "conflict").is_retryable());
        assert!(Error::uninstall_for("p", "stuck finalizer").is_retryable());
        assert!(Error::reconcile_for("p", "list failed").is_retryable());
        assert!(Error::watch_for("Job", "stream closed").is_retryable());
        assert!(!Error::not_found("p").is_retryable());
        assert!(!Error::manifest("a.yaml", "bad").is_retryable());
    }

    /// Story: error constructors accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let name = "traffic-rollout-blue";
        let err = Error::install_for(name, format!("render failed for {}", name));
        assert!(err.to_string().contains("traffic-rollout-blue"));

        let err = Error::watch_for("Workflow", "registration rejected");
        assert!(err.to_string().contains("[Workflow]"));
    }
}
