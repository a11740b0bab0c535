//! Operator configuration

use std::path::PathBuf;
use std::time::Duration;

use phasor_common::DEFAULT_RECONCILE_PERIOD_SECS;

/// Runtime configuration shared by all phase controllers
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Period between steady-state reconcile passes
    pub reconcile_period: Duration,

    /// Base directory for phase manifest sources with relative paths
    pub manifest_dir: PathBuf,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            reconcile_period: Duration::from_secs(DEFAULT_RECONCILE_PERIOD_SECS),
            manifest_dir: PathBuf::from("/etc/phasor/manifests"),
        }
    }
}
