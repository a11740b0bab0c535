//! Common types for Phasor: phase CRDs, conditions, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all Phasor CRDs
pub const API_GROUP: &str = "phasor.dev";

/// Field manager name used for server-side apply and merge patches
pub const FIELD_MANAGER: &str = "phasor-controller";

/// Default period between steady-state reconcile passes, in seconds
///
/// Acts as the periodic resync floor: it bounds how stale a phase can get
/// when no dependent watch event fires.
pub const DEFAULT_RECONCILE_PERIOD_SECS: u64 = 120;

/// Default requeue delay applied by the error policy for retryable errors
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;
