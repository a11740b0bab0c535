//! Phasor operator library
//!
//! Wires one controller per phase kind over the generic reconciliation
//! engine: the reference manifest manager supplies lifecycle actions, the
//! dependent watch hub routes significant dependent events back into each
//! controller's queue, and `controllers` builds the runnable futures.

pub mod config;
pub mod controllers;
pub mod manager;
pub mod watch_hub;

pub use phasor_common::crd;
