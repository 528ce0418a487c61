//! RepClip firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod field_trigger;
pub mod fsm;
pub mod pins;
pub mod power;
pub mod protocol;
pub mod scheduler;
pub mod sensors;

// Platform-facing modules; implementations are cfg-gated inside.
pub mod adapters;
pub mod drivers;
