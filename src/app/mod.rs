//! Application core: pure domain logic, zero I/O.
//!
//! Session handling, rep counting, connectivity policy, field triggers
//! and battery reporting are orchestrated by [`service::AppService`].
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
