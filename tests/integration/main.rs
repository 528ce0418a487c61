//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one slice of the
//! service against the mock adapters in [`mock_hw`].  All tests run on
//! the host with no real hardware.

mod app_service_tests;
mod connectivity_tests;
mod mock_hw;
mod power_fault_tests;
