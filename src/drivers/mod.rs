//! Indicator drivers, hardware initialisation, and tick sources.

pub mod haptic;
pub mod hw_init;
pub mod hw_timer;
pub mod led_patterns;
pub mod status_led;
pub mod watchdog;
