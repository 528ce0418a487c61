//! Periodic tick sources using ESP-IDF's esp_timer API.
//!
//! Two timers push into the lock-free event queue:
//!
//! - the sample tick, at the configured accelerometer sample rate
//! - a housekeeping tick that wakes the loop to poll the scheduler
//!
//! Callbacks run in the esp_timer task (not ISR) and only call
//! `push_event()`.  On host targets nothing is started; the sim loop
//! pushes ticks itself.

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Housekeeping tick period.
pub const HOUSEKEEPING_PERIOD_MS: u32 = 50;

#[cfg(target_os = "espidf")]
static mut SAMPLE_TIMER: esp_timer_handle_t = core::ptr::null_mut();
#[cfg(target_os = "espidf")]
static mut HOUSEKEEPING_TIMER: esp_timer_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn sample_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::SensorTick);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn housekeeping_tick_cb(_arg: *mut core::ffi::c_void) {
    push_event(Event::TimerTick);
}

#[cfg(target_os = "espidf")]
unsafe fn start_periodic(
    handle: *mut esp_timer_handle_t,
    callback: unsafe extern "C" fn(*mut core::ffi::c_void),
    name: &'static [u8],
    period_ms: u32,
) -> bool {
    let args = esp_timer_create_args_t {
        callback: Some(callback),
        arg: core::ptr::null_mut(),
        dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
        name: name.as_ptr() as *const _,
        skip_unhandled_events: true,
    };
    let ret = unsafe { esp_timer_create(&args, handle) };
    if ret != ESP_OK {
        log::error!("hw_timer: create failed (rc={})", ret);
        return false;
    }
    let ret = unsafe { esp_timer_start_periodic(*handle, u64::from(period_ms) * 1_000) };
    if ret != ESP_OK {
        log::error!("hw_timer: start failed (rc={})", ret);
        return false;
    }
    true
}

/// Start the sample and housekeeping timers.
#[cfg(target_os = "espidf")]
pub fn start_timers(sample_period_ms: u32) {
    // SAFETY: the handles are written here once at boot from the main
    // task, before any callback fires.
    unsafe {
        if !start_periodic(&raw mut SAMPLE_TIMER, sample_tick_cb, b"sample\0", sample_period_ms) {
            log::error!("hw_timer: continuing without sample ticks");
            return;
        }
        if !start_periodic(
            &raw mut HOUSEKEEPING_TIMER,
            housekeeping_tick_cb,
            b"housekeeping\0",
            HOUSEKEEPING_PERIOD_MS,
        ) {
            log::error!("hw_timer: continuing without housekeeping ticks");
            return;
        }
    }
    log::info!(
        "hw_timer: sample every {} ms, housekeeping every {} ms",
        sample_period_ms,
        HOUSEKEEPING_PERIOD_MS
    );
}

#[cfg(not(target_os = "espidf"))]
pub fn start_timers(sample_period_ms: u32) {
    log::info!(
        "hw_timer(sim): not started (sim loop ticks every {} ms)",
        sample_period_ms
    );
}

/// Stop both timers.
#[cfg(target_os = "espidf")]
pub fn stop_timers() {
    // SAFETY: handles are either null or valid from start_timers();
    // main task only.
    unsafe {
        let sample = SAMPLE_TIMER;
        if !sample.is_null() {
            esp_timer_stop(sample);
        }
        let housekeeping = HOUSEKEEPING_TIMER;
        if !housekeeping.is_null() {
            esp_timer_stop(housekeeping);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn stop_timers() {}
