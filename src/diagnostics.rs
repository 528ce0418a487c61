//! Fault log and runtime diagnostics.
//!
//! Keeps the last [`FAULT_RING_SLOTS`] supervisor faults in RAM together
//! with a handful of runtime counters.  Nothing is persisted: a reset
//! starts from an empty log.  A snapshot can be rendered as JSON for the
//! periodic diagnostics log line.

use serde::Serialize;

use crate::error::Error;

pub const FAULT_RING_SLOTS: usize = 8;

/// One fault seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultRecord {
    pub at_ms: u64,
    pub error: Error,
}

/// Fixed-size ring of the most recent faults.  The oldest record is
/// overwritten once the ring is full.
#[derive(Debug, Default)]
pub struct FaultLog {
    slots: [Option<FaultRecord>; FAULT_RING_SLOTS],
    write_index: usize,
    total: u32,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at_ms: u64, error: Error) {
        self.slots[self.write_index] = Some(FaultRecord { at_ms, error });
        self.write_index = (self.write_index + 1) % FAULT_RING_SLOTS;
        self.total = self.total.saturating_add(1);
    }

    /// Stored records, oldest first.
    pub fn records(&self) -> heapless::Vec<FaultRecord, FAULT_RING_SLOTS> {
        let mut out = heapless::Vec::new();
        for i in 0..FAULT_RING_SLOTS {
            let idx = (self.write_index + i) % FAULT_RING_SLOTS;
            if let Some(rec) = self.slots[idx] {
                let _ = out.push(rec);
            }
        }
        out
    }

    pub fn latest(&self) -> Option<FaultRecord> {
        let idx = (self.write_index + FAULT_RING_SLOTS - 1) % FAULT_RING_SLOTS;
        self.slots[idx]
    }

    /// Faults recorded since boot, including overwritten ones.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Counters maintained by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeMetrics {
    pub reps: u32,
    pub sensor_failures: u32,
    pub dropped_sends: u32,
    pub dropped_commands: u32,
    pub faults: u32,
}

/// Serialisable snapshot for the diagnostics log line.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub uptime_s: u64,
    pub metrics: RuntimeMetrics,
    pub last_fault_code: Option<u8>,
    pub heap_free: u32,
}

impl DiagnosticsReport {
    pub fn collect(now_ms: u64, metrics: RuntimeMetrics, faults: &FaultLog) -> Self {
        Self {
            uptime_s: now_ms / 1000,
            metrics,
            last_fault_code: faults.latest().map(|r| r.error.code()),
            heap_free: free_heap(),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[cfg(target_os = "espidf")]
fn free_heap() -> u32 {
    // SAFETY: plain read of the allocator's counters.
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

#[cfg(not(target_os = "espidf"))]
fn free_heap() -> u32 {
    0
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Log the panic reason before the default handler aborts.
///
/// Call once during init, after the logger is up.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        match info.location() {
            Some(loc) => log::error!("PANIC: {} at {}:{}", reason, loc.file(), loc.line()),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}
