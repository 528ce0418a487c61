//! Purpose-keyed timer slots.
//!
//! Every deferred re-entry into the firmware (advertising deadline,
//! heartbeat, post-connect handshake, battery check, calibration
//! sampling) owns exactly one slot.  Re-arming a slot replaces whatever
//! was armed there, so a re-triggered timer can never stack.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Scheduler                                                │
//! │  ┌────────────────────┬─────────────┬──────────────────┐  │
//! │  │ TimerId            │ due_ms      │ period_ms        │  │
//! │  ├────────────────────┼─────────────┼──────────────────┤  │
//! │  │ AggressiveDeadline │ Some(t)     │ None (one-shot)  │  │
//! │  │ Heartbeat          │ Some(t)     │ Some(10 000)     │  │
//! │  │ Handshake          │ None        │                  │  │
//! │  │ BatteryCheck       │ Some(t)     │ Some(60 000)     │  │
//! │  │ CalibrationSample  │ None        │                  │  │
//! │  └────────────────────┴─────────────┴──────────────────┘  │
//! │                     │ poll(now)                           │
//! │                     ▼                                     │
//! │             SchedulerDelegate::on_timer_fired(id)         │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler never calls into the service directly.  `poll` updates
//! its own slots first and only then notifies the delegate, so the
//! delegate always observes a consistent table.

use crate::app::ports::SchedulerDelegate;
use log::debug;

// ═══════════════════════════════════════════════════════════════
//  Timer identity
// ═══════════════════════════════════════════════════════════════

/// One logical timer purpose.  Each owns a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerId {
    /// Reverts aggressive advertising to normal.
    AggressiveDeadline = 0,
    /// Periodic link liveness packet while connected.
    Heartbeat = 1,
    /// Delayed post-connect greeting.
    Handshake = 2,
    /// Periodic battery sample.
    BatteryCheck = 3,
    /// Calibration sampling cadence.
    CalibrationSample = 4,
}

impl TimerId {
    pub const COUNT: usize = 5;

    pub const ALL: [TimerId; TimerId::COUNT] = [
        TimerId::AggressiveDeadline,
        TimerId::Heartbeat,
        TimerId::Handshake,
        TimerId::BatteryCheck,
        TimerId::CalibrationSample,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::AggressiveDeadline => "aggressive-deadline",
            Self::Heartbeat => "heartbeat",
            Self::Handshake => "handshake",
            Self::BatteryCheck => "battery-check",
            Self::CalibrationSample => "calibration-sample",
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Slot {
    due_ms: u64,
    /// `None` = one-shot.
    period_ms: Option<u64>,
}

/// Fixed table of cancellable timers, indexed by [`TimerId`].
#[derive(Debug, Default)]
pub struct Scheduler {
    slots: [Option<Slot>; TimerId::COUNT],
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id` to fire once at `now_ms + delay_ms`.
    ///
    /// Any instance already armed in the slot is cancelled first.
    pub fn schedule_once(&mut self, id: TimerId, now_ms: u64, delay_ms: u64) {
        if self.cancel(id) {
            debug!("Scheduler: '{}' rescheduled", id.label());
        }
        self.slots[id as usize] = Some(Slot {
            due_ms: now_ms.saturating_add(delay_ms),
            period_ms: None,
        });
    }

    /// Arm `id` to fire every `period_ms`, first at `now_ms + period_ms`.
    ///
    /// A zero period is clamped to 1 ms so `poll` always makes progress.
    pub fn schedule_periodic(&mut self, id: TimerId, now_ms: u64, period_ms: u64) {
        let period_ms = period_ms.max(1);
        self.cancel(id);
        self.slots[id as usize] = Some(Slot {
            due_ms: now_ms.saturating_add(period_ms),
            period_ms: Some(period_ms),
        });
    }

    /// Disarm `id`.  Returns `true` if something was armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.slots[id as usize].take().is_some()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots[id as usize].is_some()
    }

    /// Absolute due time of `id`, if armed.
    pub fn deadline(&self, id: TimerId) -> Option<u64> {
        self.slots[id as usize].map(|s| s.due_ms)
    }

    /// Earliest due time across all slots.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|s| s.due_ms).min()
    }

    /// Fire every slot whose deadline is at or before `now_ms`.
    ///
    /// Due timers are reported in deadline order, each exactly once per
    /// call.  Periodic slots are re-armed from their previous deadline
    /// (skipping missed periods rather than bursting); one-shot slots are
    /// disarmed before the delegate runs.
    pub fn poll(&mut self, now_ms: u64, delegate: &mut impl SchedulerDelegate) {
        let mut due: heapless::Vec<(u64, TimerId), { TimerId::COUNT }> = heapless::Vec::new();

        for id in TimerId::ALL {
            let Some(entry) = self.slots[id as usize] else { continue };
            if entry.due_ms > now_ms {
                continue;
            }

            let fired_at = entry.due_ms;
            self.slots[id as usize] = entry.period_ms.map(|period| {
                let mut next = fired_at.saturating_add(period);
                if next <= now_ms {
                    next = now_ms.saturating_add(period);
                }
                Slot {
                    due_ms: next,
                    period_ms: Some(period),
                }
            });
            // Capacity equals the slot count.
            let _ = due.push((fired_at, id));
        }

        due.sort_unstable_by_key(|(at, id)| (*at, *id as u8));
        for (_, id) in due {
            debug!("Scheduler: '{}' fired at {} ms", id.label(), now_ms);
            delegate.on_timer_fired(id);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
