//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - the esp_timer sample tick (accelerometer cadence)
//! - the field-presence GPIO ISR
//! - Bluedroid GAP/GATTS callbacks (connect, disconnect, command write)
//! - the housekeeping tick (scheduler poll, watchdog feed)
//!
//! Events are consumed by the main loop, which hands each one to the
//! `AppService` and runs it to completion before taking the next.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Sample tmr  │────▶│              │     │              │
//! │ Field ISR   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ BLE stack   │────▶│  (MPMC, CAS) │     │  (consumer)  │
//! │ Housekeep   │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use heapless::mpmc::MpMcQueue;

/// Maximum number of pending events.
/// Power of 2, as the MPMC queue requires.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── Sensing ───────────────────────────────────────────
    /// Accelerometer sample period elapsed.
    SensorTick = 0,
    /// Near-field presence line changed level.
    FieldChanged = 1,

    // ── Radio ─────────────────────────────────────────────
    /// A central connected.
    BleConnected = 10,
    /// The central went away.
    BleDisconnected = 11,
    /// A write landed on the command characteristic.
    CommandReceived = 12,

    // ── Housekeeping ──────────────────────────────────────
    /// Poll the scheduler slots.
    TimerTick = 20,
}

// ── MPMC queue ────────────────────────────────────────────────
//
// The timer task, the GPIO ISR and the Bluedroid task all push
// concurrently.  Each producer claims its slot with a CAS on the
// enqueue position, so two pushes never land in the same cell.

static EVENT_QUEUE: MpMcQueue<u8, EVENT_QUEUE_CAP> = MpMcQueue::new();

/// Push an event into the queue.
/// Safe to call from any producer context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    EVENT_QUEUE.enqueue(event as u8).is_ok()
}

/// Pop the next event from the queue.
/// Called from the main loop.
pub fn pop_event() -> Option<Event> {
    while let Some(raw) = EVENT_QUEUE.dequeue() {
        // Unknown bytes cannot be pushed through `push_event`; skip if seen.
        if let Some(event) = event_from_u8(raw) {
            return Some(event);
        }
    }
    None
}

/// Drain all pending events into a callback.
/// Processes events in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::SensorTick),
        1 => Some(Event::FieldChanged),
        10 => Some(Event::BleConnected),
        11 => Some(Event::BleDisconnected),
        12 => Some(Event::CommandReceived),
        20 => Some(Event::TimerTick),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    // The queue is a process-wide static.
    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn fifo_order_and_capacity() {
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        drain_events(|_| {});
        assert_eq!(pop_event(), None);

        assert!(push_event(Event::BleConnected));
        assert!(push_event(Event::CommandReceived));
        assert!(push_event(Event::SensorTick));

        let mut seen = Vec::new();
        drain_events(|e| seen.push(e));
        assert_eq!(
            seen,
            vec![Event::BleConnected, Event::CommandReceived, Event::SensorTick]
        );

        let pushed = (0..EVENT_QUEUE_CAP).filter(|_| push_event(Event::TimerTick)).count();
        assert_eq!(pushed, EVENT_QUEUE_CAP);
        assert!(!push_event(Event::TimerTick));
        drain_events(|_| {});
        assert_eq!(pop_event(), None);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PER_PRODUCER: usize = 20_000;
        let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        drain_events(|_| {});

        let producers: Vec<_> = [Event::BleConnected, Event::BleDisconnected, Event::CommandReceived]
            .into_iter()
            .map(|event| {
                thread::spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        while !push_event(event) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut counts = [0usize; 3];
        while counts.iter().sum::<usize>() < 3 * PER_PRODUCER {
            match pop_event() {
                Some(Event::BleConnected) => counts[0] += 1,
                Some(Event::BleDisconnected) => counts[1] += 1,
                Some(Event::CommandReceived) => counts[2] += 1,
                Some(other) => panic!("unexpected {other:?}"),
                None => thread::yield_now(),
            }
        }
        for p in producers {
            p.join().unwrap();
        }

        assert_eq!(counts, [PER_PRODUCER; 3]);
        assert_eq!(pop_event(), None);
    }

    #[test]
    fn discriminants_round_trip() {
        for e in [
            Event::SensorTick,
            Event::FieldChanged,
            Event::BleConnected,
            Event::BleDisconnected,
            Event::CommandReceived,
            Event::TimerTick,
        ] {
            assert_eq!(event_from_u8(e as u8), Some(e));
        }
        assert_eq!(event_from_u8(99), None);
    }
}
