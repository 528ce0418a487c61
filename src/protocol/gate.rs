//! Inbound command throttle.
//!
//! A misbehaving central can write the command characteristic far faster
//! than the main loop needs.  Writes beyond the token-bucket budget are
//! dropped before they reach the decoder.
//!
//! The bucket runs on the service clock: each `admit` carries the
//! handler's `now_ms`, the same time base the scheduler sees.

use burster::Limiter;
use core::cell::Cell;
use core::time::Duration;
use log::warn;
use std::rc::Rc;

use crate::config::SystemConfig;

type ClockFn = Box<dyn Fn() -> Duration>;

/// Token bucket in front of the command decoder.
pub struct CommandGate {
    bucket: burster::TokenBucket<ClockFn>,
    clock_ms: Rc<Cell<u64>>,
    dropped: u32,
}

impl CommandGate {
    /// Build a full bucket with its clock at boot (0 ms).
    pub fn new(config: &SystemConfig) -> Self {
        let clock_ms = Rc::new(Cell::new(0));
        let source = Rc::clone(&clock_ms);
        let provider: ClockFn = Box::new(move || Duration::from_millis(source.get()));
        Self {
            bucket: burster::TokenBucket::new_with_time_provider(
                config.command_rate_per_sec.into(),
                config.command_burst.into(),
                provider,
            ),
            clock_ms,
            dropped: 0,
        }
    }

    /// Spend one token at `now_ms`; `false` means drop this write.
    pub fn admit(&mut self, now_ms: u64) -> bool {
        // The clock never runs backwards, even if a caller's does.
        self.clock_ms.set(self.clock_ms.get().max(now_ms));
        if self.bucket.try_consume(1).is_ok() {
            true
        } else {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("gate: command dropped (total {})", self.dropped);
            false
        }
    }

    /// Writes refused since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(rate: u32, burst: u32) -> CommandGate {
        let config = SystemConfig {
            command_rate_per_sec: rate,
            command_burst: burst,
            ..SystemConfig::default()
        };
        CommandGate::new(&config)
    }

    #[test]
    fn burst_then_exhaustion() {
        let mut gate = gate(1, 3);
        let admitted = (0..10).filter(|_| gate.admit(0)).count();
        assert_eq!(admitted, 3);
        assert_eq!(gate.dropped(), 7);
    }

    #[test]
    fn tokens_refill_at_the_configured_rate() {
        let mut gate = gate(2, 2);
        assert!(gate.admit(0));
        assert!(gate.admit(0));
        assert!(!gate.admit(499));

        // Half a second at 2/s buys one token.
        assert!(gate.admit(500));
        assert!(!gate.admit(500));

        // A long quiet spell refills only up to the burst size.
        assert!(gate.admit(60_000));
        assert!(gate.admit(60_000));
        assert!(!gate.admit(60_000));
        assert_eq!(gate.dropped(), 3);
    }

    #[test]
    fn stale_timestamps_do_not_rewind_the_bucket() {
        let mut gate = gate(1, 1);
        assert!(gate.admit(5_000));
        assert!(!gate.admit(1_000));
        assert!(gate.admit(6_000));
    }
}
