//! LED pattern engine with priority-based pattern selection.
//!
//! Turns [`IndicatorPattern`] requests into time-varying RGB values for
//! the status LED.  The main loop calls `tick()` every pass and feeds
//! the result to `StatusLed::set_colour()`.
//!
//! ## Priority hierarchy (highest first)
//!
//! 1. **Fault**: rapid red flash, held for [`FAULT_HOLD_MS`]
//! 2. **Transient**: rep / field / low-battery flashes, each with its
//!    own hold time
//! 3. **Session**: uncalibrated, calibrating, session running
//! 4. **Connectivity**: advertising, fast advertising, connected
//!
//! ## Pattern types
//!
//! | Pattern      | Description                      | Rate   |
//! |-------------|----------------------------------|--------|
//! | Solid        | Constant colour                  | -      |
//! | SlowPulse    | Triangular brightness fade       | 1 Hz   |
//! | FastBlink    | On/off square wave               | 4 Hz   |
//! | Breathing    | Smooth ramp up/down              | 0.5 Hz |
//! | DoubleBlink  | Two quick flashes, then pause    | 1 Hz   |
//! | RapidFlash   | Very fast on/off                 | 8 Hz   |
//! | Heartbeat    | One short flash every 3 s        | ⅓ Hz   |

use crate::app::ports::IndicatorPattern;

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

pub const FAULT_HOLD_MS: u32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternId {
    Solid,
    SlowPulse,
    FastBlink,
    Breathing,
    DoubleBlink,
    RapidFlash,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternRequest {
    pub colour: Rgb,
    pub pattern: PatternId,
    pub priority: u8,
}

/// A request that expires.
#[derive(Debug, Clone, Copy)]
struct Timed {
    request: PatternRequest,
    remaining_ms: u32,
}

// ── Colours ───────────────────────────────────────────────────

pub const COLOUR_UNCALIBRATED: Rgb = (255, 120, 0); // Orange
pub const COLOUR_CALIBRATING: Rgb = (255, 200, 0); // Yellow
pub const COLOUR_IDLE: Rgb = (0, 60, 20); // Dim green
pub const COLOUR_SESSION: Rgb = (0, 255, 60); // Green
pub const COLOUR_ADVERTISING: Rgb = (0, 60, 255); // Blue
pub const COLOUR_CONNECTED: Rgb = (0, 180, 255); // Cyan
pub const COLOUR_REP: Rgb = (255, 255, 255); // White
pub const COLOUR_FIELD: Rgb = (160, 0, 255); // Purple
pub const COLOUR_LOW_BATTERY: Rgb = (255, 80, 0); // Amber
pub const COLOUR_FAULT: Rgb = (255, 0, 0); // Red

/// LED pattern engine. Stack-allocated, no heap.
#[derive(Debug, Default)]
pub struct LedPatternEngine {
    phase_ms: u32,
    active: Option<PatternRequest>,
    fault: Option<Timed>,
    transient: Option<Timed>,
    session: Option<PatternRequest>,
    connectivity: Option<PatternRequest>,
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one indicator request to the matching layer.
    pub fn show(&mut self, pattern: IndicatorPattern) {
        use IndicatorPattern as P;
        match pattern {
            P::Off => self.clear_all(),
            P::Uncalibrated => self.set_session(COLOUR_UNCALIBRATED, PatternId::SlowPulse),
            P::Calibrating => self.set_session(COLOUR_CALIBRATING, PatternId::FastBlink),
            P::Idle => self.set_session(COLOUR_IDLE, PatternId::Breathing),
            P::SessionActive => self.set_session(COLOUR_SESSION, PatternId::Solid),
            P::Advertising => self.set_connectivity(COLOUR_ADVERTISING, PatternId::Heartbeat),
            P::FastAdvertising => self.set_connectivity(COLOUR_ADVERTISING, PatternId::FastBlink),
            P::Connected => self.set_connectivity(COLOUR_CONNECTED, PatternId::Breathing),
            P::Rep => self.flash(COLOUR_REP, PatternId::Solid, 120),
            P::FieldTrigger => self.flash(COLOUR_FIELD, PatternId::RapidFlash, 600),
            P::LowBattery => self.flash(COLOUR_LOW_BATTERY, PatternId::DoubleBlink, 1_000),
            P::Fault => {
                self.fault = Some(Timed {
                    request: PatternRequest {
                        colour: COLOUR_FAULT,
                        pattern: PatternId::RapidFlash,
                        priority: 1,
                    },
                    remaining_ms: FAULT_HOLD_MS,
                });
            }
        }
    }

    /// Session-layer pattern (priority 3).  Replaces the connectivity
    /// pattern as the steady display.
    pub fn set_session(&mut self, colour: Rgb, pattern: PatternId) {
        self.session = Some(PatternRequest {
            colour,
            pattern,
            priority: 3,
        });
    }

    /// Connectivity-layer pattern (priority 4, lowest).  Only visible
    /// while no session pattern is set, so it clears the session layer.
    pub fn set_connectivity(&mut self, colour: Rgb, pattern: PatternId) {
        self.session = None;
        self.connectivity = Some(PatternRequest {
            colour,
            pattern,
            priority: 4,
        });
    }

    /// Transient flash (priority 2); a newer flash replaces an older one.
    pub fn flash(&mut self, colour: Rgb, pattern: PatternId, hold_ms: u32) {
        self.transient = Some(Timed {
            request: PatternRequest {
                colour,
                pattern,
                priority: 2,
            },
            remaining_ms: hold_ms,
        });
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    /// Advance the pattern phase by `delta_ms` and return the current
    /// RGB output.
    pub fn tick(&mut self, delta_ms: u32) -> Rgb {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);
        expire(&mut self.fault, delta_ms);
        expire(&mut self.transient, delta_ms);

        let selected = self.select_active();
        let reset_phase = match (&self.active, &selected) {
            (Some(prev), Some(next)) => prev != next,
            (None, Some(_)) => true,
            _ => false,
        };
        if reset_phase {
            self.phase_ms = 0;
        }
        self.active = selected;

        match &self.active {
            Some(req) => self.generate(req.colour, req.pattern),
            None => (0, 0, 0),
        }
    }

    pub fn active(&self) -> Option<PatternRequest> {
        self.active
    }

    fn select_active(&self) -> Option<PatternRequest> {
        self.fault
            .map(|t| t.request)
            .or(self.transient.map(|t| t.request))
            .or(self.session)
            .or(self.connectivity)
    }

    fn generate(&self, colour: Rgb, pattern: PatternId) -> Rgb {
        let (r, g, b) = colour;
        let gate = |on: bool| if on { colour } else { (0, 0, 0) };
        match pattern {
            PatternId::Solid => colour,
            PatternId::SlowPulse => scale(r, g, b, triangle(self.phase_ms, 1000)),
            PatternId::Breathing => scale(r, g, b, triangle(self.phase_ms, 2000)),
            PatternId::FastBlink => gate((self.phase_ms % 250) < 125),
            PatternId::DoubleBlink => {
                let cycle = self.phase_ms % 1000;
                gate(cycle < 100 || (200..300).contains(&cycle))
            }
            PatternId::RapidFlash => gate((self.phase_ms % 125) < 63),
            PatternId::Heartbeat => gate((self.phase_ms % 3000) < 60),
        }
    }
}

fn expire(slot: &mut Option<Timed>, delta_ms: u32) {
    if let Some(t) = slot {
        if t.remaining_ms <= delta_ms {
            *slot = None;
        } else {
            t.remaining_ms -= delta_ms;
        }
    }
}

/// Triangular ramp 0→255→0 over `period_ms`; no libm.
fn triangle(phase_ms: u32, period_ms: u32) -> u8 {
    let pos = u64::from(phase_ms % period_ms);
    let half = u64::from(period_ms) / 2;
    if pos < half {
        ((pos * 255) / half) as u8
    } else {
        (((u64::from(period_ms) - pos) * 255) / half) as u8
    }
}

fn scale(r: u8, g: u8, b: u8, brightness: u8) -> Rgb {
    let br = u16::from(brightness);
    (
        ((u16::from(r) * br) / 255) as u8,
        ((u16::from(g) * br) / 255) as u8,
        ((u16::from(b) * br) / 255) as u8,
    )
}
