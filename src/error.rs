//! Unified error types for the RepClip firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! top-level supervisor handles every fault the same way.  All variants
//! are `Copy` and map to a one-byte code carried by the `Error` packet.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The accelerometer or battery gauge could not be read.
    Sensor(SensorError),
    /// The radio refused a request.
    Comms(CommsError),
    /// An inbound or outbound frame was malformed.
    Protocol(ProtocolError),
    /// A calibration run did not produce a baseline.
    Calibration(CalibrationError),
    /// An internal invariant broke.
    Fault(FaultKind),
}

impl Error {
    /// Wire code carried by the outbound `Error` packet.
    pub const fn code(self) -> u8 {
        match self {
            Self::Sensor(_) => 0x01,
            Self::Comms(CommsError::ServiceSetupFailed) => 0x02,
            Self::Comms(_) => 0x03,
            Self::Protocol(_) => 0x04,
            Self::Calibration(_) => 0x05,
            Self::Fault(FaultKind::InvariantViolated(_)) => 0x06,
            Self::Fault(_) => 0x7F,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
            Self::Fault(e) => write!(f, "fault: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The I2C transaction with the accelerometer failed.
    BusFailed,
    /// The part on the bus did not identify as the expected device.
    WrongDevice(u8),
    /// No new sample was ready.
    NotReady,
    /// Battery ADC read returned an error.
    AdcReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusFailed => write!(f, "I2C transaction failed"),
            Self::WrongDevice(id) => write!(f, "unexpected WHO_AM_I 0x{id:02X}"),
            Self::NotReady => write!(f, "no sample ready"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// GATT service registration or controller bring-up failed.
    ServiceSetupFailed,
    /// A send was attempted with no central attached.
    NotConnected,
    /// The stack had no buffer for the notification.
    Busy,
    /// Connectivity was disabled after a setup failure.
    Disabled,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceSetupFailed => write!(f, "BLE service setup failed"),
            Self::NotConnected => write!(f, "no central connected"),
            Self::Busy => write!(f, "radio busy"),
            Self::Disabled => write!(f, "connectivity disabled"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Zero-length buffer.
    Empty,
    /// Inbound command id not in the catalogue.
    UnknownCommand(u8),
    /// Outbound packet type not in the catalogue.
    UnknownPacket(u8),
    /// Trailing checksum did not match the preceding bytes.
    BadChecksum { expected: u8, found: u8 },
    /// Payload length did not match the packet type.
    BadLength { kind: u8, len: usize },
    /// Encoded frame would exceed the 20-byte MTU.
    TooLong,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownCommand(id) => write!(f, "unknown command 0x{id:02X}"),
            Self::UnknownPacket(id) => write!(f, "unknown packet type 0x{id:02X}"),
            Self::BadChecksum { expected, found } => {
                write!(f, "checksum 0x{found:02X}, expected 0x{expected:02X}")
            }
            Self::BadLength { kind, len } => {
                write!(f, "type 0x{kind:02X} with {len}-byte payload")
            }
            Self::TooLong => write!(f, "frame exceeds MTU"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// Per-axis variance exceeded the configured ceiling.
    Unstable { variance: f32 },
    /// Completion requested with no samples.
    NoSamples,
}

// `variance` is always finite, so the bitwise comparison is total.
impl Eq for CalibrationError {}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstable { variance } => write!(f, "device moved (variance {variance:.4})"),
            Self::NoSamples => write!(f, "no samples collected"),
        }
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

// ---------------------------------------------------------------------------
// Internal faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A DeviceState invariant was found broken after a handler ran.
    InvariantViolated(&'static str),
    /// A handler hit a state it cannot make a local decision about.
    Unhandled(&'static str),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvariantViolated(what) => write!(f, "invariant violated: {what}"),
            Self::Unhandled(what) => write!(f, "unhandled: {what}"),
        }
    }
}

impl From<FaultKind> for Error {
    fn from(e: FaultKind) -> Self {
        Self::Fault(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
