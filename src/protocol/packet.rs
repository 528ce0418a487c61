//! Outbound packet catalogue.

/// Largest frame the notify characteristic carries (default ATT MTU − 3).
pub const MAX_FRAME_LEN: usize = 20;
/// Payload ceiling; with the type and checksum bytes a frame stays
/// one byte under [`MAX_FRAME_LEN`].
pub const MAX_PAYLOAD_LEN: usize = 17;

/// Type byte of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    RepCount = 0x01,
    Status = 0x02,
    Heartbeat = 0x03,
    Battery = 0x04,
    Error = 0x05,
    FieldDetected = 0x06,
    Handshake = 0x07,
}

impl PacketKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::RepCount),
            0x02 => Some(Self::Status),
            0x03 => Some(Self::Heartbeat),
            0x04 => Some(Self::Battery),
            0x05 => Some(Self::Error),
            0x06 => Some(Self::FieldDetected),
            0x07 => Some(Self::Handshake),
            _ => None,
        }
    }

    /// Fixed payload length for this type.
    pub const fn payload_len(self) -> usize {
        match self {
            Self::RepCount => 2,
            Self::Status => 4,
            Self::Heartbeat => 6,
            Self::Battery | Self::Error => 1,
            Self::FieldDetected => 5,
            Self::Handshake => 8,
        }
    }
}

/// Bit set carried by the `Status` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    pub const CALIBRATED: u8 = 0b0000_0001;
    pub const SESSION_ACTIVE: u8 = 0b0000_0010;
    pub const CONNECTED: u8 = 0b0000_0100;
    pub const AGGRESSIVE_ADV: u8 = 0b0000_1000;
    pub const FIELD_PENDING: u8 = 0b0001_0000;
    pub const LOW_BATTERY: u8 = 0b0010_0000;
    pub const CALIBRATING: u8 = 0b0100_0000;

    pub const fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// `FieldDetected` flag bits.
pub const FIELD_FLAG_PRESENT: u8 = 0b01;
pub const FIELD_FLAG_DEFERRED: u8 = 0b10;

/// One outbound notification.  Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    /// Live rep telemetry.
    RepCount { count: u16 },
    /// Point-in-time snapshot of the device.
    Status {
        flags: StatusFlags,
        battery_percent: u8,
        rep_count: u16,
    },
    /// Link liveness.
    Heartbeat { seq: u16, uptime_s: u32 },
    /// Low-battery notice.
    Battery { percent: u8 },
    /// Fault signal.
    Error { code: u8 },
    /// Near-field trigger notice.  `deferred` marks delivery after a
    /// reconnect rather than at the moment of the trigger.
    FieldDetected { deferred: bool, at_ms: u32 },
    /// Post-connect greeting.
    Handshake {
        rep_count: u16,
        firmware: [u8; 3],
        device: [u8; 3],
    },
}

impl Packet {
    pub const fn kind(&self) -> PacketKind {
        match self {
            Self::RepCount { .. } => PacketKind::RepCount,
            Self::Status { .. } => PacketKind::Status,
            Self::Heartbeat { .. } => PacketKind::Heartbeat,
            Self::Battery { .. } => PacketKind::Battery,
            Self::Error { .. } => PacketKind::Error,
            Self::FieldDetected { .. } => PacketKind::FieldDetected,
            Self::Handshake { .. } => PacketKind::Handshake,
        }
    }

    /// `RepCount` saturates the 32-bit counter into the 2-byte field.
    pub fn rep_count(count: u32) -> Self {
        Self::RepCount {
            count: saturate_u16(count),
        }
    }
}

pub(crate) fn saturate_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}
