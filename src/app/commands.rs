//! Inbound commands to the application service.
//!
//! The companion app writes these to the command characteristic; the
//! codec turns the first byte into an [`AppCommand`] and the
//! [`AppService`](super::service::AppService) dispatches it.

/// The six commands the companion app may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppCommand {
    /// Zero the rep counter, regardless of session state.
    Reset = 0x01,
    /// Begin a session (requires a calibrated device).
    StartSession = 0x02,
    /// End the running session.
    EndSession = 0x03,
    /// Re-collect the stationary baseline.
    Calibrate = 0x04,
    /// Reply with a `Status` snapshot.
    RequestStatus = 0x05,
    /// The app saw the field trigger; drop back to normal advertising.
    FieldAck = 0x06,
}

impl AppCommand {
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Self::Reset),
            0x02 => Some(Self::StartSession),
            0x03 => Some(Self::EndSession),
            0x04 => Some(Self::Calibrate),
            0x05 => Some(Self::RequestStatus),
            0x06 => Some(Self::FieldAck),
            _ => None,
        }
    }
}
