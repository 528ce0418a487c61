//! Near-field trigger: edge detection on the presence line, plus the
//! NDEF URI record used when the companion app initiates the flow from
//! a phone-side NFC read.
//!
//! A trigger is a not-present → present edge.  Holding the phone in the
//! field does not re-trigger, and an edge arriving less than
//! `field_rearm_ms` after the previous trigger is treated as contact
//! bounce and ignored.

use log::{debug, warn};

use crate::config::SystemConfig;
use crate::error::ProtocolError;

pub struct FieldTrigger {
    present: bool,
    last_trigger_ms: Option<u64>,
    rearm_ms: u64,
}

impl FieldTrigger {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            present: false,
            last_trigger_ms: None,
            rearm_ms: u64::from(config.field_rearm_ms),
        }
    }

    /// Feed the current presence level.  Returns `true` on a qualifying
    /// rising edge.
    pub fn update(&mut self, present: bool, now_ms: u64) -> bool {
        let rising = present && !self.present;
        self.present = present;
        if !rising {
            return false;
        }

        if let Some(last) = self.last_trigger_ms {
            if now_ms.saturating_sub(last) < self.rearm_ms {
                debug!("Field: edge {} ms after last trigger, ignored", now_ms - last);
                return false;
            }
        }
        self.last_trigger_ms = Some(now_ms);
        true
    }

    pub fn is_present(&self) -> bool {
        self.present
    }
}

// ── NDEF URI bridge ───────────────────────────────────────────

/// Encoded record size ceiling (fits a 64-byte NTAG user page block).
pub const NDEF_MAX_LEN: usize = 64;

pub type NdefRecord = heapless::Vec<u8, NDEF_MAX_LEN>;

/// URI identifier codes, longest prefix first within each scheme.
const URI_PREFIXES: [(u8, &str); 4] = [
    (0x02, "https://www."),
    (0x01, "http://www."),
    (0x04, "https://"),
    (0x03, "http://"),
];

/// MB | ME | SR, TNF = well-known.
const NDEF_HEADER_SHORT_WELL_KNOWN: u8 = 0xD1;
const NDEF_TYPE_URI: u8 = b'U';

/// Build a single short NDEF URI record for `url`.
pub fn ndef_uri_record(url: &str) -> Result<NdefRecord, ProtocolError> {
    if url.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let (code, rest) = URI_PREFIXES
        .iter()
        .find_map(|&(code, prefix)| url.strip_prefix(prefix).map(|rest| (code, rest)))
        .unwrap_or((0x00, url));

    let payload_len = u8::try_from(1 + rest.len()).map_err(|_| ProtocolError::TooLong)?;

    let mut record = NdefRecord::new();
    record
        .extend_from_slice(&[NDEF_HEADER_SHORT_WELL_KNOWN, 1, payload_len, NDEF_TYPE_URI, code])
        .map_err(|_| ProtocolError::TooLong)?;
    record
        .extend_from_slice(rest.as_bytes())
        .map_err(|_| ProtocolError::TooLong)?;
    Ok(record)
}

/// The record for the configured companion URL, if one is set.
pub fn bridge_record(config: &SystemConfig) -> Option<NdefRecord> {
    let url = config.field_url.as_ref()?;
    match ndef_uri_record(url) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Field: NDEF bridge disabled ({e})");
            None
        }
    }
}
