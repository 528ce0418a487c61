//! Checksum-framed packet codec.
//!
//! Wire format:
//! ```text
//! ┌──────────┬──────────────────────┬──────────────┐
//! │ Type (1B)│ Payload (0–17 B, LE) │ Checksum (1B)│
//! └──────────┴──────────────────────┴──────────────┘
//!   checksum = Σ(type, payload…) mod 256
//! ```
//!
//! Inbound frames carry no checksum: `[command][params…]`.  Trailing
//! params are accepted and ignored by commands that take none.

use crate::app::commands::AppCommand;
use crate::error::ProtocolError;

use super::packet::{
    saturate_u16, Packet, PacketKind, StatusFlags, FIELD_FLAG_DEFERRED, FIELD_FLAG_PRESENT,
    MAX_FRAME_LEN,
};

/// An encoded outbound frame.
pub type Frame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Modulo-256 sum of every byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode an outbound packet into a checksummed frame.
pub fn encode(packet: &Packet) -> Result<Frame, ProtocolError> {
    let mut frame = Frame::new();
    push(&mut frame, &[packet.kind() as u8])?;

    match *packet {
        Packet::RepCount { count } => push(&mut frame, &count.to_le_bytes())?,
        Packet::Status {
            flags,
            battery_percent,
            rep_count,
        } => {
            push(&mut frame, &[flags.0, battery_percent])?;
            push(&mut frame, &rep_count.to_le_bytes())?;
        }
        Packet::Heartbeat { seq, uptime_s } => {
            push(&mut frame, &seq.to_le_bytes())?;
            push(&mut frame, &uptime_s.to_le_bytes())?;
        }
        Packet::Battery { percent } => push(&mut frame, &[percent])?,
        Packet::Error { code } => push(&mut frame, &[code])?,
        Packet::FieldDetected { deferred, at_ms } => {
            let mut flags = FIELD_FLAG_PRESENT;
            if deferred {
                flags |= FIELD_FLAG_DEFERRED;
            }
            push(&mut frame, &[flags])?;
            push(&mut frame, &at_ms.to_le_bytes())?;
        }
        Packet::Handshake {
            rep_count,
            firmware,
            device,
        } => {
            push(&mut frame, &rep_count.to_le_bytes())?;
            push(&mut frame, &firmware)?;
            push(&mut frame, &device)?;
        }
    }

    let sum = checksum(&frame);
    push(&mut frame, &[sum])?;
    Ok(frame)
}

/// Decode an outbound frame, verifying type, length and checksum.
pub fn decode_packet(frame: &[u8]) -> Result<Packet, ProtocolError> {
    let (&found, body) = frame.split_last().ok_or(ProtocolError::Empty)?;
    let (&raw_kind, payload) = body.split_first().ok_or(ProtocolError::Empty)?;

    let expected = checksum(body);
    if expected != found {
        return Err(ProtocolError::BadChecksum { expected, found });
    }

    let kind = PacketKind::from_u8(raw_kind).ok_or(ProtocolError::UnknownPacket(raw_kind))?;
    if payload.len() != kind.payload_len() {
        return Err(ProtocolError::BadLength {
            kind: raw_kind,
            len: payload.len(),
        });
    }

    let p = payload;
    Ok(match kind {
        PacketKind::RepCount => Packet::RepCount { count: le16(p, 0) },
        PacketKind::Status => Packet::Status {
            flags: StatusFlags(p[0]),
            battery_percent: p[1],
            rep_count: le16(p, 2),
        },
        PacketKind::Heartbeat => Packet::Heartbeat {
            seq: le16(p, 0),
            uptime_s: le32(p, 2),
        },
        PacketKind::Battery => Packet::Battery { percent: p[0] },
        PacketKind::Error => Packet::Error { code: p[0] },
        PacketKind::FieldDetected => Packet::FieldDetected {
            deferred: p[0] & FIELD_FLAG_DEFERRED != 0,
            at_ms: le32(p, 1),
        },
        PacketKind::Handshake => Packet::Handshake {
            rep_count: le16(p, 0),
            firmware: [p[2], p[3], p[4]],
            device: [p[5], p[6], p[7]],
        },
    })
}

/// Decode an inbound command write.
pub fn decode_command(bytes: &[u8]) -> Result<AppCommand, ProtocolError> {
    let (&id, _params) = bytes.split_first().ok_or(ProtocolError::Empty)?;
    AppCommand::from_id(id).ok_or(ProtocolError::UnknownCommand(id))
}

/// Encode a command the way the companion app writes it.
pub fn encode_command(cmd: AppCommand) -> [u8; 1] {
    [cmd.id()]
}

/// Two-byte count as carried by `RepCount` and `Handshake`.
pub fn wire_count(count: u32) -> u16 {
    saturate_u16(count)
}

// ── Internal ──────────────────────────────────────────────────

fn push(frame: &mut Frame, bytes: &[u8]) -> Result<(), ProtocolError> {
    frame
        .extend_from_slice(bytes)
        .map_err(|_| ProtocolError::TooLong)
}

fn le16(p: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([p[at], p[at + 1]])
}

fn le32(p: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rep_count_frame_layout() {
        let frame = encode(&Packet::RepCount { count: 0x0102 }).unwrap();
        assert_eq!(frame.as_slice(), &[0x01, 0x02, 0x01, 0x04]);
    }

    #[test]
    fn checksum_wraps_mod_256() {
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn handshake_is_largest_frame_and_fits() {
        let frame = encode(&Packet::Handshake {
            rep_count: 7,
            firmware: [0, 3, 0],
            device: [0xEF, 0xCA, 0xFE],
        })
        .unwrap();
        assert_eq!(frame.len(), 10);
        assert!(frame.len() <= MAX_FRAME_LEN);
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut frame = encode(&Packet::Battery { percent: 18 }).unwrap();
        frame[1] ^= 0x40;
        assert!(matches!(
            decode_packet(&frame),
            Err(ProtocolError::BadChecksum { .. })
        ));
    }

    #[test]
    fn wrong_length_rejected() {
        // Battery type with a two-byte payload and a valid checksum.
        let body = [0x04, 10, 11];
        let mut frame = body.to_vec();
        frame.push(checksum(&body));
        assert_eq!(
            decode_packet(&frame),
            Err(ProtocolError::BadLength { kind: 0x04, len: 2 })
        );
    }

    #[test]
    fn unknown_packet_type_rejected() {
        let body = [0x55];
        let frame = [0x55, checksum(&body)];
        assert_eq!(decode_packet(&frame), Err(ProtocolError::UnknownPacket(0x55)));
    }

    #[test]
    fn empty_buffers_rejected() {
        assert_eq!(decode_packet(&[]), Err(ProtocolError::Empty));
        assert_eq!(decode_packet(&[0x00]), Err(ProtocolError::Empty));
        assert_eq!(decode_command(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn commands_decode_and_ignore_params() {
        assert_eq!(decode_command(&[0x02]), Ok(AppCommand::StartSession));
        assert_eq!(decode_command(&[0x05, 0xAA, 0xBB]), Ok(AppCommand::RequestStatus));
        assert_eq!(decode_command(&[0x99]), Err(ProtocolError::UnknownCommand(0x99)));
    }

    #[test]
    fn field_detected_flags() {
        let frame = encode(&Packet::FieldDetected {
            deferred: true,
            at_ms: 1234,
        })
        .unwrap();
        assert_eq!(frame[1], FIELD_FLAG_PRESENT | FIELD_FLAG_DEFERRED);
        assert_eq!(
            decode_packet(&frame),
            Ok(Packet::FieldDetected {
                deferred: true,
                at_ms: 1234
            })
        );
    }

    #[test]
    fn wire_count_saturates() {
        assert_eq!(wire_count(u32::MAX), u16::MAX);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_packet() -> impl Strategy<Value = Packet> {
        prop_oneof![
            any::<u16>().prop_map(|count| Packet::RepCount { count }),
            (any::<u8>(), 0u8..=100, any::<u16>()).prop_map(|(f, b, c)| Packet::Status {
                flags: StatusFlags(f),
                battery_percent: b,
                rep_count: c,
            }),
            (any::<u16>(), any::<u32>())
                .prop_map(|(seq, uptime_s)| Packet::Heartbeat { seq, uptime_s }),
            any::<u8>().prop_map(|percent| Packet::Battery { percent }),
            any::<u8>().prop_map(|code| Packet::Error { code }),
            (any::<bool>(), any::<u32>())
                .prop_map(|(deferred, at_ms)| Packet::FieldDetected { deferred, at_ms }),
            (any::<u16>(), any::<[u8; 3]>(), any::<[u8; 3]>()).prop_map(|(c, fw, dev)| {
                Packet::Handshake {
                    rep_count: c,
                    firmware: fw,
                    device: dev,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(packet in arb_packet()) {
            let frame = encode(&packet).unwrap();
            prop_assert!(frame.len() <= MAX_FRAME_LEN);
            let (last, body) = frame.split_last().unwrap();
            prop_assert_eq!(*last, checksum(body));
            prop_assert_eq!(decode_packet(&frame), Ok(packet));
        }

        #[test]
        fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = decode_packet(&bytes);
            let _ = decode_command(&bytes);
        }
    }
}
