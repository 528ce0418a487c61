//! Wire protocol between the sensor and the companion app.
//!
//! ```text
//!  outbound (notify)   [type: 1B][payload: 0-17B][checksum: 1B]   ≤ 20 B
//!  inbound  (write)    [command: 1B][params…]
//! ```
//!
//! The codec is pure and stateless.  There is no ack/NACK layer:
//! telemetry packets are idempotent snapshots, so a lost notification is
//! superseded by the next one.  The [`gate`] module throttles inbound
//! writes before they reach the decoder.

pub mod codec;
pub mod gate;
pub mod packet;

pub use codec::{checksum, decode_command, decode_packet, encode, encode_command, Frame};
pub use packet::{Packet, PacketKind, StatusFlags, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
