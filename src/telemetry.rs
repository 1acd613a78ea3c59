//! Post-profile telemetry stream
//!
//! After the profile engine has remapped an event, the result is mirrored as
//! a small framed packet so the configuration console can show what is
//! actually sent on the wire. Frames are postcard-serialized, protected by a
//! CRC-16 and COBS-framed with a zero sentinel, the same packet shape the
//! serial console speaks. The console itself is an external collaborator; it
//! plugs in by implementing [`TelemetrySink`].

use crc::{Crc, CRC_16_IBM_SDLC};
use serde::{Deserialize, Serialize};

use crate::profile::ProfileOutput;

/// Consumer of encoded telemetry frames
pub trait TelemetrySink {
    /// Hand over one complete frame (COBS-encoded, sentinel included)
    fn send(&mut self, frame: &[u8]);
}

/// Sink that throws frames away (no console attached)
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn send(&mut self, _frame: &[u8]) {}
}

/// Decoded telemetry frame content
#[derive(Serialize, Deserialize, PartialEq, Clone, Copy)]
#[cfg_attr(test, derive(Debug))]
pub struct Frame {
    pub player: u8,
    pub buttons: u32,
    /// LX, LY, RX, RY, L2, R2 after the profile
    pub axes: [u8; 6],
}

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Serialized payload bound: postcard frame + CRC-16
const MAX_PAYLOAD: usize = 16;

/// Encoded frame bound: payload + COBS overhead + sentinel
pub const MAX_FRAME: usize = MAX_PAYLOAD + 2;

/// Encode one frame; `None` only if the payload would not fit
pub fn encode(frame: &Frame, buf: &mut [u8; MAX_FRAME]) -> Option<usize> {
    let mut payload = [0u8; MAX_PAYLOAD];
    let used = postcard::to_slice(frame, &mut payload[..MAX_PAYLOAD - 2])
        .ok()?
        .len();
    let crc = CRC16.checksum(&payload[..used]);
    payload[used..used + 2].copy_from_slice(&crc.to_le_bytes());

    let encoded = cobs::encode(&payload[..used + 2], buf);
    buf[encoded] = 0;
    Some(encoded + 1)
}

/// Decode and CRC-check one frame (sentinel optional)
pub fn decode(raw: &[u8]) -> Option<Frame> {
    let mut buf = [0u8; MAX_FRAME];
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    buf.get_mut(..raw.len())?.copy_from_slice(raw);
    let len = cobs::decode_in_place(&mut buf[..raw.len()]).ok()?;
    let (payload, crc) = buf[..len].split_at(len.checked_sub(2)?);
    if CRC16.checksum(payload) != u16::from_le_bytes([crc[0], crc[1]]) {
        return None;
    }
    postcard::from_bytes(payload).ok()
}

/// Mirror one post-profile result onto the sink
pub fn publish(sink: &mut dyn TelemetrySink, player: u8, out: &ProfileOutput) {
    let frame = Frame {
        player,
        buttons: out.buttons.0,
        axes: [out.lx, out.ly, out.rx, out.ry, out.l2, out.r2],
    };
    let mut buf = [0u8; MAX_FRAME];
    if let Some(len) = encode(&frame, &mut buf) {
        sink.send(&buf[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serialization_is_stable() {
        let frame = Frame {
            player: 1,
            buttons: 0x10,
            axes: [0x80, 0x80, 0x80, 0x80, 0, 0],
        };
        let mut payload = [0u8; MAX_PAYLOAD];
        let used = postcard::to_slice(&frame, &mut payload[..]).unwrap().len();
        // player, buttons varint, six axis bytes
        assert_eq!(
            &payload[..used],
            &[0x01, 0x10, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn encode_terminates_with_sentinel_and_decodes() {
        let frame = Frame {
            player: 0,
            buttons: 0x0003_0201,
            axes: [1, 2, 3, 4, 5, 6],
        };
        let mut buf = [0u8; MAX_FRAME];
        let len = encode(&frame, &mut buf).unwrap();
        assert_eq!(buf[len - 1], 0, "frame must end with the COBS sentinel");
        // COBS guarantees no zero bytes inside the frame
        assert!(buf[..len - 1].iter().all(|&b| b != 0));
        assert_eq!(decode(&buf[..len]), Some(frame));
    }

    #[test]
    fn corrupted_frame_is_rejected() {
        let frame = Frame {
            player: 2,
            buttons: 0,
            axes: [0x80; 6],
        };
        let mut buf = [0u8; MAX_FRAME];
        let len = encode(&frame, &mut buf).unwrap();
        buf[1] ^= 0x40;
        assert_eq!(decode(&buf[..len]), None);
    }
}
