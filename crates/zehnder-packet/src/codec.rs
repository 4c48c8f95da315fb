//! Frame encoding and decoding.
//!
//! The codec is a straight byte mapping. It performs no semantic checks:
//! ttl and command legality are left to the protocol layer, so every field
//! survives a round trip unmodified.

use crate::{Command, DeviceType, Frame, PacketError, FRAME_SIZE, HEADER_SIZE, PAYLOAD_SIZE};

/// Encode a frame to its 16-byte wire format.
pub fn encode_frame(frame: &Frame) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];

    buf[0] = frame.dst_type.to_byte();
    buf[1] = frame.dst_id;
    buf[2] = frame.src_type.to_byte();
    buf[3] = frame.src_id;
    buf[4] = frame.ttl;
    buf[5] = frame.command.to_byte();
    buf[HEADER_SIZE..].copy_from_slice(&frame.payload);

    buf
}

/// Decode a frame from bytes.
///
/// Fails with [`PacketError::BadLength`] unless `data` is exactly
/// [`FRAME_SIZE`] bytes long.
pub fn decode_frame(data: &[u8]) -> Result<Frame, PacketError> {
    if data.len() != FRAME_SIZE {
        return Err(PacketError::bad_length(data.len()));
    }

    let mut payload = [0u8; PAYLOAD_SIZE];
    payload.copy_from_slice(&data[HEADER_SIZE..]);

    Ok(Frame {
        dst_type: DeviceType::from_byte(data[0]),
        dst_id: data[1],
        src_type: DeviceType::from_byte(data[2]),
        src_id: data[3],
        ttl: data[4],
        command: Command::from_byte(data[5]),
        payload,
    })
}
