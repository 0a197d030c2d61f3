//! Wire framing for the duplex audio socket.
//!
//! Every unit on the socket is `[tag][payload]`. The tag selects the logical
//! direction; the payload is raw S16LE PCM. There is no length field: the
//! payload of a unit is whatever a single read returned, minus the tag.

use bytes::{BufMut, Bytes, BytesMut};

/// Peer audio destined for the playback device.
pub const TAG_OUTPUT_TO_DEVICE: u8 = 0x01;
/// Audio captured from the input device, destined for the peer.
pub const TAG_INPUT_FROM_DEVICE: u8 = 0x02;

/// Default capacity of read and capture buffers, tag included.
pub const DEFAULT_BUFFER_SIZE: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    OutputToDevice,
    InputFromDevice,
}

impl Direction {
    pub fn tag(self) -> u8 {
        match self {
            Direction::OutputToDevice => TAG_OUTPUT_TO_DEVICE,
            Direction::InputFromDevice => TAG_INPUT_FROM_DEVICE,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_OUTPUT_TO_DEVICE => Some(Direction::OutputToDevice),
            TAG_INPUT_FROM_DEVICE => Some(Direction::InputFromDevice),
            _ => None,
        }
    }
}

/// One decoded unit, borrowing its payload from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub direction: Direction,
    pub payload: &'a [u8],
}

/// Prepend the direction tag to `payload`.
pub fn encode(direction: Direction, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(direction.tag());
    buf.put_slice(payload);
    buf.freeze()
}

/// Decode the first `n` bytes of `buffer` as one unit.
///
/// Returns `None` for units without payload (`n <= 1`), for unknown tags,
/// and when `n` runs past the end of `buffer`. Dropped units are noise, not
/// errors.
pub fn decode(buffer: &[u8], n: usize) -> Option<Frame<'_>> {
    if n <= 1 || n > buffer.len() {
        return None;
    }
    let direction = Direction::from_tag(buffer[0])?;
    Some(Frame {
        direction,
        payload: &buffer[1..n],
    })
}

/// A reusable buffer with the tag byte reserved at offset 0.
///
/// Devices fill [`payload_mut`](Self::payload_mut) in place, and
/// [`frame`](Self::frame) hands out tag + payload as one contiguous slice, so
/// nothing is copied between capture and the socket write.
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub const PAYLOAD_OFFSET: usize = 1;

    /// `capacity` includes the tag byte and must be at least 2.
    pub fn new(direction: Direction, capacity: usize) -> Self {
        let mut buf = vec![0u8; capacity.max(Self::PAYLOAD_OFFSET + 1)];
        buf[0] = direction.tag();
        Self { buf }
    }

    pub fn payload_capacity(&self) -> usize {
        self.buf.len() - Self::PAYLOAD_OFFSET
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[Self::PAYLOAD_OFFSET..]
    }

    /// Tag plus the first `payload_len` payload bytes (clamped to capacity).
    pub fn frame(&self, payload_len: usize) -> &[u8] {
        let len = payload_len.min(self.payload_capacity());
        &self.buf[..Self::PAYLOAD_OFFSET + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_frame_decodes_to_its_payload() {
        let payload = [0x10, 0x20, 0x30, 0x40];
        let unit = encode(Direction::OutputToDevice, &payload);
        assert_eq!(&unit[..], &[0x01, 0x10, 0x20, 0x30, 0x40]);

        let frame = decode(&unit, unit.len()).unwrap();
        assert_eq!(frame.direction, Direction::OutputToDevice);
        assert_eq!(frame.payload, &payload);
    }

    #[test]
    fn payload_lengths_survive_encode_decode() {
        for len in [1usize, 2, 3, 255, 4096, DEFAULT_BUFFER_SIZE - 1] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let unit = encode(Direction::OutputToDevice, &payload);
            let frame = decode(&unit, unit.len()).unwrap();
            assert_eq!(frame.payload.len(), len);
            assert_eq!(frame.payload, &payload[..]);
        }
    }

    #[test]
    fn empty_payload_is_dropped() {
        let unit = encode(Direction::OutputToDevice, &[]);
        assert_eq!(&unit[..], &[0x01]);
        assert_eq!(decode(&unit, unit.len()), None);
        assert_eq!(decode(&[], 0), None);
    }

    #[test]
    fn unknown_tags_are_dropped() {
        for tag in [0x00u8, 0x03, 0x7f, 0xff] {
            let buffer = [tag, 1, 2, 3];
            assert_eq!(decode(&buffer, buffer.len()), None);
        }
    }

    #[test]
    fn decode_uses_read_length_not_buffer_length() {
        let mut buffer = [0u8; 16];
        buffer[..3].copy_from_slice(&[0x02, 0xaa, 0xbb]);
        let frame = decode(&buffer, 3).unwrap();
        assert_eq!(frame.direction, Direction::InputFromDevice);
        assert_eq!(frame.payload, &[0xaa, 0xbb]);
        assert_eq!(decode(&buffer, 17), None);
    }

    #[test]
    fn frame_buffer_reserves_tag_byte() {
        let mut buf = FrameBuffer::new(Direction::InputFromDevice, 8);
        assert_eq!(buf.payload_capacity(), 7);
        buf.payload_mut()[..3].copy_from_slice(&[7, 8, 9]);
        assert_eq!(buf.frame(3), &[0x02, 7, 8, 9]);
        assert_eq!(buf.frame(100).len(), 8);
    }
}
