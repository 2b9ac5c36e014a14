use super::{Ack, Segment};

// Data segment layout:
//
//   [seq_len: 1][seq: seq_len bytes, big-endian][payload]
//
// seq_len is the minimal byte width of the sequence number; zero is a valid
// width and encodes sequence number 0. ACKs are a bare 4-byte big-endian
// integer; the request token is neither and is matched by exact content.

pub const SEQ_LEN_SIZE: usize = 1;
pub const SEQ_SIZE_MAX: usize = 4;
pub const SEGMENT_OVERHEAD_MAX: usize = SEQ_LEN_SIZE + SEQ_SIZE_MAX;
pub const ACK_SIZE: usize = 4;

/// Malformed or truncated input. The receiver treats this exactly like a
/// dropped datagram: no state mutation, recovery via retransmission.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodeError;

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed datagram")
    }
}

impl std::error::Error for DecodeError {}

fn seq_width(seq: u32) -> usize {
    ((32 - seq.leading_zeros() as usize) + 7) / 8
}

/// Encodes a segment into `buffer`, returning the encoded length.
///
/// The buffer must hold at least `SEGMENT_OVERHEAD_MAX + payload.len()`
/// bytes; callers size their tx buffer once from the configured MSS.
pub fn write_segment(buffer: &mut [u8], segment: &Segment) -> usize {
    let width = seq_width(segment.seq);
    let len = SEQ_LEN_SIZE + width + segment.payload.len();

    assert!(buffer.len() >= len, "tx buffer too small for segment");

    buffer[0] = width as u8;

    let seq_bytes = segment.seq.to_be_bytes();
    buffer[SEQ_LEN_SIZE..SEQ_LEN_SIZE + width].copy_from_slice(&seq_bytes[SEQ_SIZE_MAX - width..]);

    buffer[SEQ_LEN_SIZE + width..len].copy_from_slice(segment.payload);

    len
}

pub fn read_segment(buffer: &[u8]) -> Result<Segment, DecodeError> {
    if buffer.len() < SEQ_LEN_SIZE {
        return Err(DecodeError);
    }

    let width = buffer[0] as usize;

    if width > SEQ_SIZE_MAX || buffer.len() < SEQ_LEN_SIZE + width {
        return Err(DecodeError);
    }

    let mut seq_bytes = [0u8; SEQ_SIZE_MAX];
    seq_bytes[SEQ_SIZE_MAX - width..].copy_from_slice(&buffer[SEQ_LEN_SIZE..SEQ_LEN_SIZE + width]);

    Ok(Segment {
        seq: u32::from_be_bytes(seq_bytes),
        payload: &buffer[SEQ_LEN_SIZE + width..],
    })
}

pub fn write_ack(ack: Ack) -> [u8; ACK_SIZE] {
    ack.value.to_be_bytes()
}

/// An ACK is exactly four bytes; any other length is not an ACK.
pub fn read_ack(buffer: &[u8]) -> Result<Ack, DecodeError> {
    let bytes: [u8; ACK_SIZE] = buffer.try_into().map_err(|_| DecodeError)?;

    Ok(Ack {
        value: u32::from_be_bytes(bytes),
    })
}
