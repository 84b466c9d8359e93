//! # Frame Codec
//!
//! Serialization of a `(topic, payload)` pair into the bridge's wire frame:
//!
//! ```text
//! @<topic>@<payload length in decimal ASCII>@<payload bytes>
//! ```
//!
//! The payload is never escaped. It may contain `@` freely because the decimal length,
//! not a delimiter scan, bounds it. The topic cannot contain `@` (see [`crate::topic`]),
//! so the first two markers after the leading one are always unambiguous.
//!
//! Decoding is a bounded manual scan that borrows topic and payload from the input
//! buffer. Bytes after the declared payload are ignored, so a transport that pads or
//! concatenates buffers does not break framing.

use crate::error::{DecodeError, EncodeError};
use crate::topic::Topic;

/// The byte that opens a frame and closes the topic and length fields.
pub const FIELD_MARKER: u8 = b'@';

/// Default upper bound on an inbound frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

const MARKER: &[u8] = &[FIELD_MARKER];

/// Digits needed to print `usize::MAX` on a 64-bit target.
const MAX_LENGTH_DIGITS: usize = 20;

/// A decoded frame, borrowing from the buffer it was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame<'a> {
    pub topic: Topic<'a>,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(topic: Topic<'a>, payload: &'a [u8]) -> Self {
        Self { topic, payload }
    }

    /// Number of bytes [`Frame::encode`] will write.
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.topic, self.payload)
    }

    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        encode(&self.topic, self.payload, buf)
    }
}

/// Encoder/decoder carrying the inbound size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub const fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode `topic` and `payload` into `buf`. See [`encode`].
    pub fn encode(
        &self,
        topic: &Topic<'_>,
        payload: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, EncodeError> {
        encode(topic, payload, buf)
    }

    /// Decode a raw inbound buffer.
    ///
    /// Checks run in a fixed order: leading marker, size limit, topic delimiter,
    /// length delimiter, length digits, payload availability, and finally the topic
    /// grammar. The first failing check determines the error.
    pub fn decode<'a>(&self, raw: &'a [u8]) -> Result<Frame<'a>, DecodeError> {
        if raw.first() != Some(&FIELD_MARKER) {
            return Err(DecodeError::EmptyOrMalformed);
        }
        if raw.len() > self.max_frame_size {
            return Err(DecodeError::TooLarge {
                max_size: self.max_frame_size,
                actual_size: raw.len(),
            });
        }

        let topic_end = find_marker(raw, 1).ok_or(DecodeError::MissingTopicDelimiter)?;
        let length_start = topic_end + 1;
        let length_end =
            find_marker(raw, length_start).ok_or(DecodeError::MissingLengthDelimiter)?;
        let declared =
            parse_decimal(&raw[length_start..length_end]).ok_or(DecodeError::InvalidLength)?;

        let payload_start = length_end + 1;
        let available = raw.len() - payload_start;
        if available < declared {
            return Err(DecodeError::TruncatedPayload {
                declared,
                available,
            });
        }
        let payload = &raw[payload_start..payload_start + declared];

        let topic = Topic::from_bytes(&raw[1..topic_end]).map_err(DecodeError::InvalidTopic)?;

        Ok(Frame { topic, payload })
    }
}

/// Number of bytes needed to encode `topic` and `payload`.
pub fn encoded_len(topic: &Topic<'_>, payload: &[u8]) -> usize {
    let mut digits = [0u8; MAX_LENGTH_DIGITS];
    3 + topic.as_str().len() + write_decimal(payload.len(), &mut digits).len() + payload.len()
}

/// Write `@topic@len@payload` into `buf`, returning the number of bytes written.
///
/// Fails only if `buf` is too small; nothing useful is left in `buf` in that case.
pub fn encode(topic: &Topic<'_>, payload: &[u8], buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut digits = [0u8; MAX_LENGTH_DIGITS];
    let length = write_decimal(payload.len(), &mut digits);
    let topic = topic.as_str().as_bytes();

    let required = 3 + topic.len() + length.len() + payload.len();
    let available = buf.len();
    let out = buf
        .get_mut(..required)
        .ok_or(EncodeError::BufferTooSmall {
            required,
            available,
        })?;

    let mut cursor = 0;
    for field in [MARKER, topic, MARKER, length, MARKER, payload] {
        out[cursor..cursor + field.len()].copy_from_slice(field);
        cursor += field.len();
    }

    Ok(cursor)
}

/// Encode into a `heapless::Vec` of capacity `N`.
pub fn encode_to_vec<const N: usize>(
    topic: &Topic<'_>,
    payload: &[u8],
) -> Result<heapless::Vec<u8, N>, EncodeError> {
    let mut frame = heapless::Vec::new();
    let required = encoded_len(topic, payload);
    frame
        .resize_default(required)
        .map_err(|_| EncodeError::BufferTooSmall {
            required,
            available: N,
        })?;
    encode(topic, payload, &mut frame)?;
    Ok(frame)
}

fn find_marker(raw: &[u8], from: usize) -> Option<usize> {
    raw.get(from..)?
        .iter()
        .position(|&b| b == FIELD_MARKER)
        .map(|offset| from + offset)
}

fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0usize, |value, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        value.checked_mul(10)?.checked_add((b - b'0') as usize)
    })
}

fn write_decimal(mut value: usize, out: &mut [u8; MAX_LENGTH_DIGITS]) -> &[u8] {
    let mut start = out.len();
    loop {
        start -= 1;
        out[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &out[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TopicError;
    use crate::topic::MAX_TOPIC_LEN;

    fn topic(name: &str) -> Topic<'_> {
        Topic::new(name).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let mut buf = [0u8; 32];
        let n = encode(&topic("a/b"), b"hello", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"@a/b@5@hello");
        assert_eq!(encoded_len(&topic("a/b"), b"hello"), n);
    }

    #[test]
    fn test_encode_empty_payload() {
        let mut buf = [0u8; 8];
        let n = encode(&topic("t"), b"", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"@t@0@");
    }

    #[test]
    fn test_encode_multi_digit_length() {
        let payload = [b'x'; 123];
        let frame: heapless::Vec<u8, 256> = encode_to_vec(&topic("big"), &payload).unwrap();
        assert_eq!(&frame[..9], b"@big@123@");
        assert_eq!(frame.len(), 9 + 123);
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let mut buf = [0u8; 11];
        assert_eq!(
            encode(&topic("a/b"), b"hello", &mut buf),
            Err(EncodeError::BufferTooSmall {
                required: 12,
                available: 11
            })
        );
        assert_eq!(
            encode_to_vec::<4>(&topic("a"), b"xy"),
            Err(EncodeError::BufferTooSmall {
                required: 7,
                available: 4
            })
        );
    }

    #[test]
    fn test_round_trip() {
        let codec = FrameCodec::default();
        let cases: [(&str, &[u8]); 5] = [
            ("a/b", b"hello"),
            ("sensors/room-1/temp_c", b"21.5"),
            ("t", b""),
            ("at/payload", b"@@@"),
            ("bin", &[0, 255, b'@', b'1', b'@', 0]),
        ];
        for (name, payload) in cases {
            let mut buf = [0u8; 64];
            let n = encode(&topic(name), payload, &mut buf).unwrap();
            let frame = codec.decode(&buf[..n]).unwrap();
            assert_eq!(frame.topic.as_str(), name);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_round_trip_generated_payloads() {
        const ALPHABET: &[u8] = b"@0123456789@a/\0\xff";
        let codec = FrameCodec::default();
        let longest = [b'z'; MAX_TOPIC_LEN];
        let names = [
            "a",
            "a//b",
            "/leading",
            "trailing/",
            "9/8/7",
            core::str::from_utf8(&longest).unwrap(),
        ];

        let mut seed: u32 = 0x2545_f491;
        let mut payload = [0u8; 300];
        for name in names {
            for len in [0, 1, 2, 9, 10, 99, 100, 255, 300] {
                for byte in payload[..len].iter_mut() {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    *byte = ALPHABET[(seed >> 16) as usize % ALPHABET.len()];
                }
                let payload = &payload[..len];

                let mut buf = [0u8; 512];
                let n = encode(&topic(name), payload, &mut buf).unwrap();
                assert_eq!(n, encoded_len(&topic(name), payload));

                let frame = codec.decode(&buf[..n]).unwrap();
                assert_eq!(frame.topic.as_str(), name);
                assert_eq!(frame.payload, payload);
            }
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let frame = FrameCodec::default().decode(b"@a/b@5@helloEXTRA@").unwrap();
        assert_eq!(frame, Frame::new(topic("a/b"), b"hello"));
    }

    #[test]
    fn test_decode_rejects_missing_leading_marker() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(b""), Err(DecodeError::EmptyOrMalformed));
        assert_eq!(codec.decode(b"a/b@5@hello"), Err(DecodeError::EmptyOrMalformed));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let codec = FrameCodec::new(8);
        assert_eq!(
            codec.decode(b"@a/b@5@hello"),
            Err(DecodeError::TooLarge {
                max_size: 8,
                actual_size: 12
            })
        );
    }

    #[test]
    fn test_decode_rejects_missing_delimiters() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(b"@a/b"), Err(DecodeError::MissingTopicDelimiter));
        assert_eq!(codec.decode(b"@"), Err(DecodeError::MissingTopicDelimiter));
        assert_eq!(
            codec.decode(b"@a/b@5hello"),
            Err(DecodeError::MissingLengthDelimiter)
        );
        assert_eq!(codec.decode(b"@a/b@"), Err(DecodeError::MissingLengthDelimiter));
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(b"@a@x@hello"), Err(DecodeError::InvalidLength));
        assert_eq!(codec.decode(b"@a@@hello"), Err(DecodeError::InvalidLength));
        assert_eq!(codec.decode(b"@a@-1@hello"), Err(DecodeError::InvalidLength));
        assert_eq!(
            codec.decode(b"@a@99999999999999999999999@x"),
            Err(DecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        assert_eq!(
            FrameCodec::default().decode(b"@a/b@10@hello"),
            Err(DecodeError::TruncatedPayload {
                declared: 10,
                available: 5
            })
        );
    }

    #[test]
    fn test_decode_rejects_invalid_topic() {
        let codec = FrameCodec::default();
        assert_eq!(
            codec.decode(b"@@5@hello"),
            Err(DecodeError::InvalidTopic(TopicError::Empty))
        );
        assert_eq!(
            codec.decode(b"@a b@5@hello"),
            Err(DecodeError::InvalidTopic(TopicError::InvalidCharacter {
                position: 1
            }))
        );
        assert_eq!(
            codec.decode(b"@a/+@5@hello"),
            Err(DecodeError::InvalidTopic(TopicError::InvalidCharacter {
                position: 2
            }))
        );
    }
}
