//! Wire format.
//!
//! ```text
//! request header (1 byte):  bit 7 = 0 → push, bits 6..0 = payload length
//!                           bit 7 = 1 → pop,  bits 6..0 ignored
//! push body:                exactly `length` bytes
//! push response:            0x00
//! pop response:             len > 1 → [len, payload...]; len ≤ 1 → payload only
//! busy (admission refused): 0xFF, then close
//! ```

/// Acknowledgement byte for a successful push.
pub const PUSH_ACK: u8 = 0x00;

/// Sent instead of any exchange when admission is refused.
pub const BUSY: u8 = 0xFF;

/// Canonical pop request header.
pub const POP_HEADER: u8 = 0x80;

/// Largest payload a 7-bit length can describe.
pub const MAX_PAYLOAD_LEN: usize = 0x7F;

const POP_FLAG: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;

/// A decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Push { len: u8 },
    Pop,
}

impl Command {
    /// Decode a header byte. Every byte value is a valid command.
    pub fn decode(header: u8) -> Self {
        if header & POP_FLAG == 0 {
            Command::Push {
                len: header & LEN_MASK,
            }
        } else {
            Command::Pop
        }
    }

    pub fn encode(self) -> u8 {
        match self {
            Command::Push { len } => len & LEN_MASK,
            Command::Pop => POP_HEADER,
        }
    }

    /// Header for pushing `payload`, or `None` if it is too long.
    pub fn push_for(payload: &[u8]) -> Option<Self> {
        (payload.len() <= MAX_PAYLOAD_LEN).then(|| Command::Push {
            len: payload.len() as u8,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Push { .. } => "push",
            Command::Pop => "pop",
        }
    }
}

/// Frame a popped payload for the wire.
///
/// Payloads longer than one byte get a length prefix; zero- and one-byte
/// payloads are written bare.
pub fn encode_pop_response(payload: &[u8]) -> Vec<u8> {
    if payload.len() > 1 {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame
    } else {
        payload.to_vec()
    }
}

/// Decode a complete pop response (everything read before the server closed).
///
/// Returns `None` if a length prefix disagrees with the bytes that followed.
pub fn decode_pop_response(frame: &[u8]) -> Option<&[u8]> {
    match frame {
        [] | [_] => Some(frame),
        [len, payload @ ..] if *len as usize == payload.len() => Some(payload),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_bit_selects_command() {
        assert_eq!(Command::decode(0x00), Command::Push { len: 0 });
        assert_eq!(Command::decode(0x05), Command::Push { len: 5 });
        assert_eq!(Command::decode(0x7F), Command::Push { len: 127 });
        assert_eq!(Command::decode(0x80), Command::Pop);
        assert_eq!(Command::decode(0xFF), Command::Pop);
        assert_eq!(Command::decode(0x93), Command::Pop);
    }

    #[test]
    fn push_headers_never_set_the_high_bit() {
        for len in 0..=MAX_PAYLOAD_LEN {
            let header = Command::push_for(&vec![0; len]).unwrap().encode();
            assert_eq!(header & 0x80, 0);
            assert_eq!(Command::decode(header), Command::Push { len: len as u8 });
        }
        assert!(Command::push_for(&[0; 128]).is_none());
    }

    #[test]
    fn pop_framing_is_asymmetric() {
        assert_eq!(encode_pop_response(&[]), Vec::<u8>::new());
        assert_eq!(encode_pop_response(&[0x42]), vec![0x42]);
        assert_eq!(encode_pop_response(b"hi"), vec![2, b'h', b'i']);

        let long = vec![7u8; 127];
        let frame = encode_pop_response(&long);
        assert_eq!(frame.len(), 128);
        assert_eq!(frame[0], 127);
    }

    #[test]
    fn decode_pop_response_checks_prefix() {
        assert_eq!(decode_pop_response(&[]), Some(&[][..]));
        assert_eq!(decode_pop_response(&[9]), Some(&[9][..]));
        assert_eq!(decode_pop_response(&[2, 1, 2]), Some(&[1, 2][..]));
        assert_eq!(decode_pop_response(&[3, 1, 2]), None);
    }
}
