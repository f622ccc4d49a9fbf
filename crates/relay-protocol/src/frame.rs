//! RFC 6455 text-frame codec.
//!
//! The relay handles short, single-frame, non-fragmented text messages
//! only: one socket read is assumed to carry exactly one frame, and the
//! payload runs from the header's payload offset to the end of the
//! buffer. Deployed peers rely on that buffer-tail behavior, so the
//! declared length is parsed and validated but never used to slice the
//! payload.

use thiserror::Error;

/// First byte of every server-sent frame: FIN + text opcode.
const FIN_TEXT: u8 = 0x81;

/// Largest payload length encodable in the header byte itself.
const MAX_LITERAL_LEN: usize = 125;

/// Length-class selector for a 16-bit extended length.
const SELECTOR_U16: u8 = 126;

/// Length-class selector for a 64-bit extended length.
const SELECTOR_U64: u8 = 127;

/// Frame opcodes defined by RFC 6455 §5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Decodes the low nibble of the first header byte.
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

/// How the payload length was encoded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// Length ≤ 125, stored directly in the selector bits
    Literal,
    /// Selector 126, big-endian u16 follows
    Extended16,
    /// Selector 127, big-endian u64 follows
    Extended64,
}

/// Parsed frame header with explicit offsets for each length class.
///
/// Mask key offsets per class: literal at byte 2, 16-bit at byte 4,
/// 64-bit at byte 10; payload starts 4 bytes after the mask key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub length_class: LengthClass,
    pub declared_len: u64,
    pub mask_key: Option<[u8; 4]>,
    pub payload_offset: usize,
}

impl FrameHeader {
    /// Parses a frame header from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let [first, second] = match buf {
            [first, second, ..] => [*first, *second],
            _ => {
                return Err(FrameError::Truncated {
                    needed: 2,
                    got: buf.len(),
                })
            }
        };

        let fin = first & 0x80 != 0;
        let opcode =
            Opcode::from_bits(first & 0x0F).ok_or(FrameError::ReservedOpcode(first & 0x0F))?;
        let masked = second & 0x80 != 0;
        let selector = second & 0x7F;

        let (length_class, declared_len, mask_offset) = match selector {
            SELECTOR_U16 => {
                let len = read_u16(buf, 2)? as u64;
                (LengthClass::Extended16, len, 4)
            }
            SELECTOR_U64 => {
                let len = read_u64(buf, 2)?;
                (LengthClass::Extended64, len, 10)
            }
            literal => (LengthClass::Literal, literal as u64, 2),
        };

        let (mask_key, payload_offset) = if masked {
            (Some(read_mask(buf, mask_offset)?), mask_offset + 4)
        } else {
            (None, mask_offset)
        };

        Ok(Self {
            fin,
            opcode,
            masked,
            length_class,
            declared_len,
            mask_key,
            payload_offset,
        })
    }
}

/// XORs `payload` in place with the 4-byte mask key.
///
/// Masking is an involution: applying the same key twice restores the
/// original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Decodes a client-masked text frame into its payload string.
///
/// The payload is everything after the header, unmasked and validated
/// as UTF-8. Frames must carry the mask bit (client-to-server frames
/// are always masked) and a text opcode.
pub fn unseal(buf: &[u8]) -> Result<String, FrameError> {
    let header = FrameHeader::parse(buf)?;

    if header.opcode != Opcode::Text {
        return Err(FrameError::NotText(header.opcode));
    }
    let key = header.mask_key.ok_or(FrameError::Unmasked)?;

    let mut payload = buf
        .get(header.payload_offset..)
        .ok_or(FrameError::Truncated {
            needed: header.payload_offset,
            got: buf.len(),
        })?
        .to_vec();
    apply_mask(&mut payload, key);

    String::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)
}

/// Encodes `text` as a single unmasked server frame.
///
/// Servers never mask. The length encoding is chosen exactly at the
/// 125/126 and 65535/65536 boundaries; the 64-bit class writes two
/// 32-bit big-endian words with the high word forced to zero, which
/// caps practical payloads at a 32-bit length.
pub fn seal(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FIN_TEXT);

    match payload.len() {
        len if len <= MAX_LITERAL_LEN => {
            frame.push(len as u8);
        }
        len if len < 65_536 => {
            frame.push(SELECTOR_U16);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(SELECTOR_U64);
            frame.extend_from_slice(&[0, 0, 0, 0]);
            frame.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    frame.extend_from_slice(payload);
    frame
}

/// Encodes `text` as a client frame masked with `key`.
///
/// Counterpart of [`unseal`] for client implementations and tests.
pub fn seal_masked(text: &str, key: [u8; 4]) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut frame = Vec::with_capacity(payload.len() + 18);
    frame.push(FIN_TEXT);

    match payload.len() {
        len if len <= MAX_LITERAL_LEN => {
            frame.push(0x80 | len as u8);
        }
        len if len < 65_536 => {
            frame.push(0x80 | SELECTOR_U16);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(0x80 | SELECTOR_U64);
            frame.extend_from_slice(&[0, 0, 0, 0]);
            frame.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    frame.extend_from_slice(&key);
    let start = frame.len();
    frame.extend_from_slice(payload);
    if let Some(masked) = frame.get_mut(start..) {
        apply_mask(masked, key);
    }
    frame
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, FrameError> {
    match buf.get(offset..offset + 2) {
        Some([a, b]) => Ok(u16::from_be_bytes([*a, *b])),
        _ => Err(FrameError::Truncated {
            needed: offset + 2,
            got: buf.len(),
        }),
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, FrameError> {
    match buf.get(offset..offset + 8) {
        Some(&[a, b, c, d, e, f, g, h]) => Ok(u64::from_be_bytes([a, b, c, d, e, f, g, h])),
        _ => Err(FrameError::Truncated {
            needed: offset + 8,
            got: buf.len(),
        }),
    }
}

fn read_mask(buf: &[u8], offset: usize) -> Result<[u8; 4], FrameError> {
    match buf.get(offset..offset + 4) {
        Some(&[a, b, c, d]) => Ok([a, b, c, d]),
        _ => Err(FrameError::Truncated {
            needed: offset + 4,
            got: buf.len(),
        }),
    }
}

/// Errors that can occur while decoding a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer ends before the header (or mask key) is complete
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// Opcode nibble is one of the RFC 6455 reserved values
    #[error("reserved opcode {0:#x}")]
    ReservedOpcode(u8),

    /// Frame carries a non-text opcode
    #[error("expected a text frame, got {0:?}")]
    NotText(Opcode),

    /// Client frame without the mask bit
    #[error("client frame is not masked")]
    Unmasked,

    /// Unmasked payload is not valid UTF-8
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}
