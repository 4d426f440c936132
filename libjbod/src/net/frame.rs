//! Wire frames. Every multi-byte field is big-endian.
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 2    | length: 8, or 264 with a block payload  |
//! | 2      | 4    | opcode                                  |
//! | 6      | 2    | return code (0 in requests)             |
//! | 8      | 256  | block payload, only when length is 264  |

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, Block};
use crate::opcode::{Command, Opcode};

pub const HEADER_LEN: usize = 8;
pub const PAYLOAD_FRAME_LEN: usize = HEADER_LEN + BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u16,
    pub opcode: Opcode,
    pub return_code: u16,
}

impl Header {
    /// Decode and validate a frame header.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        let mut cur = &raw[..];
        let length = cur.get_u16();
        let opcode = Opcode::from_raw(cur.get_u32());
        let return_code = cur.get_u16();
        if length as usize != HEADER_LEN && length as usize != PAYLOAD_FRAME_LEN {
            return Err(JbodError::MalformedFrame(format!(
                "length field {length} is neither {HEADER_LEN} nor {PAYLOAD_FRAME_LEN}"
            )));
        }
        Ok(Self {
            length,
            opcode,
            return_code,
        })
    }

    pub fn has_payload(&self) -> bool {
        self.length as usize == PAYLOAD_FRAME_LEN
    }
}

fn encode_frame(opcode: Opcode, return_code: u16, payload: Option<&Block>) -> BytesMut {
    let length = if payload.is_some() {
        PAYLOAD_FRAME_LEN
    } else {
        HEADER_LEN
    };
    let mut buf = BytesMut::with_capacity(length);
    buf.put_u16(length as u16);
    buf.put_u32(opcode.raw());
    buf.put_u16(return_code);
    if let Some(block) = payload {
        buf.put_slice(block);
    }
    buf
}

/// Build a request frame. Write-block requests must carry a payload; every
/// other request is header-only and any payload passed in is ignored.
pub fn encode_request(opcode: Opcode, payload: Option<&Block>) -> Result<BytesMut> {
    if opcode.command() == Some(Command::WriteBlock) {
        let block = payload.ok_or(JbodError::MissingPayload)?;
        Ok(encode_frame(opcode, 0, Some(block)))
    } else {
        Ok(encode_frame(opcode, 0, None))
    }
}

/// Build a response frame, as the server side sends it.
pub fn encode_response(opcode: Opcode, return_code: u16, payload: Option<&Block>) -> BytesMut {
    encode_frame(opcode, return_code, payload)
}
