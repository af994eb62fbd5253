//! Payload codec: field-by-field binary encoding of [`Message`].
//!
//! # Payload layout
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8, byte fields are a `u32` length followed by raw bytes, and string
//! lists are a `u32` count followed by that many strings.
//!
//! ```text
//! [1 byte: FORMAT_VERSION][1 byte: tag][body]
//!
//! tag 1  ListRequest    path:str
//! tag 2  ListResponse   directories:list<str> files:list<str>
//! tag 3  GetRequest     path:str
//! tag 4  GetHeader      path:str size:u64
//! tag 5  GetData        bytes
//! tag 6  ErrorResponse  kind:u8 detail:str
//! ```

use crate::FORMAT_VERSION;
use crate::message::{ErrorKind, Message};

const TAG_LIST_REQUEST: u8 = 1;
const TAG_LIST_RESPONSE: u8 = 2;
const TAG_GET_REQUEST: u8 = 3;
const TAG_GET_HEADER: u8 = 4;
const TAG_GET_DATA: u8 = 5;
const TAG_ERROR: u8 = 6;

/// Errors from encoding or decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("unknown error kind {0}")]
    UnknownErrorKind(u8),

    #[error("payload truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(String),

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    #[error("field too long: {0} bytes")]
    FieldTooLong(usize),
}

/// Serializes a message into a payload (without the frame length prefix).
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(encoded_len_hint(message));
    out.push(FORMAT_VERSION);

    match message {
        Message::ListRequest { path } => {
            out.push(TAG_LIST_REQUEST);
            put_str(&mut out, path)?;
        }
        Message::ListResponse { directories, files } => {
            out.push(TAG_LIST_RESPONSE);
            put_str_list(&mut out, directories)?;
            put_str_list(&mut out, files)?;
        }
        Message::GetRequest { path } => {
            out.push(TAG_GET_REQUEST);
            put_str(&mut out, path)?;
        }
        Message::GetHeader { path, size } => {
            out.push(TAG_GET_HEADER);
            put_str(&mut out, path)?;
            out.extend_from_slice(&size.to_be_bytes());
        }
        Message::GetData { bytes } => {
            out.push(TAG_GET_DATA);
            put_bytes(&mut out, bytes)?;
        }
        Message::Error { kind, detail } => {
            out.push(TAG_ERROR);
            out.push(kind.code());
            put_str(&mut out, detail)?;
        }
    }

    Ok(out)
}

/// Parses a payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<Message, CodecError> {
    let mut r = Reader::new(payload);

    let version = r.u8().map_err(|_| CodecError::Empty)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let message = match r.u8()? {
        TAG_LIST_REQUEST => Message::ListRequest { path: r.string()? },
        TAG_LIST_RESPONSE => Message::ListResponse {
            directories: r.string_list()?,
            files: r.string_list()?,
        },
        TAG_GET_REQUEST => Message::GetRequest { path: r.string()? },
        TAG_GET_HEADER => Message::GetHeader {
            path: r.string()?,
            size: r.u64()?,
        },
        TAG_GET_DATA => Message::GetData {
            bytes: r.bytes()?.to_vec(),
        },
        TAG_ERROR => {
            let code = r.u8()?;
            let kind = ErrorKind::from_code(code).ok_or(CodecError::UnknownErrorKind(code))?;
            Message::Error {
                kind,
                detail: r.string()?,
            }
        }
        other => return Err(CodecError::UnknownTag(other)),
    };

    match r.remaining() {
        0 => Ok(message),
        n => Err(CodecError::TrailingBytes(n)),
    }
}

fn encoded_len_hint(message: &Message) -> usize {
    2 + match message {
        Message::ListRequest { path } | Message::GetRequest { path } => 4 + path.len(),
        Message::ListResponse { directories, files } => {
            8 + directories
                .iter()
                .chain(files.iter())
                .map(|s| 4 + s.len())
                .sum::<usize>()
        }
        Message::GetHeader { path, .. } => 12 + path.len(),
        Message::GetData { bytes } => 4 + bytes.len(),
        Message::Error { detail, .. } => 5 + detail.len(),
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    let len32 = u32::try_from(len).map_err(|_| CodecError::FieldTooLong(len))?;
    out.extend_from_slice(&len32.to_be_bytes());
    Ok(())
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CodecError> {
    put_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    put_bytes(out, s.as_bytes())
}

fn put_str_list(out: &mut Vec<u8>, items: &[String]) -> Result<(), CodecError> {
    put_len(out, items.len())?;
    for item in items {
        put_str(out, item)?;
    }
    Ok(())
}

/// Bounds-checked cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
    }

    fn string_list(&mut self) -> Result<Vec<String>, CodecError> {
        let count = self.u32()? as usize;
        // Every entry needs at least its 4-byte length, so a count the
        // remaining payload cannot hold is rejected before allocating.
        if count > self.remaining() / 4 {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: count.saturating_mul(4),
            });
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.string()?);
        }
        Ok(items)
    }
}
