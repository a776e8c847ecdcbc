use crate::error::{AsarError, Result};
use std::io::Read;

/// Size of the leading size pickle in bytes
pub const SIZE_PICKLE_LENGTH: usize = 8;

/// Pickle values are padded to this alignment
pub const PICKLE_ALIGNMENT: usize = 4;

/// Size of a pickle's payload-length prefix
const PICKLE_HEADER_SIZE: usize = 4;

/// Round `size` up to the next multiple of [`PICKLE_ALIGNMENT`]
pub fn align_int(size: usize) -> usize {
    size + (PICKLE_ALIGNMENT - size % PICKLE_ALIGNMENT) % PICKLE_ALIGNMENT
}

/// Header decoded from the two nested pickles at the start of an archive
#[derive(Debug, Clone)]
pub struct RawHeader {
    /// JSON text describing the directory tree
    pub json: String,
    /// Declared size of the header pickle
    pub header_size: u32,
    /// Absolute offset of the payload region
    pub payload_offset: usize,
}

impl RawHeader {
    /// Decode the header envelopes from the start of an archive buffer
    ///
    /// ```text
    /// [u32 4][u32 N] [u32 P][i32 L][L bytes JSON][pad]  [payload ...]
    ///  size pickle    header pickle (N bytes)           ^ 8 + N
    /// ```
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < SIZE_PICKLE_LENGTH {
            return Err(AsarError::TruncatedArchive(format!(
                "archive is {} bytes, size header needs {}",
                buffer.len(),
                SIZE_PICKLE_LENGTH
            )));
        }

        let mut size_pickle = Pickle::new(&buffer[..SIZE_PICKLE_LENGTH])?;
        let header_size = size_pickle.read_u32()?;

        let header_end = SIZE_PICKLE_LENGTH
            .checked_add(header_size as usize)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                AsarError::TruncatedArchive(format!(
                    "header declares {} bytes, only {} available",
                    header_size,
                    buffer.len() - SIZE_PICKLE_LENGTH
                ))
            })?;

        let mut header_pickle = Pickle::new(&buffer[SIZE_PICKLE_LENGTH..header_end])?;
        let json = header_pickle.read_string()?;

        Ok(Self {
            json,
            header_size,
            payload_offset: header_end,
        })
    }
}

/// Read cursor over a Chromium-style pickle
///
/// A pickle is a `u32` payload length followed by the payload. Every value
/// read from the payload advances the cursor by its aligned size, clamped to
/// the end of the payload.
#[derive(Debug)]
pub struct Pickle<'a> {
    payload: &'a [u8],
    read_index: usize,
}

impl<'a> Pickle<'a> {
    /// Wrap a buffer holding exactly one pickle
    pub fn new(buffer: &'a [u8]) -> Result<Self> {
        let payload_size = read_u32(buffer).map_err(|_| {
            AsarError::TruncatedArchive(format!(
                "pickle of {} bytes has no length prefix",
                buffer.len()
            ))
        })? as usize;

        let available = buffer.len() - PICKLE_HEADER_SIZE;
        if payload_size > available {
            return Err(AsarError::TruncatedArchive(format!(
                "pickle declares {} payload bytes, only {} available",
                payload_size, available
            )));
        }

        Ok(Self {
            payload: &buffer[PICKLE_HEADER_SIZE..PICKLE_HEADER_SIZE + payload_size],
            read_index: 0,
        })
    }

    /// Bytes left in the payload
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.read_index
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        read_u32(bytes).map_err(|e| AsarError::TruncatedArchive(e.to_string()))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        read_i32(bytes).map_err(|e| AsarError::TruncatedArchive(e.to_string()))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_i32()?;
        let length = usize::try_from(length).map_err(|_| {
            AsarError::MalformedHeader(format!("negative string length {}", length))
        })?;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AsarError::MalformedHeader(format!("header is not UTF-8: {}", e)))
    }

    fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            let remaining = self.remaining();
            self.read_index = self.payload.len();
            return Err(AsarError::TruncatedArchive(format!(
                "failed to read {} bytes, {} remaining in pickle",
                length, remaining
            )));
        }
        let payload = self.payload;
        let start = self.read_index;
        self.advance(length);
        Ok(&payload[start..start + length])
    }

    fn advance(&mut self, size: usize) {
        let aligned = align_int(size);
        if self.remaining() < aligned {
            self.read_index = self.payload.len();
        } else {
            self.read_index += aligned;
        }
    }
}

// Helper functions for reading primitive types
fn read_u32<R: Read>(mut reader: R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: R) -> std::io::Result<i32> {
    read_u32(reader).map(|value| value as i32)
}
