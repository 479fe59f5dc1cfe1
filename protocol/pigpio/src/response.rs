//! Response framing.

use crate::ParseError;

/// Length of a response frame: 12 opaque bytes plus the `i32` result.
pub const RESPONSE_LEN: usize = 16;

/// A daemon response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    result: i32,
}

impl Response {
    pub fn new(result: i32) -> Self {
        Self { result }
    }

    /// Parse a response from the buffer.
    ///
    /// Returns the parsed response and number of bytes consumed. The first
    /// 12 bytes echo the request and are ignored.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        if data.len() < RESPONSE_LEN {
            return Err(ParseError::Incomplete);
        }
        let result = i32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        Ok((Response { result }, RESPONSE_LEN))
    }

    /// Encode the response into the buffer with zeroed reserved bytes.
    ///
    /// Returns the number of bytes written.
    pub fn encode(self, buf: &mut [u8]) -> usize {
        buf[..12].fill(0);
        buf[12..RESPONSE_LEN].copy_from_slice(&self.result.to_le_bytes());
        RESPONSE_LEN
    }

    /// The signed result word.
    pub fn result(self) -> i32 {
        self.result
    }
}
