//! Request framing.

use bytes::BufMut;

/// Length of the fixed request header: `cmd, p1, p2, p3` as little-endian `u32`.
pub const HEADER_LEN: usize = 16;

/// Errors raised while framing a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A text extent holds a character that does not fit in one byte.
    #[error("text extent character {ch:?} at index {index} is outside Latin-1")]
    NotLatin1 { ch: char, index: usize },
    /// The extents do not fit in the 32-bit `p3` length field.
    #[error("extents total {0} bytes, exceeding the u32 length field")]
    TooLong(usize),
}

/// A trailing data block appended to an extended request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent<'a> {
    /// Text sent one byte per character.
    Text(&'a str),
    /// Raw bytes sent verbatim.
    Binary(&'a [u8]),
}

impl Extent<'_> {
    /// Number of bytes this extent occupies on the wire.
    ///
    /// Fails if a text extent contains a character above U+00FF.
    pub fn encoded_len(&self) -> Result<usize, EncodeError> {
        match self {
            Extent::Binary(data) => Ok(data.len()),
            Extent::Text(text) => {
                let mut len = 0;
                for (index, ch) in text.chars().enumerate() {
                    if u32::from(ch) > 0xff {
                        return Err(EncodeError::NotLatin1 { ch, index });
                    }
                    len += 1;
                }
                Ok(len)
            }
        }
    }

    fn put(&self, buf: &mut impl BufMut) {
        match self {
            Extent::Binary(data) => buf.put_slice(data),
            // Validated by `encoded_len` before anything is written.
            Extent::Text(text) => {
                for ch in text.chars() {
                    buf.put_u8(u32::from(ch) as u8);
                }
            }
        }
    }
}

impl<'a> From<&'a [u8]> for Extent<'a> {
    fn from(data: &'a [u8]) -> Self {
        Extent::Binary(data)
    }
}

impl<'a> From<&'a str> for Extent<'a> {
    fn from(text: &'a str) -> Self {
        Extent::Text(text)
    }
}

/// A command request, optionally carrying extents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    cmd: u32,
    p1: u32,
    p2: u32,
    extents: Vec<Extent<'a>>,
}

impl<'a> Request<'a> {
    /// Create a fixed-size request.
    pub fn new(cmd: impl Into<u32>, p1: u32, p2: u32) -> Self {
        Self {
            cmd: cmd.into(),
            p1,
            p2,
            extents: Vec::new(),
        }
    }

    /// Append one extent.
    pub fn extent(mut self, extent: Extent<'a>) -> Self {
        self.extents.push(extent);
        self
    }

    /// Append extents in order.
    pub fn extents(mut self, extents: impl IntoIterator<Item = Extent<'a>>) -> Self {
        self.extents.extend(extents);
        self
    }

    pub fn cmd(&self) -> u32 {
        self.cmd
    }

    /// Total extent length, sent as `p3`.
    pub fn p3(&self) -> Result<u32, EncodeError> {
        let mut total = 0usize;
        for extent in &self.extents {
            total += extent.encoded_len()?;
        }
        u32::try_from(total).map_err(|_| EncodeError::TooLong(total))
    }

    /// Returns the encoded length of this request.
    pub fn encoded_len(&self) -> Result<usize, EncodeError> {
        Ok(HEADER_LEN + self.p3()? as usize)
    }

    /// Encode the header followed by every extent into `buf`.
    ///
    /// Returns the number of bytes written. Nothing is written on error.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<usize, EncodeError> {
        let p3 = self.p3()?;
        buf.put_u32_le(self.cmd);
        buf.put_u32_le(self.p1);
        buf.put_u32_le(self.p2);
        buf.put_u32_le(p3);
        for extent in &self.extents {
            extent.put(buf);
        }
        Ok(HEADER_LEN + p3 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    #[test]
    fn test_encode_fixed() {
        let mut buf = Vec::new();
        let len = Request::new(Opcode::Write, 17, 1).encode(&mut buf).unwrap();
        assert_eq!(len, 16);
        assert_eq!(
            buf,
            [4, 0, 0, 0, 17, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_encode_raw_cmd() {
        let mut buf = Vec::new();
        Request::new(0xdead_beefu32, u32::MAX, 0x0102_0304)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(&buf[0..4], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(&buf[4..8], &[0xff; 4]);
        assert_eq!(&buf[8..12], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_extents_follow_header_in_order() {
        let params = 10u32.to_le_bytes();
        let req = Request::new(Opcode::Wvas, 4, 300)
            .extent(Extent::Binary(&params))
            .extent(Extent::Text("hi"))
            .extent(Extent::Binary(&[]));
        assert_eq!(req.p3().unwrap(), 6);

        let mut buf = Vec::new();
        let len = req.encode(&mut buf).unwrap();
        assert_eq!(len, 22);
        assert_eq!(&buf[12..16], &6u32.to_le_bytes());
        assert_eq!(&buf[16..], &[10, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_text_extent_latin1() {
        let mut buf = Vec::new();
        Request::new(Opcode::Proc, 0, 0)
            .extent(Extent::Text("café"))
            .encode(&mut buf)
            .unwrap();
        // One byte per character, not UTF-8.
        assert_eq!(&buf[12..16], &4u32.to_le_bytes());
        assert_eq!(&buf[16..], &[b'c', b'a', b'f', 0xe9]);
    }

    #[test]
    fn test_text_extent_rejects_wide_chars() {
        let mut buf = Vec::new();
        let err = Request::new(Opcode::Proc, 0, 0)
            .extent(Extent::Binary(b"ok"))
            .extent(Extent::Text("a€"))
            .encode(&mut buf)
            .unwrap_err();
        assert_eq!(err, EncodeError::NotLatin1 { ch: '€', index: 1 });
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encoded_len() {
        let req = Request::new(Opcode::Wvcha, 0, 0).extents([
            Extent::from(&b"abc"[..]),
            Extent::from("de"),
        ]);
        assert_eq!(req.encoded_len().unwrap(), 21);
    }
}
