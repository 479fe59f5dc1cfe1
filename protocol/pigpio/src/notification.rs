//! Notification record decoding.
//!
//! A socket switched into notification mode carries nothing but 12-byte
//! records. A record with zero flags is a plain level sample; otherwise the
//! flags mark a watchdog timeout, a keepalive, or a script event, with the
//! low five bits naming the gpio (or event id).

use crate::ParseError;

/// Length of one notification record.
pub const RECORD_LEN: usize = 12;

/// Mask selecting the gpio number in the flags word.
pub const NTFY_FLAGS_GPIO: u16 = 0x1f;
/// Watchdog timeout on the gpio in the low bits.
pub const NTFY_FLAGS_WDOG: u16 = 1 << 5;
/// Keepalive heartbeat.
pub const NTFY_FLAGS_ALIVE: u16 = 1 << 6;
/// Event trigger; not acted upon by this client.
pub const NTFY_FLAGS_EVENT: u16 = 1 << 7;

/// One decoded notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub seqno: u16,
    pub flags: u16,
    /// Microseconds since boot; wraps roughly every 72 minutes.
    pub tick: u32,
    /// Bit n set when gpio n is high.
    pub level: u32,
}

/// Classification of a record by its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Plain level sample.
    Level,
    /// Watchdog expired on the given gpio.
    Watchdog(u8),
    /// Keepalive heartbeat.
    Alive,
    /// Script event with the given id.
    Event(u8),
}

impl Record {
    /// Parse a record from the buffer.
    ///
    /// Returns the parsed record and number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        if data.len() < RECORD_LEN {
            return Err(ParseError::Incomplete);
        }
        let record = Record {
            seqno: u16::from_le_bytes([data[0], data[1]]),
            flags: u16::from_le_bytes([data[2], data[3]]),
            tick: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            level: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
        };
        Ok((record, RECORD_LEN))
    }

    /// Encode the record into the buffer.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0..2].copy_from_slice(&self.seqno.to_le_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tick.to_le_bytes());
        buf[8..12].copy_from_slice(&self.level.to_le_bytes());
        RECORD_LEN
    }

    /// Gpio number carried in the low flag bits.
    pub fn gpio(&self) -> u8 {
        (self.flags & NTFY_FLAGS_GPIO) as u8
    }

    /// Classify the record.
    ///
    /// Watchdog takes precedence over keepalive, which takes precedence
    /// over event.
    pub fn kind(&self) -> RecordKind {
        if self.flags == 0 {
            RecordKind::Level
        } else if self.flags & NTFY_FLAGS_WDOG != 0 {
            RecordKind::Watchdog(self.gpio())
        } else if self.flags & NTFY_FLAGS_ALIVE != 0 {
            RecordKind::Alive
        } else {
            // EVENT, or gpio bits with no type bit set.
            RecordKind::Event(self.gpio())
        }
    }
}
