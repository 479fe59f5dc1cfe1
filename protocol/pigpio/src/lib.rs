//! Binary socket protocol spoken by the pigpio daemon.
//!
//! Three fixed frames travel over TCP, all little-endian:
//! - Request: `cmd, p1, p2, p3` as `u32`, followed by `p3` bytes of extents
//! - Response: 12 opaque bytes then an `i32` result (negative = error)
//! - Notification record: `u16 seqno, u16 flags, u32 tick, u32 level`
//!
//! # Example
//!
//! ```
//! use protocol_pigpio::{Extent, Opcode, Request, Response};
//!
//! // Encode a WRITE gpio 17 high request
//! let mut buf = Vec::new();
//! Request::new(Opcode::Write, 17, 1).encode(&mut buf).unwrap();
//! assert_eq!(buf.len(), 16);
//!
//! // An extended request carries its extents after the header
//! let mut buf = Vec::new();
//! Request::new(Opcode::Proc, 0, 0)
//!     .extent(Extent::Text("w 22 1"))
//!     .encode(&mut buf)
//!     .unwrap();
//! assert_eq!(buf.len(), 16 + 6);
//!
//! // Parse a response
//! let mut data = [0u8; 16];
//! data[12..].copy_from_slice(&(-5i32).to_le_bytes());
//! let (response, consumed) = Response::parse(&data).unwrap();
//! assert_eq!(response.result(), -5);
//! assert_eq!(consumed, 16);
//! ```

mod errors;
mod notification;
mod opcode;
mod request;
mod response;

pub use errors::{DaemonError, check, describe, error_text};
pub use notification::{
    NTFY_FLAGS_ALIVE, NTFY_FLAGS_EVENT, NTFY_FLAGS_GPIO, NTFY_FLAGS_WDOG, RECORD_LEN, Record,
    RecordKind,
};
pub use opcode::Opcode;
pub use request::{EncodeError, Extent, HEADER_LEN, Request};
pub use response::{RESPONSE_LEN, Response};

/// Parse error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    #[error("incomplete")]
    Incomplete,
}
