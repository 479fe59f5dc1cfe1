use protocol_pigpio::{DaemonError, EncodeError};

use crate::registry::SubscriptionId;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel closed")]
    Closed,
    #[error("invalid extent: {0}")]
    Extent(#[from] EncodeError),
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
    #[error("gpio {0} not 0-31")]
    InvalidGpio(u32),
    #[error("secondary payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

impl ClientError {
    /// Daemon error code, if this error came from a negative result.
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Daemon(e) => Some(e.code()),
            _ => None,
        }
    }
}
