//! Async client for the pigpio daemon.
//!
//! A [`Pi`] holds two sockets to the daemon: a command socket carrying one
//! request/response exchange at a time, and a notification socket streaming
//! gpio level records. Level changes are turned into edges and delivered to
//! subscribed callbacks on a background task.
//!
//! # Example
//!
//! ```no_run
//! use pigpio_client::{EdgeMode, Mode, Pi};
//!
//! # async fn example() -> Result<(), pigpio_client::ClientError> {
//! let pi = Pi::connect("127.0.0.1:8888").await?;
//!
//! pi.set_mode(17, Mode::Output).await?;
//! pi.write(17, 1).await?;
//!
//! let button = pi
//!     .subscribe(4, EdgeMode::Falling, |edge| println!("pressed at {}", edge.tick))
//!     .await?;
//! let presses = pi.subscribe_tally(4, EdgeMode::Falling).await?;
//!
//! // ...
//! println!("{} presses", presses.tally());
//! pi.unsubscribe(button.id()).await?;
//! pi.close().await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod notify;

mod error;
mod latency;
mod ops;
mod pi;
mod registry;

pub use command::{CommandChannel, CommandGuard};
pub use config::{ClientConfig, ErrorPolicy};
pub use error::ClientError;
pub use latency::ClientLatency;
pub use notify::{ChannelState, NotificationChannel};
pub use ops::{Mode, Pull, Pulse, ScriptStatus};
pub use pi::Pi;
pub use registry::{
    Callback, Edge, EdgeMode, Handler, Level, Registry, Subscription, SubscriptionId, USER_GPIOS,
};

pub use protocol_pigpio::{DaemonError, Extent, Opcode};
