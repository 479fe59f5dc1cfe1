use std::sync::Arc;

use protocol_pigpio::{DaemonError, Extent};
use tracing::{debug, info};

use crate::command::CommandChannel;
use crate::config::{ClientConfig, ErrorPolicy};
use crate::error::ClientError;
use crate::latency::ClientLatency;
use crate::notify::{ChannelState, NotificationChannel};
use crate::registry::{Callback, Edge, EdgeMode, Subscription, SubscriptionId};

/// A connection to one pigpio daemon.
///
/// Owns a command socket and a notification socket. Edge subscriptions are
/// delivered on a background task; every other operation is a request on
/// the command socket.
pub struct Pi {
    command: Arc<CommandChannel>,
    notify: NotificationChannel,
    policy: ErrorPolicy,
}

impl Pi {
    /// Connect to the daemon at `address` with default settings.
    pub async fn connect(address: impl Into<String>) -> Result<Self, ClientError> {
        let config = ClientConfig {
            address: address.into(),
            ..Default::default()
        };
        Self::connect_with(&config).await
    }

    /// Connect using a full client configuration.
    ///
    /// The command socket is opened first. If the notification socket then
    /// fails to open, the command socket is shut down before returning.
    pub async fn connect_with(config: &ClientConfig) -> Result<Self, ClientError> {
        let address = config.address.as_str();
        let command = Arc::new(
            CommandChannel::connect(address, config.tcp_nodelay, config.max_payload_len).await?,
        );

        let notify = match NotificationChannel::connect(address, command.clone()).await {
            Ok(notify) => notify,
            Err(e) => {
                if let Err(close) = command.close().await {
                    debug!(error = %close, "command channel shutdown failed");
                }
                return Err(e);
            }
        };

        info!(address, handle = notify.handle(), "connected to pigpio daemon");
        Ok(Self {
            command,
            notify,
            policy: config.error_policy,
        })
    }

    /// Stop notifications and shut both sockets down.
    ///
    /// Idempotent; concurrent callers all return once shutdown completes.
    pub async fn close(&self) {
        self.notify.close().await;
        if let Err(e) = self.command.close().await {
            debug!(error = %e, "command channel shutdown failed");
        }
    }

    /// Send a fixed request and return the raw signed result.
    pub async fn send_command(
        &self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
    ) -> Result<i32, ClientError> {
        self.command.send_command(cmd, p1, p2).await
    }

    /// Send a request with extents and return the raw signed result.
    pub async fn send_extended_command(
        &self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
        extents: &[Extent<'_>],
    ) -> Result<i32, ClientError> {
        self.command
            .send_extended_command(cmd, p1, p2, extents)
            .await
    }

    /// The command channel, for multi-step exchanges through
    /// [`CommandChannel::lock`].
    pub fn command(&self) -> &CommandChannel {
        &self.command
    }

    /// Call `handler` for every matching transition on `gpio`.
    pub async fn subscribe<F>(
        &self,
        gpio: u32,
        edge: EdgeMode,
        handler: F,
    ) -> Result<Subscription, ClientError>
    where
        F: Fn(Edge) + Send + Sync + 'static,
    {
        self.notify.subscribe(gpio, edge, handler).await
    }

    /// Count matching transitions on `gpio`; see [`Subscription::tally`].
    pub async fn subscribe_tally(
        &self,
        gpio: u32,
        edge: EdgeMode,
    ) -> Result<Subscription, ClientError> {
        self.notify.subscribe(gpio, edge, Callback::Tally).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ClientError> {
        self.notify.unsubscribe(id).await
    }

    /// Gpios currently monitored by this client's subscriptions.
    pub fn monitor(&self) -> u32 {
        self.notify.monitor()
    }

    /// Number of active subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.notify.subscriptions()
    }

    /// Daemon handle of the notification stream.
    pub fn handle(&self) -> u32 {
        self.notify.handle()
    }

    pub fn notify_state(&self) -> ChannelState {
        self.notify.state()
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn latency(&self) -> &ClientLatency {
        self.command.latency()
    }

    /// Apply the error policy to a raw result.
    pub(crate) fn outcome(&self, result: i32) -> Result<i32, ClientError> {
        match self.policy {
            ErrorPolicy::Raise if result < 0 => Err(DaemonError::new(result).into()),
            _ => Ok(result),
        }
    }
}
