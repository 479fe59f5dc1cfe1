//! Notification channel: a second socket streaming gpio level records.
//!
//! Opening the channel switches a fresh socket into in-band notification
//! mode (NOIB) and spawns a task that reads 12-byte records until stopped.
//! Level records are diffed against the previous level word and matching
//! subscriptions are called on the task, in registration order.
//!
//! The filter (NB) and close (NC) commands for the handle go over the
//! command channel: the daemon answers on the socket a command arrives on,
//! and a 16-byte reply would land in the middle of the record stream.

use std::sync::Arc;

use parking_lot::Mutex;
use protocol_pigpio::{
    HEADER_LEN, Opcode, RECORD_LEN, RESPONSE_LEN, Record, RecordKind, Request, Response,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::command::CommandChannel;
use crate::error::ClientError;
use crate::metrics::{NOTIFY_KEEPALIVE, NOTIFY_RECORDS, NOTIFY_WATCHDOG};
use crate::registry::{
    Callback, Edge, EdgeMode, Entry, Level, Registry, Subscription, SubscriptionId,
};

/// Lifecycle of an opened notification channel. Only ever moves forward.
///
/// A channel value exists only once NOIB has succeeded; the connecting
/// phase is the [`NotificationChannel::open`] future itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelState {
    Open,
    Stopping,
    Closed,
}

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// An open notification stream and the subscriptions it feeds.
pub struct NotificationChannel<S = TcpStream> {
    handle: u32,
    control: Arc<CommandChannel<S>>,
    registry: Arc<Mutex<Registry>>,
    state: Arc<Mutex<ChannelState>>,
    /// Serializes subscribe/unsubscribe so one filter update is in flight.
    filter: tokio::sync::Mutex<()>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> NotificationChannel<S> {
    /// Connect a dedicated notification socket to the daemon.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        control: Arc<CommandChannel<S>>,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::open(stream, control).await
    }

    /// Switch `stream` into notification mode and start the read loop.
    pub async fn open<R>(
        mut stream: R,
        control: Arc<CommandChannel<S>>,
    ) -> Result<Self, ClientError>
    where
        R: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut request = Vec::with_capacity(HEADER_LEN);
        Request::new(Opcode::Noib, 0, 0).encode(&mut request)?;
        stream.write_all(&request).await?;
        let mut response = [0u8; RESPONSE_LEN];
        stream.read_exact(&mut response).await?;
        let (response, _) = Response::parse(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let handle = protocol_pigpio::check(response.result())?;
        debug!(handle, "notification channel open");

        let registry = Arc::new(Mutex::new(Registry::new()));
        let (stop, stopped) = oneshot::channel();
        let state = Arc::new(Mutex::new(ChannelState::Open));
        let task = tokio::spawn(read_loop(stream, registry.clone(), state.clone(), stopped));

        Ok(Self {
            handle,
            control,
            registry,
            state,
            filter: tokio::sync::Mutex::new(()),
            running: tokio::sync::Mutex::new(Some(Running { stop, task })),
        })
    }

    /// Daemon-issued handle for this stream.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Current monitored-gpio mask.
    pub fn monitor(&self) -> u32 {
        self.registry.lock().monitor()
    }

    /// Number of active subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.registry.lock().len()
    }

    /// Register `callback` for `edge` transitions on `gpio` and push the
    /// new mask to the daemon.
    ///
    /// If the daemon rejects the filter, or the returned future is dropped
    /// before the daemon answers, the subscription is rolled back.
    pub async fn subscribe(
        &self,
        gpio: u32,
        edge: EdgeMode,
        callback: impl Into<Callback>,
    ) -> Result<Subscription, ClientError> {
        let callback = callback.into();
        let _filter = self.filter.lock().await;
        if self.state() >= ChannelState::Stopping {
            return Err(ClientError::Closed);
        }

        let (subscription, mask) = {
            let mut registry = self.registry.lock();
            let subscription = registry.add(gpio, edge, callback)?;
            (subscription, registry.monitor())
        };

        let pending = Pending {
            registry: &self.registry,
            id: Some(subscription.id()),
        };
        self.push_filter(mask).await?;
        pending.commit();
        debug!(
            id = subscription.id(),
            gpio,
            ?edge,
            monitor = format_args!("{mask:#010x}"),
            "subscribed"
        );
        Ok(subscription)
    }

    /// Remove a subscription, pushing the mask only if it changed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ClientError> {
        let _filter = self.filter.lock().await;

        let (changed, mask) = {
            let mut registry = self.registry.lock();
            let changed = registry.remove(id)?;
            (changed, registry.monitor())
        };

        debug!(id, changed, monitor = format_args!("{mask:#010x}"), "unsubscribed");
        if changed && self.state() < ChannelState::Stopping {
            self.push_filter(mask).await?;
        }
        Ok(())
    }

    async fn push_filter(&self, mask: u32) -> Result<(), ClientError> {
        let result = self
            .control
            .send_command(Opcode::Nb, self.handle, mask)
            .await?;
        protocol_pigpio::check(result)?;
        Ok(())
    }

    /// Release the handle and stop the read loop.
    ///
    /// Safe to call more than once and from several tasks: only the first
    /// call sends NC, and every call returns after the loop has exited.
    pub async fn close(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { stop, task }) = running.take() else {
            return;
        };
        advance(&self.state, ChannelState::Stopping);

        match self.control.send_command(Opcode::Nc, self.handle, 0).await {
            Ok(result) if result < 0 => {
                warn!(handle = self.handle, result, "notify close rejected")
            }
            Err(e) => warn!(handle = self.handle, error = %e, "notify close failed"),
            Ok(_) => {}
        }

        // The loop may already have exited on its own.
        let _ = stop.send(());
        if let Err(e) = task.await {
            error!(error = %e, "notification task failed");
        }
        advance(&self.state, ChannelState::Closed);
        debug!(handle = self.handle, "notification channel closed");
    }
}

/// Removes a freshly added subscription unless committed.
struct Pending<'a> {
    registry: &'a Mutex<Registry>,
    id: Option<SubscriptionId>,
}

impl Pending<'_> {
    fn commit(mut self) {
        self.id = None;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = self.registry.lock().remove(id);
            debug!(id, "subscription rolled back");
        }
    }
}

fn advance(state: &Mutex<ChannelState>, next: ChannelState) {
    let mut state = state.lock();
    if next > *state {
        *state = next;
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut stream: R,
    registry: Arc<Mutex<Registry>>,
    state: Arc<Mutex<ChannelState>>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut detector = EdgeDetector::default();
    let mut buf = [0u8; RECORD_LEN];

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("notification loop stopping");
                break;
            }
            read = stream.read_exact(&mut buf) => {
                if let Err(e) = read {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        debug!("notification stream closed by daemon");
                    } else {
                        error!(error = %e, "notification read failed");
                    }
                    break;
                }
            }
        }

        let Ok((record, _)) = Record::parse(&buf) else {
            continue;
        };
        NOTIFY_RECORDS.increment();
        trace!(
            seqno = record.seqno,
            flags = record.flags,
            tick = record.tick,
            level = format_args!("{:#010x}", record.level),
            "record"
        );

        // Dispatch outside the lock so callbacks never block subscribers.
        let fired = detector.process(&record, &registry.lock());
        for (entry, edge) in fired {
            entry.dispatch(edge);
        }
    }

    drop(stream);
    advance(&state, ChannelState::Closed);
}

/// Turns records into callback invocations.
#[derive(Debug, Default)]
struct EdgeDetector {
    last_level: u32,
}

impl EdgeDetector {
    fn process(&mut self, record: &Record, registry: &Registry) -> Vec<(Arc<Entry>, Edge)> {
        let mut fired = Vec::new();
        match record.kind() {
            RecordKind::Level => {
                let changed = record.level ^ self.last_level;
                self.last_level = record.level;
                for entry in registry.entries() {
                    if entry.bit() & changed == 0 {
                        continue;
                    }
                    let new_level = u32::from(record.level & entry.bit() != 0);
                    if entry.edge().matches(new_level) {
                        let level = if new_level == 1 { Level::High } else { Level::Low };
                        fired.push((
                            entry.clone(),
                            Edge {
                                gpio: entry.gpio(),
                                level,
                                tick: record.tick,
                            },
                        ));
                    }
                }
            }
            RecordKind::Watchdog(gpio) => {
                NOTIFY_WATCHDOG.increment();
                debug!(gpio, tick = record.tick, "watchdog timeout");
                for entry in registry.entries() {
                    if entry.gpio() == gpio {
                        fired.push((
                            entry.clone(),
                            Edge {
                                gpio,
                                level: Level::Timeout,
                                tick: record.tick,
                            },
                        ));
                    }
                }
            }
            RecordKind::Alive => {
                NOTIFY_KEEPALIVE.increment();
                trace!("keepalive");
            }
            RecordKind::Event(_) => {}
        }
        fired
    }
}
