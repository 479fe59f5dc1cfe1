//! Edge callback subscriptions and the monitored-gpio mask.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::ClientError;
use crate::metrics::{CALLBACK_PANICS, CALLBACKS_DISPATCHED};

/// Identifies one subscription within its registry.
pub type SubscriptionId = u64;

/// Number of gpios a notification level word covers.
pub const USER_GPIOS: u32 = 32;

/// Which transitions a subscription wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EdgeMode {
    Rising = 0,
    Falling = 1,
    Either = 2,
}

impl EdgeMode {
    /// Whether a transition to `level` (0 or 1) fires this mode.
    ///
    /// `mode ^ level` is non-zero for rising-to-1 and falling-to-0, and
    /// always non-zero for `Either`.
    pub fn matches(self, level: u32) -> bool {
        (self as u32 ^ level) != 0
    }
}

/// Level reported to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
    /// The gpio's watchdog expired with no level change.
    Timeout,
}

impl Level {
    /// Numeric form used by the daemon: 0, 1, or 2 for a timeout.
    pub fn as_u32(self) -> u32 {
        match self {
            Level::Low => 0,
            Level::High => 1,
            Level::Timeout => 2,
        }
    }
}

/// A transition delivered to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub gpio: u8,
    pub level: Level,
    /// Daemon tick in microseconds; wraps roughly every 72 minutes.
    pub tick: u32,
}

/// A user callback. Called on the notification task; keep it short.
pub type Handler = Box<dyn Fn(Edge) + Send + Sync>;

/// What runs when a subscription fires.
pub enum Callback {
    /// Count edges; read with [`Subscription::tally`].
    Tally,
    Handler(Handler),
}

impl<F> From<F> for Callback
where
    F: Fn(Edge) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Callback::Handler(Box::new(f))
    }
}

/// A registered subscription.
pub(crate) struct Entry {
    id: SubscriptionId,
    gpio: u8,
    edge: EdgeMode,
    bit: u32,
    callback: Callback,
    tally: Arc<AtomicU64>,
}

impl Entry {
    pub(crate) fn gpio(&self) -> u8 {
        self.gpio
    }

    pub(crate) fn edge(&self) -> EdgeMode {
        self.edge
    }

    pub(crate) fn bit(&self) -> u32 {
        self.bit
    }

    /// Run the callback. A panicking handler is logged and swallowed.
    pub(crate) fn dispatch(&self, edge: Edge) {
        CALLBACKS_DISPATCHED.increment();
        match &self.callback {
            Callback::Tally => {
                self.tally.fetch_add(1, Ordering::Relaxed);
            }
            Callback::Handler(handler) => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(edge))) {
                    CALLBACK_PANICS.increment();
                    warn!(
                        subscription = self.id,
                        gpio = edge.gpio,
                        panic = panic_message(&*panic),
                        "callback panicked"
                    );
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Caller-side handle to a subscription.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    gpio: u8,
    edge: EdgeMode,
    tally: Arc<AtomicU64>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn gpio(&self) -> u8 {
        self.gpio
    }

    pub fn edge(&self) -> EdgeMode {
        self.edge
    }

    /// Edges counted by the tally callback. Always 0 for custom handlers.
    pub fn tally(&self) -> u64 {
        self.tally.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("gpio", &self.gpio)
            .field("edge", &self.edge)
            .field("tally", &self.tally())
            .finish()
    }
}

/// Active subscriptions in registration order, plus their gpio mask.
///
/// The mask is recomputed on every change, so it always equals the OR of
/// the active subscriptions' bits.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Arc<Entry>>,
    monitor: u32,
    next_id: SubscriptionId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback and return its handle.
    pub fn add(
        &mut self,
        gpio: u32,
        edge: EdgeMode,
        callback: Callback,
    ) -> Result<Subscription, ClientError> {
        if gpio >= USER_GPIOS {
            return Err(ClientError::InvalidGpio(gpio));
        }
        let id = self.next_id;
        self.next_id += 1;

        let tally = Arc::new(AtomicU64::new(0));
        self.entries.push(Arc::new(Entry {
            id,
            gpio: gpio as u8,
            edge,
            bit: 1 << gpio,
            callback,
            tally: tally.clone(),
        }));
        self.recompute();

        Ok(Subscription {
            id,
            gpio: gpio as u8,
            edge,
            tally,
        })
    }

    /// Remove a subscription.
    ///
    /// Returns whether the monitor mask changed.
    pub fn remove(&mut self, id: SubscriptionId) -> Result<bool, ClientError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(ClientError::UnknownSubscription(id))?;
        self.entries.remove(pos);

        let before = self.monitor;
        self.recompute();
        Ok(self.monitor != before)
    }

    /// OR of every active subscription's bit.
    pub fn monitor(&self) -> u32 {
        self.monitor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    fn recompute(&mut self) {
        self.monitor = self.entries.iter().fold(0, |mask, e| mask | e.bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_mode_matching() {
        assert!(EdgeMode::Rising.matches(1));
        assert!(!EdgeMode::Rising.matches(0));
        assert!(EdgeMode::Falling.matches(0));
        assert!(!EdgeMode::Falling.matches(1));
        assert!(EdgeMode::Either.matches(0));
        assert!(EdgeMode::Either.matches(1));
    }

    #[test]
    fn test_monitor_is_union_of_bits() {
        let mut registry = Registry::new();
        let a = registry.add(4, EdgeMode::Rising, Callback::Tally).unwrap();
        let _b = registry.add(17, EdgeMode::Either, Callback::Tally).unwrap();
        assert_eq!(registry.monitor(), (1 << 4) | (1 << 17));

        assert!(registry.remove(a.id()).unwrap());
        assert_eq!(registry.monitor(), 1 << 17);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shared_bit_removal_keeps_mask() {
        let mut registry = Registry::new();
        let a = registry.add(22, EdgeMode::Rising, Callback::Tally).unwrap();
        let b = registry.add(22, EdgeMode::Falling, Callback::Tally).unwrap();

        assert!(!registry.remove(a.id()).unwrap());
        assert_eq!(registry.monitor(), 1 << 22);
        assert!(registry.remove(b.id()).unwrap());
        assert_eq!(registry.monitor(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_subscription_rejected() {
        let mut registry = Registry::new();
        let a = registry.add(1, EdgeMode::Rising, Callback::Tally).unwrap();
        registry.remove(a.id()).unwrap();
        assert!(matches!(
            registry.remove(a.id()),
            Err(ClientError::UnknownSubscription(id)) if id == a.id()
        ));
    }

    #[test]
    fn test_gpio_out_of_range_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.add(32, EdgeMode::Rising, Callback::Tally),
            Err(ClientError::InvalidGpio(32))
        ));
        assert!(registry.is_empty());
        assert_eq!(registry.monitor(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut registry = Registry::new();
        let a = registry.add(1, EdgeMode::Rising, Callback::Tally).unwrap();
        registry.remove(a.id()).unwrap();
        let b = registry.add(1, EdgeMode::Rising, Callback::Tally).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_tally_counts_dispatches() {
        let mut registry = Registry::new();
        let sub = registry.add(5, EdgeMode::Either, Callback::Tally).unwrap();
        let edge = Edge {
            gpio: 5,
            level: Level::High,
            tick: 0,
        };
        registry.entries()[0].dispatch(edge);
        registry.entries()[0].dispatch(edge);
        assert_eq!(sub.tally(), 2);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let mut registry = Registry::new();
        let sub = registry
            .add(
                5,
                EdgeMode::Either,
                Callback::from(|edge: Edge| {
                    if edge.gpio == 5 {
                        panic!("faulty callback")
                    }
                }),
            )
            .unwrap();
        registry.entries()[0].dispatch(Edge {
            gpio: 5,
            level: Level::Low,
            tick: 0,
        });
        assert_eq!(sub.tally(), 0);
    }
}
