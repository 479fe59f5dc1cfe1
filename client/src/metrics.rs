//! Notification channel metrics.

use metriken::{Counter, metric};

#[metric(
    name = "notify_records",
    description = "Notification records received"
)]
pub static NOTIFY_RECORDS: Counter = Counter::new();

#[metric(
    name = "notify_watchdog",
    description = "Watchdog timeout records received"
)]
pub static NOTIFY_WATCHDOG: Counter = Counter::new();

#[metric(
    name = "notify_keepalive",
    description = "Keepalive records received"
)]
pub static NOTIFY_KEEPALIVE: Counter = Counter::new();

#[metric(
    name = "callbacks_dispatched",
    description = "Edge callbacks invoked"
)]
pub static CALLBACKS_DISPATCHED: Counter = Counter::new();

#[metric(
    name = "callback_panics",
    description = "Edge callbacks that panicked"
)]
pub static CALLBACK_PANICS: Counter = Counter::new();
