//! Countdown for one attempt. The clock runs in its own task, publishes the
//! remaining time on a watch channel and reports low-time and expiry through
//! an event channel tagged with the timer id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::core::config::TimerSettings;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    LowTime { timer: TimerId, remaining: Duration },
    Expired { timer: TimerId },
}

impl TimerEvent {
    pub fn timer(&self) -> TimerId {
        match self {
            TimerEvent::LowTime { timer, .. } | TimerEvent::Expired { timer } => *timer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub tick: Duration,
    /// Zero disables the low-time warning.
    pub warning: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), warning: Duration::from_secs(120) }
    }
}

impl TimerConfig {
    pub fn from_settings(settings: &TimerSettings) -> Self {
        Self {
            tick: Duration::from_millis(settings.tick_ms.max(1)),
            warning: Duration::from_secs(settings.warning_seconds),
        }
    }
}

pub type TimerEvents = mpsc::UnboundedSender<TimerEvent>;

/// Handle to a running countdown. Cancelling or dropping it stops the clock
/// and suppresses any pending expiry.
#[derive(Debug)]
pub struct CountdownTimer {
    id: TimerId,
    deadline: Instant,
    remaining: watch::Receiver<Duration>,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn start(duration: Duration, config: TimerConfig, events: TimerEvents) -> Self {
        let id = TimerId::next();
        let deadline = Instant::now() + duration;
        let (remaining_tx, remaining_rx) = watch::channel(duration);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(run_countdown(
            id,
            deadline,
            config,
            remaining_tx,
            cancel_rx,
            events,
        ));

        tracing::debug!(timer = %id, duration_secs = duration.as_secs(), "countdown armed");

        Self { id, deadline, remaining: remaining_rx, cancel: cancel_tx, handle }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Receiver of the value published on every tick.
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.remaining.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!(timer = %self.id, "countdown cancelled");
        }
        self.handle.abort();
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
        self.handle.abort();
    }
}

async fn run_countdown(
    id: TimerId,
    deadline: Instant,
    config: TimerConfig,
    remaining_tx: watch::Sender<Duration>,
    mut cancel: watch::Receiver<bool>,
    events: TimerEvents,
) {
    let mut ticker = interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut warned = false;

    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return;
                }
            }
            _ = sleep_until(deadline) => {}
            _ = ticker.tick() => {}
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        remaining_tx.send_replace(remaining);

        if remaining.is_zero() {
            if *cancel.borrow() {
                return;
            }
            tracing::info!(timer = %id, "countdown expired");
            if events.send(TimerEvent::Expired { timer: id }).is_err() {
                tracing::warn!(timer = %id, "expiry dropped; session no longer listening");
            }
            return;
        }

        if !warned && !config.warning.is_zero() && remaining <= config.warning {
            warned = true;
            tracing::info!(timer = %id, remaining_secs = remaining.as_secs(), "low time warning");
            let _ = events.send(TimerEvent::LowTime { timer: id, remaining });
        }
    }
}
