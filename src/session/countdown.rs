//! Return-to-welcome countdown

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Seconds shown before the kiosk returns to the welcome screen
pub const DEFAULT_COUNTDOWN_SECS: u32 = 30;

/// A running countdown; cancelled when dropped
#[derive(Debug)]
pub struct Countdown {
    id: u64,
    cancel: CancellationToken,
}

impl Countdown {
    /// Start counting down from `seconds`, one tick per `period`
    ///
    /// `on_tick` receives the remaining count after each tick, ending with 0.
    /// Nothing is delivered once the countdown is cancelled.
    pub fn start<F>(id: u64, seconds: u32, period: Duration, on_tick: F) -> Self
    where
        F: Fn(u32) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut remaining = seconds;
            while remaining > 0 {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::trace!(countdown = id, remaining, "countdown cancelled");
                        return;
                    }
                    _ = interval.tick() => {}
                }

                remaining -= 1;
                on_tick(remaining);
            }
        });

        tracing::debug!(countdown = id, seconds, "countdown started");

        Self { id, cancel }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Stop the countdown; safe to call repeatedly
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
