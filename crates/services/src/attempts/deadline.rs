use std::future::Future;
use std::time::Duration;

use quiz_core::{Clock, Deadline};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};

/// Ticks toward a fixed deadline and fires a single expiry callback.
///
/// The ticking task is owned by this value: `stop` or dropping it cancels
/// the task. The expiry callback runs on its own task so a callback that
/// stops this clock does not cancel itself.
#[derive(Debug)]
pub struct DeadlineClock {
    deadline: Option<Deadline>,
    remaining: Option<watch::Receiver<Duration>>,
    task: Option<JoinHandle<()>>,
}

impl DeadlineClock {
    /// A clock for an untimed attempt. Never expires.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            deadline: None,
            remaining: None,
            task: None,
        }
    }

    /// Starts ticking every `tick` until `deadline`, then spawns `on_expiry`
    /// once. A deadline already in the past expires on the first poll.
    ///
    /// The remaining time is read from `clock` once; later ticks use the
    /// runtime's monotonic timer.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start<F, Fut>(deadline: Deadline, clock: Clock, tick: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let initial = deadline.remaining(clock.now()).to_std().unwrap_or_default();
        let expires_at = Instant::now() + initial;
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let expiry = sleep_until(expires_at);
            tokio::pin!(expiry);

            loop {
                tokio::select! {
                    biased;
                    () = &mut expiry => break,
                    _ = ticker.tick() => {
                        tx.send_replace(expires_at.saturating_duration_since(Instant::now()));
                    }
                }
            }

            tx.send_replace(Duration::ZERO);
            tracing::info!(deadline = %deadline.at(), "deadline reached");
            tokio::spawn(on_expiry());
        });

        Self {
            deadline: Some(deadline),
            remaining: Some(rx),
            task: Some(task),
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// Last published remaining time; `None` when disabled.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining.as_ref().map(|rx| *rx.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> Option<watch::Receiver<Duration>> {
        self.remaining.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels ticking. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DeadlineClock {
    fn drop(&mut self) {
        self.stop();
    }
}
