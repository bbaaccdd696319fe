use std::time::Duration;

/// Tunables for attempt sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    tick_interval: Duration,
    finalize_retries: u32,
    finalize_retry_delay: Duration,
    resync_draft_answers: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            finalize_retries: 3,
            finalize_retry_delay: Duration::from_secs(1),
            resync_draft_answers: true,
        }
    }
}

impl EngineSettings {
    /// How often the deadline clock publishes the remaining time.
    /// A zero interval is bumped to one millisecond.
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    /// Extra finalize attempts made after an expiry-triggered write fails.
    #[must_use]
    pub fn with_finalize_retries(mut self, retries: u32) -> Self {
        self.finalize_retries = retries;
        self
    }

    #[must_use]
    pub fn with_finalize_retry_delay(mut self, delay: Duration) -> Self {
        self.finalize_retry_delay = delay;
        self
    }

    /// Re-upsert answers recovered from the local draft when resuming.
    #[must_use]
    pub fn with_resync_draft_answers(mut self, enabled: bool) -> Self {
        self.resync_draft_answers = enabled;
        self
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    #[must_use]
    pub fn finalize_retries(&self) -> u32 {
        self.finalize_retries
    }

    #[must_use]
    pub fn finalize_retry_delay(&self) -> Duration {
        self.finalize_retry_delay
    }

    #[must_use]
    pub fn resync_draft_answers(&self) -> bool {
        self.resync_draft_answers
    }
}
