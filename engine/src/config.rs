//! Engine configuration.
//!
//! Configuration values are provided by the application, not hardcoded.
//! The defaults encode the production behaviour: Europe/London as the
//! reference timezone and a 48-hour escrow clearing window.

use callboard_runtime::RetryPolicy;
use chrono::Duration;
use chrono_tz::Tz;

/// Scheduling and settlement configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed reference timezone for resolving gig schedules to instants.
    pub timezone: Tz,

    /// How long a fee stays in escrow after the performance end before it
    /// clears automatically.
    ///
    /// Default: 48 hours
    pub clearing_window: Duration,

    /// How long the operation surface waits for a lifecycle
    /// acknowledgement before reporting a timeout.
    ///
    /// Default: 10 seconds
    pub ack_timeout: std::time::Duration,

    /// Backoff policy for transient storage and payment failures.
    pub retry: RetryPolicy,

    /// How many times a failed clearing attempt reschedules itself before
    /// waiting for recovery to re-arm it.
    ///
    /// Default: 5
    pub max_clearing_retries: u32,
}

impl EngineConfig {
    /// Create a configuration with production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timezone: chrono_tz::Europe::London,
            clearing_window: Duration::hours(48),
            ack_timeout: std::time::Duration::from_secs(10),
            retry: RetryPolicy::default(),
            max_clearing_retries: 5,
        }
    }

    /// Set the reference timezone.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the escrow clearing window.
    #[must_use]
    pub const fn with_clearing_window(mut self, window: Duration) -> Self {
        self.clearing_window = window;
        self
    }

    /// Set the acknowledgement timeout.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the clearing retry cap.
    #[must_use]
    pub const fn with_max_clearing_retries(mut self, retries: u32) -> Self {
        self.max_clearing_retries = retries;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
