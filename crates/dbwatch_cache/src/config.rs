//! Configuration for the informer.

use dbwatch_api::ListOptions;
use rand::Rng;
use std::time::Duration;

/// Configuration for an informer.
#[derive(Debug, Clone)]
pub struct InformerConfig {
    /// Interval after which a full relist is forced, even without errors.
    pub resync_period: Duration,
    /// Selectors applied to both list and watch. `limit` sets the page
    /// size of each list; every page is fetched before the snapshot is
    /// applied.
    pub list_options: ListOptions,
    /// Server-side timeout for each watch, sent as `timeoutSeconds`.
    pub watch_timeout: Option<Duration>,
    /// Delay between consecutive failed cycles.
    pub backoff: BackoffConfig,
}

impl InformerConfig {
    /// Creates a configuration with a one minute resync period.
    pub fn new() -> Self {
        Self {
            resync_period: Duration::from_secs(60),
            list_options: ListOptions::default(),
            watch_timeout: None,
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the resync period.
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    /// Sets the label selector.
    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.list_options.label_selector = Some(selector.into());
        self
    }

    /// Sets the field selector.
    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.list_options.field_selector = Some(selector.into());
        self
    }

    /// Sets the watch timeout.
    pub fn with_watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout = Some(timeout);
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Options for the list call of each cycle.
    pub(crate) fn list_request(&self) -> ListOptions {
        let mut options = self.list_options.clone();
        options.resource_version = None;
        options.continue_token = None;
        options.watch = false;
        options
    }

    /// Options for the watch following a snapshot at `version`.
    pub(crate) fn watch_request(&self, version: Option<dbwatch_api::ResourceVersion>) -> ListOptions {
        let mut options = self.list_options.clone();
        options.resource_version = version;
        options.timeout_seconds = self.watch_timeout.map(|t| t.as_secs().max(1));
        options.limit = None;
        options.continue_token = None;
        options.watch = true;
        options
    }
}

impl Default for InformerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff between failed list/watch cycles.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Creates a backoff configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// No delay at all: every failure relists immediately.
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Sets the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.multiplier.powi(failures.saturating_sub(1).min(64) as i32);
        let delay = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay + delay * factor)
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(30))
    }
}
