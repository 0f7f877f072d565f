//! PeriodicTicker - a dispatcher plus a timer thread

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    default_ticker_name, ErrorSink, EventCallback, FailurePolicy, SubscriberRef, SubscriberSpec,
    TickerConfig,
};
use dispatcher::{Dispatcher, DispatcherError, DispatcherState, MetricsSnapshot};
use observability::{RunningStats, StatsSummary};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::done::DoneSignal;
use crate::error::TickerError;

/// Current Unix time in fractional seconds
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Builder for creating a PeriodicTicker
pub struct PeriodicTickerBuilder {
    interval_secs: f64,
    name: Option<String>,
    template: Map<String, Value>,
    policy: FailurePolicy,
    error_sink: Option<ErrorSink>,
}

impl PeriodicTickerBuilder {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs,
            name: None,
            template: Map::new(),
            policy: FailurePolicy::default(),
            error_sink: None,
        }
    }

    /// Event name; defaults to `"{interval}sRepeatingTimer"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn template_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template.insert(key.into(), value.into());
        self
    }

    pub fn template(mut self, fields: Map<String, Value>) -> Self {
        self.template = fields;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Validate the interval, start the dispatcher and the timer thread
    #[instrument(name = "ticker_builder_build", skip(self), fields(interval_secs = self.interval_secs))]
    pub fn build(self) -> Result<PeriodicTicker, TickerError> {
        if !self.interval_secs.is_finite() || self.interval_secs < 0.0 {
            return Err(TickerError::invalid_argument(format!(
                "'interval' must be a non-negative number, got {}",
                self.interval_secs
            )));
        }
        let interval = Duration::try_from_secs_f64(self.interval_secs).map_err(|e| {
            TickerError::invalid_argument(format!(
                "'interval' of {}s is out of range: {e}",
                self.interval_secs
            ))
        })?;
        let name = self
            .name
            .unwrap_or_else(|| default_ticker_name(self.interval_secs));

        let mut builder = Dispatcher::builder(name.clone())
            .template(self.template)
            .template_field("interval", self.interval_secs)
            .failure_policy(self.policy);
        if let Some(sink) = self.error_sink {
            builder = builder.error_sink(sink);
        }
        let dispatcher = Arc::new(builder.build()?);

        let done = Arc::new(DoneSignal::new());
        let drift = Arc::new(Mutex::new(RunningStats::default()));

        let timer = {
            let dispatcher = Arc::clone(&dispatcher);
            let done = Arc::clone(&done);
            let drift = Arc::clone(&drift);
            thread::Builder::new()
                .name(format!("{name}-timer"))
                .spawn(move || run_timer(&dispatcher, &done, interval, &drift))
                .map_err(|source| TickerError::Spawn {
                    timer: name.clone(),
                    source,
                })?
        };

        info!(timer = %name, interval_secs = self.interval_secs, "Ticker started");

        Ok(PeriodicTicker {
            dispatcher,
            interval,
            done,
            timer: Mutex::new(Some(timer)),
            drift,
        })
    }
}

/// Timer loop
///
/// First tick after one interval, then one tick per interval until the
/// done signal is set or the dispatcher refuses a post.
#[instrument(name = "ticker_timer_loop", skip_all, fields(timer = %dispatcher.event()))]
fn run_timer(
    dispatcher: &Dispatcher,
    done: &DoneSignal,
    interval: Duration,
    drift: &Mutex<RunningStats>,
) {
    debug!("Timer thread started");

    let mut ticks: u64 = 0;
    let mut wait_started = Instant::now();

    while !done.wait_timeout(interval) {
        let late_ms = wait_started
            .elapsed()
            .saturating_sub(interval)
            .as_secs_f64()
            * 1000.0;

        if let Err(e) = dispatcher.post(unix_timestamp()) {
            debug!(error = %e, "Post rejected, timer thread exiting");
            break;
        }
        ticks += 1;

        drift
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(late_ms);
        observability::record_tick(dispatcher.event(), late_ms);

        wait_started = Instant::now();
    }

    debug!(ticks, "Timer thread stopped");
}

/// Repeating timer that posts the current time to its subscribers
///
/// Composes a [`Dispatcher`]; all subscription and posting calls are
/// delegated to it.
pub struct PeriodicTicker {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    done: Arc<DoneSignal>,
    timer: Mutex<Option<JoinHandle<()>>>,
    drift: Arc<Mutex<RunningStats>>,
}

impl PeriodicTicker {
    /// Create a ticker with a default name
    pub fn new(interval_secs: f64) -> Result<Self, TickerError> {
        PeriodicTickerBuilder::new(interval_secs).build()
    }

    pub fn builder(interval_secs: f64) -> PeriodicTickerBuilder {
        PeriodicTickerBuilder::new(interval_secs)
    }

    /// Create a ticker from a validated configuration
    pub fn from_config(config: &TickerConfig) -> Result<Self, TickerError> {
        let mut builder = PeriodicTickerBuilder::new(config.interval_secs)
            .template(config.template.clone())
            .failure_policy(config.failure_policy);
        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        builder.build()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Event name posted by this ticker
    pub fn name(&self) -> &str {
        self.dispatcher.event()
    }

    /// Underlying dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn subscribe(
        &self,
        name: impl Into<String>,
        callback: EventCallback,
        cookie: Option<Value>,
    ) -> &Self {
        self.dispatcher.subscribe(name, callback, cookie);
        self
    }

    pub fn unsubscribe(&self, name: &str) -> &Self {
        self.dispatcher.unsubscribe(name);
        self
    }

    pub fn add_subscriber(&self, spec: impl Into<SubscriberSpec>) -> &Self {
        self.dispatcher.add_subscriber(spec);
        self
    }

    pub fn remove_subscriber(&self, target: impl Into<SubscriberRef>) -> &Self {
        self.dispatcher.remove_subscriber(target);
        self
    }

    /// Post an extra packet alongside the timer ticks
    pub fn post(&self, payload: impl Into<Value>) -> Result<&Self, DispatcherError> {
        self.dispatcher.post(payload)?;
        Ok(self)
    }

    pub fn post_with(
        &self,
        payload: impl Into<Value>,
        overrides: &Map<String, Value>,
    ) -> Result<&Self, DispatcherError> {
        self.dispatcher.post_with(payload, overrides)?;
        Ok(self)
    }

    /// Ticks keep firing but are dropped until `unpause()`
    pub fn pause(&self) -> &Self {
        self.dispatcher.pause();
        self
    }

    pub fn unpause(&self) -> &Self {
        self.dispatcher.unpause();
        self
    }

    pub fn is_paused(&self) -> bool {
        self.dispatcher.is_paused()
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics()
    }

    /// Lateness of each tick against its requested wait, in milliseconds
    pub fn drift_summary(&self) -> StatsSummary {
        self.drift
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }

    /// Stop ticking, stop the dispatcher, then join the timer thread
    ///
    /// The done signal is set first so the join never waits out an
    /// interval. Later calls are no-ops.
    #[instrument(name = "ticker_stop", skip(self), fields(timer = %self.name()))]
    pub fn stop(&self) {
        self.done.set();
        self.dispatcher.stop();

        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = timer {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Timer thread panicked");
            }
            info!("Ticker stopped");
        }
    }
}

impl Drop for PeriodicTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTicker")
            .field("interval", &self.interval)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
