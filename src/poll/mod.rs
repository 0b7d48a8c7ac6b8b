//! Polling client with change detection.
//!
//! A [`Poller`] refetches a JSON source on a fixed interval and invokes its
//! callback only when the payload differs from the last one seen. Fetches
//! are single-flight: a tick that comes due while a fetch is still
//! outstanding is skipped rather than overlapped, so responses can never be
//! applied out of order.

pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use http::HttpFetcher;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

/// Upper bound on a single fetch. A hung request counts as a failure, so
/// the next tick can fetch again.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// A source of JSON snapshots.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Value, PollError>;
}

/// Serialize with object keys sorted at every level, so that two equal
/// values always produce identical bytes regardless of map ordering.
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                let mut out = serde_json::Map::new();
                for (k, v) in ordered {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Tracks the last serialized payload (the baseline).
#[derive(Debug, Default)]
pub struct ChangeDetector {
    baseline: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as the new baseline. Returns true only when a previous
    /// baseline existed and differs; the first observation is silent.
    pub fn observe(&mut self, value: &Value) -> bool {
        let serialized = canonical_json(value);
        let changed = matches!(&self.baseline, Some(prev) if *prev != serialized);
        self.baseline = Some(serialized);
        changed
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Baseline,
    Unchanged,
    Changed,
    Failed,
}

/// One fetch-and-compare step, bounded by `timeout`. Failures and timeouts
/// leave the baseline untouched.
pub async fn poll_once<F, C>(
    fetcher: &F,
    timeout: Duration,
    detector: &mut ChangeDetector,
    on_update: &C,
) -> PollOutcome
where
    F: Fetcher + ?Sized,
    C: Fn(Value) + ?Sized,
{
    let result = match tokio::time::timeout(timeout, fetcher.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(PollError::Timeout(timeout)),
    };
    match result {
        Ok(value) => {
            let first = detector.baseline().is_none();
            if detector.observe(&value) {
                on_update(value);
                PollOutcome::Changed
            } else if first {
                PollOutcome::Baseline
            } else {
                PollOutcome::Unchanged
            }
        }
        Err(e @ PollError::Timeout(_)) => {
            tracing::warn!(error = %e, "Poll fetch hung; keeping previous baseline");
            PollOutcome::Failed
        }
        Err(e) => {
            tracing::debug!(error = %e, "Poll fetch failed; keeping previous baseline");
            PollOutcome::Failed
        }
    }
}

pub type UpdateCallback = Arc<dyn Fn(Value) + Send + Sync>;

pub struct Poller<F: Fetcher> {
    fetcher: Arc<F>,
    interval: Duration,
    fetch_timeout: Duration,
    on_update: UpdateCallback,
    refetch: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl<F: Fetcher> Poller<F> {
    /// Create a disabled poller. Call [`Poller::set_enabled`] from inside a
    /// tokio runtime to start it.
    pub fn new(
        fetcher: F,
        interval: Duration,
        on_update: impl Fn(Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            interval,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            on_update: Arc::new(on_update),
            refetch: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// Bound each fetch to `timeout`. Takes effect on the next enable.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enabling fetches immediately and then every interval, starting from a
    /// fresh baseline. Disabling cancels the timer and any in-flight fetch.
    pub fn set_enabled(&mut self, enabled: bool) {
        match (enabled, self.task.is_some()) {
            (true, false) => {
                self.refetch = Arc::new(Notify::new());
                self.task = Some(tokio::spawn(run(
                    self.fetcher.clone(),
                    self.interval,
                    self.fetch_timeout,
                    self.on_update.clone(),
                    self.refetch.clone(),
                )));
            }
            (false, true) => {
                if let Some(task) = self.task.take() {
                    task.abort();
                }
            }
            _ => {}
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.task.is_some()
    }

    /// Request a fetch now. Coalesces with one already in flight; no-op when
    /// disabled.
    pub fn refetch(&self) {
        if self.task.is_some() {
            self.refetch.notify_one();
        }
    }
}

impl<F: Fetcher> Drop for Poller<F> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<F: Fetcher>(
    fetcher: Arc<F>,
    interval: Duration,
    fetch_timeout: Duration,
    on_update: UpdateCallback,
    refetch: Arc<Notify>,
) {
    let mut detector = ChangeDetector::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refetch.notified() => {}
        }
        let outcome = poll_once(
            fetcher.as_ref(),
            fetch_timeout,
            &mut detector,
            on_update.as_ref(),
        )
        .await;
        tracing::trace!(?outcome, "Poll tick");
    }
}
