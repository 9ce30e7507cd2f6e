//! Change notification
//!
//! Writes publish their logical key. The first publish after a flush asks the
//! [`FlushScheduler`] for one deferred flush; later publishes only add keys to
//! the pending batch. The flush hands every matching subscriber one call for
//! the whole batch.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

/// Subscriber callback
pub type Callback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Deferred flush job handed to a scheduler
pub type FlushJob = Box<dyn FnOnce() + Send + 'static>;

/// Unique identifier of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flush scheduling
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a flush "soon": after the current burst of writes, not inside it
pub trait FlushScheduler: Send + Sync {
    /// Arrange for `job` to run once
    fn schedule(&self, job: FlushJob);
}

/// Schedules flushes as tokio tasks that sleep for a short window first.
///
/// Writes landing inside the window join the pending batch, on current-thread
/// and multi-thread runtimes alike. Outside a runtime the flush runs inline,
/// so every write notifies on its own; hosts without tokio that want batching
/// use [`ManualScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct TokioScheduler {
    window: Duration,
}

impl TokioScheduler {
    /// Window used by [`TokioScheduler::default`]
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(4);

    /// Scheduler collecting writes for `window` before each flush
    pub fn with_window(window: Duration) -> Self {
        Self { window }
    }

    /// The collection window
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }
}

impl FlushScheduler for TokioScheduler {
    fn schedule(&self, job: FlushJob) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let window = self.window;
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    job();
                });
            }
            Err(_) => job(),
        }
    }
}

/// Queues flushes until the host calls [`run_pending`](ManualScheduler::run_pending)
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<Vec<FlushJob>>>,
}

impl ManualScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued flushes
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued flush; returns how many ran
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queue.lock());
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, job: FlushJob) {
        self.queue.lock().push(job);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifier
// ─────────────────────────────────────────────────────────────────────────────

struct Subscription {
    callback: Callback,
    /// `None` watches every key
    keys: Option<HashSet<String>>,
}

impl Subscription {
    fn matches(&self, pending: &HashSet<String>) -> bool {
        match &self.keys {
            None => true,
            Some(keys) => keys.iter().any(|key| pending.contains(key)),
        }
    }
}

#[derive(Default)]
struct State {
    pending: HashSet<String>,
    scheduled: bool,
    subscriptions: IndexMap<SubscriptionId, Subscription>,
}

struct Inner {
    state: Mutex<State>,
    scheduler: Arc<dyn FlushScheduler>,
}

impl Inner {
    fn flush(&self) {
        let (batch, due) = {
            let mut state = self.state.lock();
            state.scheduled = false;
            let batch = std::mem::take(&mut state.pending);
            let due: Vec<(SubscriptionId, Callback)> = state
                .subscriptions
                .iter()
                .filter(|(_, sub)| sub.matches(&batch))
                .map(|(id, sub)| (*id, sub.callback.clone()))
                .collect();
            (batch, due)
        };

        tracing::debug!(
            keys = batch.len(),
            subscribers = due.len(),
            "flushing change notifications"
        );
        for (id, callback) in due {
            invoke(id, &callback);
        }
    }
}

fn invoke(id: SubscriptionId, callback: &Callback) {
    match catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(subscription = %id, error = %e, "subscriber failed");
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(subscription = %id, panic = %message, "subscriber panicked");
        }
    }
}

/// Debounced, key-filtered publish/subscribe
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl ChangeNotifier {
    /// Create a notifier that defers flushes through `scheduler`
    pub fn new(scheduler: Arc<dyn FlushScheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                scheduler,
            }),
        }
    }

    /// Mark `key` as written
    pub fn publish(&self, key: &str) {
        self.publish_all([key]);
    }

    /// Mark several keys as written in one batch
    pub fn publish_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return;
        }
        let schedule = {
            let mut state = self.inner.state.lock();
            state.pending.extend(keys.map(str::to_string));
            !std::mem::replace(&mut state.scheduled, true)
        };
        if schedule {
            // the lock is released: inline schedulers flush immediately
            let inner = self.inner.clone();
            self.inner.scheduler.schedule(Box::new(move || inner.flush()));
        }
    }

    /// Register `callback`, invoking it once right away.
    ///
    /// `keys` limits which writes trigger it; `None` watches every key. An
    /// empty list registers nothing and returns `None`.
    pub fn subscribe<F>(&self, callback: F, keys: Option<&[&str]>) -> Option<Unsubscribe>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let id = SubscriptionId::new();
        invoke(id, &callback);

        let keys = keys.map(|keys| keys.iter().map(|k| (*k).to_string()).collect::<HashSet<_>>());
        if keys.as_ref().is_some_and(HashSet::is_empty) {
            return None;
        }

        self.inner
            .state
            .lock()
            .subscriptions
            .insert(id, Subscription { callback, keys });
        Some(Unsubscribe {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ChangeNotifier")
            .field("subscriptions", &state.subscriptions.len())
            .field("pending", &state.pending.len())
            .field("scheduled", &state.scheduled)
            .finish()
    }
}

/// Handle removing one subscription.
///
/// Dropping the handle keeps the subscription alive.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    id: SubscriptionId,
    inner: Weak<Inner>,
}

impl Unsubscribe {
    /// The subscription this handle removes
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription; later calls do nothing
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state.lock().subscriptions.shift_remove(&self.id);
        }
    }
}
