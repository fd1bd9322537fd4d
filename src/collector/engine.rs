//! Event buffering and delivery engine.
//!
//! All state sits behind one mutex that is never held across an `.await`, so
//! each `track`/`report` call runs its decision logic atomically and only
//! suspends at the network call or the timer wait.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::collector::http::{BeaconDelivery, HttpDelivery, build_client};
use crate::collector::timer::{RetryTimer, TimerState};
use crate::collector::{
    CollectorError, Delivery, DeliveryError, DeliveryOutcome, PageContext, TrackedEvent,
    Visibility,
};
use crate::config::CollectorConfig;

/// Stand-in deadline for a wait that does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `from + wait`, clamped instead of overflowing.
fn deadline_after(from: Instant, wait: Duration) -> Instant {
    from.checked_add(wait)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

struct State {
    buffer: Vec<TrackedEvent>,
    last_send: Instant,
    timer: RetryTimer,
}

struct Inner {
    config: CollectorConfig,
    page: Arc<dyn PageContext>,
    buffered: Arc<dyn Delivery>,
    beacon: Arc<dyn Delivery>,
    runtime: Handle,
    state: Mutex<State>,
}

/// Buffers usage events and delivers them to the ingest endpoint.
///
/// One instance per page session, owned by the host application. Cloning
/// yields another handle to the same collector.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tracker::collector::{Collector, StaticPage};
/// use tracker::config::CollectorConfig;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
/// let collector = Collector::new(CollectorConfig::new("http://localhost:8001/track"), page)?;
///
/// collector.track("view", &["hero"]);
/// collector.track("click-link", &[]); // flushed through the beacon
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("endpoint", &self.inner.config.endpoint)
            .field("buffered", &self.buffered_len())
            .field("timer", &self.timer_state())
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Create a collector delivering over HTTP to `config.endpoint`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `CollectorError` if the configuration is invalid, the HTTP
    /// client cannot be built, or no runtime is available.
    pub fn new(
        config: CollectorConfig,
        page: Arc<dyn PageContext>,
    ) -> Result<Self, CollectorError> {
        config
            .validate()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        let client = build_client(config.request_timeout)?;
        let buffered = Arc::new(HttpDelivery::new(client.clone(), config.endpoint.clone()));
        let beacon = Arc::new(BeaconDelivery::new(client, config.endpoint.clone()));

        Self::with_delivery(config, page, buffered, beacon)
    }

    /// Create a collector with custom delivery strategies.
    ///
    /// `buffered` carries the normal path and is retried on failure; `beacon`
    /// carries the unload flush and is never retried.
    pub fn with_delivery(
        config: CollectorConfig,
        page: Arc<dyn PageContext>,
        buffered: Arc<dyn Delivery>,
        beacon: Arc<dyn Delivery>,
    ) -> Result<Self, CollectorError> {
        config
            .validate()
            .map_err(|e| CollectorError::Config(e.to_string()))?;
        let runtime = Handle::try_current()?;

        tracing::debug!(
            endpoint = %config.endpoint,
            buffered = buffered.name(),
            beacon = beacon.name(),
            "Collector created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                page,
                buffered,
                beacon,
                runtime,
                state: Mutex::new(State {
                    buffer: Vec::new(),
                    last_send: Instant::now(),
                    timer: RetryTimer::new(),
                }),
            }),
        })
    }

    /// Record an event with the current page URL, title and time.
    ///
    /// The navigation-intent event flushes everything through the beacon;
    /// any other event goes through the send policy. Never fails.
    pub fn track(&self, event: &str, tags: &[&str]) {
        let captured = TrackedEvent::capture(
            event,
            tags.iter().map(|t| (*t).to_string()).collect(),
            self.inner.page.url(),
            self.inner.page.title(),
        );
        self.inner.lock().buffer.push(captured);

        if event == self.inner.config.navigation_event {
            self.inner.flush_on_unload();
        } else {
            self.inner.report(false);
        }
    }

    /// Whether the send policy allows a send right now.
    pub fn should_send(&self) -> bool {
        self.inner.should_send(&self.inner.lock())
    }

    /// Send the buffer now if the policy (or `force`) allows it, otherwise
    /// schedule the next attempt.
    pub fn report(&self, force: bool) {
        self.inner.report(force);
    }

    /// Hand the whole buffer to the beacon without waiting for a result.
    pub fn flush_on_unload(&self) {
        self.inner.flush_on_unload();
    }

    /// React to a page visibility change.
    pub fn visibility_changed(&self, visibility: Visibility) {
        if visibility == Visibility::Hidden {
            self.inner.flush_on_unload();
        }
    }

    /// Observe a visibility channel, flushing on every transition to hidden.
    ///
    /// The observer stops when the sender is dropped or the collector is gone.
    pub fn watch_visibility(&self, mut rx: watch::Receiver<Visibility>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut previous = *rx.borrow_and_update();
        self.inner.runtime.spawn(async move {
            while rx.changed().await.is_ok() {
                let current = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if current == Visibility::Hidden && previous != Visibility::Hidden {
                    inner.flush_on_unload();
                }
                previous = current;
            }
        })
    }

    /// Snapshot of the events awaiting delivery.
    pub fn buffered(&self) -> Vec<TrackedEvent> {
        self.inner.lock().buffer.clone()
    }

    /// Number of events awaiting delivery.
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Whether a deferred report is pending.
    pub fn timer_state(&self) -> TimerState {
        self.inner.lock().timer.state()
    }

    /// The collector's configuration.
    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }

    #[cfg(test)]
    fn enqueue(&self, event: TrackedEvent) {
        self.inner.lock().buffer.push(event);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_send(&self, state: &State) -> bool {
        if state.buffer.is_empty() {
            return false;
        }
        state.buffer.len() >= self.config.batch_size
            || state.last_send.elapsed() >= self.config.send_interval
    }

    fn report(self: &Arc<Self>, force: bool) {
        let mut state = self.lock();
        let send = force || self.should_send(&state);

        if !send {
            if !state.buffer.is_empty() {
                // Land the next attempt one full interval after the last send.
                let wait = deadline_after(state.last_send, self.config.send_interval)
                    .saturating_duration_since(Instant::now());
                self.schedule(&mut state, wait);
            }
            return;
        }

        if state.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut state.buffer);
        state.last_send = Instant::now();
        tracing::debug!(
            count = batch.len(),
            delivery = self.buffered.name(),
            forced = force,
            "Sending batch"
        );
        let delivery = self.buffered.deliver(batch.clone());
        drop(state);

        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            if let DeliveryOutcome::Failed(error) = delivery.await
                && let Some(inner) = weak.upgrade()
            {
                inner.restore(batch, &error);
            }
        });
    }

    /// Put a failed batch back in front of newer events and arm a retry.
    fn restore(self: &Arc<Self>, batch: Vec<TrackedEvent>, error: &DeliveryError) {
        let mut state = self.lock();
        let newer = std::mem::replace(&mut state.buffer, batch);
        state.buffer.extend(newer);

        tracing::warn!(
            error = %error,
            buffered = state.buffer.len(),
            retry_ms = self.config.retry_delay.as_millis() as u64,
            "Delivery failed, events returned to buffer"
        );
        self.schedule(&mut state, self.config.retry_delay);
    }

    fn flush_on_unload(&self) {
        let mut state = self.lock();
        if state.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut state.buffer);
        let count = batch.len();
        let delivery = self.beacon.deliver(batch);
        drop(state);

        self.runtime.spawn(async move {
            // Nothing observes the outcome; the page is already going away.
            let _ = delivery.await;
        });
        tracing::debug!(count, delivery = self.beacon.name(), "Unload flush dispatched");
    }

    fn schedule(self: &Arc<Self>, state: &mut State, wait: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let deadline = deadline_after(Instant::now(), wait);
        let runtime = &self.runtime;

        state.timer.reschedule(|generation| {
            runtime
                .spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire(generation);
                    }
                })
                .abort_handle()
        });
        tracing::trace!(wait_ms = wait.as_millis() as u64, "Report scheduled");
    }

    fn fire(self: &Arc<Self>, generation: u64) {
        let current = self.lock().timer.fire(generation);
        if current {
            self.report(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{DeliveryFuture, StaticPage};
    use chrono::Local;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    enum Step {
        Outcome(DeliveryOutcome),
        Gate(oneshot::Receiver<DeliveryOutcome>),
    }

    /// Records every batch and answers from a script (default: delivered).
    #[derive(Default)]
    struct ScriptedDelivery {
        calls: Mutex<Vec<Vec<TrackedEvent>>>,
        delivered: Mutex<Vec<String>>,
        script: Mutex<VecDeque<Step>>,
    }

    impl ScriptedDelivery {
        fn fail_next(&self) {
            self.script
                .lock()
                .unwrap()
                .push_back(Step::Outcome(DeliveryOutcome::Failed(
                    DeliveryError::Status(503),
                )));
        }

        fn gate_next(&self) -> oneshot::Sender<DeliveryOutcome> {
            let (tx, rx) = oneshot::channel();
            self.script.lock().unwrap().push_back(Step::Gate(rx));
            tx
        }

        fn calls(&self) -> Vec<Vec<TrackedEvent>> {
            self.calls.lock().unwrap().clone()
        }

        /// Names of events in batches answered `Delivered` right away.
        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl Delivery for ScriptedDelivery {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn deliver(&self, batch: Vec<TrackedEvent>) -> DeliveryFuture {
            let step = self.script.lock().unwrap().pop_front();
            if matches!(step, None | Some(Step::Outcome(DeliveryOutcome::Delivered))) {
                self.delivered
                    .lock()
                    .unwrap()
                    .extend(batch.iter().map(|e| e.event.clone()));
            }
            self.calls.lock().unwrap().push(batch);
            match step {
                Some(Step::Outcome(outcome)) => Box::pin(async move { outcome }),
                Some(Step::Gate(rx)) => {
                    Box::pin(async move { rx.await.unwrap_or(DeliveryOutcome::Delivered) })
                }
                None => Box::pin(async { DeliveryOutcome::Delivered }),
            }
        }
    }

    struct Harness {
        collector: Collector,
        page: Arc<StaticPage>,
        buffered: Arc<ScriptedDelivery>,
        beacon: Arc<ScriptedDelivery>,
    }

    fn harness() -> Harness {
        harness_with(CollectorConfig::new("http://localhost:8001/track"))
    }

    fn harness_with(config: CollectorConfig) -> Harness {
        let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
        let buffered = Arc::new(ScriptedDelivery::default());
        let beacon = Arc::new(ScriptedDelivery::default());
        let collector = Collector::with_delivery(
            config,
            page.clone(),
            buffered.clone(),
            beacon.clone(),
        )
        .unwrap();

        Harness {
            collector,
            page,
            buffered,
            beacon,
        }
    }

    /// Let spawned delivery tasks run without moving the clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn names(batch: &[TrackedEvent]) -> Vec<&str> {
        batch.iter().map(|e| e.event.as_str()).collect()
    }

    fn sample(name: &str) -> TrackedEvent {
        TrackedEvent::at(
            name,
            vec![],
            "https://example.com/",
            "Home",
            Local::now().fixed_offset(),
        )
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_endpoint() {
        let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
        let result = Collector::new(CollectorConfig::new("not a url"), page);
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_new_requires_runtime() {
        let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
        let result = Collector::with_delivery(
            CollectorConfig::new("http://localhost:8001/track"),
            page,
            Arc::new(ScriptedDelivery::default()),
            Arc::new(ScriptedDelivery::default()),
        );
        assert!(matches!(result, Err(CollectorError::Runtime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_send_policy() {
        let h = harness();
        assert!(!h.collector.should_send());

        h.collector.enqueue(sample("a"));
        assert!(!h.collector.should_send());
        h.collector.enqueue(sample("b"));
        assert!(!h.collector.should_send());
        h.collector.enqueue(sample("c"));
        assert!(h.collector.should_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_send_time_trigger() {
        let h = harness();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        // Empty buffer never sends, however long ago the last send was.
        assert!(!h.collector.should_send());

        h.collector.enqueue(sample("a"));
        assert!(h.collector.should_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_send_time_boundary() {
        let h = harness();
        h.collector.enqueue(sample("a"));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!h.collector.should_send());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(h.collector.should_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_event_uses_beacon() {
        let h = harness();
        h.collector.track("click-link", &[]);

        assert_eq!(h.collector.buffered_len(), 0);
        let beacons = h.beacon.calls();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].len(), 1);
        assert_eq!(beacons[0][0].event, "click-link");
        assert!(h.buffered.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_event_carries_pending_events() {
        let h = harness();
        h.collector.track("view", &[]);
        h.collector.track("scroll", &[]);
        h.collector.track("click-link", &["nav"]);

        let beacons = h.beacon.calls();
        assert_eq!(beacons.len(), 1);
        assert_eq!(names(&beacons[0]), vec!["view", "scroll", "click-link"]);
        assert_eq!(beacons[0][2].tags, vec!["nav".to_string()]);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(h.buffered.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_events_send_once() {
        let h = harness();
        h.collector.track("view", &["1"]);
        h.collector.track("view", &["2"]);
        h.collector.track("view", &["3"]);

        let calls = h.buffered.calls();
        assert_eq!(calls.len(), 1);
        let tags: Vec<_> = calls[0].iter().map(|e| e.tags[0].as_str()).collect();
        assert_eq!(tags, vec!["1", "2", "3"]);
        assert_eq!(h.collector.buffered_len(), 0);

        // The timer armed by the first two calls fires on an empty buffer.
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(h.buffered.calls().len(), 1);
        assert_eq!(h.collector.timer_state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_event_sent_after_interval() {
        let h = harness();
        h.collector.track("scroll", &[]);
        assert!(h.buffered.calls().is_empty());
        assert_eq!(h.collector.timer_state(), TimerState::Scheduled);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(h.buffered.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let calls = h.buffered.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(names(&calls[0]), vec!["scroll"]);
        assert_eq!(h.collector.timer_state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_quick_reports_single_timer() {
        let h = harness();
        h.collector.track("a", &[]);
        h.collector.track("b", &[]);
        assert_eq!(h.collector.timer_state(), TimerState::Scheduled);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        let calls = h.buffered.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(names(&calls[0]), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_report_bypasses_throttle() {
        let h = harness();
        h.collector.track("scroll", &[]);
        assert!(h.buffered.calls().is_empty());

        h.collector.report(true);
        assert_eq!(h.buffered.calls().len(), 1);
        assert_eq!(h.collector.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_report_on_empty_buffer() {
        let h = harness();
        h.collector.report(true);
        assert!(h.buffered.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_restores_before_newer_events() {
        let h = harness();
        let gate = h.buffered.gate_next();

        h.collector.track("a", &[]);
        h.collector.track("b", &[]);
        h.collector.track("c", &[]);
        assert_eq!(h.buffered.calls().len(), 1);

        // Tracked while the first batch is in flight.
        h.collector.track("d", &[]);
        assert_eq!(names(&h.collector.buffered()), vec!["d"]);

        gate.send(DeliveryOutcome::Failed(DeliveryError::Status(500)))
            .unwrap();
        settle().await;

        assert_eq!(names(&h.collector.buffered()), vec!["a", "b", "c", "d"]);
        assert_eq!(h.collector.timer_state(), TimerState::Scheduled);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        let calls = h.buffered.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(names(&calls[1]), vec!["a", "b", "c", "d"]);
        assert_eq!(h.collector.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_delivered() {
        let h = harness();
        h.buffered.fail_next();
        h.buffered.fail_next();

        h.collector.track("a", &[]);
        h.collector.track("b", &[]);
        h.collector.track("c", &[]);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let calls = h.buffered.calls();
        assert_eq!(calls.len(), 3);
        for batch in &calls {
            assert_eq!(names(batch), vec!["a", "b", "c"]);
        }
        assert_eq!(h.collector.buffered_len(), 0);
        assert_eq!(h.collector.timer_state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_events_match_tracked() {
        let h = harness();
        h.buffered.fail_next();

        h.collector.track("e0", &[]);
        h.collector.track("e1", &[]);
        h.collector.track("e2", &[]);
        settle().await;
        assert_eq!(h.collector.buffered_len(), 3);

        h.collector.track("e3", &[]);
        h.collector.track("e4", &[]);
        tokio::time::sleep(Duration::from_millis(3000)).await;

        let calls = h.buffered.calls();
        // First call failed; everything after it was delivered.
        let delivered: Vec<&str> = calls[1..].iter().flat_map(|b| names(b)).collect();
        assert_eq!(delivered, vec!["e0", "e1", "e2", "e3", "e4"]);
        assert_eq!(h.collector.buffered_len(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Track,
        FailNext,
        Force,
        Advance(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => Just(Op::Track),
            2 => Just(Op::FailNext),
            1 => Just(Op::Force),
            2 => (1_u64..1500).prop_map(Op::Advance),
        ]
    }

    /// Play `ops` on a paused clock, then let every pending retry run out.
    ///
    /// With `settle_each` the runtime drains spawned sends after every op, so
    /// at most one batch is in flight. Without it, tracks and forced reports
    /// can start new sends while an earlier batch is still unresolved.
    /// Returns the tracked and the delivered event names.
    fn play(ops: &[Op], settle_each: bool) -> (Vec<String>, Vec<String>, usize) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = harness();
            let mut tracked = Vec::new();

            for op in ops {
                match op {
                    Op::Track => {
                        let name = format!("e{}", tracked.len());
                        h.collector.track(&name, &[]);
                        tracked.push(name);
                    }
                    Op::FailNext => h.buffered.fail_next(),
                    Op::Force => h.collector.report(true),
                    Op::Advance(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                }
                if settle_each {
                    settle().await;
                }
            }

            // Each round lets one retry fire and consume one scripted failure.
            for _ in 0..ops.len() + 3 {
                tokio::time::sleep(Duration::from_millis(1100)).await;
            }
            settle().await;

            (tracked, h.buffered.delivered(), h.collector.buffered_len())
        })
    }

    proptest! {
        #[test]
        fn test_delivered_in_order_for_any_script(
            ops in prop::collection::vec(op_strategy(), 0..40)
        ) {
            let (tracked, delivered, left) = play(&ops, true);
            prop_assert_eq!(left, 0);
            prop_assert_eq!(delivered, tracked);
        }

        #[test]
        fn test_delivered_exactly_once_with_overlapping_sends(
            ops in prop::collection::vec(op_strategy(), 0..40)
        ) {
            let (mut tracked, mut delivered, left) = play(&ops, false);
            prop_assert_eq!(left, 0);
            tracked.sort();
            delivered.sort();
            prop_assert_eq!(delivered, tracked);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_clamps() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_millis(5)),
            now + Duration::from_millis(5)
        );
        assert!(deadline_after(now, Duration::MAX) >= now + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_long_interval_schedules() {
        let day = Duration::from_secs(24 * 60 * 60);
        let h = harness_with(
            CollectorConfig::new("http://localhost:8001/track")
                .with_send_interval(day)
                .with_retry_delay(day),
        );

        h.collector.track("scroll", &[]);
        assert_eq!(h.collector.timer_state(), TimerState::Scheduled);
        assert!(h.buffered.calls().is_empty());

        tokio::time::sleep(day + Duration::from_millis(1)).await;
        assert_eq!(h.buffered.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_flushes_everything() {
        let h = harness();
        h.collector.track("view", &[]);
        h.collector.track("scroll", &[]);

        h.collector.visibility_changed(Visibility::Hidden);
        assert_eq!(h.collector.buffered_len(), 0);
        let beacons = h.beacon.calls();
        assert_eq!(beacons.len(), 1);
        assert_eq!(names(&beacons[0]), vec!["view", "scroll"]);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(h.buffered.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_and_empty_hidden_do_nothing() {
        let h = harness();
        h.collector.visibility_changed(Visibility::Hidden);
        assert!(h.beacon.calls().is_empty());

        h.collector.track("view", &[]);
        h.collector.visibility_changed(Visibility::Visible);
        assert!(h.beacon.calls().is_empty());
        assert_eq!(h.collector.buffered_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_visibility_transitions() {
        let h = harness();
        let (tx, rx) = watch::channel(Visibility::Visible);
        let observer = h.collector.watch_visibility(rx);

        h.collector.track("view", &[]);
        tx.send(Visibility::Hidden).unwrap();
        settle().await;
        assert_eq!(h.beacon.calls().len(), 1);

        // Still hidden: not a transition.
        h.collector.track("scroll", &[]);
        tx.send(Visibility::Hidden).unwrap();
        settle().await;
        assert_eq!(h.beacon.calls().len(), 1);

        tx.send(Visibility::Visible).unwrap();
        settle().await;
        tx.send(Visibility::Hidden).unwrap();
        settle().await;
        let beacons = h.beacon.calls();
        assert_eq!(beacons.len(), 2);
        assert_eq!(names(&beacons[1]), vec!["scroll"]);

        drop(tx);
        observer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_capture_page_context() {
        let h = harness();
        h.collector.track("view", &[]);
        h.page.navigate("https://example.com/pricing", "Pricing");
        h.collector.track("view", &["plan"]);

        let buffered = h.collector.buffered();
        assert_eq!(buffered[0].url, "https://example.com/");
        assert_eq!(buffered[0].title, "Home");
        assert_eq!(buffered[1].url, "https://example.com/pricing");
        assert_eq!(buffered[1].title, "Pricing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_navigation_event() {
        let page = Arc::new(StaticPage::new("https://example.com/", "Home"));
        let buffered = Arc::new(ScriptedDelivery::default());
        let beacon = Arc::new(ScriptedDelivery::default());
        let collector = Collector::with_delivery(
            CollectorConfig::new("http://localhost:8001/track").with_navigation_event("leave"),
            page,
            buffered.clone(),
            beacon.clone(),
        )
        .unwrap();

        collector.track("click-link", &[]);
        assert!(beacon.calls().is_empty());
        collector.track("leave", &[]);
        assert_eq!(beacon.calls().len(), 1);
        assert_eq!(beacon.calls()[0].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_collector_timer_is_noop() {
        let h = harness();
        h.collector.track("scroll", &[]);
        let buffered = h.buffered.clone();
        drop(h);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(buffered.calls().is_empty());
    }
}
