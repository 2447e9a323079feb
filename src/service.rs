//! Correlation service
//!
//! Keeps the published [`ResultSet`] for the active window current. Every
//! trigger (window change, store change inside the window, explicit refresh)
//! starts a fresh computation on the blocking pool and cancels the one in
//! flight. Results are published atomically through a `watch` channel and
//! only when they belong to the most recent trigger.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::CorrelationError;
use crate::orchestrator::CorrelationEngine;
use crate::store::DiaryStore;
use crate::types::{DateWindow, ResultSet, StoreChange};

/// State observed by the presentation layer
#[derive(Debug, Clone)]
pub struct CorrelationSnapshot {
    /// Window the current trigger computes for
    pub window: Option<DateWindow>,
    /// Most recently published results
    pub result_set: Arc<ResultSet>,
    /// A computation for `generation` is in flight
    pub is_loading: bool,
    /// Trigger counter; increases with every recomputation request
    pub generation: u64,
    /// Identifier of the pass that produced `result_set`
    pub run_id: Option<Uuid>,
    /// When `result_set` was published
    pub computed_at: Option<DateTime<Utc>>,
}

impl Default for CorrelationSnapshot {
    fn default() -> Self {
        Self {
            window: None,
            result_set: Arc::new(ResultSet::empty(None)),
            is_loading: false,
            generation: 0,
            run_id: None,
            computed_at: None,
        }
    }
}

impl CorrelationSnapshot {
    /// Finished computing and nothing to show
    pub fn is_not_enough_data(&self) -> bool {
        !self.is_loading && self.result_set.is_empty()
    }
}

#[derive(Debug, Default)]
struct Control {
    window: Option<DateWindow>,
    in_flight: Option<CancellationToken>,
}

struct Shared<S> {
    store: S,
    engine: CorrelationEngine,
    runtime: Handle,
    state: watch::Sender<CorrelationSnapshot>,
    latest: AtomicU64,
    control: Mutex<Control>,
    shutdown: CancellationToken,
}

/// Async driver around [`CorrelationEngine`]
pub struct CorrelationService<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for CorrelationService<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: DiaryStore + 'static> CorrelationService<S> {
    /// Create a service bound to the current tokio runtime
    pub fn new(store: S, config: EngineConfig) -> Result<Self, CorrelationError> {
        let runtime = Handle::try_current().map_err(|e| CorrelationError::Runtime(e.to_string()))?;
        Self::with_runtime(store, config, runtime)
    }

    /// Create a service that spawns its work on `runtime`
    pub fn with_runtime(
        store: S,
        config: EngineConfig,
        runtime: Handle,
    ) -> Result<Self, CorrelationError> {
        let engine = CorrelationEngine::with_config(config)?;
        let (state, _) = watch::channel(CorrelationSnapshot::default());
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                engine,
                runtime,
                state,
                latest: AtomicU64::new(0),
                control: Mutex::new(Control::default()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Make `window` the active window and return a receiver of snapshots.
    ///
    /// Recomputes only when the window differs from the active one.
    pub fn observe(&self, window: DateWindow) -> watch::Receiver<CorrelationSnapshot> {
        self.set_window(window);
        self.subscribe()
    }

    pub fn subscribe(&self) -> watch::Receiver<CorrelationSnapshot> {
        self.shared.state.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> CorrelationSnapshot {
        self.shared.state.borrow().clone()
    }

    pub fn window(&self) -> Option<DateWindow> {
        self.shared.control().window
    }

    /// Switch the active window; no-op if unchanged
    pub fn set_window(&self, window: DateWindow) {
        let mut control = self.shared.control();
        if control.window == Some(window) {
            return;
        }
        control.window = Some(window);
        self.shared.trigger(&mut control, true);
    }

    /// Recompute for the active window
    pub fn refresh(&self) {
        let mut control = self.shared.control();
        self.shared.trigger(&mut control, false);
    }

    /// React to a store change. Returns whether a recomputation was started.
    pub fn notify_change(&self, change: &StoreChange) -> bool {
        let mut control = self.shared.control();
        let Some(window) = control.window else {
            return false;
        };
        if !change.affects(&window) {
            return false;
        }
        debug!("store change {change:?} affects {}", window.label());
        self.shared.trigger(&mut control, false)
    }

    /// Consume a store change channel until it closes or the service shuts down
    pub fn listen(&self, mut changes: broadcast::Receiver<StoreChange>) -> JoinHandle<()> {
        let service = self.clone();
        let shutdown = self.shared.shutdown.clone();
        self.shared.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => {
                            service.notify_change(&change);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("missed {skipped} store changes; recomputing");
                            service.refresh();
                        }
                        Err(RecvError::Closed) => {
                            debug!("store change channel closed");
                            break;
                        }
                    },
                }
            }
        })
    }

    /// Cancel the in-flight computation and stop listening for changes
    pub fn shutdown(&self) {
        info!("correlation service shutting down");
        self.shared.shutdown.cancel();
        if let Some(token) = self.shared.control().in_flight.take() {
            token.cancel();
        }
    }
}

impl<S> Shared<S> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: DiaryStore + 'static> Shared<S> {
    /// Start a computation for the active window, superseding any in flight.
    ///
    /// Runs under the control lock so generations and loading flags are
    /// published in trigger order.
    fn trigger(self: &Arc<Self>, control: &mut Control, window_changed: bool) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let Some(window) = control.window else {
            return false;
        };

        if let Some(previous) = control.in_flight.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        control.in_flight = Some(token.clone());

        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|snapshot| {
            snapshot.generation = generation;
            snapshot.is_loading = true;
            if window_changed {
                snapshot.window = Some(window);
                snapshot.result_set = Arc::new(ResultSet::empty(Some(window)));
                snapshot.run_id = None;
                snapshot.computed_at = None;
            }
        });
        debug!("correlation generation {generation} triggered for {}", window.label());

        let shared = Arc::clone(self);
        self.runtime
            .spawn(async move { shared.compute(generation, window, token).await });
        true
    }

    async fn compute(self: Arc<Self>, generation: u64, window: DateWindow, token: CancellationToken) {
        let started = Instant::now();
        let worker = {
            let shared = Arc::clone(&self);
            let token = token.clone();
            tokio::task::spawn_blocking(move || {
                shared
                    .engine
                    .compute_all_cancellable(&shared.store, &window, &token)
            })
        };

        let joined = tokio::select! {
            joined = worker => joined,
            _ = token.cancelled() => {
                debug!("correlation generation {generation} superseded");
                return;
            }
        };

        let result_set = match joined {
            Ok(Ok(result_set)) => result_set,
            Ok(Err(CorrelationError::Cancelled)) => {
                debug!("correlation generation {generation} cancelled");
                return;
            }
            Ok(Err(e)) => {
                error!("correlation generation {generation} failed: {e}");
                ResultSet::empty(Some(window))
            }
            Err(e) => {
                error!("correlation worker for generation {generation} failed: {e}");
                ResultSet::empty(Some(window))
            }
        };

        let elapsed_ms = started.elapsed().as_millis();
        self.publish(generation, window, result_set, elapsed_ms);
    }

    /// Replace the published result set if `generation` is still the latest
    fn publish(&self, generation: u64, window: DateWindow, result_set: ResultSet, elapsed_ms: u128) {
        let count = result_set.len();
        let run_id = Uuid::new_v4();
        let latest = &self.latest;
        let published = self.state.send_if_modified(|snapshot| {
            if snapshot.generation != generation || latest.load(Ordering::SeqCst) != generation {
                return false;
            }
            snapshot.window = Some(window);
            snapshot.result_set = Arc::new(result_set);
            snapshot.is_loading = false;
            snapshot.run_id = Some(run_id);
            snapshot.computed_at = Some(Utc::now());
            true
        });

        if published {
            info!(
                "published {count} correlations for {} (generation {generation}, run {run_id}, {elapsed_ms}ms)",
                window.label()
            );
        } else {
            debug!("discarded stale correlations for generation {generation}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{ChangeAction, HabitDefinition, HabitKind, MoodLevel, MoodRecord, ProgressRecord};
    use chrono::NaiveDate;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn sample_store() -> Arc<InMemoryStore> {
        let _ = env_logger::builder().is_test(true).try_init();

        let store = Arc::new(InMemoryStore::new());
        store.add_habit(HabitDefinition::new("run", "Running", "figure.run", HabitKind::Binary));
        store.add_habit(HabitDefinition::new("yoga", "Yoga", "figure.yoga", HabitKind::Graded));

        // April: running tracks mood; May: yoga tracks mood, running has 2 days
        for d in 1..=5u32 {
            let mood = MoodLevel::from_value((d - 1) as u8).unwrap();
            store.set_mood(date(4, d), mood);
            store.set_progress("run", date(4, d), Some(u8::from(d > 2)));

            store.set_mood(date(5, d), mood);
            store.set_progress("yoga", date(5, d), Some((d - 1) as u8));
            if d <= 2 {
                store.set_progress("run", date(5, d), Some(1));
            }
        }
        store
    }

    async fn settled(
        rx: &mut watch::Receiver<CorrelationSnapshot>,
        generation: u64,
    ) -> CorrelationSnapshot {
        tokio::time::timeout(
            TIMEOUT,
            rx.wait_for(|s| s.generation == generation && !s.is_loading),
        )
        .await
        .expect("timed out waiting for results")
        .expect("service dropped")
        .clone()
    }

    #[tokio::test]
    async fn test_observe_publishes_results() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());

        let snapshot = settled(&mut rx, 1).await;
        assert_eq!(snapshot.window, Some(DateWindow::month(2024, 4).unwrap()));
        assert_eq!(snapshot.result_set.len(), 1);
        let run = snapshot.result_set.get("run").unwrap();
        assert_eq!(run.n, 5);
        assert!((run.coefficient.unwrap() - 0.87).abs() < 0.01);
        assert!(snapshot.run_id.is_some());
        assert!(snapshot.computed_at.is_some());
    }

    #[tokio::test]
    async fn test_same_window_does_not_recompute() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let window = DateWindow::month(2024, 4).unwrap();
        let mut rx = service.observe(window);
        settled(&mut rx, 1).await;

        let _rx = service.observe(window);
        assert_eq!(service.snapshot().generation, 1);
    }

    #[tokio::test]
    async fn test_window_change_replaces_results() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());
        settled(&mut rx, 1).await;

        service.set_window(DateWindow::month(2024, 5).unwrap());
        let snapshot = settled(&mut rx, 2).await;
        let ids: Vec<&str> = snapshot.result_set.iter().map(|r| r.habit_id.as_str()).collect();
        assert_eq!(ids, vec!["yoga"]);
        assert_eq!(snapshot.result_set.get("yoga").unwrap().coefficient, Some(1.0));
    }

    #[tokio::test]
    async fn test_store_change_inside_window_recomputes() {
        let store = sample_store();
        let service = CorrelationService::new(Arc::clone(&store), EngineConfig::default()).unwrap();
        let listener = service.listen(store.subscribe());
        let mut rx = service.observe(DateWindow::month(2024, 5).unwrap());
        settled(&mut rx, 1).await;

        // two more running days bring May's running habit to 4 observations
        store.set_progress("run", date(5, 3), Some(0));
        store.set_progress("run", date(5, 4), Some(1));

        let snapshot = tokio::time::timeout(
            TIMEOUT,
            rx.wait_for(|s| !s.is_loading && s.result_set.get("run").is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.result_set.get("run").unwrap().n, 4);
        assert_eq!(snapshot.result_set.len(), 2);

        service.shutdown();
        tokio::time::timeout(TIMEOUT, listener).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_store_change_outside_window_is_ignored() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());
        settled(&mut rx, 1).await;

        let outside = StoreChange::Mood {
            date: date(5, 1),
            action: ChangeAction::Edited,
        };
        assert!(!service.notify_change(&outside));
        assert_eq!(service.snapshot().generation, 1);

        assert!(service.notify_change(&StoreChange::Catalog));
        settled(&mut rx, 2).await;
    }

    #[tokio::test]
    async fn test_empty_window_reports_not_enough_data() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let mut rx = service.observe(DateWindow::month(2023, 1).unwrap());
        let snapshot = settled(&mut rx, 1).await;
        assert!(snapshot.result_set.is_empty());
        assert!(snapshot.is_not_enough_data());
    }

    #[tokio::test]
    async fn test_no_window_no_trigger() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        service.refresh();
        let snapshot = service.snapshot();
        assert_eq!(snapshot.generation, 0);
        assert!(!snapshot.is_loading);
    }

    #[test]
    fn test_requires_runtime() {
        let err = CorrelationService::new(sample_store(), EngineConfig::default()).err();
        assert!(matches!(err, Some(CorrelationError::Runtime(_))));
    }

    /// Store whose reads block until the test opens the gate
    struct GatedStore {
        inner: Arc<InMemoryStore>,
        gate: Arc<Mutex<()>>,
    }

    impl DiaryStore for GatedStore {
        fn mood_records_in_range(
            &self,
            window: &DateWindow,
        ) -> Result<Vec<MoodRecord>, CorrelationError> {
            let _open = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.inner.mood_records_in_range(window)
        }

        fn progress_records_in_range(
            &self,
            habit_id: &str,
            window: &DateWindow,
        ) -> Result<Vec<ProgressRecord>, CorrelationError> {
            self.inner.progress_records_in_range(habit_id, window)
        }

        fn habit_catalog(&self) -> Result<Vec<HabitDefinition>, CorrelationError> {
            self.inner.habit_catalog()
        }
    }

    #[tokio::test]
    async fn test_loading_flag_transitions() {
        let gate = Arc::new(Mutex::new(()));
        let store = GatedStore {
            inner: Arc::new(InMemoryStore::new()),
            gate: Arc::clone(&gate),
        };
        let service = CorrelationService::new(store, EngineConfig::default()).unwrap();

        let closed = gate.lock().unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());
        assert!(rx.borrow().is_loading);
        assert!(!rx.borrow().is_not_enough_data());

        drop(closed);
        let snapshot = settled(&mut rx, 1).await;
        assert!(snapshot.result_set.is_empty());
        assert!(snapshot.is_not_enough_data());
    }

    #[tokio::test]
    async fn test_last_trigger_wins() {
        let gate = Arc::new(Mutex::new(()));
        let store = GatedStore {
            inner: sample_store(),
            gate: Arc::clone(&gate),
        };
        let service = CorrelationService::new(store, EngineConfig::default()).unwrap();

        let closed = gate.lock().unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());
        // give the first computation time to block on the gate
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.set_window(DateWindow::month(2024, 5).unwrap());
        drop(closed);

        let snapshot = settled(&mut rx, 2).await;
        assert_eq!(snapshot.window, Some(DateWindow::month(2024, 5).unwrap()));
        assert!(snapshot.result_set.get("yoga").is_some());
        assert!(snapshot.result_set.get("run").is_none());

        // the superseded April pass must never overwrite May
        tokio::time::sleep(Duration::from_millis(50)).await;
        let latest = service.snapshot();
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.result_set.window(), Some(DateWindow::month(2024, 5).unwrap()));
    }

    #[tokio::test]
    async fn test_data_change_keeps_results_window_change_clears() {
        let gate = Arc::new(Mutex::new(()));
        let store = GatedStore {
            inner: sample_store(),
            gate: Arc::clone(&gate),
        };
        let service = CorrelationService::new(store, EngineConfig::default()).unwrap();
        let april = DateWindow::month(2024, 4).unwrap();
        let may = DateWindow::month(2024, 5).unwrap();
        let mut rx = service.observe(april);
        settled(&mut rx, 1).await;

        let closed = gate.lock().unwrap();
        let edit = StoreChange::Mood {
            date: date(4, 3),
            action: ChangeAction::Edited,
        };
        assert!(service.notify_change(&edit));
        {
            let snapshot = rx.borrow();
            assert!(snapshot.is_loading);
            assert_eq!(snapshot.generation, 2);
            assert!(snapshot.result_set.get("run").is_some());
            assert!(snapshot.run_id.is_some());
        }

        service.set_window(may);
        {
            let snapshot = rx.borrow();
            assert!(snapshot.is_loading);
            assert_eq!(snapshot.generation, 3);
            assert!(snapshot.result_set.is_empty());
            assert_eq!(snapshot.result_set.window(), Some(may));
            assert!(snapshot.run_id.is_none());
            assert!(!snapshot.is_not_enough_data());
        }

        drop(closed);
        let snapshot = settled(&mut rx, 3).await;
        assert!(snapshot.result_set.get("yoga").is_some());
    }

    #[tokio::test]
    async fn test_lagged_listener_refreshes() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        let mut rx = service.observe(DateWindow::month(2024, 4).unwrap());
        settled(&mut rx, 1).await;

        // both changes fall outside April; only the lag itself can trigger
        let (tx, changes) = broadcast::channel(1);
        for d in 1..=2 {
            tx.send(StoreChange::Mood {
                date: date(5, d),
                action: ChangeAction::Edited,
            })
            .unwrap();
        }
        drop(tx);

        let listener = service.listen(changes);
        tokio::time::timeout(TIMEOUT, listener).await.unwrap().unwrap();

        assert_eq!(service.snapshot().generation, 2);
        let snapshot = settled(&mut rx, 2).await;
        assert!(snapshot.result_set.get("run").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_triggers() {
        let service = CorrelationService::new(sample_store(), EngineConfig::default()).unwrap();
        service.shutdown();
        let rx = service.observe(DateWindow::month(2024, 4).unwrap());
        assert_eq!(rx.borrow().generation, 0);
    }
}
