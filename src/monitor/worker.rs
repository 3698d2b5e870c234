//! Poll-loop worker owning the scan state.
//!
//! The temp table, ordered tracker, and cached max live exclusively on the
//! poll thread; no other thread reads or writes them, so a scan takes no
//! locks of its own. Listener fan-out goes through the shared registry,
//! which carries its own lock, and the public counters are atomics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::listener::{ListenerRegistry, TempReadingObserver};
use crate::subsystem::{SubsystemClient, SubsystemId};
use crate::temperature::Temperature;
use crate::tracker::TempTracker;

use super::control::{PollGate, RunState};

/// Counters published by the poll loop.
#[derive(Debug, Default)]
pub(crate) struct PollStats {
    /// Full scans completed (every configured subsystem attempted once).
    pub(crate) completed_scans: AtomicU64,
    /// Reads skipped for one iteration: transport failure or invalid value.
    pub(crate) skipped_reads: AtomicU64,
}

/// State owned by the poll thread.
pub(crate) struct PollWorker {
    clients: Vec<(SubsystemId, Box<dyn SubsystemClient>)>,
    temps: HashMap<SubsystemId, Temperature>,
    tracker: TempTracker,
    notified_max: Option<Temperature>,
    registry: Arc<ListenerRegistry>,
    observer: Option<Arc<dyn TempReadingObserver>>,
    stats: Arc<PollStats>,
}

impl PollWorker {
    pub(crate) fn new(
        clients: Vec<(SubsystemId, Box<dyn SubsystemClient>)>,
        registry: Arc<ListenerRegistry>,
        observer: Option<Arc<dyn TempReadingObserver>>,
        stats: Arc<PollStats>,
    ) -> Self {
        Self {
            clients,
            temps: HashMap::new(),
            tracker: TempTracker::new(),
            notified_max: None,
            registry,
            observer,
            stats,
        }
    }

    /// Body of the dedicated poll thread: wait at the gate, scan, idle,
    /// repeat until shutdown.
    pub(crate) fn run(mut self, gate: &PollGate, interval: Duration) {
        loop {
            if gate.wait_runnable() == RunState::ShuttingDown {
                break;
            }

            self.scan();

            if gate.idle_wait(interval) == RunState::ShuttingDown {
                break;
            }
        }
        debug!("poll loop exited");
    }

    /// One full pass over every subsystem in configured order, followed by
    /// at most one max-change notification.
    pub(crate) fn scan(&mut self) {
        for (id, client) in &mut self.clients {
            let id = *id;
            let raw = match client.read_temperature() {
                Ok(raw) => raw,
                Err(err) => {
                    self.stats.skipped_reads.fetch_add(1, Ordering::Relaxed);
                    debug!(subsystem = %id, error = %err, "read failed; skipping this iteration");
                    continue;
                }
            };

            let temp = match Temperature::new(raw) {
                Ok(temp) => temp,
                Err(err) => {
                    self.stats.skipped_reads.fetch_add(1, Ordering::Relaxed);
                    debug!(subsystem = %id, error = %err, "invalid reading; skipping this iteration");
                    continue;
                }
            };

            let previous = self.temps.get(&id).copied();
            if previous == Some(temp) {
                // Re-reported value: no table, tracker, or observer traffic.
                continue;
            }

            if let Some(old) = previous {
                self.tracker.remove(old);
            }
            self.tracker.insert(temp);
            self.temps.insert(id, temp);
            trace!(subsystem = %id, temp = %temp, "accepted reading");

            if let Some(observer) = &self.observer {
                observer.on_subsystem_temp_changed(id, temp);
            }
        }

        if let Some(new_max) = self.refresh_max() {
            debug!(max = %new_max, "new maximum temperature");
            self.registry.notify_all(new_max);
        }

        // Incremented after fan-out: whoever observes the count also
        // observes every notification of that scan.
        self.stats.completed_scans.fetch_add(1, Ordering::Release);
    }

    /// Reconciles the notified max against the tracker; returns the new
    /// value when it moved. An empty tracker keeps the last notified value
    /// in place rather than reverting to "unknown".
    fn refresh_max(&mut self) -> Option<Temperature> {
        let max = self.tracker.max()?;
        if self.notified_max == Some(max) {
            return None;
        }
        self.notified_max = Some(max);
        Some(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::error::TransportError;

    fn t(value: f32) -> Temperature {
        Temperature::new(value).unwrap()
    }

    /// Shared mutable reading, the in-process stand-in for one remote
    /// subsystem.
    #[derive(Clone)]
    struct TempCell(Arc<Mutex<Result<f32, TransportError>>>);

    impl TempCell {
        fn offline() -> Self {
            Self(Arc::new(Mutex::new(Err(TransportError::ReadFailed {
                message: "offline".to_string(),
            }))))
        }

        fn reporting(value: f32) -> Self {
            Self(Arc::new(Mutex::new(Ok(value))))
        }

        fn set(&self, value: f32) {
            *self.0.lock().unwrap() = Ok(value);
        }
    }

    struct CellClient(TempCell);

    impl SubsystemClient for CellClient {
        fn read_temperature(&mut self) -> Result<f32, TransportError> {
            self.0 .0.lock().unwrap().clone()
        }
    }

    /// Records every notification in arrival order.
    #[derive(Default)]
    struct RecordingListener {
        history: Mutex<Vec<Temperature>>,
    }

    impl crate::listener::MaxTempListener for RecordingListener {
        fn on_new_max_temp(&self, temp: Temperature) {
            self.history.lock().unwrap().push(temp);
        }
    }

    impl RecordingListener {
        fn history(&self) -> Vec<Temperature> {
            self.history.lock().unwrap().clone()
        }
    }

    /// Records accepted per-subsystem changes.
    #[derive(Default)]
    struct RecordingObserver {
        changes: Mutex<VecDeque<(SubsystemId, Temperature)>>,
    }

    impl TempReadingObserver for RecordingObserver {
        fn on_subsystem_temp_changed(&self, id: SubsystemId, temp: Temperature) {
            self.changes.lock().unwrap().push_back((id, temp));
        }
    }

    struct Harness {
        cells: Vec<TempCell>,
        worker: PollWorker,
        listener: Arc<RecordingListener>,
        observer: Arc<RecordingObserver>,
    }

    fn harness(cells: Vec<TempCell>) -> Harness {
        let clients = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let id = SubsystemId::new(u32::try_from(i).unwrap() + 1);
                (id, Box::new(CellClient(cell.clone())) as Box<dyn SubsystemClient>)
            })
            .collect();

        let registry = Arc::new(ListenerRegistry::new());
        let listener = Arc::new(RecordingListener::default());
        registry
            .add(Arc::clone(&listener) as Arc<dyn crate::listener::MaxTempListener>)
            .unwrap();

        let observer = Arc::new(RecordingObserver::default());
        let worker = PollWorker::new(
            clients,
            registry,
            Some(Arc::clone(&observer) as Arc<dyn TempReadingObserver>),
            Arc::new(PollStats::default()),
        );

        Harness {
            cells,
            worker,
            listener,
            observer,
        }
    }

    #[test]
    fn test_scan_with_no_valid_readings_notifies_nothing() {
        let mut h = harness(vec![TempCell::offline(), TempCell::offline()]);
        h.worker.scan();

        assert!(h.listener.history().is_empty());
        assert!(h.worker.tracker.is_empty());
        assert_eq!(h.worker.stats.skipped_reads.load(Ordering::Relaxed), 2);
        assert_eq!(h.worker.stats.completed_scans.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_read_keeps_last_accepted_value() {
        let cell = TempCell::reporting(37.48);
        let mut h = harness(vec![cell.clone()]);

        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48)]);

        // Subsystem goes dark: its last reading stays in the tables.
        *cell.0.lock().unwrap() = Err(TransportError::ReadFailed {
            message: "gone".to_string(),
        });
        h.worker.scan();

        assert_eq!(h.worker.temps.len(), 1);
        assert_eq!(h.worker.tracker.max(), Some(t(37.48)));
        assert_eq!(h.listener.history(), vec![t(37.48)]);
    }

    #[test]
    fn test_non_positive_reading_is_skipped() {
        let cell = TempCell::reporting(0.0);
        let mut h = harness(vec![cell.clone()]);

        h.worker.scan();
        cell.set(-3.0);
        h.worker.scan();

        assert!(h.worker.tracker.is_empty());
        assert!(h.listener.history().is_empty());
        assert_eq!(h.worker.stats.skipped_reads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unchanged_reading_is_a_full_noop() {
        let mut h = harness(vec![TempCell::reporting(37.48)]);

        h.worker.scan();
        h.worker.scan();
        h.worker.scan();

        assert_eq!(h.listener.history(), vec![t(37.48)]);
        assert_eq!(h.observer.changes.lock().unwrap().len(), 1);
        assert_eq!(h.worker.tracker.len(), 1);
    }

    #[test]
    fn test_one_notification_per_scan_even_for_multiple_changes() {
        // Both subsystems change in the same scan; only the post-scan max
        // is announced.
        let a = TempCell::reporting(35.0);
        let b = TempCell::reporting(36.0);
        let mut h = harness(vec![a.clone(), b.clone()]);

        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(36.0)]);

        a.set(41.0);
        b.set(39.0);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(36.0), t(41.0)]);
    }

    #[test]
    fn test_observer_sees_every_accepted_change() {
        let a = TempCell::reporting(35.0);
        let b = TempCell::reporting(36.0);
        let mut h = harness(vec![a.clone(), b.clone()]);

        h.worker.scan();
        a.set(34.0); // below max: no notification, still observed
        h.worker.scan();

        let changes: Vec<_> = h.observer.changes.lock().unwrap().iter().copied().collect();
        assert_eq!(
            changes,
            vec![
                (SubsystemId::new(1), t(35.0)),
                (SubsystemId::new(2), t(36.0)),
                (SubsystemId::new(1), t(34.0)),
            ]
        );
        assert_eq!(h.listener.history(), vec![t(36.0)]);
    }

    #[test]
    fn test_scenario_walk_matches_expected_notifications() {
        // Five subsystems; drive the canonical walk: first valid reading,
        // duplicates at a lower value, a rise, a fall back, then a spike.
        let mut h = harness((0..5).map(|_| TempCell::offline()).collect());

        // A reports 37.48: first max.
        h.cells[0].set(37.48);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48)]);

        // B reports 37.00: below max, no notification.
        h.cells[1].set(37.0);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48)]);

        // C and D also report 37.00: duplicates, still no notification.
        h.cells[2].set(37.0);
        h.cells[3].set(37.0);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48)]);

        // B rises to 40.00: new max.
        h.cells[1].set(40.0);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48), t(40.0)]);

        // B falls back to 37.00: max drops to A's 37.48 and is re-announced.
        h.cells[1].set(37.0);
        h.worker.scan();
        assert_eq!(h.listener.history(), vec![t(37.48), t(40.0), t(37.48)]);

        // E spikes to 75.00.
        h.cells[4].set(75.0);
        h.worker.scan();
        assert_eq!(
            h.listener.history(),
            vec![t(37.48), t(40.0), t(37.48), t(75.0)]
        );

        // Quiescent invariant: notified max equals the tracker max equals
        // the max over the temp table.
        let table_max = h.worker.temps.values().copied().max();
        assert_eq!(h.worker.notified_max, h.worker.tracker.max());
        assert_eq!(h.worker.tracker.max(), table_max);
        assert_eq!(h.worker.tracker.len(), h.worker.temps.len());
    }

    #[test]
    fn test_equal_max_from_another_subsystem_is_not_renotified() {
        let a = TempCell::reporting(40.0);
        let b = TempCell::offline();
        let mut h = harness(vec![a, b.clone()]);

        h.worker.scan();
        b.set(40.0);
        h.worker.scan();

        // The max value did not change, only its multiplicity.
        assert_eq!(h.listener.history(), vec![t(40.0)]);
        assert_eq!(h.worker.tracker.len(), 2);
    }
}
