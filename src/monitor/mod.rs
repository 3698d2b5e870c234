//! Maximum-temperature monitor over a fixed set of remote subsystems.
//!
//! [`TempMonitor`] polls every configured subsystem on one dedicated
//! background thread, keeps the last accepted reading per subsystem plus an
//! ordered view of all current readings, and notifies registered listeners
//! whenever the fleet-wide maximum changes. The canonical consumer is a
//! fan-speed controller reacting to the hottest subsystem.
//!
//! Lifecycle: build with the fixed id list, [`TempMonitor::initialize`]
//! once (connects every subsystem and spawns the loop paused), then
//! [`TempMonitor::start`] and [`TempMonitor::stop`] at will from any
//! thread. Dropping the monitor forces the loop awake regardless of pause
//! state and joins it.
//!
//! The scan is sequential in configured order and listener fan-out is
//! synchronous on the poll thread, so one stalled subsystem call or one
//! slow listener extends the iteration for everyone. Consumers that cannot
//! return promptly should use [`TempMonitor::subscribe`] and pull from the
//! buffered stream instead of registering a direct listener.

mod control;
mod worker;

pub use control::RunState;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MonitorError, MonitorResult, ValidationError};
use crate::listener::{
    ListenerId, ListenerRegistry, MaxTempListener, MaxTempStream, TempReadingObserver,
};
use crate::subsystem::{SubsystemClient, SubsystemConnector, SubsystemId};

use control::PollGate;
use worker::{PollStats, PollWorker};

/// Default pause between poll iterations, independent of subsystem count.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default buffer capacity of one subscribed max-temperature stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pause between poll iterations.
    pub poll_interval: Duration,
    /// Per-subscription stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

/// Monitors the maximum temperature across a fixed set of subsystems.
///
/// All lifecycle methods take `&self` and are safe to call from any
/// thread. Listener registration works at any point in the lifecycle,
/// including before [`TempMonitor::initialize`].
pub struct TempMonitor {
    subsystem_ids: Vec<SubsystemId>,
    config: MonitorConfig,
    connector: Arc<dyn SubsystemConnector>,
    observer: Option<Arc<dyn TempReadingObserver>>,
    registry: Arc<ListenerRegistry>,
    gate: Arc<PollGate>,
    stats: Arc<PollStats>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TempMonitor {
    /// Creates a monitor for `subsystem_ids`, polled through `connector`.
    ///
    /// The id list is allowed to be empty; such a monitor runs, completes
    /// empty scans, and never notifies.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateSubsystemId` when an id repeats.
    pub fn new(
        subsystem_ids: Vec<SubsystemId>,
        config: MonitorConfig,
        connector: Arc<dyn SubsystemConnector>,
    ) -> MonitorResult<Self> {
        Self::build(subsystem_ids, config, connector, None)
    }

    /// Like [`TempMonitor::new`], with an observer invoked for every
    /// accepted per-subsystem change whether or not the maximum moved.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateSubsystemId` when an id repeats.
    pub fn with_observer(
        subsystem_ids: Vec<SubsystemId>,
        config: MonitorConfig,
        connector: Arc<dyn SubsystemConnector>,
        observer: Arc<dyn TempReadingObserver>,
    ) -> MonitorResult<Self> {
        Self::build(subsystem_ids, config, connector, Some(observer))
    }

    fn build(
        subsystem_ids: Vec<SubsystemId>,
        config: MonitorConfig,
        connector: Arc<dyn SubsystemConnector>,
        observer: Option<Arc<dyn TempReadingObserver>>,
    ) -> MonitorResult<Self> {
        let mut seen = HashSet::with_capacity(subsystem_ids.len());
        for id in &subsystem_ids {
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicateSubsystemId { id: *id }.into());
            }
        }

        Ok(Self {
            subsystem_ids,
            config,
            connector,
            observer,
            registry: Arc::new(ListenerRegistry::new()),
            gate: Arc::new(PollGate::new()),
            stats: Arc::new(PollStats::default()),
            poll_thread: Mutex::new(None),
        })
    }

    /// Connects every configured subsystem and spawns the poll loop in the
    /// paused state.
    ///
    /// Succeeds at most once. A failed attempt spawns nothing and leaves
    /// the monitor uninitialized, so the call may be retried.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::AlreadyInitialized` on a second successful
    /// call, and any connector failure verbatim.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the poll thread.
    pub fn initialize(&self) -> MonitorResult<()> {
        let mut slot = self.lock_thread();
        if slot.is_some() {
            return Err(MonitorError::AlreadyInitialized);
        }

        let mut clients: Vec<(SubsystemId, Box<dyn SubsystemClient>)> =
            Vec::with_capacity(self.subsystem_ids.len());
        for id in &self.subsystem_ids {
            clients.push((*id, self.connector.connect(*id)?));
        }

        let worker = PollWorker::new(
            clients,
            Arc::clone(&self.registry),
            self.observer.clone(),
            Arc::clone(&self.stats),
        );
        let gate = Arc::clone(&self.gate);
        let interval = self.config.poll_interval;
        let handle = thread::Builder::new()
            .name("thermwatch-poll".to_string())
            .spawn(move || worker.run(&gate, interval))
            .expect("failed to spawn thermwatch poll thread");
        *slot = Some(handle);

        debug!(
            subsystems = self.subsystem_ids.len(),
            ?interval,
            "monitor initialized; poll loop paused"
        );
        Ok(())
    }

    /// Opens the gate and wakes the poll loop. Idempotent while running.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::NotInitialized` before a successful
    /// [`TempMonitor::initialize`].
    pub fn start(&self) -> MonitorResult<()> {
        self.ensure_initialized()?;
        self.gate.resume();
        debug!("poll loop started");
        Ok(())
    }

    /// Closes the gate. An in-flight scan finishes its full subsystem pass,
    /// including any resulting notification, before the pause takes effect.
    /// Idempotent while paused.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::NotInitialized` before a successful
    /// [`TempMonitor::initialize`].
    pub fn stop(&self) -> MonitorResult<()> {
        self.ensure_initialized()?;
        self.gate.pause();
        debug!("poll loop pausing");
        Ok(())
    }

    /// Current lifecycle state of the poll loop. `Paused` both before
    /// initialization and while stopped.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.gate.state()
    }

    /// Registers a listener for max-temperature changes and returns its
    /// revocation token. Works before or after initialization.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` when the same `Arc`
    /// allocation is already registered; the error carries the existing
    /// token.
    pub fn register_listener(
        &self,
        listener: Arc<dyn MaxTempListener>,
    ) -> MonitorResult<ListenerId> {
        let id = self.registry.add(listener)?;
        debug!(listener = %id, "listener registered");
        Ok(id)
    }

    /// Revokes a registration token. Each token revokes exactly once.
    ///
    /// Once this returns, the listener will not be invoked again: removal
    /// takes the same lock the fan-out holds.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotRegistered` for an unknown or
    /// already-revoked token.
    pub fn unregister_listener(&self, id: ListenerId) -> MonitorResult<()> {
        self.registry.remove(id)?;
        debug!(listener = %id, "listener unregistered");
        Ok(())
    }

    /// Creates a pull-based stream of max-temperature notifications,
    /// buffered to the configured stream capacity. Dropping the stream
    /// unregisters it.
    ///
    /// # Errors
    ///
    /// Propagates registry failures from registering the internal
    /// forwarding listener.
    pub fn subscribe(&self) -> MonitorResult<MaxTempStream> {
        Ok(MaxTempStream::register(
            &self.registry,
            self.config.stream_capacity,
        )?)
    }

    /// Full scans completed since initialization.
    #[must_use]
    pub fn completed_scans(&self) -> u64 {
        self.stats.completed_scans.load(Ordering::Acquire)
    }

    /// Reads skipped so far: transport failures plus invalid values.
    #[must_use]
    pub fn skipped_reads(&self) -> u64 {
        self.stats.skipped_reads.load(Ordering::Relaxed)
    }

    /// The configured subsystem ids, in scan order.
    #[must_use]
    pub fn subsystem_ids(&self) -> &[SubsystemId] {
        &self.subsystem_ids
    }

    fn ensure_initialized(&self) -> MonitorResult<()> {
        if self.lock_thread().is_none() {
            return Err(MonitorError::NotInitialized);
        }
        Ok(())
    }

    fn lock_thread(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poll_thread.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TempMonitor {
    fn drop(&mut self) {
        // ShuttingDown satisfies every wait predicate, so the join below
        // cannot hang on a paused or sleeping loop.
        self.gate.shutdown();
        if let Some(handle) = self.lock_thread().take() {
            let _ = handle.join();
            debug!("poll loop joined");
        }
    }
}

impl fmt::Debug for TempMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempMonitor")
            .field("subsystems", &self.subsystem_ids.len())
            .field("state", &self.state())
            .field("completed_scans", &self.completed_scans())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::TransportError;

    /// Connector that hands out clients always reporting one fixed value.
    struct FixedConnector {
        value: f32,
    }

    struct FixedClient {
        value: f32,
    }

    impl SubsystemClient for FixedClient {
        fn read_temperature(&mut self) -> Result<f32, TransportError> {
            Ok(self.value)
        }
    }

    impl SubsystemConnector for FixedConnector {
        fn connect(&self, _id: SubsystemId) -> Result<Box<dyn SubsystemClient>, TransportError> {
            Ok(Box::new(FixedClient { value: self.value }))
        }
    }

    /// Connector that refuses every subsystem.
    struct RefusingConnector;

    impl SubsystemConnector for RefusingConnector {
        fn connect(&self, id: SubsystemId) -> Result<Box<dyn SubsystemClient>, TransportError> {
            Err(TransportError::NoAddress { id })
        }
    }

    fn ids(n: u32) -> Vec<SubsystemId> {
        (1..=n).map(SubsystemId::new).collect()
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(5),
            ..MonitorConfig::default()
        }
    }

    fn fixed_monitor(n: u32, value: f32) -> TempMonitor {
        TempMonitor::new(ids(n), fast_config(), Arc::new(FixedConnector { value })).unwrap()
    }

    #[test]
    fn test_duplicate_subsystem_ids_are_rejected() {
        let dup = vec![SubsystemId::new(1), SubsystemId::new(2), SubsystemId::new(1)];
        let err = TempMonitor::new(
            dup,
            MonitorConfig::default(),
            Arc::new(FixedConnector { value: 30.0 }),
        )
        .unwrap_err();

        assert!(err.is_validation());
        let msg = format!("{err}");
        assert!(msg.contains("Subsystem id 1"));
    }

    #[test]
    fn test_empty_subsystem_list_is_allowed() {
        let monitor = fixed_monitor(0, 30.0);
        monitor.initialize().unwrap();
        monitor.start().unwrap();
        assert_eq!(monitor.state(), RunState::Running);
    }

    #[test]
    fn test_subsystem_ids_preserve_configured_order() {
        // Scan order is the configured order, not sorted.
        let configured = vec![SubsystemId::new(3), SubsystemId::new(1), SubsystemId::new(2)];
        let monitor = TempMonitor::new(
            configured.clone(),
            MonitorConfig::default(),
            Arc::new(FixedConnector { value: 30.0 }),
        )
        .unwrap();

        assert_eq!(monitor.subsystem_ids(), configured.as_slice());
    }

    #[test]
    fn test_start_and_stop_require_initialize() {
        let monitor = fixed_monitor(1, 30.0);

        assert!(matches!(
            monitor.start().unwrap_err(),
            MonitorError::NotInitialized
        ));
        assert!(matches!(
            monitor.stop().unwrap_err(),
            MonitorError::NotInitialized
        ));
    }

    #[test]
    fn test_initialize_twice_fails() {
        let monitor = fixed_monitor(1, 30.0);
        monitor.initialize().unwrap();

        assert!(matches!(
            monitor.initialize().unwrap_err(),
            MonitorError::AlreadyInitialized
        ));
    }

    #[test]
    fn test_failed_initialize_leaves_monitor_uninitialized() {
        let monitor =
            TempMonitor::new(ids(2), fast_config(), Arc::new(RefusingConnector)).unwrap();

        let err = monitor.initialize().unwrap_err();
        assert!(err.is_transport());

        // Still uninitialized: lifecycle calls keep failing the same way.
        assert!(matches!(
            monitor.start().unwrap_err(),
            MonitorError::NotInitialized
        ));
    }

    #[test]
    fn test_state_follows_lifecycle() {
        let monitor = fixed_monitor(1, 30.0);
        assert_eq!(monitor.state(), RunState::Paused);

        monitor.initialize().unwrap();
        assert_eq!(monitor.state(), RunState::Paused);

        monitor.start().unwrap();
        assert_eq!(monitor.state(), RunState::Running);

        monitor.stop().unwrap();
        assert_eq!(monitor.state(), RunState::Paused);
    }

    #[test]
    fn test_registration_works_before_initialize() {
        struct Quiet;
        impl MaxTempListener for Quiet {
            fn on_new_max_temp(&self, _temp: crate::temperature::Temperature) {}
        }

        let monitor = fixed_monitor(1, 30.0);
        let id = monitor.register_listener(Arc::new(Quiet)).unwrap();
        monitor.unregister_listener(id).unwrap();

        assert!(matches!(
            monitor.unregister_listener(id).unwrap_err(),
            MonitorError::Registry(_)
        ));
    }

    #[test]
    fn test_drop_joins_paused_loop() {
        let monitor = fixed_monitor(2, 30.0);
        monitor.initialize().unwrap();
        // Never started: the loop is parked at the gate. Drop must still
        // return promptly.
        drop(monitor);
    }

    #[test]
    fn test_drop_joins_running_loop() {
        let monitor = fixed_monitor(2, 30.0);
        monitor.initialize().unwrap();
        monitor.start().unwrap();
        drop(monitor);
    }

    #[test]
    fn test_drop_without_initialize_is_clean() {
        let monitor = fixed_monitor(2, 30.0);
        drop(monitor);
    }
}
