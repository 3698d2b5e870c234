//! Listener contracts and the registry that fans notifications out.
//!
//! Listeners are identified by their `Arc` allocation and notified
//! synchronously, in registration order, from the poll thread. Registering
//! hands back a [`ListenerId`] token; each token revokes exactly once. The
//! registry lock is independent of the poll gate, so registration never
//! waits on an in-flight poll decision and works before the monitor is
//! initialized.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult, RegistryError, StreamError};
use crate::subsystem::SubsystemId;
use crate::temperature::Temperature;

/// Observer of changes to the fleet-wide maximum temperature.
///
/// Callbacks run on the poll thread while the registry lock is held:
/// return promptly and never call back into the registering monitor, or
/// the poll loop stalls.
pub trait MaxTempListener: Send + Sync {
    /// Called with the post-scan maximum whenever it differs from the
    /// previously notified one.
    fn on_new_max_temp(&self, temp: Temperature);
}

/// Optional observer of every accepted per-subsystem reading change.
///
/// Invoked for each admitted reading that differs from the stored value,
/// whether or not the maximum moved. Fire-and-forget; there is no
/// unregistration, the observer lives as long as the monitor.
pub trait TempReadingObserver: Send + Sync {
    /// Called with the subsystem and its newly accepted temperature.
    fn on_subsystem_temp_changed(&self, id: SubsystemId, temp: Temperature);
}

/// Unique identifier for one listener registration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(uuid::Uuid);

impl ListenerId {
    /// Creates a new random listener token.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct RegistryEntry {
    id: ListenerId,
    listener: Arc<dyn MaxTempListener>,
}

/// Thread-safe, insertion-ordered set of max-temperature listeners.
///
/// Identity is the `Arc` allocation: two clones of one `Arc` are the same
/// listener, two separate allocations are different listeners even when
/// their payloads compare equal.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`, returning its revocation token.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered`, carrying the existing
    /// token, when the same allocation is already present.
    pub fn add(&self, listener: Arc<dyn MaxTempListener>) -> Result<ListenerId, RegistryError> {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.iter().find(|e| Arc::ptr_eq(&e.listener, &listener)) {
            return Err(RegistryError::AlreadyRegistered { id: entry.id });
        }

        let id = ListenerId::new();
        entries.push(RegistryEntry { id, listener });
        Ok(id)
    }

    /// Revokes the registration behind `id`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotRegistered` when the token is unknown or
    /// already revoked; the registry is left unchanged.
    pub fn remove(&self, id: ListenerId) -> Result<(), RegistryError> {
        let mut entries = self.lock_entries();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Err(RegistryError::NotRegistered { id });
        };
        entries.remove(pos);
        Ok(())
    }

    /// Notifies every listener, in registration order, under the lock.
    ///
    /// Later additions and removals wait until the full fan-out returns, so
    /// a listener never observes a notification after its unregistration
    /// completed.
    pub fn notify_all(&self, temp: Temperature) {
        let entries = self.lock_entries();
        for entry in entries.iter() {
            entry.listener.on_new_max_temp(temp);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<RegistryEntry>> {
        // A panicking listener must not brick the registry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Forwards notifications into a stream buffer without ever blocking the
/// poll thread.
struct StreamListener {
    tx: Sender<Temperature>,
    dropped: Arc<AtomicU64>,
}

impl MaxTempListener for StreamListener {
    fn on_new_max_temp(&self, temp: Temperature) {
        match self.tx.try_send(temp) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A pull-based subscription to max-temperature notifications.
///
/// Backed by a registered forwarding listener and a bounded buffer: a slow
/// consumer delays nothing and instead loses events, counted by
/// [`MaxTempStream::dropped`]. Dropping the stream attempts best-effort
/// unregistration; the stream becomes disconnected once the registry entry
/// is gone.
pub struct MaxTempStream {
    listener_id: ListenerId,
    rx: Receiver<Temperature>,
    registry: Arc<ListenerRegistry>,
    dropped: Arc<AtomicU64>,
    unregistered: AtomicBool,
}

impl MaxTempStream {
    pub(crate) fn register(
        registry: &Arc<ListenerRegistry>,
        capacity: usize,
    ) -> Result<Self, RegistryError> {
        let (tx, rx) = bounded::<Temperature>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let forwarder = Arc::new(StreamListener {
            tx,
            dropped: Arc::clone(&dropped),
        });
        let listener_id = registry.add(forwarder)?;

        Ok(Self {
            listener_id,
            rx,
            registry: Arc::clone(registry),
            dropped,
            unregistered: AtomicBool::new(false),
        })
    }

    /// Receive the next new-maximum value (blocking).
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Disconnected` after the backing registration
    /// is gone and the buffer has drained.
    pub fn recv(&self) -> MonitorResult<Temperature> {
        self.rx
            .recv()
            .map_err(|_| MonitorError::Stream(StreamError::Disconnected))
    }

    /// Receive the next new-maximum value with a timeout.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Timeout` when no event arrives in time, and
    /// `StreamError::Disconnected` once the backing registration is gone
    /// and the buffer has drained.
    pub fn recv_timeout(&self, timeout: Duration) -> MonitorResult<Temperature> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MonitorError::Stream(StreamError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => MonitorError::Stream(StreamError::Disconnected),
        })
    }

    /// Notifications lost to a full buffer so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Best-effort explicit unregistration. Idempotent; buffered events stay
    /// receivable until the stream disconnects.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.registry.remove(self.listener_id);
    }
}

impl Drop for MaxTempStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for MaxTempStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxTempStream")
            .field("listener_id", &self.listener_id)
            .field("dropped", &self.dropped())
            .finish()
    }
}
