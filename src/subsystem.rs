//! Subsystem identities and the remote-read contract the monitor consumes.
//!
//! A subsystem is an independently addressable unit exposing exactly one
//! temperature reading through a remote call. The id set is fixed when a
//! monitor is built; the monitor owns one client per id for its whole
//! lifetime and scans them in configured order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Opaque identifier of one monitored subsystem.
///
/// Ids are unique within one monitor instance and never change while the
/// monitor is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsystemId(u32);

impl SubsystemId {
    /// Wraps a raw subsystem id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for SubsystemId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blocking read access to one subsystem's temperature.
///
/// Implementations may block for as long as the underlying transport takes;
/// the monitor imposes no deadline of its own. A failed read costs the
/// subsystem one poll iteration and nothing else.
pub trait SubsystemClient: Send {
    /// Issues one temperature read.
    ///
    /// The returned value is raw and unvalidated; the monitor applies its
    /// own admission rules (finite, strictly positive) before accepting it.
    ///
    /// # Errors
    ///
    /// Any transport failure. The monitor absorbs the error, skips the
    /// subsystem for the current iteration, and keeps its last accepted
    /// reading.
    fn read_temperature(&mut self) -> Result<f32, TransportError>;
}

/// Builds one [`SubsystemClient`] per configured subsystem id.
///
/// Called once per id while the monitor initializes. Connection setup may
/// be lazy as long as failures eventually surface through
/// [`SubsystemClient::read_temperature`].
pub trait SubsystemConnector: Send + Sync {
    /// Creates the client for `id`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when no client can be built for `id`,
    /// which fails monitor initialization as a whole.
    fn connect(&self, id: SubsystemId) -> Result<Box<dyn SubsystemClient>, TransportError>;
}
