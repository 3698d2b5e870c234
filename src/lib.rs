//! # thermwatch - Fleet maximum-temperature monitoring
//!
//! thermwatch polls a fixed fleet of remote subsystems for their current
//! temperature and tells you, the moment a scan completes, whether the
//! hottest reading changed. It turns a pile of point sensors into a single
//! actionable signal for fan control and thermal protection.
//!
//! ## Core Concepts
//!
//! - **Subsystem**: A remotely readable temperature source with a fixed id
//! - **Temperature**: A validated positive, finite reading in degrees
//! - **TempMonitor**: The background poll loop over the whole fleet
//! - **MaxTempListener**: A callback fired when the fleet maximum changes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use thermwatch::{MonitorConfig, SubsystemId, TempMonitor};
//! use thermwatch::transport::GrpcSubsystemConnector;
//!
//! // One connector for the whole fleet, addresses keyed by subsystem id.
//! let connector = Arc::new(GrpcSubsystemConnector::new(addresses, handle));
//!
//! let monitor = TempMonitor::new(
//!     vec![SubsystemId::new(1), SubsystemId::new(2)],
//!     MonitorConfig::default(),
//!     connector,
//! )?;
//! monitor.register_listener(Arc::new(FanController::default()))?;
//! monitor.initialize()?;
//! monitor.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod subsystem;
pub mod temperature;
pub mod tracker;

// Monitoring runtime
pub mod listener;
pub mod monitor;

// gRPC transport (feature-gated)
#[cfg(feature = "transport-grpc")]
pub mod transport;

// Re-export primary types at crate root for convenience
pub use error::{
    MonitorError, MonitorResult, RegistryError, StreamError, TransportError, ValidationError,
};
pub use listener::{
    ListenerId, ListenerRegistry, MaxTempListener, MaxTempStream, TempReadingObserver,
};
pub use monitor::{
    MonitorConfig, RunState, TempMonitor, DEFAULT_POLL_INTERVAL, DEFAULT_STREAM_CAPACITY,
};
pub use subsystem::{SubsystemClient, SubsystemConnector, SubsystemId};
pub use temperature::Temperature;
pub use tracker::TempTracker;
