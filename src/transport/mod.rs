//! gRPC transport for subsystem temperature reads.
//!
//! The wire contract is one unary call per subsystem: a no-argument
//! request answered with a single float. [`GrpcSubsystemConnector`] keeps
//! one lazily-connected channel per configured subsystem and bridges the
//! synchronous poll thread onto the async tonic stack through a runtime
//! handle.
//!
//! [`SubsystemService`] is the matching in-process server used by the demo
//! binary and integration tests: it serves a slowly drifting temperature
//! unless pinned to an exact override value.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::error::TransportError;
use crate::subsystem::{SubsystemClient, SubsystemConnector, SubsystemId};

pub mod proto {
    #![allow(missing_docs, clippy::pedantic)]
    tonic::include_proto!("thermwatch");
}

use proto::subsystem_client::SubsystemClient as SubsystemRpcClient;
use proto::subsystem_server::{Subsystem, SubsystemServer};
use proto::{TemperatureReply, TemperatureRequest};

/// Connects subsystems over gRPC from a static id-to-URI table.
///
/// Channels are created lazily: [`SubsystemConnector::connect`] never
/// blocks on the network, and an unreachable subsystem surfaces as
/// per-iteration read failures that the monitor absorbs.
#[derive(Debug, Clone)]
pub struct GrpcSubsystemConnector {
    addresses: HashMap<SubsystemId, String>,
    handle: Handle,
}

impl GrpcSubsystemConnector {
    /// Builds a connector over `addresses`, issuing calls on the runtime
    /// behind `handle`.
    ///
    /// That runtime must outlive every monitor using this connector: the
    /// poll thread executes its reads on it.
    #[must_use]
    pub fn new(addresses: HashMap<SubsystemId, String>, handle: Handle) -> Self {
        Self { addresses, handle }
    }
}

impl SubsystemConnector for GrpcSubsystemConnector {
    fn connect(&self, id: SubsystemId) -> Result<Box<dyn SubsystemClient>, TransportError> {
        let Some(addr) = self.addresses.get(&id) else {
            return Err(TransportError::NoAddress { id });
        };

        let endpoint =
            Endpoint::from_shared(addr.clone()).map_err(|e| TransportError::ConnectionFailed {
                message: format!("invalid subsystem uri {addr}: {e}"),
            })?;
        let channel = endpoint.connect_lazy();
        debug!(subsystem = %id, %addr, "subsystem channel ready");

        Ok(Box::new(GrpcSubsystemClient {
            handle: self.handle.clone(),
            client: SubsystemRpcClient::new(channel),
        }))
    }
}

/// Blocking unary client for one subsystem.
///
/// `read_temperature` must run outside any async context; the monitor's
/// dedicated poll thread satisfies that by construction.
struct GrpcSubsystemClient {
    handle: Handle,
    client: SubsystemRpcClient<Channel>,
}

impl SubsystemClient for GrpcSubsystemClient {
    fn read_temperature(&mut self) -> Result<f32, TransportError> {
        let response = self
            .handle
            .block_on(self.client.get_temperature(Request::new(TemperatureRequest {})))
            .map_err(|status| TransportError::ReadFailed {
                message: status.to_string(),
            })?;
        Ok(response.into_inner().temperature)
    }
}

/// Temperature change per served read while unpinned.
const DRIFT_STEP: f32 = 0.1;
/// Drift reverses direction at these bounds.
const DRIFT_MIN: f32 = 30.0;
const DRIFT_MAX: f32 = 45.0;

#[derive(Debug)]
struct ServiceState {
    temperature: f32,
    rising: bool,
    override_temp: Option<f32>,
}

impl ServiceState {
    /// One drift step; a pinned override wins and freezes the drift.
    fn advance(&mut self) -> f32 {
        if let Some(pinned) = self.override_temp {
            return pinned;
        }

        if self.rising {
            self.temperature += DRIFT_STEP;
            if self.temperature >= DRIFT_MAX {
                self.rising = false;
            }
        } else {
            self.temperature -= DRIFT_STEP;
            if self.temperature <= DRIFT_MIN {
                self.rising = true;
            }
        }
        self.temperature
    }
}

/// In-process subsystem gRPC server for demos and tests.
///
/// Serves a temperature that drifts between fixed bounds on every read, or
/// a pinned override. The override survives until cleared, so a test can
/// hold a subsystem at an exact value across any number of iterations.
#[derive(Debug)]
pub struct SubsystemService {
    id: SubsystemId,
    state: Arc<Mutex<ServiceState>>,
}

impl SubsystemService {
    /// Creates a service for `id`, starting at the drift lower bound.
    #[must_use]
    pub fn new(id: SubsystemId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(ServiceState {
                temperature: DRIFT_MIN,
                rising: true,
                override_temp: None,
            })),
        }
    }

    /// Handle for pinning and unpinning the served temperature. Valid even
    /// after the service is spawned.
    #[must_use]
    pub fn control(&self) -> SubsystemControl {
        SubsystemControl {
            state: Arc::clone(&self.state),
        }
    }

    /// Serves on `addr` (port 0 picks an ephemeral port) until the
    /// returned handle shuts it down.
    ///
    /// # Errors
    ///
    /// Bind failures are reported as `TransportError::ConnectionFailed`.
    pub async fn spawn(self, addr: SocketAddr) -> Result<SubsystemServerHandle, TransportError> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    message: format!("bind {addr}: {e}"),
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed {
                message: e.to_string(),
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let id = self.id;
        let task = tokio::spawn(
            Server::builder()
                .add_service(SubsystemServer::new(self))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                }),
        );

        info!(subsystem = %id, %local_addr, "subsystem server listening");
        Ok(SubsystemServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

#[tonic::async_trait]
impl Subsystem for SubsystemService {
    async fn get_temperature(
        &self,
        _request: Request<TemperatureRequest>,
    ) -> Result<Response<TemperatureReply>, Status> {
        let temperature = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance();
        Ok(Response::new(TemperatureReply { temperature }))
    }
}

/// Pins or releases the temperature served by one [`SubsystemService`].
#[derive(Debug, Clone)]
pub struct SubsystemControl {
    state: Arc<Mutex<ServiceState>>,
}

impl SubsystemControl {
    /// Pins the served temperature to an exact value.
    pub fn set_override(&self, temperature: f32) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .override_temp = Some(temperature);
    }

    /// Returns the service to its drifting temperature.
    pub fn clear_override(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .override_temp = None;
    }
}

/// Running subsystem server bound to a local address.
///
/// Dropping the handle signals shutdown best-effort without waiting; use
/// [`SubsystemServerHandle::shutdown`] for a clean join.
#[derive(Debug)]
pub struct SubsystemServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl SubsystemServerHandle {
    /// The bound address, useful with ephemeral ports.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URI form of the bound address, accepted by
    /// [`GrpcSubsystemConnector`].
    #[must_use]
    pub fn uri(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Signals shutdown and waits for the server task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SubsystemServerHandle {
    fn drop(&mut self) {
        // Best-effort: do not block on shutdown.
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
