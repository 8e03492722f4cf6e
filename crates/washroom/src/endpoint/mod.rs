// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Device endpoint: the per-device TCP server.
//!
//! Accepts connections indefinitely, decodes length-prefixed requests,
//! applies actions to the device state behind a single lock (concurrent
//! connections serialize; the last committed action wins the advertised
//! properties) and re-announces through the [`Advertiser`] *before* the
//! response is written, so observers see the change no later than the
//! caller does.

pub mod protocol;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use crate::discovery::DiscoveryEngine;
use crate::error::{DiscoveryError, EndpointError};
use crate::types::ServiceInfo;
use crate::wire;

pub use protocol::{
    ActuatorAction, DeviceRequest, DeviceResponse, LightLampAction, SendActuatorCommandResponse,
    SinkAction,
};

/// How long in-flight connections get to drain on shutdown before the
/// server stops waiting for them.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// The seam between a device endpoint and its discovery engine: whoever
/// can rebroadcast a service's current properties.
pub trait Advertiser: Clone + Send + Sync + 'static {
    fn advertise(
        &self,
        info: ServiceInfo,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send;
}

impl Advertiser for DiscoveryEngine {
    fn advertise(
        &self,
        info: ServiceInfo,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send {
        self.update(info)
    }
}

/// What a handler decided: the reply, and whether the mutation warrants a
/// fresh announcement.
pub struct HandlerOutcome {
    pub response: DeviceResponse,
    pub announce: bool,
}

impl HandlerOutcome {
    /// Reply without touching the advertised properties.
    pub fn reply(response: DeviceResponse) -> Self {
        Self {
            response,
            announce: false,
        }
    }

    /// Reply and rebroadcast the (mutated) service info first.
    pub fn announce(response: DeviceResponse) -> Self {
        Self {
            response,
            announce: true,
        }
    }
}

/// Device business logic as an abstract state machine: given a request,
/// mutate the service info (state lives in its properties) and decide the
/// outcome.
pub trait DeviceHandler: Send + 'static {
    fn handle(&mut self, request: &DeviceRequest, info: &mut ServiceInfo) -> HandlerOutcome;
}

/// A device's mutable state: its advertised info plus its handler.
pub struct DeviceState<H> {
    pub info: ServiceInfo,
    pub handler: H,
}

/// Shared handle to a device's state. One lock serializes every apply.
pub type SharedDevice<H> = Arc<Mutex<DeviceState<H>>>;

pub fn shared_device<H: DeviceHandler>(info: ServiceInfo, handler: H) -> SharedDevice<H> {
    Arc::new(Mutex::new(DeviceState { info, handler }))
}

/// Accept loop. Runs until `shutdown` fires, then waits up to
/// [`DRAIN_DEADLINE`] for in-flight connections.
pub async fn serve<A, H>(
    listener: TcpListener,
    advertiser: A,
    device: SharedDevice<H>,
    shutdown: Arc<Notify>,
) -> Result<(), EndpointError>
where
    A: Advertiser,
    H: DeviceHandler,
{
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("endpoint stopping, draining connections");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let advertiser = advertiser.clone();
                        let device = device.clone();
                        let active = active.clone();
                        active.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, advertiser, device).await {
                                warn!(%peer, "connection error: {e}");
                            }
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => error!("accept failed: {e}"),
                }
            }
        }
    }

    let drain_until = tokio::time::Instant::now() + DRAIN_DEADLINE;
    while active.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < drain_until {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

/// One connection: framed request in, framed response out, repeated until
/// the peer hangs up or sends garbage. A bad frame kills only this
/// connection.
async fn handle_connection<A, H>(
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
    advertiser: A,
    device: SharedDevice<H>,
) -> Result<(), EndpointError>
where
    A: Advertiser,
    H: DeviceHandler,
{
    debug!(%peer, "connection accepted");

    loop {
        let request: DeviceRequest = match wire::read_frame(&mut stream).await? {
            Some(request) => request,
            None => {
                debug!(%peer, "peer disconnected");
                return Ok(());
            }
        };

        let response = {
            let mut guard = device.lock().await;
            let DeviceState { info, handler } = &mut *guard;
            let outcome = handler.handle(&request, info);
            if outcome.announce {
                // Announce while still holding the device lock: observers
                // must see the new properties before the caller sees the
                // response, and interleaved appliers must broadcast in
                // commit order.
                if let Err(e) = advertiser.advertise(info.clone()).await {
                    warn!("re-announce after apply failed: {e}");
                }
            }
            outcome.response
        };

        wire::write_frame(&mut stream, &response).await?;
    }
}
