// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Device endpoint over real TCP: framing, pipelining, announce-before-
//! reply ordering and malformed-input isolation.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use washroom::endpoint::{
    self, shared_device, ActuatorAction, Advertiser, DeviceHandler, DeviceRequest, DeviceResponse,
    HandlerOutcome, LightLampAction, SharedDevice,
};
use washroom::error::{DiscoveryError, ErrorDetails};
use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom::wire;

/// Advertiser double that records every re-announcement.
#[derive(Clone, Default)]
struct RecordingAdvertiser {
    updates: Arc<Mutex<Vec<ServiceInfo>>>,
}

impl RecordingAdvertiser {
    fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    fn last_properties(&self) -> Option<BTreeMap<String, String>> {
        self.updates.lock().unwrap().last().map(|i| i.properties.clone())
    }
}

impl Advertiser for RecordingAdvertiser {
    fn advertise(
        &self,
        info: ServiceInfo,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send {
        let updates = self.updates.clone();
        async move {
            updates.lock().unwrap().push(info);
            Ok(())
        }
    }
}

/// Minimal actuator: flips `is_on` per the light action.
struct ToggleHandler;

impl DeviceHandler for ToggleHandler {
    fn handle(&mut self, request: &DeviceRequest, info: &mut ServiceInfo) -> HandlerOutcome {
        match request {
            DeviceRequest::SendActuatorCommand {
                action: ActuatorAction::LightLamp(action),
                ..
            } => {
                if let Some(on) = action.turn_on {
                    info.properties.insert("is_on".into(), on.to_string());
                }
                HandlerOutcome::announce(DeviceResponse::command_ok("toggled"))
            }
            _ => HandlerOutcome::reply(DeviceResponse::error(ErrorDetails::invalid_command(
                "unsupported request",
            ))),
        }
    }
}

fn lamp_info() -> ServiceInfo {
    let mut props = BTreeMap::new();
    props.insert("is_on".to_string(), "false".to_string());
    let mut info = ServiceInfo::new(
        "Light Lamp",
        DeviceCategory::LightLamp,
        DeviceKind::Actuator,
        props,
    );
    info.port = 1; // placeholder, the listener decides
    info.addresses = vec!["127.0.0.1".into()];
    info
}

async fn start_server(
    handler: impl DeviceHandler,
    advertiser: RecordingAdvertiser,
) -> (std::net::SocketAddr, Arc<Notify>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Notify::new());

    let device: SharedDevice<_> = shared_device(lamp_info(), handler);
    tokio::spawn(endpoint::serve(listener, advertiser, device, shutdown.clone()));

    (addr, shutdown)
}

fn turn_on_request(on: bool) -> DeviceRequest {
    DeviceRequest::SendActuatorCommand {
        device_id: "Light Lamp._lightlamp._tcp.local.".into(),
        action: ActuatorAction::LightLamp(LightLampAction {
            turn_on: Some(on),
            ..Default::default()
        }),
    }
}

#[tokio::test]
async fn test_request_response_roundtrip() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, _shutdown) = start_server(ToggleHandler, advertiser.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    wire::write_frame(&mut stream, &turn_on_request(true)).await.unwrap();
    let response: DeviceResponse = wire::read_frame(&mut stream).await.unwrap().unwrap();

    match response {
        DeviceResponse::SendActuatorCommand(r) => assert_eq!(r.message, "toggled"),
        other => panic!("expected command response, got {other:?}"),
    }

    // The announcement happened before the response was written.
    assert_eq!(advertiser.update_count(), 1);
    assert_eq!(
        advertiser.last_properties().unwrap().get("is_on").unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_pipelined_requests_on_one_connection() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, _shutdown) = start_server(ToggleHandler, advertiser.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for on in [true, false, true] {
        wire::write_frame(&mut stream, &turn_on_request(on)).await.unwrap();
        let response: DeviceResponse = wire::read_frame(&mut stream).await.unwrap().unwrap();
        assert!(matches!(response, DeviceResponse::SendActuatorCommand(_)));
    }

    // One broadcast per committed action, final state wins.
    assert_eq!(advertiser.update_count(), 3);
    assert_eq!(
        advertiser.last_properties().unwrap().get("is_on").unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_oversized_frame_kills_only_that_connection() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, _shutdown) = start_server(ToggleHandler, advertiser.clone()).await;

    // A length prefix beyond the 64 KiB limit: the server must hang up.
    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(&(128 * 1024u32).to_be_bytes()).await.unwrap();
    let result: Result<Option<DeviceResponse>, _> = wire::read_frame(&mut bad).await;
    assert!(matches!(result, Ok(None) | Err(_)), "connection must close");

    // A well-behaved connection still works afterwards.
    let mut good = TcpStream::connect(addr).await.unwrap();
    wire::write_frame(&mut good, &turn_on_request(true)).await.unwrap();
    let response: DeviceResponse = wire::read_frame(&mut good).await.unwrap().unwrap();
    assert!(matches!(response, DeviceResponse::SendActuatorCommand(_)));
}

#[tokio::test]
async fn test_garbage_payload_closes_connection() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, _shutdown) = start_server(ToggleHandler, advertiser.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Valid length, nonsense bytes.
    stream.write_all(&8u32.to_be_bytes()).await.unwrap();
    stream.write_all(&[0xff; 8]).await.unwrap();

    let result: Result<Option<DeviceResponse>, _> = wire::read_frame(&mut stream).await;
    assert!(matches!(result, Ok(None) | Err(_)));
    assert_eq!(advertiser.update_count(), 0, "no state change on garbage");
}

#[tokio::test]
async fn test_mid_message_disconnect_is_tolerated() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, _shutdown) = start_server(ToggleHandler, advertiser.clone()).await;

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Announce a 100-byte frame, send 3 bytes, vanish.
        stream.write_all(&100u32.to_be_bytes()).await.unwrap();
        stream.write_all(&[1, 2, 3]).await.unwrap();
    }

    // Server is still alive for the next client.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    wire::write_frame(&mut stream, &turn_on_request(false)).await.unwrap();
    let response: DeviceResponse = wire::read_frame(&mut stream).await.unwrap().unwrap();
    assert!(matches!(response, DeviceResponse::SendActuatorCommand(_)));
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let advertiser = RecordingAdvertiser::default();
    let (addr, shutdown) = start_server(ToggleHandler, advertiser).await;

    // Let the accept loop reach its select before signalling.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    shutdown.notify_waiters();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // Either the connect fails outright or the socket is never served.
    if let Ok(mut stream) = TcpStream::connect(addr).await {
        wire::write_frame(&mut stream, &turn_on_request(true)).await.ok();
        let response: Result<Option<DeviceResponse>, _> = wire::read_frame(&mut stream).await;
        assert!(matches!(response, Ok(None) | Err(_)));
    }
}
