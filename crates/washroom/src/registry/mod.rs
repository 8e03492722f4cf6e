// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Gateway device registry.
//!
//! Consumes the discovery engine's inbound feed (the registry itself never
//! registers a service), keeps the authoritative map of known devices,
//! probes their TCP ports for liveness, expires them by TTL and fans
//! change events out to subscribers.
//!
//! Reconciliation policy for two senders announcing the same FQDN: last
//! writer wins per field, expiry is the maximum of all advertisements.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::discovery::records::DiscoveredService;
use crate::discovery::{services_from_records, MdnsPacket, PacketBody};
use crate::endpoint::protocol::{ActuatorAction, DeviceRequest, DeviceResponse};
use crate::error::{ErrorCode, ErrorDetails, RegistryError};
use crate::types::{DeviceCategory, DeviceKind, DeviceStatus, TransportProtocol};
use crate::wire;

/// Tuning knobs for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Period of the combined probe/expiry sweep.
    pub probe_interval: Duration,
    /// TCP connect timeout of one liveness probe.
    pub probe_timeout: Duration,
    /// Connect/read timeout of one command dispatch.
    pub command_timeout: Duration,
    /// Per-subscriber event buffer; overflow drops the oldest events and
    /// surfaces a resync signal instead.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(2),
            event_capacity: 64,
        }
    }
}

/// One known device. Owned by the registry; the outside world sees
/// [`DeviceSnapshot`]s.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub id: String,
    pub device_name: String,
    pub kind: DeviceKind,
    pub category: DeviceCategory,
    pub transport: TransportProtocol,
    pub port: u16,
    pub addresses: Vec<String>,
    pub properties: std::collections::BTreeMap<String, String>,
    pub status: DeviceStatus,
    pub expires_at: Instant,
    pub last_health_ok_at: Option<Instant>,
}

impl DeviceEntry {
    fn from_discovered(service: DiscoveredService, expires_at: Instant) -> Self {
        Self {
            id: service.fqdn,
            device_name: service.instance_name,
            kind: service.kind,
            category: service.category,
            transport: service.transport,
            port: service.port,
            addresses: service.addresses,
            properties: service.properties,
            status: DeviceStatus::Unknown,
            expires_at,
            last_health_ok_at: None,
        }
    }

    /// Apply a fresh advertisement, last writer wins per field. Returns
    /// whether any observable field changed.
    fn merge(&mut self, service: DiscoveredService) -> bool {
        let changed = self.device_name != service.instance_name
            || self.kind != service.kind
            || self.category != service.category
            || self.transport != service.transport
            || self.port != service.port
            || self.addresses != service.addresses
            || self.properties != service.properties;

        self.device_name = service.instance_name;
        self.kind = service.kind;
        self.category = service.category;
        self.transport = service.transport;
        self.port = service.port;
        self.addresses = service.addresses;
        self.properties = service.properties;
        changed
    }

    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id.clone(),
            device_name: self.device_name.clone(),
            kind: self.kind,
            category: self.category,
            transport: self.transport,
            port: self.port,
            addresses: self.addresses.clone(),
            properties: self.properties.clone(),
            status: self.status,
            expires_in_secs: self.expires_at.saturating_duration_since(Instant::now()).as_secs(),
        }
    }

    /// First dialable (address, port) pair, as a socket address string.
    fn dial_address(&self) -> Option<String> {
        self.addresses
            .first()
            .map(|address| format!("{address}:{}", self.port))
    }
}

/// Serializable projection of a [`DeviceEntry`], carried on the event
/// stream and in API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: String,
    pub device_name: String,
    pub kind: DeviceKind,
    pub category: DeviceCategory,
    pub transport: TransportProtocol,
    pub port: u16,
    pub addresses: Vec<String>,
    pub properties: std::collections::BTreeMap<String, String>,
    pub status: DeviceStatus,
    pub expires_in_secs: u64,
}

/// Registry change notifications. Every event carries the full snapshot
/// taken at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceEvent {
    Added(DeviceSnapshot),
    Changed(DeviceSnapshot),
    Removed(DeviceSnapshot),
}

impl DeviceEvent {
    pub fn snapshot(&self) -> &DeviceSnapshot {
        match self {
            Self::Added(s) | Self::Changed(s) | Self::Removed(s) => s,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Changed(_) => "changed",
            Self::Removed(_) => "removed",
        }
    }
}

struct RegistryInner {
    config: RegistryConfig,
    devices: RwLock<HashMap<String, DeviceEntry>>,
    events: broadcast::Sender<DeviceEvent>,
    shutdown: Notify,
}

/// Handle to the gateway registry. Cheap to clone.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                devices: RwLock::new(HashMap::new()),
                events,
                shutdown: Notify::new(),
            }),
        }
    }

    /// Subscribe to the event stream. A receiver that falls more than the
    /// configured buffer behind observes a `Lagged` error - the caller's
    /// cue to re-list - and resumes with the oldest retained event.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn the ingest task (draining `inbound`) and the probe/expiry
    /// task.
    pub fn run(&self, inbound: mpsc::Receiver<MdnsPacket>) {
        let ingest = self.clone();
        tokio::spawn(async move { ingest.ingest_loop(inbound).await });

        let probe = self.clone();
        tokio::spawn(async move { probe.probe_loop().await });
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.notify_waiters();
    }

    async fn ingest_loop(self, mut inbound: mpsc::Receiver<MdnsPacket>) {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => {
                    debug!("ingest loop stopping");
                    break;
                }
                packet = inbound.recv() => {
                    match packet {
                        Some(packet) => self.ingest(&packet).await,
                        None => {
                            debug!("inbound feed closed, ingest loop stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Fold one inbound packet into the device map. Queries are ignored;
    /// responses are grouped into services and merged.
    pub async fn ingest(&self, packet: &MdnsPacket) {
        let PacketBody::QueryResponse {
            answers,
            additional_records,
        } = &packet.body
        else {
            return;
        };

        let services = services_from_records(answers, additional_records);
        if services.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut devices = self.inner.devices.write().await;
            for service in services {
                // A goodbye forces immediate removal, whatever the entry's
                // remaining TTL said.
                if service.ttl_seconds == 0 {
                    if let Some(entry) = devices.remove(&service.fqdn) {
                        info!(device = %entry.id, "device said goodbye");
                        events.push(DeviceEvent::Removed(entry.snapshot()));
                    }
                    continue;
                }

                let expires_at =
                    now + Duration::from_secs(u64::from(service.ttl_seconds.max(1)));

                match devices.entry(service.fqdn.clone()) {
                    std::collections::hash_map::Entry::Occupied(mut occupied) => {
                        let entry = occupied.get_mut();
                        let changed = entry.merge(service);
                        // Ingest only ever advances expiry (max of all
                        // advertisements).
                        entry.expires_at = entry.expires_at.max(expires_at);
                        if changed {
                            trace!(device = %entry.id, "device properties changed");
                            events.push(DeviceEvent::Changed(entry.snapshot()));
                        }
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        let entry = DeviceEntry::from_discovered(service, expires_at);
                        info!(device = %entry.id, port = entry.port, "device discovered");
                        events.push(DeviceEvent::Added(entry.snapshot()));
                        vacant.insert(entry);
                    }
                }
            }
        }

        self.emit(events);
    }

    async fn probe_loop(self) {
        let mut tick = tokio::time::interval(self.inner.config.probe_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => {
                    debug!("probe loop stopping");
                    break;
                }
                _ = tick.tick() => self.sweep().await,
            }
        }
    }

    /// One combined expiry + liveness sweep. Public so callers (and tests)
    /// can force a sweep outside the periodic schedule.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut events = Vec::new();

        // Expiry first: no point probing a corpse.
        let targets: Vec<(String, Option<String>)> = {
            let mut devices = self.inner.devices.write().await;
            let expired: Vec<String> = devices
                .values()
                .filter(|entry| entry.expires_at < now)
                .map(|entry| entry.id.clone())
                .collect();
            for id in expired {
                if let Some(entry) = devices.remove(&id) {
                    info!(device = %id, "device expired");
                    events.push(DeviceEvent::Removed(entry.snapshot()));
                }
            }

            devices
                .values()
                .map(|entry| (entry.id.clone(), entry.dial_address()))
                .collect()
        };

        // Probe without holding the lock.
        let mut results = Vec::with_capacity(targets.len());
        for (id, dial) in targets {
            let alive = match dial {
                Some(ref address) => self.probe_once(address).await,
                None => false,
            };
            results.push((id, alive));
        }

        {
            let mut devices = self.inner.devices.write().await;
            let now = Instant::now();
            for (id, alive) in results {
                // The entry may have said goodbye while we probed.
                let Some(entry) = devices.get_mut(&id) else {
                    continue;
                };
                let status = if alive {
                    DeviceStatus::Online
                } else {
                    DeviceStatus::Offline
                };
                if alive {
                    entry.last_health_ok_at = Some(now);
                }
                if entry.status != status {
                    debug!(device = %id, from = %entry.status, to = %status, "status transition");
                    entry.status = status;
                    events.push(DeviceEvent::Changed(entry.snapshot()));
                }
            }
        }

        self.emit(events);
    }

    async fn probe_once(&self, address: &str) -> bool {
        let Ok(addr) = address.parse::<SocketAddr>() else {
            return false;
        };
        matches!(
            timeout(self.inner.config.probe_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    /// All known devices matching the filters, ordered by id.
    pub async fn list_devices(
        &self,
        filter_kind: Option<DeviceKind>,
        filter_name: Option<&str>,
    ) -> Vec<DeviceSnapshot> {
        let needle = filter_name.map(str::to_lowercase);
        let devices = self.inner.devices.read().await;
        let mut snapshots: Vec<DeviceSnapshot> = devices
            .values()
            .filter(|entry| filter_kind.map(|k| entry.kind == k).unwrap_or(true))
            .filter(|entry| {
                needle
                    .as_deref()
                    .map(|n| entry.device_name.to_lowercase().contains(n))
                    .unwrap_or(true)
            })
            .map(DeviceEntry::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    pub async fn device_count(&self) -> usize {
        self.inner.devices.read().await.len()
    }

    /// Dispatch an actuator command to a device over a short-lived TCP
    /// connection and return the device's message.
    pub async fn send_actuator_command(
        &self,
        device_id: &str,
        action: ActuatorAction,
    ) -> Result<String, ErrorDetails> {
        let (address, kind, status) = {
            let devices = self.inner.devices.read().await;
            let entry = devices
                .get(device_id)
                .ok_or_else(|| ErrorDetails::device_not_found(device_id))?;
            (entry.dial_address(), entry.kind, entry.status)
        };

        if kind != DeviceKind::Actuator {
            return Err(ErrorDetails::invalid_command(format!(
                "device {device_id} is a {kind}, not an actuator"
            )));
        }
        if status == DeviceStatus::Offline {
            return Err(ErrorDetails::new(
                ErrorCode::DeviceOffline,
                format!("device {device_id} is offline"),
            )
            .with_metadata("device_id", device_id));
        }

        let address = address.ok_or_else(|| {
            ErrorDetails::new(
                ErrorCode::DeviceOffline,
                format!("device {device_id} advertised no address"),
            )
            .with_metadata("device_id", device_id)
        })?;

        self.dispatch(device_id, &address, action).await
    }

    async fn dispatch(
        &self,
        device_id: &str,
        address: &str,
        action: ActuatorAction,
    ) -> Result<String, ErrorDetails> {
        let request = DeviceRequest::SendActuatorCommand {
            device_id: device_id.to_string(),
            action,
        };

        match self.exchange(address, &request).await {
            Ok(DeviceResponse::SendActuatorCommand(r)) => Ok(r.message),
            // The device's own error passes through untouched.
            Ok(DeviceResponse::Error(details)) => Err(details),
            Ok(DeviceResponse::Empty) => Ok(String::new()),
            Err(e) => {
                warn!(device = %device_id, %address, "command dispatch failed: {e}");
                Err(ErrorDetails::device_offline(device_id, address))
            }
        }
    }

    /// One framed request/response exchange over a short-lived connection.
    async fn exchange(
        &self,
        address: &str,
        request: &DeviceRequest,
    ) -> Result<DeviceResponse, RegistryError> {
        let addr: SocketAddr = address.parse().map_err(|_| RegistryError::BadAddress {
            address: address.to_string(),
        })?;
        let command_timeout = self.inner.config.command_timeout;

        let mut stream = match timeout(command_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(RegistryError::Connect {
                    address: address.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(RegistryError::ConnectTimeout {
                    address: address.to_string(),
                });
            }
        };

        wire::write_frame(&mut stream, request).await?;

        match timeout(command_timeout, wire::read_frame(&mut stream)).await {
            Ok(Ok(Some(response))) => Ok(response),
            Ok(Ok(None)) => Err(RegistryError::NoResponse {
                address: address.to_string(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(RegistryError::ResponseTimeout {
                address: address.to_string(),
            }),
        }
    }

    fn emit(&self, events: Vec<DeviceEvent>) {
        for event in events {
            // Err just means nobody is subscribed right now.
            let _ = self.inner.events.send(event);
        }
    }
}
