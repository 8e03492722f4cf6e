// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Multicast discovery engine.
//!
//! One engine per participant. It owns the multicast socket, keeps the map
//! of locally-registered services, answers queries for them, re-announces
//! them before their TTL runs out and forwards every non-self inbound
//! packet to subscribers. Devices embed one to advertise themselves; the
//! gateway embeds one purely as a listener.

pub mod packet;
pub mod records;
mod seen;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::error::{DiscoveryError, WireError};
use crate::types::ServiceInfo;
use crate::wire::{decode_frame, encode_frame, MAX_FRAME_LEN};

pub use packet::{
    MdnsPacket, MdnsRecord, PacketBody, Question, RecordData, RecordType, MDNS_GROUP, MDNS_PORT,
    SERVICE_DISCOVERY_NAME,
};
pub use records::{services_from_records, DiscoveredService};
pub use seen::SentPacketRing;

/// Tuning knobs for a discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Multicast group to join.
    pub group: std::net::Ipv4Addr,
    /// UDP port shared by all participants.
    pub port: u16,
    /// Probe rounds that must pass without a collision before a name is
    /// committed.
    pub tiebreak_attempts: u32,
    /// Spacing between probe rounds.
    pub tiebreak_interval: Duration,
    /// Random extra spacing added to each probe round.
    pub tiebreak_max_drift: Duration,
    /// Random pre-registration sleep bounds, to desynchronize simultaneous
    /// startups.
    pub startup_jitter_ms: (u64, u64),
    /// How many renames to try before giving up on a unique name.
    pub rename_budget: u32,
    /// Raw sends remembered for self-echo suppression.
    pub sent_ring_capacity: usize,
    /// Per-subscriber inbound queue depth.
    pub inbound_queue: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: MDNS_GROUP,
            port: MDNS_PORT,
            tiebreak_attempts: 3,
            tiebreak_interval: Duration::from_millis(100),
            tiebreak_max_drift: Duration::from_millis(25),
            startup_jitter_ms: (150, 250),
            rename_budget: 8,
            sent_ring_capacity: 50,
            inbound_queue: 256,
        }
    }
}

struct Registered {
    info: ServiceInfo,
    next_announce_at: Instant,
}

struct EngineInner {
    config: DiscoveryConfig,
    socket: UdpSocket,
    target: SocketAddr,
    /// Locally-registered services keyed by FQDN; the map itself rules
    /// out two registrations sharing a name.
    services: Mutex<HashMap<String, Registered>>,
    /// Raw bytes of recent sends.
    sent: Mutex<SentPacketRing>,
    /// FQDNs other participants claim, with expiry. Fed by inbound PTR
    /// records and consulted by tiebreaking.
    claims: Mutex<HashMap<String, Instant>>,
    subscribers: Mutex<Vec<mpsc::Sender<MdnsPacket>>>,
    shutdown: Notify,
}

/// Handle to a running discovery engine. Cheap to clone.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl DiscoveryEngine {
    /// Bind the multicast socket and start the receive and renewal loops.
    pub fn start(config: DiscoveryConfig) -> std::io::Result<Self> {
        let std_socket = crate::net::multicast_socket(config.group, config.port)?;
        let socket = UdpSocket::from_std(std_socket)?;
        let target = SocketAddr::new(config.group.into(), config.port);

        info!(group = %config.group, port = config.port, "discovery engine listening");

        let engine = Self {
            inner: Arc::new(EngineInner {
                sent: Mutex::new(SentPacketRing::new(config.sent_ring_capacity)),
                services: Mutex::new(HashMap::new()),
                claims: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                shutdown: Notify::new(),
                config,
                socket,
                target,
            }),
        };

        let recv = engine.clone();
        tokio::spawn(async move { recv.recv_loop().await });

        let renew = engine.clone();
        tokio::spawn(async move { renew.renovation_loop().await });

        Ok(engine)
    }

    /// Register a service: tiebreak its name, then announce it and keep
    /// renewing until unregistered.
    ///
    /// Returns the committed [`ServiceInfo`] - the instance name may have
    /// been renamed to resolve a collision.
    pub async fn register(&self, mut info: ServiceInfo) -> Result<ServiceInfo, DiscoveryError> {
        if info.port == 0 {
            return Err(DiscoveryError::InvalidPort { fqdn: info.fqdn() });
        }

        debug!(service = %info.fqdn(), port = info.port, "registering service");

        // Desynchronize simultaneous startups before probing.
        let (lo, hi) = self.inner.config.startup_jitter_ms;
        let jitter = rand::rng().random_range(lo..=hi);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        self.tiebreak(&mut info).await?;

        let fqdn = info.fqdn();
        {
            let mut services = self.inner.services.lock();
            services.insert(
                fqdn.clone(),
                Registered {
                    info: info.clone(),
                    next_announce_at: Instant::now() + renew_interval(info.ttl_seconds),
                },
            );
        }

        if let Err(e) = self.announce(&info).await {
            warn!(service = %fqdn, "initial announcement failed, renewal will retry: {e}");
        }
        info!(service = %fqdn, "service registered");
        Ok(info)
    }

    /// Re-announce a registered service with fresh properties.
    pub async fn update(&self, info: ServiceInfo) -> Result<(), DiscoveryError> {
        let fqdn = info.fqdn();
        {
            let mut services = self.inner.services.lock();
            let entry = services
                .get_mut(&fqdn)
                .ok_or_else(|| DiscoveryError::NotRegistered { fqdn: fqdn.clone() })?;
            entry.info = info.clone();
            entry.next_announce_at = Instant::now() + renew_interval(info.ttl_seconds);
        }

        if let Err(e) = self.announce(&info).await {
            warn!(service = %fqdn, "update announcement failed, renewal will retry: {e}");
        }
        Ok(())
    }

    /// Unregister a service: broadcast a goodbye (TTL 0) and stop renewing.
    pub async fn unregister(&self, fqdn: &str) -> Result<(), DiscoveryError> {
        let mut info = {
            let mut services = self.inner.services.lock();
            services
                .remove(fqdn)
                .ok_or_else(|| DiscoveryError::NotRegistered {
                    fqdn: fqdn.to_string(),
                })?
                .info
        };

        info.ttl_seconds = 0;
        self.announce(&info).await?;
        info!(service = %fqdn, "service unregistered");
        Ok(())
    }

    /// Subscribe to every parsed, non-self inbound packet, in arrival
    /// order. The gateway registry feeds on this.
    pub fn subscribe_inbound(&self) -> mpsc::Receiver<MdnsPacket> {
        let (tx, rx) = mpsc::channel(self.inner.config.inbound_queue);
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Multicast a PTR query for a service type (or the service-discovery
    /// meta-name). Used by a late-starting gateway to repopulate quickly.
    pub async fn query(&self, service_type: &str) -> Result<(), DiscoveryError> {
        let packet = MdnsPacket::query(vec![Question {
            name: service_type.to_string(),
            record_type: RecordType::Ptr,
        }]);
        self.send_packet(&packet).await?;
        Ok(())
    }

    /// Snapshot of the currently registered services.
    pub fn registered_services(&self) -> Vec<ServiceInfo> {
        self.inner
            .services
            .lock()
            .values()
            .map(|r| r.info.clone())
            .collect()
    }

    /// Broadcast goodbyes for everything still registered, then stop the
    /// engine's tasks.
    pub async fn shutdown(&self) {
        let mut leaving: Vec<ServiceInfo> = {
            let mut services = self.inner.services.lock();
            services.drain().map(|(_, r)| r.info).collect()
        };

        for info in &mut leaving {
            info.ttl_seconds = 0;
            if let Err(e) = self.announce(info).await {
                warn!(service = %info.fqdn(), "goodbye failed: {e}");
            } else {
                debug!(service = %info.fqdn(), "goodbye sent");
            }
        }

        self.inner.shutdown.notify_waiters();
    }

    async fn recv_loop(self) {
        let mut buf = vec![0u8; MAX_FRAME_LEN + 4];
        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => {
                    debug!("receive loop stopping");
                    break;
                }
                result = self.inner.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                        Err(e) => {
                            error!("multicast receive failed, stopping engine: {e}");
                            self.inner.shutdown.notify_waiters();
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        if self.inner.sent.lock().contains(datagram) {
            trace!(%peer, "dropping self-echo");
            return;
        }

        let packet: MdnsPacket = match decode_frame(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%peer, len = datagram.len(), "discarding malformed datagram: {e}");
                return;
            }
        };

        match &packet.body {
            PacketBody::QueryResponse { answers, .. } => {
                self.record_claims(answers);
            }
            PacketBody::QueryRequest { questions } => {
                self.answer_query(questions).await;
            }
        }

        self.forward_to_subscribers(packet);
    }

    /// Track which FQDNs other participants claim; tiebreaking consults
    /// this. A goodbye clears the claim.
    fn record_claims(&self, answers: &[MdnsRecord]) {
        let mut claims = self.inner.claims.lock();
        for record in answers {
            if let RecordData::Ptr { domain_name, .. } = &record.data {
                if record.ttl == 0 {
                    claims.remove(domain_name);
                } else {
                    claims.insert(
                        domain_name.clone(),
                        Instant::now() + Duration::from_secs(u64::from(record.ttl)),
                    );
                }
            }
        }
    }

    async fn answer_query(&self, questions: &[Question]) {
        let mut answers = Vec::new();
        let mut additional_records = Vec::new();

        {
            let services = self.inner.services.lock();
            for question in questions {
                for registered in services.values() {
                    let matches = question.name == SERVICE_DISCOVERY_NAME
                        || question.name == registered.info.service_type;
                    if !matches {
                        continue;
                    }
                    let mut records = registered.info.to_records();
                    additional_records.extend(records.split_off(1));
                    answers.extend(records);
                }
            }
        }

        // Nothing of ours matched: stay silent.
        if answers.is_empty() {
            return;
        }

        let packet = MdnsPacket::response(answers, additional_records);
        if let Err(e) = self.send_packet(&packet).await {
            warn!("failed to answer query: {e}");
        }
    }

    fn forward_to_subscribers(&self, packet: MdnsPacket) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(packet.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("inbound subscriber queue full, dropping packet");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Broadcast one announcement for `info` (a goodbye when its TTL is 0).
    async fn announce(&self, info: &ServiceInfo) -> Result<(), WireError> {
        let mut records = info.to_records();
        let additional_records = records.split_off(1);
        let packet = MdnsPacket::response(records, additional_records);
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &MdnsPacket) -> Result<(), WireError> {
        let buf = encode_frame(packet)?;
        self.inner.sent.lock().remember(&buf);
        self.inner.socket.send_to(&buf, self.inner.target).await?;
        trace!(len = buf.len(), txid = packet.transaction_id, "packet sent");
        Ok(())
    }

    /// Probe-and-rename until `info`'s FQDN survives the configured number
    /// of collision-free probe rounds.
    async fn tiebreak(&self, info: &mut ServiceInfo) -> Result<(), DiscoveryError> {
        let base = info.instance_name.clone();
        let mut renames = 0u32;
        let mut clean_rounds = 0u32;

        loop {
            let fqdn = info.fqdn();
            if self.is_claimed(&fqdn) {
                if !info.allow_name_change {
                    return Err(DiscoveryError::NameConflict { name: fqdn });
                }
                if renames >= self.inner.config.rename_budget {
                    return Err(DiscoveryError::RenameBudgetExhausted {
                        name: base,
                        attempts: renames,
                    });
                }
                info.instance_name = rename_instance(&base);
                renames += 1;
                clean_rounds = 0;
                debug!(candidate = %info.fqdn(), "name collision, retrying with new name");
                continue;
            }

            if clean_rounds >= self.inner.config.tiebreak_attempts {
                break;
            }

            if let Err(e) = self.query(SERVICE_DISCOVERY_NAME).await {
                warn!("tiebreak probe failed: {e}");
            }

            let drift_ms = rand::rng()
                .random_range(0..=self.inner.config.tiebreak_max_drift.as_millis() as u64);
            tokio::time::sleep(self.inner.config.tiebreak_interval + Duration::from_millis(drift_ms))
                .await;
            clean_rounds += 1;
        }

        if renames > 0 {
            info!(
                original = %base,
                committed = %info.instance_name,
                "tiebreaking renamed instance"
            );
        }
        Ok(())
    }

    fn is_claimed(&self, fqdn: &str) -> bool {
        let claims = self.inner.claims.lock();
        claims
            .get(fqdn)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Re-announce every service whose renewal deadline passed. Runs at
    /// 1 Hz; a missed cycle just re-announces on the next, never twice.
    async fn renovation_loop(self) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => {
                    debug!("renovation loop stopping");
                    break;
                }
                _ = tick.tick() => {
                    let due: Vec<ServiceInfo> = {
                        let now = Instant::now();
                        let mut services = self.inner.services.lock();
                        services
                            .values_mut()
                            .filter(|r| now >= r.next_announce_at)
                            .map(|r| {
                                r.next_announce_at = now + renew_interval(r.info.ttl_seconds);
                                r.info.clone()
                            })
                            .collect()
                    };

                    for info in due {
                        match self.announce(&info).await {
                            Ok(()) => trace!(service = %info.fqdn(), "ttl renewed"),
                            Err(e) => warn!(
                                service = %info.fqdn(),
                                "renewal send failed, retrying next cycle: {e}"
                            ),
                        }
                    }
                }
            }
        }
    }
}

/// Renewal period: 75% of the advertised TTL, never below one second.
fn renew_interval(ttl_seconds: u32) -> Duration {
    Duration::from_secs_f64(f64::from(ttl_seconds) * 0.75).max(Duration::from_secs(1))
}

/// A fresh candidate name: the configured base plus a short random suffix.
fn rename_instance(base: &str) -> String {
    let suffix: u16 = rand::rng().random();
    format!("{base}-{suffix:04x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_interval_is_three_quarters_of_ttl() {
        assert_eq!(renew_interval(4500), Duration::from_secs(3375));
        assert_eq!(renew_interval(60), Duration::from_secs(45));
    }

    #[test]
    fn test_renew_interval_floor() {
        assert_eq!(renew_interval(0), Duration::from_secs(1));
        assert_eq!(renew_interval(1), Duration::from_secs(1));
    }

    #[test]
    fn test_rename_keeps_base_and_varies() {
        let a = rename_instance("Light Lamp");
        let b = rename_instance("Light Lamp");
        assert!(a.starts_with("Light Lamp-"));
        assert_eq!(a.len(), "Light Lamp-".len() + 4);
        // Suffixes are random; 1-in-65536 flake accepted.
        assert_ne!(a, b);
    }

    #[test]
    fn test_rename_always_derives_from_base_not_previous() {
        // A second collision must not stack suffixes.
        let renamed = rename_instance("Sink");
        let renamed_again = rename_instance("Sink");
        assert_eq!(renamed.matches('-').count(), 1);
        assert_eq!(renamed_again.matches('-').count(), 1);
    }
}
