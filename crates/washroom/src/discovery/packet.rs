// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Discovery wire schema.
//!
//! A bespoke, length-framed binary protocol: it borrows the multicast
//! group and record-type names from mDNS but shares no wire bytes with
//! the IETF format. Record variants form a tagged union; consumers match
//! on the tag and new record types are added in exactly one place.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::TransportProtocol;

/// Multicast group shared by every fabric participant.
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// UDP port of the discovery protocol.
pub const MDNS_PORT: u16 = 5369;

/// Meta-name answered with the records of every locally-registered
/// service.
pub const SERVICE_DISCOVERY_NAME: &str = "_services._dns-sd._udp.local";

/// Record type selector for questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    Ptr,
    Srv,
    Txt,
    A,
}

/// One question inside a query request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    pub record_type: RecordType,
}

/// A discovery record: shared envelope plus the type-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdnsRecord {
    pub name: String,
    /// Seconds of validity; 0 is a goodbye.
    pub ttl: u32,
    /// Hint to replace any cached record of the same name.
    pub cache_flush: bool,
    pub data: RecordData,
}

/// Type-specific record payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordData {
    Ptr {
        name: String,
        domain_name: String,
    },
    Srv {
        name: String,
        protocol: TransportProtocol,
        service: String,
        instance: String,
        port: u16,
        target: String,
    },
    Txt {
        name: String,
        entries: BTreeMap<String, String>,
    },
    A {
        name: String,
        address: String,
    },
}

/// Packet body: a query or a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketBody {
    QueryRequest {
        questions: Vec<Question>,
    },
    QueryResponse {
        answers: Vec<MdnsRecord>,
        additional_records: Vec<MdnsRecord>,
    },
}

/// A complete discovery packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdnsPacket {
    /// Random per-send identifier.
    pub transaction_id: u32,
    /// Wall-clock milliseconds since the Unix epoch at send time.
    pub timestamp_ms: u64,
    pub body: PacketBody,
}

impl MdnsPacket {
    pub fn query(questions: Vec<Question>) -> Self {
        Self {
            transaction_id: rand::random(),
            timestamp_ms: now_millis(),
            body: PacketBody::QueryRequest { questions },
        }
    }

    pub fn response(answers: Vec<MdnsRecord>, additional_records: Vec<MdnsRecord>) -> Self {
        Self {
            transaction_id: rand::random(),
            timestamp_ms: now_millis(),
            body: PacketBody::QueryResponse {
                answers,
                additional_records,
            },
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
