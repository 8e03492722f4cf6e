// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Self-echo suppression.
//!
//! The kernel loops multicast traffic back to the sender, so a participant
//! receives its own announcements. The engine remembers the raw bytes of
//! its recent sends in a bounded ring; an inbound datagram matching a
//! remembered send byte-for-byte is dropped before it reaches any handler.
//! The contract is "drop packets I originated", and since the looped-back
//! datagram is the exact buffer that went out, byte equality is sufficient.

use std::collections::VecDeque;

/// Bounded ring of recently sent datagrams.
#[derive(Debug)]
pub struct SentPacketRing {
    packets: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl SentPacketRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember a sent datagram, evicting the oldest past capacity.
    pub fn remember(&mut self, datagram: &[u8]) {
        if self.packets.len() == self.capacity {
            self.packets.pop_front();
        }
        self.packets.push_back(datagram.to_vec());
    }

    /// Whether this exact datagram was recently sent by us.
    pub fn contains(&self, datagram: &[u8]) -> bool {
        self.packets.iter().any(|sent| sent == datagram)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
