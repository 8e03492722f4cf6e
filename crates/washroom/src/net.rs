// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Socket construction and interface discovery.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

/// IPv4 prefixes never advertised: loopback plus the usual container
/// bridge ranges.
const EXCLUDED_PREFIXES: &[&str] = &[
    "127.", "172.17.", "172.18.", "172.19.", "172.20.", "172.21.", "172.22.",
];

/// Build a UDP socket usable for both sending to and receiving from a
/// multicast group.
///
/// Address and port reuse are enabled so that multiple participants on the
/// same host (several devices plus a gateway) coexist on the shared port.
/// Multicast loopback stays on - self-echo suppression is handled one
/// layer up by the discovery engine.
pub fn multicast_socket(group: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    socket.bind(&bind_addr.into())?;

    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_loop_v4(true)?;
    let _ = socket.set_multicast_ttl_v4(1);

    Ok(socket.into())
}

/// All advertisable IPv4 addresses of this host as strings.
///
/// Loopback and container bridge addresses are filtered out: peers cannot
/// dial us on those, so announcing them would only produce dead probe
/// targets on the gateway.
pub fn local_ipv4_addresses() -> Vec<String> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            tracing::debug!("failed to list network interfaces: {e}");
            return Vec::new();
        }
    };

    let mut addresses = Vec::new();
    for (_name, ip) in interfaces {
        let IpAddr::V4(ipv4) = ip else { continue };
        let text = ipv4.to_string();
        if EXCLUDED_PREFIXES.iter().any(|p| text.starts_with(p)) {
            continue;
        }
        if !addresses.contains(&text) {
            addresses.push(text);
        }
    }

    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_addresses_exclude_loopback_and_bridges() {
        for addr in local_ipv4_addresses() {
            assert!(!addr.starts_with("127."), "loopback leaked: {addr}");
            assert!(!addr.starts_with("172.17."), "bridge leaked: {addr}");
        }
    }

    #[test]
    fn test_multicast_socket_send_and_receive_on_shared_port() {
        let group = Ipv4Addr::new(224, 0, 0, 251);
        // An uncommon port so the test does not collide with running fabrics.
        let port = 5969;

        let a = multicast_socket(group, port).expect("first bind");
        let b = multicast_socket(group, port).expect("second bind on same port");

        // Both sockets bound the shared port; that is the property devices
        // and gateway on one host rely on.
        assert_eq!(a.local_addr().unwrap().port(), port);
        assert_eq!(b.local_addr().unwrap().port(), port);
    }
}
