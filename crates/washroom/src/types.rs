// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Shared data model: device enumerations and [`ServiceInfo`].

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default TTL advertised by devices, in seconds.
pub const DEFAULT_TTL_SECS: u32 = 4500;

/// Reserved TXT keys derived from [`ServiceInfo`] fields. User-supplied
/// properties cannot shadow them.
pub const TXT_KEY_KIND: &str = "kind";
pub const TXT_KEY_CATEGORY: &str = "category";

/// What a device fundamentally is: something that reports, or something
/// that can be told what to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Unknown,
    Sensor,
    Actuator,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Sensor => "sensor",
            Self::Actuator => "actuator",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sensor" => Ok(Self::Sensor),
            "actuator" => Ok(Self::Actuator),
            _ => Err(()),
        }
    }
}

/// Closed set of device categories served by the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCategory {
    Unknown,
    LightLamp,
    FartDetector,
    Toilet,
    Sink,
    WaterLeak,
}

impl DeviceCategory {
    /// The service type label this category announces under.
    pub fn service_type(&self) -> &'static str {
        match self {
            Self::Unknown => "_unknown._tcp.local.",
            Self::LightLamp => "_lightlamp._tcp.local.",
            Self::FartDetector => "_fartdetector._tcp.local.",
            Self::Toilet => "_toilet._tcp.local.",
            Self::Sink => "_sink._tcp.local.",
            Self::WaterLeak => "_waterleak._tcp.local.",
        }
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::LightLamp => "light_lamp",
            Self::FartDetector => "fart_detector",
            Self::Toilet => "toilet",
            Self::Sink => "sink",
            Self::WaterLeak => "water_leak",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light_lamp" => Ok(Self::LightLamp),
            "fart_detector" => Ok(Self::FartDetector),
            "toilet" => Ok(Self::Toilet),
            "sink" => Ok(Self::Sink),
            "water_leak" => Ok(Self::WaterLeak),
            _ => Err(()),
        }
    }
}

/// Transport a device endpoint listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    Unknown,
    Tcp,
    Udp,
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        };
        f.write_str(s)
    }
}

/// Registry-side liveness state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Unknown,
    Offline,
    Online,
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The fully-qualified domain name of a service instance.
///
/// This is the stable identity of a service across the network once
/// tiebreaking has converged.
pub fn domain_name(service_type: &str, instance_name: &str) -> String {
    format!("{instance_name}.{service_type}")
}

/// A service as registered with the discovery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Human-readable instance name; may be renamed by tiebreaking.
    pub instance_name: String,
    /// Hierarchical type label, e.g. `_lightlamp._tcp.local.`.
    pub service_type: String,
    /// TCP port of the device endpoint.
    pub port: u16,
    /// IPv4 addresses of this participant (loopback and container bridge
    /// ranges excluded).
    pub addresses: Vec<String>,
    pub kind: DeviceKind,
    pub category: DeviceCategory,
    pub transport: TransportProtocol,
    /// Device-specific key/value properties advertised via TXT.
    pub properties: BTreeMap<String, String>,
    /// Advertised TTL in seconds; 0 signals a goodbye.
    pub ttl_seconds: u32,
    /// Whether tiebreaking may rename this instance on conflict.
    pub allow_name_change: bool,
}

impl ServiceInfo {
    pub fn new(
        instance_name: impl Into<String>,
        category: DeviceCategory,
        kind: DeviceKind,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            service_type: category.service_type().to_string(),
            port: 0,
            addresses: crate::net::local_ipv4_addresses(),
            kind,
            category,
            transport: TransportProtocol::Tcp,
            properties,
            ttl_seconds: DEFAULT_TTL_SECS,
            allow_name_change: true,
        }
    }

    /// `"{instance_name}.{service_type}"` - unique after tiebreaking.
    pub fn fqdn(&self) -> String {
        domain_name(&self.service_type, &self.instance_name)
    }

    /// TXT entries: `kind` and `category` merged over the user properties.
    /// The derived keys always win.
    pub fn txt_entries(&self) -> BTreeMap<String, String> {
        let mut entries = self.properties.clone();
        entries.insert(TXT_KEY_KIND.to_string(), self.kind.to_string());
        entries.insert(TXT_KEY_CATEGORY.to_string(), self.category.to_string());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_name() {
        assert_eq!(
            domain_name("_lightlamp._tcp.local.", "Light Lamp"),
            "Light Lamp._lightlamp._tcp.local."
        );
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!("actuator".parse::<DeviceKind>().unwrap(), DeviceKind::Actuator);
        assert_eq!("SENSOR".parse::<DeviceKind>().unwrap(), DeviceKind::Sensor);
        assert!("robot".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_category_service_type() {
        assert_eq!(
            DeviceCategory::WaterLeak.service_type(),
            "_waterleak._tcp.local."
        );
        assert_eq!(
            "water_leak".parse::<DeviceCategory>().unwrap(),
            DeviceCategory::WaterLeak
        );
    }

    #[test]
    fn test_txt_entries_reserved_keys_win() {
        let mut props = BTreeMap::new();
        props.insert("kind".to_string(), "spoofed".to_string());
        props.insert("brightness".to_string(), "75".to_string());
        let info = ServiceInfo::new(
            "Light Lamp",
            DeviceCategory::LightLamp,
            DeviceKind::Actuator,
            props,
        );

        let txt = info.txt_entries();
        assert_eq!(txt.get("kind").unwrap(), "actuator");
        assert_eq!(txt.get("category").unwrap(), "light_lamp");
        assert_eq!(txt.get("brightness").unwrap(), "75");
    }
}
