// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Mapping between [`ServiceInfo`] and discovery records.
//!
//! One announcement carries, in order: a PTR answer, then per-address A
//! records, one SRV and one TXT as additional records. Cache-flush is set
//! on everything except the PTR.

use std::collections::BTreeMap;

use crate::discovery::packet::{MdnsRecord, RecordData};
use crate::types::{
    DeviceCategory, DeviceKind, ServiceInfo, TransportProtocol, TXT_KEY_CATEGORY, TXT_KEY_KIND,
};

impl ServiceInfo {
    /// Build the announcement records for this service. The PTR record is
    /// always first; callers split it off as the answer.
    pub fn to_records(&self) -> Vec<MdnsRecord> {
        let fqdn = self.fqdn();
        let mut records = Vec::with_capacity(3 + self.addresses.len());

        records.push(MdnsRecord {
            name: self.service_type.clone(),
            ttl: self.ttl_seconds,
            cache_flush: false,
            data: RecordData::Ptr {
                name: self.service_type.clone(),
                domain_name: fqdn.clone(),
            },
        });

        for address in &self.addresses {
            records.push(MdnsRecord {
                name: fqdn.clone(),
                ttl: self.ttl_seconds,
                cache_flush: true,
                data: RecordData::A {
                    name: fqdn.clone(),
                    address: address.clone(),
                },
            });
        }

        let service_label = self
            .service_type
            .split('.')
            .next()
            .unwrap_or("_unknown")
            .to_string();

        records.push(MdnsRecord {
            name: fqdn.clone(),
            ttl: self.ttl_seconds,
            cache_flush: true,
            data: RecordData::Srv {
                name: self.instance_name.clone(),
                protocol: self.transport,
                service: service_label,
                instance: self.instance_name.clone(),
                port: self.port,
                target: fqdn.clone(),
            },
        });

        records.push(MdnsRecord {
            name: fqdn.clone(),
            ttl: self.ttl_seconds,
            cache_flush: true,
            data: RecordData::Txt {
                name: fqdn,
                entries: self.txt_entries(),
            },
        });

        records
    }
}

/// A service reconstructed from one response's record group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub fqdn: String,
    pub instance_name: String,
    pub service_type: String,
    pub port: u16,
    pub addresses: Vec<String>,
    pub transport: TransportProtocol,
    pub kind: DeviceKind,
    pub category: DeviceCategory,
    /// TXT entries minus the reserved `kind`/`category` keys.
    pub properties: BTreeMap<String, String>,
    /// Minimum TTL across the group's records, in seconds.
    pub ttl_seconds: u32,
}

/// Group a response's records into services, one per PTR answer.
///
/// SRV, TXT and A records are matched to a PTR by its domain name. Records
/// that point at nothing we know of are ignored.
pub fn services_from_records(
    answers: &[MdnsRecord],
    additional_records: &[MdnsRecord],
) -> Vec<DiscoveredService> {
    let mut services = Vec::new();

    for answer in answers {
        let RecordData::Ptr {
            name: service_type,
            domain_name: fqdn,
        } = &answer.data
        else {
            continue;
        };

        let instance_name = fqdn
            .strip_suffix(&format!(".{service_type}"))
            .unwrap_or_else(|| fqdn.split('.').next().unwrap_or(fqdn))
            .to_string();

        let mut service = DiscoveredService {
            fqdn: fqdn.clone(),
            instance_name,
            service_type: service_type.clone(),
            port: 0,
            addresses: Vec::new(),
            transport: TransportProtocol::Unknown,
            kind: DeviceKind::Unknown,
            category: DeviceCategory::Unknown,
            properties: BTreeMap::new(),
            ttl_seconds: answer.ttl,
        };

        for record in additional_records.iter().filter(|r| &r.name == fqdn) {
            service.ttl_seconds = service.ttl_seconds.min(record.ttl);
            match &record.data {
                RecordData::A { address, .. } => {
                    if !service.addresses.contains(address) {
                        service.addresses.push(address.clone());
                    }
                }
                RecordData::Srv {
                    port, protocol, ..
                } => {
                    service.port = *port;
                    service.transport = *protocol;
                }
                RecordData::Txt { entries, .. } => {
                    for (key, value) in entries {
                        match key.as_str() {
                            TXT_KEY_KIND => {
                                service.kind = value.parse().unwrap_or(DeviceKind::Unknown);
                            }
                            TXT_KEY_CATEGORY => {
                                service.category =
                                    value.parse().unwrap_or(DeviceCategory::Unknown);
                            }
                            _ => {
                                service.properties.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
                RecordData::Ptr { .. } => {}
            }
        }

        services.push(service);
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::domain_name;

    fn lamp() -> ServiceInfo {
        let mut props = BTreeMap::new();
        props.insert("is_on".to_string(), "false".to_string());
        props.insert("brightness".to_string(), "0".to_string());
        let mut info = ServiceInfo::new(
            "Light Lamp",
            DeviceCategory::LightLamp,
            DeviceKind::Actuator,
            props,
        );
        info.port = 4020;
        info.addresses = vec!["192.168.1.40".into(), "10.0.0.7".into()];
        info
    }

    #[test]
    fn test_record_order_and_flags() {
        let records = lamp().to_records();
        // PTR, A, A, SRV, TXT
        assert_eq!(records.len(), 5);
        assert!(matches!(records[0].data, RecordData::Ptr { .. }));
        assert!(!records[0].cache_flush);
        assert!(records[1..].iter().all(|r| r.cache_flush));
        assert!(matches!(records[3].data, RecordData::Srv { .. }));
        assert!(matches!(records[4].data, RecordData::Txt { .. }));
    }

    #[test]
    fn test_srv_fields() {
        let records = lamp().to_records();
        let RecordData::Srv {
            ref service,
            ref instance,
            port,
            ref target,
            ..
        } = records[3].data
        else {
            panic!("expected SRV");
        };
        assert_eq!(service, "_lightlamp");
        assert_eq!(instance, "Light Lamp");
        assert_eq!(port, 4020);
        assert_eq!(target, "Light Lamp._lightlamp._tcp.local.");
    }

    #[test]
    fn test_group_roundtrip() {
        let info = lamp();
        let records = info.to_records();
        let services = services_from_records(&records[..1], &records[1..]);

        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.fqdn, info.fqdn());
        assert_eq!(svc.instance_name, "Light Lamp");
        assert_eq!(svc.port, 4020);
        assert_eq!(svc.addresses, info.addresses);
        assert_eq!(svc.kind, DeviceKind::Actuator);
        assert_eq!(svc.category, DeviceCategory::LightLamp);
        assert_eq!(svc.transport, TransportProtocol::Tcp);
        // Reserved keys stripped from properties.
        assert!(!svc.properties.contains_key(TXT_KEY_KIND));
        assert!(!svc.properties.contains_key(TXT_KEY_CATEGORY));
        assert_eq!(svc.properties.get("is_on").unwrap(), "false");
        assert_eq!(svc.ttl_seconds, info.ttl_seconds);
    }

    #[test]
    fn test_group_uses_minimum_ttl() {
        let info = lamp();
        let mut records = info.to_records();
        records[4].ttl = 60;
        let services = services_from_records(&records[..1], &records[1..]);
        assert_eq!(services[0].ttl_seconds, 60);
    }

    #[test]
    fn test_unrelated_additionals_are_ignored() {
        let info = lamp();
        let records = info.to_records();
        let mut extra = records[1..].to_vec();
        extra.push(MdnsRecord {
            name: "Ghost._sink._tcp.local.".into(),
            ttl: 60,
            cache_flush: true,
            data: RecordData::A {
                name: "Ghost._sink._tcp.local.".into(),
                address: "192.168.1.99".into(),
            },
        });
        let services = services_from_records(&records[..1], &extra);
        assert_eq!(services.len(), 1);
        assert!(!services[0].addresses.contains(&"192.168.1.99".to_string()));
    }

    #[test]
    fn test_instance_name_with_dots_survives_grouping() {
        let mut info = lamp();
        info.instance_name = "Light Lamp-2.0".into();
        let records = info.to_records();
        let services = services_from_records(&records[..1], &records[1..]);
        assert_eq!(services[0].instance_name, "Light Lamp-2.0");
        assert_eq!(services[0].fqdn, domain_name(&info.service_type, "Light Lamp-2.0"));
    }
}
