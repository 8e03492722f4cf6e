// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Water leak sensor daemon.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use rand::prelude::IndexedRandom;
use rand::Rng;

use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom_devices::{init_tracing, run_device, SensorHandler, SensorSim};

const LOCATIONS: &[&str] = &["BATHROOM"];
const LEAK_INTERVAL: Duration = Duration::from_secs(10);

/// Washroom water leak detector device
#[derive(Parser, Debug)]
#[command(name = "waterleak")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn sense_leak(properties: &mut BTreeMap<String, String>) -> bool {
    let mut rng = rand::rng();
    let severity = rng.random_range(0..=10u32);
    let location = *LOCATIONS.choose(&mut rng).expect("non-empty location list");
    properties.insert("severity".into(), severity.to_string());
    properties.insert("location".into(), location.to_string());
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut properties = BTreeMap::new();
    sense_leak(&mut properties);

    let info = ServiceInfo::new(
        "Aliexpress Water Leak Detector",
        DeviceCategory::WaterLeak,
        DeviceKind::Sensor,
        properties,
    );

    run_device(
        info,
        SensorHandler,
        Some(SensorSim {
            interval: LEAK_INTERVAL,
            tick: sense_leak,
        }),
    )
    .await
}
