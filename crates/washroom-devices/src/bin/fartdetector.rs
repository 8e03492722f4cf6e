// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Fart detector sensor daemon. Reports a severity and the suspected
//! diet on a fixed cadence.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use rand::prelude::IndexedRandom;
use rand::Rng;

use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom_devices::{init_tracing, run_device, SensorHandler, SensorSim};

const DIETS: &[&str] = &["HIGH_FIBER", "HIGH_PROTEIN", "VEGAN", "KETO", "STANDARD"];
const DETECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Washroom fart detector device
#[derive(Parser, Debug)]
#[command(name = "fartdetector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn detect(properties: &mut BTreeMap<String, String>) -> bool {
    let mut rng = rand::rng();
    let severity = rng.random_range(0..=10u32);
    let diet = *DIETS.choose(&mut rng).expect("non-empty diet list");
    properties.insert("severity".into(), severity.to_string());
    properties.insert("diet".into(), diet.to_string());
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut properties = BTreeMap::new();
    detect(&mut properties);

    let info = ServiceInfo::new(
        "Shopee Fart Detector",
        DeviceCategory::FartDetector,
        DeviceKind::Sensor,
        properties,
    );

    run_device(
        info,
        SensorHandler,
        Some(SensorSim {
            interval: DETECTION_INTERVAL,
            tick: detect,
        }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_fills_both_properties() {
        let mut props = BTreeMap::new();
        assert!(detect(&mut props));

        let severity: u32 = props.get("severity").unwrap().parse().unwrap();
        assert!(severity <= 10);
        assert!(DIETS.contains(&props.get("diet").unwrap().as_str()));
    }
}
