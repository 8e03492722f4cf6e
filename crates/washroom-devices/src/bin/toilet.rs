// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 washroom project

//! Intelligent toilet sensor daemon.
//!
//! Simulates use on a fixed cadence: material lands in the bowl, heavy
//! solids clog it, flushes consume water and clogged flushes only clear
//! with some luck.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use rand::prelude::IndexedRandom;
use rand::Rng;

use washroom::types::{DeviceCategory, DeviceKind, ServiceInfo};
use washroom_devices::{init_tracing, run_device, SensorHandler, SensorSim};

const USE_INTERVAL: Duration = Duration::from_secs(5);
/// Chance that flushing a clogged toilet actually clears it.
const UNCLOG_PROBABILITY: f64 = 1.0 / 3.0;
/// Solid material heavier than this clogs the bowl (grams).
const CLOG_THRESHOLD_GRAMS: u32 = 150;
/// Litres per successful flush.
const FLUSH_LITRES: u64 = 6;

/// Washroom intelligent toilet device
#[derive(Parser, Debug)]
#[command(name = "toilet")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn now_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}

fn get_f64(properties: &BTreeMap<String, String>, key: &str, default: f64) -> f64 {
    properties.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u64(properties: &BTreeMap<String, String>, key: &str) -> u64 {
    properties.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn set_bowl_cleaner(properties: &mut BTreeMap<String, String>, level: f64) {
    let clamped = level.clamp(1.0, 10.0);
    properties.insert("bowl_cleaner_level".into(), format!("{clamped:.1}"));
}

fn record_flush(properties: &mut BTreeMap<String, String>) {
    let consumed = get_u64(properties, "water_consumption_today_liters") + FLUSH_LITRES;
    properties.insert("water_consumption_today_liters".into(), consumed.to_string());
    properties.insert("flushed".into(), "true".into());
    properties.insert("last_flushed".into(), now_secs());
}

/// One simulated use of the toilet.
fn simulate_use(properties: &mut BTreeMap<String, String>) -> bool {
    let mut rng = rand::rng();

    // A clogged toilet only accepts flush attempts.
    if properties.get("clogged").map(String::as_str) == Some("true") {
        if rng.random_bool(UNCLOG_PROBABILITY) {
            tracing::info!("toilet unclogged by a lucky flush");
            properties.insert("clogged".into(), "false".into());
            properties.insert("material_in".into(), String::new());
            properties.insert("solid_material_weight".into(), String::new());
            record_flush(properties);
        } else {
            tracing::info!("toilet flush failed, still clogged");
            properties.insert("flushed".into(), "false".into());
        }
        return true;
    }

    let material = *["SOLID", "LIQUID"].choose(&mut rng).expect("material");
    let weight_on = rng.random_range(50..120u32);
    properties.insert("material_in".into(), material.to_string());
    properties.insert("weight_on".into(), weight_on.to_string());

    if material == "SOLID" {
        let grams = rng.random_range(100..=200u32);
        properties.insert("solid_material_weight".into(), grams.to_string());
        if grams > CLOG_THRESHOLD_GRAMS {
            tracing::info!(grams, "toilet clogged by heavy solid material");
            properties.insert("clogged".into(), "true".into());
            properties.insert("flushed".into(), "false".into());
            let level = get_f64(properties, "bowl_cleaner_level", 10.0);
            set_bowl_cleaner(properties, level * 0.3);
            return true;
        }
    } else {
        properties.insert("solid_material_weight".into(), String::new());
        // Liquid is easy on the bowl: the cleaner recovers a little before
        // the flush adjustment below.
        let level = get_f64(properties, "bowl_cleaner_level", 10.0);
        set_bowl_cleaner(properties, level * 1.1);
    }
    properties.insert("clogged".into(), "false".into());

    if rng.random_bool(0.5) {
        record_flush(properties);
        let level = get_f64(properties, "bowl_cleaner_level", 10.0);
        set_bowl_cleaner(properties, level * 1.2);
        tracing::info!("toilet flushed");
    } else {
        properties.insert("flushed".into(), "false".into());
        let level = get_f64(properties, "bowl_cleaner_level", 10.0);
        set_bowl_cleaner(properties, level * 0.8);
    }

    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut properties = BTreeMap::new();
    properties.insert("clogged".to_string(), "false".to_string());
    properties.insert("weight_on".to_string(), String::new());
    properties.insert("material_in".to_string(), String::new());
    properties.insert("solid_material_weight".to_string(), String::new());
    properties.insert("bowl_cleaner_level".to_string(), "10.0".to_string());
    properties.insert("water_consumption_today_liters".to_string(), "0".to_string());
    properties.insert("flushed".to_string(), "true".to_string());
    properties.insert("last_flushed".to_string(), String::new());

    let info = ServiceInfo::new(
        "Inteligent Toilet",
        DeviceCategory::Toilet,
        DeviceKind::Sensor,
        properties,
    );

    run_device(
        info,
        SensorHandler,
        Some(SensorSim {
            interval: USE_INTERVAL,
            tick: simulate_use,
        }),
    )
    .await
}
