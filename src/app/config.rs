use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    axis::motion_policy::MotionPolicy,
    gantry::config::GantryConfig,
    gpio::PinNumbering,
    sequencer::{config::SequencerConfig, macros::StationCoordinates},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub numbering: PinNumbering,
    pub button_pin: u8,
    pub gripper_pin: u8,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            numbering: PinNumbering::Bcm,
            button_pin: 23,
            gripper_pin: 17,
        }
    }
}

/// Knobs for the in-process stand-ins used when no hardware is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub available_ports: Vec<String>,
    pub auto_press_interval_ms: Option<u64>,
    pub press_hold_ms: u64,
    /// Most recent backend events kept in memory by the simulated hardware.
    pub journal_capacity: usize,
}

impl SimulationConfig {
    pub fn auto_press_interval(&self) -> Option<Duration> {
        self.auto_press_interval_ms.map(Duration::from_millis)
    }

    pub fn press_hold(&self) -> Duration {
        Duration::from_millis(self.press_hold_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            available_ports: vec![
                "/dev/ttyACM0".to_string(),
                "/dev/ttyACM1".to_string(),
                "/dev/ttyACM2".to_string(),
            ],
            auto_press_interval_ms: Some(30_000),
            press_hold_ms: 300,
            journal_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gantry: GantryConfig,
    pub motion: MotionPolicy,
    pub stations: StationCoordinates,
    pub sequencer: SequencerConfig,
    pub gpio: GpioConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid configuration")
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}
