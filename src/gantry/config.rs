use serde::{Deserialize, Serialize};

use crate::axis_controller::TravelRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl PortSet {
    pub fn new(x: impl Into<String>, y: impl Into<String>, z: impl Into<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            z: z.into(),
        }
    }

    pub fn paths(&self) -> [&str; 3] {
        [&self.x, &self.y, &self.z]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStrategy {
    /// One axis at a time, X then Y then Z.
    #[default]
    Sequential,
    /// All axes of a waypoint in parallel, joined before the next step.
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelLimits {
    pub x: Option<TravelRange>,
    pub y: Option<TravelRange>,
    pub z: Option<TravelRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub baud_rate: u32,
    pub primary_ports: PortSet,
    /// Tried once if any primary port fails to bind. Actuators that are reset
    /// without rebooting the host tend to come back under new device numbers.
    pub fallback_ports: Option<PortSet>,
    pub strategy: MotionStrategy,
    pub travel: TravelLimits,
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            primary_ports: PortSet::new("/dev/ttyACM2", "/dev/ttyACM1", "/dev/ttyACM0"),
            fallback_ports: Some(PortSet::new("/dev/ttyACM5", "/dev/ttyACM4", "/dev/ttyACM3")),
            strategy: MotionStrategy::Sequential,
            travel: TravelLimits::default(),
        }
    }
}
