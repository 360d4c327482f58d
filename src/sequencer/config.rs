use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{macros::MacroTable, state::PlateLocation};
use crate::gpio::button::DebounceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// One macro per button press, alternating between the stations.
    #[default]
    ButtonCycle,
    /// Shuttle between two fixed waypoints with no button gating.
    FreeRun,
    /// Log button presses without moving anything.
    ButtonTest,
    /// Toggle the gripper output at a fixed interval.
    GripperTest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub mode: OperatingMode,
    pub macro_table: MacroTable,
    pub initial_location: PlateLocation,
    pub home_on_start: bool,
    pub button: DebounceConfig,
    pub press_queue: usize,
    pub free_run_cycles: Option<u64>,
    pub gripper_toggle_interval_ms: u64,
}

impl SequencerConfig {
    pub fn gripper_toggle_interval(&self) -> Duration {
        Duration::from_millis(self.gripper_toggle_interval_ms)
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::ButtonCycle,
            macro_table: MacroTable::Transfer,
            initial_location: PlateLocation::AtLower,
            home_on_start: true,
            button: DebounceConfig::default(),
            press_queue: 16,
            free_run_cycles: None,
            gripper_toggle_interval_ms: 1000,
        }
    }
}
