use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::state::MacroKind;
use crate::{gantry::AxisTargets, gpio::GripperState};

const SHUTTLE_DWELL: Duration = Duration::from_secs(2);

/// Fixed setpoints of the two stations, in millimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationCoordinates {
    pub x_in: f64,
    /// Retreat point just short of `x_in`, used after releasing the plate.
    pub x_in1: f64,
    pub x_out: f64,
    pub z_low: f64,
    pub z_high: f64,
    pub y0: f64,
}

impl Default for StationCoordinates {
    fn default() -> Self {
        let x_in = 58.0;
        Self {
            x_in,
            x_in1: x_in - 5.0,
            x_out: -45.0,
            z_low: 55.0,
            z_high: 28.0,
            y0: 55.0,
        }
    }
}

impl StationCoordinates {
    pub fn home(&self) -> AxisTargets {
        AxisTargets::xyz(self.x_out, self.y0, self.z_low)
    }

    /// The two waypoints the free-running mode alternates between.
    pub fn free_run_waypoints(&self) -> [AxisTargets; 2] {
        [
            AxisTargets::xyz(self.x_out, self.y0, self.z_low),
            AxisTargets::xyz(self.x_out, self.y0, self.z_high),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroStep {
    Move(AxisTargets),
    Grip(GripperState),
    Dwell(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroTable {
    /// Pick at one station, place at the other.
    #[default]
    Transfer,
    /// Pick from the lower station and park outside; bring back and release.
    Shuttle,
}

impl MacroTable {
    pub fn steps(&self, kind: MacroKind, s: &StationCoordinates) -> Vec<MacroStep> {
        use GripperState::{Engaged, Released};
        use MacroStep::{Dwell, Grip, Move};

        match (self, kind) {
            (MacroTable::Transfer, MacroKind::LowerToUpper) => vec![
                Move(AxisTargets::xyz(s.x_in, s.y0, s.z_low)),
                Grip(Engaged),
                Move(AxisTargets::x(s.x_out)),
                Move(AxisTargets::z(s.z_high)),
                Move(AxisTargets::x(s.x_in)),
                Grip(Released),
                Move(AxisTargets::x(s.x_in1)),
            ],
            (MacroTable::Transfer, MacroKind::UpperToLower) => vec![
                Move(AxisTargets::xyz(s.x_in, s.y0, s.z_high)),
                Grip(Engaged),
                Move(AxisTargets::xyz(s.x_out, s.y0, s.z_high)),
                Move(AxisTargets::xyz(s.x_out, s.y0, s.z_low)),
                Move(AxisTargets::xyz(s.x_in, s.y0, s.z_low)),
                Grip(Released),
                Move(AxisTargets::xyz(s.x_in1, s.y0, s.z_low)),
            ],
            (MacroTable::Shuttle, MacroKind::LowerToUpper) => vec![
                Move(AxisTargets::xyz(s.x_in, s.y0, s.z_low)),
                Grip(Engaged),
                Move(AxisTargets::xyz(s.x_out, s.y0, s.z_low)),
                Dwell(SHUTTLE_DWELL),
            ],
            (MacroTable::Shuttle, MacroKind::UpperToLower) => vec![
                Move(AxisTargets::xyz(s.x_out, s.y0, s.z_low)),
                Move(AxisTargets::xyz(s.x_in, s.y0, s.z_low)),
                Grip(Released),
            ],
        }
    }
}
