use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::axis::{status::AxisStatus, AxisId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub at: DateTime<Utc>,
    pub encoder_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveReport {
    pub axis: AxisId,
    pub target_mm: f64,
    pub encoder_mm: f64,
    pub status: AxisStatus,
    pub trajectory: Vec<TrajectorySample>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MoveReport {
    pub fn position_error(&self) -> f64 {
        (self.encoder_mm - self.target_mm).abs()
    }

    pub fn within_tolerance(&self, tolerance_mm: f64) -> bool {
        self.position_error() <= tolerance_mm
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Reached(MoveReport),
    /// Position-reached was not observed before the move timeout.
    TimedOut {
        axis: AxisId,
        target_mm: f64,
        encoder_mm: f64,
        status: AxisStatus,
    },
    /// The error-limit gate never cleared within the retry bound. The axis was
    /// not commanded.
    FaultDetected {
        axis: AxisId,
        target_mm: f64,
        attempts: u32,
        status: AxisStatus,
    },
}

impl MoveOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, MoveOutcome::Reached(_))
    }

    pub fn report(&self) -> Option<&MoveReport> {
        match self {
            MoveOutcome::Reached(report) => Some(report),
            _ => None,
        }
    }

    pub fn axis(&self) -> AxisId {
        match self {
            MoveOutcome::Reached(report) => report.axis,
            MoveOutcome::TimedOut { axis, .. } | MoveOutcome::FaultDetected { axis, .. } => *axis,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MoveOutcome::Reached(report) => format!(
                "axis {} reached {} mm (encoder {} mm)",
                report.axis, report.target_mm, report.encoder_mm
            ),
            MoveOutcome::TimedOut {
                axis,
                target_mm,
                encoder_mm,
                ..
            } => format!(
                "axis {} timed out moving to {} mm (encoder {} mm)",
                axis, target_mm, encoder_mm
            ),
            MoveOutcome::FaultDetected {
                axis,
                target_mm,
                attempts,
                ..
            } => format!(
                "axis {} stayed in error limit after {} checks, move to {} mm not issued",
                axis, attempts, target_mm
            ),
        }
    }
}
