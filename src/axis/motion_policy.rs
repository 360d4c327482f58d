use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Millimeters,
    Micrometers,
    EncoderCounts,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Millimeters => "mm",
            Units::Micrometers => "um",
            Units::EncoderCounts => "enc",
        }
    }
}

/// Timing and retry policy applied by an axis controller to every move.
///
/// `None` for a bound means "wait forever", which is what the hardware safety
/// gate expects unless an operator opts into a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionPolicy {
    pub units: Units,
    pub speed: f64,
    pub error_limit_backoff_ms: u64,
    pub max_error_limit_retries: Option<u32>,
    pub position_poll_interval_ms: u64,
    pub move_timeout_ms: Option<u64>,
    pub homing_timeout_ms: Option<u64>,
    pub position_tolerance_mm: f64,
    pub log_trajectory: bool,
}

impl MotionPolicy {
    pub fn new() -> Self {
        Self {
            units: Units::Millimeters,
            speed: 20.0,
            error_limit_backoff_ms: 2000,
            max_error_limit_retries: None,
            position_poll_interval_ms: 100,
            move_timeout_ms: None,
            homing_timeout_ms: None,
            position_tolerance_mm: 0.05,
            log_trajectory: false,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_error_limit_retries(mut self, retries: u32) -> Self {
        self.max_error_limit_retries = Some(retries);
        self
    }

    pub fn with_move_timeout(mut self, timeout: Duration) -> Self {
        self.move_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_homing_timeout(mut self, timeout: Duration) -> Self {
        self.homing_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.position_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_trajectory_logging(mut self, enabled: bool) -> Self {
        self.log_trajectory = enabled;
        self
    }

    pub fn error_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.error_limit_backoff_ms)
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn move_timeout(&self) -> Option<Duration> {
        self.move_timeout_ms.map(Duration::from_millis)
    }

    pub fn homing_timeout(&self) -> Option<Duration> {
        self.homing_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for MotionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
