use std::fmt;

use serde::{Deserialize, Serialize};

use super::ActuatorPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    ForceZero,
    PositionFail,
    ErrorLimit,
    EncoderError,
    ThermalProtection1,
    ThermalProtection2,
    MotorOn,
    PositionReached,
    IndexFound,
    EncoderValid,
    SearchingIndex,
    Scanning,
    SearchingOptimalFrequency,
    AtLeftEnd,
    AtRightEnd,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 15] = [
        StatusFlag::ForceZero,
        StatusFlag::PositionFail,
        StatusFlag::ErrorLimit,
        StatusFlag::EncoderError,
        StatusFlag::ThermalProtection1,
        StatusFlag::ThermalProtection2,
        StatusFlag::MotorOn,
        StatusFlag::PositionReached,
        StatusFlag::IndexFound,
        StatusFlag::EncoderValid,
        StatusFlag::SearchingIndex,
        StatusFlag::Scanning,
        StatusFlag::SearchingOptimalFrequency,
        StatusFlag::AtLeftEnd,
        StatusFlag::AtRightEnd,
    ];

    /// Flags that are listed as errors in the post-move diagnostic.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            StatusFlag::ForceZero
                | StatusFlag::PositionFail
                | StatusFlag::ErrorLimit
                | StatusFlag::EncoderError
                | StatusFlag::ThermalProtection1
                | StatusFlag::ThermalProtection2
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            StatusFlag::ForceZero => "Force is Zero",
            StatusFlag::PositionFail => "Position Fail is triggered",
            StatusFlag::ErrorLimit => "Error limit is reached",
            StatusFlag::EncoderError => "Encoder Error limit is reached",
            StatusFlag::ThermalProtection1 => "Thermal protection 1",
            StatusFlag::ThermalProtection2 => "Thermal protection 2",
            StatusFlag::MotorOn => "Motor is on",
            StatusFlag::PositionReached => "Position reached",
            StatusFlag::IndexFound => "Encoder has reached the index",
            StatusFlag::EncoderValid => "Encoder is valid",
            StatusFlag::SearchingIndex => "Searching for index",
            StatusFlag::Scanning => "Scanning",
            StatusFlag::SearchingOptimalFrequency => "Searching optimal frequency",
            StatusFlag::AtLeftEnd => "The left end limit is reached",
            StatusFlag::AtRightEnd => "The right end limit is reached",
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Snapshot of the flags asserted on one axis at the moment it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisStatus {
    asserted: Vec<StatusFlag>,
}

impl AxisStatus {
    pub fn from_flags(flags: impl IntoIterator<Item = StatusFlag>) -> Self {
        let mut asserted: Vec<StatusFlag> = flags.into_iter().collect();
        asserted.sort();
        asserted.dedup();
        Self { asserted }
    }

    /// Queries every flag from the port. Nothing is cached between calls.
    pub async fn read(port: &dyn ActuatorPort) -> anyhow::Result<Self> {
        let mut asserted = Vec::new();
        for flag in StatusFlag::ALL {
            if port.status_flag(flag).await? {
                asserted.push(flag);
            }
        }
        Ok(Self { asserted })
    }

    pub fn is_set(&self, flag: StatusFlag) -> bool {
        self.asserted.contains(&flag)
    }

    pub fn asserted(&self) -> &[StatusFlag] {
        &self.asserted
    }

    pub fn faults(&self) -> Vec<StatusFlag> {
        self.asserted.iter().copied().filter(StatusFlag::is_fault).collect()
    }

    pub fn is_clean(&self) -> bool {
        !self.asserted.iter().any(StatusFlag::is_fault)
    }

    /// Every known flag with its state, in register order.
    pub fn flags(&self) -> impl Iterator<Item = (StatusFlag, bool)> + '_ {
        StatusFlag::ALL
            .into_iter()
            .map(move |flag| (flag, self.is_set(flag)))
    }
}
