pub mod motion_policy;
pub mod simulated;
pub mod status;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use motion_policy::Units;
use status::StatusFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisId {
    X,
    Y,
    Z,
}

impl AxisId {
    pub const ALL: [AxisId; 3] = [AxisId::X, AxisId::Y, AxisId::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisId::X => "X",
            AxisId::Y => "Y",
            AxisId::Z => "Z",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical actuator reached over a serial-like channel.
///
/// Implementations own the vendor protocol; callers only see numeric
/// parameters and status flags.
#[async_trait::async_trait]
pub trait ActuatorPort: Send + Sync {
    fn identifier(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;

    async fn find_index(&self) -> anyhow::Result<()>;
    async fn send_raw_command(&self, command: &str) -> anyhow::Result<()>;
    async fn set_unit(&self, unit: Units) -> anyhow::Result<()>;
    async fn set_speed(&self, speed: f64) -> anyhow::Result<()>;
    async fn set_target_position(&self, position_mm: f64) -> anyhow::Result<()>;

    async fn encoder_position(&self) -> anyhow::Result<f64>;
    async fn status_flag(&self, flag: StatusFlag) -> anyhow::Result<bool>;

    async fn is_error_limit(&self) -> anyhow::Result<bool> {
        self.status_flag(StatusFlag::ErrorLimit).await
    }

    async fn is_position_reached(&self) -> anyhow::Result<bool> {
        self.status_flag(StatusFlag::PositionReached).await
    }

    async fn is_index_found(&self) -> anyhow::Result<bool> {
        self.status_flag(StatusFlag::IndexFound).await
    }

    async fn is_thermal_protection(&self) -> anyhow::Result<bool> {
        Ok(self.status_flag(StatusFlag::ThermalProtection1).await?
            || self.status_flag(StatusFlag::ThermalProtection2).await?)
    }
}

/// Binds an [`ActuatorPort`] to an OS device path.
#[async_trait::async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, path: &str, baud_rate: u32) -> anyhow::Result<Arc<dyn ActuatorPort>>;
}
