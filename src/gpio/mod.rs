pub mod button;
pub mod simulated;

use std::{fmt, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinNumbering {
    /// Broadcom SoC channel numbers.
    Bcm,
    /// Physical header pin numbers.
    Board,
}

#[async_trait::async_trait]
pub trait Gpio: Send + Sync {
    async fn set_mode(&self, numbering: PinNumbering) -> Result<()>;
    async fn setup_input(&self, pin: u8, pull: Pull) -> Result<()>;
    async fn setup_output(&self, pin: u8) -> Result<()>;
    async fn write(&self, pin: u8, level: Level) -> Result<()>;
    async fn read(&self, pin: u8) -> Result<Level>;

    /// Releases every configured pin. Must be safe to call more than once.
    async fn cleanup(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperState {
    Engaged,
    Released,
}

impl GripperState {
    fn level(&self) -> Level {
        match self {
            GripperState::Engaged => Level::High,
            GripperState::Released => Level::Low,
        }
    }
}

impl fmt::Display for GripperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GripperState::Engaged => f.write_str("engaged"),
            GripperState::Released => f.write_str("released"),
        }
    }
}

/// Solenoid gripper pin: high holds the plate, low lets go.
pub struct GripperOutput {
    gpio: Arc<dyn Gpio>,
    pin: u8,
    state: GripperState,
}

impl GripperOutput {
    /// Configures the pin as an output and drives it to the released level.
    pub async fn setup(gpio: Arc<dyn Gpio>, pin: u8) -> Result<Self> {
        gpio.setup_output(pin).await?;
        gpio.write(pin, Level::Low).await?;
        Ok(Self {
            gpio,
            pin,
            state: GripperState::Released,
        })
    }

    pub fn state(&self) -> GripperState {
        self.state
    }

    pub async fn set(&mut self, state: GripperState) -> Result<()> {
        self.gpio.write(self.pin, state.level()).await?;
        self.state = state;
        info!("Gripper {}", state);
        Ok(())
    }

    pub async fn engage(&mut self) -> Result<()> {
        self.set(GripperState::Engaged).await
    }

    pub async fn release(&mut self) -> Result<()> {
        self.set(GripperState::Released).await
    }
}

/// Input line wired to ground through a push-button, so pressed reads low.
#[derive(Clone)]
pub struct DigitalInput {
    gpio: Arc<dyn Gpio>,
    pin: u8,
}

impl DigitalInput {
    pub async fn setup(gpio: Arc<dyn Gpio>, pin: u8) -> Result<Self> {
        gpio.setup_input(pin, Pull::Up).await?;
        Ok(Self { gpio, pin })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub async fn read(&self) -> Result<Level> {
        self.gpio.read(self.pin).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Journal, JournalEntry};
    use simulated::SimulatedGpio;

    #[tokio::test]
    async fn test_gripper_starts_released_and_drives_pin() {
        let journal = Journal::new();
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        gpio.set_mode(PinNumbering::Bcm).await.unwrap();
        let mut gripper = GripperOutput::setup(gpio.clone(), 17).await.unwrap();
        assert_eq!(gripper.state(), GripperState::Released);

        gripper.engage().await.unwrap();
        assert_eq!(gpio.level(17).await, Some(Level::High));
        gripper.release().await.unwrap();

        let writes: Vec<_> = journal
            .entries()
            .into_iter()
            .filter(|e| matches!(e, JournalEntry::PinWrite { .. }))
            .collect();
        assert_eq!(
            writes,
            vec![
                JournalEntry::PinWrite { pin: 17, level: Level::Low },
                JournalEntry::PinWrite { pin: 17, level: Level::High },
                JournalEntry::PinWrite { pin: 17, level: Level::Low },
            ]
        );
    }

    #[tokio::test]
    async fn test_input_idles_high_with_pull_up() {
        let gpio = Arc::new(SimulatedGpio::new(Journal::new()));
        gpio.set_mode(PinNumbering::Bcm).await.unwrap();
        let button = DigitalInput::setup(gpio.clone(), 23).await.unwrap();
        assert_eq!(button.read().await.unwrap(), Level::High);

        gpio.drive_input(23, Level::Low).await;
        assert_eq!(button.read().await.unwrap(), Level::Low);
    }
}
