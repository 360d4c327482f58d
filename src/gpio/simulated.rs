use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info};

use super::{Gpio, Level, PinNumbering, Pull};
use crate::journal::{Journal, JournalEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Default)]
struct GpioState {
    numbering: Option<PinNumbering>,
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, Level>,
    cleanups: usize,
}

/// In-memory GPIO bank. Inputs follow their pull resistor until driven.
pub struct SimulatedGpio {
    state: RwLock<GpioState>,
    journal: Journal,
    fail_setup: bool,
}

impl SimulatedGpio {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: RwLock::new(GpioState::default()),
            journal,
            fail_setup: false,
        }
    }

    /// Every pin setup call fails, as on a host without GPIO access.
    pub fn failing_setup(journal: Journal) -> Self {
        Self {
            fail_setup: true,
            ..Self::new(journal)
        }
    }

    /// Sets the electrical level seen on an input pin.
    pub async fn drive_input(&self, pin: u8, level: Level) {
        self.state.write().await.levels.insert(pin, level);
    }

    /// Presses the button on `pin` every `every`, holding it low for `hold`.
    pub fn spawn_auto_presses(self: Arc<Self>, pin: u8, every: Duration, hold: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                info!("Simulating press on GPIO {}", pin);
                self.drive_input(pin, Level::Low).await;
                tokio::time::sleep(hold).await;
                self.drive_input(pin, Level::High).await;
            }
        })
    }

    pub async fn level(&self, pin: u8) -> Option<Level> {
        self.state.read().await.levels.get(&pin).copied()
    }

    pub async fn cleanup_count(&self) -> usize {
        self.state.read().await.cleanups
    }

    async fn check_ready(&self) -> Result<()> {
        if self.fail_setup {
            bail!("GPIO access denied");
        }
        if self.state.read().await.numbering.is_none() {
            bail!("GPIO pin numbering mode not set");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Gpio for SimulatedGpio {
    async fn set_mode(&self, numbering: PinNumbering) -> Result<()> {
        if self.fail_setup {
            bail!("GPIO access denied");
        }
        self.state.write().await.numbering = Some(numbering);
        Ok(())
    }

    async fn setup_input(&self, pin: u8, pull: Pull) -> Result<()> {
        self.check_ready().await?;
        self.journal.record(JournalEntry::PinSetupInput { pin, pull });
        let mut state = self.state.write().await;
        state.modes.insert(pin, PinMode::Input);
        let idle = match pull {
            Pull::Down => Level::Low,
            Pull::Up | Pull::None => Level::High,
        };
        state.levels.insert(pin, idle);
        Ok(())
    }

    async fn setup_output(&self, pin: u8) -> Result<()> {
        self.check_ready().await?;
        self.journal.record(JournalEntry::PinSetupOutput { pin });
        self.state.write().await.modes.insert(pin, PinMode::Output);
        Ok(())
    }

    async fn write(&self, pin: u8, level: Level) -> Result<()> {
        let mut state = self.state.write().await;
        if state.modes.get(&pin) != Some(&PinMode::Output) {
            bail!("GPIO {} is not configured as an output", pin);
        }
        self.journal.record(JournalEntry::PinWrite { pin, level });
        state.levels.insert(pin, level);
        Ok(())
    }

    async fn read(&self, pin: u8) -> Result<Level> {
        let state = self.state.read().await;
        if !state.modes.contains_key(&pin) {
            bail!("GPIO {} is not configured", pin);
        }
        Ok(state.levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    async fn cleanup(&self) -> Result<()> {
        self.journal.record(JournalEntry::GpioCleanup);
        let mut state = self.state.write().await;
        state.modes.clear();
        state.levels.clear();
        state.numbering = None;
        state.cleanups += 1;
        debug!("Simulated GPIO cleaned up");
        Ok(())
    }
}
