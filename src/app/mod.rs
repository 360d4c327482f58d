pub mod config;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    axis::PortOpener,
    gantry::Gantry,
    gpio::{
        button::{ButtonPress, ButtonWatcher},
        DigitalInput, Gpio, GripperOutput,
    },
    sequencer::{config::OperatingMode, CycleSequencer},
};
use config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The selected mode ran to its natural end.
    Completed,
    /// The shutdown signal fired first.
    Interrupted,
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns the hardware handles for one run and guarantees cleanup on every
/// exit path.
pub struct Application {
    config: AppConfig,
    opener: Arc<dyn PortOpener>,
    gpio: Arc<dyn Gpio>,
}

impl Application {
    pub fn new(config: AppConfig, opener: Arc<dyn PortOpener>, gpio: Arc<dyn Gpio>) -> Self {
        Self {
            config,
            opener,
            gpio,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Sets up GPIO, then runs the configured mode until it ends or
    /// `shutdown` resolves. The shutdown future is watched from the first
    /// poll onwards, including while ports open and axes home.
    pub async fn run<F>(&self, shutdown: F) -> Result<RunExit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let io = tokio::select! {
            io = self.setup_gpio() => io,
            _ = &mut shutdown => {
                info!("Interrupted during GPIO setup");
                self.cleanup_gpio().await;
                return Ok(RunExit::Interrupted);
            }
        };
        let (button, gripper) = match io {
            Ok(io) => io,
            Err(e) => {
                self.cleanup_gpio().await;
                return Err(e.context("failed to initialize GPIO"));
            }
        };

        let mode = self.config.sequencer.mode;
        info!("Operating mode: {:?}", mode);
        let result = match mode {
            OperatingMode::ButtonTest => self.run_button_test(button, &mut shutdown).await,
            OperatingMode::GripperTest => self.run_gripper_test(gripper, &mut shutdown).await,
            OperatingMode::ButtonCycle | OperatingMode::FreeRun => {
                self.run_motion(button, gripper, &mut shutdown).await
            }
        };

        self.cleanup_gpio().await;
        result
    }

    async fn setup_gpio(&self) -> Result<(DigitalInput, GripperOutput)> {
        let pins = &self.config.gpio;
        self.gpio.set_mode(pins.numbering).await?;
        let button = DigitalInput::setup(self.gpio.clone(), pins.button_pin)
            .await
            .with_context(|| format!("button input on GPIO {}", pins.button_pin))?;
        let gripper = GripperOutput::setup(self.gpio.clone(), pins.gripper_pin)
            .await
            .with_context(|| format!("gripper output on GPIO {}", pins.gripper_pin))?;
        Ok((button, gripper))
    }

    async fn cleanup_gpio(&self) {
        match self.gpio.cleanup().await {
            Ok(()) => info!("GPIO cleaned up."),
            Err(e) => error!("GPIO cleanup failed: {:#}", e),
        }
    }

    async fn run_motion<F>(
        &self,
        button: DigitalInput,
        gripper: GripperOutput,
        shutdown: F,
    ) -> Result<RunExit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let open = Gantry::open(self.opener.as_ref(), &self.config.gantry, &self.config.motion);
        let opened = tokio::select! {
            opened = open => opened,
            _ = &mut shutdown => {
                info!("Exiting program...");
                return Ok(RunExit::Interrupted);
            }
        };
        let gantry = opened.context("failed to open actuator ports")?;

        let mut sequencer = CycleSequencer::new(
            gantry,
            gripper,
            self.config.stations.clone(),
            self.config.sequencer.macro_table,
            self.config.sequencer.initial_location,
        );

        let result = tokio::select! {
            res = self.start_and_drive(&mut sequencer, button) => res,
            _ = &mut shutdown => {
                info!("Exiting program...");
                Ok(RunExit::Interrupted)
            }
        };

        Self::stop_gantry(sequencer.gantry()).await;
        result
    }

    async fn start_and_drive(
        &self,
        sequencer: &mut CycleSequencer,
        button: DigitalInput,
    ) -> Result<RunExit> {
        sequencer
            .gantry()
            .start()
            .await
            .context("failed to start axes")?;
        self.drive(sequencer, button).await?;
        Ok(RunExit::Completed)
    }

    async fn drive(&self, sequencer: &mut CycleSequencer, button: DigitalInput) -> Result<()> {
        let config = &self.config.sequencer;
        if config.mode == OperatingMode::FreeRun {
            sequencer.run_free(config.free_run_cycles).await?;
            return Ok(());
        }

        if config.home_on_start {
            sequencer.move_home().await?;
        }

        let (mut presses, watcher) =
            ButtonWatcher::new(button, config.button.clone()).spawn(config.press_queue);
        let mut watcher = AbortOnDrop(watcher);
        sequencer.run_button_cycles(&mut presses).await?;

        // The press channel only closes when the watcher has stopped.
        match (&mut watcher.0).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.context("button watcher failed")),
            Err(e) => Err(anyhow!("button watcher task ended abnormally: {}", e)),
        }
    }

    async fn run_button_test<F>(&self, button: DigitalInput, shutdown: F) -> Result<RunExit>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Press the button (GPIO {}) to test. Press Ctrl+C to exit.",
            button.pin()
        );
        let config = &self.config.sequencer;
        let (mut presses, watcher) =
            ButtonWatcher::new(button, config.button.clone()).spawn(config.press_queue);
        let _watcher = AbortOnDrop(watcher);

        let listen = async {
            while let Some(ButtonPress { sequence, at }) = presses.recv().await {
                info!("Button pressed! (#{} at {})", sequence, at);
            }
            warn!("Button watcher stopped");
        };

        tokio::select! {
            _ = listen => Ok(RunExit::Completed),
            _ = shutdown => {
                info!("Exiting program...");
                Ok(RunExit::Interrupted)
            }
        }
    }

    async fn run_gripper_test<F>(&self, mut gripper: GripperOutput, shutdown: F) -> Result<RunExit>
    where
        F: Future<Output = ()>,
    {
        let interval = self.config.sequencer.gripper_toggle_interval();
        tokio::select! {
            res = Self::toggle_gripper(&mut gripper, interval) => res,
            _ = shutdown => {
                info!("Program stopped by user");
                Ok(RunExit::Interrupted)
            }
        }
    }

    async fn toggle_gripper(gripper: &mut GripperOutput, interval: Duration) -> Result<RunExit> {
        loop {
            gripper.engage().await?;
            tokio::time::sleep(interval).await;
            gripper.release().await?;
            tokio::time::sleep(interval).await;
        }
    }

    async fn stop_gantry(gantry: &Gantry) {
        match gantry.stop().await {
            Ok(()) => info!("Controllers cleaned up."),
            Err(e) => error!("Failed to release every axis: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        axis::simulated::SimulatedPortOpener,
        gpio::{simulated::SimulatedGpio, Level},
        journal::{Journal, JournalEntry, PortCommand},
    };

    fn opener(journal: &Journal) -> Arc<SimulatedPortOpener> {
        Arc::new(SimulatedPortOpener::new(
            ["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyACM2"],
            journal.clone(),
        ))
    }

    fn stops(journal: &Journal) -> usize {
        journal
            .entries()
            .iter()
            .filter(|e| matches!(e, JournalEntry::Port { command: PortCommand::Stop, .. }))
            .count()
    }

    fn gripper_writes(journal: &Journal, level: Level) -> usize {
        journal
            .entries()
            .iter()
            .filter(|e| **e == JournalEntry::PinWrite { pin: 17, level })
            .count()
    }

    #[tokio::test]
    async fn test_gpio_failure_is_fatal_and_cleans_up() {
        let journal = Journal::new();
        let opener = opener(&journal);
        let gpio = Arc::new(SimulatedGpio::failing_setup(journal.clone()));
        let app = Application::new(AppConfig::default(), opener.clone(), gpio.clone());

        let err = app.run(std::future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("failed to initialize GPIO"));
        assert_eq!(gpio.cleanup_count().await, 1);
        assert!(opener.attempts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_run_completes_and_releases_everything() {
        let journal = Journal::new();
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let mut config = AppConfig::default();
        config.sequencer.mode = OperatingMode::FreeRun;
        config.sequencer.free_run_cycles = Some(2);
        let app = Application::new(config, opener(&journal), gpio.clone());

        let exit = app.run(std::future::pending()).await.unwrap();
        assert_eq!(exit, RunExit::Completed);
        assert_eq!(stops(&journal), 3);
        assert_eq!(gpio.cleanup_count().await, 1);
        assert_eq!(journal.entries().last(), Some(&JournalEntry::GpioCleanup));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ports_fail_after_cleanup() {
        let journal = Journal::new();
        let opener = Arc::new(SimulatedPortOpener::new(["/dev/ttyACM0"], journal.clone()));
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let app = Application::new(AppConfig::default(), opener, gpio.clone());

        let err = app.run(std::future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("failed to open actuator ports"));
        assert_eq!(gpio.cleanup_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_cycle_runs_one_macro_per_press() {
        let journal = Journal::new();
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let app = Application::new(AppConfig::default(), opener(&journal), gpio.clone());

        let presser = {
            let gpio = gpio.clone();
            tokio::spawn(async move {
                for _ in 0..2 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    gpio.drive_input(23, Level::Low).await;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    gpio.drive_input(23, Level::High).await;
                }
            })
        };

        let exit = app
            .run(tokio::time::sleep(Duration::from_secs(300)))
            .await
            .unwrap();
        presser.await.unwrap();

        assert_eq!(exit, RunExit::Interrupted);
        assert_eq!(gripper_writes(&journal, Level::High), 2);
        assert_eq!(stops(&journal), 3);
        assert_eq!(gpio.cleanup_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_while_homing_stops_axes_and_cleans_up() {
        let journal = Journal::new();
        let opener = opener(&journal);
        opener.provision("/dev/ttyACM2").await.set_hang_homing(true).await;
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let app = Application::new(AppConfig::default(), opener.clone(), gpio.clone());

        let exit = tokio::time::timeout(
            Duration::from_secs(3600),
            app.run(tokio::time::sleep(Duration::from_secs(10))),
        )
        .await
        .expect("run should return once interrupted")
        .unwrap();

        assert_eq!(exit, RunExit::Interrupted);
        assert!(journal
            .port_commands("/dev/ttyACM2")
            .contains(&PortCommand::FindIndex));
        assert_eq!(stops(&journal), 3);
        assert_eq!(gpio.cleanup_count().await, 1);
        assert_eq!(journal.entries().last(), Some(&JournalEntry::GpioCleanup));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_interrupt_before_start_still_cleans_up() {
        let journal = Journal::new();
        let opener = opener(&journal);
        opener.provision("/dev/ttyACM2").await.set_hang_homing(true).await;
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let app = Application::new(AppConfig::default(), opener, gpio.clone());

        let exit = tokio::time::timeout(Duration::from_secs(3600), app.run(std::future::ready(())))
            .await
            .expect("run should return once interrupted")
            .unwrap();

        assert_eq!(exit, RunExit::Interrupted);
        assert_eq!(gpio.cleanup_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gripper_test_toggles_until_interrupted() {
        let journal = Journal::new();
        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        let mut config = AppConfig::default();
        config.sequencer.mode = OperatingMode::GripperTest;
        let app = Application::new(config, opener(&journal), gpio);

        let exit = app
            .run(tokio::time::sleep(Duration::from_millis(4500)))
            .await
            .unwrap();
        assert_eq!(exit, RunExit::Interrupted);
        assert_eq!(gripper_writes(&journal, Level::High), 3);
    }
}
