use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use super::{DigitalInput, Level};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl DebounceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPress {
    pub sequence: u64,
    pub at: DateTime<Utc>,
}

/// Turns a stream of level samples into press events.
///
/// A press is a high to low transition that happens at least one debounce
/// window after the previous accepted press.
#[derive(Debug)]
pub struct EdgeDetector {
    last: Level,
    last_press: Option<Instant>,
    window: Duration,
}

impl EdgeDetector {
    pub fn new(initial: Level, window: Duration) -> Self {
        Self {
            last: initial,
            last_press: None,
            window,
        }
    }

    pub fn sample(&mut self, level: Level, now: Instant) -> bool {
        let falling = self.last == Level::High && level == Level::Low;
        self.last = level;
        if !falling {
            return false;
        }

        if let Some(previous) = self.last_press {
            if now.duration_since(previous) < self.window {
                debug!("Ignoring bounce inside debounce window");
                return false;
            }
        }
        self.last_press = Some(now);
        true
    }
}

pub struct ButtonWatcher {
    input: DigitalInput,
    config: DebounceConfig,
}

impl ButtonWatcher {
    pub fn new(input: DigitalInput, config: DebounceConfig) -> Self {
        Self { input, config }
    }

    /// Runs the watcher on its own task and hands back the press channel.
    pub fn spawn(self, capacity: usize) -> (mpsc::Receiver<ButtonPress>, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    /// Samples the input until the receiving side goes away. Presses that
    /// arrive while the queue is full are dropped, never delivered late.
    pub async fn run(self, tx: mpsc::Sender<ButtonPress>) -> Result<()> {
        let initial = self.input.read().await?;
        let mut detector = EdgeDetector::new(initial, self.config.debounce());
        let mut sequence = 0u64;

        loop {
            let level = self.input.read().await?;
            if detector.sample(level, Instant::now()) {
                sequence += 1;
                info!("Button on GPIO {} pressed", self.input.pin());
                let press = ButtonPress {
                    sequence,
                    at: Utc::now(),
                };
                match tx.try_send(press) {
                    Ok(()) => {}
                    Err(TrySendError::Full(press)) => {
                        warn!("Press queue full, dropping press #{}", press.sequence);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Press receiver dropped, stopping button watcher");
                        return Ok(());
                    }
                }
                tokio::time::sleep(self.config.debounce()).await;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}
