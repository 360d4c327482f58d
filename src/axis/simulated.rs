use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info};

use super::{motion_policy::Units, status::StatusFlag, ActuatorPort, PortOpener};
use crate::journal::{Journal, JournalEntry, PortCommand};

const HOMING_DURATION: Duration = Duration::from_millis(500);
const INDEX_POSITION_MM: f64 = 0.0;

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: f64,
    to: f64,
    started: Instant,
}

#[derive(Debug)]
struct SimState {
    started: bool,
    enabled: bool,
    index_found: bool,
    position: f64,
    speed: f64,
    units: Units,
    motion: Option<Motion>,
    stalled: bool,
    fail_homing: bool,
    hang_homing: bool,
    error_limit_reads: u32,
    forced: HashSet<StatusFlag>,
}

impl SimState {
    fn position_at(&self, now: Instant) -> f64 {
        match self.motion {
            None => self.position,
            Some(_) if self.stalled => self.position,
            Some(motion) => {
                let distance = motion.to - motion.from;
                let travelled = self.speed * now.duration_since(motion.started).as_secs_f64();
                if travelled >= distance.abs() {
                    motion.to
                } else {
                    motion.from + travelled * distance.signum()
                }
            }
        }
    }

    fn is_at_target(&self, now: Instant) -> bool {
        match self.motion {
            None => true,
            Some(_) if self.stalled => false,
            Some(motion) => self.position_at(now) == motion.to,
        }
    }
}

/// Kinematic stand-in for a linear actuator: it travels towards the commanded
/// target at the commanded speed (mm/s) and lets callers force status flags.
pub struct SimulatedActuator {
    identifier: String,
    state: RwLock<SimState>,
    journal: Journal,
}

impl SimulatedActuator {
    pub fn new(identifier: impl Into<String>, journal: Journal) -> Self {
        Self {
            identifier: identifier.into(),
            state: RwLock::new(SimState {
                started: false,
                enabled: false,
                index_found: false,
                position: 0.0,
                speed: 20.0,
                units: Units::Millimeters,
                motion: None,
                stalled: false,
                fail_homing: false,
                hang_homing: false,
                error_limit_reads: 0,
                forced: HashSet::new(),
            }),
            journal,
        }
    }

    /// Asserts the error-limit flag for the next `reads` queries of it.
    pub async fn hold_error_limit(&self, reads: u32) {
        self.state.write().await.error_limit_reads = reads;
    }

    pub async fn force_flag(&self, flag: StatusFlag, asserted: bool) {
        let mut state = self.state.write().await;
        if asserted {
            state.forced.insert(flag);
        } else {
            state.forced.remove(&flag);
        }
    }

    /// A stalled axis never reaches its target.
    pub async fn set_stalled(&self, stalled: bool) {
        let mut state = self.state.write().await;
        let now = Instant::now();
        let position = state.position_at(now);
        state.position = position;
        if let Some(motion) = state.motion.as_mut() {
            motion.from = position;
            motion.started = now;
        }
        state.stalled = stalled;
    }

    pub async fn set_fail_homing(&self, fail: bool) {
        self.state.write().await.fail_homing = fail;
    }

    /// The index search never completes while set.
    pub async fn set_hang_homing(&self, hang: bool) {
        self.state.write().await.hang_homing = hang;
    }

    pub async fn position(&self) -> f64 {
        self.state.read().await.position_at(Instant::now())
    }

    pub async fn units(&self) -> Units {
        self.state.read().await.units
    }

    fn record(&self, command: PortCommand) {
        self.journal.record(JournalEntry::Port {
            port: self.identifier.clone(),
            command,
        });
    }

    async fn ensure_started(&self) -> Result<()> {
        if !self.state.read().await.started {
            bail!("port {} is not started", self.identifier);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ActuatorPort for SimulatedActuator {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn start(&self) -> Result<()> {
        self.record(PortCommand::Start);
        self.state.write().await.started = true;
        debug!("Simulated port {} started", self.identifier);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record(PortCommand::Stop);
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.position = state.position_at(now);
        state.motion = None;
        state.started = false;
        state.enabled = false;
        Ok(())
    }

    async fn find_index(&self) -> Result<()> {
        self.ensure_started().await?;
        self.record(PortCommand::FindIndex);
        if self.state.read().await.fail_homing {
            bail!("index not found on {}", self.identifier);
        }
        if self.state.read().await.hang_homing {
            std::future::pending::<()>().await;
        }

        tokio::time::sleep(HOMING_DURATION).await;

        let mut state = self.state.write().await;
        state.position = INDEX_POSITION_MM;
        state.motion = None;
        state.index_found = true;
        state.enabled = true;
        info!("Simulated port {} found index", self.identifier);
        Ok(())
    }

    async fn send_raw_command(&self, command: &str) -> Result<()> {
        self.ensure_started().await?;
        self.record(PortCommand::Raw(command.to_string()));
        let mut state = self.state.write().await;
        match command {
            "ENBL=1" => state.enabled = true,
            "ENBL=0" => state.enabled = false,
            other => debug!("Simulated port {} ignoring command {}", self.identifier, other),
        }
        Ok(())
    }

    async fn set_unit(&self, unit: Units) -> Result<()> {
        self.ensure_started().await?;
        self.record(PortCommand::SetUnit(unit));
        self.state.write().await.units = unit;
        Ok(())
    }

    async fn set_speed(&self, speed: f64) -> Result<()> {
        self.ensure_started().await?;
        if speed <= 0.0 {
            return Err(anyhow!("Speed must be positive, got {}", speed));
        }
        self.record(PortCommand::SetSpeed(speed));
        self.state.write().await.speed = speed;
        Ok(())
    }

    async fn set_target_position(&self, position_mm: f64) -> Result<()> {
        self.ensure_started().await?;
        self.record(PortCommand::SetTarget(position_mm));
        let mut state = self.state.write().await;
        if !state.enabled {
            debug!("Simulated port {} is disabled, target ignored", self.identifier);
            return Ok(());
        }
        let now = Instant::now();
        let from = state.position_at(now);
        state.position = from;
        state.motion = Some(Motion {
            from,
            to: position_mm,
            started: now,
        });
        Ok(())
    }

    async fn encoder_position(&self) -> Result<f64> {
        self.ensure_started().await?;
        Ok(self.state.read().await.position_at(Instant::now()))
    }

    async fn status_flag(&self, flag: StatusFlag) -> Result<bool> {
        self.ensure_started().await?;
        let mut state = self.state.write().await;
        let now = Instant::now();
        let asserted = match flag {
            StatusFlag::ErrorLimit if state.error_limit_reads > 0 => {
                state.error_limit_reads -= 1;
                true
            }
            StatusFlag::PositionReached => {
                state.is_at_target(now) && !state.forced.contains(&StatusFlag::ErrorLimit)
            }
            StatusFlag::MotorOn => state.enabled,
            StatusFlag::IndexFound | StatusFlag::EncoderValid => state.index_found,
            other => state.forced.contains(&other),
        };
        Ok(asserted)
    }
}

/// Opens [`SimulatedActuator`]s for a fixed set of device paths.
pub struct SimulatedPortOpener {
    available: HashSet<String>,
    journal: Journal,
    opened: RwLock<HashMap<String, Arc<SimulatedActuator>>>,
    attempts: RwLock<Vec<String>>,
}

impl SimulatedPortOpener {
    pub fn new<I, S>(available: I, journal: Journal) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
            journal,
            opened: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
        }
    }

    pub async fn actuator(&self, path: &str) -> Option<Arc<SimulatedActuator>> {
        self.opened.read().await.get(path).cloned()
    }

    /// Creates the actuator behind `path` ahead of `open`, so faults can be
    /// injected before anything binds to it.
    pub async fn provision(&self, path: &str) -> Arc<SimulatedActuator> {
        self.opened
            .write()
            .await
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(SimulatedActuator::new(path, self.journal.clone())))
            .clone()
    }

    /// Every path `open` was called with, including failed ones.
    pub async fn attempts(&self) -> Vec<String> {
        self.attempts.read().await.clone()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

#[async_trait::async_trait]
impl PortOpener for SimulatedPortOpener {
    async fn open(&self, path: &str, baud_rate: u32) -> Result<Arc<dyn ActuatorPort>> {
        self.attempts.write().await.push(path.to_string());
        if !self.available.contains(path) {
            bail!("could not open port {}: no such device", path);
        }

        debug!("Binding simulated actuator on {} at {} baud", path, baud_rate);
        let mut opened = self.opened.write().await;
        let actuator = opened
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(SimulatedActuator::new(path, self.journal.clone())))
            .clone();
        Ok(actuator)
    }
}
