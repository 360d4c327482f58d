pub mod outcome;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Level};

use crate::axis::{
    motion_policy::MotionPolicy, status::AxisStatus, ActuatorPort, AxisId, PortOpener,
};
use outcome::{MoveOutcome, MoveReport, TrajectorySample};

/// Clears the soft-disable an error-limit condition can leave behind.
pub const ENABLE_COMMAND: &str = "ENBL=1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelRange {
    pub min_mm: f64,
    pub max_mm: f64,
}

impl TravelRange {
    pub fn contains(&self, position_mm: f64) -> bool {
        position_mm >= self.min_mm && position_mm <= self.max_mm
    }
}

pub struct AxisController {
    axis: AxisId,
    port: Arc<dyn ActuatorPort>,
    policy: MotionPolicy,
    travel: Option<TravelRange>,
}

impl AxisController {
    pub fn new(axis: AxisId, port: Arc<dyn ActuatorPort>, policy: MotionPolicy) -> Self {
        Self {
            axis,
            port,
            policy,
            travel: None,
        }
    }

    pub async fn open(
        opener: &dyn PortOpener,
        axis: AxisId,
        path: &str,
        baud_rate: u32,
        policy: MotionPolicy,
    ) -> Result<Self> {
        let port = opener
            .open(path, baud_rate)
            .await
            .with_context(|| format!("failed to bind axis {} to {}", axis, path))?;
        Ok(Self::new(axis, port, policy))
    }

    pub fn with_travel_range(mut self, travel: Option<TravelRange>) -> Self {
        self.travel = travel;
        self
    }

    pub fn axis(&self) -> AxisId {
        self.axis
    }

    pub fn port_identifier(&self) -> &str {
        self.port.identifier()
    }

    pub fn policy(&self) -> &MotionPolicy {
        &self.policy
    }

    /// Starts the port and homes the axis by searching for the encoder index.
    pub async fn start(&self) -> Result<()> {
        self.port
            .start()
            .await
            .with_context(|| format!("failed to start axis {} on {}", self.axis, self.port_identifier()))?;

        info!("[{}] Searching for index on {}", self.axis, self.port_identifier());
        let homing = self.port.find_index();
        let homed = match self.policy.homing_timeout() {
            Some(limit) => tokio::time::timeout(limit, homing)
                .await
                .map_err(|_| anyhow!("axis {} did not find its index within {:?}", self.axis, limit))?,
            None => homing.await,
        };
        homed.with_context(|| format!("homing failed on axis {}", self.axis))?;

        if !self.port.is_index_found().await? {
            warn!("[{}] Homing returned but the index flag is not set", self.axis);
        }
        info!("[{}] Axis homed", self.axis);

        if tracing::enabled!(Level::DEBUG) {
            let status = self.status().await?;
            self.log_status_dump(&status);
        }
        Ok(())
    }

    /// Releases the port. Safe to call after a failed or partial start.
    pub async fn stop(&self) -> Result<()> {
        self.port
            .stop()
            .await
            .with_context(|| format!("failed to stop axis {}", self.axis))?;
        debug!("[{}] Port {} released", self.axis, self.port_identifier());
        Ok(())
    }

    pub async fn status(&self) -> Result<AxisStatus> {
        AxisStatus::read(self.port.as_ref()).await
    }

    pub async fn encoder_position(&self) -> Result<f64> {
        self.port.encoder_position().await
    }

    /// Drives the axis to `target_mm` and waits for the controller to report
    /// the position reached.
    ///
    /// Nothing is commanded while the error-limit flag is asserted. With the
    /// default policy both the gate and the arrival wait are unbounded.
    pub async fn move_to(&self, target_mm: f64) -> Result<MoveOutcome> {
        info!("[{}] Requested move to {} mm", self.axis, target_mm);
        if let Some(travel) = &self.travel {
            if !travel.contains(target_mm) {
                warn!(
                    "[{}] Target {} mm is outside travel range [{}, {}]",
                    self.axis, target_mm, travel.min_mm, travel.max_mm
                );
            }
        }

        let mut checks = 0u32;
        while self.port.is_error_limit().await? {
            checks += 1;
            if let Some(max_retries) = self.policy.max_error_limit_retries {
                if checks > max_retries {
                    let status = self.status().await?;
                    error!(
                        "[{}] Error limit still asserted after {} checks, giving up",
                        self.axis, checks
                    );
                    return Ok(MoveOutcome::FaultDetected {
                        axis: self.axis,
                        target_mm,
                        attempts: checks,
                        status,
                    });
                }
            }
            warn!("[{}] Thermal protection triggered. Cooling down...", self.axis);
            tokio::time::sleep(self.policy.error_limit_backoff()).await;
        }

        self.port.send_raw_command(ENABLE_COMMAND).await?;
        debug!("[{}] Axis re-enabled", self.axis);

        let started_at = Utc::now();
        let mut trajectory = Vec::new();
        if self.policy.log_trajectory {
            trajectory.push(self.sample().await?);
        }

        self.port.set_unit(self.policy.units).await?;
        self.port.set_speed(self.policy.speed).await?;
        self.port.set_target_position(target_mm).await?;

        let deadline = self.policy.move_timeout().map(|limit| Instant::now() + limit);
        while !self.port.is_position_reached().await? {
            if self.policy.log_trajectory {
                trajectory.push(self.sample().await?);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let encoder_mm = self.port.encoder_position().await?;
                    let status = self.status().await?;
                    error!(
                        "[{}] Position {} mm not reached in time, encoder at {} mm",
                        self.axis, target_mm, encoder_mm
                    );
                    return Ok(MoveOutcome::TimedOut {
                        axis: self.axis,
                        target_mm,
                        encoder_mm,
                        status,
                    });
                }
            }
            tokio::time::sleep(self.policy.position_poll_interval()).await;
        }

        let encoder_mm = self.port.encoder_position().await?;
        if self.policy.log_trajectory {
            trajectory.push(TrajectorySample {
                at: Utc::now(),
                encoder_mm,
            });
        }
        info!(
            "[{}] Reached {} mm with EPOS: {} mm",
            self.axis, target_mm, encoder_mm
        );

        let status = self.status().await?;
        self.log_diagnostics(&status);

        let report = MoveReport {
            axis: self.axis,
            target_mm,
            encoder_mm,
            status,
            trajectory,
            started_at,
            finished_at: Utc::now(),
        };
        if !report.within_tolerance(self.policy.position_tolerance_mm) {
            warn!(
                "[{}] Encoder is {:.3} mm away from target",
                self.axis,
                report.position_error()
            );
        }
        Ok(MoveOutcome::Reached(report))
    }

    async fn sample(&self) -> Result<TrajectorySample> {
        Ok(TrajectorySample {
            at: Utc::now(),
            encoder_mm: self.port.encoder_position().await?,
        })
    }

    fn log_status_dump(&self, status: &AxisStatus) {
        debug!("[{}] Status of {}:", self.axis, self.port_identifier());
        for (flag, asserted) in status.flags() {
            debug!("[{}]   {}: {}", self.axis, flag, asserted);
        }
    }

    fn log_diagnostics(&self, status: &AxisStatus) {
        let faults = status.faults();
        if faults.is_empty() {
            info!("[{}] No errors detected.", self.axis);
            return;
        }
        error!("[{}] Errors detected:", self.axis);
        for fault in faults {
            error!("[{}]   - {}", self.axis, fault);
        }
    }
}
