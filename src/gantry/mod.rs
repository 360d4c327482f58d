pub mod config;

use std::fmt;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::{
    axis::{motion_policy::MotionPolicy, AxisId, PortOpener},
    axis_controller::{outcome::MoveOutcome, AxisController},
};
use config::{GantryConfig, MotionStrategy, PortSet};

/// A waypoint where only the listed axes are commanded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisTargets {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl AxisTargets {
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    pub fn x(x: f64) -> Self {
        Self {
            x: Some(x),
            ..Self::default()
        }
    }

    pub fn z(z: f64) -> Self {
        Self {
            z: Some(z),
            ..Self::default()
        }
    }

    pub fn get(&self, axis: AxisId) -> Option<f64> {
        match axis {
            AxisId::X => self.x,
            AxisId::Y => self.y,
            AxisId::Z => self.z,
        }
    }

    /// Commanded axes in X, Y, Z order.
    pub fn iter(&self) -> impl Iterator<Item = (AxisId, f64)> + '_ {
        AxisId::ALL
            .into_iter()
            .filter_map(|axis| self.get(axis).map(|target| (axis, target)))
    }
}

impl fmt::Display for AxisTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        write!(f, "({}, {}, {})", show(self.x), show(self.y), show(self.z))
    }
}

/// The three axes of the plate handler, opened and started together.
pub struct Gantry {
    x: AxisController,
    y: AxisController,
    z: AxisController,
    strategy: MotionStrategy,
}

impl Gantry {
    pub fn new(
        x: AxisController,
        y: AxisController,
        z: AxisController,
        strategy: MotionStrategy,
    ) -> Self {
        Self { x, y, z, strategy }
    }

    /// Binds all three axes, retrying once with the fallback port set.
    pub async fn open(
        opener: &dyn PortOpener,
        config: &GantryConfig,
        policy: &MotionPolicy,
    ) -> Result<Self> {
        let primary_err = match Self::open_set(opener, &config.primary_ports, config, policy).await {
            Ok(gantry) => return Ok(gantry),
            Err(e) => e,
        };

        let Some(fallback) = &config.fallback_ports else {
            return Err(primary_err);
        };
        warn!(
            "Could not open primary ports ({:#}), trying fallback set {:?}",
            primary_err,
            fallback.paths()
        );
        Self::open_set(opener, fallback, config, policy)
            .await
            .with_context(|| format!("fallback ports failed after primary failure: {:#}", primary_err))
    }

    async fn open_set(
        opener: &dyn PortOpener,
        ports: &PortSet,
        config: &GantryConfig,
        policy: &MotionPolicy,
    ) -> Result<Self> {
        let baud = config.baud_rate;
        let z = AxisController::open(opener, AxisId::Z, &ports.z, baud, policy.clone()).await?;
        let y = AxisController::open(opener, AxisId::Y, &ports.y, baud, policy.clone()).await?;
        let x = AxisController::open(opener, AxisId::X, &ports.x, baud, policy.clone()).await?;
        info!("Axes bound: X={} Y={} Z={}", ports.x, ports.y, ports.z);

        Ok(Self::new(
            x.with_travel_range(config.travel.x),
            y.with_travel_range(config.travel.y),
            z.with_travel_range(config.travel.z),
            config.strategy,
        ))
    }

    pub fn axis(&self, axis: AxisId) -> &AxisController {
        match axis {
            AxisId::X => &self.x,
            AxisId::Y => &self.y,
            AxisId::Z => &self.z,
        }
    }

    pub fn strategy(&self) -> MotionStrategy {
        self.strategy
    }

    /// Starts and homes every axis. The first failure aborts startup.
    pub async fn start(&self) -> Result<()> {
        for axis in AxisId::ALL {
            self.axis(axis).start().await?;
        }
        Ok(())
    }

    /// Releases every axis, even if an earlier one fails to stop.
    pub async fn stop(&self) -> Result<()> {
        let mut first_err = None;
        for axis in AxisId::ALL {
            if let Err(e) = self.axis(axis).stop().await {
                error!("{:#}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Moves the commanded axes of `targets`.
    ///
    /// Returns one outcome per axis that was driven. In sequential mode the
    /// first outcome that is not `Reached` ends the waypoint early.
    pub async fn move_to(&self, targets: AxisTargets) -> Result<Vec<MoveOutcome>> {
        info!("Moving to 3D coordinate: {} mm", targets);
        match self.strategy {
            MotionStrategy::Sequential => {
                let mut outcomes = Vec::new();
                for (axis, target) in targets.iter() {
                    let outcome = self.axis(axis).move_to(target).await?;
                    let reached = outcome.is_reached();
                    outcomes.push(outcome);
                    if !reached {
                        break;
                    }
                }
                Ok(outcomes)
            }
            MotionStrategy::Concurrent => {
                let (x, y, z) = futures::join!(
                    Self::move_axis(&self.x, targets.x),
                    Self::move_axis(&self.y, targets.y),
                    Self::move_axis(&self.z, targets.z),
                );
                Ok([x?, y?, z?].into_iter().flatten().collect())
            }
        }
    }

    async fn move_axis(controller: &AxisController, target: Option<f64>) -> Result<Option<MoveOutcome>> {
        match target {
            Some(target) => controller.move_to(target).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        axis::{simulated::SimulatedPortOpener, status::StatusFlag},
        journal::{Journal, JournalEntry, PortCommand},
    };

    const PRIMARY: [&str; 3] = ["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyACM2"];
    const FALLBACK: [&str; 3] = ["/dev/ttyACM3", "/dev/ttyACM4", "/dev/ttyACM5"];

    fn targets_issued(journal: &Journal) -> Vec<(String, f64)> {
        journal
            .entries()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Port {
                    port,
                    command: PortCommand::SetTarget(t),
                } => Some((port, t)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_primary_ports_used_when_available() {
        let opener = SimulatedPortOpener::new(PRIMARY, Journal::new());
        let gantry = Gantry::open(&opener, &GantryConfig::default(), &MotionPolicy::default())
            .await
            .unwrap();

        assert_eq!(gantry.axis(AxisId::X).port_identifier(), "/dev/ttyACM2");
        assert_eq!(gantry.axis(AxisId::Z).port_identifier(), "/dev/ttyACM0");
        assert_eq!(opener.attempts().await.len(), 3);
    }

    #[tokio::test]
    async fn test_fallback_ports_tried_once() {
        let opener = SimulatedPortOpener::new(FALLBACK, Journal::new());
        let gantry = Gantry::open(&opener, &GantryConfig::default(), &MotionPolicy::default())
            .await
            .unwrap();

        assert_eq!(gantry.axis(AxisId::Y).port_identifier(), "/dev/ttyACM4");
        assert_eq!(
            opener.attempts().await,
            vec!["/dev/ttyACM0", "/dev/ttyACM3", "/dev/ttyACM4", "/dev/ttyACM5"]
        );
    }

    #[tokio::test]
    async fn test_open_fails_when_both_sets_fail() {
        let opener = SimulatedPortOpener::new(["/dev/ttyACM0"], Journal::new());
        let result = Gantry::open(&opener, &GantryConfig::default(), &MotionPolicy::default()).await;

        let err = result.err().expect("both port sets are missing devices");
        assert!(format!("{:#}", err).contains("/dev/ttyACM1"));
        assert!(format!("{:#}", err).contains("/dev/ttyACM3"));
        assert_eq!(
            opener.attempts().await,
            vec!["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyACM3"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_moves_in_xyz_order() {
        let journal = Journal::new();
        let opener = SimulatedPortOpener::new(PRIMARY, journal.clone());
        let gantry = Gantry::open(&opener, &GantryConfig::default(), &MotionPolicy::default())
            .await
            .unwrap();
        gantry.start().await.unwrap();

        let outcomes = gantry.move_to(AxisTargets::xyz(10.0, 20.0, 30.0)).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(MoveOutcome::is_reached));
        assert_eq!(
            targets_issued(&journal),
            vec![
                ("/dev/ttyACM2".to_string(), 10.0),
                ("/dev/ttyACM1".to_string(), 20.0),
                ("/dev/ttyACM0".to_string(), 30.0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_stops_after_failed_axis() {
        let journal = Journal::new();
        let opener = SimulatedPortOpener::new(PRIMARY, journal.clone());
        let policy = MotionPolicy::default().with_error_limit_retries(1);
        let gantry = Gantry::open(&opener, &GantryConfig::default(), &policy)
            .await
            .unwrap();
        gantry.start().await.unwrap();
        let y = opener.actuator("/dev/ttyACM1").await.unwrap();
        y.force_flag(StatusFlag::ErrorLimit, true).await;

        let outcomes = gantry.move_to(AxisTargets::xyz(10.0, 20.0, 30.0)).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[1], MoveOutcome::FaultDetected { axis: AxisId::Y, .. }));
        assert_eq!(targets_issued(&journal), vec![("/dev/ttyACM2".to_string(), 10.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_strategy_moves_only_commanded_axes() {
        let opener = SimulatedPortOpener::new(PRIMARY, Journal::new());
        let config = GantryConfig {
            strategy: MotionStrategy::Concurrent,
            ..GantryConfig::default()
        };
        let gantry = Gantry::open(&opener, &config, &MotionPolicy::default())
            .await
            .unwrap();
        gantry.start().await.unwrap();

        let started = tokio::time::Instant::now();
        let outcomes = gantry
            .move_to(AxisTargets {
                x: Some(40.0),
                y: None,
                z: Some(40.0),
            })
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(MoveOutcome::is_reached));
        // 40 mm at 20 mm/s each, overlapped rather than back to back.
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_stop_is_safe_without_start() {
        let opener = SimulatedPortOpener::new(PRIMARY, Journal::new());
        let gantry = Gantry::open(&opener, &GantryConfig::default(), &MotionPolicy::default())
            .await
            .unwrap();
        assert!(gantry.stop().await.is_ok());
    }
}
