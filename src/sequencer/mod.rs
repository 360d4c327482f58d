pub mod config;
pub mod error;
pub mod macros;
pub mod state;

use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    gantry::{AxisTargets, Gantry},
    gpio::{button::ButtonPress, GripperOutput, GripperState},
};
use error::SequenceError;
use macros::{MacroStep, MacroTable, StationCoordinates};
use state::{MacroKind, PlateLocation};

/// Moves the plate between the two stations, one macro at a time.
///
/// The plate location flips only when a macro runs to completion. Any failure
/// part way through leaves the hardware where it stopped and halts the
/// sequencer; there is no rollback.
pub struct CycleSequencer {
    gantry: Gantry,
    gripper: GripperOutput,
    stations: StationCoordinates,
    table: MacroTable,
    location: PlateLocation,
    halted: bool,
    completed: u64,
}

impl CycleSequencer {
    pub fn new(
        gantry: Gantry,
        gripper: GripperOutput,
        stations: StationCoordinates,
        table: MacroTable,
        location: PlateLocation,
    ) -> Self {
        Self {
            gantry,
            gripper,
            stations,
            table,
            location,
            halted: false,
            completed: 0,
        }
    }

    pub fn location(&self) -> PlateLocation {
        self.location
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed
    }

    pub fn gripper_state(&self) -> GripperState {
        self.gripper.state()
    }

    pub fn gantry(&self) -> &Gantry {
        &self.gantry
    }

    pub fn stations(&self) -> &StationCoordinates {
        &self.stations
    }

    pub async fn take_from_lower(&mut self) -> Result<(), SequenceError> {
        self.run_macro(MacroKind::LowerToUpper).await
    }

    pub async fn take_from_upper(&mut self) -> Result<(), SequenceError> {
        self.run_macro(MacroKind::UpperToLower).await
    }

    /// Runs whichever macro moves the plate away from where it is now.
    pub async fn advance(&mut self) -> Result<(), SequenceError> {
        self.run_macro(MacroKind::starting_at(self.location)).await
    }

    pub async fn run_macro(&mut self, kind: MacroKind) -> Result<(), SequenceError> {
        if self.halted {
            return Err(SequenceError::Halted);
        }
        if kind.origin() != self.location {
            return Err(SequenceError::WrongLocation {
                requested: kind,
                location: self.location,
            });
        }

        let cycle_id = Uuid::new_v4();
        let steps = self.table.steps(kind, &self.stations);
        let span = info_span!("cycle", id = %cycle_id, kind = kind.name());

        async {
            info!("Starting macro '{}' with {} steps", kind, steps.len());
            for step in steps {
                if let Err(e) = self.execute(kind, step).await {
                    self.halted = true;
                    error!("Macro '{}' aborted, sequencer halted: {}", kind, e);
                    return Err(e);
                }
            }
            self.location = kind.destination();
            self.completed += 1;
            info!("Macro '{}' complete, plate at the {}", kind, self.location);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Drives the gantry to the park position used before waiting for presses.
    pub async fn move_home(&mut self) -> Result<(), SequenceError> {
        let home = self.stations.home();
        self.move_waypoint(None, home).await
    }

    /// Runs one macro per press until the press channel closes.
    ///
    /// Presses that queue up while a macro is running are dropped once it
    /// finishes, so each physical press is acted on at most once and only
    /// while the sequencer is idle.
    pub async fn run_button_cycles(
        &mut self,
        presses: &mut mpsc::Receiver<ButtonPress>,
    ) -> Result<(), SequenceError> {
        info!("System ready. Press the button to start a cycle, or Ctrl+C to exit.");
        while let Some(press) = presses.recv().await {
            info!("Button press #{} - starting cycle", press.sequence);
            self.advance().await?;

            let mut stale = 0usize;
            while presses.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!("Discarded {} presses received during the macro", stale);
            }
        }
        Ok(())
    }

    /// Alternates between the two free-run waypoints, forever when `cycles`
    /// is `None`.
    pub async fn run_free(&mut self, cycles: Option<u64>) -> Result<(), SequenceError> {
        if self.halted {
            return Err(SequenceError::Halted);
        }
        let waypoints = self.stations.free_run_waypoints();
        let mut done = 0u64;
        while cycles.map_or(true, |limit| done < limit) {
            for waypoint in waypoints {
                if let Err(e) = self.move_waypoint(None, waypoint).await {
                    self.halted = true;
                    return Err(e);
                }
            }
            done += 1;
            debug!("Free-run cycle {} complete", done);
        }
        Ok(())
    }

    async fn execute(&mut self, kind: MacroKind, step: MacroStep) -> Result<(), SequenceError> {
        match step {
            MacroStep::Move(targets) => self.move_waypoint(Some(kind), targets).await,
            MacroStep::Grip(state) => Ok(self.gripper.set(state).await?),
            MacroStep::Dwell(duration) => {
                debug!("Dwelling for {:?}", duration);
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    async fn move_waypoint(
        &mut self,
        kind: Option<MacroKind>,
        targets: AxisTargets,
    ) -> Result<(), SequenceError> {
        let outcomes = self.gantry.move_to(targets).await?;
        match outcomes.into_iter().find(|outcome| !outcome.is_reached()) {
            Some(failed) => Err(SequenceError::MoveFailed {
                macro_kind: kind,
                detail: failed.describe(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        axis::{
            motion_policy::MotionPolicy,
            simulated::{SimulatedActuator, SimulatedPortOpener},
            status::StatusFlag,
            AxisId,
        },
        gantry::config::{GantryConfig, MotionStrategy},
        gpio::{simulated::SimulatedGpio, Gpio, Level, PinNumbering},
        journal::{Journal, JournalEntry, PortCommand},
    };
    use chrono::Utc;

    const GRIPPER_PIN: u8 = 17;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Move(AxisId, f64),
        Grip(GripperState),
    }

    fn axis_for(port: &str) -> AxisId {
        match port {
            "/dev/ttyACM2" => AxisId::X,
            "/dev/ttyACM1" => AxisId::Y,
            "/dev/ttyACM0" => AxisId::Z,
            other => panic!("unexpected port {}", other),
        }
    }

    fn events(journal: &Journal) -> Vec<Event> {
        journal
            .entries()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Port {
                    port,
                    command: PortCommand::SetTarget(t),
                } => Some(Event::Move(axis_for(&port), t)),
                JournalEntry::PinWrite { pin, level } if pin == GRIPPER_PIN => {
                    Some(Event::Grip(match level {
                        Level::High => GripperState::Engaged,
                        Level::Low => GripperState::Released,
                    }))
                }
                _ => None,
            })
            .collect()
    }

    struct Rig {
        sequencer: CycleSequencer,
        journal: Journal,
        opener: SimulatedPortOpener,
    }

    impl Rig {
        async fn actuator(&self, axis: AxisId) -> Arc<SimulatedActuator> {
            let path = match axis {
                AxisId::X => "/dev/ttyACM2",
                AxisId::Y => "/dev/ttyACM1",
                AxisId::Z => "/dev/ttyACM0",
            };
            self.opener.actuator(path).await.unwrap()
        }
    }

    async fn rig(
        table: MacroTable,
        location: PlateLocation,
        strategy: MotionStrategy,
        policy: MotionPolicy,
    ) -> Rig {
        let journal = Journal::new();
        let opener = SimulatedPortOpener::new(
            ["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyACM2"],
            journal.clone(),
        );
        let config = GantryConfig {
            strategy,
            ..GantryConfig::default()
        };
        let gantry = Gantry::open(&opener, &config, &policy).await.unwrap();
        gantry.start().await.unwrap();

        let gpio = Arc::new(SimulatedGpio::new(journal.clone()));
        gpio.set_mode(PinNumbering::Bcm).await.unwrap();
        let gripper = GripperOutput::setup(gpio, GRIPPER_PIN).await.unwrap();
        journal.clear();

        let sequencer = CycleSequencer::new(
            gantry,
            gripper,
            StationCoordinates::default(),
            table,
            location,
        );
        Rig {
            sequencer,
            journal,
            opener,
        }
    }

    async fn default_rig(location: PlateLocation) -> Rig {
        rig(
            MacroTable::Transfer,
            location,
            MotionStrategy::Sequential,
            MotionPolicy::default(),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_to_upper_issues_moves_in_order() {
        let mut rig = default_rig(PlateLocation::AtLower).await;

        rig.sequencer.take_from_lower().await.unwrap();

        assert_eq!(
            events(&rig.journal),
            vec![
                Event::Move(AxisId::X, 58.0),
                Event::Move(AxisId::Y, 55.0),
                Event::Move(AxisId::Z, 55.0),
                Event::Grip(GripperState::Engaged),
                Event::Move(AxisId::X, -45.0),
                Event::Move(AxisId::Z, 28.0),
                Event::Move(AxisId::X, 58.0),
                Event::Grip(GripperState::Released),
                Event::Move(AxisId::X, 53.0),
            ]
        );
        assert_eq!(rig.sequencer.location(), PlateLocation::AtUpper);
        assert_eq!(rig.sequencer.completed_cycles(), 1);
        assert_eq!(rig.actuator(AxisId::X).await.position().await, 53.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upper_to_lower_issues_moves_in_order() {
        let mut rig = default_rig(PlateLocation::AtUpper).await;

        rig.sequencer.take_from_upper().await.unwrap();

        let moves = |x: f64, z: f64| {
            vec![
                Event::Move(AxisId::X, x),
                Event::Move(AxisId::Y, 55.0),
                Event::Move(AxisId::Z, z),
            ]
        };
        let mut expected = moves(58.0, 28.0);
        expected.push(Event::Grip(GripperState::Engaged));
        expected.extend(moves(-45.0, 28.0));
        expected.extend(moves(-45.0, 55.0));
        expected.extend(moves(58.0, 55.0));
        expected.push(Event::Grip(GripperState::Released));
        expected.extend(moves(53.0, 55.0));

        assert_eq!(events(&rig.journal), expected);
        assert_eq!(rig.sequencer.location(), PlateLocation::AtLower);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_a_macro_is_rejected() {
        let mut rig = default_rig(PlateLocation::AtLower).await;
        rig.sequencer.take_from_lower().await.unwrap();
        rig.journal.clear();

        let err = rig.sequencer.take_from_lower().await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::WrongLocation {
                requested: MacroKind::LowerToUpper,
                location: PlateLocation::AtUpper,
            }
        ));
        assert!(events(&rig.journal).is_empty());
        assert!(!rig.sequencer.is_halted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_alternates_between_stations() {
        let mut rig = default_rig(PlateLocation::AtLower).await;

        rig.sequencer.advance().await.unwrap();
        assert_eq!(rig.sequencer.location(), PlateLocation::AtUpper);
        rig.sequencer.advance().await.unwrap();
        assert_eq!(rig.sequencer.location(), PlateLocation::AtLower);
        assert_eq!(rig.sequencer.gripper_state(), GripperState::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_motion_keeps_grip_after_waypoint() {
        let mut rig = rig(
            MacroTable::Transfer,
            PlateLocation::AtUpper,
            MotionStrategy::Concurrent,
            MotionPolicy::default(),
        )
        .await;

        rig.sequencer.take_from_upper().await.unwrap();

        let events = events(&rig.journal);
        let engage = events
            .iter()
            .position(|e| *e == Event::Grip(GripperState::Engaged))
            .unwrap();
        let release = events
            .iter()
            .position(|e| *e == Event::Grip(GripperState::Released))
            .unwrap();
        assert_eq!(engage, 3);
        assert!(events[..engage].contains(&Event::Move(AxisId::Z, 28.0)));
        assert!(events[engage - 3..engage]
            .iter()
            .all(|e| matches!(e, Event::Move(..))));
        assert_eq!(release, engage + 10);
        assert_eq!(events.len(), release + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_move_halts_without_flipping_location() {
        let policy = MotionPolicy::default().with_error_limit_retries(2);
        let mut rig = rig(
            MacroTable::Transfer,
            PlateLocation::AtLower,
            MotionStrategy::Sequential,
            policy,
        )
        .await;
        rig.actuator(AxisId::Z)
            .await
            .force_flag(StatusFlag::ErrorLimit, true)
            .await;

        let err = rig.sequencer.take_from_lower().await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MoveFailed {
                macro_kind: Some(MacroKind::LowerToUpper),
                ..
            }
        ));
        assert_eq!(rig.sequencer.location(), PlateLocation::AtLower);
        assert!(rig.sequencer.is_halted());
        assert!(!events(&rig.journal).contains(&Event::Grip(GripperState::Engaged)));

        rig.actuator(AxisId::Z)
            .await
            .force_flag(StatusFlag::ErrorLimit, false)
            .await;
        assert!(matches!(
            rig.sequencer.take_from_lower().await,
            Err(SequenceError::Halted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuttle_table() {
        let mut rig = rig(
            MacroTable::Shuttle,
            PlateLocation::AtLower,
            MotionStrategy::Sequential,
            MotionPolicy::default(),
        )
        .await;

        rig.sequencer.advance().await.unwrap();
        rig.sequencer.advance().await.unwrap();

        let events = events(&rig.journal);
        assert_eq!(events[3], Event::Grip(GripperState::Engaged));
        assert_eq!(events.last(), Some(&Event::Grip(GripperState::Released)));
        assert_eq!(events.len(), 3 + 1 + 3 + 3 + 3 + 1);
        assert_eq!(rig.sequencer.location(), PlateLocation::AtLower);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presses_during_macro_are_discarded() {
        let mut rig = default_rig(PlateLocation::AtLower).await;
        let (tx, mut rx) = mpsc::channel(8);
        for sequence in 1..=3 {
            tx.send(ButtonPress {
                sequence,
                at: Utc::now(),
            })
            .await
            .unwrap();
        }
        drop(tx);

        rig.sequencer.run_button_cycles(&mut rx).await.unwrap();
        assert_eq!(rig.sequencer.completed_cycles(), 1);
        assert_eq!(rig.sequencer.location(), PlateLocation::AtUpper);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_run_alternates_waypoints() {
        let mut rig = default_rig(PlateLocation::AtLower).await;

        rig.sequencer.run_free(Some(2)).await.unwrap();

        let z_targets: Vec<f64> = events(&rig.journal)
            .into_iter()
            .filter_map(|e| match e {
                Event::Move(AxisId::Z, z) => Some(z),
                _ => None,
            })
            .collect();
        assert_eq!(z_targets, vec![55.0, 28.0, 55.0, 28.0]);
        assert_eq!(rig.sequencer.location(), PlateLocation::AtLower);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_home() {
        let mut rig = default_rig(PlateLocation::AtLower).await;
        rig.sequencer.move_home().await.unwrap();
        assert_eq!(
            events(&rig.journal),
            vec![
                Event::Move(AxisId::X, -45.0),
                Event::Move(AxisId::Y, 55.0),
                Event::Move(AxisId::Z, 55.0),
            ]
        );
    }
}
