//! Shared, ordered record of everything the simulated backends were asked to do.
//!
//! Axes and GPIO write into the same journal so that the relative order of
//! motion commands and gripper transitions can be inspected after a run.
//! A bounded journal keeps only the most recent entries.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{
    axis::motion_policy::Units,
    gpio::{Level, Pull},
};

#[derive(Debug, Clone, PartialEq)]
pub enum PortCommand {
    Start,
    Stop,
    FindIndex,
    Raw(String),
    SetUnit(Units),
    SetSpeed(f64),
    SetTarget(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Port { port: String, command: PortCommand },
    PinSetupInput { pin: u8, pull: Pull },
    PinSetupOutput { pin: u8 },
    PinWrite { pin: u8, level: Level },
    GpioCleanup,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<VecDeque<JournalEntry>>>,
    capacity: Option<usize>,
}

impl Journal {
    /// Unbounded journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` entries, evicting the oldest first. A zero
    /// capacity records nothing.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(4096)))),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn record(&self, entry: JournalEntry) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return;
            }
            while entries.len() >= capacity {
                entries.pop_front();
            }
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Commands sent to one port, in order.
    pub fn port_commands(&self, port: &str) -> Vec<PortCommand> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Port { port: p, command } if p == port => Some(command),
                _ => None,
            })
            .collect()
    }
}
