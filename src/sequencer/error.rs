use super::state::{MacroKind, PlateLocation};

#[derive(Debug)]
pub enum SequenceError {
    WrongLocation {
        requested: MacroKind,
        location: PlateLocation,
    },
    Halted,
    MoveFailed {
        macro_kind: Option<MacroKind>,
        detail: String,
    },
    Hardware(anyhow::Error),
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::WrongLocation {
                requested,
                location,
            } => write!(f, "Cannot run '{}' while the plate is at the {}", requested, location),
            SequenceError::Halted => write!(f, "Sequencer halted after an aborted macro"),
            SequenceError::MoveFailed {
                macro_kind: Some(kind),
                detail,
            } => write!(f, "Macro '{}' aborted: {}", kind, detail),
            SequenceError::MoveFailed {
                macro_kind: None,
                detail,
            } => write!(f, "Move aborted: {}", detail),
            SequenceError::Hardware(err) => write!(f, "Hardware error: {:#}", err),
        }
    }
}

impl std::error::Error for SequenceError {}

impl From<anyhow::Error> for SequenceError {
    fn from(err: anyhow::Error) -> Self {
        SequenceError::Hardware(err)
    }
}
