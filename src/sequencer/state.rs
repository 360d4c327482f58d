use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateLocation {
    #[default]
    AtLower,
    AtUpper,
}

impl fmt::Display for PlateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlateLocation::AtLower => f.write_str("lower station"),
            PlateLocation::AtUpper => f.write_str("upper station"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    LowerToUpper,
    UpperToLower,
}

impl MacroKind {
    /// The macro that moves the plate away from `location`.
    pub fn starting_at(location: PlateLocation) -> Self {
        match location {
            PlateLocation::AtLower => MacroKind::LowerToUpper,
            PlateLocation::AtUpper => MacroKind::UpperToLower,
        }
    }

    pub fn origin(&self) -> PlateLocation {
        match self {
            MacroKind::LowerToUpper => PlateLocation::AtLower,
            MacroKind::UpperToLower => PlateLocation::AtUpper,
        }
    }

    pub fn destination(&self) -> PlateLocation {
        match self {
            MacroKind::LowerToUpper => PlateLocation::AtUpper,
            MacroKind::UpperToLower => PlateLocation::AtLower,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MacroKind::LowerToUpper => "take from down, leave up",
            MacroKind::UpperToLower => "take from up, leave down",
        }
    }
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
