//! # Pick Sequencer
//!
//! Picks parts out of the magazine slots relative to the calibration reference and moves them
//! through the named poses of the workcell (optical inspection, burn, finished and waste).

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod slot_table;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;

pub use params::*;
pub use slot_table::*;
pub use state::*;

use crate::{arm_ctrl::ArmError, reading::Snapshot};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Routines of the pick sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Pick,
    OpticalInspection,
    LiftFromOpticalInspection,
    Burn,
    Flip,
    Finished,
    Waste,
}

/// Steps within a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickStep {
    OpenGripper,
    Prepare,
    Lower,
    Recenter,
    Grip,
    Settle,
    Restore,

    /// Step of a pose transition, by index.
    Pose(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum PickError {
    /// The slot is marked unavailable. This is an expected outcome, not a failure.
    #[error("Slot {0} is unavailable, skipped")]
    SlotSkipped(usize),

    #[error("Slot index {index} is out of range, the table has {len} slots")]
    InvalidSlot { index: usize, len: usize },

    #[error("The base reference is not calibrated")]
    NotCalibrated,

    #[error("{routine} failed during step {step}: {source}")]
    Failed {
        routine: Routine,
        step: PickStep,
        source: ArmError,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PickError {
    /// Returns true if the error only means the slot was skipped.
    pub fn is_skip(&self) -> bool {
        matches!(self, PickError::SlotSkipped(_))
    }

    /// State of the arm when the routine failed, if the error came from the arm.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            PickError::Failed { source, .. } => Some(source.snapshot()),
            _ => None,
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Routine::Pick => "Pick",
            Routine::OpticalInspection => "Move to optical inspection",
            Routine::LiftFromOpticalInspection => "Lift from optical inspection",
            Routine::Burn => "Move to burn position",
            Routine::Flip => "Flip upside down",
            Routine::Finished => "Move to finished position",
            Routine::Waste => "Move to waste position",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PickStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickStep::OpenGripper => f.write_str("open gripper"),
            PickStep::Prepare => f.write_str("prepare"),
            PickStep::Lower => f.write_str("lower"),
            PickStep::Recenter => f.write_str("re-centre"),
            PickStep::Grip => f.write_str("grip"),
            PickStep::Settle => f.write_str("settle"),
            PickStep::Restore => f.write_str("restore"),
            PickStep::Pose(i) => write!(f, "pose step {}", i),
        }
    }
}
