//! Arm control module
//!
//! Wraps an [`ArmTransport`](crate::arm_client::ArmTransport) and the motion engine, exposing the
//! arm's command set while tracking the settings which cannot be read back from the device.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

use crate::{arm_client::TransportError, motion::MotionError, reading::Snapshot};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("Arm request failed: {source} (arm at {snapshot})")]
    Transport {
        source: TransportError,
        snapshot: Snapshot,
    },

    #[error(transparent)]
    Motion(#[from] MotionError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmError {
    /// State of the arm when the error occured.
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            ArmError::Transport { snapshot, .. } => snapshot,
            ArmError::Motion(e) => e.snapshot(),
        }
    }
}
