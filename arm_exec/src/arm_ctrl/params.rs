//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::arm::{Compliance, PidGains};
use serde::{Deserialize, Serialize};

use crate::motion::MoveOpts;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Arm control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Delay between feedback polls while confirming a motion.
    ///
    /// Units: seconds
    pub poll_interval_s: f64,

    /// Compliance applied at init and restored after every routine.
    pub baseline_compliance: Compliance,

    /// PID gains restored after every routine. Must match the firmware defaults, since restoring
    /// is done by resetting the PID gains on the arm.
    pub default_pid: PidGains,

    /// Motion options used for gripper moves.
    pub gripper_move: MoveOpts,

    /// Delay between two position printouts in teach mode.
    ///
    /// Units: seconds
    pub teach_period_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            poll_interval_s: 0.1,
            baseline_compliance: Compliance::BASELINE,
            default_pid: PidGains::default(),
            gripper_move: MoveOpts {
                acc: 5.0,
                ..Default::default()
            },
            teach_period_s: 0.05,
        }
    }
}
