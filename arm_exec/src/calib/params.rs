//! Parameters structure for the reference calibration

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::arm::Compliance;
use serde::{Deserialize, Serialize};

use crate::motion::{CartPose, MoveOpts};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the reference calibration.
///
/// The approach and settle poses are hand tuned on the workcell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Pose from which the base is driven against its hard stop.
    pub approach: CartPose,

    /// Compliance used while probing, stiff on every joint except the base.
    pub probe_compliance: Compliance,

    pub probe: ProbeParams,

    /// Pose the arm is moved to after contact, for it to settle against the stop.
    pub settle: CartPose,

    /// Time given to the arm to settle with the torque lock off.
    ///
    /// Units: seconds
    pub settle_s: f64,

    pub lift: LiftParams,
}

/// Torque limited motion of the base joint towards its hard stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Angle beyond the hard stop which the base is driven towards.
    ///
    /// Units: degrees
    pub angle_deg: f64,

    pub speed: f64,

    pub acc: f64,

    /// Torque at which contact is detected. The sign gives the direction of the crossing.
    pub max_torque: f64,

    /// Units: seconds
    pub timeout_s: f64,
}

/// Lift off the hard stop once the reference is captured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiftParams {
    /// Units: degrees
    pub shoulder_deg: f64,

    /// Units: degrees
    pub elbow_deg: f64,

    pub opts: MoveOpts,
}
