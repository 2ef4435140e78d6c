//! Parameters structure for the pick sequencer

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::arm::{Compliance, Joint, PidGains};
use serde::{Deserialize, Serialize};

use crate::motion::{CartPose, MoveOpts};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the pick sequencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Slots of the magazine, in index order.
    pub slots: Vec<SlotParams>,

    // ---- GRIPPER ----
    /// Units: degrees of openness
    pub gripper_open_deg: f64,

    /// Units: degrees of openness
    pub gripper_closed_deg: f64,

    /// Motion options for closing the gripper on a part.
    pub grip_move: MoveOpts,

    /// Compliance used while closing the gripper, limits the clamping force.
    pub grip_compliance: Compliance,

    // ---- PREPARE ----
    /// Units: degrees
    pub prepare_elbow_deg: f64,

    /// Units: degrees
    pub prepare_shoulder_deg: f64,

    pub prepare_move: MoveOpts,

    /// PID gains of the base while it is positioned over a slot.
    pub base_pid: PidGains,

    /// Added to the slot angle when approaching, removed again by the re-centre.
    ///
    /// Units: degrees
    pub base_bias_deg: f64,

    pub base_move: MoveOpts,

    // ---- LOWER ----
    /// Units: degrees
    pub lower_shoulder_deg: f64,

    /// Compliance used while lowering onto the part.
    pub lower_compliance: Compliance,

    pub lower_move: MoveOpts,

    /// Applied to the approach angle of the base once lowered.
    ///
    /// Units: degrees
    pub base_recenter_deg: f64,

    /// Time the arm is left to settle onto the grip with the torque lock released.
    ///
    /// Units: seconds
    pub settle_s: f64,

    pub poses: Poses,
}

/// A single slot of the magazine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlotParams {
    /// Angle of the slot relative to the calibration reference, `None` if the slot is unavailable.
    ///
    /// Units: degrees
    #[serde(default)]
    pub offset_deg: Option<f64>,

    /// Elbow angle used to lower onto the slot.
    ///
    /// Units: degrees
    pub elbow_deg: f64,
}

/// Named pose transitions run after a pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poses {
    pub optical_inspection: Vec<PoseStep>,
    pub lift_from_optical_inspection: Vec<PoseStep>,
    pub burn: Vec<PoseStep>,

    /// Turns the part over in the burn position so its second side can be burned.
    pub flip: Vec<PoseStep>,
    pub finished: Vec<PoseStep>,
    pub waste: Vec<PoseStep>,
}

/// A single step of a pose transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "move", rename_all = "snake_case")]
pub enum PoseStep {
    Joint {
        joint: Joint,
        angle_deg: f64,
        #[serde(default)]
        opts: MoveOpts,
    },

    Joints {
        base_deg: f64,
        shoulder_deg: f64,
        elbow_deg: f64,
        tool_deg: f64,
        #[serde(default)]
        opts: MoveOpts,
    },

    Cartesian(CartPose),

    /// Gripper move, using the arm's default gripper options if none are given.
    Gripper {
        open_deg: f64,
        #[serde(default)]
        opts: Option<MoveOpts>,
    },

    Wait {
        seconds: f64,
    },
}
