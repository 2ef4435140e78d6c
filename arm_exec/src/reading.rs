//! # Position Readings
//!
//! Maps raw arm feedback (radians, device frame, short field names) onto named joint and axis
//! values in operator units (degrees, gripper openness).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;

use comms_if::eqpt::arm::{self, ArmFeedback, Joint};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use util::maths::rad_to_deg;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A value for each joint of the arm.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct JointVals {
    pub base: f64,
    pub shoulder: f64,
    pub elbow: f64,
    pub tool: f64,
}

/// A snapshot of the arm's state captured by a single feedback query.
///
/// All fields come from the same response. Readings are never modified, a new one is produced
/// for every query.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    /// Position of the tool centre point.
    ///
    /// Units: millimetres
    pub pos_mm: Point3<f64>,

    /// Joint angles. The tool angle is the gripper openness.
    ///
    /// Units: degrees
    pub joint_deg: JointVals,

    /// Joint torques.
    ///
    /// Units: device torque units
    pub torque: JointVals,
}

/// Best-effort snapshot of the arm's state attached to errors, `None` if the arm could not be
/// read at the time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot(pub Option<PositionReading>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single dimension of a position reading that can be targeted by a motion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Joint(Joint),
    X,
    Y,
    Z,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointVals {
    /// Get the value for the given joint.
    pub fn get(&self, joint: Joint) -> f64 {
        match joint {
            Joint::Base => self.base,
            Joint::Shoulder => self.shoulder,
            Joint::Elbow => self.elbow,
            Joint::Tool => self.tool,
        }
    }
}

impl PositionReading {
    /// Get the value of a single dimension of this reading, in its native unit (degrees for
    /// joints, millimetres for axes).
    pub fn value(&self, dim: Dim) -> f64 {
        match dim {
            Dim::Joint(j) => self.joint_deg.get(j),
            Dim::X => self.pos_mm.x,
            Dim::Y => self.pos_mm.y,
            Dim::Z => self.pos_mm.z,
        }
    }

    /// Encode this reading as raw device feedback. Inverse of the `From<ArmFeedback>` mapping.
    pub fn to_feedback(&self) -> ArmFeedback {
        let rad = |deg: f64| util::maths::deg_to_rad(deg);

        ArmFeedback {
            x: self.pos_mm.x,
            y: self.pos_mm.y,
            z: self.pos_mm.z,
            b: rad(self.joint_deg.base),
            s: rad(self.joint_deg.shoulder),
            e: rad(self.joint_deg.elbow),
            t: rad(arm::open_to_device(self.joint_deg.tool)),
            tor_b: self.torque.base,
            tor_s: self.torque.shoulder,
            tor_e: self.torque.elbow,
            tor_h: self.torque.tool,
        }
    }
}

impl From<&ArmFeedback> for PositionReading {
    fn from(fb: &ArmFeedback) -> Self {
        Self {
            pos_mm: Point3::new(fb.x, fb.y, fb.z),
            joint_deg: JointVals {
                base: rad_to_deg(fb.b),
                shoulder: rad_to_deg(fb.s),
                elbow: rad_to_deg(fb.e),
                tool: arm::device_to_open(rad_to_deg(fb.t)),
            },
            torque: JointVals {
                base: fb.tor_b,
                shoulder: fb.tor_s,
                elbow: fb.tor_e,
                tool: fb.tor_h,
            },
        }
    }
}

impl fmt::Display for PositionReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.2}, Y:{:.2}, Z:{:.2}, b:{:.2}, s:{:.2}, e:{:.2}, t:{:.2}, torque:{:.0}/{:.0}/{:.0}/{:.0}",
            self.pos_mm.x,
            self.pos_mm.y,
            self.pos_mm.z,
            self.joint_deg.base,
            self.joint_deg.shoulder,
            self.joint_deg.elbow,
            self.joint_deg.tool,
            self.torque.base,
            self.torque.shoulder,
            self.torque.elbow,
            self.torque.tool
        )
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(r) => r.fmt(f),
            None => f.write_str("unknown"),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Joint(j) => j.fmt(f),
            Dim::X => f.write_str("x"),
            Dim::Y => f.write_str("y"),
            Dim::Z => f.write_str("z"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
