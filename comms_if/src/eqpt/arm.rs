//! # Robot Arm Commands
//!
//! Wire contract of the arm's JSON command interface. Every request is a single JSON object whose
//! `"T"` field holds the numeric opcode, sent as the `json` query parameter of an HTTP GET to the
//! arm's `/js` endpoint.
//!
//! Units on the wire:
//! - Joint angles in commands (`121`, `122`) are in degrees, in the device frame.
//! - Joint angles in feedback (`105`) and the Cartesian tool angle (`104`) are in radians.
//! - Cartesian positions are in millimetres.
//!
//! The gripper angle on the device is inverted relative to how far the gripper is open, see
//! [`open_to_device`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, str::FromStr};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of decimal places numeric parameters are rounded to before transmission. The arm's
/// firmware rejects oversized requests.
pub const WIRE_DECIMALS: i32 = 4;

/// Angle of a fully closed gripper in the device frame, also the upper end of the openness range.
pub const GRIPPER_DEVICE_CLOSED_DEG: f64 = 180.0;

/// Opcodes understood by the arm.
pub mod opcode {
    pub const INIT: u16 = 100;
    pub const MOVE_XYZT: u16 = 104;
    pub const FEEDBACK: u16 = 105;
    pub const SET_JOINT_PID: u16 = 108;
    pub const RESET_PID: u16 = 109;
    pub const DYNAMIC_FORCE_ADAPTION: u16 = 112;
    pub const SET_LED: u16 = 114;
    pub const SINGLE_JOINT: u16 = 121;
    pub const ALL_JOINTS: u16 = 122;
    pub const TORQUE_LOCK: u16 = 210;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Joints of the arm.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    /// End of arm tooling, the gripper.
    Tool,
}

/// A request sent to the arm.
///
/// Values held here are already in the device frame (gripper inverted, tool angle of `MoveXyzt`
/// in radians). Rounding to [`WIRE_DECIMALS`] happens in [`ArmRequest::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArmRequest {
    /// Move to the init/home position.
    Init,

    /// Read back position, joint angles and torques.
    Feedback,

    /// Move a single joint to an angle in degrees.
    SingleJoint {
        joint: Joint,
        angle_deg: f64,
        speed: f64,
        acc: f64,
    },

    /// Move all joints to angles in degrees.
    AllJoints {
        base_deg: f64,
        shoulder_deg: f64,
        elbow_deg: f64,
        tool_deg: f64,
        speed: f64,
        acc: f64,
    },

    /// Move the tool centre point to a Cartesian position. Axes left as `None` are omitted from
    /// the request.
    MoveXyzt {
        x_mm: Option<f64>,
        y_mm: Option<f64>,
        z_mm: Option<f64>,
        tool_rad: f64,
        speed: f64,
    },

    /// Set the PID gains of a single joint.
    SetJointPid { joint: Joint, gains: PidGains },

    /// Reset all joints to the firmware's default PID gains.
    ResetPid,

    /// Set the dynamic force adaption (compliance) limits.
    DynamicForceAdaption(Compliance),

    /// Switch the LED on or off.
    SetLed { on: bool },

    /// Enable or disable the torque lock of all joints.
    TorqueLock { enable: bool },
}

/// Errors parsing a joint name.
#[derive(Debug, thiserror::Error)]
pub enum JointParseError {
    #[error("Unknown joint \"{0}\", expected one of base, shoulder, elbow, tool")]
    UnknownJoint(String),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Dynamic force adaption setting of the arm's servo loop.
///
/// The values are force limits for each joint, higher values give a stiffer joint. There is no
/// way to read this back from the arm.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compliance {
    pub enabled: bool,
    pub base: i32,
    pub shoulder: i32,
    pub elbow: i32,
    pub hand: i32,
}

/// PID gains of a single joint. Gains are multiples of 8 on the device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGains {
    pub p: u32,
    pub i: u32,
}

/// Raw feedback returned by the arm for a [`ArmRequest::Feedback`] request.
///
/// All fields are required, a response missing any of them is malformed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ArmFeedback {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Joint angles, radians, device frame
    pub b: f64,
    pub s: f64,
    pub e: f64,
    pub t: f64,

    /// Joint torques, device units
    #[serde(rename = "torB")]
    pub tor_b: f64,
    #[serde(rename = "torS")]
    pub tor_s: f64,
    #[serde(rename = "torE")]
    pub tor_e: f64,
    #[serde(rename = "torH")]
    pub tor_h: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Joint {
    /// All joints in base to tool order.
    pub const ALL: [Joint; 4] = [Joint::Base, Joint::Shoulder, Joint::Elbow, Joint::Tool];

    /// The joint ID used on the wire.
    pub fn id(self) -> u8 {
        match self {
            Joint::Base => 1,
            Joint::Shoulder => 2,
            Joint::Elbow => 3,
            Joint::Tool => 4,
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Joint::Base => "base",
            Joint::Shoulder => "shoulder",
            Joint::Elbow => "elbow",
            Joint::Tool => "tool",
        };
        f.write_str(name)
    }
}

impl FromStr for Joint {
    type Err = JointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "b" => Ok(Joint::Base),
            "shoulder" | "s" => Ok(Joint::Shoulder),
            "elbow" | "e" => Ok(Joint::Elbow),
            "tool" | "gripper" | "t" => Ok(Joint::Tool),
            _ => Err(JointParseError::UnknownJoint(s.to_string())),
        }
    }
}

impl Compliance {
    /// Baseline setting applied at init and restored after every routine.
    pub const BASELINE: Compliance = Compliance {
        enabled: true,
        base: 500,
        shoulder: 500,
        elbow: 500,
        hand: 500,
    };
}

impl Default for PidGains {
    /// Firmware default gains.
    fn default() -> Self {
        Self { p: 16, i: 0 }
    }
}

impl ArmRequest {
    /// The opcode of this request.
    pub fn opcode(&self) -> u16 {
        match self {
            ArmRequest::Init => opcode::INIT,
            ArmRequest::Feedback => opcode::FEEDBACK,
            ArmRequest::SingleJoint { .. } => opcode::SINGLE_JOINT,
            ArmRequest::AllJoints { .. } => opcode::ALL_JOINTS,
            ArmRequest::MoveXyzt { .. } => opcode::MOVE_XYZT,
            ArmRequest::SetJointPid { .. } => opcode::SET_JOINT_PID,
            ArmRequest::ResetPid => opcode::RESET_PID,
            ArmRequest::DynamicForceAdaption(_) => opcode::DYNAMIC_FORCE_ADAPTION,
            ArmRequest::SetLed { .. } => opcode::SET_LED,
            ArmRequest::TorqueLock { .. } => opcode::TORQUE_LOCK,
        }
    }

    /// Returns true if this request moves the arm.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            ArmRequest::SingleJoint { .. } | ArmRequest::AllJoints { .. } | ArmRequest::MoveXyzt { .. }
        )
    }

    /// Encode the request as the JSON object expected by the arm.
    pub fn to_json(&self) -> Value {
        let op = self.opcode();

        match *self {
            ArmRequest::Init | ArmRequest::Feedback | ArmRequest::ResetPid => json!({ "T": op }),
            ArmRequest::SingleJoint {
                joint,
                angle_deg,
                speed,
                acc,
            } => json!({
                "T": op,
                "joint": joint.id(),
                "angle": round_param(angle_deg),
                "spd": round_param(speed),
                "acc": round_param(acc)
            }),
            ArmRequest::AllJoints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg,
                speed,
                acc,
            } => json!({
                "T": op,
                "b": round_param(base_deg),
                "s": round_param(shoulder_deg),
                "e": round_param(elbow_deg),
                "h": round_param(tool_deg),
                "spd": round_param(speed),
                "acc": round_param(acc)
            }),
            ArmRequest::MoveXyzt {
                x_mm,
                y_mm,
                z_mm,
                tool_rad,
                speed,
            } => {
                let mut obj = json!({
                    "T": op,
                    "t": round_param(tool_rad),
                    "spd": round_param(speed)
                });
                for (key, val) in [("x", x_mm), ("y", y_mm), ("z", z_mm)] {
                    if let Some(v) = val {
                        obj[key] = json!(round_param(v));
                    }
                }
                obj
            }
            ArmRequest::SetJointPid { joint, gains } => json!({
                "T": op,
                "joint": joint.id(),
                "p": gains.p,
                "i": gains.i
            }),
            ArmRequest::DynamicForceAdaption(c) => json!({
                "T": op,
                "mode": u8::from(c.enabled),
                "b": c.base,
                "s": c.shoulder,
                "e": c.elbow,
                "h": c.hand
            }),
            ArmRequest::SetLed { on } => json!({
                "T": op,
                "led": if on { 255 } else { 0 }
            }),
            ArmRequest::TorqueLock { enable } => json!({
                "T": op,
                "cmd": u8::from(enable)
            }),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a gripper openness angle into the device's gripper angle.
pub fn open_to_device(open_deg: f64) -> f64 {
    GRIPPER_DEVICE_CLOSED_DEG - open_deg
}

/// Convert the device's gripper angle into an openness angle.
pub fn device_to_open(device_deg: f64) -> f64 {
    GRIPPER_DEVICE_CLOSED_DEG - device_deg
}

/// Round a numeric parameter to [`WIRE_DECIMALS`] places.
pub fn round_param(value: f64) -> f64 {
    let scale = 10f64.powi(WIRE_DECIMALS);
    (value * scale).round() / scale
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gripper_inversion() {
        for a in 0..=180 {
            let a = a as f64;
            assert_eq!(open_to_device(device_to_open(a)), a);
            assert_eq!(device_to_open(open_to_device(a)), a);
        }
        assert_eq!(open_to_device(45.0), 135.0);
    }

    #[test]
    fn test_single_joint_encoding() {
        let req = ArmRequest::SingleJoint {
            joint: Joint::Base,
            angle_deg: 101.123456789,
            speed: 0.2,
            acc: 10.0,
        };

        assert_eq!(
            req.to_json(),
            json!({"T": 121, "joint": 1, "angle": 101.1235, "spd": 0.2, "acc": 10.0})
        );
    }

    #[test]
    fn test_move_xyzt_omits_untargeted_axes() {
        let req = ArmRequest::MoveXyzt {
            x_mm: Some(235.000049),
            y_mm: None,
            z_mm: Some(-12.5),
            tool_rad: 3.14159265,
            speed: 0.3,
        };
        let obj = req.to_json();

        assert_eq!(obj["T"], 104);
        assert_eq!(obj["x"], 235.0);
        assert_eq!(obj["z"], -12.5);
        assert_eq!(obj["t"], 3.1416);
        assert!(obj.get("y").is_none());
    }

    #[test]
    fn test_settings_encoding() {
        assert_eq!(
            ArmRequest::DynamicForceAdaption(Compliance::BASELINE).to_json(),
            json!({"T": 112, "mode": 1, "b": 500, "s": 500, "e": 500, "h": 500})
        );
        assert_eq!(
            ArmRequest::TorqueLock { enable: false }.to_json(),
            json!({"T": 210, "cmd": 0})
        );
        assert_eq!(ArmRequest::SetLed { on: true }.to_json(), json!({"T": 114, "led": 255}));
        assert_eq!(
            ArmRequest::SetJointPid {
                joint: Joint::Elbow,
                gains: PidGains { p: 32, i: 8 }
            }
            .to_json(),
            json!({"T": 108, "joint": 3, "p": 32, "i": 8})
        );
    }

    #[test]
    fn test_feedback_decoding() {
        let raw = r#"{"T":1051,"x":309.4,"y":2.1,"z":233.8,"b":0.0061,"s":-0.0015,
            "e":3.1416,"t":1.5708,"torB":-4,"torS":12,"torE":-40,"torH":0}"#;
        let fb: ArmFeedback = serde_json::from_str(raw).unwrap();

        assert_eq!(fb.x, 309.4);
        assert_eq!(fb.tor_e, -40.0);

        let missing = r#"{"x":1.0,"y":2.0,"z":3.0,"b":0.0,"s":0.0,"e":0.0,"t":0.0}"#;
        assert!(serde_json::from_str::<ArmFeedback>(missing).is_err());
    }

    #[test]
    fn test_joint_from_str() {
        assert_eq!("Shoulder".parse::<Joint>().unwrap(), Joint::Shoulder);
        assert_eq!("gripper".parse::<Joint>().unwrap(), Joint::Tool);
        assert!("wrist".parse::<Joint>().is_err());
    }
}
