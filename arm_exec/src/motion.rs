//! # Motion Confirmation Engine
//!
//! The arm's interface is fire and forget: a motion request returns as soon as the arm has
//! received it. This module turns a motion request into a blocking, confirmed operation by
//! polling the arm's feedback until a predicate over the reading holds or a timeout elapses.
//!
//! The engine holds no state between calls. Motions are never retried here, a timed out or
//! failed motion is terminal for the calling routine.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use comms_if::eqpt::arm::{self, ArmRequest, Joint};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use util::{maths, time::seconds_to_duration};

use crate::{
    arm_client::{ArmTransport, TransportError},
    reading::{Dim, PositionReading, Snapshot},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default delay between two feedback queries of a poll loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Options of a confirmed motion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MoveOpts {
    /// Speed passed to the arm, device units.
    pub speed: f64,

    /// Acceleration passed to the arm, device units. Not used by Cartesian moves.
    pub acc: f64,

    /// Absolute tolerance on each targeted dimension, degrees for joints and millimetres for
    /// Cartesian axes.
    pub tolerance: f64,

    /// Time allowed for the motion to be confirmed.
    ///
    /// Units: seconds
    pub timeout_s: f64,
}

/// A Cartesian pose of the tool centre point, as written in parameter files.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CartPose {
    #[serde(default)]
    pub x_mm: Option<f64>,

    #[serde(default)]
    pub y_mm: Option<f64>,

    #[serde(default)]
    pub z_mm: Option<f64>,

    /// Gripper openness.
    ///
    /// Units: degrees
    pub tool_deg: f64,

    #[serde(default)]
    pub opts: MoveOpts,
}

/// Confirms motions by polling an [`ArmTransport`].
#[derive(Debug, Clone, Copy)]
pub struct MotionEngine {
    poll_interval: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A motion of the arm in operator units.
///
/// Joint angles are in degrees, with the tool angle given as gripper openness.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionCmd {
    SingleJoint {
        joint: Joint,
        angle_deg: f64,
        opts: MoveOpts,
    },

    /// Move a single joint until its torque crosses `max_torque`.
    ///
    /// The position target is only a direction to drive in, the motion is confirmed by
    /// resistance rather than by reaching the angle.
    SingleJointTorqueLimited {
        joint: Joint,
        angle_deg: f64,
        speed: f64,
        acc: f64,
        max_torque: f64,
        timeout_s: f64,
    },

    AllJoints {
        base_deg: f64,
        shoulder_deg: f64,
        elbow_deg: f64,
        tool_deg: f64,
        opts: MoveOpts,
    },

    /// Cartesian move of the tool centre point. Only the given axes are targeted and confirmed.
    Cartesian {
        x_mm: Option<f64>,
        y_mm: Option<f64>,
        z_mm: Option<f64>,
        tool_deg: f64,
        opts: MoveOpts,
    },
}

/// Predicate deciding when a motion is complete.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirm {
    /// Every target must be within `tolerance` on the same reading.
    Within {
        targets: Vec<(Dim, f64)>,
        tolerance: f64,
    },

    /// The torque of `joint` must cross `limit`.
    ///
    /// A positive limit is crossed when the torque rises to or above it, a zero or negative
    /// limit when the torque falls to or below it.
    TorqueLimit { joint: Joint, limit: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Could not send the motion request: {source} (arm at {snapshot})")]
    SendFailed {
        source: TransportError,
        snapshot: Snapshot,
    },

    #[error("Motion not confirmed within {timeout:?} (arm at {snapshot})")]
    Timeout { timeout: Duration, snapshot: Snapshot },

    #[error("Could not query the arm's position while confirming the motion: {source} (arm at {snapshot})")]
    QueryFailed {
        source: TransportError,
        snapshot: Snapshot,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MoveOpts {
    fn default() -> Self {
        Self {
            speed: 0.2,
            acc: 10.0,
            tolerance: 5.0,
            timeout_s: 3.0,
        }
    }
}

impl MoveOpts {
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_s)
    }
}

impl CartPose {
    pub fn to_cmd(&self) -> MotionCmd {
        MotionCmd::Cartesian {
            x_mm: self.x_mm,
            y_mm: self.y_mm,
            z_mm: self.z_mm,
            tool_deg: self.tool_deg,
            opts: self.opts,
        }
    }
}

impl MotionCmd {
    /// Build the device request for this motion, converting the tool angle into the device frame.
    pub fn request(&self) -> ArmRequest {
        match *self {
            MotionCmd::SingleJoint {
                joint,
                angle_deg,
                opts,
            } => ArmRequest::SingleJoint {
                joint,
                angle_deg: joint_to_device(joint, angle_deg),
                speed: opts.speed,
                acc: opts.acc,
            },
            MotionCmd::SingleJointTorqueLimited {
                joint,
                angle_deg,
                speed,
                acc,
                ..
            } => ArmRequest::SingleJoint {
                joint,
                angle_deg: joint_to_device(joint, angle_deg),
                speed,
                acc,
            },
            MotionCmd::AllJoints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg,
                opts,
            } => ArmRequest::AllJoints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg: arm::open_to_device(tool_deg),
                speed: opts.speed,
                acc: opts.acc,
            },
            MotionCmd::Cartesian {
                x_mm,
                y_mm,
                z_mm,
                tool_deg,
                opts,
            } => ArmRequest::MoveXyzt {
                x_mm,
                y_mm,
                z_mm,
                tool_rad: maths::deg_to_rad(arm::open_to_device(tool_deg)),
                speed: opts.speed,
            },
        }
    }

    /// The predicate which confirms this motion.
    pub fn confirm(&self) -> Confirm {
        match *self {
            MotionCmd::SingleJoint {
                joint,
                angle_deg,
                opts,
            } => Confirm::Within {
                targets: vec![(Dim::Joint(joint), angle_deg)],
                tolerance: opts.tolerance,
            },
            MotionCmd::SingleJointTorqueLimited {
                joint, max_torque, ..
            } => Confirm::TorqueLimit {
                joint,
                limit: max_torque,
            },
            MotionCmd::AllJoints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg,
                opts,
            } => Confirm::Within {
                targets: vec![
                    (Dim::Joint(Joint::Base), base_deg),
                    (Dim::Joint(Joint::Shoulder), shoulder_deg),
                    (Dim::Joint(Joint::Elbow), elbow_deg),
                    (Dim::Joint(Joint::Tool), tool_deg),
                ],
                tolerance: opts.tolerance,
            },
            MotionCmd::Cartesian {
                x_mm,
                y_mm,
                z_mm,
                opts,
                ..
            } => Confirm::Within {
                targets: [(Dim::X, x_mm), (Dim::Y, y_mm), (Dim::Z, z_mm)]
                    .iter()
                    .filter_map(|(d, v)| v.map(|v| (*d, v)))
                    .collect(),
                tolerance: opts.tolerance,
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            MotionCmd::SingleJoint { opts, .. }
            | MotionCmd::AllJoints { opts, .. }
            | MotionCmd::Cartesian { opts, .. } => opts.timeout(),
            MotionCmd::SingleJointTorqueLimited { timeout_s, .. } => seconds_to_duration(*timeout_s),
        }
    }
}

impl Confirm {
    /// Returns true if the reading satisfies this predicate.
    pub fn is_met(&self, reading: &PositionReading) -> bool {
        match self {
            Confirm::Within { targets, tolerance } => targets
                .iter()
                .all(|(dim, target)| maths::within_tol(reading.value(*dim), *target, *tolerance)),
            Confirm::TorqueLimit { joint, limit } => {
                let torque = reading.torque.get(*joint);
                if *limit > 0.0 {
                    torque >= *limit
                } else {
                    torque <= *limit
                }
            }
        }
    }
}

impl MotionError {
    /// State of the arm when the error occured.
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            MotionError::SendFailed { snapshot, .. }
            | MotionError::Timeout { snapshot, .. }
            | MotionError::QueryFailed { snapshot, .. } => snapshot,
        }
    }
}

impl Default for MotionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl MotionEngine {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Execute a motion command, returning the reading which confirmed it.
    pub fn execute<T>(&self, transport: &mut T, cmd: &MotionCmd) -> Result<PositionReading, MotionError>
    where
        T: ArmTransport + ?Sized,
    {
        debug!("Motion: {:?}", cmd);
        self.move_and_confirm(transport, &cmd.request(), &cmd.confirm(), cmd.timeout())
    }

    /// Send `request` and poll the arm until `confirm` holds or `timeout` elapses.
    ///
    /// The timeout is measured from just before the request is sent. A poll is always made
    /// before the timeout is checked, so a motion which completed during the last sleep is still
    /// confirmed.
    pub fn move_and_confirm<T>(
        &self,
        transport: &mut T,
        request: &ArmRequest,
        confirm: &Confirm,
        timeout: Duration,
    ) -> Result<PositionReading, MotionError>
    where
        T: ArmTransport + ?Sized,
    {
        let start = Instant::now();

        if let Err(source) = transport.send(request) {
            return Err(MotionError::SendFailed {
                source,
                snapshot: Snapshot(transport.query_position().ok()),
            });
        }

        let mut num_polls = 0usize;

        loop {
            let reading = match transport.query_position() {
                Ok(r) => r,
                Err(source) => {
                    return Err(MotionError::QueryFailed {
                        source,
                        snapshot: Snapshot(transport.query_position().ok()),
                    })
                }
            };
            num_polls += 1;

            if confirm.is_met(&reading) {
                trace!(
                    "Motion confirmed after {} polls in {:.3} s",
                    num_polls,
                    start.elapsed().as_secs_f64()
                );
                return Ok(reading);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(MotionError::Timeout {
                    timeout,
                    snapshot: Snapshot(Some(reading)),
                });
            }

            std::thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert an operator joint angle into the device frame. Only the tool is affected.
pub fn joint_to_device(joint: Joint, angle_deg: f64) -> f64 {
    match joint {
        Joint::Tool => arm::open_to_device(angle_deg),
        _ => angle_deg,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_arm::SimArm;
    use comms_if::eqpt::arm::opcode;

    fn single(joint: Joint, angle_deg: f64, timeout_s: f64) -> MotionCmd {
        MotionCmd::SingleJoint {
            joint,
            angle_deg,
            opts: MoveOpts {
                timeout_s,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_confirmed_before_timeout() {
        let mut sim = SimArm::new().settle_polls(3);
        let engine = MotionEngine::new(Duration::from_millis(5));
        let cmd = single(Joint::Base, 90.0, 1.0);

        let start = Instant::now();
        let reading = engine.execute(&mut sim, &cmd).unwrap();

        assert!(start.elapsed() < cmd.timeout());
        assert!(maths::within_tol(reading.joint_deg.base, 90.0, 5.0));
        assert_eq!(sim.count(opcode::FEEDBACK), 3);
    }

    #[test]
    fn test_timeout_bounds() {
        let mut sim = SimArm::new().freeze_motion_after(0);
        let interval = Duration::from_millis(50);
        let engine = MotionEngine::new(interval);
        let cmd = single(Joint::Base, 90.0, 0.1);

        let start = Instant::now();
        let err = engine.execute(&mut sim, &cmd).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, MotionError::Timeout { .. }));
        assert!(err.snapshot().0.is_some());
        assert!(elapsed >= cmd.timeout());
        assert!(elapsed <= cmd.timeout() + interval, "{:?}", elapsed);
    }

    #[test]
    fn test_torque_limited_confirms_on_crossing() {
        let mut sim = SimArm::new().push_torque(Joint::Base, &[-10.0, -30.0, -60.0]);
        let engine = MotionEngine::new(Duration::ZERO);
        let cmd = MotionCmd::SingleJointTorqueLimited {
            joint: Joint::Base,
            angle_deg: -180.0,
            speed: 0.2,
            acc: 10.0,
            max_torque: -50.0,
            timeout_s: 1.0,
        };

        let reading = engine.execute(&mut sim, &cmd).unwrap();

        assert_eq!(reading.torque.base, -60.0);
        assert_eq!(sim.count(opcode::FEEDBACK), 3);
    }

    #[test]
    fn test_all_targets_on_same_reading() {
        let confirm = Confirm::Within {
            targets: vec![(Dim::X, 100.0), (Dim::Z, 50.0)],
            tolerance: 1.0,
        };
        let mut reading = SimArm::new().reading();

        reading.pos_mm.x = 100.5;
        reading.pos_mm.z = 10.0;
        assert!(!confirm.is_met(&reading));

        reading.pos_mm.z = 49.2;
        assert!(confirm.is_met(&reading));

        // Untargeted axes are ignored
        reading.pos_mm.y = 1.0e6;
        assert!(confirm.is_met(&reading));
    }

    #[test]
    fn test_torque_limit_sign() {
        let mut reading = SimArm::new().reading();
        let pos = Confirm::TorqueLimit {
            joint: Joint::Elbow,
            limit: 40.0,
        };
        let neg = Confirm::TorqueLimit {
            joint: Joint::Elbow,
            limit: -40.0,
        };

        reading.torque.elbow = 39.0;
        assert!(!pos.is_met(&reading));
        reading.torque.elbow = 40.0;
        assert!(pos.is_met(&reading));

        reading.torque.elbow = -39.0;
        assert!(!neg.is_met(&reading));
        reading.torque.elbow = -41.0;
        assert!(neg.is_met(&reading));
    }

    #[test]
    fn test_gripper_converted_at_boundary() {
        let cmd = single(Joint::Tool, 45.0, 1.0);

        match cmd.request() {
            ArmRequest::SingleJoint { angle_deg, .. } => assert_eq!(angle_deg, 135.0),
            r => panic!("Unexpected request {:?}", r),
        }

        let mut sim = SimArm::new();
        let reading = MotionEngine::new(Duration::ZERO).execute(&mut sim, &cmd).unwrap();
        assert!(maths::within_tol(reading.joint_deg.tool, 45.0, 1e-6));
    }

    #[test]
    fn test_wire_angle_round_trip() {
        // Angles go out as radians rounded to the wire precision, and are compared in degrees
        let mut rad = -std::f64::consts::PI;
        while rad <= std::f64::consts::PI {
            let deg = arm::round_param(maths::rad_to_deg(rad));
            let back = maths::rad_to_deg(arm::round_param(maths::deg_to_rad(deg)));

            assert!(maths::within_tol(back, deg, 0.01), "{} -> {} -> {}", rad, deg, back);

            rad += 0.0137;
        }
    }

    #[test]
    fn test_cartesian_targets_only_given_axes() {
        let cmd = MotionCmd::Cartesian {
            x_mm: Some(200.0),
            y_mm: None,
            z_mm: Some(-20.0),
            tool_deg: 0.0,
            opts: MoveOpts::default(),
        };

        match cmd.confirm() {
            Confirm::Within { targets, .. } => {
                assert_eq!(targets, vec![(Dim::X, 200.0), (Dim::Z, -20.0)])
            }
            c => panic!("Unexpected predicate {:?}", c),
        }
    }

    #[test]
    fn test_send_failure() {
        let mut sim = SimArm::new()
            .fail_opcode(opcode::SINGLE_JOINT, TransportError::Unreachable("down".into()));
        let engine = MotionEngine::new(Duration::ZERO);

        let err = engine.execute(&mut sim, &single(Joint::Elbow, 10.0, 1.0)).unwrap_err();

        assert!(matches!(err, MotionError::SendFailed { .. }));
        // Feedback still works so the snapshot is captured
        assert!(err.snapshot().0.is_some());
    }

    #[test]
    fn test_query_failure() {
        // The first request (the motion) succeeds, every later one fails
        let mut sim = SimArm::new().fail_from(1, TransportError::Timeout(Duration::from_secs(1)));
        let engine = MotionEngine::new(Duration::ZERO);

        let err = engine.execute(&mut sim, &single(Joint::Elbow, 10.0, 1.0)).unwrap_err();

        assert!(matches!(
            err,
            MotionError::QueryFailed {
                source: TransportError::Timeout(_),
                snapshot: Snapshot(None)
            }
        ));
    }
}
