//! # Simulated Arm
//!
//! A deterministic stand-in for the arm implementing [`ArmTransport`]. It keeps the arm's state
//! in the device frame, applies motion targets directly (kinematics are not modelled, joint moves
//! do not change the Cartesian position and vice versa) and records the most recent
//! [`REQUEST_LOG_LEN`] requests it receives.
//!
//! Behaviour can be shaped for tests with the builder methods:
//! - [`SimArm::settle_polls`] delays motion until a number of feedback polls have been made,
//! - [`SimArm::push_torque`] scripts torque readings for a joint,
//! - [`SimArm::freeze_motion_after`] ignores motion requests after a number of motions,
//! - [`SimArm::fail_opcode`] and [`SimArm::fail_from`] inject transport failures.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

use comms_if::eqpt::arm::{opcode, ArmFeedback, ArmRequest, Compliance, Joint};
use log::trace;
use nalgebra::Point3;
use serde_json::Value;
use util::maths::deg_to_rad;

use crate::{
    arm_client::{ArmTransport, TransportError},
    reading::PositionReading,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Joint angles of the init position in the device frame (gripper closed).
///
/// Units: radians
const INIT_JOINT_RAD: [f64; 4] = [0.0, 0.0, std::f64::consts::FRAC_PI_2, std::f64::consts::PI];

/// Position of the tool centre point in the init position.
///
/// Units: millimetres
const INIT_POS_MM: [f64; 3] = [309.41, 0.0, 233.8];

/// Number of requests kept in the request log, older requests are discarded.
pub const REQUEST_LOG_LEN: usize = 4096;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated arm.
#[derive(Debug, Clone)]
pub struct SimArm {
    /// Joint angles in base to tool order, device frame.
    ///
    /// Units: radians
    joint_rad: [f64; 4],

    pos_mm: Point3<f64>,

    torque: [f64; 4],

    torque_lock: bool,

    compliance: Option<Compliance>,

    led: bool,

    /// A motion which has been received but not yet applied.
    pending: Option<ArmRequest>,

    polls_since_motion: usize,

    num_motions: usize,

    settle_polls: usize,

    freeze_after: Option<usize>,

    torque_script: HashMap<Joint, VecDeque<f64>>,

    fail_opcodes: HashMap<u16, TransportError>,

    fail_from: Option<(usize, TransportError)>,

    /// Requests received since creation or the last `clear_requests`.
    num_requests: usize,

    requests: Vec<ArmRequest>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimArm {
    fn default() -> Self {
        Self {
            joint_rad: INIT_JOINT_RAD,
            pos_mm: Point3::new(INIT_POS_MM[0], INIT_POS_MM[1], INIT_POS_MM[2]),
            torque: [0.0; 4],
            torque_lock: true,
            compliance: None,
            led: false,
            pending: None,
            polls_since_motion: 0,
            num_motions: 0,
            settle_polls: 0,
            freeze_after: None,
            torque_script: HashMap::new(),
            fail_opcodes: HashMap::new(),
            fail_from: None,
            num_requests: 0,
            requests: Vec::new(),
        }
    }
}

impl SimArm {
    /// Create a new simulated arm in the init position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply motions only once `n` feedback polls have been made after the motion request.
    pub fn settle_polls(mut self, n: usize) -> Self {
        self.settle_polls = n;
        self
    }

    /// Queue torque values for `joint`, one is consumed by every feedback poll. Once the queue is
    /// empty the last value is held.
    pub fn push_torque(mut self, joint: Joint, values: &[f64]) -> Self {
        self.torque_script
            .entry(joint)
            .or_default()
            .extend(values.iter().copied());
        self
    }

    /// Accept but ignore every motion request after the first `n`.
    pub fn freeze_motion_after(mut self, n: usize) -> Self {
        self.freeze_after = Some(n);
        self
    }

    /// Fail every request with the given opcode.
    pub fn fail_opcode(mut self, op: u16, err: TransportError) -> Self {
        self.fail_opcodes.insert(op, err);
        self
    }

    /// Fail every request from the `n`th (zero based) onwards.
    pub fn fail_from(mut self, n: usize, err: TransportError) -> Self {
        self.fail_from = Some((n, err));
        self
    }

    /// The most recent requests received, including those which were failed.
    pub fn requests(&self) -> &[ArmRequest] {
        &self.requests
    }

    /// Number of requests received with the given opcode.
    pub fn count(&self, op: u16) -> usize {
        self.requests.iter().filter(|r| r.opcode() == op).count()
    }

    /// Forget all recorded requests.
    pub fn clear_requests(&mut self) {
        self.num_requests = 0;
        self.requests.clear();
    }

    pub fn torque_lock(&self) -> bool {
        self.torque_lock
    }

    pub fn compliance(&self) -> Option<Compliance> {
        self.compliance
    }

    pub fn led(&self) -> bool {
        self.led
    }

    /// Current state as raw feedback, without consuming any scripted torque.
    pub fn feedback(&self) -> ArmFeedback {
        ArmFeedback {
            x: self.pos_mm.x,
            y: self.pos_mm.y,
            z: self.pos_mm.z,
            b: self.joint_rad[0],
            s: self.joint_rad[1],
            e: self.joint_rad[2],
            t: self.joint_rad[3],
            tor_b: self.torque[0],
            tor_s: self.torque[1],
            tor_e: self.torque[2],
            tor_h: self.torque[3],
        }
    }

    /// Current state as a reading, without consuming any scripted torque.
    pub fn reading(&self) -> PositionReading {
        PositionReading::from(&self.feedback())
    }

    fn record(&mut self, request: &ArmRequest) {
        if self.requests.len() >= REQUEST_LOG_LEN {
            self.requests.drain(..REQUEST_LOG_LEN / 2);
        }
        self.requests.push(request.clone());
        self.num_requests += 1;
    }

    fn injected_failure(&self, request: &ArmRequest) -> Option<TransportError> {
        if let Some((n, err)) = &self.fail_from {
            if self.num_requests >= *n {
                return Some(err.clone());
            }
        }

        self.fail_opcodes.get(&request.opcode()).cloned()
    }

    fn receive_motion(&mut self, request: &ArmRequest) {
        self.num_motions += 1;

        if let Some(n) = self.freeze_after {
            if self.num_motions > n {
                trace!("SimArm: motion frozen, ignoring {:?}", request);
                return;
            }
        }

        self.polls_since_motion = 0;
        if self.settle_polls == 0 {
            self.apply_motion(request);
        } else {
            self.pending = Some(request.clone());
        }
    }

    fn apply_motion(&mut self, request: &ArmRequest) {
        match *request {
            ArmRequest::Init => {
                self.joint_rad = INIT_JOINT_RAD;
                self.pos_mm = Point3::new(INIT_POS_MM[0], INIT_POS_MM[1], INIT_POS_MM[2]);
            }
            ArmRequest::SingleJoint {
                joint, angle_deg, ..
            } => {
                self.joint_rad[joint_index(joint)] = deg_to_rad(angle_deg);
            }
            ArmRequest::AllJoints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg,
                ..
            } => {
                self.joint_rad = [
                    deg_to_rad(base_deg),
                    deg_to_rad(shoulder_deg),
                    deg_to_rad(elbow_deg),
                    deg_to_rad(tool_deg),
                ];
            }
            ArmRequest::MoveXyzt {
                x_mm,
                y_mm,
                z_mm,
                tool_rad,
                ..
            } => {
                if let Some(x) = x_mm {
                    self.pos_mm.x = x;
                }
                if let Some(y) = y_mm {
                    self.pos_mm.y = y;
                }
                if let Some(z) = z_mm {
                    self.pos_mm.z = z;
                }
                self.joint_rad[3] = tool_rad;
            }
            _ => (),
        }
    }

    fn poll(&mut self) -> ArmFeedback {
        self.polls_since_motion += 1;

        if self.polls_since_motion >= self.settle_polls {
            if let Some(pending) = self.pending.take() {
                self.apply_motion(&pending);
            }
        }

        for joint in Joint::ALL.iter() {
            if let Some(t) = self
                .torque_script
                .get_mut(joint)
                .and_then(|q| q.pop_front())
            {
                self.torque[joint_index(*joint)] = t;
            }
        }

        self.feedback()
    }
}

impl ArmTransport for SimArm {
    fn send(&mut self, request: &ArmRequest) -> Result<Value, TransportError> {
        let failure = self.injected_failure(request);
        self.record(request);

        if let Some(err) = failure {
            trace!("SimArm: failing {:?} with {}", request, err);
            return Err(err);
        }

        match *request {
            ArmRequest::Feedback => {
                let mut value = serde_json::to_value(self.poll())
                    .map_err(|e| TransportError::BadResponse(e.to_string()))?;
                value["T"] = Value::from(opcode::FEEDBACK * 10 + 1);
                return Ok(value);
            }
            ArmRequest::TorqueLock { enable } => self.torque_lock = enable,
            ArmRequest::DynamicForceAdaption(c) => self.compliance = Some(c),
            ArmRequest::SetLed { on } => self.led = on,
            ArmRequest::Init
            | ArmRequest::SingleJoint { .. }
            | ArmRequest::AllJoints { .. }
            | ArmRequest::MoveXyzt { .. } => self.receive_motion(request),
            ArmRequest::SetJointPid { .. } | ArmRequest::ResetPid => (),
        }

        Ok(Value::Null)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn joint_index(joint: Joint) -> usize {
    (joint.id() - 1) as usize
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settle_polls() {
        let mut sim = SimArm::new().settle_polls(2);
        sim.send(&ArmRequest::SingleJoint {
            joint: Joint::Shoulder,
            angle_deg: 30.0,
            speed: 0.2,
            acc: 10.0,
        })
        .unwrap();

        assert_eq!(sim.query_position().unwrap().joint_deg.shoulder, 0.0);
        assert!((sim.query_position().unwrap().joint_deg.shoulder - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_freeze_and_failures() {
        let mut sim = SimArm::new()
            .freeze_motion_after(1)
            .fail_opcode(opcode::SET_LED, TransportError::BadResponse("led".into()));

        let mv = |deg| ArmRequest::SingleJoint {
            joint: Joint::Base,
            angle_deg: deg,
            speed: 0.2,
            acc: 10.0,
        };
        sim.send(&mv(10.0)).unwrap();
        sim.send(&mv(20.0)).unwrap();
        assert!((sim.reading().joint_deg.base - 10.0).abs() < 1e-9);

        assert!(sim.send(&ArmRequest::SetLed { on: true }).is_err());
        assert!(!sim.led());
        assert_eq!(sim.requests().len(), 3);
    }

    #[test]
    fn test_request_log_is_bounded() {
        let timeout = TransportError::Timeout(std::time::Duration::from_secs(1));
        let mut sim = SimArm::new().fail_from(REQUEST_LOG_LEN + 10, timeout);

        for _ in 0..REQUEST_LOG_LEN + 10 {
            sim.query_position().unwrap();
        }
        assert!(sim.requests().len() <= REQUEST_LOG_LEN);
        assert_eq!(sim.count(opcode::FEEDBACK), sim.requests().len());

        // Failures still count every request, not just the logged ones
        assert!(sim.query_position().is_err());
    }

    #[test]
    fn test_torque_script_holds_last() {
        let mut sim = SimArm::new().push_torque(Joint::Elbow, &[5.0, 7.0]);

        assert_eq!(sim.query_position().unwrap().torque.elbow, 5.0);
        assert_eq!(sim.query_position().unwrap().torque.elbow, 7.0);
        assert_eq!(sim.query_position().unwrap().torque.elbow, 7.0);
    }
}
