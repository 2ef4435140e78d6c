//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

// Internal
use super::{ArmError, Params};
use crate::{
    arm_client::ArmTransport,
    motion::{MotionCmd, MotionEngine, MoveOpts},
    reading::{PositionReading, Snapshot},
};
use comms_if::eqpt::arm::{ArmRequest, Compliance, Joint, PidGains};
use util::time::seconds_to_duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm control state
pub struct ArmCtrl<T: ArmTransport> {
    transport: T,

    engine: MotionEngine,

    params: Params,

    state: DeviceState,
}

/// Settings last applied to the arm.
///
/// The arm provides no read-back for these, so this is the only record of them. A field is only
/// updated once the arm has accepted the request. If a request fails the field becomes unknown,
/// since the arm may or may not have applied it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub compliance: Option<Compliance>,

    /// Gains per joint, joints missing from the map are unknown.
    pub pid: HashMap<Joint, PidGains>,

    pub torque_lock: Option<bool>,

    pub led: Option<bool>,

    /// Last commanded gripper openness.
    ///
    /// Units: degrees
    pub gripper_open_deg: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: ArmTransport> ArmCtrl<T> {
    /// Create a new arm controller. No request is sent to the arm.
    pub fn new(transport: T, params: Params) -> Self {
        Self {
            transport,
            engine: MotionEngine::new(seconds_to_duration(params.poll_interval_s)),
            params,
            state: DeviceState::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Bring the arm into a known state and move it to the init position.
    ///
    /// Checks the arm is reachable, applies the baseline compliance, resets the PID gains and
    /// sends the arm home. Returns the arm's position once the init request has been sent.
    pub fn init_position(&mut self) -> Result<PositionReading, ArmError> {
        let reading = self.position()?;
        info!("Arm reachable, at {}", reading);

        self.set_dynamic_force_adaption(self.params.baseline_compliance)?;
        self.reset_pid()?;
        self.send(&ArmRequest::Init)?;

        let reading = self.position()?;
        info!("Arm initialised, at {}", reading);

        Ok(reading)
    }

    // ---- FEEDBACK ----

    pub fn position(&mut self) -> Result<PositionReading, ArmError> {
        self.transport
            .query_position()
            .map_err(|source| ArmError::Transport {
                source,
                snapshot: Snapshot(None),
            })
    }

    /// Angle of the joint in degrees, the tool angle is the gripper openness.
    pub fn angle(&mut self, joint: Joint) -> Result<f64, ArmError> {
        Ok(self.position()?.joint_deg.get(joint))
    }

    pub fn torque(&mut self, joint: Joint) -> Result<f64, ArmError> {
        Ok(self.position()?.torque.get(joint))
    }

    /// Human readable position, `"unknown"` if the arm could not be read.
    pub fn position_readable(&mut self) -> String {
        self.snapshot().to_string()
    }

    /// Best-effort reading of the arm's state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot(self.transport.query_position().ok())
    }

    // ---- SETTINGS ----

    pub fn set_torque_lock(&mut self, enable: bool) -> Result<(), ArmError> {
        debug!("Torque lock {}", if enable { "on" } else { "off" });

        self.state.torque_lock = None;
        self.send(&ArmRequest::TorqueLock { enable })?;
        self.state.torque_lock = Some(enable);

        Ok(())
    }

    pub fn set_dynamic_force_adaption(&mut self, compliance: Compliance) -> Result<(), ArmError> {
        debug!("Compliance {:?}", compliance);

        self.state.compliance = None;
        self.send(&ArmRequest::DynamicForceAdaption(compliance))?;
        self.state.compliance = Some(compliance);

        Ok(())
    }

    pub fn set_joint_pid(&mut self, joint: Joint, gains: PidGains) -> Result<(), ArmError> {
        debug!("PID of {} joint: {:?}", joint, gains);

        self.state.pid.remove(&joint);
        self.send(&ArmRequest::SetJointPid { joint, gains })?;
        self.state.pid.insert(joint, gains);

        Ok(())
    }

    /// Reset all joints to the firmware's default PID gains.
    pub fn reset_pid(&mut self) -> Result<(), ArmError> {
        debug!("Reset PID gains");

        self.state.pid.clear();
        self.send(&ArmRequest::ResetPid)?;
        for joint in Joint::ALL.iter() {
            self.state.pid.insert(*joint, self.params.default_pid);
        }

        Ok(())
    }

    pub fn set_led(&mut self, on: bool) -> Result<(), ArmError> {
        self.state.led = None;
        self.send(&ArmRequest::SetLed { on })?;
        self.state.led = Some(on);

        Ok(())
    }

    // ---- MOTIONS ----

    /// Open or close the gripper to the given openness in degrees.
    pub fn set_gripper(&mut self, open_deg: f64, opts: MoveOpts) -> Result<PositionReading, ArmError> {
        self.move_single_joint(Joint::Tool, open_deg, opts)
    }

    /// Open or close the gripper using the default gripper motion options.
    pub fn set_gripper_default(&mut self, open_deg: f64) -> Result<PositionReading, ArmError> {
        self.set_gripper(open_deg, self.params.gripper_move)
    }

    pub fn move_single_joint(
        &mut self,
        joint: Joint,
        angle_deg: f64,
        opts: MoveOpts,
    ) -> Result<PositionReading, ArmError> {
        self.execute(&MotionCmd::SingleJoint {
            joint,
            angle_deg,
            opts,
        })
    }

    /// Drive a joint towards `angle_deg` until its torque crosses `max_torque`.
    pub fn move_single_joint_torque_limited(
        &mut self,
        joint: Joint,
        angle_deg: f64,
        speed: f64,
        acc: f64,
        max_torque: f64,
        timeout_s: f64,
    ) -> Result<PositionReading, ArmError> {
        self.execute(&MotionCmd::SingleJointTorqueLimited {
            joint,
            angle_deg,
            speed,
            acc,
            max_torque,
            timeout_s,
        })
    }

    pub fn move_all_joints(
        &mut self,
        base_deg: f64,
        shoulder_deg: f64,
        elbow_deg: f64,
        tool_deg: f64,
        opts: MoveOpts,
    ) -> Result<PositionReading, ArmError> {
        self.execute(&MotionCmd::AllJoints {
            base_deg,
            shoulder_deg,
            elbow_deg,
            tool_deg,
            opts,
        })
    }

    /// Cartesian move, axes given as `None` are left out of the request and not confirmed.
    pub fn move_to_xyzt(
        &mut self,
        x_mm: Option<f64>,
        y_mm: Option<f64>,
        z_mm: Option<f64>,
        tool_deg: f64,
        opts: MoveOpts,
    ) -> Result<PositionReading, ArmError> {
        self.execute(&MotionCmd::Cartesian {
            x_mm,
            y_mm,
            z_mm,
            tool_deg,
            opts,
        })
    }

    /// Execute a confirmed motion.
    pub fn execute(&mut self, cmd: &MotionCmd) -> Result<PositionReading, ArmError> {
        let gripper_target = match *cmd {
            MotionCmd::SingleJoint {
                joint: Joint::Tool,
                angle_deg,
                ..
            }
            | MotionCmd::SingleJointTorqueLimited {
                joint: Joint::Tool,
                angle_deg,
                ..
            } => Some(angle_deg),
            MotionCmd::AllJoints { tool_deg, .. } | MotionCmd::Cartesian { tool_deg, .. } => {
                Some(tool_deg)
            }
            _ => None,
        };

        if gripper_target.is_some() {
            self.state.gripper_open_deg = None;
        }

        let reading = self.engine.execute(&mut self.transport, cmd)?;

        if gripper_target.is_some() {
            self.state.gripper_open_deg = gripper_target;
        }

        Ok(reading)
    }

    // ---- ROUTINES ----

    /// Release the torque lock and log the arm's position until `stop` is raised, then re-lock.
    ///
    /// The arm can be moved by hand while in teach mode.
    pub fn teach_mode(&mut self, stop: &AtomicBool) -> Result<(), ArmError> {
        info!("Entering teach mode");
        self.set_torque_lock(false)?;

        let period = seconds_to_duration(self.params.teach_period_s);
        while !stop.load(Ordering::Relaxed) {
            info!("{}", self.position_readable());
            std::thread::sleep(period);
        }

        info!("Exiting teach mode");
        self.set_torque_lock(true)
    }

    /// Restore the baseline settings: torque lock on, baseline compliance and default PID gains.
    ///
    /// Only settings not already known to be at baseline are sent. All settings are attempted
    /// even if one fails, the first error is returned.
    pub fn restore_baseline(&mut self) -> Result<(), ArmError> {
        let mut result = Ok(());

        if self.state.torque_lock != Some(true) {
            result = result.and(self.set_torque_lock(true));
        }

        let baseline = self.params.baseline_compliance;
        if self.state.compliance != Some(baseline) {
            result = result.and(self.set_dynamic_force_adaption(baseline));
        }

        let default_pid = self.params.default_pid;
        let pid_at_default = Joint::ALL
            .iter()
            .all(|j| self.state.pid.get(j) == Some(&default_pid));
        if !pid_at_default {
            result = result.and(self.reset_pid());
        }

        result
    }

    /// Run `routine` then restore the baseline settings, whether the routine succeeded or not.
    ///
    /// An error from the routine is returned in preference to an error from the restore, which is
    /// then only logged.
    pub fn with_baseline_restore<R, E, F>(&mut self, routine: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<ArmError>,
    {
        let result = routine(self);
        let restore = self.restore_baseline();

        match (result, restore) {
            (Ok(r), Ok(())) => Ok(r),
            (Ok(_), Err(e)) => Err(E::from(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                warn!("Could not restore the arm's baseline settings: {}", restore_err);
                Err(e)
            }
        }
    }

    fn send(&mut self, request: &ArmRequest) -> Result<Value, ArmError> {
        match self.transport.send(request) {
            Ok(v) => Ok(v),
            Err(source) => Err(ArmError::Transport {
                source,
                snapshot: self.snapshot(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
