//! # Reference Calibration
//!
//! Establishes the base joint's reference orientation for the session by driving the base against
//! its mechanical hard stop under force limiting and capturing the position it settles in. All
//! slot angles used while picking are offsets from this reference.
//!
//! The reference is only valid until the arm is power cycled or the session restarts.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;

use comms_if::eqpt::arm::Joint;
use log::{error, info};
use serde::{Deserialize, Serialize};
use util::{session, time::seconds_to_duration};

use crate::{
    arm_client::ArmTransport,
    arm_ctrl::{ArmCtrl, ArmError},
    reading::{PositionReading, Snapshot},
};

pub use params::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session relative path the reference is saved to.
pub const REFERENCE_SAVE_PATH: &str = "calib/reference.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Reference orientation of the base joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibRef {
    /// Angle of the base joint resting against its hard stop.
    ///
    /// Units: degrees
    pub base_angle_deg: f64,

    /// Full reading captured with the reference.
    pub reading: PositionReading,
}

/// Steps of the calibration procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibStep {
    Approach,
    ProbeCompliance,
    Probe,
    Settle,
    Capture,
    Restore,
    Lift,
}

#[derive(Debug, thiserror::Error)]
#[error("Calibration failed during the {step} step: {source}")]
pub struct CalibrationFailed {
    pub step: CalibStep,
    pub source: ArmError,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl fmt::Display for CalibStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibStep::Approach => "approach",
            CalibStep::ProbeCompliance => "probe compliance",
            CalibStep::Probe => "hard stop probe",
            CalibStep::Settle => "settle",
            CalibStep::Capture => "capture",
            CalibStep::Restore => "restore",
            CalibStep::Lift => "lift",
        };
        f.write_str(name)
    }
}

impl CalibrationFailed {
    pub fn snapshot(&self) -> &Snapshot {
        self.source.snapshot()
    }
}

/// Errors from restoring the baseline settings at the end of the procedure.
impl From<ArmError> for CalibrationFailed {
    fn from(source: ArmError) -> Self {
        Self {
            step: CalibStep::Restore,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run the calibration procedure, returning the captured reference.
///
/// Any failure aborts the whole procedure, no reference is ever guessed. The arm's baseline
/// settings are restored before returning, whether the procedure succeeded or not.
pub fn calibrate<T: ArmTransport>(
    arm: &mut ArmCtrl<T>,
    params: &Params,
) -> Result<CalibRef, CalibrationFailed> {
    info!("Calibrating the base reference");

    let result = arm.with_baseline_restore(|arm| run(arm, params));

    match result {
        Ok(calib_ref) => {
            info!(
                "Base reference at {:.2} deg ({})",
                calib_ref.base_angle_deg, calib_ref.reading
            );
            session::save_with_timestamp(REFERENCE_SAVE_PATH, calib_ref);
        }
        Err(ref e) => error!("{}", e),
    }

    result
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn run<T: ArmTransport>(arm: &mut ArmCtrl<T>, params: &Params) -> Result<CalibRef, CalibrationFailed> {
    arm.execute(&params.approach.to_cmd())
        .map_err(at(CalibStep::Approach))?;

    arm.set_dynamic_force_adaption(params.probe_compliance)
        .map_err(at(CalibStep::ProbeCompliance))?;

    let probe = &params.probe;
    let contact = arm
        .move_single_joint_torque_limited(
            Joint::Base,
            probe.angle_deg,
            probe.speed,
            probe.acc,
            probe.max_torque,
            probe.timeout_s,
        )
        .map_err(at(CalibStep::Probe))?;
    info!("Hard stop contact at {}", contact);

    arm.execute(&params.settle.to_cmd())
        .map_err(at(CalibStep::Settle))?;
    arm.set_torque_lock(false).map_err(at(CalibStep::Settle))?;
    std::thread::sleep(seconds_to_duration(params.settle_s));

    let reading = arm.position().map_err(at(CalibStep::Capture))?;
    let calib_ref = CalibRef {
        base_angle_deg: reading.joint_deg.base,
        reading,
    };

    arm.restore_baseline().map_err(at(CalibStep::Restore))?;

    let lift = &params.lift;
    arm.move_single_joint(Joint::Shoulder, lift.shoulder_deg, lift.opts)
        .map_err(at(CalibStep::Lift))?;
    arm.move_single_joint(Joint::Elbow, lift.elbow_deg, lift.opts)
        .map_err(at(CalibStep::Lift))?;
    arm.move_single_joint(Joint::Base, calib_ref.base_angle_deg, lift.opts)
        .map_err(at(CalibStep::Lift))?;

    Ok(calib_ref)
}

fn at(step: CalibStep) -> impl FnOnce(ArmError) -> CalibrationFailed {
    move |source| CalibrationFailed { step, source }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{arm_client::TransportError, arm_ctrl, sim_arm::SimArm};
    use comms_if::eqpt::arm::{opcode, ArmRequest, Compliance};

    pub(crate) fn params() -> Params {
        let mut p: Params = util::params::parse(include_str!("../../../params/calib.toml")).unwrap();
        p.settle_s = 0.0;
        p
    }

    fn arm(sim: SimArm) -> ArmCtrl<SimArm> {
        ArmCtrl::new(
            sim,
            arm_ctrl::Params {
                poll_interval_s: 0.0,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_calibrate() {
        let params = params();
        // The approach confirmation consumes the first torque reading
        let mut arm = arm(SimArm::new().push_torque(Joint::Base, &[0.0, -20.0, -80.0]));

        let calib_ref = calibrate(&mut arm, &params).unwrap();

        // The sim applies the probe target directly, so the base rests there
        assert!((calib_ref.base_angle_deg - params.probe.angle_deg).abs() < 1e-6);
        assert_eq!(arm.device_state().compliance, Some(Compliance::BASELINE));
        assert_eq!(arm.device_state().torque_lock, Some(true));

        // Capture happens with the torque lock released
        let reqs = arm.transport().requests();
        let unlock = reqs
            .iter()
            .position(|r| *r == ArmRequest::TorqueLock { enable: false })
            .unwrap();
        let relock = reqs
            .iter()
            .position(|r| *r == ArmRequest::TorqueLock { enable: true })
            .unwrap();
        assert!(unlock < relock);
        assert_eq!(reqs[unlock + 1], ArmRequest::Feedback);

        // Lift ends with the base on the reference
        let last_base = reqs
            .iter()
            .rev()
            .find_map(|r| match r {
                ArmRequest::SingleJoint {
                    joint: Joint::Base,
                    angle_deg,
                    ..
                } => Some(*angle_deg),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_base, calib_ref.base_angle_deg);
    }

    #[test]
    fn test_probe_failure() {
        let mut arm = arm(SimArm::new().fail_opcode(
            opcode::SINGLE_JOINT,
            TransportError::Unreachable("down".into()),
        ));

        let err = calibrate(&mut arm, &params()).unwrap_err();

        assert_eq!(err.step, CalibStep::Probe);
        assert!(err.snapshot().0.is_some());
        // Probe compliance is undone
        assert_eq!(arm.device_state().compliance, Some(Compliance::BASELINE));
    }

    #[test]
    fn test_probe_timeout() {
        let mut params = params();
        params.probe.timeout_s = 0.02;
        // Torque never crosses the limit
        let mut arm = arm(SimArm::new());

        let err = calibrate(&mut arm, &params).unwrap_err();

        assert_eq!(err.step, CalibStep::Probe);
        assert!(matches!(err.source, ArmError::Motion(_)));
    }
}
