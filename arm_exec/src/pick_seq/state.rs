//! Implementations for the PickSeq state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use comms_if::eqpt::arm::Joint;
use log::{error, info};
use util::time::seconds_to_duration;

// Internal
use super::{Params, PickError, PickStep, PoseStep, Routine, Slot, SlotTable, SlotTableError};
use crate::{
    arm_client::ArmTransport,
    arm_ctrl::{ArmCtrl, ArmError},
    calib::{self, CalibRef, CalibrationFailed},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pick sequencer state
pub struct PickSeq<T: ArmTransport> {
    arm: ArmCtrl<T>,

    params: Params,

    calib_params: calib::Params,

    table: SlotTable,

    /// Reference of this session, `None` until calibrated.
    calib_ref: Option<CalibRef>,
}

/// Failure of a single step, before the routine is known.
struct StepFailed {
    step: PickStep,
    source: ArmError,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: ArmTransport> PickSeq<T> {
    /// Create a new sequencer, validating the slot table. No request is sent to the arm.
    pub fn new(
        arm: ArmCtrl<T>,
        params: Params,
        calib_params: calib::Params,
    ) -> Result<Self, SlotTableError> {
        let table = SlotTable::from_params(&params.slots)?;

        Ok(Self {
            arm,
            params,
            calib_params,
            table,
            calib_ref: None,
        })
    }

    pub fn arm(&self) -> &ArmCtrl<T> {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut ArmCtrl<T> {
        &mut self.arm
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub fn calib_ref(&self) -> Option<&CalibRef> {
        self.calib_ref.as_ref()
    }

    /// Install a reference captured earlier in this session.
    pub fn install_reference(&mut self, calib_ref: CalibRef) {
        self.calib_ref = Some(calib_ref);
    }

    /// Run the calibration procedure and install the captured reference.
    ///
    /// Any previous reference is discarded first, so after a failure picking is refused until
    /// calibration succeeds.
    pub fn calibrate_reference_position(&mut self) -> Result<CalibRef, CalibrationFailed> {
        self.calib_ref = None;

        let calib_ref = calib::calibrate(&mut self.arm, &self.calib_params)?;
        self.calib_ref = Some(calib_ref);

        Ok(calib_ref)
    }

    /// Pick the part in the slot at `index`.
    ///
    /// An unavailable slot returns [`PickError::SlotSkipped`] without any request being sent to
    /// the arm. The arm's baseline settings are restored before returning.
    pub fn pick(&mut self, index: usize) -> Result<(), PickError> {
        let slot = match self.table.get(index) {
            Ok(s) => s,
            Err(e) => {
                info!("Not picking slot {}: {}", index, e);
                return Err(e);
            }
        };

        let base_deg = match self.calib_ref {
            Some(r) => r.base_angle_deg + slot.offset_deg,
            None => return Err(PickError::NotCalibrated),
        };

        info!("Picking slot {} at base angle {:.2} deg", index, base_deg);

        let params = &self.params;
        let result = self
            .arm
            .with_baseline_restore(|arm| pick_steps(arm, params, slot, base_deg));

        match result {
            Ok(()) => {
                info!("Picked slot {}", index);
                Ok(())
            }
            Err(e) => Err(failed(Routine::Pick, e)),
        }
    }

    pub fn move_to_optical_inspection(&mut self) -> Result<(), PickError> {
        run_pose(
            &mut self.arm,
            Routine::OpticalInspection,
            &self.params.poses.optical_inspection,
        )
    }

    pub fn lift_from_optical_inspection(&mut self) -> Result<(), PickError> {
        run_pose(
            &mut self.arm,
            Routine::LiftFromOpticalInspection,
            &self.params.poses.lift_from_optical_inspection,
        )
    }

    pub fn move_to_burn_position(&mut self) -> Result<(), PickError> {
        run_pose(&mut self.arm, Routine::Burn, &self.params.poses.burn)
    }

    /// Turn the part over for the second side burn, ending back in the burn position.
    pub fn flip_upside_down(&mut self) -> Result<(), PickError> {
        run_pose(&mut self.arm, Routine::Flip, &self.params.poses.flip)
    }

    /// Move to the finished position and release the part.
    pub fn move_to_finished_position(&mut self) -> Result<(), PickError> {
        run_pose(&mut self.arm, Routine::Finished, &self.params.poses.finished)
    }

    /// Move to the waste position and release the part.
    pub fn move_to_waste_position(&mut self) -> Result<(), PickError> {
        run_pose(&mut self.arm, Routine::Waste, &self.params.poses.waste)
    }
}

impl PoseStep {
    /// Execute this step on the arm.
    pub fn run<T: ArmTransport>(&self, arm: &mut ArmCtrl<T>) -> Result<(), ArmError> {
        match *self {
            PoseStep::Joint {
                joint,
                angle_deg,
                opts,
            } => arm.move_single_joint(joint, angle_deg, opts).map(drop),
            PoseStep::Joints {
                base_deg,
                shoulder_deg,
                elbow_deg,
                tool_deg,
                opts,
            } => arm
                .move_all_joints(base_deg, shoulder_deg, elbow_deg, tool_deg, opts)
                .map(drop),
            PoseStep::Cartesian(pose) => arm.execute(&pose.to_cmd()).map(drop),
            PoseStep::Gripper {
                open_deg,
                opts: Some(opts),
            } => arm.set_gripper(open_deg, opts).map(drop),
            PoseStep::Gripper {
                open_deg,
                opts: None,
            } => arm.set_gripper_default(open_deg).map(drop),
            PoseStep::Wait { seconds } => {
                std::thread::sleep(seconds_to_duration(seconds));
                Ok(())
            }
        }
    }
}

/// Errors from restoring the baseline settings at the end of a routine.
impl From<ArmError> for StepFailed {
    fn from(source: ArmError) -> Self {
        Self {
            step: PickStep::Restore,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn pick_steps<T: ArmTransport>(
    arm: &mut ArmCtrl<T>,
    p: &Params,
    slot: Slot,
    base_deg: f64,
) -> Result<(), StepFailed> {
    arm.set_gripper_default(p.gripper_open_deg)
        .map_err(at(PickStep::OpenGripper))?;

    // Prepare above the slot, approaching the base from the bias side
    let approach_deg = base_deg + p.base_bias_deg;
    arm.move_single_joint(Joint::Elbow, p.prepare_elbow_deg, p.prepare_move)
        .map_err(at(PickStep::Prepare))?;
    arm.move_single_joint(Joint::Shoulder, p.prepare_shoulder_deg, p.prepare_move)
        .map_err(at(PickStep::Prepare))?;
    arm.set_joint_pid(Joint::Base, p.base_pid)
        .map_err(at(PickStep::Prepare))?;
    arm.move_single_joint(Joint::Base, approach_deg, p.base_move)
        .map_err(at(PickStep::Prepare))?;

    // Lower onto the part
    arm.move_single_joint(Joint::Base, approach_deg, p.lower_move)
        .map_err(at(PickStep::Lower))?;
    arm.move_single_joint(Joint::Elbow, slot.elbow_deg, p.lower_move)
        .map_err(at(PickStep::Lower))?;
    arm.set_dynamic_force_adaption(p.lower_compliance)
        .map_err(at(PickStep::Lower))?;
    arm.move_single_joint(Joint::Shoulder, p.lower_shoulder_deg, p.lower_move)
        .map_err(at(PickStep::Lower))?;

    arm.move_single_joint(Joint::Base, approach_deg + p.base_recenter_deg, p.base_move)
        .map_err(at(PickStep::Recenter))?;

    arm.set_dynamic_force_adaption(p.grip_compliance)
        .map_err(at(PickStep::Grip))?;
    arm.set_gripper(p.gripper_closed_deg, p.grip_move)
        .map_err(at(PickStep::Grip))?;

    // Let the arm settle onto the grip
    arm.set_torque_lock(false).map_err(at(PickStep::Settle))?;
    std::thread::sleep(seconds_to_duration(p.settle_s));
    arm.restore_baseline().map_err(at(PickStep::Settle))?;

    Ok(())
}

fn run_pose<T: ArmTransport>(
    arm: &mut ArmCtrl<T>,
    routine: Routine,
    steps: &[PoseStep],
) -> Result<(), PickError> {
    info!("{}", routine);

    for (i, step) in steps.iter().enumerate() {
        if let Err(source) = step.run(arm) {
            return Err(failed(
                routine,
                StepFailed {
                    step: PickStep::Pose(i),
                    source,
                },
            ));
        }
    }

    Ok(())
}

fn failed(routine: Routine, e: StepFailed) -> PickError {
    let err = PickError::Failed {
        routine,
        step: e.step,
        source: e.source,
    };
    error!("{}", err);
    err
}

fn at(step: PickStep) -> impl FnOnce(ArmError) -> StepFailed {
    move |source| StepFailed { step, source }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        arm_client::TransportError, arm_ctrl, motion::joint_to_device, reading::Snapshot,
        pick_seq::SlotParams, sim_arm::SimArm,
    };
    use comms_if::eqpt::arm::{opcode, ArmRequest, Compliance, PidGains};

    fn params() -> Params {
        let mut p: Params =
            util::params::parse(include_str!("../../../params/pick_seq.toml")).unwrap();
        p.settle_s = 0.0;
        p
    }

    fn calib_params() -> calib::Params {
        let mut p: calib::Params =
            util::params::parse(include_str!("../../../params/calib.toml")).unwrap();
        p.settle_s = 0.0;
        p
    }

    fn seq_with(sim: SimArm, params: Params) -> PickSeq<SimArm> {
        let arm = ArmCtrl::new(
            sim,
            arm_ctrl::Params {
                poll_interval_s: 0.0,
                ..Default::default()
            },
        );
        PickSeq::new(arm, params, calib_params()).unwrap()
    }

    /// Sequencer over the slot table `[0.0, None, 13.8]`, calibrated at 100 deg.
    fn scenario(sim: SimArm) -> PickSeq<SimArm> {
        let mut params = params();
        params.slots = vec![
            SlotParams {
                offset_deg: Some(0.0),
                elbow_deg: 120.0,
            },
            SlotParams {
                offset_deg: None,
                elbow_deg: 120.0,
            },
            SlotParams {
                offset_deg: Some(13.8),
                elbow_deg: 122.0,
            },
        ];

        let mut seq = seq_with(sim, params);
        let reading = seq.arm().transport().reading();
        seq.install_reference(CalibRef {
            base_angle_deg: 100.0,
            reading,
        });
        seq
    }

    fn position_of(reqs: &[ArmRequest], f: impl Fn(&ArmRequest) -> bool) -> usize {
        reqs.iter().position(f).unwrap()
    }

    #[test]
    fn test_skipped_slot_sends_nothing() {
        let mut seq = scenario(SimArm::new());

        let err = seq.pick(1).unwrap_err();

        assert!(err.is_skip());
        assert!(seq.arm().transport().requests().is_empty());
    }

    #[test]
    fn test_invalid_slot() {
        let mut seq = scenario(SimArm::new());

        assert!(matches!(
            seq.pick(7),
            Err(PickError::InvalidSlot { index: 7, len: 3 })
        ));
        assert!(seq.arm().transport().requests().is_empty());
    }

    #[test]
    fn test_pick_prepares_base_before_grip() {
        let mut seq = scenario(SimArm::new());
        let p = params();

        seq.pick(0).unwrap();

        let reqs = seq.arm().transport().requests();
        let target = 100.0 + p.base_bias_deg;
        let base_move = position_of(reqs, |r| {
            matches!(r, ArmRequest::SingleJoint { joint: Joint::Base, angle_deg, .. } if *angle_deg == target)
        });
        let close = joint_to_device(Joint::Tool, p.gripper_closed_deg);
        let grip = position_of(reqs, |r| {
            matches!(r, ArmRequest::SingleJoint { joint: Joint::Tool, angle_deg, .. } if *angle_deg == close)
        });

        assert!(base_move < grip);
        // The base move was confirmed before anything else was sent
        assert_eq!(reqs[base_move + 1], ArmRequest::Feedback);

        // Tight PID on the base for the approach
        let pid = position_of(reqs, |r| {
            matches!(r, ArmRequest::SetJointPid { joint: Joint::Base, .. })
        });
        assert!(pid < base_move);

        // Re-centred after lowering
        let recentre = target + p.base_recenter_deg;
        let recentre_move = position_of(reqs, |r| {
            matches!(r, ArmRequest::SingleJoint { joint: Joint::Base, angle_deg, .. } if *angle_deg == recentre)
        });
        assert!(base_move < recentre_move && recentre_move < grip);
    }

    #[test]
    fn test_pick_offsets_from_reference() {
        let mut seq = scenario(SimArm::new());
        let p = params();

        seq.pick(2).unwrap();

        let target = 100.0 + 13.8 + p.base_bias_deg;
        assert!(seq.arm().transport().requests().iter().any(|r| matches!(
            r,
            ArmRequest::SingleJoint { joint: Joint::Base, angle_deg, .. } if *angle_deg == target
        )));
    }

    #[test]
    fn test_baseline_after_success() {
        let mut seq = scenario(SimArm::new());

        seq.pick(0).unwrap();

        let state = seq.arm().device_state();
        assert_eq!(state.compliance, Some(Compliance::BASELINE));
        assert_eq!(state.torque_lock, Some(true));
        assert_eq!(state.pid.get(&Joint::Base), Some(&PidGains::default()));
        assert_eq!(seq.arm().transport().compliance(), Some(Compliance::BASELINE));
    }

    #[test]
    fn test_baseline_after_timeout() {
        // Gripper, elbow, shoulder, base, base, elbow, then the shoulder lowering never moves
        let mut params = params();
        params.lower_move.timeout_s = 0.05;
        let mut seq = scenario(SimArm::new().freeze_motion_after(6));
        seq.params = params;

        let err = seq.pick(0).unwrap_err();

        match &err {
            PickError::Failed { routine, step, .. } => {
                assert_eq!(*routine, Routine::Pick);
                assert_eq!(*step, PickStep::Lower);
            }
            e => panic!("Unexpected error {}", e),
        }
        assert!(matches!(err.snapshot(), Some(Snapshot(Some(_)))));

        // Lowering compliance was applied, then restored
        let lower = seq.params.lower_compliance;
        assert!(seq
            .arm()
            .transport()
            .requests()
            .contains(&ArmRequest::DynamicForceAdaption(lower)));
        assert_eq!(seq.arm().device_state().compliance, Some(Compliance::BASELINE));
        assert_eq!(seq.arm().transport().compliance(), Some(Compliance::BASELINE));
    }

    #[test]
    fn test_failed_calibration_refuses_pick() {
        let mut seq = scenario(
            SimArm::new()
                .fail_opcode(opcode::SINGLE_JOINT, TransportError::Unreachable("down".into())),
        );
        assert!(seq.calib_ref().is_some());

        let err = seq.calibrate_reference_position().unwrap_err();
        assert_eq!(err.step, calib::CalibStep::Probe);
        assert!(seq.calib_ref().is_none());

        seq.arm_mut().transport_mut().clear_requests();
        assert!(matches!(seq.pick(0), Err(PickError::NotCalibrated)));
        assert!(seq.arm().transport().requests().is_empty());
    }

    #[test]
    fn test_calibrate_then_pick() {
        let mut seq = seq_with(
            SimArm::new().push_torque(Joint::Base, &[0.0, -80.0]),
            params(),
        );
        assert!(matches!(seq.pick(0), Err(PickError::NotCalibrated)));

        let calib_ref = seq.calibrate_reference_position().unwrap();
        assert_eq!(seq.calib_ref(), Some(&calib_ref));

        seq.pick(0).unwrap();
    }

    #[test]
    fn test_pose_transitions() {
        let mut seq = scenario(SimArm::new());

        seq.move_to_optical_inspection().unwrap();
        seq.lift_from_optical_inspection().unwrap();
        seq.move_to_burn_position().unwrap();
        seq.flip_upside_down().unwrap();
        seq.move_to_finished_position().unwrap();

        // Finished ends by releasing the part
        let p = params();
        let open = joint_to_device(Joint::Tool, p.gripper_open_deg);
        assert!(matches!(
            seq.arm().transport().requests().iter().rev().find(|r| r.is_motion()),
            Some(ArmRequest::SingleJoint { joint: Joint::Tool, angle_deg, .. }) if *angle_deg == open
        ));

        // Repeating a transition repeats the same motions
        seq.arm_mut().transport_mut().clear_requests();
        seq.move_to_waste_position().unwrap();
        let first: Vec<ArmRequest> = seq.arm().transport().requests().to_vec();
        seq.arm_mut().transport_mut().clear_requests();
        seq.move_to_waste_position().unwrap();
        assert_eq!(seq.arm().transport().requests(), first.as_slice());
    }

    #[test]
    fn test_pose_failure_reports_step() {
        let mut seq = scenario(
            SimArm::new().fail_opcode(opcode::ALL_JOINTS, TransportError::BadResponse("x".into())),
        );

        match seq.move_to_burn_position() {
            Err(PickError::Failed {
                routine: Routine::Burn,
                step: PickStep::Pose(_),
                ..
            }) => (),
            r => panic!("Unexpected result {:?}", r),
        }
    }

    #[test]
    fn test_flip_ends_in_burn_position() {
        let mut seq = scenario(SimArm::new());

        seq.move_to_burn_position().unwrap();
        let burn = seq.arm().transport().reading();

        seq.flip_upside_down().unwrap();
        let flipped = seq.arm().transport().reading();
        assert_eq!(flipped.pos_mm, burn.pos_mm);

        // Flipping again repeats the same motions
        seq.arm_mut().transport_mut().clear_requests();
        seq.flip_upside_down().unwrap();
        assert_eq!(seq.arm().transport().count(opcode::ALL_JOINTS), 1);
        assert_eq!(seq.arm().transport().count(opcode::MOVE_XYZT), 1);
    }
}
