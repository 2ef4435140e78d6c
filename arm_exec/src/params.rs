//! # Arm Executable Parameters
//!
//! This module provide parameters for the arm executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmExecParams {
    /// HTTP endpoint of the arm, e.g. `http://192.168.1.140`
    pub arm_endpoint: String,

    /// HTTP endpoint of the relay switching the air assist
    pub relay_endpoint: String,

    /// Relay channel of the air assist
    pub air_assist_channel: u8,

    /// Timeout of a single HTTP request.
    ///
    /// Units: seconds
    pub request_timeout_s: f64,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{arm_ctrl, pick_seq, calib};

    #[test]
    fn test_param_files_parse() {
        let exec: ArmExecParams =
            util::params::parse(include_str!("../../params/arm_exec.toml")).unwrap();
        assert!(exec.request_timeout_s > 0.0);

        let ctrl: arm_ctrl::Params =
            util::params::parse(include_str!("../../params/arm_ctrl.toml")).unwrap();
        assert_eq!(ctrl.default_pid, Default::default());

        let _: calib::Params = util::params::parse(include_str!("../../params/calib.toml")).unwrap();

        let pick: pick_seq::Params =
            util::params::parse(include_str!("../../params/pick_seq.toml")).unwrap();
        pick_seq::SlotTable::from_params(&pick.slots).unwrap();

        // Releasing the part ends with the gripper open
        for steps in [&pick.poses.finished, &pick.poses.waste] {
            assert_eq!(
                steps.last(),
                Some(&pick_seq::PoseStep::Gripper {
                    open_deg: pick.gripper_open_deg,
                    opts: None
                })
            );
        }
    }
}
