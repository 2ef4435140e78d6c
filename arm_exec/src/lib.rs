//! # Arm library.
//!
//! This library allows other crates in the workspace to access items defined inside the arm
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm client - transport of requests to the arm's HTTP JSON interface
pub mod arm_client;

/// Arm control - the arm's command set with tracking of settings that can't be read back
pub mod arm_ctrl;

/// Reference calibration - captures the base reference against its hard stop
pub mod calib;

/// Motion confirmation - blocking, confirmed motions over the fire and forget interface
pub mod motion;

/// Executable parameters
pub mod params;

/// Pick sequencer - picks parts from the magazine and moves them through the workcell
pub mod pick_seq;

/// Position readings - maps raw feedback onto named joint and axis values
pub mod reading;

/// Relay client - switches the air assist relay
pub mod relay_client;

/// Simulated arm - deterministic stand-in for the arm
pub mod sim_arm;
