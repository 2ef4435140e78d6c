//! # Communications interface crate.
//!
//! Provides the wire-level interfaces shared between the workcell software and its equipment.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and response definitions for equipment (like the robot arm)
pub mod eqpt;
