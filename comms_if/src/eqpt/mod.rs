//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the workcell equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod arm;
