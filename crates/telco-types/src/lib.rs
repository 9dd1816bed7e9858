//! Shared type definitions for the telco tower simulation.
//!
//! Everything that crosses an entity boundary -- identifiers, positions on
//! the simulated map, and the call detail record carried through the call
//! admission protocol -- lives here so towers and callers agree on one
//! definition.
//!
//! # Modules
//!
//! - [`ids`] -- Tower and caller identifiers
//! - [`geometry`] -- Planar positions in meters
//! - [`cdr`] -- Call detail records and their lifecycle states

pub mod cdr;
pub mod geometry;
pub mod ids;

pub use cdr::{Cdr, CdrState};
pub use geometry::{InvalidPositionError, Position};
pub use ids::{CallerId, ParseTowerIdError, TowerId};
