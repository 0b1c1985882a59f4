//! Bump maps: chiplet ballouts, the micro-bump side and the C4 side.
//!
//! - [`ballout`]: one chiplet's pin grid parsed from CSV-style cells, with
//!   quarter-turn rotation
//! - [`micro`]: micro-bump side - ballout instances placed on the interposer
//! - [`c4`]: C4 side - a regular cluster lattice stamped from one ballout

pub mod ballout;
pub mod c4;
pub mod micro;

pub use ballout::{BallOut, Rotation};
pub use c4::{C4Bump, C4Cluster, C4Layout};
pub use micro::{ChipletInstance, MicroBump};
