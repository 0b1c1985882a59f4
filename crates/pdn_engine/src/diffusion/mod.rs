//! Diffusion pipeline: 3D cell graph, multi-commodity flow assignment and
//! the resistor-network filler.
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────┐   ┌────────┐   ┌────────┐
//! │ Substrate ├──►│ Labelling    ├──►│ MCF  ├──►│ Repair │──►│ Filler │
//! │ build     │   │ (components) │   └──────┘   └────────┘   └────────┘
//! └───────────┘
//! ```
//!
//! The substrate is a pair of flat arrays - [`cell::MetalCell`] and
//! [`cell::ViaCell`] - linked by integer indices. Stages mutate cell
//! `kind`/`signal` in place; neighbour indices never change after the
//! build.

pub mod cell;
pub mod engine;
pub mod filler;
pub mod mcf;
pub mod simulate;

pub use cell::{CellKind, CellLabel, CellRef, MetalCell, ViaCell, CELL_LABEL_EMPTY};
pub use engine::{DiffusionConfig, DiffusionEngine};
pub use filler::FillerReport;
pub use simulate::PARTICLE_SEED;
