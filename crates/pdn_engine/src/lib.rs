//! pdn_engine - Multi-layer power distribution network synthesis
//!
//! This crate synthesises power delivery planes for 2.5D/3D interposers.
//! Given a stack of metal layers connected by vias, micro-bump pads on top
//! and C4 pads underneath, it decides which power net occupies every grid
//! cell of every layer so that each net forms one connected, hole-free
//! region per layer.
//!
//! Two alternative pipelines realise the same contract:
//!
//! - **Voronoi**: route pin-to-pin trees per net, grow Voronoi regions
//!   around the routes, rasterise them onto the grid and legalise the
//!   result (fragment pruning, floating-region reconnection, cross-layer
//!   trading).
//! - **Diffusion**: build a 3D cell graph from the preplaced canvases,
//!   assign components with a multi-commodity flow, repair local
//!   disconnects, then fill the remaining empty cells by a resistor-network
//!   gain heuristic.
//!
//! # Example
//!
//! ```ignore
//! use pdn_engine::voronoi::VoronoiPdnGen;
//!
//! let mut gen = VoronoiPdnGen::from_pinout_file("inputs/design.pinout")?;
//! gen.mark_preplaced_and_insert_pads();
//! gen.run_pipeline()?;
//! assert!(gen.substrate().check_one_piece(0));
//! ```

pub mod error;
pub mod geometry;
pub mod signal;
pub mod tech;

pub mod bump;
pub mod canvas;
pub mod pdn;

pub mod voronoi;

pub mod diffusion;
pub mod solve;

pub mod spice;
pub mod viz;

// Re-export commonly used items
pub use error::EngineError;
pub use geometry::{OrderedSegment, Point, PolygonSet, Rect};
pub use signal::{SignalType, POWER_SIGNAL_SET};
pub use tech::Technology;

pub use pdn::PdnSubstrate;
