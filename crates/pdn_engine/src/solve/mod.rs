//! Optimisation oracles.
//!
//! Both solvers the pipelines lean on are black boxes behind traits: the
//! multi-commodity flow LP ([`lp::LpOracle`]) and the SPD linear-system
//! solver ([`ksp::KspOracle`]). The default backends are pure Rust; any
//! implementation honouring the interfaces may substitute.

pub mod ksp;
pub mod lp;
pub mod sparse;

pub use ksp::{CgSolver, KspOracle};
pub use lp::{LpOracle, McfArc, McfCommodity, McfProblem, ShortestPathLp};
pub use sparse::SparseSym;
