//! Diffusion cells: the shared state component plus the metal and via
//! variants.
//!
//! All linkage is by index into the engine's flat grids; `Option<usize>`
//! slots mark absent links. The per-label particle ledger is a parallel
//! pair of small vectors with linear lookup, which is adequate for the
//! handful of labels a cell ever sees.

use smallvec::SmallVec;

use crate::signal::SignalType;

/// Identifier of a connected same-signal component; 0 is reserved for
/// "no component".
pub type CellLabel = u16;
pub const CELL_LABEL_EMPTY: CellLabel = 0;

/// Occupancy class of a cell. `Empty` competes, `Marked` is soft-assigned,
/// `Preplaced` is fixed input, `Obstacles` never participates and
/// `Candidate` is a filler-cycle staging state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellKind {
  #[default]
  Empty,
  Obstacles,
  Preplaced,
  Marked,
  Candidate,
}

/// Reference to a cell in either grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellRef {
  Metal(usize),
  Via(usize),
}

/// State shared by both cell variants.
#[derive(Clone, Debug, Default)]
pub struct CellState {
  pub kind: CellKind,
  pub signal: SignalType,
  labels: SmallVec<[CellLabel; 4]>,
  particles: SmallVec<[i32; 4]>,
  labels_cache: SmallVec<[CellLabel; 4]>,
  particles_cache: SmallVec<[i32; 4]>,
}

impl CellState {
  /// Particle count for `label`; `None` when the label never touched this
  /// cell.
  pub fn particles(&self, label: CellLabel) -> Option<i32> {
    self
      .labels
      .iter()
      .position(|&l| l == label)
      .map(|i| self.particles[i])
  }

  /// Stage particles for `label` without touching the committed counts.
  pub fn add_particles_to_cache(&mut self, label: CellLabel, count: i32) {
    match self.labels_cache.iter().position(|&l| l == label) {
      Some(i) => self.particles_cache[i] += count,
      None => {
        self.labels_cache.push(label);
        self.particles_cache.push(count);
      }
    }
  }

  /// Fold the staged counts into the committed ledger and clear the stage.
  pub fn commit_cache(&mut self) {
    for (&label, &count) in self.labels_cache.iter().zip(&self.particles_cache) {
      match self.labels.iter().position(|&l| l == label) {
        Some(i) => self.particles[i] += count,
        None => {
          self.labels.push(label);
          self.particles.push(count);
        }
      }
    }
    self.flush_cache();
  }

  /// Drop staged counts.
  pub fn flush_cache(&mut self) {
    self.labels_cache.clear();
    self.particles_cache.clear();
  }

  pub fn committed_labels(&self) -> impl Iterator<Item = (CellLabel, i32)> + '_ {
    self.labels.iter().copied().zip(self.particles.iter().copied())
  }

  pub fn clear_particles(&mut self) {
    self.labels.clear();
    self.particles.clear();
    self.flush_cache();
  }
}

/// One metal-layer grid cell.
#[derive(Clone, Debug, Default)]
pub struct MetalCell {
  pub layer: usize,
  pub x: usize,
  pub y: usize,
  pub state: CellState,

  // topological neighbours, fixed after the build
  pub north: Option<usize>,
  pub south: Option<usize>,
  pub east: Option<usize>,
  pub west: Option<usize>,
  pub up_via: Option<usize>,
  pub down_via: Option<usize>,

  // filtered adjacency, rebuilt by link_neighbors
  pub metal_neighbors: SmallVec<[usize; 4]>,
  pub via_neighbors: SmallVec<[usize; 2]>,
}

impl MetalCell {
  pub fn side_neighbors(&self) -> [Option<usize>; 4] {
    [self.north, self.south, self.east, self.west]
  }
}

/// One via site between two metal layers. Corner order within each group
/// is LL, LR, UL, UR.
#[derive(Clone, Debug, Default)]
pub struct ViaCell {
  pub layer: usize,
  pub x: usize,
  pub y: usize,
  pub state: CellState,

  pub up_corners: [Option<usize>; 4],
  pub down_corners: [Option<usize>; 4],

  pub neighbors: SmallVec<[usize; 8]>,
}

impl ViaCell {
  pub fn all_corners(&self) -> impl Iterator<Item = usize> + '_ {
    self
      .up_corners
      .iter()
      .chain(self.down_corners.iter())
      .filter_map(|c| *c)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_particle_cache_commit() {
    let mut state = CellState::default();
    assert_eq!(state.particles(3), None);

    state.add_particles_to_cache(3, 5);
    assert_eq!(state.particles(3), None); // staged only

    state.commit_cache();
    assert_eq!(state.particles(3), Some(5));

    state.add_particles_to_cache(3, -2);
    state.add_particles_to_cache(7, 1);
    state.commit_cache();
    assert_eq!(state.particles(3), Some(3));
    assert_eq!(state.particles(7), Some(1));
  }

  #[test]
  fn test_particle_cache_flush() {
    let mut state = CellState::default();
    state.add_particles_to_cache(1, 4);
    state.flush_cache();
    state.commit_cache();
    assert_eq!(state.particles(1), None);
  }
}
