//! Particle diffusion over the cell graph.
//!
//! Every labelled component seeds its cells with particles of its own
//! label; repeated diffusion steps bleed a fraction of each cell's
//! particles into its EMPTY neighbours. The resulting per-label pressure
//! field estimates how much free space each component can reach and feeds
//! the pressure visualiser. Transfers are staged in the per-cell cache and
//! folded in one commit, so a step observes a consistent snapshot.

use tracing::debug;

use super::cell::{CellKind, CellLabel, CellRef, CELL_LABEL_EMPTY};
use super::engine::DiffusionEngine;

/// Particles seeded into every cell of a labelled component.
pub const PARTICLE_SEED: i32 = 1024;

impl DiffusionEngine {
  /// Reset all particle ledgers and seed each labelled cell with a full
  /// charge of its own label.
  pub fn place_diffusion_particles(&mut self) {
    for i in 0..self.metal_grid.len() {
      let label = self.metal_labels[i];
      let state = &mut self.metal_grid[i].state;
      state.clear_particles();
      if label != CELL_LABEL_EMPTY {
        state.add_particles_to_cache(label, PARTICLE_SEED);
        state.commit_cache();
      }
    }
    for v in 0..self.via_grid.len() {
      let label = self.via_labels[v];
      let state = &mut self.via_grid[v].state;
      state.clear_particles();
      if label != CELL_LABEL_EMPTY {
        state.add_particles_to_cache(label, PARTICLE_SEED);
        state.commit_cache();
      }
    }
  }

  /// One diffusion step: every cell pushes `rate` of each label's count,
  /// split evenly, into its EMPTY neighbours. The step only stages; call
  /// [`DiffusionEngine::commit_particles`] to apply it.
  pub fn diffuse(&mut self, rate: f64) {
    let metal_count = self.metal_grid.len();

    for i in 0..metal_count + self.via_grid.len() {
      let at = if i < metal_count {
        CellRef::Metal(i)
      } else {
        CellRef::Via(i - metal_count)
      };

      // EMPTY targets only; occupied cells are walls for particles
      let targets: Vec<CellRef> = match at {
        CellRef::Metal(m) => {
          let cell = &self.metal_grid[m];
          cell
            .metal_neighbors
            .iter()
            .map(|&n| CellRef::Metal(n))
            .chain(cell.via_neighbors.iter().map(|&v| CellRef::Via(v)))
            .collect()
        }
        CellRef::Via(v) => self.via_grid[v]
          .neighbors
          .iter()
          .map(|&m| CellRef::Metal(m))
          .collect(),
      };
      if targets.is_empty() {
        continue;
      }

      let moves: Vec<(CellLabel, i32)> = self
        .cell_state(at)
        .committed_labels()
        .filter_map(|(label, count)| {
          let moved = (count as f64 * rate) as i32;
          let per = moved / targets.len() as i32;
          (per > 0).then_some((label, per))
        })
        .collect();

      for (label, per) in moves {
        self
          .cell_state_mut(at)
          .add_particles_to_cache(label, -per * targets.len() as i32);
        for &t in &targets {
          self.cell_state_mut(t).add_particles_to_cache(label, per);
        }
      }
    }
  }

  /// Fold all staged transfers into the committed ledgers.
  pub fn commit_particles(&mut self) {
    for cell in &mut self.metal_grid {
      cell.state.commit_cache();
    }
    for cell in &mut self.via_grid {
      cell.state.commit_cache();
    }
  }

  /// Seed and run `iterations` diffusion steps.
  pub fn run_diffusion(&mut self, rate: f64, iterations: usize) {
    self.place_diffusion_particles();
    for step in 0..iterations {
      self.diffuse(rate);
      self.commit_particles();
      debug!(step, rate, "diffusion step committed");
    }
  }

  /// The label with the highest particle count on a cell, with its count.
  pub fn dominant_pressure(&self, at: CellRef) -> Option<(CellLabel, i32)> {
    self
      .cell_state(at)
      .committed_labels()
      .filter(|&(_, count)| count > 0)
      .max_by_key(|&(label, count)| (count, std::cmp::Reverse(label)))
  }

  /// Total committed particles per label, summed over the whole grid.
  /// Diffusion conserves these totals exactly.
  pub fn particle_totals(&self) -> std::collections::HashMap<CellLabel, i64> {
    let mut totals = std::collections::HashMap::new();
    let mut absorb = |state: &super::cell::CellState| {
      for (label, count) in state.committed_labels() {
        *totals.entry(label).or_insert(0) += count as i64;
      }
    };
    for cell in &self.metal_grid {
      absorb(&cell.state);
    }
    for cell in &self.via_grid {
      absorb(&cell.state);
    }
    totals
  }

  /// True when the cell can still receive particles.
  pub fn is_open_chamber(&self, at: CellRef) -> bool {
    self.cell_state(at).kind == CellKind::Empty
  }
}

#[cfg(test)]
#[path = "simulate_test.rs"]
mod simulate_test;
