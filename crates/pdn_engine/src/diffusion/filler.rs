//! Filler engine: resistor-network gain evaluation over per-signal
//! conductance systems, batched candidate commits.
//!
//! Each power signal owns a `SignalTree`: the virtual input node is the
//! ground reference, chiplet outputs are the first matrix rows, and every
//! cell of the signal's region is an internal node. The KSP oracle solves
//! `G V = I`; a candidate's gain is the area-normalised reduction of the
//! demand-weighted average voltage drop its edges would buy.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::signal::SignalType;
use crate::solve::{CgSolver, KspOracle, SparseSym};

use super::cell::{CellKind, CellRef};
use super::engine::DiffusionEngine;

/// Conductances per edge class, derived from the technology file when one
/// is loaded.
#[derive(Clone, Copy, Debug)]
struct EdgeConductances {
  metal: f64,
  via: f64,
  bump: f64,
  c4: f64,
}

impl EdgeConductances {
  fn from_engine(engine: &DiffusionEngine) -> Self {
    match &engine.technology {
      Some(tech) => {
        let ext = crate::spice::EqCktExtractor::new(tech);
        let inv = |r: f64| if r > 0.0 { 1.0 / r } else { 1.0 };
        Self {
          metal: inv(2.0 * ext.interposer_resistance()),
          via: inv(ext.via_resistance()),
          bump: inv(tech.microbump_resistance()),
          c4: inv(tech.c4_resistance()),
        }
      }
      None => Self {
        metal: 1.0,
        via: 1.0,
        bump: 10.0,
        c4: 10.0,
      },
    }
  }
}

/// One signal's resistor network.
struct SignalTree {
  signal: SignalType,
  chiplet_count: usize,
  demands: Vec<f64>,
  cells: Vec<CellRef>,
  cell_index: HashMap<CellRef, usize>,
  g: SparseSym,
  current: Vec<f64>,
  solution: Vec<f64>,
}

/// Voltage-drop metrics of one evaluation.
#[derive(Clone, Copy, Debug, Default)]
struct DropMetrics {
  worst: f64,
  weighted_avg: f64,
  power_loss: f64,
}

/// Summary of a filler run.
#[derive(Clone, Copy, Debug, Default)]
pub struct FillerReport {
  pub init_worst_vdrop: f64,
  pub init_weighted_avg_vdrop: f64,
  pub init_total_power_loss: f64,
  pub final_weighted_avg_vdrop: f64,
  pub cycles: usize,
  pub committed_cells: usize,
}

impl SignalTree {
  fn metrics(&self) -> DropMetrics {
    let total: f64 = self.demands.iter().sum();
    if total <= 0.0 {
      return DropMetrics::default();
    }
    let mut worst = 0.0f64;
    let mut weighted = 0.0f64;
    let mut loss = 0.0f64;
    for k in 0..self.chiplet_count {
      let demand = self.demands[k];
      let drop = (-self.solution[k]).max(0.0);
      worst = worst.max(drop);
      weighted += demand * drop;
      loss += demand * drop;
    }
    DropMetrics {
      worst,
      weighted_avg: weighted / total,
      power_loss: loss,
    }
  }
}

impl DiffusionEngine {
  /// Run the filler with the default CG backend.
  pub fn run_filler(&mut self) -> Result<FillerReport> {
    let mut solver = CgSolver::default();
    self.run_filler_with(&mut solver)
  }

  pub fn run_filler_with(&mut self, ksp: &mut dyn KspOracle) -> Result<FillerReport> {
    let conductances = EdgeConductances::from_engine(self);

    let total_empty_initial = self.count_empty_cells();
    if total_empty_initial == 0 {
      return Ok(FillerReport::default());
    }
    let max_fill = (self.config.max_filling_rate * total_empty_initial as f64).floor() as usize;
    let commit_lb =
      (self.config.iteration_commit_lb_pctg * total_empty_initial as f64).ceil() as usize;

    // baseline evaluation
    let mut report = FillerReport::default();
    {
      let mut total_current = 0.0;
      let mut weighted = 0.0;
      for sig in self.power_signals_present() {
        let Some(mut tree) = self.build_signal_tree(sig, conductances) else {
          continue;
        };
        if solve_tree(&mut tree, ksp, None).is_err() {
          warn!(signal = %sig, "baseline solve failed; filler skips this signal");
          continue;
        }
        debug!(signal = %tree.signal, nodes = tree.g.len(), "baseline evaluation");
        let m = tree.metrics();
        let current: f64 = tree.demands.iter().sum();
        report.init_worst_vdrop = report.init_worst_vdrop.max(m.worst);
        report.init_total_power_loss += m.power_loss;
        weighted += m.weighted_avg * current;
        total_current += current;
      }
      if total_current > 0.0 {
        report.init_weighted_avg_vdrop = weighted / total_current;
      }
    }
    report.final_weighted_avg_vdrop = report.init_weighted_avg_vdrop;

    let mut committed_total = 0usize;

    for cycle in 0..self.config.expected_filling_cycles {
      if committed_total >= max_fill {
        break;
      }

      // evaluate a batch of candidates across all signal trees; sampled
      // cells stage as CANDIDATE so no other tree claims them this cycle
      let mut scored: Vec<(f64, CellRef, SignalType)> = Vec::new();
      let mut staged: Vec<CellRef> = Vec::new();
      let mut evaluated = 0usize;

      for sig in self.power_signals_present() {
        if evaluated >= self.config.batch_size {
          break;
        }
        let Some(mut tree) = self.build_signal_tree(sig, conductances) else {
          continue;
        };
        if solve_tree(&mut tree, ksp, None).is_err() {
          continue;
        }
        let base = tree.metrics().weighted_avg;

        for cand in self.candidate_cells(&tree) {
          if evaluated >= self.config.batch_size {
            break;
          }
          evaluated += 1;
          self.cell_state_mut(cand).kind = CellKind::Candidate;
          staged.push(cand);
          match self.candidate_gain(&tree, cand, conductances, base, ksp) {
            Ok(gain) => scored.push((gain, cand, sig)),
            Err(EngineError::KspDiverged(_)) => continue,
            Err(e) => return Err(e),
          }
        }
      }

      let mut positives: Vec<(f64, CellRef, SignalType)> = scored
        .iter()
        .copied()
        .filter(|(gain, _, _)| *gain > 0.0)
        .collect();
      if positives.is_empty() {
        for cand in staged {
          self.cell_state_mut(cand).kind = CellKind::Empty;
        }
        debug!(cycle, "no candidate with positive gain; stopping");
        break;
      }
      positives.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

      // commit rate anneals within [min, max] with the fraction of the
      // batch that still shows positive gain: early cycles commit
      // aggressively, drying batches fall back toward the minimum
      let quality = positives.len() as f64 / scored.len().max(1) as f64;
      let rate = self.config.min_commit_rate
        + (self.config.max_commit_rate - self.config.min_commit_rate) * quality;
      let take = ((positives.len() as f64 * rate).ceil() as usize)
        .max(commit_lb)
        .min(positives.len())
        .min(max_fill - committed_total);

      let mut committed_cycle = 0usize;
      for &(_, cand, sig) in positives.iter().take(take) {
        let state = self.cell_state_mut(cand);
        if state.kind != CellKind::Candidate {
          continue;
        }
        state.kind = CellKind::Marked;
        state.signal = sig;
        committed_cycle += 1;
      }
      // whatever stayed staged reverts to assignable
      for cand in staged {
        let state = self.cell_state_mut(cand);
        if state.kind == CellKind::Candidate {
          state.kind = CellKind::Empty;
        }
      }
      committed_total += committed_cycle;
      report.cycles = cycle + 1;
      debug!(cycle, rate, committed_cycle, committed_total, "filler commit");

      if committed_cycle == 0 {
        break;
      }
    }

    // closing evaluation
    {
      let mut total_current = 0.0;
      let mut weighted = 0.0;
      for sig in self.power_signals_present() {
        let Some(mut tree) = self.build_signal_tree(sig, conductances) else {
          continue;
        };
        if solve_tree(&mut tree, ksp, None).is_err() {
          continue;
        }
        let current: f64 = tree.demands.iter().sum();
        weighted += tree.metrics().weighted_avg * current;
        total_current += current;
      }
      if total_current > 0.0 {
        report.final_weighted_avg_vdrop = weighted / total_current;
      }
    }

    report.committed_cells = committed_total;
    info!(
      cycles = report.cycles,
      committed = report.committed_cells,
      init_avg = report.init_weighted_avg_vdrop,
      final_avg = report.final_weighted_avg_vdrop,
      "filler finished"
    );
    Ok(report)
  }

  fn count_empty_cells(&self) -> usize {
    self
      .metal_grid
      .iter()
      .filter(|c| c.state.kind == CellKind::Empty)
      .count()
      + self
        .via_grid
        .iter()
        .filter(|c| c.state.kind == CellKind::Empty)
        .count()
  }

  fn power_signals_present(&self) -> Vec<SignalType> {
    let mut present = BTreeSet::new();
    for cell in &self.metal_grid {
      if cell.state.signal.is_power() && cell.state.kind != CellKind::Obstacles {
        present.insert(cell.state.signal);
      }
    }
    present.into_iter().collect()
  }

  /// Build the conductance system of one signal. `None` when the signal
  /// has no chiplet load or no cells.
  fn build_signal_tree(&self, sig: SignalType, gc: EdgeConductances) -> Option<SignalTree> {
    let chiplets: Vec<&crate::bump::ChipletInstance> = self
      .substrate
      .ubump
      .instances
      .iter()
      .filter(|inst| inst.power_signals.contains(&sig))
      .collect();

    let mut cells: Vec<CellRef> = Vec::new();
    for (i, cell) in self.metal_grid.iter().enumerate() {
      if cell.state.signal == sig && matches!(cell.state.kind, CellKind::Preplaced | CellKind::Marked)
      {
        cells.push(CellRef::Metal(i));
      }
    }
    for (v, cell) in self.via_grid.iter().enumerate() {
      if cell.state.signal == sig && matches!(cell.state.kind, CellKind::Preplaced | CellKind::Marked)
      {
        cells.push(CellRef::Via(v));
      }
    }
    if cells.is_empty() {
      return None;
    }

    // synthetic single load when no chiplet instance carries the signal,
    // drawing the signal's total pad current
    let demands: Vec<f64> = if chiplets.is_empty() {
      vec![1.0]
    } else {
      chiplets.iter().map(|c| c.max_current.max(1e-9)).collect()
    };
    let chiplet_count = demands.len();

    let n = chiplet_count + cells.len();
    let cell_index: HashMap<CellRef, usize> = cells
      .iter()
      .enumerate()
      .map(|(i, &c)| (c, chiplet_count + i))
      .collect();

    let mut g = SparseSym::new(n);

    // cell-to-cell conductances
    for (&cell, &idx) in &cell_index {
      match cell {
        CellRef::Metal(i) => {
          let mc = &self.metal_grid[i];
          for n_idx in [mc.east, mc.north].into_iter().flatten() {
            if let Some(&other) = cell_index.get(&CellRef::Metal(n_idx)) {
              g.add_conductance(idx, other, gc.metal);
            }
          }
        }
        CellRef::Via(v) => {
          for m in self.via_grid[v].all_corners() {
            if let Some(&other) = cell_index.get(&CellRef::Metal(m)) {
              g.add_conductance(idx, other, gc.via);
            }
          }
        }
      }
    }

    // chiplet outputs tap the pad cells under their footprint
    let top = self.substrate.ubump_connected_layer();
    if chiplets.is_empty() {
      // tie the synthetic load to every top-layer cell of the signal
      for (&cell, &idx) in &cell_index {
        if let CellRef::Metal(i) = cell {
          if self.metal_grid[i].layer == top {
            g.add_conductance(0, idx, gc.bump);
          }
        }
      }
    } else {
      for (k, inst) in chiplets.iter().enumerate() {
        if let Some(cords) = self.substrate.ubump.signal_cords.get(&sig) {
          for pin in cords {
            if !inst.rect.contains_point(*pin) {
              continue;
            }
            for (x, y) in crate::pdn::pad_cells(pin.x, pin.y) {
              if x < 0 || y < 0 {
                continue;
              }
              let (w, h) = (self.substrate.grid_width() as i32, self.substrate.grid_height() as i32);
              if x >= w || y >= h {
                continue;
              }
              let idx = self.metal_idx(top, y as usize, x as usize);
              if let Some(&cell) = cell_index.get(&CellRef::Metal(idx)) {
                g.add_conductance(k, cell, gc.bump);
              }
            }
          }
        }
      }
    }

    // the virtual input is the ground reference, tied through the c4 pads
    let bottom = self.substrate.c4_connected_layer();
    let mut grounded = false;
    if let Some(cords) = self.substrate.c4.signal_cords.get(&sig) {
      for pin in cords {
        for (x, y) in crate::pdn::pad_cells(pin.x, pin.y) {
          if x < 0 || y < 0 {
            continue;
          }
          let (w, h) = (self.substrate.grid_width() as i32, self.substrate.grid_height() as i32);
          if x >= w || y >= h {
            continue;
          }
          let idx = self.metal_idx(bottom, y as usize, x as usize);
          if let Some(&cell) = cell_index.get(&CellRef::Metal(idx)) {
            g.add_conductance_to_ground(cell, gc.c4);
            grounded = true;
          }
        }
      }
    }
    if !grounded {
      // no c4 pad reached the region: reference the whole bottom layer so
      // the system stays non-singular
      for (&cell, &idx) in &cell_index {
        if let CellRef::Metal(i) = cell {
          if self.metal_grid[i].layer == bottom {
            g.add_conductance_to_ground(idx, gc.c4);
            grounded = true;
          }
        }
      }
    }
    if !grounded {
      return None;
    }

    let mut current = vec![0.0; n];
    for (k, &demand) in demands.iter().enumerate() {
      current[k] = -demand;
    }

    Some(SignalTree {
      signal: sig,
      chiplet_count,
      demands,
      cells,
      cell_index,
      g,
      current,
      solution: Vec::new(),
    })
  }

  /// EMPTY cells adjacent to the tree, deterministic order.
  fn candidate_cells(&self, tree: &SignalTree) -> Vec<CellRef> {
    let mut out: BTreeSet<CellRef> = BTreeSet::new();
    for &cell in &tree.cells {
      for n in self.topo_neighbors(cell) {
        if self.cell_state(n).kind == CellKind::Empty {
          out.insert(n);
        }
      }
    }
    out.into_iter().collect()
  }

  /// Gain of one candidate: reduction in weighted-average drop per unit
  /// area when the candidate joins the tree.
  fn candidate_gain(
    &self,
    tree: &SignalTree,
    cand: CellRef,
    gc: EdgeConductances,
    base_weighted_avg: f64,
    ksp: &mut dyn KspOracle,
  ) -> Result<f64> {
    let mut extended = tree.g.expanded(1);
    let new_idx = extended.len() - 1;

    let mut connected = 0usize;
    match cand {
      CellRef::Metal(i) => {
        let mc = &self.metal_grid[i];
        for n in mc.side_neighbors().into_iter().flatten() {
          if let Some(&other) = tree.cell_index.get(&CellRef::Metal(n)) {
            extended.add_conductance(new_idx, other, gc.metal);
            connected += 1;
          }
        }
        for v in [mc.up_via, mc.down_via].into_iter().flatten() {
          if let Some(&other) = tree.cell_index.get(&CellRef::Via(v)) {
            extended.add_conductance(new_idx, other, gc.via);
            connected += 1;
          }
        }
      }
      CellRef::Via(v) => {
        for m in self.via_grid[v].all_corners() {
          if let Some(&other) = tree.cell_index.get(&CellRef::Metal(m)) {
            extended.add_conductance(new_idx, other, gc.via);
            connected += 1;
          }
        }
      }
    }
    if connected < 2 {
      // a dangling branch cannot change any drop
      return Ok(0.0);
    }

    let mut current = tree.current.clone();
    current.push(0.0);
    let mut warm = tree.solution.clone();
    warm.push(0.0);

    let solution = ksp.solve(&extended, &current, Some(&warm))?;

    let total: f64 = tree.demands.iter().sum();
    if total <= 0.0 {
      return Ok(0.0);
    }
    let weighted: f64 = tree
      .demands
      .iter()
      .enumerate()
      .map(|(k, &d)| d * (-solution[k]).max(0.0))
      .sum::<f64>()
      / total;

    Ok(base_weighted_avg - weighted)
  }
}

fn solve_tree(
  tree: &mut SignalTree,
  ksp: &mut dyn KspOracle,
  warm: Option<&[f64]>,
) -> Result<()> {
  tree.solution = ksp.solve(&tree.g, &tree.current, warm)?;
  Ok(())
}

#[cfg(test)]
#[path = "filler_test.rs"]
mod filler_test;
