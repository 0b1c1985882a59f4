//! Diffusion engine: substrate construction, enclosed-region fill,
//! half-occupied promotion, adjacency linking and component labelling.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use tracing::{debug, info};

use crate::canvas::Canvas;
use crate::error::{EngineError, Result};
use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

use super::cell::{CellKind, CellLabel, CellRef, MetalCell, ViaCell, CELL_LABEL_EMPTY};

/// MCF and filler hyperparameters. Defaults match the reference tuning;
/// a configuration file of `key = value` lines overrides individual
/// entries.
#[derive(Clone, Debug)]
pub struct DiffusionConfig {
  pub normal_metal_edge_lb: f64,
  pub normal_metal_edge_ub: f64,
  pub normal_metal_edge_weight: f64,

  pub aggr_metal_edge_lb: f64,
  pub aggr_metal_edge_ub: f64,
  pub aggr_metal_edge_weight: f64,
  pub must_route_aggr_me_ub_pctg: f64,
  pub must_route_total_budget_pctg: f64,
  pub must_route_budget_min: f64,

  pub via_edge_lb: f64,
  pub via_edge_ub: f64,
  pub sub_via_edge_ub_divisor: f64,
  pub via_edge_weight: f64,

  pub via_budget_avg_quota: f64,
  pub via_budget_current_quota: f64,
  pub min_chiplet_budget_avg_pctg: f64,

  pub batch_size: usize,
  pub iteration_commit_lb_pctg: f64,
  pub min_commit_rate: f64,
  pub max_commit_rate: f64,
  pub expected_filling_cycles: usize,
  pub max_filling_rate: f64,
}

impl Default for DiffusionConfig {
  fn default() -> Self {
    Self {
      normal_metal_edge_lb: 0.0,
      normal_metal_edge_ub: 1.0,
      normal_metal_edge_weight: 1.0,

      aggr_metal_edge_lb: 0.0,
      aggr_metal_edge_ub: 2.0,
      aggr_metal_edge_weight: 0.0,
      must_route_aggr_me_ub_pctg: 0.5,
      must_route_total_budget_pctg: 0.05,
      must_route_budget_min: 0.4,

      via_edge_lb: 0.0,
      via_edge_ub: 1.75,
      sub_via_edge_ub_divisor: 2.5,
      via_edge_weight: 0.1,

      via_budget_avg_quota: 0.2,
      via_budget_current_quota: 0.7,
      min_chiplet_budget_avg_pctg: 0.75,

      batch_size: 4096,
      iteration_commit_lb_pctg: 0.0075,
      min_commit_rate: 0.375,
      max_commit_rate: 0.75,
      expected_filling_cycles: 15,
      max_filling_rate: 0.85,
    }
  }
}

impl DiffusionConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    let mut cfg = Self::default();
    for raw in text.lines() {
      let line = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
      };
      let tokens: Vec<&str> = line.split_whitespace().collect();
      if tokens.is_empty() {
        continue;
      }
      if tokens.len() < 3 || tokens[1] != "=" {
        return Err(EngineError::input_format(path, format!("bad config line: {raw}")));
      }
      let v: f64 = tokens[2]
        .parse()
        .map_err(|_| EngineError::input_format(path, format!("bad config value: {raw}")))?;
      match tokens[0] {
        "normalMetalEdgeLB" => cfg.normal_metal_edge_lb = v,
        "normalMetalEdgeUB" => cfg.normal_metal_edge_ub = v,
        "normalMetalEdgeWeight" => cfg.normal_metal_edge_weight = v,
        "aggrMetalEdgeLB" => cfg.aggr_metal_edge_lb = v,
        "aggrMetalEdgeUB" => cfg.aggr_metal_edge_ub = v,
        "aggrMetalEdgeWeight" => cfg.aggr_metal_edge_weight = v,
        "mustRouteAggrMEUBPctg" => cfg.must_route_aggr_me_ub_pctg = v,
        "mustRouteTotalBudgetPctg" => cfg.must_route_total_budget_pctg = v,
        "mustRouteBudgetMin" => cfg.must_route_budget_min = v,
        "ViaEdgeLB" => cfg.via_edge_lb = v,
        "ViaEdgeUB" => cfg.via_edge_ub = v,
        "subViaEdgeUBDivisor" => cfg.sub_via_edge_ub_divisor = v,
        "viaEdgeWeight" => cfg.via_edge_weight = v,
        "ViaBudgetAvgQuota" => cfg.via_budget_avg_quota = v,
        "viaBudgetCurrentQuota" => cfg.via_budget_current_quota = v,
        "minChipletBudgetAvgPctg" => cfg.min_chiplet_budget_avg_pctg = v,
        "batchSize" => cfg.batch_size = v as usize,
        "iterationCommitLBPctg" => cfg.iteration_commit_lb_pctg = v,
        "minCommitRate" => cfg.min_commit_rate = v,
        "maxCommitRate" => cfg.max_commit_rate = v,
        "expectedFillingCycles" => cfg.expected_filling_cycles = v as usize,
        "maxFillingRate" => cfg.max_filling_rate = v,
        other => {
          return Err(EngineError::input_format(path, format!("unknown config key {other}")));
        }
      }
    }
    Ok(cfg)
  }
}

/// The diffusion-side engine. Owns the substrate, the flat cell grids and
/// the component labelling.
pub struct DiffusionEngine {
  pub substrate: PdnSubstrate,
  pub config: DiffusionConfig,
  /// Technology parameters; without them the filler falls back to unit
  /// conductances.
  pub technology: Option<crate::tech::Technology>,

  layers: usize,
  width: usize,
  height: usize,
  grid_2d: usize,

  pub metal_grid: Vec<MetalCell>,
  pub via_grid: Vec<ViaCell>,
  pub metal_labels: Vec<CellLabel>,
  pub via_labels: Vec<CellLabel>,

  /// `label_signals[label]` is the signal of that component; entry 0 is
  /// the reserved empty label.
  pub label_signals: Vec<SignalType>,
  pub signal_labels: HashMap<SignalType, Vec<CellLabel>>,

  /// Index of the first via of each via layer in `via_grid`, plus the
  /// total as a final entry.
  pub via_layer_offsets: Vec<usize>,
}

impl DiffusionEngine {
  pub fn new(substrate: PdnSubstrate, config: DiffusionConfig) -> Self {
    let layers = substrate.metal_layer_count();
    let width = substrate.grid_width();
    let height = substrate.grid_height();
    Self {
      substrate,
      config,
      technology: None,
      layers,
      width,
      height,
      grid_2d: width * height,
      metal_grid: Vec::new(),
      via_grid: Vec::new(),
      metal_labels: Vec::new(),
      via_labels: Vec::new(),
      label_signals: Vec::new(),
      signal_labels: HashMap::new(),
      via_layer_offsets: Vec::new(),
    }
  }

  pub fn from_files(pinout: impl AsRef<Path>, config: Option<&Path>) -> Result<Self> {
    let substrate = PdnSubstrate::from_pinout_file(pinout)?;
    let config = match config {
      Some(path) => DiffusionConfig::from_file(path)?,
      None => DiffusionConfig::default(),
    };
    Ok(Self::new(substrate, config))
  }

  #[inline]
  pub fn metal_idx(&self, layer: usize, y: usize, x: usize) -> usize {
    layer * self.grid_2d + y * self.width + x
  }

  /// `(layer, x, y)` of a metal index.
  #[inline]
  pub fn metal_pos(&self, idx: usize) -> (usize, usize, usize) {
    let layer = idx / self.grid_2d;
    let rem = idx % self.grid_2d;
    (layer, rem % self.width, rem / self.width)
  }

  pub fn via_idx_begin(&self, layer: usize) -> usize {
    self.via_layer_offsets[layer]
  }

  pub fn via_idx_end(&self, layer: usize) -> usize {
    self.via_layer_offsets[layer + 1]
  }

  pub fn cell_state(&self, cell: CellRef) -> &super::cell::CellState {
    match cell {
      CellRef::Metal(i) => &self.metal_grid[i].state,
      CellRef::Via(i) => &self.via_grid[i].state,
    }
  }

  pub fn cell_state_mut(&mut self, cell: CellRef) -> &mut super::cell::CellState {
    match cell {
      CellRef::Metal(i) => &mut self.metal_grid[i].state,
      CellRef::Via(i) => &mut self.via_grid[i].state,
    }
  }

  pub fn label_of(&self, cell: CellRef) -> CellLabel {
    match cell {
      CellRef::Metal(i) => self.metal_labels[i],
      CellRef::Via(i) => self.via_labels[i],
    }
  }

  /// Allocate the metal grid and the filtered via grid from the prepared
  /// canvases, wiring all topological neighbour indices.
  pub fn initialise_graph_with_preplaced(&mut self) {
    self.metal_grid = Vec::with_capacity(self.layers * self.grid_2d);

    for layer in 0..self.layers {
      for y in 0..self.height {
        for x in 0..self.width {
          let idx = self.metal_idx(layer, y, x);
          let mut cell = MetalCell {
            layer,
            x,
            y,
            ..Default::default()
          };
          let sig = self.substrate.metal_layers[layer].get(x, y);
          if sig != SignalType::Empty {
            cell.state.signal = sig;
            cell.state.kind = if sig == SignalType::Obstacle {
              CellKind::Obstacles
            } else {
              CellKind::Preplaced
            };
          }

          // neighbour presence is purely topological here
          if y + 1 < self.height {
            cell.north = Some(idx + self.width);
          }
          if y > 0 {
            cell.south = Some(idx - self.width);
          }
          if x + 1 < self.width {
            cell.east = Some(idx + 1);
          }
          if x > 0 {
            cell.west = Some(idx - 1);
          }
          self.metal_grid.push(cell);
        }
      }
    }

    // via grid: obstacle sites are omitted entirely
    self.via_grid = Vec::new();
    self.via_layer_offsets = vec![0];
    let pin_w = self.substrate.pin_width();
    let pin_h = self.substrate.pin_height();

    for via_layer in 0..self.substrate.via_layer_count() {
      for j in 0..pin_h {
        for i in 0..pin_w {
          let sig = self.substrate.via_layers[via_layer].get(i, j);
          if sig == SignalType::Obstacle {
            continue;
          }

          let via_idx = self.via_grid.len();
          let mut cell = ViaCell {
            layer: via_layer,
            x: i,
            y: j,
            ..Default::default()
          };
          if sig != SignalType::Empty {
            cell.state.signal = sig;
            cell.state.kind = CellKind::Preplaced;
          }

          // corner-adjacent metal cells: LL, LR, UL, UR on each side
          let (w, h, grid_2d) = (self.width, self.height, self.grid_2d);
          let corner = move |cx: i32, cy: i32, layer: usize| -> Option<usize> {
            if cx >= 0 && (cx as usize) < w && cy >= 0 && (cy as usize) < h {
              Some(layer * grid_2d + cy as usize * w + cx as usize)
            } else {
              None
            }
          };
          let (ix, jy) = (i as i32, j as i32);
          let offsets = [(-1, -1), (0, -1), (-1, 0), (0, 0)];
          for (slot, &(dx, dy)) in offsets.iter().enumerate() {
            cell.up_corners[slot] = corner(ix + dx, jy + dy, via_layer);
            cell.down_corners[slot] = corner(ix + dx, jy + dy, via_layer + 1);
          }

          for m in cell.up_corners.iter().flatten() {
            self.metal_grid[*m].down_via = Some(via_idx);
          }
          for m in cell.down_corners.iter().flatten() {
            self.metal_grid[*m].up_via = Some(via_idx);
          }

          self.via_grid.push(cell);
        }
      }
      self.via_layer_offsets.push(self.via_grid.len());
    }

    info!(
      metal_cells = self.metal_grid.len(),
      via_cells = self.via_grid.len(),
      "diffusion substrate built"
    );
  }

  /// Paint every EMPTY region bordered by exactly one non-obstacle signal
  /// with that signal, as MARKED.
  pub fn fill_enclosed_regions(&mut self) {
    for layer in 0..self.layers {
      let mut visited = vec![false; self.grid_2d];
      for y in 0..self.height {
        for x in 0..self.width {
          let seed = self.metal_idx(layer, y, x);
          if self.metal_grid[seed].state.kind != CellKind::Empty || visited[seed - layer * self.grid_2d]
          {
            continue;
          }

          let mut region = Vec::new();
          let mut border: std::collections::HashSet<SignalType> = std::collections::HashSet::new();
          let mut queue = VecDeque::new();
          queue.push_back(seed);
          visited[seed - layer * self.grid_2d] = true;

          while let Some(idx) = queue.pop_front() {
            region.push(idx);
            for n in self.metal_grid[idx].side_neighbors().into_iter().flatten() {
              let n_state = &self.metal_grid[n].state;
              if n_state.kind == CellKind::Empty {
                let local = n - layer * self.grid_2d;
                if !visited[local] {
                  visited[local] = true;
                  queue.push_back(n);
                }
              } else if n_state.signal != SignalType::Obstacle {
                border.insert(n_state.signal);
              }
            }
          }

          let mut borders = border.into_iter();
          if let (Some(fill), None) = (borders.next(), borders.next()) {
            debug!(layer, signal = %fill, cells = region.len(), "filling enclosed region");
            for idx in region {
              let state = &mut self.metal_grid[idx].state;
              state.kind = CellKind::Marked;
              state.signal = fill;
            }
          }
        }
      }
    }
  }

  /// Promote empty vias whose corners show exactly one preplaced power
  /// signal, and spread assigned via signals into empty corner cells.
  pub fn mark_half_occupied_metals_and_pins(&mut self) {
    for v in 0..self.via_grid.len() {
      if self.via_grid[v].state.signal == SignalType::Obstacle {
        continue;
      }

      let corners: Vec<usize> = self.via_grid[v].all_corners().collect();

      match self.via_grid[v].state.kind {
        CellKind::Empty => {
          let mut preplaced: Option<SignalType> = None;
          let mut unique = true;
          for &m in &corners {
            let state = &self.metal_grid[m].state;
            if state.kind == CellKind::Preplaced && state.signal.is_power() {
              match preplaced {
                None => preplaced = Some(state.signal),
                Some(prev) if prev != state.signal => {
                  unique = false;
                  break;
                }
                _ => {}
              }
            }
          }
          let Some(sig) = preplaced.filter(|_| unique) else {
            continue;
          };

          self.via_grid[v].state.kind = CellKind::Marked;
          self.via_grid[v].state.signal = sig;
          for &m in &corners {
            let state = &mut self.metal_grid[m].state;
            if state.kind == CellKind::Empty {
              state.kind = CellKind::Marked;
              state.signal = sig;
            }
          }
        }
        _ if self.via_grid[v].state.signal.is_power() => {
          let sig = self.via_grid[v].state.signal;
          for &m in &corners {
            let state = &mut self.metal_grid[m].state;
            if state.kind == CellKind::Empty {
              state.kind = CellKind::Marked;
              state.signal = sig;
            }
          }
        }
        _ => {}
      }
    }
  }

  /// Rebuild the filtered adjacency lists: every cell lists exactly its
  /// EMPTY neighbours. Running this twice yields identical lists.
  pub fn link_neighbors(&mut self) {
    let metal_kinds: Vec<CellKind> = self.metal_grid.iter().map(|c| c.state.kind).collect();
    let via_kinds: Vec<CellKind> = self.via_grid.iter().map(|c| c.state.kind).collect();

    for cell in &mut self.metal_grid {
      cell.metal_neighbors.clear();
      cell.via_neighbors.clear();
      for n in cell.side_neighbors().into_iter().flatten() {
        if metal_kinds[n] == CellKind::Empty {
          cell.metal_neighbors.push(n);
        }
      }
      for v in [cell.up_via, cell.down_via].into_iter().flatten() {
        if via_kinds[v] == CellKind::Empty {
          cell.via_neighbors.push(v);
        }
      }
    }

    for cell in &mut self.via_grid {
      cell.neighbors.clear();
      let corners: Vec<usize> = cell.all_corners().collect();
      for m in corners {
        if metal_kinds[m] == CellKind::Empty {
          cell.neighbors.push(m);
        }
      }
    }
  }

  /// BFS flood fill across the combined metal+via graph. Every connected
  /// same-signal component of non-empty, non-obstacle cells gets one fresh
  /// label. Returns the number of labels allocated (0 excluded).
  pub fn initialise_indexing(&mut self) -> usize {
    self.label_signals = vec![SignalType::Empty];
    self.signal_labels.clear();
    self.metal_labels = vec![CELL_LABEL_EMPTY; self.metal_grid.len()];
    self.via_labels = vec![CELL_LABEL_EMPTY; self.via_grid.len()];

    let metal_count = self.metal_grid.len();
    let seeds = metal_count + self.via_grid.len();
    let mut next_label: CellLabel = 1;

    for seed in 0..seeds {
      let seed_ref = if seed < metal_count {
        CellRef::Metal(seed)
      } else {
        CellRef::Via(seed - metal_count)
      };

      let state = self.cell_state(seed_ref);
      if matches!(state.kind, CellKind::Empty | CellKind::Obstacles) || self.label_of(seed_ref) != CELL_LABEL_EMPTY
      {
        continue;
      }
      let signal = state.signal;

      let mut queue = VecDeque::new();
      queue.push_back(seed_ref);
      self.set_label(seed_ref, next_label);

      while let Some(at) = queue.pop_front() {
        let expand: Vec<CellRef> = match at {
          CellRef::Metal(i) => {
            let cell = &self.metal_grid[i];
            cell
              .side_neighbors()
              .into_iter()
              .flatten()
              .map(CellRef::Metal)
              .chain([cell.up_via, cell.down_via].into_iter().flatten().map(CellRef::Via))
              .collect()
          }
          CellRef::Via(i) => self.via_grid[i].all_corners().map(CellRef::Metal).collect(),
        };

        for n in expand {
          if self.label_of(n) == CELL_LABEL_EMPTY && self.cell_state(n).signal == signal {
            self.set_label(n, next_label);
            queue.push_back(n);
          }
        }
      }

      self.label_signals.push(signal);
      self.signal_labels.entry(signal).or_default().push(next_label);
      next_label += 1;
    }

    (next_label - 1) as usize
  }

  fn set_label(&mut self, cell: CellRef, label: CellLabel) {
    match cell {
      CellRef::Metal(i) => self.metal_labels[i] = label,
      CellRef::Via(i) => self.via_labels[i] = label,
    }
  }

  /// Push the grid state back onto the substrate canvases.
  pub fn write_back_to_pdn(&mut self) {
    for idx in 0..self.metal_grid.len() {
      let (layer, x, y) = self.metal_pos(idx);
      let state = &self.metal_grid[idx].state;
      let sig = match state.kind {
        CellKind::Empty => SignalType::Empty,
        _ => state.signal,
      };
      self.substrate.metal_layers[layer].set(x, y, sig);
    }
    for cell in &self.via_grid {
      let sig = match cell.state.kind {
        CellKind::Empty => SignalType::Empty,
        _ => cell.state.signal,
      };
      self.substrate.via_layers[cell.layer].set(cell.x, cell.y, sig);
    }
  }

  /// Prepare canvases and build the whole substrate, ready for the MCF
  /// stage.
  pub fn build_substrate(&mut self) {
    self.substrate.mark_preplaced_and_insert_pads();
    self.substrate.mark_obstacles_on_canvas();
    self.initialise_graph_with_preplaced();
    self.fill_enclosed_regions();
    self.mark_half_occupied_metals_and_pins();
    self.link_neighbors();
    let labels = self.initialise_indexing();
    info!(labels, "substrate labelled");
  }

  /// Full diffusion pipeline: substrate, MCF assignment, repair, filler,
  /// write-back.
  pub fn run_pipeline(&mut self) -> Result<()> {
    self.build_substrate();
    self.run_mcf_assignment()?;
    self.post_mcf_local_repair();
    self.run_filler()?;
    self.write_back_to_pdn();
    Ok(())
  }

  /// Exposed for the visualiser: canvas of one metal layer as currently
  /// held by the grid.
  pub fn metal_canvas_view(&self, layer: usize) -> Canvas {
    let mut canvas = Canvas::new(self.width, self.height);
    for y in 0..self.height {
      for x in 0..self.width {
        let state = &self.metal_grid[self.metal_idx(layer, y, x)].state;
        if state.kind != CellKind::Empty {
          canvas.set(x, y, state.signal);
        }
      }
    }
    canvas
  }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
