//! MCF solver binding: flow-network construction over the labelled
//! components, oracle invocation, flow readback and the post-MCF repairs.

use std::collections::{BinaryHeap, HashMap, VecDeque};

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::signal::SignalType;
use crate::solve::{LpOracle, McfArc, McfCommodity, McfProblem, ShortestPathLp};

use super::cell::{CellKind, CellRef, CELL_LABEL_EMPTY};
use super::engine::DiffusionEngine;

/// One node of the flow network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowNode {
  /// A labelled same-signal component.
  Component(u16),
  /// A connected region of EMPTY cells, by region index.
  EmptyRegion(usize),
  /// One source per commodity: a chiplet instance of the signal, or the
  /// whole bump side when no instance carries it.
  SuperSource(SignalType, usize),
  /// One sink per signal, shared by all of its chiplet commodities.
  SuperSink(SignalType),
}

struct FlowNetwork {
  problem: McfProblem,
  nodes: Vec<FlowNode>,
  commodity_signals: Vec<SignalType>,
  /// Cells of each empty region.
  region_cells: Vec<Vec<CellRef>>,
  /// Node index of each empty region.
  region_nodes: Vec<usize>,
}

impl DiffusionEngine {
  /// Topological neighbours of a cell, EMPTY or not.
  pub(super) fn topo_neighbors(&self, at: CellRef) -> Vec<CellRef> {
    match at {
      CellRef::Metal(i) => {
        let cell = &self.metal_grid[i];
        cell
          .side_neighbors()
          .into_iter()
          .flatten()
          .map(CellRef::Metal)
          .chain(
            [cell.up_via, cell.down_via]
              .into_iter()
              .flatten()
              .map(CellRef::Via),
          )
          .collect()
      }
      CellRef::Via(i) => self.via_grid[i].all_corners().map(CellRef::Metal).collect(),
    }
  }

  fn all_cells(&self) -> impl Iterator<Item = CellRef> {
    let metal = self.metal_grid.len();
    let via = self.via_grid.len();
    (0..metal)
      .map(CellRef::Metal)
      .chain((0..via).map(CellRef::Via))
  }

  /// Group EMPTY cells into connected regions.
  fn empty_regions(&self) -> (HashMap<CellRef, usize>, Vec<Vec<CellRef>>) {
    let mut region_of: HashMap<CellRef, usize> = HashMap::new();
    let mut regions: Vec<Vec<CellRef>> = Vec::new();

    for seed in self.all_cells() {
      if self.cell_state(seed).kind != CellKind::Empty || region_of.contains_key(&seed) {
        continue;
      }
      let id = regions.len();
      let mut cells = Vec::new();
      let mut queue = VecDeque::from([seed]);
      region_of.insert(seed, id);
      while let Some(at) = queue.pop_front() {
        cells.push(at);
        for n in self.topo_neighbors(at) {
          if self.cell_state(n).kind == CellKind::Empty && !region_of.contains_key(&n) {
            region_of.insert(n, id);
            queue.push_back(n);
          }
        }
      }
      regions.push(cells);
    }
    (region_of, regions)
  }

  fn build_flow_network(&self) -> FlowNetwork {
    let (region_of, regions) = self.empty_regions();
    let label_count = self.label_signals.len() - 1;

    // node ids: components first, then empty regions, then super nodes
    let node_of_label = |label: u16| (label - 1) as usize;
    let region_nodes: Vec<usize> = (0..regions.len()).map(|r| label_count + r).collect();
    let mut nodes: Vec<FlowNode> = (1..=label_count as u16).map(FlowNode::Component).collect();
    nodes.extend((0..regions.len()).map(FlowNode::EmptyRegion));

    // flow node of a cell, if it has one
    let node_of_cell = |cell: CellRef| -> Option<usize> {
      let label = self.label_of(cell);
      if label != CELL_LABEL_EMPTY {
        return Some(node_of_label(label));
      }
      if self.cell_state(cell).kind == CellKind::Empty {
        return region_of.get(&cell).map(|&r| region_nodes[r]);
      }
      None
    };

    // accumulate adjacency between flow nodes
    #[derive(Default, Clone, Copy)]
    struct Adjacency {
      metal: usize,
      via: usize,
    }
    let mut adjacency: HashMap<(usize, usize), Adjacency> = HashMap::new();
    let mut bump = |u: Option<usize>, v: Option<usize>, via: bool| {
      let (Some(u), Some(v)) = (u, v) else { return };
      if u == v {
        return;
      }
      let key = (u.min(v), u.max(v));
      let entry = adjacency.entry(key).or_default();
      if via {
        entry.via += 1;
      } else {
        entry.metal += 1;
      }
    };

    for (i, cell) in self.metal_grid.iter().enumerate() {
      let me = node_of_cell(CellRef::Metal(i));
      for n in [cell.east, cell.north].into_iter().flatten() {
        bump(me, node_of_cell(CellRef::Metal(n)), false);
      }
    }
    for (v, cell) in self.via_grid.iter().enumerate() {
      let me = node_of_cell(CellRef::Via(v));
      for m in cell.all_corners() {
        bump(me, node_of_cell(CellRef::Metal(m)), true);
      }
    }

    // signals with labelled presence, smallest current demand first
    let currents = self.substrate.ubump.signal_currents();
    let mut signals: Vec<SignalType> = self
      .signal_labels
      .keys()
      .copied()
      .filter(|s| s.is_power())
      .collect();
    signals.sort_by(|a, b| {
      let ca = currents.get(a).copied().unwrap_or(0.0);
      let cb = currents.get(b).copied().unwrap_or(0.0);
      ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
    });

    // one commodity per chiplet instance of a signal; a signal without any
    // placed instance falls back to a single bump-side commodity. The
    // shared sink is per signal so chiplet flows compete for the same c4
    // capacity while each keeps its own must-route floor.
    let mut commodity_signals: Vec<SignalType> = Vec::new();
    let mut commodity_chiplet: Vec<Option<usize>> = Vec::new();
    let mut commodities_of_signal: HashMap<SignalType, Vec<usize>> = HashMap::new();
    for &sig in &signals {
      let instances: Vec<usize> = self
        .substrate
        .ubump
        .instances
        .iter()
        .enumerate()
        .filter(|(_, inst)| inst.power_signals.contains(&sig))
        .map(|(i, _)| i)
        .collect();
      let slots = commodities_of_signal.entry(sig).or_default();
      if instances.is_empty() {
        slots.push(commodity_signals.len());
        commodity_signals.push(sig);
        commodity_chiplet.push(None);
      } else {
        for inst in instances {
          slots.push(commodity_signals.len());
          commodity_signals.push(sig);
          commodity_chiplet.push(Some(inst));
        }
      }
    }

    let source_base = nodes.len();
    for (k, &sig) in commodity_signals.iter().enumerate() {
      nodes.push(FlowNode::SuperSource(sig, k));
    }
    let sink_base = nodes.len();
    let sink_of: HashMap<SignalType, usize> = signals
      .iter()
      .enumerate()
      .map(|(i, &sig)| {
        nodes.push(FlowNode::SuperSink(sig));
        (sig, sink_base + i)
      })
      .collect();

    let mut problem = McfProblem {
      node_count: nodes.len(),
      ..Default::default()
    };

    // inter-node arcs: both directions per admissible commodity, jointly
    // capped across all of them
    let cfg = &self.config;
    for (&(u, v), adj) in &adjacency {
      let signal_of_node = |n: usize| -> Option<SignalType> {
        match nodes[n] {
          FlowNode::Component(label) => Some(self.label_signals[label as usize]),
          _ => None,
        }
      };
      let su = signal_of_node(u);
      let sv = signal_of_node(v);

      // components of different signals never exchange flow
      if let (Some(a), Some(b)) = (su, sv) {
        if a != b {
          continue;
        }
      }

      let cap =
        adj.metal as f64 * cfg.normal_metal_edge_ub + adj.via as f64 * cfg.via_edge_ub;
      if cap <= 0.0 {
        continue;
      }
      let weight = if adj.metal > 0 {
        cfg.normal_metal_edge_weight
      } else {
        cfg.via_edge_weight
      };

      // flow through a component is pinned to that signal's commodities
      let tags: Vec<Option<usize>> = match su.or(sv) {
        Some(sig) => commodities_of_signal[&sig].iter().map(|&k| Some(k)).collect(),
        None => vec![None],
      };

      let first = problem.arcs.len();
      for commodity in tags {
        problem.arcs.push(McfArc {
          from: u,
          to: v,
          lower: cfg.normal_metal_edge_lb,
          upper: cap,
          weight,
          commodity,
        });
        problem.arcs.push(McfArc {
          from: v,
          to: u,
          lower: cfg.normal_metal_edge_lb,
          upper: cap,
          weight,
          commodity,
        });
      }
      problem.groups.push(((first..problem.arcs.len()).collect(), cap));
    }

    // super-source / super-sink attachments and demands
    let top = self.substrate.ubump_connected_layer();
    let bottom = self.substrate.c4_connected_layer();

    // per-label cell counts on the bump-connected layers
    let mut top_cells_of: HashMap<u16, usize> = HashMap::new();
    let mut bottom_cells_of: HashMap<u16, usize> = HashMap::new();
    for (i, cell) in self.metal_grid.iter().enumerate() {
      let label = self.metal_labels[i];
      if label == CELL_LABEL_EMPTY {
        continue;
      }
      if cell.layer == top {
        *top_cells_of.entry(label).or_insert(0) += 1;
      }
      if cell.layer == bottom {
        *bottom_cells_of.entry(label).or_insert(0) += 1;
      }
    }

    // sink arcs and sink capacity, per signal, duplicated per commodity
    let mut sink_cap_of: HashMap<SignalType, f64> = HashMap::new();
    for &sig in &signals {
      let mut sink_cap = 0.0;
      for &label in &self.signal_labels[&sig] {
        let Some(&cells) = bottom_cells_of.get(&label) else {
          continue;
        };
        let cap = cells as f64;
        let first = problem.arcs.len();
        for &k in &commodities_of_signal[&sig] {
          problem.arcs.push(McfArc {
            from: node_of_label(label),
            to: sink_of[&sig],
            lower: 0.0,
            upper: cap,
            weight: 0.0,
            commodity: Some(k),
          });
        }
        problem.groups.push(((first..problem.arcs.len()).collect(), cap));
        sink_cap += cap;
      }
      sink_cap_of.insert(sig, sink_cap);
    }

    // source arcs: a chiplet commodity taps the components under its own
    // pad footprint; an aggregate commodity taps every top-layer cell
    let mut source_cap: Vec<f64> = vec![0.0; commodity_signals.len()];
    for (k, &sig) in commodity_signals.iter().enumerate() {
      let mut per_label: HashMap<u16, usize> = HashMap::new();
      match commodity_chiplet[k] {
        Some(inst_idx) => {
          let inst = &self.substrate.ubump.instances[inst_idx];
          if let Some(pins) = self.substrate.ubump.signal_cords.get(&sig) {
            for pin in pins {
              if !inst.rect.contains_point(*pin) {
                continue;
              }
              for (x, y) in crate::pdn::pad_cells(pin.x, pin.y) {
                if x < 0
                  || y < 0
                  || x >= self.substrate.grid_width() as i32
                  || y >= self.substrate.grid_height() as i32
                {
                  continue;
                }
                let label = self.metal_labels[self.metal_idx(top, y as usize, x as usize)];
                if label != CELL_LABEL_EMPTY && self.label_signals[label as usize] == sig {
                  *per_label.entry(label).or_insert(0) += 1;
                }
              }
            }
          }
        }
        None => {
          for &label in &self.signal_labels[&sig] {
            if let Some(&cells) = top_cells_of.get(&label) {
              per_label.insert(label, cells);
            }
          }
        }
      }

      for (label, cells) in per_label {
        let cap = cells as f64;
        problem.arcs.push(McfArc {
          from: source_base + k,
          to: node_of_label(label),
          lower: 0.0,
          upper: cap,
          weight: 0.0,
          commodity: Some(k),
        });
        source_cap[k] += cap;
      }
    }

    // demands: each chiplet asks for its share of the signal's routable
    // budget and must receive the configured floor of that share
    let mut commodities = Vec::with_capacity(commodity_signals.len());
    for (k, &sig) in commodity_signals.iter().enumerate() {
      let total_source: f64 = commodities_of_signal[&sig]
        .iter()
        .map(|&j| source_cap[j])
        .sum();
      let sink_cap = sink_cap_of.get(&sig).copied().unwrap_or(0.0);
      let routable = total_source.min(sink_cap) * cfg.via_budget_current_quota;
      let share = if total_source > 0.0 {
        source_cap[k] / total_source
      } else {
        0.0
      };
      let demand = routable * share;
      commodities.push(McfCommodity {
        source: source_base + k,
        sink: sink_of[&sig],
        demand,
        must_route: demand * cfg.must_route_budget_min,
      });
    }
    problem.commodities = commodities;

    FlowNetwork {
      problem,
      nodes,
      commodity_signals,
      region_cells: regions,
      region_nodes,
    }
  }

  /// Build and solve the flow network, then paint every empty region by
  /// the commodity that carried the most flow through it. LP
  /// infeasibility is downgraded to a warning; the repair stage picks up
  /// whatever the partial assignment missed.
  pub fn run_mcf_assignment(&mut self) -> Result<()> {
    let mut oracle = ShortestPathLp;
    self.run_mcf_assignment_with(&mut oracle)
  }

  pub fn run_mcf_assignment_with(&mut self, oracle: &mut dyn LpOracle) -> Result<()> {
    let net = self.build_flow_network();
    if net.problem.commodities.is_empty() {
      debug!("no power commodities; skipping MCF");
      return Ok(());
    }

    let flows = match oracle.solve(&net.problem) {
      Ok(flows) => flows,
      Err(EngineError::LpInfeasible(reason)) => {
        warn!(%reason, "MCF infeasible; deferring to force repair");
        return Ok(());
      }
      Err(other) => return Err(other),
    };

    let mut painted_regions = 0usize;
    for (r, cells) in net.region_cells.iter().enumerate() {
      let node = net.region_nodes[r];
      debug_assert!(matches!(net.nodes[node], FlowNode::EmptyRegion(idx) if idx == r));
      // aggregate inflow per signal across its chiplet commodities
      let mut through_of: HashMap<SignalType, f64> = HashMap::new();
      for (k, &sig) in net.commodity_signals.iter().enumerate() {
        let through: f64 = net
          .problem
          .arcs
          .iter()
          .enumerate()
          .filter(|(_, arc)| arc.to == node)
          .map(|(a, _)| flows[k][a])
          .sum();
        *through_of.entry(sig).or_insert(0.0) += through;
      }
      let mut best: Option<(f64, SignalType)> = None;
      for (&sig, &through) in &through_of {
        let better = match best {
          Some((b, bs)) => through > b || (through == b && sig < bs),
          None => true,
        };
        if through > 1e-9 && better {
          best = Some((through, sig));
        }
      }
      if let Some((_, sig)) = best {
        painted_regions += 1;
        for &cell in cells {
          let state = self.cell_state_mut(cell);
          state.kind = CellKind::Marked;
          state.signal = sig;
        }
      }
    }
    info!(painted_regions, "MCF readback complete");
    Ok(())
  }

  /// Connected components of `sig` cells (any kind except obstacles),
  /// largest first.
  pub(super) fn signal_islands(&self, sig: SignalType) -> Vec<Vec<CellRef>> {
    let mut seen: HashMap<CellRef, ()> = HashMap::new();
    let mut islands: Vec<Vec<CellRef>> = Vec::new();
    for seed in self.all_cells() {
      let state = self.cell_state(seed);
      if state.signal != sig || state.kind == CellKind::Obstacles || seen.contains_key(&seed) {
        continue;
      }
      let mut cells = Vec::new();
      let mut queue = VecDeque::from([seed]);
      seen.insert(seed, ());
      while let Some(at) = queue.pop_front() {
        cells.push(at);
        for n in self.topo_neighbors(at) {
          let ns = self.cell_state(n);
          if ns.signal == sig && ns.kind != CellKind::Obstacles && !seen.contains_key(&n) {
            seen.insert(n, ());
            queue.push_back(n);
          }
        }
      }
      islands.push(cells);
    }
    islands.sort_by_key(|c| std::cmp::Reverse(c.len()));
    islands
  }

  /// Signals that still own more than one island.
  pub fn find_post_mcf_local_flaws(&self) -> Vec<SignalType> {
    let mut flawed = Vec::new();
    for &sig in crate::signal::POWER_SIGNAL_SET.iter() {
      if self.signal_islands(sig).len() > 1 {
        flawed.push(sig);
      }
    }
    flawed
  }

  /// Bridge disconnected islands of every flawed signal: first over EMPTY
  /// cells only, then forcibly, stealing soft cells or repainting through
  /// obstacles at a penalty.
  pub fn post_mcf_local_repair(&mut self) {
    for sig in self.find_post_mcf_local_flaws() {
      if !self.repair_signal(sig, false) {
        warn!(signal = %sig, "local repair failed; forcing");
        self.repair_signal(sig, true);
      }
    }
  }

  /// One repair pass. Returns true when the signal ends connected.
  /// Step cost of entering a cell during repair, `None` when the cell is
  /// impassable. The first pass walks same-signal and EMPTY cells only;
  /// the force pass additionally steals soft cells of other nets and plows
  /// through obstacles, each at a penalty.
  fn repair_step_cost(&self, at: CellRef, sig: SignalType, force: bool) -> Option<u32> {
    const SOFT_STEAL_PENALTY: u32 = 4;
    const OBSTACLE_PENALTY: u32 = 16;

    let ns = self.cell_state(at);
    if ns.signal == sig && ns.kind != CellKind::Obstacles {
      return Some(1);
    }
    if ns.kind == CellKind::Empty {
      return Some(1);
    }
    if !force {
      return None;
    }
    match ns.kind {
      CellKind::Marked | CellKind::Candidate => Some(SOFT_STEAL_PENALTY),
      CellKind::Obstacles => Some(OBSTACLE_PENALTY),
      // preplaced cells of other signals stay untouchable
      _ => None,
    }
  }

  fn repair_signal(&mut self, sig: SignalType, force: bool) -> bool {
    for _ in 0..64 {
      let islands = self.signal_islands(sig);
      if islands.len() <= 1 {
        return true;
      }

      // uniform-cost search from the main island toward any other island
      let main: HashMap<CellRef, ()> = islands[0].iter().map(|&c| (c, ())).collect();
      let others: HashMap<CellRef, ()> =
        islands[1..].iter().flatten().map(|&c| (c, ())).collect();

      let mut dist: HashMap<CellRef, u32> = HashMap::new();
      let mut prev: HashMap<CellRef, CellRef> = HashMap::new();
      let mut heap: BinaryHeap<std::cmp::Reverse<(u32, CellRef)>> = BinaryHeap::new();
      for &c in islands[0].iter() {
        dist.insert(c, 0);
        heap.push(std::cmp::Reverse((0, c)));
      }

      let mut touched: Option<CellRef> = None;
      while let Some(std::cmp::Reverse((cost, at))) = heap.pop() {
        if cost > dist.get(&at).copied().unwrap_or(u32::MAX) {
          continue;
        }
        if others.contains_key(&at) {
          touched = Some(at);
          break;
        }
        for n in self.topo_neighbors(at) {
          let Some(step) = self.repair_step_cost(n, sig, force) else {
            continue;
          };
          let next = cost + step;
          if next < dist.get(&n).copied().unwrap_or(u32::MAX) {
            dist.insert(n, next);
            prev.insert(n, at);
            heap.push(std::cmp::Reverse((next, n)));
          }
        }
      }

      let Some(reached) = touched else {
        return false;
      };

      // paint the path back to the main island; in force mode this
      // repaints stolen soft cells and crossed obstacles alike
      let mut walk = reached;
      while !main.contains_key(&walk) {
        let state = self.cell_state_mut(walk);
        let paintable = state.kind == CellKind::Empty
          || (force
            && matches!(
              state.kind,
              CellKind::Marked | CellKind::Candidate | CellKind::Obstacles
            ));
        if paintable {
          state.kind = CellKind::Marked;
          state.signal = sig;
        }
        match prev.get(&walk) {
          Some(&p) => walk = p,
          None => break,
        }
      }
      debug!(signal = %sig, force, "bridged one island");
    }
    self.signal_islands(sig).len() <= 1
  }
}

#[cfg(test)]
#[path = "mcf_test.rs"]
mod mcf_test;
