//! Multi-commodity flow LP oracle.
//!
//! The MCF binding hands the oracle a directed arc list with per-arc
//! bounds and weights, joint capacity groups tying arcs that share a
//! physical edge, and one (source, sink, demand) triple per commodity.
//! Commodity admissibility is encoded structurally: an arc tagged with a
//! commodity index is usable by that commodity alone, untagged arcs by
//! all.
//!
//! The default backend routes each commodity with successive
//! shortest-path augmentation over the residual capacities. It is a
//! feasibility-oriented stand-in for a simplex/barrier solver behind the
//! same interface.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug)]
pub struct McfArc {
  pub from: usize,
  pub to: usize,
  pub lower: f64,
  pub upper: f64,
  pub weight: f64,
  /// Restrict this arc to one commodity; `None` means shared.
  pub commodity: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct McfCommodity {
  pub source: usize,
  pub sink: usize,
  pub demand: f64,
  /// Minimum delivered flow below which the problem counts as infeasible.
  pub must_route: f64,
}

#[derive(Clone, Debug, Default)]
pub struct McfProblem {
  pub node_count: usize,
  pub arcs: Vec<McfArc>,
  /// Joint capacity groups: the summed flow over the listed arcs (all
  /// commodities) stays within the cap.
  pub groups: Vec<(Vec<usize>, f64)>,
  pub commodities: Vec<McfCommodity>,
}

/// Per-commodity, per-arc flows.
pub type McfFlows = Vec<Vec<f64>>;

pub trait LpOracle {
  fn solve(&mut self, problem: &McfProblem) -> Result<McfFlows>;
}

/// Successive shortest-path backend.
#[derive(Default)]
pub struct ShortestPathLp;

impl LpOracle for ShortestPathLp {
  fn solve(&mut self, problem: &McfProblem) -> Result<McfFlows> {
    let arc_count = problem.arcs.len();
    let mut flows: McfFlows = vec![vec![0.0; arc_count]; problem.commodities.len()];
    let mut arc_used = vec![0.0; arc_count];
    let mut group_used = vec![0.0; problem.groups.len()];

    // group membership per arc
    let mut arc_groups: Vec<Vec<usize>> = vec![Vec::new(); arc_count];
    for (g, (members, _)) in problem.groups.iter().enumerate() {
      for &a in members {
        arc_groups[a].push(g);
      }
    }

    let residual = |a: usize, arc_used: &[f64], group_used: &[f64]| -> f64 {
      let mut r = problem.arcs[a].upper - arc_used[a];
      for &g in &arc_groups[a] {
        r = r.min(problem.groups[g].1 - group_used[g]);
      }
      r.max(0.0)
    };

    // adjacency
    let mut out_arcs: Vec<Vec<usize>> = vec![Vec::new(); problem.node_count];
    for (i, arc) in problem.arcs.iter().enumerate() {
      out_arcs[arc.from].push(i);
    }

    for (k, commodity) in problem.commodities.iter().enumerate() {
      let mut delivered = 0.0;

      while delivered + 1e-12 < commodity.demand {
        // Dijkstra over weights, arcs admissible for k with residual > 0
        let n = problem.node_count;
        let mut dist = vec![f64::INFINITY; n];
        let mut via_arc = vec![usize::MAX; n];
        let mut heap = BinaryHeap::new();
        dist[commodity.source] = 0.0;
        heap.push(DijkstraEntry {
          node: commodity.source,
          dist: 0.0,
        });

        while let Some(DijkstraEntry { node, dist: d }) = heap.pop() {
          if d > dist[node] {
            continue;
          }
          if node == commodity.sink {
            break;
          }
          for &a in &out_arcs[node] {
            let arc = &problem.arcs[a];
            if arc.commodity.map_or(false, |c| c != k) {
              continue;
            }
            if residual(a, &arc_used, &group_used) <= 1e-12 {
              continue;
            }
            let nd = d + arc.weight.max(0.0);
            if nd < dist[arc.to] {
              dist[arc.to] = nd;
              via_arc[arc.to] = a;
              heap.push(DijkstraEntry { node: arc.to, dist: nd });
            }
          }
        }

        if dist[commodity.sink].is_infinite() {
          break;
        }

        // bottleneck along the path
        let mut bottleneck = commodity.demand - delivered;
        let mut walk = commodity.sink;
        while walk != commodity.source {
          let a = via_arc[walk];
          bottleneck = bottleneck.min(residual(a, &arc_used, &group_used));
          walk = problem.arcs[a].from;
        }
        if bottleneck <= 1e-12 {
          break;
        }

        let mut walk = commodity.sink;
        while walk != commodity.source {
          let a = via_arc[walk];
          flows[k][a] += bottleneck;
          arc_used[a] += bottleneck;
          for &g in &arc_groups[a] {
            group_used[g] += bottleneck;
          }
          walk = problem.arcs[a].from;
        }
        delivered += bottleneck;
      }

      if delivered + 1e-9 < commodity.must_route {
        return Err(EngineError::LpInfeasible(format!(
          "commodity {k} delivered {delivered:.3} of required {:.3}",
          commodity.must_route
        )));
      }
    }

    Ok(flows)
  }
}

struct DijkstraEntry {
  node: usize,
  dist: f64,
}

impl PartialEq for DijkstraEntry {
  fn eq(&self, other: &Self) -> bool {
    self.dist == other.dist
  }
}
impl Eq for DijkstraEntry {}
impl PartialOrd for DijkstraEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for DijkstraEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
  }
}
