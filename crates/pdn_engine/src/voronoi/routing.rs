//! Steps C and D: per-net MST routing and rip-and-reroute.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::geometry::segment::segments_intersect;
use crate::geometry::{OrderedSegment, Point};
use crate::signal::SignalType;

use super::{LayerPoints, LayerSegments, VoronoiPdnGen};

/// Collapse duplicate POIs. The same point listed twice under one signal is
/// merged; under two signals it is a contract violation.
pub(super) fn fix_repeated_points(book: &mut LayerPoints) -> Result<()> {
  let mut table: HashMap<Point, SignalType> = HashMap::new();
  for (&sig, points) in book.iter() {
    for &p in points {
      if let Some(&prev) = table.get(&p) {
        if prev != sig {
          return Err(EngineError::InputContract(format!(
            "point {p} claimed by both {prev} and {sig}"
          )));
        }
      } else {
        table.insert(p, sig);
      }
    }
  }
  for points in book.values_mut() {
    points.clear();
  }
  let mut entries: Vec<(Point, SignalType)> = table.into_iter().collect();
  entries.sort();
  for (p, sig) in entries {
    book.entry(sig).or_default().push(p);
  }
  Ok(())
}

/// Collapse duplicate segments, mirroring [`fix_repeated_points`].
pub(super) fn fix_repeated_segments(book: &mut LayerSegments) -> Result<()> {
  let mut table: HashMap<OrderedSegment, SignalType> = HashMap::new();
  for (&sig, segments) in book.iter() {
    for &s in segments {
      if let Some(&prev) = table.get(&s) {
        if prev != sig {
          return Err(EngineError::InputContract(format!(
            "segment {s} claimed by both {prev} and {sig}"
          )));
        }
      } else {
        table.insert(s, sig);
      }
    }
  }
  for segments in book.values_mut() {
    segments.clear();
  }
  let mut entries: Vec<(OrderedSegment, SignalType)> = table.into_iter().collect();
  entries.sort();
  for (s, sig) in entries {
    book.entry(sig).or_default().push(s);
  }
  Ok(())
}

impl VoronoiPdnGen {
  /// Step C: per-signal Prim MST over the POIs, Manhattan weighted. Tree
  /// edges land in the segment book with endpoints nudged one grid step
  /// inward so segments do not run through the pin cells themselves.
  pub fn run_mst_routing(&mut self, layer: usize) -> Result<()> {
    fix_repeated_points(&mut self.points_of_layers[layer])?;
    fix_repeated_segments(&mut self.segments_of_layers[layer])?;

    let books: Vec<(SignalType, Vec<Point>)> = self.points_of_layers[layer]
      .iter()
      .map(|(s, v)| (*s, v.clone()))
      .collect();

    for (sig, pins) in books {
      if pins.len() < 2 {
        continue;
      }

      // Prim over the complete graph
      let n = pins.len();
      let mut in_tree = vec![false; n];
      let mut best_cost = vec![i64::MAX; n];
      let mut best_parent = vec![usize::MAX; n];
      in_tree[0] = true;
      for i in 1..n {
        best_cost[i] = pins[0].l1_distance(pins[i]);
        best_parent[i] = 0;
      }

      for _ in 1..n {
        let mut pick = usize::MAX;
        let mut pick_cost = i64::MAX;
        for i in 0..n {
          if !in_tree[i] && best_cost[i] < pick_cost {
            pick = i;
            pick_cost = best_cost[i];
          }
        }
        if pick == usize::MAX {
          break;
        }
        in_tree[pick] = true;

        let (a, b) = (pins[best_parent[pick]], pins[pick]);
        if let Some(edge) = inset_segment(a, b) {
          let segs = self.segments_of_layers[layer].entry(sig).or_default();
          if !segs.contains(&edge) {
            segs.push(edge);
          }
        }

        for i in 0..n {
          if !in_tree[i] {
            let d = pins[pick].l1_distance(pins[i]);
            if d < best_cost[i] {
              best_cost[i] = d;
              best_parent[i] = pick;
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Step D: find crossings between segments of different signals, rip the
  /// longer of each crossing pair and re-route it with obstacle-inflated
  /// A*. Re-routed paths rejoin the books as fresh POIs and segments.
  pub fn rip_and_reroute(&mut self, layer: usize) -> Result<()> {
    let pin_w = self.substrate().pin_width() as i32;
    let pin_h = self.substrate().pin_height() as i32;

    let mut signal_of: HashMap<OrderedSegment, SignalType> = HashMap::new();
    for (&sig, segments) in &self.segments_of_layers[layer] {
      for &s in segments {
        signal_of.insert(s, sig);
      }
    }

    // all intersecting pairs across signals (touch counts)
    let mut conflicts: Vec<(OrderedSegment, OrderedSegment)> = Vec::new();
    let all: Vec<(OrderedSegment, SignalType)> =
      signal_of.iter().map(|(s, t)| (*s, *t)).collect();
    for (i, &(a, sa)) in all.iter().enumerate() {
      for &(b, sb) in all.iter().skip(i + 1) {
        if sa != sb && a.intersects(b) {
          conflicts.push((a, b));
        }
      }
    }
    if conflicts.is_empty() {
      return Ok(());
    }

    // rip the longer segment of each remaining pair until none is left
    let mut ripped: Vec<OrderedSegment> = Vec::new();
    while let Some(&(a, b)) = conflicts.first() {
      let victim = if a.length() > b.length() { a } else { b };
      ripped.push(victim);
      conflicts.retain(|&(x, y)| x != victim && y != victim);
    }

    for segments in self.segments_of_layers[layer].values_mut() {
      segments.retain(|s| !ripped.contains(s));
    }

    ripped.sort_by(|a, b| a.length().partial_cmp(&b.length()).unwrap_or(Ordering::Equal));

    for victim in ripped {
      let sig = signal_of[&victim];
      let start = victim.low();
      let goal = victim.high();
      debug!(%sig, %start, %goal, "rerouting ripped segment");

      // inflate every surviving foreign segment into a blocking polygon
      let mut blocking_windings: Vec<Vec<Point>> = Vec::new();
      for (&other_sig, segments) in &self.segments_of_layers[layer] {
        if other_sig == sig {
          continue;
        }
        for &s in segments {
          blocking_windings.push(inflate_segment(s));
        }
      }
      let blocking_edges: Vec<(Point, Point)> = blocking_windings
        .iter()
        .flat_map(|w| {
          (0..w.len()).map(move |i| (w[i], w[(i + 1) % w.len()]))
        })
        .collect();

      // 0 free, 1 visited, 9 blocked
      let mut node_stat = vec![0u8; (pin_w * pin_h) as usize];
      let at = |x: i32, y: i32| (y * pin_w + x) as usize;
      for j in 0..pin_h {
        for i in 0..pin_w {
          let p = Point::new(i, j);
          if blocking_windings.iter().any(|w| point_in_polygon(p, w)) {
            node_stat[at(i, j)] = 9;
          }
        }
      }
      // start and goal must stay reachable even when an inflation touches them
      node_stat[at(goal.x, goal.y)] = 0;

      let mut prev: HashMap<Point, Point> = HashMap::new();
      let mut cost: HashMap<Point, i64> = HashMap::new();
      let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

      cost.insert(start, 0);
      node_stat[at(start.x, start.y)] = 1;
      heap.push(HeapEntry::new(start, 0, goal));

      let mut reached = false;
      while let Some(entry) = heap.pop() {
        let curr = entry.point;
        if curr == goal {
          reached = true;
          break;
        }
        let curr_cost = cost[&curr];

        // candidate fan-out: every free cell visible from `curr` past the
        // blocking edges; geometry tests are read-only so they parallelise
        let candidates: Vec<Point> = (0..pin_h * pin_w)
          .into_par_iter()
          .filter_map(|idx| {
            let (i, j) = (idx % pin_w, idx / pin_w);
            if node_stat[at(i, j)] != 0 {
              return None;
            }
            let cand = Point::new(i, j);
            let hit = blocking_edges
              .iter()
              .any(|&(a, b)| segments_intersect(curr, cand, a, b));
            (!hit).then_some(cand)
          })
          .collect();

        // sequential merge into the shared maps
        for cand in candidates {
          if node_stat[at(cand.x, cand.y)] == 0 {
            node_stat[at(cand.x, cand.y)] = 1;
            prev.insert(cand, curr);
            let c = curr_cost + curr.l1_distance(cand);
            cost.insert(cand, c);
            heap.push(HeapEntry::new(cand, c, goal));
          }
        }
      }

      if !reached {
        warn!(%sig, %start, %goal, "routing pair unfixable, skipping");
        continue;
      }

      let mut path = vec![goal];
      let mut walk = goal;
      while walk != start {
        walk = prev[&walk];
        path.push(walk);
      }
      path.reverse();

      let points = self.points_of_layers[layer].entry(sig).or_default();
      for &p in &path[1..path.len() - 1] {
        points.push(p);
      }
      let segments = self.segments_of_layers[layer].entry(sig).or_default();
      for pair in path.windows(2) {
        segments.push(OrderedSegment::new(pair[0], pair[1]));
      }
    }

    fix_repeated_points(&mut self.points_of_layers[layer])?;
    fix_repeated_segments(&mut self.segments_of_layers[layer])?;
    Ok(())
  }
}

/// Pull both endpoints one grid step toward each other. Degenerate results
/// fall back to the original endpoints.
fn inset_segment(a: Point, b: Point) -> Option<OrderedSegment> {
  if a == b {
    return None;
  }
  let step = |from: Point, to: Point| {
    Point::new(from.x + (to.x - from.x).signum(), from.y + (to.y - from.y).signum())
  };
  let a2 = step(a, b);
  let b2 = step(b, a);
  if a2 == b2 || a2 == b || b2 == a {
    Some(OrderedSegment::new(a, b))
  } else {
    Some(OrderedSegment::new(a2, b2))
  }
}

/// 45°-inflated offset polygon around a segment: a one-cell collar whose
/// winding depends on the segment's orientation. Always a proper superset
/// of the segment's one-cell Minkowski neighbourhood.
fn inflate_segment(s: OrderedSegment) -> Vec<Point> {
  let (mut c1, mut c2) = (s.low(), s.high());
  if c1.x == c2.x {
    if c1.y > c2.y {
      std::mem::swap(&mut c1, &mut c2);
    }
    vec![
      Point::new(c2.x - 1, c2.y + 1),
      Point::new(c2.x + 1, c2.y + 1),
      Point::new(c1.x + 1, c1.y - 1),
      Point::new(c1.x - 1, c1.y - 1),
    ]
  } else {
    if c1.x > c2.x {
      std::mem::swap(&mut c1, &mut c2);
    }
    if c1.y > c2.y {
      vec![
        Point::new(c1.x - 1, c1.y - 1),
        Point::new(c1.x - 1, c1.y + 1),
        Point::new(c1.x + 1, c1.y + 1),
        Point::new(c2.x + 1, c2.y + 1),
        Point::new(c2.x + 1, c2.y - 1),
        Point::new(c2.x - 1, c2.y - 1),
      ]
    } else if c1.y < c2.y {
      vec![
        Point::new(c1.x + 1, c1.y - 1),
        Point::new(c1.x - 1, c1.y - 1),
        Point::new(c1.x - 1, c1.y + 1),
        Point::new(c2.x - 1, c2.y + 1),
        Point::new(c2.x + 1, c2.y + 1),
        Point::new(c2.x + 1, c2.y - 1),
      ]
    } else {
      vec![
        Point::new(c1.x - 1, c1.y + 1),
        Point::new(c2.x + 1, c2.y + 1),
        Point::new(c2.x + 1, c2.y - 1),
        Point::new(c1.x - 1, c1.y - 1),
      ]
    }
  }
}

/// Even-odd point-in-polygon with the boundary counted inside.
fn point_in_polygon(p: Point, winding: &[Point]) -> bool {
  let n = winding.len();
  let mut inside = false;
  for i in 0..n {
    let a = winding[i];
    let b = winding[(i + 1) % n];
    // boundary check first
    let cross = (b.x as i64 - a.x as i64) * (p.y as i64 - a.y as i64)
      - (b.y as i64 - a.y as i64) * (p.x as i64 - a.x as i64);
    if cross == 0
      && p.x >= a.x.min(b.x)
      && p.x <= a.x.max(b.x)
      && p.y >= a.y.min(b.y)
      && p.y <= a.y.max(b.y)
    {
      return true;
    }
    if (a.y > p.y) != (b.y > p.y) {
      let t = (p.y - a.y) as f64 / (b.y - a.y) as f64;
      let x = a.x as f64 + t * (b.x - a.x) as f64;
      if x > p.x as f64 {
        inside = !inside;
      }
    }
  }
  inside
}

/// Min-heap entry ordered by cost + Euclidean heuristic to the goal.
struct HeapEntry {
  point: Point,
  priority: f64,
}

impl HeapEntry {
  fn new(point: Point, cost: i64, goal: Point) -> Self {
    Self {
      point,
      priority: cost as f64 + point.l2_distance(goal),
    }
  }
}

impl PartialEq for HeapEntry {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority
  }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for HeapEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    // reversed: BinaryHeap is a max-heap, we want the cheapest first
    other
      .priority
      .partial_cmp(&self.priority)
      .unwrap_or(Ordering::Equal)
  }
}

#[cfg(test)]
#[path = "routing_test.rs"]
mod routing_test;
