//! Step J: cross-layer power-integrity enhancement.
//!
//! Cells are tagged by how deep their signal stacks vertically:
//! `Preplaced` (fixed by input), `Stacked` (>= 3 layers), `Hard` (exactly
//! 2), `Soft` (1). Between adjacent layers, vertically disagreeing cells
//! trade: the layer whose signal holds more cells globally donates the
//! cell, provided removal does not disconnect the donor region. The
//! disconnection guard is a 4-neighbour articulation test on the canvas.

use std::collections::HashMap;

use tracing::debug;

use crate::signal::SignalType;

use super::VoronoiPdnGen;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlaneTag {
  Preplaced,
  Stacked,
  Hard,
  Soft,
}

impl VoronoiPdnGen {
  pub fn enhance_cross_layer(&mut self) {
    let layers = self.substrate().metal_layer_count();
    let w = self.substrate().grid_width();
    let h = self.substrate().grid_height();

    let mut marking = vec![vec![PlaneTag::Soft; w * h]; layers];
    for layer in 0..layers {
      for y in 0..h {
        for x in 0..w {
          marking[layer][y * w + x] = self.tag_cell_inner(layer, x, y);
        }
      }
    }

    let mut total_count: HashMap<SignalType, i64> = HashMap::new();
    for layer in 0..layers {
      for y in 0..h {
        for x in 0..w {
          *total_count
            .entry(self.substrate().metal_layers[layer].get(x, y))
            .or_insert(0) += 1;
        }
      }
    }

    for up in 0..layers - 1 {
      let down = up + 1;
      let mut trades = 0usize;

      for y in 0..h {
        for x in 0..w {
          let sig_up = self.substrate().metal_layers[up].get(x, y);
          let sig_down = self.substrate().metal_layers[down].get(x, y);
          if sig_up == sig_down {
            continue;
          }

          let tag_up = marking[up][y * w + x];
          let tag_down = marking[down][y * w + x];
          let up_donatable = tag_up == PlaneTag::Soft
            && (tag_down == PlaneTag::Soft || tag_down == PlaneTag::Stacked);
          let down_donatable = tag_down == PlaneTag::Soft
            && (tag_up == PlaneTag::Soft || tag_up == PlaneTag::Stacked);
          if !up_donatable && !down_donatable {
            continue;
          }

          let can_take_up = up_donatable && self.removal_safe(up, x, y, sig_up);
          let can_take_down = down_donatable && self.removal_safe(down, x, y, sig_down);
          if !can_take_up && !can_take_down {
            continue;
          }

          if (total_count[&sig_up] > total_count[&sig_down] && can_take_up) || !can_take_down {
            *total_count.entry(sig_up).or_insert(0) -= 1;
            *total_count.entry(sig_down).or_insert(0) += 1;
            self.substrate_mut().metal_layers[up].set(x, y, sig_down);
          } else {
            *total_count.entry(sig_down).or_insert(0) -= 1;
            *total_count.entry(sig_up).or_insert(0) += 1;
            self.substrate_mut().metal_layers[down].set(x, y, sig_up);
          }
          trades += 1;

          // refresh the markings of every layer the vertical runs touch
          for layer in [up, down] {
            marking[layer][y * w + x] = self.tag_cell_inner(layer, x, y);
          }
        }
      }

      debug!(up, down, trades, "cross-layer trading pass");
    }
  }

  /// Vertical-run tag of one cell; the stack-marking tests check this
  /// against the stack counts directly.
  pub(super) fn tag_cell(&self, layer: usize, x: usize, y: usize) -> PlaneTagView {
    PlaneTagView(self.tag_cell_inner(layer, x, y))
  }

  fn tag_cell_inner(&self, layer: usize, x: usize, y: usize) -> PlaneTag {
    if self.preplace_of_layers[layer].get(x, y) != SignalType::Empty {
      return PlaneTag::Preplaced;
    }
    let sig = self.substrate().metal_layers[layer].get(x, y);
    let mut top = layer;
    while top > 0 && self.substrate().metal_layers[top - 1].get(x, y) == sig {
      top -= 1;
    }
    let mut bottom = layer;
    while bottom + 1 < self.substrate().metal_layer_count()
      && self.substrate().metal_layers[bottom + 1].get(x, y) == sig
    {
      bottom += 1;
    }
    match bottom - top + 1 {
      1 => PlaneTag::Soft,
      2 => PlaneTag::Hard,
      _ => PlaneTag::Stacked,
    }
  }

  /// True when erasing `(x, y)` keeps every adjacent same-signal cell of
  /// `layer` mutually connected.
  fn removal_safe(&self, layer: usize, x: usize, y: usize, sig: SignalType) -> bool {
    let canvas = &self.substrate().metal_layers[layer];
    let w = canvas.width() as i32;
    let h = canvas.height() as i32;
    let (xi, yi) = (x as i32, y as i32);

    let mut nbrs: Vec<(i32, i32)> = Vec::with_capacity(4);
    for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
      let (nx, ny) = (xi + dx, yi + dy);
      if nx >= 0 && nx < w && ny >= 0 && ny < h && canvas.get(nx as usize, ny as usize) == sig {
        nbrs.push((nx, ny));
      }
    }
    if nbrs.len() <= 1 {
      return true;
    }

    // BFS from the first neighbour with (x, y) treated as removed
    let mut visited = vec![false; (w * h) as usize];
    let idx = |cx: i32, cy: i32| (cy * w + cx) as usize;
    let mut queue = std::collections::VecDeque::new();
    visited[idx(nbrs[0].0, nbrs[0].1)] = true;
    queue.push_back(nbrs[0]);

    let mut targets: std::collections::HashSet<(i32, i32)> = nbrs[1..].iter().copied().collect();

    while let Some((cx, cy)) = queue.pop_front() {
      if targets.is_empty() {
        break;
      }
      for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        let (nx, ny) = (cx + dx, cy + dy);
        if nx == xi && ny == yi {
          continue;
        }
        if nx >= 0
          && nx < w
          && ny >= 0
          && ny < h
          && !visited[idx(nx, ny)]
          && canvas.get(nx as usize, ny as usize) == sig
        {
          visited[idx(nx, ny)] = true;
          targets.remove(&(nx, ny));
          queue.push_back((nx, ny));
        }
      }
    }
    targets.is_empty()
  }
}

/// Opaque view of the internal plane tag, exposed for the stack-marking
/// tests.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PlaneTagView(PlaneTag);

impl PlaneTagView {
  pub fn is_preplaced(self) -> bool {
    self.0 == PlaneTag::Preplaced
  }
  pub fn is_stacked(self) -> bool {
    self.0 == PlaneTag::Stacked
  }
  pub fn is_hard(self) -> bool {
    self.0 == PlaneTag::Hard
  }
  pub fn is_soft(self) -> bool {
    self.0 == PlaneTag::Soft
  }
}

#[cfg(test)]
#[path = "enhance_test.rs"]
mod enhance_test;
