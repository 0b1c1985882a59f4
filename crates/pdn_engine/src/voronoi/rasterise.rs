//! Step G: merge per-signal Voronoi cells and rasterise them to the grid.
//!
//! The merged multi-polygon of a signal is the union of its generators'
//! cells. Since Voronoi cells are disjoint, the intersection area between a
//! unit grid square and that union is the sum of the per-cell intersection
//! areas; no explicit polygon union is needed. Each unassigned grid cell
//! goes to the signal with the largest overlap.

use glam::DVec2;

use crate::signal::SignalType;

use super::diagram::winding_area;
use super::VoronoiPdnGen;

/// Clip a convex winding to the axis-aligned unit square at `(x, y)` and
/// return the remaining area.
fn unit_square_overlap(winding: &[DVec2], x: f64, y: f64) -> f64 {
  let clip = |poly: Vec<DVec2>, keep: &dyn Fn(DVec2) -> f64| -> Vec<DVec2> {
    const EPS: f64 = 1e-9;
    let mut out = Vec::with_capacity(poly.len() + 1);
    let n = poly.len();
    for i in 0..n {
      let a = poly[i];
      let b = poly[(i + 1) % n];
      let da = keep(a);
      let db = keep(b);
      if da >= -EPS {
        out.push(a);
      }
      if (da < -EPS && db > EPS) || (da > EPS && db < -EPS) {
        let t = da / (da - db);
        out.push(a + (b - a) * t);
      }
    }
    out
  };

  let mut poly = winding.to_vec();
  poly = clip(poly, &|p| p.x - x);
  if poly.len() < 3 {
    return 0.0;
  }
  poly = clip(poly, &|p| (x + 1.0) - p.x);
  if poly.len() < 3 {
    return 0.0;
  }
  poly = clip(poly, &|p| p.y - y);
  if poly.len() < 3 {
    return 0.0;
  }
  poly = clip(poly, &|p| (y + 1.0) - p.y);
  if poly.len() < 3 {
    return 0.0;
  }
  winding_area(&poly)
}

impl VoronoiPdnGen {
  /// Paint every still-empty grid cell of `layer` with the signal whose
  /// merged Voronoi region overlaps it the most. Preplaced cells keep
  /// their signal.
  pub fn rasterise_layer(&mut self, layer: usize) {
    let grid_w = self.substrate().grid_width();
    let grid_h = self.substrate().grid_height();

    // per signal, the windings of its generators' cells
    let mut signal_windings: Vec<(SignalType, Vec<&Vec<DVec2>>)> = Vec::new();
    for (&sig, points) in &self.points_of_layers[layer] {
      let windings: Vec<&Vec<DVec2>> = points
        .iter()
        .filter_map(|p| self.voronoi_cells_of_layers[layer].get(p))
        .collect();
      if !windings.is_empty() {
        signal_windings.push((sig, windings));
      }
    }
    if signal_windings.is_empty() {
      return;
    }

    let mut paint: Vec<(usize, usize, SignalType)> = Vec::new();
    for j in 0..grid_h {
      for i in 0..grid_w {
        if self.substrate().metal_layers[layer].get(i, j) != SignalType::Empty {
          continue;
        }
        let mut best = SignalType::Empty;
        let mut best_area = f64::MIN;
        for (sig, windings) in &signal_windings {
          let area: f64 = windings
            .iter()
            .map(|w| unit_square_overlap(w, i as f64, j as f64))
            .sum();
          if area > best_area {
            best_area = area;
            best = *sig;
          }
        }
        paint.push((i, j, best));
      }
    }

    for (i, j, sig) in paint {
      self.substrate_mut().metal_layers[layer].set(i, j, sig);
    }
  }
}

#[cfg(test)]
#[path = "rasterise_test.rs"]
mod rasterise_test;
