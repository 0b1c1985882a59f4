//! Step F: the Voronoi diagram over all POIs of a layer.
//!
//! Cells are computed per site by clipping the layer envelope with the
//! perpendicular-bisector half-plane against every other site. Each cell is
//! convex and the cells tile the envelope, which is all the rasteriser
//! relies on. Sites sitting on top of each other were rejected earlier by
//! the duplicate checks.

use std::collections::HashMap;

use glam::DVec2;

use crate::geometry::Point;

use super::VoronoiPdnGen;

/// Clip a convex polygon to the half-plane `{p : n·p <= d}`.
fn clip_half_plane(winding: &[DVec2], n: DVec2, d: f64) -> Vec<DVec2> {
  const EPS: f64 = 1e-9;
  let mut out = Vec::with_capacity(winding.len() + 1);
  let len = winding.len();
  for i in 0..len {
    let a = winding[i];
    let b = winding[(i + 1) % len];
    let da = n.dot(a) - d;
    let db = n.dot(b) - d;
    if da <= EPS {
      out.push(a);
    }
    if (da < -EPS && db > EPS) || (da > EPS && db < -EPS) {
      let t = da / (da - db);
      out.push(a + (b - a) * t);
    }
  }
  out
}

/// Shoelace area of a winding (absolute value).
pub(super) fn winding_area(winding: &[DVec2]) -> f64 {
  let n = winding.len();
  if n < 3 {
    return 0.0;
  }
  let mut acc = 0.0;
  for i in 0..n {
    let a = winding[i];
    let b = winding[(i + 1) % n];
    acc += a.x * b.y - b.x * a.y;
  }
  acc.abs() * 0.5
}

/// The Voronoi cell of `site` within `envelope`, as a convex winding.
pub fn voronoi_cell(site: Point, others: &[Point], envelope: &[DVec2]) -> Vec<DVec2> {
  let s = site.to_dvec2();
  let mut winding = envelope.to_vec();
  for &other in others {
    if other == site {
      continue;
    }
    let o = other.to_dvec2();
    // keep the side closer to `site`: (o-s)·p <= (o-s)·midpoint
    let n = o - s;
    let d = n.dot((s + o) * 0.5);
    winding = clip_half_plane(&winding, n, d);
    if winding.len() < 3 {
      break;
    }
  }
  winding
}

impl VoronoiPdnGen {
  /// Build the Voronoi cells of every POI on `layer`, clipped to the pin
  /// envelope `[0, pin_w-1] x [0, pin_h-1]`.
  pub fn generate_voronoi_diagram(&mut self, layer: usize) {
    let w = (self.substrate().pin_width() - 1) as f64;
    let h = (self.substrate().pin_height() - 1) as f64;
    let envelope = [
      DVec2::new(0.0, 0.0),
      DVec2::new(w, 0.0),
      DVec2::new(w, h),
      DVec2::new(0.0, h),
    ];

    let sites: Vec<Point> = self.points_of_layers[layer]
      .values()
      .flatten()
      .copied()
      .collect();

    let mut cells: HashMap<Point, Vec<DVec2>> = HashMap::with_capacity(sites.len());
    for &site in &sites {
      let winding = voronoi_cell(site, &sites, &envelope);
      if winding.len() >= 3 {
        cells.insert(site, winding);
      }
    }

    self.voronoi_cells_of_layers[layer] = cells;
  }
}

#[cfg(test)]
#[path = "diagram_test.rs"]
mod diagram_test;
