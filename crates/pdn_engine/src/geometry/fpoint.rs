//! `f64` point helpers for the Voronoi steps.
//!
//! The pipelines deal in [`glam::DVec2`] directly; this module only adds the
//! couple of constructions the integer kernel cannot express.

use glam::DVec2;

use super::Point;

/// Projection of `p` onto the infinite line through `a` and `b`.
///
/// Returns the projected point; callers clamp the parameter themselves when
/// they need to stay inside the segment.
pub fn project_onto_line(a: DVec2, b: DVec2, p: DVec2) -> DVec2 {
  let ab = b - a;
  let denom = ab.length_squared();
  if denom == 0.0 {
    return a;
  }
  let t = (p - a).dot(ab) / denom;
  a + ab * t
}

/// True if `p` lies inside the closed disc whose diameter is `a`-`b`
/// (the Thales disc of the segment).
#[inline]
pub fn in_thales_disc(a: DVec2, b: DVec2, p: DVec2) -> bool {
  let centre = (a + b) * 0.5;
  let radius_sq = a.distance_squared(b) * 0.25;
  p.distance_squared(centre) <= radius_sq
}

/// Nearest grid point to `p` in diamond (L1-ring) search order that is not
/// already present in `occupied`. Falls back to the plain rounding when the
/// search radius is exhausted.
pub fn nearest_free_grid_point<F>(p: DVec2, mut occupied: F) -> Point
where
  F: FnMut(Point) -> bool,
{
  const MAX_RADIUS: i32 = 50;

  let px = p.x.round() as i32;
  let py = p.y.round() as i32;

  for r in 0..MAX_RADIUS {
    for dx in -r..=r {
      let dy = r - dx.abs();
      for sign in [-1, 1] {
        let cand = Point::new(px + dx, py + sign * dy);
        if !occupied(cand) {
          return cand;
        }
      }
      if dy == 0 {
        let cand = Point::new(px + dx, py);
        if !occupied(cand) {
          return cand;
        }
      }
    }
  }

  Point::new(px, py)
}

#[cfg(test)]
#[path = "fpoint_test.rs"]
mod fpoint_test;
