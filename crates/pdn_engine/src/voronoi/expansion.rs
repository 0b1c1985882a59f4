//! Step E: initial power-plane point expansion.
//!
//! A segment whose Thales disc (the disc with the segment as diameter)
//! contains a foreign POI would hand part of its corridor to that signal in
//! the Voronoi diagram. Splitting the segment at the projection of the
//! offender adds a same-signal generator there and shrinks both discs. The
//! fixpoint guarantees no foreign POI sits strictly inside any surviving
//! segment's disc.

use std::collections::HashSet;

use glam::DVec2;

use crate::error::Result;
use crate::geometry::fpoint::{in_thales_disc, nearest_free_grid_point, project_onto_line};
use crate::geometry::{OrderedSegment, Point};
use crate::signal::SignalType;

use super::routing::{fix_repeated_points, fix_repeated_segments};
use super::VoronoiPdnGen;

impl VoronoiPdnGen {
  pub fn expand_power_plane_points(&mut self, layer: usize) -> Result<()> {
    let mut all_points: HashSet<Point> = self.points_of_layers[layer]
      .values()
      .flatten()
      .copied()
      .collect();

    // pull every offending segment out of the book onto the work stack
    let mut to_fix: Vec<(OrderedSegment, SignalType)> = Vec::new();
    {
      let points = &self.points_of_layers[layer];
      for (&sig, segments) in self.segments_of_layers[layer].iter_mut() {
        segments.retain(|&s| {
          if s.length_squared() <= 2 {
            return true;
          }
          let offending = points.iter().any(|(&other, pts)| {
            other != sig
              && pts
                .iter()
                .any(|p| in_thales_disc(s.low().to_dvec2(), s.high().to_dvec2(), p.to_dvec2()))
          });
          if offending {
            to_fix.push((s, sig));
          }
          !offending
        });
      }
    }

    while let Some((seg, sig)) = to_fix.pop() {
      let a = seg.low().to_dvec2();
      let b = seg.high().to_dvec2();

      let offender: Option<Point> = self.points_of_layers[layer]
        .iter()
        .filter(|(&other, _)| other != sig)
        .flat_map(|(_, pts)| pts.iter().copied())
        .find(|p| in_thales_disc(a, b, p.to_dvec2()));

      match offender {
        Some(p) => {
          let projection = project_onto_line(a, b, p.to_dvec2());
          let snapped = nearest_free_grid_point(projection, |q| all_points.contains(&q));
          if snapped == seg.low() || snapped == seg.high() {
            // nowhere left to split; keep the segment to preserve the tree
            self.segments_of_layers[layer].entry(sig).or_default().push(seg);
            continue;
          }

          self.points_of_layers[layer].entry(sig).or_default().push(snapped);
          all_points.insert(snapped);

          let s1 = OrderedSegment::new(seg.low(), snapped);
          let s2 = OrderedSegment::new(snapped, seg.high());
          if s1.length_squared() > 0 {
            to_fix.push((s1, sig));
          }
          if s2.length_squared() > 0 {
            to_fix.push((s2, sig));
          }
        }
        None => {
          self.segments_of_layers[layer].entry(sig).or_default().push(seg);
        }
      }
    }

    fix_repeated_points(&mut self.points_of_layers[layer])?;
    fix_repeated_segments(&mut self.segments_of_layers[layer])?;
    Ok(())
  }

  /// Fixpoint check used by the property tests: no surviving segment of any
  /// signal keeps a foreign POI strictly inside its Thales disc, ignoring
  /// segments at or below the splitting floor.
  pub fn expansion_at_fixpoint(&self, layer: usize) -> bool {
    for (&sig, segments) in &self.segments_of_layers[layer] {
      for &s in segments {
        if s.length_squared() <= 2 {
          continue;
        }
        let centre = (s.low().to_dvec2() + s.high().to_dvec2()) * 0.5;
        let radius_sq = s.low().to_dvec2().distance_squared(s.high().to_dvec2()) * 0.25;
        for (&other, pts) in &self.points_of_layers[layer] {
          if other == sig {
            continue;
          }
          if pts
            .iter()
            .any(|p| DVec2::distance_squared(p.to_dvec2(), centre) < radius_sq)
          {
            return false;
          }
        }
      }
    }
    true
  }
}
