//! Steps A and B: per-layer points of interest and cross-layer connection.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use glam::DVec2;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::geometry::Point;
use crate::signal::SignalType;

use super::VoronoiPdnGen;

impl VoronoiPdnGen {
  /// Step A: collect the per-signal POI sets of every layer.
  ///
  /// POIs of a layer are the power pins of the adjacent bump/via canvases
  /// plus the four corners of each preplaced power cell on the layer
  /// itself. The same point claimed by two different signals is a fatal
  /// input contract violation.
  pub fn init_points_and_segments(&mut self) -> Result<()> {
    let top = self.substrate().ubump_connected_layer();
    let bottom = self.substrate().c4_connected_layer();

    for layer in top..=bottom {
      let mut gathered: BTreeMap<SignalType, BTreeSet<Point>> = BTreeMap::new();

      // pins of the bump side this layer touches
      if layer == top {
        for (&sig, cords) in &self.substrate().ubump.signal_cords {
          if sig.is_power() {
            gathered.entry(sig).or_default().extend(cords.iter().copied());
          }
        }
      }
      if layer == bottom {
        for (&sig, cords) in &self.substrate().c4.signal_cords {
          if sig.is_power() {
            gathered.entry(sig).or_default().extend(cords.iter().copied());
          }
        }
      }

      // preplaced vias above and below
      if layer > top {
        gather_via_points(&self.substrate().via_layers[layer - 1].preplaced, &mut gathered);
      }
      if layer < bottom {
        gather_via_points(&self.substrate().via_layers[layer].preplaced, &mut gathered);
      }

      // corners of preplaced power cells on the layer itself
      for (&sig, cords) in &self.substrate().metal_layers[layer].preplaced {
        if !sig.is_power() {
          continue;
        }
        let entry = gathered.entry(sig).or_default();
        for c in cords {
          entry.insert(*c);
          entry.insert(Point::new(c.x + 1, c.y));
          entry.insert(Point::new(c.x, c.y + 1));
          entry.insert(Point::new(c.x + 1, c.y + 1));
        }
      }

      // cross-signal duplicates are fatal
      let mut seen: HashMap<Point, SignalType> = HashMap::new();
      for (&sig, points) in &gathered {
        for &p in points {
          if let Some(&other) = seen.get(&p) {
            if other != sig {
              return Err(EngineError::InputContract(format!(
                "point of interest {p} on layer {layer} claimed by {other} and {sig}"
              )));
            }
          }
          seen.insert(p, sig);
        }
      }

      let book = &mut self.points_of_layers[layer];
      book.clear();
      self.segments_of_layers[layer].clear();
      for (sig, points) in gathered {
        if points.is_empty() {
          continue;
        }
        book.insert(sig, points.into_iter().collect());
        self.segments_of_layers[layer].insert(sig, Vec::new());
      }
    }

    Ok(())
  }

  /// Step B: for each power signal present on one of the two layers but
  /// lacking a preplaced via between them, pick the empty via site that is
  /// far from competitors and close to the signal's own POIs, and seed it
  /// into both layers.
  pub fn connect_layers(&mut self, up_layer: usize, down_layer: usize) -> Result<()> {
    assert_eq!(down_layer, up_layer + 1);

    let pin_w = self.substrate().pin_width() as i32;
    let pin_h = self.substrate().pin_height() as i32;

    // candidate signals: preplaced on exactly one of the two metal layers,
    // without an existing via of their own between them
    let mut up_signals: BTreeSet<SignalType> = BTreeSet::new();
    let mut down_signals: BTreeSet<SignalType> = BTreeSet::new();
    for (&sig, cords) in &self.substrate().metal_layers[up_layer].preplaced {
      if sig.is_power() && !cords.is_empty() {
        up_signals.insert(sig);
      }
    }
    for (&sig, cords) in &self.substrate().metal_layers[down_layer].preplaced {
      if sig.is_power() && !cords.is_empty() {
        down_signals.insert(sig);
      }
    }

    let candidates: Vec<SignalType> = up_signals
      .symmetric_difference(&down_signals)
      .copied()
      .filter(|sig| {
        self.substrate().via_layers[up_layer]
          .preplaced
          .get(sig)
          .map_or(true, |v| v.is_empty())
      })
      .collect();

    let preplaced_vias: HashSet<Point> = self.substrate().via_layers[up_layer]
      .preplaced
      .values()
      .flatten()
      .copied()
      .collect();

    for sig in candidates {
      let classify = |book: &super::LayerPoints| {
        let mut friendly: Vec<DVec2> = Vec::new();
        let mut competing: Vec<DVec2> = Vec::new();
        let mut occupied: HashSet<Point> = HashSet::new();
        for (&s, points) in book {
          for &p in points {
            occupied.insert(p);
            if s == sig {
              friendly.push(p.to_dvec2());
            } else if s.is_power() {
              competing.push(p.to_dvec2());
            }
          }
        }
        (friendly, competing, occupied)
      };

      let (up_friendly, up_competing, up_occupied) = classify(&self.points_of_layers[up_layer]);
      let (down_friendly, down_competing, down_occupied) =
        classify(&self.points_of_layers[down_layer]);

      // no competitor anywhere: score with the envelope diagonal so the
      // formula still prefers proximity to friends
      let far = ((pin_w * pin_w + pin_h * pin_h) as f64).sqrt();

      let mut best: Option<(f64, Point)> = None;
      for j in 0..pin_h {
        for i in 0..pin_w {
          let p = Point::new(i, j);
          if preplaced_vias.contains(&p) || up_occupied.contains(&p) || down_occupied.contains(&p) {
            continue;
          }
          let at = DVec2::new(i as f64 - 0.5, j as f64 - 0.5);

          let min_dist = |points: &[DVec2], default: f64| {
            points
              .iter()
              .map(|q| at.distance(*q))
              .fold(default, f64::min)
          };

          // a side without the signal exerts no pull
          let up_d = min_dist(&up_friendly, if up_friendly.is_empty() { 0.0 } else { f64::MAX });
          let down_d = min_dist(
            &down_friendly,
            if down_friendly.is_empty() { 0.0 } else { f64::MAX },
          );
          let mut comp_d = far;
          comp_d = comp_d.min(min_dist(&up_competing, far));
          comp_d = comp_d.min(min_dist(&down_competing, far));

          let score = comp_d - up_d.max(down_d);
          if best.map_or(true, |(b, _)| score > b) {
            best = Some((score, p));
          }
        }
      }

      let Some((score, chosen)) = best else {
        return Err(EngineError::InputContract(format!(
          "no empty via site between layers {up_layer} and {down_layer} for {sig}"
        )));
      };
      debug!(%sig, %chosen, score, "cross-layer via seeded");

      self.points_of_layers[up_layer].entry(sig).or_default().push(chosen);
      self.segments_of_layers[up_layer].entry(sig).or_default();
      self.points_of_layers[down_layer].entry(sig).or_default().push(chosen);
      self.segments_of_layers[down_layer].entry(sig).or_default();
    }

    Ok(())
  }
}

fn gather_via_points(
  preplaced: &HashMap<SignalType, Vec<Point>>,
  gathered: &mut BTreeMap<SignalType, BTreeSet<Point>>,
) {
  for (&sig, cords) in preplaced {
    if sig.is_power() {
      gathered.entry(sig).or_default().extend(cords.iter().copied());
    }
  }
}
