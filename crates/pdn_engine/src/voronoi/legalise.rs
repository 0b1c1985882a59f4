//! Steps H and I: obstacle-aware legalisation and floating-region
//! reconnection. Both run on exact integer regions of the canvas.

use std::collections::HashMap;

use tracing::debug;

use crate::pdn::collect_signal_polygons;
use crate::signal::SignalType;

use super::VoronoiPdnGen;

impl VoronoiPdnGen {
  /// Step H: per signal, keep the largest fragment; erase every other
  /// fragment that does not cover a preplaced cell of the signal.
  pub fn legalise_layer(&mut self, layer: usize) {
    let polygons = collect_signal_polygons(&self.substrate().metal_layers[layer]);

    for (sig, set) in polygons {
      if !sig.is_power() {
        continue;
      }
      let fragments = set.fragments();
      if fragments.len() <= 1 {
        continue;
      }
      for frag in &fragments[1..] {
        let covers_preplaced = frag.cells().any(|c| {
          self.preplace_of_layers[layer].get_point(c) != SignalType::Empty
        });
        if covers_preplaced {
          continue;
        }
        debug!(layer, signal = %sig, area = frag.area(), "erasing fragment");
        for c in frag.cells() {
          self.substrate_mut().metal_layers[layer].set_point(c, SignalType::Empty);
        }
      }
    }
  }

  /// Step I: paint each empty fragment with the unique plurality signal of
  /// its border cells. Obstacles and still-empty borders do not vote; a
  /// tied vote leaves the fragment alone.
  pub fn reconnect_floating_regions(&mut self, layer: usize) {
    let polygons = collect_signal_polygons(&self.substrate().metal_layers[layer]);
    let Some(empties) = polygons.get(&SignalType::Empty) else {
      return;
    };

    let mut paint_jobs: Vec<(Vec<crate::geometry::Point>, SignalType)> = Vec::new();

    for frag in empties.fragments() {
      let mut poll: HashMap<SignalType, usize> = HashMap::new();
      for c in frag.cells() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
          let (nx, ny) = (c.x + dx, c.y + dy);
          if !self.substrate().metal_layers[layer].in_bounds(nx, ny) {
            continue;
          }
          let sig = self.substrate().metal_layers[layer].get(nx as usize, ny as usize);
          match sig {
            SignalType::Empty | SignalType::Obstacle | SignalType::Signal | SignalType::Ground => {}
            other => {
              *poll.entry(other).or_insert(0) += 1;
            }
          }
        }
      }
      if poll.is_empty() {
        continue;
      }

      let max_votes = poll.values().copied().max().unwrap_or(0);
      let winners: Vec<SignalType> = poll
        .iter()
        .filter(|(_, &v)| v == max_votes)
        .map(|(&s, _)| s)
        .collect();
      if winners.len() != 1 {
        continue;
      }

      paint_jobs.push((frag.cells().collect(), winners[0]));
    }

    for (cells, sig) in paint_jobs {
      debug!(layer, signal = %sig, area = cells.len(), "reconnecting empty fragment");
      for c in cells {
        self.substrate_mut().metal_layers[layer].set_point(c, sig);
      }
    }
  }
}

#[cfg(test)]
#[path = "legalise_test.rs"]
mod legalise_test;
