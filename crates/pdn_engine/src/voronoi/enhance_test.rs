use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

use super::super::VoronoiPdnGen;

/// Fill one full layer with a signal.
fn flood(g: &mut VoronoiPdnGen, layer: usize, sig: SignalType) {
  let (w, h) = (g.substrate().grid_width(), g.substrate().grid_height());
  for y in 0..h {
    for x in 0..w {
      g.substrate_mut().metal_layers[layer].set(x, y, sig);
    }
  }
}

#[test]
fn test_tagging_matches_stack_depth() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(4, 4, 3));
  g.mark_preplaced_and_insert_pads();
  flood(&mut g, 0, SignalType::Power(1));
  flood(&mut g, 1, SignalType::Power(1));
  flood(&mut g, 2, SignalType::Power(1));

  assert!(g.tag_cell(1, 2, 2).is_stacked());

  flood(&mut g, 2, SignalType::Power(2));
  assert!(g.tag_cell(0, 2, 2).is_hard());
  assert!(g.tag_cell(2, 2, 2).is_soft());
}

#[test]
fn test_preplaced_tag_wins() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(4, 4, 2));
  g.substrate_mut().metal_layers[0].set(1, 1, SignalType::Power(3));
  g.mark_preplaced_and_insert_pads();
  assert!(g.tag_cell(0, 1, 1).is_preplaced());
}

#[test]
fn test_enhance_trades_toward_minority_signal() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(4, 4, 2));
  g.mark_preplaced_and_insert_pads();
  // layer 0 all P1 (16 cells), layer 1 all P2 (16 cells), then tilt the
  // balance so P1 is the global majority
  flood(&mut g, 0, SignalType::Power(1));
  flood(&mut g, 1, SignalType::Power(2));
  for y in 0..4 {
    g.substrate_mut().metal_layers[1].set(0, y, SignalType::Power(1));
  }

  g.enhance_cross_layer();

  // trading may only move cells between the existing signals
  for layer in 0..2 {
    for y in 0..4 {
      for x in 0..4 {
        let sig = g.substrate().metal_layers[layer].get(x, y);
        assert!(sig == SignalType::Power(1) || sig == SignalType::Power(2));
      }
    }
  }
}

#[test]
fn test_enhance_never_touches_preplaced() {
  // a preplaced POWER_3 block on layer 1 only:
  // enhancement must not trade it away
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(16, 16, 2));
  for y in 10..14 {
    for x in 10..14 {
      g.substrate_mut().metal_layers[1].set(x, y, SignalType::Power(3));
      g.substrate_mut().metal_layers[1]
        .preplaced
        .entry(SignalType::Power(3))
        .or_default()
        .push(crate::geometry::Point::new(x as i32, y as i32));
    }
  }
  g.mark_preplaced_and_insert_pads();
  flood(&mut g, 0, SignalType::Power(1));
  // surround the preplaced block with P1 on its own layer
  for y in 0..16 {
    for x in 0..16 {
      if g.substrate().metal_layers[1].get(x, y) == SignalType::Empty {
        g.substrate_mut().metal_layers[1].set(x, y, SignalType::Power(1));
      }
    }
  }

  g.enhance_cross_layer();

  for y in 10..14 {
    for x in 10..14 {
      assert_eq!(g.substrate().metal_layers[1].get(x, y), SignalType::Power(3));
    }
  }
}
