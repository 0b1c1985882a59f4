use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

use super::super::VoronoiPdnGen;

fn empty_gen(grid: usize) -> VoronoiPdnGen {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(grid, grid, 2));
  g.mark_preplaced_and_insert_pads();
  g
}

#[test]
fn test_legalise_erases_unanchored_fragment() {
  let mut g = empty_gen(10);
  // main region
  for x in 0..5 {
    g.substrate_mut().metal_layers[0].set(x, 0, SignalType::Power(1));
  }
  // small detached fragment without preplaced coverage
  g.substrate_mut().metal_layers[0].set(9, 9, SignalType::Power(1));

  g.legalise_layer(0);
  assert_eq!(g.substrate().metal_layers[0].get(9, 9), SignalType::Empty);
  assert_eq!(g.substrate().metal_layers[0].get(0, 0), SignalType::Power(1));
}

#[test]
fn test_legalise_keeps_preplaced_fragment() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(10, 10, 2));
  // the detached cell is preplaced, so it must survive
  g.substrate_mut().metal_layers[0].set(9, 9, SignalType::Power(1));
  g.mark_preplaced_and_insert_pads();
  for x in 0..5 {
    g.substrate_mut().metal_layers[0].set(x, 0, SignalType::Power(1));
  }

  g.legalise_layer(0);
  assert_eq!(g.substrate().metal_layers[0].get(9, 9), SignalType::Power(1));
}

#[test]
fn test_reconnect_paints_enclosed_empty() {
  let mut g = empty_gen(6);
  // ring of POWER_2 around an empty middle
  for y in 1..4 {
    for x in 1..4 {
      g.substrate_mut().metal_layers[0].set(x, y, SignalType::Power(2));
    }
  }
  g.substrate_mut().metal_layers[0].set(2, 2, SignalType::Empty);

  g.reconnect_floating_regions(0);
  assert_eq!(g.substrate().metal_layers[0].get(2, 2), SignalType::Power(2));
}

#[test]
fn test_reconnect_skips_tied_vote() {
  let mut g = empty_gen(4);
  // empty column flanked by equal-weight P1 and P2 walls
  for y in 0..4 {
    g.substrate_mut().metal_layers[0].set(0, y, SignalType::Power(1));
    g.substrate_mut().metal_layers[0].set(2, y, SignalType::Power(2));
  }
  g.reconnect_floating_regions(0);
  // the empty strip between the walls must remain empty on a tie
  for y in 0..4 {
    assert_eq!(g.substrate().metal_layers[0].get(1, y), SignalType::Empty);
  }
}

#[test]
fn test_obstacle_does_not_vote() {
  let mut g = empty_gen(4);
  for y in 0..4 {
    g.substrate_mut().metal_layers[0].set(0, y, SignalType::Obstacle);
    g.substrate_mut().metal_layers[0].set(2, y, SignalType::Power(2));
  }
  g.reconnect_floating_regions(0);
  for y in 0..4 {
    assert_eq!(g.substrate().metal_layers[0].get(1, y), SignalType::Power(2));
  }
}
