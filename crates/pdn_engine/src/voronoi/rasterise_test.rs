use crate::geometry::Point;
use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

use super::super::VoronoiPdnGen;

#[test]
fn test_two_sites_paint_their_halves() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(10, 10, 2));
  g.mark_preplaced_and_insert_pads();
  g.points_of_layers[0].insert(SignalType::Power(1), vec![Point::new(2, 5)]);
  g.points_of_layers[0].insert(SignalType::Power(2), vec![Point::new(8, 5)]);

  g.generate_voronoi_diagram(0);
  g.rasterise_layer(0);

  let canvas = &g.substrate().metal_layers[0];
  assert_eq!(canvas.get(0, 5), SignalType::Power(1));
  assert_eq!(canvas.get(9, 5), SignalType::Power(2));
  // every cell got painted
  for y in 0..10 {
    for x in 0..10 {
      assert_ne!(canvas.get(x, y), SignalType::Empty);
    }
  }
}

#[test]
fn test_preplaced_cells_keep_signal() {
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(10, 10, 2));
  g.substrate_mut().metal_layers[0].set(9, 9, SignalType::Power(3));
  g.mark_preplaced_and_insert_pads();
  g.points_of_layers[0].insert(SignalType::Power(1), vec![Point::new(1, 1)]);

  g.generate_voronoi_diagram(0);
  g.rasterise_layer(0);

  assert_eq!(g.substrate().metal_layers[0].get(9, 9), SignalType::Power(3));
  assert_eq!(g.substrate().metal_layers[0].get(0, 0), SignalType::Power(1));
}

#[test]
fn test_single_signal_floods_everything() {
  // one signal covering every bump rasterises to that signal everywhere
  let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(6, 6, 2));
  g.mark_preplaced_and_insert_pads();
  g.points_of_layers[0].insert(
    SignalType::Power(1),
    vec![Point::new(1, 1), Point::new(5, 5), Point::new(1, 5), Point::new(5, 1)],
  );
  g.generate_voronoi_diagram(0);
  g.rasterise_layer(0);
  for y in 0..6 {
    for x in 0..6 {
      assert_eq!(g.substrate().metal_layers[0].get(x, y), SignalType::Power(1));
    }
  }
}
