use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

use super::super::engine::{DiffusionConfig, DiffusionEngine};
use super::*;

fn seeded_engine() -> DiffusionEngine {
  let mut e = DiffusionEngine::new(PdnSubstrate::new_empty(6, 6, 2), DiffusionConfig::default());
  // one POWER_1 bar and one POWER_2 cell, far apart
  for x in 0..3 {
    e.substrate.metal_layers[0].set(x, 0, SignalType::Power(1));
  }
  e.substrate.metal_layers[1].set(5, 5, SignalType::Power(2));
  // skip the enclosed-fill and half-occupied promotion so the components
  // stay exactly the painted cells
  e.initialise_graph_with_preplaced();
  e.link_neighbors();
  e.initialise_indexing();
  e
}

#[test]
fn test_seeding_charges_labelled_cells() {
  let mut e = seeded_engine();
  e.place_diffusion_particles();

  let totals = e.particle_totals();
  // three POWER_1 cells, one POWER_2 cell
  let p1_label = e.signal_labels[&SignalType::Power(1)][0];
  let p2_label = e.signal_labels[&SignalType::Power(2)][0];
  assert_eq!(totals[&p1_label], 3 * PARTICLE_SEED as i64);
  assert_eq!(totals[&p2_label], PARTICLE_SEED as i64);
}

#[test]
fn test_diffusion_conserves_particles() {
  let mut e = seeded_engine();
  e.place_diffusion_particles();
  let before = e.particle_totals();

  for _ in 0..5 {
    e.diffuse(0.25);
    e.commit_particles();
  }
  let after = e.particle_totals();
  assert_eq!(before, after);
}

#[test]
fn test_diffusion_reaches_empty_neighbours() {
  let mut e = seeded_engine();
  e.run_diffusion(0.5, 3);

  // the empty cell right of the POWER_1 bar holds POWER_1 pressure
  let p1_label = e.signal_labels[&SignalType::Power(1)][0];
  let beside = crate::diffusion::CellRef::Metal(e.metal_idx(0, 0, 3));
  let dominant = e.dominant_pressure(beside);
  assert_eq!(dominant.map(|(label, _)| label), Some(p1_label));
}

#[test]
fn test_unseeded_engine_has_no_pressure() {
  let mut e = DiffusionEngine::new(PdnSubstrate::new_empty(4, 4, 2), DiffusionConfig::default());
  e.build_substrate();
  e.run_diffusion(0.5, 2);
  assert!(e.particle_totals().is_empty());

  let cell = crate::diffusion::CellRef::Metal(0);
  assert_eq!(e.dominant_pressure(cell), None);
  assert!(e.is_open_chamber(cell));
}
