//! Benchmarks for substrate labelling and canvas rasterisation.

use criterion::{criterion_group, criterion_main, Criterion};

use pdn_engine::diffusion::{DiffusionConfig, DiffusionEngine};
use pdn_engine::geometry::Point;
use pdn_engine::pdn::PdnSubstrate;
use pdn_engine::signal::SignalType;
use pdn_engine::voronoi::VoronoiPdnGen;

fn checkerboard_substrate(grid: usize) -> PdnSubstrate {
  let mut sub = PdnSubstrate::new_empty(grid, grid, 3);
  for layer in 0..3 {
    for y in 0..grid {
      for x in 0..grid {
        if (x / 4 + y / 4) % 2 == 0 {
          let sig = SignalType::Power(((x / 8 + y / 8) % 4 + 1) as u8);
          sub.metal_layers[layer].set(x, y, sig);
        }
      }
    }
  }
  sub
}

fn bench_labelling(c: &mut Criterion) {
  c.bench_function("initialise_indexing_64", |b| {
    b.iter_with_setup(
      || {
        let mut engine =
          DiffusionEngine::new(checkerboard_substrate(64), DiffusionConfig::default());
        engine.initialise_graph_with_preplaced();
        engine.link_neighbors();
        engine
      },
      |mut engine| engine.initialise_indexing(),
    )
  });
}

fn bench_rasterise(c: &mut Criterion) {
  c.bench_function("voronoi_rasterise_32", |b| {
    b.iter_with_setup(
      || {
        let mut gen = VoronoiPdnGen::new(PdnSubstrate::new_empty(32, 32, 2));
        gen.mark_preplaced_and_insert_pads();
        for (i, sig) in [SignalType::Power(1), SignalType::Power(2), SignalType::Power(3)]
          .into_iter()
          .enumerate()
        {
          gen.points_of_layers[0].insert(
            sig,
            vec![
              Point::new(4 + 8 * i as i32, 5),
              Point::new(4 + 8 * i as i32, 27),
            ],
          );
        }
        gen.generate_voronoi_diagram(0);
        gen
      },
      |mut gen| gen.rasterise_layer(0),
    )
  });
}

criterion_group!(benches, bench_labelling, bench_rasterise);
criterion_main!(benches);
