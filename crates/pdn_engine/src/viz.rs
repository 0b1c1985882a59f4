//! Visualiser emitters.
//!
//! Line-oriented text dumps consumed by the external render scripts. Every
//! format leads with a banner line and a count/dimension header; records
//! follow one per line. Byte layouts are structural, not exact.

use std::io::Write;
use std::path::Path;

use crate::canvas::Canvas;
use crate::diffusion::{CellKind, DiffusionEngine};
use crate::error::{EngineError, Result};
use crate::voronoi::VoronoiPdnGen;

fn open(path: &Path) -> Result<std::io::BufWriter<std::fs::File>> {
  let file = std::fs::File::create(path).map_err(|e| EngineError::io(path, e))?;
  Ok(std::io::BufWriter::new(file))
}

fn emit(out: &mut impl Write, path: &Path, text: String) -> Result<()> {
  out
    .write_all(text.as_bytes())
    .map_err(|e| EngineError::io(path, e))
}

/// Grid canvas dump: `GRID VISUALISATION`, dimensions, one record per cell.
pub fn visualise_grid_array(canvas: &Canvas, path: impl AsRef<Path>) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "GRID VISUALISATION\n".into())?;
  emit(&mut out, path, format!("{} {}\n", canvas.width(), canvas.height()))?;
  for y in 0..canvas.height() {
    for x in 0..canvas.width() {
      emit(&mut out, path, format!("{x} {y} {}\n", canvas.get(x, y)))?;
    }
  }
  Ok(())
}

/// Grid canvas plus one pin canvas (bump-connected layers).
pub fn visualise_grid_array_with_pin(
  grid: &Canvas,
  pins: &Canvas,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "GRID_PIN VISUALISATION\n".into())?;
  emit(
    &mut out,
    path,
    format!("{} {} {} {}\n", grid.width(), grid.height(), pins.width(), pins.height()),
  )?;
  for y in 0..grid.height() {
    for x in 0..grid.width() {
      emit(&mut out, path, format!("G {x} {y} {}\n", grid.get(x, y)))?;
    }
  }
  for y in 0..pins.height() {
    for x in 0..pins.width() {
      emit(&mut out, path, format!("P {x} {y} {}\n", pins.get(x, y)))?;
    }
  }
  Ok(())
}

/// Grid canvas with the pin canvases above and below (mid layers).
pub fn visualise_grid_array_with_pins(
  grid: &Canvas,
  up_pins: &Canvas,
  down_pins: &Canvas,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "PIN_GRID_PIN VISUALISATION\n".into())?;
  emit(
    &mut out,
    path,
    format!("{} {} {} {}\n", grid.width(), grid.height(), up_pins.width(), up_pins.height()),
  )?;
  for y in 0..up_pins.height() {
    for x in 0..up_pins.width() {
      emit(&mut out, path, format!("U {x} {y} {}\n", up_pins.get(x, y)))?;
    }
  }
  for y in 0..grid.height() {
    for x in 0..grid.width() {
      emit(&mut out, path, format!("G {x} {y} {}\n", grid.get(x, y)))?;
    }
  }
  for y in 0..down_pins.height() {
    for x in 0..down_pins.width() {
      emit(&mut out, path, format!("D {x} {y} {}\n", down_pins.get(x, y)))?;
    }
  }
  Ok(())
}

/// POIs and segments of one layer of the Voronoi pipeline.
pub fn visualise_points_segments(
  gen: &VoronoiPdnGen,
  layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "VORONOI_POINTS_SEGMENTS\n".into())?;

  let points = &gen.points_of_layers[layer];
  let segments = &gen.segments_of_layers[layer];
  let point_count: usize = points.values().map(Vec::len).sum();
  let segment_count: usize = segments.values().map(Vec::len).sum();
  emit(&mut out, path, format!("{point_count} {segment_count}\n"))?;

  for (sig, pts) in points {
    for p in pts {
      emit(&mut out, path, format!("P {} {} {sig}\n", p.x, p.y))?;
    }
  }
  for (sig, segs) in segments {
    for s in segs {
      emit(
        &mut out,
        path,
        format!("S {} {} {} {} {sig}\n", s.low().x, s.low().y, s.high().x, s.high().y),
      )?;
    }
  }
  Ok(())
}

/// Voronoi cell windings of one layer.
pub fn visualise_voronoi_polygons(
  gen: &VoronoiPdnGen,
  layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "VORONOI_POLYGON\n".into())?;
  let cells = &gen.voronoi_cells_of_layers[layer];
  emit(&mut out, path, format!("{}\n", cells.len()))?;
  let mut sites: Vec<_> = cells.keys().copied().collect();
  sites.sort();
  for site in sites {
    let winding = &cells[&site];
    let mut line = format!("{} {} {}", site.x, site.y, winding.len());
    for v in winding {
      line.push_str(&format!(" {:.4} {:.4}", v.x, v.y));
    }
    line.push('\n');
    emit(&mut out, path, line)?;
  }
  Ok(())
}

/// Per-label pressure field of one metal layer after particle diffusion.
pub fn visualise_pressure_simulator(
  engine: &DiffusionEngine,
  layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "PRESSURE_SIMULATOR VISUALISATION\n".into())?;

  let canvas = engine.metal_canvas_view(layer);
  emit(&mut out, path, format!("{} {} {}\n", layer, canvas.width(), canvas.height()))?;
  for y in 0..canvas.height() {
    for x in 0..canvas.width() {
      let idx = engine.metal_idx(layer, y, x);
      let at = crate::diffusion::CellRef::Metal(idx);
      match engine.dominant_pressure(at) {
        Some((label, particles)) => {
          let signal = engine.label_signals[label as usize];
          emit(&mut out, path, format!("{x} {y} {label} {signal} {particles}\n"))?;
        }
        None => emit(&mut out, path, format!("{x} {y} 0 EMPTY 0\n"))?,
      }
    }
  }
  Ok(())
}

/// Metal-cell dump of one layer of the diffusion engine.
pub fn visualise_diffusion_metal(
  engine: &DiffusionEngine,
  layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "DiffusionEngineMetal VISUALISATION\n".into())?;

  let canvas = engine.metal_canvas_view(layer);
  emit(&mut out, path, format!("{} {} {}\n", layer, canvas.width(), canvas.height()))?;
  for y in 0..canvas.height() {
    for x in 0..canvas.width() {
      let idx = engine.metal_idx(layer, y, x);
      let cell = &engine.metal_grid[idx];
      let label = engine.metal_labels[idx];
      emit(
        &mut out,
        path,
        format!("{x} {y} {:?} {} {label}\n", cell.state.kind, cell.state.signal),
      )?;
    }
  }
  Ok(())
}

/// Via-cell dump of one via layer.
pub fn visualise_diffusion_via(
  engine: &DiffusionEngine,
  layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "DiffusionEngineVia VISUALISATION\n".into())?;

  let begin = engine.via_idx_begin(layer);
  let end = engine.via_idx_end(layer);
  emit(&mut out, path, format!("{} {}\n", layer, end - begin))?;
  for v in begin..end {
    let cell = &engine.via_grid[v];
    emit(
      &mut out,
      path,
      format!(
        "{} {} {:?} {} {}\n",
        cell.x, cell.y, cell.state.kind, cell.state.signal, engine.via_labels[v]
      ),
    )?;
  }
  Ok(())
}

/// Combined metal + via dump around one metal layer.
pub fn visualise_diffusion_metal_and_via(
  engine: &DiffusionEngine,
  metal_layer: usize,
  via_layer: usize,
  path: impl AsRef<Path>,
) -> Result<()> {
  let path = path.as_ref();
  let mut out = open(path)?;
  emit(&mut out, path, "DiffusionEngineMetalAndVia VISUALISATION\n".into())?;

  let canvas = engine.metal_canvas_view(metal_layer);
  let begin = engine.via_idx_begin(via_layer);
  let end = engine.via_idx_end(via_layer);
  emit(
    &mut out,
    path,
    format!("{} {} {} {}\n", canvas.width(), canvas.height(), via_layer, end - begin),
  )?;
  for y in 0..canvas.height() {
    for x in 0..canvas.width() {
      let idx = engine.metal_idx(metal_layer, y, x);
      let cell = &engine.metal_grid[idx];
      if cell.state.kind != CellKind::Empty {
        emit(&mut out, path, format!("M {x} {y} {}\n", cell.state.signal))?;
      }
    }
  }
  for v in begin..end {
    let cell = &engine.via_grid[v];
    if cell.state.kind != CellKind::Empty {
      emit(&mut out, path, format!("V {} {} {}\n", cell.x, cell.y, cell.state.signal))?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use crate::pdn::PdnSubstrate;
  use crate::signal::SignalType;

  use super::*;

  #[test]
  fn test_grid_dump_has_header_and_records() {
    let mut canvas = Canvas::new(2, 2);
    canvas.set(1, 1, SignalType::Power(1));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.txt");
    visualise_grid_array(&canvas, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("GRID VISUALISATION"));
    assert_eq!(lines.next(), Some("2 2"));
    assert_eq!(lines.count(), 4);
    assert!(text.contains("1 1 POWER_1"));
  }

  #[test]
  fn test_points_segments_dump_counts() {
    let mut g = VoronoiPdnGen::new(PdnSubstrate::new_empty(8, 8, 2));
    g.mark_preplaced_and_insert_pads();
    g.points_of_layers[0].insert(
      SignalType::Power(1),
      vec![crate::geometry::Point::new(1, 1), crate::geometry::Point::new(5, 5)],
    );
    g.run_mst_routing(0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ps.txt");
    visualise_points_segments(&g, 0, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("VORONOI_POINTS_SEGMENTS\n2 1\n"));
  }

  #[test]
  fn test_diffusion_metal_dump() {
    let mut e = DiffusionEngine::new(
      PdnSubstrate::new_empty(3, 3, 2),
      crate::diffusion::DiffusionConfig::default(),
    );
    e.build_substrate();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metal.txt");
    visualise_diffusion_metal(&e, 0, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("DiffusionEngineMetal VISUALISATION\n"));
    // 9 cells, one record each
    assert_eq!(text.lines().count(), 2 + 9);
  }
}
