//! PDN substrate: metal/via canvases plus both bump sides, loaded from one
//! pinout configuration.
//!
//! The pinout file is the single entry point of a run. It carries the grid
//! dimensions, the preplace includes per layer, the micro-bump chiplet
//! placement and the C4 lattice description:
//!
//! ```text
//! TECHNOLOGY_BEGIN
//!   GRID_WIDTH = 20
//!   GRID_HEIGHT = 20
//!   PIN_WIDTH = 21
//!   PIN_HEIGHT = 21
//!   LAYERS = 3
//! TECHNOLOGY_END
//! PDN_PREPLACE_START
//!   METAL_LAYER 0 "m0.preplace"
//!   VIA_LAYER 0 ""
//! PDN_PREPLACE_END
//! MICROBUMP_START
//!   include "cpu.ballout"
//!   CHIPLET cpu u0 R0 (2, 3)
//! MICROBUMP_END
//! C4_START
//!   C4_WIDTH = 2
//!   ...
//!   include "c4.ballout"
//!   ROTATION R0
//! C4_END
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::bump::{BallOut, C4Bump, C4Layout, MicroBump, Rotation};
use crate::canvas::Canvas;
use crate::error::{EngineError, Result};
use crate::geometry::{Point, PolygonSet};
use crate::signal::{SignalType, POWER_SIGNAL_SET};

#[derive(Clone, Debug)]
pub struct PdnSubstrate {
  grid_width: usize,
  grid_height: usize,
  pin_width: usize,
  pin_height: usize,
  metal_layer_count: usize,
  via_layer_count: usize,

  ubump_connected_layer: usize,
  c4_connected_layer: usize,

  pub ubump: MicroBump,
  pub c4: C4Bump,

  pub metal_layers: Vec<Canvas>,
  pub via_layers: Vec<Canvas>,
}

impl PdnSubstrate {
  #[inline]
  pub fn grid_width(&self) -> usize {
    self.grid_width
  }
  #[inline]
  pub fn grid_height(&self) -> usize {
    self.grid_height
  }
  #[inline]
  pub fn pin_width(&self) -> usize {
    self.pin_width
  }
  #[inline]
  pub fn pin_height(&self) -> usize {
    self.pin_height
  }
  #[inline]
  pub fn metal_layer_count(&self) -> usize {
    self.metal_layer_count
  }
  #[inline]
  pub fn via_layer_count(&self) -> usize {
    self.via_layer_count
  }
  #[inline]
  pub fn ubump_connected_layer(&self) -> usize {
    self.ubump_connected_layer
  }
  #[inline]
  pub fn c4_connected_layer(&self) -> usize {
    self.c4_connected_layer
  }

  /// Bare substrate with empty canvases and no bumps. Pipelines accept it
  /// like a parsed one; callers stamp pads and preplace records directly.
  pub fn new_empty(grid_width: usize, grid_height: usize, metal_layer_count: usize) -> Self {
    let pin_width = grid_width + 1;
    let pin_height = grid_height + 1;
    Self {
      grid_width,
      grid_height,
      pin_width,
      pin_height,
      metal_layer_count,
      via_layer_count: metal_layer_count - 1,
      ubump_connected_layer: 0,
      c4_connected_layer: metal_layer_count - 1,
      ubump: MicroBump::new(pin_width, pin_height),
      c4: C4Bump {
        canvas: Canvas::new(pin_width, pin_height),
        signal_cords: HashMap::new(),
        clusters: Vec::new(),
      },
      metal_layers: vec![Canvas::new(grid_width, grid_height); metal_layer_count],
      via_layers: vec![Canvas::new(pin_width, pin_height); metal_layer_count - 1],
    }
  }

  pub fn from_pinout_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    Self::parse_pinout(&text, path)
  }

  pub fn parse_pinout(text: &str, path: &Path) -> Result<Self> {
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let resolve = |file: &str| -> PathBuf {
      let p = PathBuf::from(file);
      if p.is_absolute() {
        p
      } else {
        base_dir.join(p)
      }
    };

    #[derive(PartialEq)]
    enum Section {
      Preamble,
      Technology,
      Preplace,
      MicroBump,
      C4,
    }

    let mut section = Section::Preamble;

    let mut grid_width: Option<usize> = None;
    let mut grid_height: Option<usize> = None;
    let mut pin_width: Option<usize> = None;
    let mut pin_height: Option<usize> = None;
    let mut layers: Option<usize> = None;

    let mut substrate: Option<PdnSubstrate> = None;

    // c4 block accumulators
    let mut c4_layout = C4Layout::default();
    let mut c4_ballout: Option<BallOut> = None;
    let mut c4_rotation = Rotation::R0;

    for raw in text.lines() {
      let line = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
      };
      let tokens: Vec<&str> = line.split_whitespace().collect();
      if tokens.is_empty() {
        continue;
      }

      match section {
        Section::Preamble => {
          if tokens[0] == "TECHNOLOGY_BEGIN" {
            section = Section::Technology;
          }
        }

        Section::Technology => {
          if tokens[0] == "TECHNOLOGY_END" {
            let gw = grid_width
              .ok_or_else(|| EngineError::input_format(path, "GRID_WIDTH missing"))?;
            let gh = grid_height
              .ok_or_else(|| EngineError::input_format(path, "GRID_HEIGHT missing"))?;
            let pw = pin_width.ok_or_else(|| EngineError::input_format(path, "PIN_WIDTH missing"))?;
            let ph =
              pin_height.ok_or_else(|| EngineError::input_format(path, "PIN_HEIGHT missing"))?;
            let m = layers.ok_or_else(|| EngineError::input_format(path, "LAYERS missing"))?;
            if pw != gw + 1 || ph != gh + 1 {
              return Err(EngineError::input_format(
                path,
                format!("pin grid {pw}x{ph} must be grid {gw}x{gh} plus one"),
              ));
            }
            if m < 2 {
              return Err(EngineError::input_format(path, "at least 2 metal layers required"));
            }

            substrate = Some(PdnSubstrate {
              grid_width: gw,
              grid_height: gh,
              pin_width: pw,
              pin_height: ph,
              metal_layer_count: m,
              via_layer_count: m - 1,
              ubump_connected_layer: 0,
              c4_connected_layer: m - 1,
              ubump: MicroBump::new(pw, ph),
              c4: C4Bump {
                canvas: Canvas::new(pw, ph),
                signal_cords: HashMap::new(),
                clusters: Vec::new(),
              },
              metal_layers: vec![Canvas::new(gw, gh); m],
              via_layers: vec![Canvas::new(pw, ph); m - 1],
            });
            section = Section::Preamble;
            continue;
          }

          let value = parse_assignment(&tokens)
            .ok_or_else(|| EngineError::input_format(path, format!("bad technology line: {raw}")))?;
          match tokens[0] {
            "GRID_WIDTH" => grid_width = Some(value),
            "GRID_HEIGHT" => grid_height = Some(value),
            "PIN_WIDTH" => pin_width = Some(value),
            "PIN_HEIGHT" => pin_height = Some(value),
            "LAYERS" => layers = Some(value),
            other => {
              return Err(EngineError::input_format(
                path,
                format!("unrecognised technology detail {other}"),
              ));
            }
          }
        }

        Section::Preplace => {
          if tokens[0] == "PDN_PREPLACE_END" {
            section = Section::Preamble;
            continue;
          }
          let sub = substrate
            .as_mut()
            .ok_or_else(|| EngineError::input_format(path, "preplace before TECHNOLOGY block"))?;
          match tokens[0] {
            "METAL_LAYER" | "VIA_LAYER" => {
              let idx: usize = tokens
                .get(1)
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| EngineError::input_format(path, format!("bad layer index: {raw}")))?;
              let file = tokens
                .get(2)
                .map(|t| t.trim_matches('"'))
                .unwrap_or("");
              let (layers, bound) = if tokens[0] == "METAL_LAYER" {
                (&mut sub.metal_layers, sub.metal_layer_count)
              } else {
                (&mut sub.via_layers, sub.via_layer_count)
              };
              if idx >= bound {
                return Err(EngineError::input_format(
                  path,
                  format!("{} index {idx} out of range (< {bound})", tokens[0]),
                ));
              }
              if !file.is_empty() {
                layers[idx].read_blockages(resolve(file))?;
              }
            }
            other => {
              return Err(EngineError::input_format(
                path,
                format!("unrecognised label in preplace block: {other}"),
              ));
            }
          }
        }

        Section::MicroBump => {
          if tokens[0] == "MICROBUMP_END" {
            section = Section::Preamble;
            continue;
          }
          let sub = substrate
            .as_mut()
            .ok_or_else(|| EngineError::input_format(path, "microbump before TECHNOLOGY block"))?;
          match tokens[0] {
            "include" => {
              let file = tokens
                .get(1)
                .map(|t| t.trim_matches('"'))
                .ok_or_else(|| EngineError::input_format(path, "include missing file"))?;
              sub.ubump.include_ballout(BallOut::from_file(resolve(file))?);
            }
            "CHIPLET" => {
              // CHIPLET <ballout> <instance> <rotation> (x, y)
              if tokens.len() < 6 {
                return Err(EngineError::input_format(path, format!("bad CHIPLET line: {raw}")));
              }
              let rotation = Rotation::parse(tokens[3]).ok_or_else(|| {
                EngineError::input_format(path, format!("unknown rotation {}", tokens[3]))
              })?;
              let x: i32 = tokens[4]
                .trim_matches(|c| c == '(' || c == ',')
                .parse()
                .map_err(|_| EngineError::input_format(path, format!("bad CHIPLET origin: {raw}")))?;
              let y: i32 = tokens[5]
                .trim_matches(')')
                .parse()
                .map_err(|_| EngineError::input_format(path, format!("bad CHIPLET origin: {raw}")))?;
              sub
                .ubump
                .place_chiplet(tokens[1], tokens[2], rotation, Point::new(x, y))?;
            }
            other => warn!(line = other, "unmatched microbump line"),
          }
        }

        Section::C4 => {
          if tokens[0] == "C4_END" {
            let sub = substrate
              .as_mut()
              .ok_or_else(|| EngineError::input_format(path, "c4 before TECHNOLOGY block"))?;
            let ballout = c4_ballout
              .take()
              .ok_or_else(|| EngineError::input_format(path, "c4 ballout file missing"))?;
            sub.c4 = C4Bump::build(sub.pin_width, sub.pin_height, c4_layout, &ballout, c4_rotation)?;
            section = Section::Preamble;
            continue;
          }
          let key = tokens[0].to_ascii_uppercase();
          if key == "INCLUDE" {
            let file = tokens
              .get(1)
              .map(|t| t.trim_matches('"'))
              .ok_or_else(|| EngineError::input_format(path, "include missing file"))?;
            c4_ballout = Some(BallOut::from_file(resolve(file))?);
            continue;
          }
          if key == "ROTATION" {
            c4_rotation = tokens
              .get(1)
              .and_then(|t| Rotation::parse(t))
              .ok_or_else(|| EngineError::input_format(path, format!("bad ROTATION line: {raw}")))?;
            continue;
          }
          let value: i32 = parse_assignment(&tokens)
            .ok_or_else(|| EngineError::input_format(path, format!("bad c4 line: {raw}")))?;
          let slot = match key.as_str() {
            "C4_WIDTH" => 0,
            "C4_HEIGHT" => 1,
            "C4_PITCH_WIDTH" => 2,
            "C4_PITCH_HEIGHT" => 3,
            "C4_COUNT_WIDTH" => 4,
            "C4_COUNT_HEIGHT" => 5,
            "C4_LEFT_BORDER" => 6,
            "C4_RIGHT_BORDER" => 7,
            "C4_UP_BORDER" => 8,
            "C4_DOWN_BORDER" => 9,
            other => {
              return Err(EngineError::input_format(path, format!("unmatched c4 key {other}")));
            }
          };
          match slot {
            0 => c4_layout.cluster_pin_count_width = value,
            1 => c4_layout.cluster_pin_count_height = value,
            2 => c4_layout.cluster_pitch_width = value,
            3 => c4_layout.cluster_pitch_height = value,
            4 => c4_layout.cluster_count_width = value,
            5 => c4_layout.cluster_count_height = value,
            6 => c4_layout.left_border = value,
            7 => c4_layout.right_border = value,
            8 => c4_layout.up_border = value,
            _ => c4_layout.down_border = value,
          }
        }
      }

      if section == Section::Preamble {
        match tokens[0] {
          "PDN_PREPLACE_START" => section = Section::Preplace,
          "MICROBUMP_START" => section = Section::MicroBump,
          "C4_START" => section = Section::C4,
          _ => {}
        }
      }
    }

    let sub =
      substrate.ok_or_else(|| EngineError::input_format(path, "TECHNOLOGY block missing"))?;
    debug!(
      grid = format!("{}x{}", sub.grid_width, sub.grid_height),
      layers = sub.metal_layer_count,
      chiplets = sub.ubump.instances.len(),
      "pinout loaded"
    );
    Ok(sub)
  }

  /// Stamp preplaced records and pad cells onto the metal canvases.
  ///
  /// Running this twice is a no-op: every write is a pure function of the
  /// preplace records and pin canvases.
  pub fn mark_preplaced_and_insert_pads(&mut self) {
    for canvas in &mut self.metal_layers {
      canvas.mark_preplaced_to_canvas();
    }
    for canvas in &mut self.via_layers {
      canvas.mark_preplaced_to_canvas();
    }

    let power: HashSet<SignalType> = POWER_SIGNAL_SET.into_iter().collect();
    let mut via_to_metal = power.clone();
    via_to_metal.insert(SignalType::Signal);

    let top = self.ubump_connected_layer;
    let bottom = self.c4_connected_layer;

    mark_pin_pads_with_signals(&mut self.metal_layers[top], &self.ubump.canvas, &power);
    mark_pin_pads_with_signals(&mut self.metal_layers[top], &self.via_layers[0].clone(), &via_to_metal);

    for layer in (top + 1)..bottom {
      let above = self.via_layers[layer - 1].clone();
      let below = self.via_layers[layer].clone();
      mark_pin_pads_with_signals(&mut self.metal_layers[layer], &above, &via_to_metal);
      mark_pin_pads_with_signals(&mut self.metal_layers[layer], &below, &via_to_metal);
    }

    let last_via = self.via_layers[self.via_layer_count - 1].clone();
    mark_pin_pads_with_signals(&mut self.metal_layers[bottom], &last_via, &via_to_metal);
    mark_pin_pads_without_signals(
      &mut self.metal_layers[bottom],
      &self.c4.canvas,
      &[SignalType::Empty, SignalType::Obstacle].into_iter().collect(),
    );
  }

  /// Rewrite residual GROUND / SIGNAL / OVERLAP tags into OBSTACLE on every
  /// metal and via canvas.
  pub fn mark_obstacles_on_canvas(&mut self) {
    let rewrite = |canvas: &mut Canvas| {
      for y in 0..canvas.height() {
        for x in 0..canvas.width() {
          match canvas.get(x, y) {
            SignalType::Ground | SignalType::Signal | SignalType::Overlap => {
              canvas.set(x, y, SignalType::Obstacle);
            }
            _ => {}
          }
        }
      }
    };
    self.via_layers.iter_mut().for_each(rewrite);
    self.metal_layers.iter_mut().for_each(rewrite);
  }

  /// Every power signal on `layer` occupies at most one connected region.
  pub fn check_one_piece(&self, layer: usize) -> bool {
    for (sig, set) in collect_signal_polygons(&self.metal_layers[layer]) {
      if sig.is_power() && set.fragments().len() > 1 {
        return false;
      }
    }
    true
  }

  /// Every power pad on the bump-connected layers is surrounded by cells of
  /// its own signal.
  pub fn check_pin_pad_valid(&self, layer: usize) -> bool {
    let pin_canvas = if layer == self.ubump_connected_layer {
      &self.ubump.canvas
    } else if layer == self.c4_connected_layer {
      &self.c4.canvas
    } else {
      return true;
    };

    let grid = &self.metal_layers[layer];
    for j in 0..pin_canvas.height() as i32 {
      for i in 0..pin_canvas.width() as i32 {
        let sig = pin_canvas.get(i as usize, j as usize);
        if !sig.is_power() {
          continue;
        }
        for (x, y) in pad_cells(i, j) {
          if grid.in_bounds(x, y) && grid.get(x as usize, y as usize) != sig {
            return false;
          }
        }
      }
    }
    true
  }

  /// Paint each empty via site whose eight corner-adjacent metal cells all
  /// carry the same power signal.
  pub fn assign_vias(&mut self) {
    for v in 0..self.via_layer_count {
      let (up, down) = (v, v + 1);
      for j in 0..self.pin_height as i32 {
        for i in 0..self.pin_width as i32 {
          if self.via_layers[v].get(i as usize, j as usize) != SignalType::Empty {
            continue;
          }
          let mut agreed: Option<SignalType> = None;
          let mut ok = true;
          for layer in [up, down] {
            for (x, y) in pad_cells(i, j) {
              if !self.metal_layers[layer].in_bounds(x, y) {
                continue;
              }
              let sig = self.metal_layers[layer].get(x as usize, y as usize);
              if !sig.is_power() {
                ok = false;
                break;
              }
              match agreed {
                None => agreed = Some(sig),
                Some(prev) if prev != sig => {
                  ok = false;
                  break;
                }
                _ => {}
              }
            }
            if !ok {
              break;
            }
          }
          if ok {
            if let Some(sig) = agreed {
              self.via_layers[v].set(i as usize, j as usize, sig);
            }
          }
        }
      }
    }
  }

  /// Erase power fragments on `layer` that touch neither a preplaced cell
  /// of their signal nor an assigned same-signal via.
  pub fn remove_floating_planes(&mut self, layer: usize) {
    let mut anchored: HashSet<(i32, i32)> = HashSet::new();
    for (sig, cords) in &self.metal_layers[layer].preplaced {
      if sig.is_power() {
        for c in cords {
          anchored.insert((c.x, c.y));
        }
      }
    }
    let mut via_anchor = |canvas: &Canvas| {
      for j in 0..canvas.height() as i32 {
        for i in 0..canvas.width() as i32 {
          if canvas.get(i as usize, j as usize).is_power() {
            for (x, y) in pad_cells(i, j) {
              anchored.insert((x, y));
            }
          }
        }
      }
    };
    if layer > 0 {
      via_anchor(&self.via_layers[layer - 1]);
    }
    if layer < self.via_layer_count {
      via_anchor(&self.via_layers[layer]);
    }

    let polygons = collect_signal_polygons(&self.metal_layers[layer]);
    for (sig, set) in polygons {
      if !sig.is_power() {
        continue;
      }
      for frag in set.fragments() {
        let keep = frag.cells().any(|c| anchored.contains(&(c.x, c.y)));
        if !keep {
          debug!(layer, signal = %sig, area = frag.area(), "removing floating plane");
          for c in frag.cells() {
            self.metal_layers[layer].set_point(c, SignalType::Empty);
          }
        }
      }
    }
  }
}

fn parse_assignment<T: std::str::FromStr>(tokens: &[&str]) -> Option<T> {
  if tokens.len() >= 3 && tokens[1] == "=" {
    tokens[2].parse().ok()
  } else {
    None
  }
}

/// The up-to-four grid cells surrounding pin corner `(i, j)`.
#[inline]
pub fn pad_cells(i: i32, j: i32) -> [(i32, i32); 4] {
  [(i - 1, j - 1), (i, j - 1), (i - 1, j), (i, j)]
}

/// Stamp every pin whose signal is in `signals` onto the surrounding grid
/// cells.
pub fn mark_pin_pads_with_signals(
  grid: &mut Canvas,
  pins: &Canvas,
  signals: &HashSet<SignalType>,
) {
  debug_assert_eq!(pins.width(), grid.width() + 1);
  debug_assert_eq!(pins.height(), grid.height() + 1);
  for j in 0..pins.height() as i32 {
    for i in 0..pins.width() as i32 {
      let sig = pins.get(i as usize, j as usize);
      if !signals.contains(&sig) {
        continue;
      }
      for (x, y) in pad_cells(i, j) {
        if grid.in_bounds(x, y) {
          grid.set(x as usize, y as usize, sig);
        }
      }
    }
  }
}

/// Stamp every pin whose signal is NOT in `avoid` onto the surrounding grid
/// cells.
pub fn mark_pin_pads_without_signals(
  grid: &mut Canvas,
  pins: &Canvas,
  avoid: &HashSet<SignalType>,
) {
  debug_assert_eq!(pins.width(), grid.width() + 1);
  debug_assert_eq!(pins.height(), grid.height() + 1);
  for j in 0..pins.height() as i32 {
    for i in 0..pins.width() as i32 {
      let sig = pins.get(i as usize, j as usize);
      if avoid.contains(&sig) {
        continue;
      }
      for (x, y) in pad_cells(i, j) {
        if grid.in_bounds(x, y) {
          grid.set(x as usize, y as usize, sig);
        }
      }
    }
  }
}

/// Group a canvas into per-signal rectilinear regions.
pub fn collect_signal_polygons(canvas: &Canvas) -> HashMap<SignalType, PolygonSet> {
  let mut out: HashMap<SignalType, PolygonSet> = HashMap::new();
  for y in 0..canvas.height() as i32 {
    for x in 0..canvas.width() as i32 {
      out
        .entry(canvas.get(x as usize, y as usize))
        .or_default()
        .insert_cell(Point::new(x, y));
    }
  }
  out
}

#[cfg(test)]
#[path = "pdn_test.rs"]
mod pdn_test;
