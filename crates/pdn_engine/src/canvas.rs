//! Signal-tagged grid canvas with blockage import.
//!
//! One canvas per metal or via layer. Metal canvases are `W×H`, via/pin
//! canvases `(W+1)×(H+1)`. Storage is flat row-major, bottom-left origin.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::geometry::Point;
use crate::signal::SignalType;

#[derive(Clone, Debug)]
pub struct Canvas {
  width: usize,
  height: usize,
  cells: Vec<SignalType>,
  /// Signals fixed by input on this layer, grouped per signal.
  pub preplaced: HashMap<SignalType, Vec<Point>>,
}

impl Canvas {
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      width,
      height,
      cells: vec![SignalType::Empty; width * height],
      preplaced: HashMap::new(),
    }
  }

  #[inline]
  pub fn width(&self) -> usize {
    self.width
  }

  #[inline]
  pub fn height(&self) -> usize {
    self.height
  }

  #[inline]
  pub fn in_bounds(&self, x: i32, y: i32) -> bool {
    x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height
  }

  #[inline]
  pub fn get(&self, x: usize, y: usize) -> SignalType {
    self.cells[y * self.width + x]
  }

  #[inline]
  pub fn set(&mut self, x: usize, y: usize, sig: SignalType) {
    self.cells[y * self.width + x] = sig;
  }

  #[inline]
  pub fn get_point(&self, p: Point) -> SignalType {
    self.get(p.x as usize, p.y as usize)
  }

  #[inline]
  pub fn set_point(&mut self, p: Point, sig: SignalType) {
    self.set(p.x as usize, p.y as usize, sig);
  }

  /// Count cells per signal.
  pub fn occurrences(&self) -> HashMap<SignalType, usize> {
    let mut out = HashMap::new();
    for &c in &self.cells {
      *out.entry(c).or_insert(0) += 1;
    }
    out
  }

  /// Paint every preplaced record onto the grid.
  pub fn mark_preplaced_to_canvas(&mut self) {
    let entries: Vec<(SignalType, Vec<Point>)> = self
      .preplaced
      .iter()
      .map(|(s, v)| (*s, v.clone()))
      .collect();
    for (sig, cords) in entries {
      for c in cords {
        if self.in_bounds(c.x, c.y) {
          self.set_point(c, sig);
        }
      }
    }
  }

  /// Import a blockage file into `preplaced`.
  ///
  /// Format: `BEGIN_PREPLACE` .. `END_PREPLACE` containing `SIGNAL: <sig>`
  /// headers followed by `Cord(x,y)` singletons or
  /// `Cord(x1,y1) to Cord(x2,y2)` axis-aligned runs. `#` starts a comment.
  pub fn read_blockages(&mut self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;

    let mut in_preplace = false;
    let mut current: Option<SignalType> = None;

    for raw in text.lines() {
      let line = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
      };
      let line = line.trim();
      if line.is_empty() {
        continue;
      }

      if line == "BEGIN_PREPLACE" {
        in_preplace = true;
        continue;
      }
      if !in_preplace {
        continue;
      }
      if line == "END_PREPLACE" {
        break;
      }

      if let Some(rest) = line.strip_prefix("SIGNAL:") {
        let sig = SignalType::parse(rest);
        if sig == SignalType::Unknown {
          return Err(EngineError::input_format(
            path,
            format!("unknown preplace signal {}", rest.trim()),
          ));
        }
        current = Some(sig);
        continue;
      }

      let sig = current.ok_or_else(|| {
        EngineError::input_format(path, format!("coordinate before SIGNAL header: {line}"))
      })?;

      let cords = parse_cord_line(line)
        .ok_or_else(|| EngineError::input_format(path, format!("bad blockage record: {line}")))?;
      let entry = self.preplaced.entry(sig).or_default();
      match cords {
        CordLine::Single(p) => entry.push(p),
        CordLine::Run(a, b) => {
          if a.x != b.x && a.y != b.y {
            return Err(EngineError::input_format(
              path,
              format!("blockage run must be axis-aligned: {line}"),
            ));
          }
          for y in a.y.min(b.y)..=a.y.max(b.y) {
            for x in a.x.min(b.x)..=a.x.max(b.x) {
              entry.push(Point::new(x, y));
            }
          }
        }
      }
    }

    Ok(())
  }
}

enum CordLine {
  Single(Point),
  Run(Point, Point),
}

/// Parse `Cord(x,y)` or `Cord(x1,y1) to Cord(x2,y2)`.
fn parse_cord_line(line: &str) -> Option<CordLine> {
  let mut points = Vec::new();
  let mut rest = line;
  loop {
    let start = rest.find("Cord(")?;
    let after = &rest[start + 5..];
    let close = after.find(')')?;
    let inner = &after[..close];
    let mut parts = inner.split(',');
    let x: i32 = parts.next()?.trim().parse().ok()?;
    let y: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
      return None;
    }
    points.push(Point::new(x, y));
    rest = &after[close + 1..];
    if rest.trim().is_empty() {
      break;
    }
    if points.len() == 1 {
      let t = rest.trim_start();
      if !t.starts_with("to") {
        return None;
      }
      rest = &t[2..];
    } else {
      return None;
    }
  }

  match points.len() {
    1 => Some(CordLine::Single(points[0])),
    2 => Some(CordLine::Run(points[0], points[1])),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn test_blockage_import_and_marking() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "BEGIN_PREPLACE\nSIGNAL: POWER_1\nCord(1,1)\nCord(2,0) to Cord(2,3)\nSIGNAL: OBSTACLE\nCord(0,0)\nEND_PREPLACE"
    )
    .unwrap();

    let mut canvas = Canvas::new(5, 5);
    canvas.read_blockages(file.path()).unwrap();
    canvas.mark_preplaced_to_canvas();

    assert_eq!(canvas.get(1, 1), SignalType::Power(1));
    for y in 0..=3 {
      assert_eq!(canvas.get(2, y), SignalType::Power(1));
    }
    assert_eq!(canvas.get(0, 0), SignalType::Obstacle);
    assert_eq!(canvas.get(4, 4), SignalType::Empty);
  }

  #[test]
  fn test_marking_is_idempotent() {
    let mut canvas = Canvas::new(3, 3);
    canvas
      .preplaced
      .entry(SignalType::Power(2))
      .or_default()
      .push(Point::new(1, 2));
    canvas.mark_preplaced_to_canvas();
    let snapshot: Vec<SignalType> = (0..3)
      .flat_map(|y| (0..3).map(move |x| (x, y)))
      .map(|(x, y)| canvas.get(x, y))
      .collect();
    let mut canvas2 = canvas.clone();
    canvas2.mark_preplaced_to_canvas();
    let snapshot2: Vec<SignalType> = (0..3)
      .flat_map(|y| (0..3).map(move |x| (x, y)))
      .map(|(x, y)| canvas2.get(x, y))
      .collect();
    assert_eq!(snapshot, snapshot2);
  }

  #[test]
  fn test_diagonal_run_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "BEGIN_PREPLACE\nSIGNAL: POWER_1\nCord(0,0) to Cord(2,2)\nEND_PREPLACE"
    )
    .unwrap();
    let mut canvas = Canvas::new(5, 5);
    assert!(canvas.read_blockages(file.path()).is_err());
  }
}
