//! Chiplet ballout: a rectangular pin grid read from `.ballout` files.
//!
//! File format: `BEGIN_CHIPLET <name> <W> <H>` preceded by optional private
//! attributes (`MAX_CURRENT = <v> A`), then `W*H` whitespace-separated
//! entries of the form `<CSV-cell>,<signal>`. CSV cells are spreadsheet
//! references (`A1`, `AA12`): letters give the 1-based row from the top,
//! digits the 1-based column. Rows are flipped on load so the in-memory
//! grid is bottom-left origin.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::geometry::Point;
use crate::signal::SignalType;

/// Quarter-turn rotation of a ballout or the whole c4 side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
  #[default]
  R0,
  R90,
  R180,
  R270,
}

impl Rotation {
  /// Parse `R90`, `90`, `ROTATION_90`, `ROTATION::R90`, case-insensitive.
  pub fn parse(s: &str) -> Option<Rotation> {
    let upper = s.trim().to_ascii_uppercase();
    let mut name = upper.as_str();
    for prefix in ["BALLOUT_ROTATION::", "BALLOUT_ROTATION_", "ROTATION::", "ROTATION_"] {
      if let Some(rest) = name.strip_prefix(prefix) {
        name = rest;
        break;
      }
    }
    match name {
      "R0" | "0" => Some(Rotation::R0),
      "R90" | "90" => Some(Rotation::R90),
      "R180" | "180" => Some(Rotation::R180),
      "R270" | "270" => Some(Rotation::R270),
      _ => None,
    }
  }
}

/// One chiplet's pin grid.
#[derive(Clone, Debug)]
pub struct BallOut {
  pub name: String,
  width: usize,
  height: usize,
  pub max_current: f64,
  pub rotation: Rotation,
  grid: Vec<SignalType>,
  pub signal_cords: HashMap<SignalType, BTreeSet<Point>>,
}

impl BallOut {
  #[inline]
  pub fn width(&self) -> usize {
    self.width
  }

  #[inline]
  pub fn height(&self) -> usize {
    self.height
  }

  #[inline]
  pub fn get(&self, x: usize, y: usize) -> SignalType {
    self.grid[y * self.width + x]
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    Self::parse(&text, path)
  }

  pub fn parse(text: &str, path: &Path) -> Result<Self> {
    let mut tokens = text.split_whitespace().peekable();

    let mut name = String::new();
    let mut width = 0usize;
    let mut height = 0usize;
    let mut max_current = 0.0f64;

    // header: private attributes until BEGIN_CHIPLET
    loop {
      let tok = tokens
        .next()
        .ok_or_else(|| EngineError::input_format(path, "missing BEGIN_CHIPLET header"))?;
      if tok == "BEGIN_CHIPLET" {
        name = tokens
          .next()
          .ok_or_else(|| EngineError::input_format(path, "BEGIN_CHIPLET missing name"))?
          .to_string();
        width = next_usize(&mut tokens, path, "ballout width")?;
        height = next_usize(&mut tokens, path, "ballout height")?;
        break;
      }
      match tok {
        "MAX_CURRENT" => {
          expect_token(&mut tokens, "=", path)?;
          let value: f64 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| EngineError::input_format(path, "bad MAX_CURRENT value"))?;
          let unit = tokens
            .next()
            .ok_or_else(|| EngineError::input_format(path, "MAX_CURRENT missing unit"))?;
          if unit != "A" {
            return Err(EngineError::input_format(
              path,
              format!("MAX_CURRENT uses unit {unit}, standard unit is A"),
            ));
          }
          max_current = value;
        }
        other => {
          return Err(EngineError::input_format(
            path,
            format!("unrecognised private ballout attribute {other}"),
          ));
        }
      }
    }

    let mut out = BallOut {
      name,
      width,
      height,
      max_current,
      rotation: Rotation::R0,
      grid: vec![SignalType::Empty; width * height],
      signal_cords: HashMap::new(),
    };

    // body: width*height entries of `<cell>,<signal>`, top row first
    for j in 0..height {
      for i in 0..width {
        let entry = tokens.next().ok_or_else(|| {
          EngineError::input_format(path, format!("ballout body ends early at ({i}, {j})"))
        })?;
        let comma = entry
          .find(',')
          .ok_or_else(|| EngineError::input_format(path, format!("bad ballout entry {entry}")))?;
        let cell = csv_cell_to_point(&entry[..comma])
          .ok_or_else(|| EngineError::input_format(path, format!("bad CSV cell {entry}")))?;
        if cell != Point::new(i as i32, j as i32) {
          return Err(EngineError::input_format(
            path,
            format!("discontinuous CSV cell position {}", &entry[..comma]),
          ));
        }

        let sig = SignalType::parse(&entry[comma + 1..]);
        if sig == SignalType::Empty || sig == SignalType::Unknown {
          return Err(EngineError::input_format(
            path,
            format!("unknown ballout signal {}", &entry[comma + 1..]),
          ));
        }

        // flip to bottom-left origin
        let p = Point::new(cell.x, (height - 1 - cell.y as usize) as i32);
        out.grid[p.y as usize * width + p.x as usize] = sig;
        out.signal_cords.entry(sig).or_default().insert(p);
      }
    }

    Ok(out)
  }

  /// A rotated copy of this ballout.
  pub fn rotated(&self, rotation: Rotation) -> BallOut {
    let (w, h) = match rotation {
      Rotation::R0 | Rotation::R180 => (self.width, self.height),
      Rotation::R90 | Rotation::R270 => (self.height, self.width),
    };

    let mut grid = vec![SignalType::Empty; w * h];
    let mut signal_cords: HashMap<SignalType, BTreeSet<Point>> = HashMap::new();
    for j in 0..h {
      for i in 0..w {
        let sig = match rotation {
          Rotation::R0 => self.get(i, j),
          Rotation::R90 => self.get(h - 1 - j, i),
          Rotation::R180 => self.get(self.width - 1 - i, self.height - 1 - j),
          Rotation::R270 => self.get(j, w - 1 - i),
        };
        grid[j * w + i] = sig;
        if sig != SignalType::Empty {
          signal_cords
            .entry(sig)
            .or_default()
            .insert(Point::new(i as i32, j as i32));
        }
      }
    }

    BallOut {
      name: self.name.clone(),
      width: w,
      height: h,
      max_current: self.max_current,
      rotation,
      grid,
      signal_cords,
    }
  }
}

fn next_usize<'a>(
  tokens: &mut impl Iterator<Item = &'a str>,
  path: &Path,
  what: &str,
) -> Result<usize> {
  tokens
    .next()
    .and_then(|t| t.parse().ok())
    .ok_or_else(|| EngineError::input_format(path, format!("bad {what}")))
}

fn expect_token<'a>(
  tokens: &mut impl Iterator<Item = &'a str>,
  expected: &str,
  path: &Path,
) -> Result<()> {
  match tokens.next() {
    Some(t) if t == expected => Ok(()),
    other => Err(EngineError::input_format(
      path,
      format!("expected `{expected}`, got {other:?}"),
    )),
  }
}

/// Spreadsheet cell reference to 0-based `(column, row-from-top)`.
pub fn csv_cell_to_point(cell: &str) -> Option<Point> {
  let mut row = 0i64;
  for (idx, c) in cell.char_indices() {
    if c.is_ascii_alphabetic() {
      row = row * 26 + (c.to_ascii_uppercase() as i64 - 'A' as i64 + 1);
    } else if c.is_ascii_digit() {
      let col: i64 = cell[idx..].parse().ok()?;
      if row == 0 || col == 0 {
        return None;
      }
      return Some(Point::new((col - 1) as i32, (row - 1) as i32));
    } else {
      return None;
    }
  }
  None
}

#[cfg(test)]
#[path = "ballout_test.rs"]
mod ballout_test;
