//! C4 side of the interposer.
//!
//! The C4 pattern is a regular lattice of pin clusters. One ballout names
//! the signal of each cluster; borders and pitches position the clusters on
//! the pin grid. Unlike the micro-bump side, every C4 pin also lands in the
//! canvas preplace record so the c4-connected metal layer sees the pads.

use std::collections::{BTreeSet, HashMap};

use crate::canvas::Canvas;
use crate::error::{EngineError, Result};
use crate::geometry::Point;
use crate::signal::SignalType;

use super::{BallOut, Rotation};

/// One cluster of C4 pins sharing a signal.
#[derive(Clone, Debug)]
pub struct C4Cluster {
  /// Representative pin used for netlist probing.
  pub representation: Point,
  pub signal: SignalType,
  pub pins: Vec<Point>,
}

/// Lattice parameters collected from the pinout `C4_START` block.
#[derive(Clone, Copy, Debug, Default)]
pub struct C4Layout {
  pub cluster_pin_count_width: i32,
  pub cluster_pin_count_height: i32,
  pub cluster_pitch_width: i32,
  pub cluster_pitch_height: i32,
  pub cluster_count_width: i32,
  pub cluster_count_height: i32,
  pub left_border: i32,
  pub right_border: i32,
  pub up_border: i32,
  pub down_border: i32,
}

impl C4Layout {
  /// Check lattice arithmetic against the pin envelope.
  fn validate(&self, pin_width: i32, pin_height: i32) -> Result<()> {
    let fields = [
      ("cluster pin count width", self.cluster_pin_count_width),
      ("cluster pin count height", self.cluster_pin_count_height),
      ("cluster pitch width", self.cluster_pitch_width),
      ("cluster pitch height", self.cluster_pitch_height),
      ("cluster count width", self.cluster_count_width),
      ("cluster count height", self.cluster_count_height),
    ];
    for (name, v) in fields {
      if v <= 0 {
        return Err(EngineError::InputContract(format!("c4 {name} not set or invalid ({v})")));
      }
    }
    for (name, v) in [
      ("left border", self.left_border),
      ("right border", self.right_border),
      ("up border", self.up_border),
      ("down border", self.down_border),
    ] {
      if v < 0 {
        return Err(EngineError::InputContract(format!("c4 {name} not set or invalid ({v})")));
      }
    }

    let span = |border_lo: i32, border_hi: i32, pins: i32, pitch: i32, count: i32| {
      if count != 1 {
        border_lo + border_hi + pins + pitch * (count - 1)
      } else {
        border_lo + border_hi + pins
      }
    };
    let w = span(
      self.left_border,
      self.right_border,
      self.cluster_pin_count_width,
      self.cluster_pitch_width,
      self.cluster_count_width,
    );
    let h = span(
      self.down_border,
      self.up_border,
      self.cluster_pin_count_height,
      self.cluster_pitch_height,
      self.cluster_count_height,
    );
    if w != pin_width || h != pin_height {
      return Err(EngineError::InputContract(format!(
        "c4 lattice spans {w}x{h}, pin envelope is {pin_width}x{pin_height}"
      )));
    }
    Ok(())
  }
}

#[derive(Clone, Debug)]
pub struct C4Bump {
  pub canvas: Canvas,
  pub signal_cords: HashMap<SignalType, BTreeSet<Point>>,
  pub clusters: Vec<C4Cluster>,
}

impl C4Bump {
  /// Expand the lattice: one cluster per ballout cell, `pin_count` pins
  /// each, stamped onto the canvas and recorded as preplaced.
  pub fn build(
    pin_width: usize,
    pin_height: usize,
    layout: C4Layout,
    ballout: &BallOut,
    rotation: Rotation,
  ) -> Result<Self> {
    layout.validate(pin_width as i32, pin_height as i32)?;

    let placed = if rotation == Rotation::R0 {
      ballout.clone()
    } else {
      ballout.rotated(rotation)
    };
    if placed.width() != layout.cluster_count_width as usize
      || placed.height() != layout.cluster_count_height as usize
    {
      return Err(EngineError::InputContract(format!(
        "c4 ballout is {}x{}, lattice expects {}x{}",
        placed.width(),
        placed.height(),
        layout.cluster_count_width,
        layout.cluster_count_height
      )));
    }

    let mut out = C4Bump {
      canvas: Canvas::new(pin_width, pin_height),
      signal_cords: HashMap::new(),
      clusters: Vec::new(),
    };

    let rep_dx = layout.cluster_pin_count_width / 2 + 1;
    let rep_dy = layout.cluster_pin_count_height / 2 + 1;

    let mut lly = layout.down_border;
    for j in 0..layout.cluster_count_height {
      let mut llx = layout.left_border;
      for i in 0..layout.cluster_count_width {
        let sig = placed.get(i as usize, j as usize);
        let mut cluster = C4Cluster {
          representation: Point::new(llx + rep_dx, lly + rep_dy),
          signal: sig,
          pins: Vec::new(),
        };
        for n in 0..layout.cluster_pin_count_height {
          for m in 0..layout.cluster_pin_count_width {
            let pin = Point::new(llx + m, lly + n);
            cluster.pins.push(pin);
            out.signal_cords.entry(sig).or_default().insert(pin);
            out.canvas.preplaced.entry(sig).or_default().push(pin);
            out.canvas.set_point(pin, sig);
          }
        }
        out.clusters.push(cluster);
        llx += layout.cluster_pitch_width;
      }
      lly += layout.cluster_pitch_height;
    }

    Ok(out)
  }
}

#[cfg(test)]
#[path = "c4_test.rs"]
mod c4_test;
