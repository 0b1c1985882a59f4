//! Micro-bump side of the interposer.
//!
//! Ballout prototypes are included once; chiplet instances place a
//! (possibly rotated) prototype at an offset. Every instance rectangle must
//! stay inside the interposer pin envelope.

use std::collections::{BTreeSet, HashMap};

use crate::canvas::Canvas;
use crate::error::{EngineError, Result};
use crate::geometry::{Point, Rect};
use crate::signal::SignalType;

use super::{BallOut, Rotation};

/// One placed chiplet.
#[derive(Clone, Debug)]
pub struct ChipletInstance {
  pub name: String,
  pub ballout: String,
  pub rotation: Rotation,
  /// Corner-to-corner extent on the pin grid.
  pub rect: Rect,
  /// Current demand inherited from the ballout's MAX_CURRENT.
  pub max_current: f64,
  /// Power signals this instance carries.
  pub power_signals: Vec<SignalType>,
}

#[derive(Clone, Debug)]
pub struct MicroBump {
  pub canvas: Canvas,
  pub signal_cords: HashMap<SignalType, BTreeSet<Point>>,
  pub instances: Vec<ChipletInstance>,
  prototypes: HashMap<String, BallOut>,
}

impl MicroBump {
  pub fn new(pin_width: usize, pin_height: usize) -> Self {
    Self {
      canvas: Canvas::new(pin_width, pin_height),
      signal_cords: HashMap::new(),
      instances: Vec::new(),
      prototypes: HashMap::new(),
    }
  }

  /// Register a ballout prototype. Re-including the same name keeps the
  /// first copy and warns.
  pub fn include_ballout(&mut self, ballout: BallOut) {
    if self.prototypes.contains_key(&ballout.name) {
      tracing::warn!(name = %ballout.name, "repeated ballout include ignored");
      return;
    }
    self.prototypes.insert(ballout.name.clone(), ballout);
  }

  pub fn prototype(&self, name: &str) -> Option<&BallOut> {
    self.prototypes.get(name)
  }

  /// Place an instance of `ballout_name` with its lower-left pin at
  /// `origin`.
  pub fn place_chiplet(
    &mut self,
    ballout_name: &str,
    instance_name: &str,
    rotation: Rotation,
    origin: Point,
  ) -> Result<()> {
    let proto = self
      .prototypes
      .get(ballout_name)
      .ok_or_else(|| EngineError::InputContract(format!("unknown chiplet ballout {ballout_name}")))?;

    let placed = if rotation == Rotation::R0 {
      proto.clone()
    } else {
      proto.rotated(rotation)
    };

    let w = placed.width() as i32;
    let h = placed.height() as i32;
    let rect = Rect::new(origin.x, origin.y, origin.x + (w - 1).max(0), origin.y + (h - 1).max(0));
    let envelope = Rect::new(
      0,
      0,
      self.canvas.width() as i32 - 1,
      self.canvas.height() as i32 - 1,
    );
    if !envelope.contains_rect(rect) {
      return Err(EngineError::InputContract(format!(
        "chiplet {instance_name} at {origin} exceeds the interposer envelope"
      )));
    }

    let mut power_signals = BTreeSet::new();
    for y in 0..placed.height() {
      for x in 0..placed.width() {
        let sig = placed.get(x, y);
        if sig == SignalType::Empty {
          continue;
        }
        let p = Point::new(origin.x + x as i32, origin.y + y as i32);
        self.canvas.set_point(p, sig);
        self.signal_cords.entry(sig).or_default().insert(p);
        if sig.is_power() {
          power_signals.insert(sig);
        }
      }
    }

    self.instances.push(ChipletInstance {
      name: instance_name.to_string(),
      ballout: ballout_name.to_string(),
      rotation,
      rect,
      max_current: placed.max_current,
      power_signals: power_signals.into_iter().collect(),
    });

    Ok(())
  }

  /// Total current demand per power signal across all instances.
  pub fn signal_currents(&self) -> HashMap<SignalType, f64> {
    let mut out = HashMap::new();
    for inst in &self.instances {
      for &sig in &inst.power_signals {
        *out.entry(sig).or_insert(0.0) += inst.max_current;
      }
    }
    out
  }
}

#[cfg(test)]
#[path = "micro_test.rs"]
mod micro_test;
