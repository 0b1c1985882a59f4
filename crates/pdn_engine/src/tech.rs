//! Technology file (`.tch`) parsing.
//!
//! Newline-delimited `KEY = value UNIT` records with `#` comments. Each key
//! has a standard unit; a record may use a different magnitude prefix
//! (f/p/n/u/m/c mapping to 1e-15..1e-2) and the value is rescaled to the
//! standard unit on load. Unknown keys are input-format errors.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Recognised keys and their standard units.
const STANDARD_UNITS: &[(&str, &str)] = &[
  ("DIE_GLOBAL_WIRE_PITCH", "nm"),
  ("DIE_GLOBAL_WIRE_WIDTH", "nm"),
  ("DIE_GLOBAL_WIRE_THICKNESS", "nm"),
  ("DIE_INTERMEDIATE_WIRE_PITCH", "nm"),
  ("DIE_INTERMEDIATE_WIRE_WIDTH", "nm"),
  ("DIE_INTERMEDIATE_WIRE_THICKNESS", "nm"),
  ("DIE_LOCAL_WIRE_PITCH", "nm"),
  ("DIE_LOCAL_WIRE_WIDTH", "nm"),
  ("DIE_LOCAL_WIRE_THICKNESS", "nm"),
  ("DIE_DECAP_DENSITY", "nF/mm^2"),
  ("MICROBUMP_PITCH", "um"),
  ("MICROBUMP_RADIUS", "um"),
  ("MICROBUMP_RESISTANCE", "mOhm"),
  ("MICROBUMP_INDUCTANCE", "pH"),
  ("INTERPOSER_WIDTH", "um"),
  ("INTERPOSER_HEIGHT", "um"),
  ("INTERPOSER_METAL_WIDTH", "um"),
  ("INTERPOSER_METAL_PITCH", "um"),
  ("INTERPOSER_METAL_THICKNESS", "um"),
  ("INTERPOSER_DIELECTRIC_THICKNESS", "um"),
  ("INTERPOSER_SUBSTRATE_THICKNESS", "um"),
  ("TSV_PITCH", "um"),
  ("TSV_DEPTH", "um"),
  ("TSV_RESISTANCE", "mOhm"),
  ("TSV_INDUCTANCE", "pH"),
  ("C4_RADIUS", "um"),
  ("C4_RESISTANCE", "mOhm"),
  ("C4_INDUCTANCE", "pH"),
  ("PCB_INDUCTANCE", "pH"),
  ("PCB_RESISTANCE", "uOhm"),
  ("PCB_DECAP_INDUCTANCE", "nH"),
  ("PCB_DECAP_CAPACITANCE", "uF"),
  ("PCB_DECAP_RESISTANCE", "uOhm"),
  ("DIE_METAL_RESISTIVITY", "nOhm.m"),
  ("INTERPOSER_METAL_RESISTIVITY", "nOhm.m"),
  ("PERMITIVITY_OF_FREE_SPACE", "fF/m"),
  ("PERMITIVITY_OF_DIELECTRIC", ""),
  ("PERMEABILITY_OF_VACCUM", "uH/m"),
  ("LOSS_TANGENT", ""),
];

/// Exponent of a unit's magnitude prefix, 0 when the unit carries none.
fn prefix_exponent(unit: &str) -> i32 {
  if unit.len() < 2 {
    return 0;
  }
  match unit.as_bytes()[0] {
    b'f' => -15,
    b'p' => -12,
    b'n' => -9,
    b'u' => -6,
    b'm' => -3,
    b'c' => -2,
    _ => 0,
  }
}

/// Parsed technology parameters, values in each key's standard unit.
#[derive(Clone, Debug, Default)]
pub struct Technology {
  values: HashMap<String, f64>,
}

impl Technology {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    Self::parse(&text, path)
  }

  pub fn parse(text: &str, path: &Path) -> Result<Self> {
    let mut values = HashMap::new();

    for raw in text.lines() {
      let line = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
      };
      let tokens: Vec<&str> = line.split_whitespace().collect();
      if tokens.is_empty() {
        continue;
      }
      if tokens.len() < 3 || tokens[1] != "=" {
        return Err(EngineError::input_format(
          path,
          format!("expected `KEY = value UNIT`, got: {raw}"),
        ));
      }

      let key = tokens[0];
      let std_unit = STANDARD_UNITS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, u)| *u)
        .ok_or_else(|| EngineError::input_format(path, format!("unrecognised key {key}")))?;

      let value: f64 = tokens[2]
        .parse()
        .map_err(|_| EngineError::input_format(path, format!("bad value for {key}: {}", tokens[2])))?;

      let unit = tokens.get(3).copied().unwrap_or("");
      let scale = 10f64.powi(prefix_exponent(unit) - prefix_exponent(std_unit));
      values.insert(key.to_string(), value * scale);
    }

    Ok(Self { values })
  }

  /// Value of `key` in its standard unit; 0.0 when the file omitted it.
  pub fn get(&self, key: &str) -> f64 {
    self.values.get(key).copied().unwrap_or(0.0)
  }

  pub fn microbump_pitch(&self) -> f64 {
    self.get("MICROBUMP_PITCH")
  }
  pub fn microbump_radius(&self) -> f64 {
    self.get("MICROBUMP_RADIUS")
  }
  pub fn microbump_resistance(&self) -> f64 {
    self.get("MICROBUMP_RESISTANCE")
  }
  pub fn microbump_inductance(&self) -> f64 {
    self.get("MICROBUMP_INDUCTANCE")
  }
  pub fn interposer_metal_width(&self) -> f64 {
    self.get("INTERPOSER_METAL_WIDTH")
  }
  pub fn interposer_metal_pitch(&self) -> f64 {
    self.get("INTERPOSER_METAL_PITCH")
  }
  pub fn interposer_metal_thickness(&self) -> f64 {
    self.get("INTERPOSER_METAL_THICKNESS")
  }
  pub fn interposer_dielectric_thickness(&self) -> f64 {
    self.get("INTERPOSER_DIELECTRIC_THICKNESS")
  }
  pub fn interposer_metal_resistivity(&self) -> f64 {
    self.get("INTERPOSER_METAL_RESISTIVITY")
  }
  pub fn permitivity_of_free_space(&self) -> f64 {
    self.get("PERMITIVITY_OF_FREE_SPACE")
  }
  pub fn permitivity_of_dielectric(&self) -> f64 {
    self.get("PERMITIVITY_OF_DIELECTRIC")
  }
  pub fn permeability_of_vaccum(&self) -> f64 {
    self.get("PERMEABILITY_OF_VACCUM")
  }
  pub fn tsv_resistance(&self) -> f64 {
    self.get("TSV_RESISTANCE")
  }
  pub fn tsv_inductance(&self) -> f64 {
    self.get("TSV_INDUCTANCE")
  }
  pub fn c4_resistance(&self) -> f64 {
    self.get("C4_RESISTANCE")
  }
  pub fn c4_inductance(&self) -> f64 {
    self.get("C4_INDUCTANCE")
  }
  pub fn pcb_resistance(&self) -> f64 {
    self.get("PCB_RESISTANCE")
  }
  pub fn pcb_inductance(&self) -> f64 {
    self.get("PCB_INDUCTANCE")
  }
  pub fn pcb_decap_resistance(&self) -> f64 {
    self.get("PCB_DECAP_RESISTANCE")
  }
  pub fn pcb_decap_inductance(&self) -> f64 {
    self.get("PCB_DECAP_INDUCTANCE")
  }
  pub fn pcb_decap_capacitance(&self) -> f64 {
    self.get("PCB_DECAP_CAPACITANCE")
  }
}
