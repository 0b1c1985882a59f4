//! Equivalent-circuit extraction: derived interposer R/L/C constants and
//! SPICE netlist emission per power net.

use std::io::Write;
use std::path::Path;

use crate::canvas::Canvas;
use crate::error::{EngineError, Result};
use crate::signal::SignalType;
use crate::tech::Technology;

/// Interposer equivalent-circuit constants derived from the technology
/// parameters. Resistances in mOhm, inductances in pH, capacitances in fF,
/// matching the units the netlist suffixes assume.
#[derive(Clone, Debug)]
pub struct EqCktExtractor {
  tech: Technology,
  interposer_resistance: f64,
  interposer_inductance: f64,
  interposer_capacitance_i: f64,
  interposer_capacitance_f: f64,
  interposer_capacitance_a: f64,
  via_resistance: f64,
  via_inductance: f64,
}

impl EqCktExtractor {
  pub fn new(tech: &Technology) -> Self {
    let s = tech.interposer_metal_pitch();
    let w = tech.interposer_metal_width();
    let h = tech.interposer_metal_thickness();
    let sp = s - 2.0 * w;

    let interposer_resistance = (tech.interposer_metal_resistivity() / h) * (s / (4.0 * w));
    let interposer_inductance =
      s * (0.13 * (-s / 45.0).exp() + 0.14 * (s / w).ln() + 0.07);

    let interposer_capacitance_i = (tech.permitivity_of_dielectric() / 1000.0)
      * ((44.0 - 28.0 * h) * w * w + (280.0 * h + 0.8 * s - 64.0) * w + 12.0 * s - 1500.0 * h
        + 1700.0);

    let tmp = (s / sp).ln() + (-1.0f64 / 3.0).exp();
    let interposer_capacitance_f = tech.permitivity_of_free_space()
      * tech.permitivity_of_dielectric()
      * 0.001
      * ((4.0 * s * w * tmp) / (w * std::f64::consts::PI + 2.0 * h * tmp)
        + (2.0 * s / std::f64::consts::PI) * ((2.0 * h) / sp).sqrt());

    let interposer_capacitance_a = (tech.permitivity_of_dielectric() / 1000.0)
      * (4.427 * w * w / h + (96.0 - 56.0 * h) * w + 20.0 * h - 41.0);

    let via_length = tech.interposer_dielectric_thickness();
    let via_radius = w / 2.0;
    let via_resistance = tech.interposer_metal_resistivity() * 1000.0 * via_length
      / (std::f64::consts::PI * via_radius * via_radius);
    let via_inductance =
      (tech.permeability_of_vaccum() * via_radius * (1.0 + via_length / via_radius)) / 2.0;

    Self {
      tech: tech.clone(),
      interposer_resistance,
      interposer_inductance,
      interposer_capacitance_i,
      interposer_capacitance_f,
      interposer_capacitance_a,
      via_resistance,
      via_inductance,
    }
  }

  pub fn interposer_resistance(&self) -> f64 {
    self.interposer_resistance
  }
  pub fn interposer_inductance(&self) -> f64 {
    self.interposer_inductance
  }
  pub fn via_resistance(&self) -> f64 {
    self.via_resistance
  }
  pub fn via_inductance(&self) -> f64 {
    self.via_inductance
  }
  pub fn capacitance_centre_cell(&self) -> f64 {
    self.interposer_capacitance_i + self.interposer_capacitance_f
  }
  pub fn capacitance_edge_cell(&self) -> f64 {
    self.capacitance_centre_cell() + self.interposer_capacitance_a
  }
  pub fn capacitance_corner_cell(&self) -> f64 {
    self.capacitance_edge_cell() + self.interposer_capacitance_a
  }

  /// Emit the equivalent circuit of one power net over a stack of metal
  /// canvases. One R/L pair per same-signal metal edge, one RT/LT pair per
  /// via site occupied on both adjacent layers.
  pub fn export_equivalent_circuit(
    &self,
    name: &str,
    sig: SignalType,
    metal_layers: &[Canvas],
    path: impl AsRef<Path>,
  ) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut out = std::io::BufWriter::new(file);
    let w = |out: &mut std::io::BufWriter<std::fs::File>, s: String| -> Result<()> {
      out.write_all(s.as_bytes()).map_err(|e| EngineError::io(path, e))
    };

    w(&mut out, format!("* Equivalent circuit extracted for {sig}\n"))?;
    w(&mut out, format!("* Model name: {name}\n\n"))?;

    w(&mut out, "*******************************************************************************\n* 1. PCB subcircuit\n*******************************************************************************\n".into())?;
    w(&mut out, ".subckt pcb vrm_i, vrm_o, pcb_o, pcb_i\n".into())?;
    w(&mut out, format!("Lpcbh vrm_i N1PCB {}p\n", self.tech.pcb_inductance()))?;
    w(&mut out, format!("Rpcbh N1PCB pcb_o {}u\n", self.tech.pcb_resistance()))?;
    w(&mut out, format!("Lcappcb pcb_o N2PCB {}n\n", self.tech.pcb_decap_inductance()))?;
    w(&mut out, format!("Ccappcb N2PCB N3PCB {}u\n", self.tech.pcb_decap_capacitance()))?;
    w(&mut out, format!("Rcappcb N3PCB pcb_i {}u\n", self.tech.pcb_decap_resistance()))?;
    w(&mut out, format!("Lpcbl pcb_i N4PCB {}p\n", self.tech.pcb_inductance()))?;
    w(&mut out, format!("Rpcbl N4PCB vrm_o {}u\n", self.tech.pcb_resistance()))?;
    w(&mut out, ".ends pcb\n\n".into())?;

    w(&mut out, "*******************************************************************************\n* 2. C4 with RL modelling\n*******************************************************************************\n".into())?;
    w(&mut out, ".subckt c4 in out\n".into())?;
    w(&mut out, format!("Rc4 in N1C4 {}m\n", self.tech.c4_resistance()))?;
    w(&mut out, format!("Lc4 N1C4 out {}p\n", self.tech.c4_inductance()))?;
    w(&mut out, ".ends c4\n\n".into())?;

    w(&mut out, "*******************************************************************************\n* 3. TSV with RL modelling\n*******************************************************************************\n".into())?;
    w(&mut out, ".subckt tsv in out\n".into())?;
    w(&mut out, format!("Rtsv in N1TSV {}m\n", self.tech.tsv_resistance()))?;
    w(&mut out, format!("Ltsv N1TSV out {}p\n", self.tech.tsv_inductance()))?;
    w(&mut out, ".ends tsv\n\n".into())?;

    w(&mut out, "*******************************************************************************\n* 4. Microbump with RL modelling\n*******************************************************************************\n".into())?;
    w(&mut out, ".subckt ubump in out\n".into())?;
    w(&mut out, format!("Rubump in N1UB {}m\n", self.tech.microbump_resistance()))?;
    w(&mut out, format!("Lubump N1UB out {}p\n", self.tech.microbump_inductance()))?;
    w(&mut out, ".ends ubump\n\n".into())?;

    w(&mut out, "*******************************************************************************\n* Interposer equivalent circuit\n*******************************************************************************\n".into())?;

    let edge_r = 2.0 * self.interposer_resistance;
    let edge_l = 2.0 * self.interposer_inductance;
    let node = |layer: usize, x: usize, y: usize| format!("M{layer}_{x}_{y}");

    for (layer, canvas) in metal_layers.iter().enumerate() {
      for y in 0..canvas.height() {
        for x in 0..canvas.width() {
          if canvas.get(x, y) != sig {
            continue;
          }
          let here = node(layer, x, y);
          if y > 0 && canvas.get(x, y - 1) == sig {
            let below = node(layer, x, y - 1);
            let mid = format!("{below}_{here}");
            w(&mut out, format!("R{mid} N{below} N{mid} {edge_r}m\n"))?;
            w(&mut out, format!("L{mid} N{mid} N{here} {edge_l}p\n"))?;
          }
          if x > 0 && canvas.get(x - 1, y) == sig {
            let left = node(layer, x - 1, y);
            let mid = format!("{left}_{here}");
            w(&mut out, format!("R{mid} N{left} N{mid} {edge_r}m\n"))?;
            w(&mut out, format!("L{mid} N{mid} N{here} {edge_l}p\n"))?;
          }
        }
      }
    }

    // vertical pairs: via sites where both adjacent layers carry the net
    for layer in 0..metal_layers.len().saturating_sub(1) {
      let (upper, lower) = (&metal_layers[layer], &metal_layers[layer + 1]);
      for y in 0..upper.height() {
        for x in 0..upper.width() {
          if upper.get(x, y) == sig && lower.get(x, y) == sig {
            let a = node(layer, x, y);
            let b = node(layer + 1, x, y);
            let mid = format!("{a}_{b}");
            w(&mut out, format!("RT{mid} N{a} N{mid} {}m\n", self.via_resistance))?;
            w(&mut out, format!("LT{mid} N{mid} N{b} {}p\n", self.via_inductance))?;
          }
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn tech() -> Technology {
    Technology::parse(
      "INTERPOSER_METAL_PITCH = 4 um\n\
       INTERPOSER_METAL_WIDTH = 1 um\n\
       INTERPOSER_METAL_THICKNESS = 1 um\n\
       INTERPOSER_METAL_RESISTIVITY = 24 nOhm.m\n\
       INTERPOSER_DIELECTRIC_THICKNESS = 1 um\n\
       PERMITIVITY_OF_DIELECTRIC = 3.7\n\
       PERMITIVITY_OF_FREE_SPACE = 8.85 fF/m\n\
       PERMEABILITY_OF_VACCUM = 1.26 uH/m\n\
       C4_RESISTANCE = 10 mOhm\n\
       C4_INDUCTANCE = 30 pH\n\
       TSV_RESISTANCE = 20 mOhm\n\
       TSV_INDUCTANCE = 25 pH\n\
       MICROBUMP_RESISTANCE = 15 mOhm\n\
       MICROBUMP_INDUCTANCE = 12 pH\n\
       PCB_RESISTANCE = 100 uOhm\n\
       PCB_INDUCTANCE = 20 pH\n\
       PCB_DECAP_RESISTANCE = 150 uOhm\n\
       PCB_DECAP_INDUCTANCE = 5 nH\n\
       PCB_DECAP_CAPACITANCE = 200 uF\n",
      &PathBuf::from("t.tch"),
    )
    .unwrap()
  }

  #[test]
  fn test_derived_constants_positive() {
    let ext = EqCktExtractor::new(&tech());
    assert!(ext.interposer_resistance() > 0.0);
    assert!(ext.interposer_inductance() > 0.0);
    assert!(ext.via_resistance() > 0.0);
    assert!(ext.via_inductance() > 0.0);
  }

  #[test]
  fn test_netlist_structure() {
    let ext = EqCktExtractor::new(&tech());
    let mut m0 = Canvas::new(2, 1);
    let mut m1 = Canvas::new(2, 1);
    m0.set(0, 0, SignalType::Power(1));
    m0.set(1, 0, SignalType::Power(1));
    m1.set(0, 0, SignalType::Power(1));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p1.sp");
    ext
      .export_equivalent_circuit("fixture", SignalType::Power(1), &[m0, m1], &path)
      .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(".subckt pcb"));
    assert!(text.contains(".subckt c4"));
    assert!(text.contains(".subckt tsv"));
    assert!(text.contains(".subckt ubump"));
    // one horizontal metal edge on layer 0
    assert!(text.contains("RM0_0_0_M0_1_0"));
    // one via pair at (0, 0)
    assert!(text.contains("RTM0_0_0_M1_0_0"));
    assert!(text.contains("LTM0_0_0_M1_0_0"));
  }
}
