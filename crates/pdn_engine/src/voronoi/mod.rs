//! Voronoi power-plane pipeline.
//!
//! Layer-independent geometry pipeline over the PDN substrate:
//!
//! ```text
//! ┌────────┐   ┌─────────┐   ┌─────┐   ┌──────────────┐   ┌───────────┐
//! │ Points ├──►│ Connect ├──►│ MST ├──►│ Rip+Reroute  ├──►│ Expansion │
//! └────────┘   │ Layers  │   └─────┘   └──────────────┘   └───────────┘
//!              └─────────┘                                      │
//! ┌─────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐    │
//! │ Enhance │◄──┤ Reconnect │◄──┤ Legalise  │◄──┤Rasterise│◄───┘
//! └─────────┘   └───────────┘   └───────────┘   └─────────┘
//! ```
//!
//! Points through Expansion run per layer on integer points of interest
//! (POIs) and canonically ordered segments; the Voronoi diagram and the
//! rasterisation are the only floating-point stages; legalisation onward is
//! exact integer geometry again.

pub mod diagram;
pub mod enhance;
pub mod expansion;
pub mod legalise;
pub mod points;
pub mod rasterise;
pub mod routing;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use glam::DVec2;
use tracing::info_span;

use crate::canvas::Canvas;
use crate::error::Result;
use crate::geometry::{OrderedSegment, Point};
use crate::pdn::PdnSubstrate;
use crate::signal::SignalType;

/// Per-layer POI and segment books, keyed by signal. `BTreeMap` keeps the
/// iteration order deterministic across runs.
pub type LayerPoints = BTreeMap<SignalType, Vec<Point>>;
pub type LayerSegments = BTreeMap<SignalType, Vec<OrderedSegment>>;

/// The Voronoi pipeline engine. Owns the substrate plus all per-layer
/// intermediates, which the visualiser emitters read back.
pub struct VoronoiPdnGen {
  substrate: PdnSubstrate,

  /// Canvas snapshot taken right after pad insertion; cells non-empty here
  /// are preplaced and immune to the pipeline.
  pub preplace_of_layers: Vec<Canvas>,

  pub points_of_layers: Vec<LayerPoints>,
  pub segments_of_layers: Vec<LayerSegments>,
  /// Voronoi cell winding per generator POI.
  pub voronoi_cells_of_layers: Vec<HashMap<Point, Vec<DVec2>>>,
}

impl VoronoiPdnGen {
  pub fn new(substrate: PdnSubstrate) -> Self {
    let layers = substrate.metal_layer_count();
    Self {
      substrate,
      preplace_of_layers: Vec::new(),
      points_of_layers: vec![LayerPoints::new(); layers],
      segments_of_layers: vec![LayerSegments::new(); layers],
      voronoi_cells_of_layers: vec![HashMap::new(); layers],
    }
  }

  pub fn from_pinout_file(path: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::new(PdnSubstrate::from_pinout_file(path)?))
  }

  pub fn substrate(&self) -> &PdnSubstrate {
    &self.substrate
  }

  pub fn substrate_mut(&mut self) -> &mut PdnSubstrate {
    &mut self.substrate
  }

  /// Stamp pads onto the canvases and snapshot the preplaced state.
  pub fn mark_preplaced_and_insert_pads(&mut self) {
    self.substrate.mark_preplaced_and_insert_pads();
    self.preplace_of_layers = self.substrate.metal_layers.clone();
  }

  /// Run the whole pipeline: steps A-J plus via assignment and the final
  /// floating-plane sweep.
  pub fn run_pipeline(&mut self) -> Result<()> {
    if self.preplace_of_layers.is_empty() {
      self.mark_preplaced_and_insert_pads();
    }

    {
      let _span = info_span!("init_points").entered();
      self.init_points_and_segments()?;
    }

    for layer in 0..self.substrate.metal_layer_count() - 1 {
      self.connect_layers(layer, layer + 1)?;
    }

    for layer in 0..self.substrate.metal_layer_count() {
      let _span = info_span!("layer_pipeline", layer).entered();
      self.run_mst_routing(layer)?;
      self.rip_and_reroute(layer)?;
      self.expand_power_plane_points(layer)?;
      self.generate_voronoi_diagram(layer);
      self.rasterise_layer(layer);
      self.legalise_layer(layer);
      self.reconnect_floating_regions(layer);
    }

    self.enhance_cross_layer();

    for layer in 0..self.substrate.metal_layer_count() {
      self.legalise_layer(layer);
      self.reconnect_floating_regions(layer);
    }

    self.substrate.assign_vias();
    for layer in 0..self.substrate.metal_layer_count() {
      self.substrate.remove_floating_planes(layer);
    }

    Ok(())
  }
}
