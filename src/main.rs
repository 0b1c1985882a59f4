//! PowerX command line: load a pinout configuration, run one of the two
//! synthesis pipelines and emit the result artefacts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pdn_engine::diffusion::{DiffusionConfig, DiffusionEngine};
use pdn_engine::spice::EqCktExtractor;
use pdn_engine::voronoi::VoronoiPdnGen;
use pdn_engine::{viz, EngineError, SignalType, Technology, POWER_SIGNAL_SET};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Pipeline {
  /// Voronoi plane generation (routing + region growth).
  Voronoi,
  /// Cell-graph assignment via multi-commodity flow plus filler.
  Diffusion,
}

#[derive(Parser, Debug)]
#[command(name = "powerx", about = "Power plane synthesis for 2.5D/3D interposer PDNs")]
struct Args {
  /// Pinout configuration file.
  #[arg(long)]
  pinout: PathBuf,

  /// Technology file for SPICE extraction and filler conductances.
  #[arg(long)]
  tech: Option<PathBuf>,

  /// Hyperparameter overrides for the diffusion pipeline.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Which synthesis pipeline to run.
  #[arg(long, value_enum, default_value_t = Pipeline::Voronoi)]
  pipeline: Pipeline,

  /// Directory for visualiser and netlist artefacts.
  #[arg(long, default_value = "outputs")]
  output_dir: PathBuf,

  /// Skip visualiser dumps.
  #[arg(long)]
  no_viz: bool,

  /// Emit one SPICE netlist per power net (requires --tech).
  #[arg(long)]
  spice: bool,

  /// Run the particle-diffusion estimator after the diffusion pipeline and
  /// dump per-layer pressure fields.
  #[arg(long)]
  pressure: bool,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();
  match run(&args) {
    Ok(()) => {
      info!("PowerX finished");
      ExitCode::SUCCESS
    }
    Err(err) => {
      eprintln!("powerx: {err:#}");
      let code = err
        .downcast_ref::<EngineError>()
        .map(EngineError::exit_code)
        .unwrap_or(1);
      ExitCode::from(code as u8)
    }
  }
}

fn run(args: &Args) -> anyhow::Result<()> {
  let tech = args
    .tech
    .as_deref()
    .map(Technology::from_file)
    .transpose()
    .context("loading technology file")?;

  std::fs::create_dir_all(&args.output_dir)
    .with_context(|| format!("creating {}", args.output_dir.display()))?;

  match args.pipeline {
    Pipeline::Voronoi => run_voronoi(args, tech.as_ref()),
    Pipeline::Diffusion => run_diffusion(args, tech),
  }
}

fn run_voronoi(args: &Args, tech: Option<&Technology>) -> anyhow::Result<()> {
  let mut gen = VoronoiPdnGen::from_pinout_file(&args.pinout)?;
  gen.mark_preplaced_and_insert_pads();
  gen.run_pipeline()?;

  let substrate = gen.substrate();
  for layer in 0..substrate.metal_layer_count() {
    let ok = substrate.check_one_piece(layer);
    info!(layer, one_piece = ok, "layer synthesised");
  }

  if !args.no_viz {
    for layer in 0..substrate.metal_layer_count() {
      viz::visualise_points_segments(&gen, layer, out_path(args, &format!("ps{layer}.txt")))?;
      viz::visualise_voronoi_polygons(&gen, layer, out_path(args, &format!("vd{layer}.txt")))?;
    }
    emit_layer_dumps(args, substrate)?;
  }

  if args.spice {
    emit_spice(args, tech, substrate)?;
  }
  Ok(())
}

fn run_diffusion(args: &Args, tech: Option<Technology>) -> anyhow::Result<()> {
  let config = match &args.config {
    Some(path) => DiffusionConfig::from_file(path)?,
    None => DiffusionConfig::default(),
  };
  let substrate = pdn_engine::PdnSubstrate::from_pinout_file(&args.pinout)?;
  let mut engine = DiffusionEngine::new(substrate, config);
  engine.technology = tech.clone();
  engine.run_pipeline()?;

  if args.pressure {
    engine.run_diffusion(0.25, 8);
    for layer in 0..engine.substrate.metal_layer_count() {
      viz::visualise_pressure_simulator(&engine, layer, out_path(args, &format!("pr{layer}.txt")))?;
    }
  }

  if !args.no_viz {
    for layer in 0..engine.substrate.metal_layer_count() {
      viz::visualise_diffusion_metal(&engine, layer, out_path(args, &format!("dm{layer}.txt")))?;
    }
    for layer in 0..engine.substrate.via_layer_count() {
      viz::visualise_diffusion_via(&engine, layer, out_path(args, &format!("dv{layer}.txt")))?;
    }
    emit_layer_dumps(args, &engine.substrate)?;
  }

  if args.spice {
    emit_spice(args, tech.as_ref(), &engine.substrate)?;
  }
  Ok(())
}

fn emit_layer_dumps(args: &Args, substrate: &pdn_engine::PdnSubstrate) -> anyhow::Result<()> {
  let layers = substrate.metal_layer_count();
  for layer in 0..layers {
    let name = format!("m{layer}.txt");
    if layer == 0 {
      viz::visualise_grid_array_with_pin(
        &substrate.metal_layers[layer],
        &substrate.via_layers[0],
        out_path(args, &name),
      )?;
    } else if layer == layers - 1 {
      viz::visualise_grid_array_with_pin(
        &substrate.metal_layers[layer],
        &substrate.via_layers[layer - 1],
        out_path(args, &name),
      )?;
    } else {
      viz::visualise_grid_array_with_pins(
        &substrate.metal_layers[layer],
        &substrate.via_layers[layer - 1],
        &substrate.via_layers[layer],
        out_path(args, &name),
      )?;
    }
  }
  Ok(())
}

fn emit_spice(
  args: &Args,
  tech: Option<&Technology>,
  substrate: &pdn_engine::PdnSubstrate,
) -> anyhow::Result<()> {
  let Some(tech) = tech else {
    anyhow::bail!("--spice requires --tech");
  };
  let extractor = EqCktExtractor::new(tech);
  for sig in POWER_SIGNAL_SET {
    if !signal_present(substrate, sig) {
      continue;
    }
    let SignalType::Power(n) = sig else { continue };
    let path = out_path(args, &format!("POWER{n}.sp"));
    extractor.export_equivalent_circuit("powerx", sig, &substrate.metal_layers, &path)?;
    info!(net = %sig, file = %path.display(), "netlist written");
  }
  Ok(())
}

fn signal_present(substrate: &pdn_engine::PdnSubstrate, sig: SignalType) -> bool {
  substrate.metal_layers.iter().any(|canvas| {
    (0..canvas.height()).any(|y| (0..canvas.width()).any(|x| canvas.get(x, y) == sig))
  })
}

fn out_path(args: &Args, name: &str) -> PathBuf {
  Path::new(&args.output_dir).join(name)
}
