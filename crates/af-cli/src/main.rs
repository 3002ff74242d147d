//! ArrayForge command line
//!
//! Usage:
//!   arrayforge presets [--json]                  - List built-in layouts
//!   arrayforge order --preset aalto_full         - Characteristic ambisonic order
//!   arrayforge gains --preset graz --az 30 --el 10 --mode allrap2
//!   arrayforge bsdm --input stream.json --jobs 4 - Binaural SDM render

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use af_spatial::{
    DecoderConfig, DecodingMode, Direction, HrirSet, Jobs, LayoutPreset,
    LoudspeakerSetup, SdmRenderer, SdmStream, builtin_names,
};

#[derive(Parser)]
#[command(name = "arrayforge", about = "Loudspeaker-array decoding and SDM rendering", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LayoutArgs {
    /// Built-in layout name
    #[arg(short, long, default_value = "aalto_full")]
    preset: String,
    /// Layout JSON file, overrides --preset
    #[arg(short, long)]
    layout: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in layouts
    Presets {
        /// Print full layout descriptions
        #[arg(long)]
        json: bool,
    },
    /// Print triangulation summary and characteristic order
    Order {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Panning gains for one source direction
    Gains {
        #[command(flatten)]
        layout: LayoutArgs,
        /// Azimuth in degrees
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        az: f64,
        /// Elevation in degrees
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        el: f64,
        /// Decoding mode (vbap, allrap, allrap2, nls)
        #[arg(short, long)]
        mode: Option<DecodingMode>,
        /// SH order for ALLRAP
        #[arg(long)]
        n_sph: Option<usize>,
        /// Decoder config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Binaural SDM render through the synthetic HRIR set
    Bsdm {
        /// Stream JSON with pressure, azimuth and colatitude arrays
        #[arg(short, long)]
        input: PathBuf,
        /// Output JSON file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads, automatic if omitted
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Sample rate of the stream
        #[arg(long, default_value_t = 48000)]
        fs: u32,
    },
}

#[derive(Deserialize)]
struct StreamFile {
    pressure: Vec<f64>,
    azimuth: Vec<f64>,
    colatitude: Vec<f64>,
}

#[derive(Serialize)]
struct GainsReport<'a> {
    layout: &'a str,
    mode: DecodingMode,
    azimuth_deg: f64,
    elevation_deg: f64,
    gains: Vec<f64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Presets { json } => list_presets(json),
        Commands::Order { layout } => print_order(&layout),
        Commands::Gains {
            layout,
            az,
            el,
            mode,
            n_sph,
            config,
        } => print_gains(&layout, az, el, mode, n_sph, config.as_deref()),
        Commands::Bsdm {
            input,
            output,
            jobs,
            fs,
        } => render_bsdm(&input, output.as_deref(), Jobs::from_count(jobs), fs),
    }
}

fn load_layout(args: &LayoutArgs) -> Result<LayoutPreset> {
    match &args.layout {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read layout {}", path.display()))?;
            Ok(LayoutPreset::from_json(&json)?)
        }
        None => Ok(LayoutPreset::builtin(&args.preset)?),
    }
}

fn list_presets(json: bool) -> Result<()> {
    for name in builtin_names() {
        let preset = LayoutPreset::builtin(name)?;
        if json {
            println!("{}", preset.to_json()?);
        } else {
            println!("{name:<16} {} loudspeakers", preset.len());
        }
    }
    Ok(())
}

fn print_order(args: &LayoutArgs) -> Result<()> {
    let preset = load_layout(args)?;
    let setup = LoudspeakerSetup::from_preset(&preset)?;
    println!("layout:              {}", preset.name);
    println!("loudspeakers:        {}", setup.num_loudspeakers());
    println!("triangles:           {}", setup.hull().triangles.len());
    println!("removed triangles:   {}", setup.removed_triangles().len());
    for (tri, reason) in setup.removed_triangles() {
        println!("  {tri:?}: {reason:?}");
    }
    match setup.characteristic_order() {
        Ok(order) => println!("characteristic order: {order}"),
        Err(e) => println!("characteristic order: n/a ({e})"),
    }
    Ok(())
}

fn print_gains(
    args: &LayoutArgs,
    az: f64,
    el: f64,
    mode: Option<DecodingMode>,
    n_sph: Option<usize>,
    config: Option<&Path>,
) -> Result<()> {
    let mut decoder = match config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            DecoderConfig::from_json(&json)?
        }
        None => DecoderConfig::default(),
    };
    if let Some(mode) = mode {
        decoder = decoder.with_mode(mode);
    }
    if let Some(n) = n_sph {
        decoder = decoder.with_n_sph(n);
    }

    let preset = load_layout(args)?;
    let mut setup = LoudspeakerSetup::from_preset(&preset)?;
    let source: Vector3<f64> = Direction::from_elevation_degrees(az, el).to_vector();
    let gains = decoder.decode(&[source], &mut setup)?;

    let report = GainsReport {
        layout: &preset.name,
        mode: decoder.mode,
        azimuth_deg: az,
        elevation_deg: el,
        gains: gains.row(0).to_vec(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn render_bsdm(input: &Path, output: Option<&Path>, jobs: Jobs, fs: u32) -> Result<()> {
    let json = fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let file: StreamFile = serde_json::from_str(&json).context("Invalid stream file")?;
    let stream = SdmStream::new(file.pressure, file.azimuth, file.colatitude)?;
    if stream.is_empty() {
        bail!("Stream {} has no samples", input.display());
    }

    let hrirs = HrirSet::synthetic(fs);
    let renderer = SdmRenderer::new(jobs);
    let ir = renderer.render_bsdm(&stream, &hrirs)?;
    info!("Rendered {} samples per ear, peak {:.4}", ir.len(), ir.peak());

    let out = serde_json::to_string(&*ir)?;
    match output {
        Some(path) => {
            fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{out}"),
    }
    Ok(())
}
