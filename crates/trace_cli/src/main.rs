//! Path tracing driver.
//!
//! Traces one path between two micrometer positions in an octree of raw
//! slice files and prints the simplified polyline, one vertex per line.
//!
//! ```text
//! trace_path --config volume.toml --from 120.5 88.0 14.0 --to 161.25 97.5 18.0
//! ```
//!
//! Set `RUST_LOG=debug` to follow tile loads and search progress.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use octree_tracer::{
	AnchorId, CoordinateAxis, MicrometerXyz, PathTraceRequest, PathTracer, RawOctreeTileSource,
	TileSource, TraceOutcome,
};

use config::Config;

/// Output coordinate space for the traced vertices.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Units {
	/// Micrometers.
	Micrometers,
	/// Zoomed voxel indices at the tracing zoom level.
	Voxels,
}

/// Trace a neurite between two points.
#[derive(Parser, Debug)]
#[command(name = "trace_path")]
#[command(about = "Traces the brightest path between two points in a raw octree volume")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: PathBuf,

	/// Start position in micrometers.
	#[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
	from: Vec<f64>,

	/// End position in micrometers.
	#[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
	to: Vec<f64>,

	/// Override the configured search timeout.
	#[arg(long)]
	timeout_secs: Option<f64>,

	#[arg(long, value_enum, default_value_t = Units::Micrometers)]
	units: Units,

	/// Print every voxel of the raw path instead of the simplified one.
	#[arg(long, default_value_t = false)]
	raw: bool,
}

fn micrometers(values: &[f64]) -> Result<MicrometerXyz> {
	match values {
		&[x, y, z] => Ok(MicrometerXyz::new(x, y, z)),
		_ => anyhow::bail!("expected three coordinates, got {}", values.len()),
	}
}

fn run(args: Args) -> Result<bool> {
	let mut config = Config::load(&args.config)?;
	if let Some(timeout) = args.timeout_secs {
		anyhow::ensure!(timeout > 0.0, "timeout must be positive, got {}", timeout);
		config.tracer.timeout_secs = timeout;
	}
	let volume = &config.volume;
	log::info!("opening octree at {}", volume.root.display());

	let source = RawOctreeTileSource::open(&volume.root, &volume.metadata(), volume.sampling_format())
		.with_context(|| format!("Failed to open octree: {}", volume.root.display()))?;
	let format = source.tile_format().clone();
	let tracer = PathTracer::with_new_cache(Arc::new(source), config.tracer.to_tracer_config());

	let request = PathTraceRequest::new(
		AnchorId(1),
		AnchorId(2),
		micrometers(&args.from)?,
		micrometers(&args.to)?,
	);
	let outcome = tracer.trace(&request).context("Trace failed")?;

	let segment = match outcome {
		TraceOutcome::Traced(segment) => segment,
		TraceOutcome::TimedOut { expanded, .. } => {
			eprintln!("timed out after {} nodes", expanded);
			return Ok(false);
		}
		TraceOutcome::NoPathFound { .. } => {
			eprintln!("no path found");
			return Ok(false);
		}
		TraceOutcome::Cancelled { .. } => {
			eprintln!("cancelled");
			return Ok(false);
		}
	};

	let points = if args.raw { segment.path() } else { segment.simplified() };
	match args.units {
		Units::Voxels => {
			for point in points {
				println!("{} {} {}", point.x, point.y, point.z);
			}
		}
		Units::Micrometers => {
			for &point in points {
				let um = format.micrometer_xyz_for_zoomed_voxel_index(point, CoordinateAxis::Z).0;
				println!("{:.3} {:.3} {:.3}", um.x, um.y, um.z);
			}
		}
	}

	let snapshot = tracer.cache().stats().snapshot();
	log::info!(
		"{} path voxels, {} vertices, cost {:.4}; {} tile loads, {} missing",
		segment.path().len(),
		segment.simplified().len(),
		segment.cost(),
		snapshot.loads,
		snapshot.missing
	);
	Ok(true)
}

fn main() -> ExitCode {
	env_logger::init();
	let args = Args::parse();

	match run(args) {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::from(2),
		Err(err) => {
			eprintln!("error: {:#}", err);
			ExitCode::FAILURE
		}
	}
}
