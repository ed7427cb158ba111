//! Configuration parsing for the trace driver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use glam::{DVec3, IVec3};
use octree_tracer::cache::DEFAULT_CACHE_CAPACITY;
use octree_tracer::trace::{DEFAULT_PADDING, DEFAULT_SEARCH_TIMEOUT};
use octree_tracer::{IndexStyle, OctreeMetadata, TileFormat, TracerConfig, ZoomLevel};
use serde::Deserialize;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
	pub volume: VolumeConfig,
	#[serde(default)]
	pub tracer: TracerSection,
}

/// Where the octree lives and how its samples are laid out.
#[derive(Debug, Deserialize)]
pub struct VolumeConfig {
	/// Octree root folder; relative paths resolve against the config file.
	pub root: PathBuf,
	/// Tile width, height and slices per octree block.
	pub tile_size: [i32; 3],
	/// Full-resolution volume size in voxels.
	pub volume_size: [i32; 3],
	pub zoom_level_count: u32,
	/// Physical voxel size [x, y, z].
	pub voxel_micrometers: [f64; 3],
	/// Volume origin in voxels.
	#[serde(default)]
	pub origin: [i32; 3],
	#[serde(default = "default_bit_depth")]
	pub bit_depth: u32,
	#[serde(default = "default_channel_count")]
	pub channel_count: u32,
	#[serde(default)]
	pub octree_style: bool,
}

/// Search settings; every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TracerSection {
	pub padding: i32,
	pub timeout_secs: f64,
	pub zoom: u32,
	pub channel: u32,
	/// Radians.
	pub simplify_tolerance: f64,
	pub cache_capacity: usize,
	/// Voxels dimmer than this are never stepped into.
	pub passable_floor: Option<u16>,
}

impl Default for TracerSection {
	fn default() -> Self {
		Self {
			padding: DEFAULT_PADDING,
			timeout_secs: DEFAULT_SEARCH_TIMEOUT.as_secs_f64(),
			zoom: 0,
			channel: 0,
			simplify_tolerance: 0.0,
			cache_capacity: DEFAULT_CACHE_CAPACITY,
			passable_floor: None,
		}
	}
}

fn default_bit_depth() -> u32 {
	8
}

fn default_channel_count() -> u32 {
	1
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let mut config = Self::parse(&content)?;

		if config.volume.root.is_relative() {
			let base = path.parent().unwrap_or(Path::new("."));
			config.volume.root = base.join(&config.volume.root);
		}
		Ok(config)
	}

	/// Parse and validate configuration text.
	pub fn parse(content: &str) -> Result<Self> {
		let config: Config = toml::from_str(content).with_context(|| "Failed to parse config TOML")?;

		if config.tracer.timeout_secs <= 0.0 || !config.tracer.timeout_secs.is_finite() {
			anyhow::bail!(
				"timeout_secs must be positive, got {}",
				config.tracer.timeout_secs
			);
		}
		if config.tracer.padding < 0 {
			anyhow::bail!("padding must not be negative, got {}", config.tracer.padding);
		}
		if config.tracer.cache_capacity == 0 {
			anyhow::bail!("cache_capacity must be at least 1");
		}
		if config.tracer.channel >= config.volume.channel_count {
			anyhow::bail!(
				"channel {} out of range for {} channels",
				config.tracer.channel,
				config.volume.channel_count
			);
		}
		config
			.volume
			.sampling_format()
			.validate()
			.with_context(|| "Invalid volume section")?;

		Ok(config)
	}
}

impl VolumeConfig {
	/// Sampling fields only; the pyramid shape comes from [`Self::metadata`].
	pub fn sampling_format(&self) -> TileFormat {
		TileFormat {
			origin: IVec3::from_array(self.origin),
			voxel_micrometers: DVec3::from_array(self.voxel_micrometers),
			bit_depth: self.bit_depth,
			channel_count: self.channel_count,
			intensity_max: 1u32.checked_shl(self.bit_depth).map_or(u32::MAX, |v| v - 1),
			index_style: if self.octree_style {
				IndexStyle::Octree
			} else {
				IndexStyle::Quadtree
			},
			..Default::default()
		}
	}

	/// Pyramid shape as the octree folder would report it.
	pub fn metadata(&self) -> OctreeMetadata {
		let tile_size = IVec3::from_array(self.tile_size);
		let bytes_per_intensity = (self.bit_depth as usize).div_ceil(8);
		OctreeMetadata {
			tile_size,
			volume_size: IVec3::from_array(self.volume_size),
			zoom_level_count: self.zoom_level_count,
			standard_tile_byte_size: tile_size.x.max(0) as usize
				* tile_size.y.max(0) as usize
				* self.channel_count as usize
				* bytes_per_intensity,
		}
	}
}

impl TracerSection {
	pub fn to_tracer_config(&self) -> TracerConfig {
		TracerConfig {
			padding: self.padding,
			timeout: Duration::from_secs_f64(self.timeout_secs),
			zoom: ZoomLevel::new(self.zoom),
			channel: self.channel,
			simplify_tolerance: self.simplify_tolerance,
			cache_capacity: self.cache_capacity,
			passable_floor: self.passable_floor,
		}
	}
}
