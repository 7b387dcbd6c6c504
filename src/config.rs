//! Configuration management for the `tiffscene` command line.
//!
//! This module provides the CLI definition, which supports:
//! - Subcommands for listing, describing and reading scenes
//! - Environment variables with `TIFFSCENE_` prefix for reader tuning
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use tiffscene::config::Cli;
//!
//! let cli = Cli::parse();
//! let options = cli.command.file_args().reader_options();
//! ```
//!
//! # Environment Variables
//!
//! - `TIFFSCENE_BLOCK_SIZE` - Block size of the per-handle block cache (default: 64KB)
//! - `TIFFSCENE_CACHE_BLOCKS` - Blocks cached per handle (default: 64)
//! - `TIFFSCENE_CONCURRENCY` - Lazy blocks loaded at once (default: 8)
//! - `TIFFSCENE_CHUNK_DIMS` - Axes read whole inside each block (default: ZYXS)

use std::ops::Range;

use clap::{Args, Parser, Subcommand};

use crate::grid::DEFAULT_BLOCK_CONCURRENCY;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::reader::{ChannelNames, DimOrder, ReaderOptions};

// =============================================================================
// Default Values
// =============================================================================

/// Default chunk axes, as typed on the command line.
pub const DEFAULT_CHUNK_DIMS: &str = "ZYXS";

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiffscene - Inspect and read multi-scene microscopy TIFF files.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiffscene")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the scenes of a file.
    Scenes(ScenesConfig),

    /// Describe a scene: dims, shape, dtype, pixel sizes and block grid.
    Info(InfoConfig),

    /// Read a scene (or a region of it) and print summary statistics.
    Read(ReadConfig),
}

impl Command {
    /// File arguments shared by every subcommand.
    pub fn file_args(&self) -> &FileArgs {
        match self {
            Command::Scenes(c) => &c.file,
            Command::Info(c) => &c.file,
            Command::Read(c) => &c.file,
        }
    }
}

/// Arguments identifying a file and tuning how it is read.
#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Path of the TIFF file.
    pub path: String,

    // =========================================================================
    // Interpretation
    // =========================================================================
    /// Axes read whole inside each lazy block (Y, X and S are always added).
    #[arg(long, default_value = DEFAULT_CHUNK_DIMS, env = "TIFFSCENE_CHUNK_DIMS")]
    pub chunk_dims: String,

    /// Axis order override applied to every scene (e.g. "TCZYX").
    #[arg(long)]
    pub dim_order: Option<String>,

    /// Channel names applied to every scene (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channel_names: Option<Vec<String>>,

    // =========================================================================
    // I/O Tuning
    // =========================================================================
    /// Block size in bytes for each handle's block cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "TIFFSCENE_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks cached per handle.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "TIFFSCENE_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Maximum number of lazy blocks loaded at once.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CONCURRENCY, env = "TIFFSCENE_CONCURRENCY")]
    pub concurrency: usize,
}

impl FileArgs {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("A file path is required".to_string());
        }

        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }

        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }

        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }

        if let Some(label) = self.chunk_dims.chars().find(|c| !c.is_ascii_alphabetic()) {
            return Err(format!("chunk_dims may only contain axis letters, found {:?}", label));
        }

        Ok(())
    }

    /// Reader options described by these arguments.
    pub fn reader_options(&self) -> ReaderOptions {
        let mut options = ReaderOptions::default()
            .with_chunk_dims(self.chunk_dims.chars())
            .with_block_cache(self.block_size, self.cache_blocks)
            .with_concurrency(self.concurrency);

        if let Some(order) = &self.dim_order {
            options = options.with_dim_order(DimOrder::Shared(order.clone()));
        }
        if let Some(names) = &self.channel_names {
            options = options.with_channel_names(ChannelNames::Shared(names.clone()));
        }

        options
    }
}

/// Arguments of `tiffscene scenes`.
#[derive(Args, Debug, Clone)]
pub struct ScenesConfig {
    #[command(flatten)]
    pub file: FileArgs,

    /// Print scene summaries as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments of `tiffscene info`.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub file: FileArgs,

    /// Scene id (`Image:<n>`) or index.
    #[arg(long, default_value = "0")]
    pub scene: String,

    /// Print as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments of `tiffscene read`.
#[derive(Args, Debug, Clone)]
pub struct ReadConfig {
    #[command(flatten)]
    pub file: FileArgs,

    /// Scene id (`Image:<n>`) or index.
    #[arg(long, default_value = "0")]
    pub scene: String,

    /// Region to read, one entry per axis: `start:end`, `index` or `:`.
    ///
    /// Example: `0:2,:,10:20`. Omitted trailing axes are read whole.
    #[arg(long)]
    pub region: Option<String>,

    /// Read the whole scene in one pass instead of block by block.
    #[arg(long, default_value_t = false, conflicts_with = "region")]
    pub immediate: bool,
}

// =============================================================================
// Argument Parsing Helpers
// =============================================================================

/// Parse a region expression against a shape.
///
/// Entries are comma-separated, one per axis: `start:end` (either side may
/// be empty), a single index, or `:` for the whole axis.
pub fn parse_region(expr: &str, shape: &[usize]) -> Result<Vec<Range<usize>>, String> {
    let parts: Vec<&str> = expr.split(',').map(str::trim).collect();
    if parts.len() > shape.len() {
        return Err(format!(
            "region has {} entries but the scene has {} axes",
            parts.len(),
            shape.len()
        ));
    }

    let parse = |text: &str, default: usize| -> Result<usize, String> {
        if text.is_empty() {
            Ok(default)
        } else {
            text.parse()
                .map_err(|_| format!("invalid region bound {:?}", text))
        }
    };

    let mut region = Vec::with_capacity(shape.len());
    for (axis, &size) in shape.iter().enumerate() {
        let range = match parts.get(axis) {
            None => 0..size,
            Some(part) => match part.split_once(':') {
                Some((start, end)) => parse(start, 0)?..parse(end, size)?,
                None => {
                    let index = parse(part, 0)?;
                    index..index + 1
                }
            },
        };
        if range.start > range.end || range.end > size {
            return Err(format!(
                "range {}..{} out of bounds for axis {} of size {}",
                range.start, range.end, axis, size
            ));
        }
        region.push(range);
    }

    Ok(region)
}

/// Interpret a scene argument: a plain number is an index, anything else an id.
pub fn parse_scene(scene: &str) -> crate::reader::SceneRef {
    match scene.parse::<usize>() {
        Ok(index) => index.into(),
        Err(_) => scene.into(),
    }
}

// =============================================================================
// Tests
// =============================================================================
