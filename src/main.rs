//! tiffscene - inspect and read multi-scene microscopy TIFF files.
//!
//! This binary wires the command line to the scene reader.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiffscene::{
    config::{parse_region, parse_scene, Cli, Command, FileArgs, InfoConfig, ReadConfig, ScenesConfig},
    LocalFileSource, ReaderError, TiffReader,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.command.file_args().validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Scenes(config) => run_scenes(config).await,
        Command::Info(config) => run_info(config).await,
        Command::Read(config) => run_read(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiffscene=debug"
    } else {
        "tiffscene=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open(file: &FileArgs) -> Result<TiffReader<LocalFileSource>, ReaderError> {
    TiffReader::open(LocalFileSource::new(), &file.path, file.reader_options()).await
}

type CommandResult = Result<(), Box<dyn std::error::Error>>;

// =============================================================================
// Scenes Command
// =============================================================================

async fn run_scenes(config: ScenesConfig) -> CommandResult {
    let reader = open(&config.file).await?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&reader.scene_summaries().await?)?);
        return Ok(());
    }

    for summary in reader.scene_summaries().await? {
        println!(
            "{}  {}  {:?}  {}  ({})",
            summary.id, summary.dims, summary.shape, summary.dtype, summary.kind
        );
    }
    Ok(())
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> CommandResult {
    let mut reader = open(&config.file).await?;
    reader.set_scene(parse_scene(&config.scene)).await?;

    let plan = reader.chunk_plan().await?;
    let sizes = reader.physical_pixel_sizes().await;
    let lazy = reader.read_lazy().await?;
    let description = lazy.attrs.description().map(str::to_string);

    if config.json {
        let json = serde_json::json!({
            "scene": reader.current_scene(),
            "dims": lazy.dims_string(),
            "shape": lazy.data.shape(),
            "dtype": lazy.data.dtype(),
            "channels": reader.channel_names().await?,
            "physical_pixel_sizes": sizes,
            "chunk_dims": plan.chunked_dims().iter().collect::<String>(),
            "block_grid": plan.grid_shape(),
            "block_shape": plan.block_shape(),
            "description": description,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Scene:        {}", reader.current_scene());
    println!("Dims:         {}", lazy.dims_string());
    println!("Shape:        {:?}", lazy.data.shape());
    println!("Dtype:        {}", lazy.data.dtype());
    if let Some(channels) = reader.channel_names().await? {
        println!("Channels:     {}", channels.join(", "));
    }
    println!(
        "Pixel size:   Z={} Y={} X={} (um)",
        format_size(sizes.z),
        format_size(sizes.y),
        format_size(sizes.x)
    );
    println!(
        "Blocks:       {} x {:?} over {}",
        plan.block_count(),
        plan.block_shape(),
        plan.chunked_dims().iter().collect::<String>()
    );
    if let Some(description) = description {
        println!("Description:  {}", description.lines().next().unwrap_or(""));
    }
    Ok(())
}

fn format_size(size: Option<f64>) -> String {
    size.map(|s| format!("{:.4}", s))
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Read Command
// =============================================================================

async fn run_read(config: ReadConfig) -> CommandResult {
    let mut reader = open(&config.file).await?;
    reader.set_scene(parse_scene(&config.scene)).await?;

    let data = if config.immediate {
        reader.read().await?
    } else {
        let lazy = reader.read_lazy().await?;
        match &config.region {
            Some(expr) => {
                let region = parse_region(expr, lazy.data.shape())?;
                info!(region = ?region, "Reading region");
                lazy.compute_region(&region).await?
            }
            None => lazy.compute().await?,
        }
    };

    println!("Dims:   {}", data.dims_string());
    println!("Shape:  {:?}", data.data.shape());
    println!("Dtype:  {}", data.data.dtype());
    match data.data.statistics() {
        Some(stats) => println!(
            "Stats:  min={} max={} mean={:.4}",
            stats.min, stats.max, stats.mean
        ),
        None => println!("Stats:  (empty)"),
    }
    Ok(())
}
