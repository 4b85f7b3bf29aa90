use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use valinor_batch::ops::{
    AttributeFilter, CollectTileStats, ExportTileAttributes, FeatureTypes, RemovePredictedSpeeds,
};
use valinor_batch::{BatchConfig, BatchDriver, BatchReport, TileOperation, TileQueue, WorkerCount};
use valinor_graphtile::GraphId;
use valinor_graphtile::graph_tile::predicted_speeds::{
    BUCKETS_PER_WEEK, bucket_label, decode_compressed_speeds, decompress_speed_bucket,
};
use valinor_graphtile::tile_hierarchy::STANDARD_LEVELS;
use valinor_graphtile::tile_provider::{DirectoryGraphTileProvider, GraphTileProvider};

mod progress;

/// Fixed so that runs are reproducible.
const SHUFFLE_SEED: u64 = 0x5EED;

#[derive(Parser, Debug)]
#[command(name = "valinor-tile-tools", author, version, about, long_about = None)]
struct Cli {
    /// Path to valhalla.json
    #[arg(short, long, env = "VALHALLA_CONFIG", conflicts_with = "inline_config")]
    config: Option<PathBuf>,

    /// Inline JSON config (used instead of a config file)
    #[arg(short, long, env)]
    inline_config: Option<String>,

    /// Number of worker threads.
    ///
    /// Defaults to mjolnir.concurrency, or the number of CPUs if that isn't set either.
    #[arg(short = 'j', long, env)]
    concurrency: Option<usize>,

    /// Disables progress output
    #[arg(env, long)]
    no_progress: bool,

    /// Subcommand/tool to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Removes predicted traffic from tiles, rewriting them in place.
    ///
    /// Nothing else may read the tiles while this runs.
    RemovePredictedTraffic {
        /// Graph IDs (u64 or level/tile/index) of the tiles to process.
        /// Defaults to every tile in the tile directory.
        graph_ids: Vec<GraphId>,
    },
    /// Prints summary statistics over tiles
    TileStats {
        /// Graph IDs (u64 or level/tile/index) of the tiles to process.
        /// Defaults to every tile in the tile directory.
        graph_ids: Vec<GraphId>,
    },
    /// Exports edge (and node) attributes to one JSON file per tile
    ExportTiles {
        /// Directory in which output files will be written
        #[arg(short = 'd', long)]
        output_directory: PathBuf,

        /// Feature types to output (edges and/or nodes; defaults to edges only)
        #[arg(short, long = "feature-type", value_delimiter = ',')]
        feature_types: Vec<String>,

        /// Attributes to include (ex: edge.speed)
        #[arg(short = 'a', long = "include-attributes", value_delimiter = ',')]
        include_attributes: Vec<String>,

        /// Attributes to exclude (ex: edge.use)
        #[arg(short = 'e', long = "exclude-attributes", value_delimiter = ',')]
        exclude_attributes: Vec<String>,

        /// Which predicted speed buckets to include, if any
        #[arg(short = 's', long, value_delimiter = ',')]
        predicted_speed_indices: Vec<usize>,

        /// Export every tile in the tile directory
        #[arg(short = 'g', long, conflicts_with = "graph_ids")]
        complete_graph: bool,

        /// Graph IDs of the tiles to export. If none are given (and not exporting the complete graph),
        /// they are read from stdin, one per line.
        graph_ids: Vec<GraphId>,
    },
    /// Lists the IDs of every tile intersecting a bounding box, across all standard levels
    TileIds {
        /// minx,miny,maxx,maxy (degrees)
        #[arg(short, long, value_parser = parse_bounding_box, allow_hyphen_values = true)]
        bounding_box: BoundingBox,
    },
    /// Decodes a base64 predicted speed profile into one speed (kph) per 5 minute bucket
    DecodeBuckets {
        /// The encoded profile
        encoded: String,
    },
}

#[derive(Debug, Copy, Clone)]
struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

fn parse_bounding_box(input: &str) -> Result<BoundingBox, String> {
    let values = input
        .split(',')
        .map(|value| value.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;
    let [west, south, east, north] = values[..] else {
        return Err(format!(
            "expected 4 comma separated values (minx,miny,maxx,maxy); got {}",
            values.len()
        ));
    };

    Ok(BoundingBox {
        west,
        south,
        east,
        north,
    })
}

fn load_config(path: Option<&Path>, inline: Option<&str>) -> anyhow::Result<BatchConfig> {
    match (inline, path) {
        (Some(json), _) => BatchConfig::from_json_str(json).context("Invalid inline config"),
        (None, Some(path)) => BatchConfig::from_file(path)
            .with_context(|| format!("Invalid config at {}", path.display())),
        (None, None) => Err(anyhow!(
            "A Valhalla config is required; pass --config or --inline-config"
        )),
    }
}

/// The explicit IDs if there are any, otherwise everything in the tile directory.
fn ids_or_all(
    provider: &DirectoryGraphTileProvider,
    graph_ids: Vec<GraphId>,
) -> anyhow::Result<Vec<GraphId>> {
    if !graph_ids.is_empty() {
        return Ok(graph_ids);
    }

    let graph_ids = provider.enumerate_tiles().with_context(|| {
        format!(
            "Unable to list tiles in {}",
            provider.base_directory().display()
        )
    })?;
    info!(count = graph_ids.len(), "Found tiles in the tile directory");
    Ok(graph_ids)
}

fn read_ids_from_stdin() -> anyhow::Result<Vec<GraphId>> {
    let mut graph_ids = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Unable to read tile IDs from stdin")?;
        let line = line.trim();
        if !line.is_empty() {
            graph_ids.push(
                line.parse()
                    .with_context(|| format!("Invalid graph ID on stdin: {line}"))?,
            );
        }
    }
    Ok(graph_ids)
}

fn run_batch<O: TileOperation<DirectoryGraphTileProvider>>(
    config: &BatchConfig,
    workers: WorkerCount,
    graph_ids: Vec<GraphId>,
    operation: &O,
) -> anyhow::Result<BatchReport<O::Output>> {
    let queue = TileQueue::shuffled(graph_ids, SHUFFLE_SEED);
    let progress_bar = progress::bar(
        queue.len() as u64,
        format!("Running {} on {} tiles...", operation.name(), queue.len()),
    );
    let operation = progress::WithProgress::new(operation, progress_bar.clone());

    let report = BatchDriver::new(workers).run(queue, || config.tile_provider(), &operation)?;
    progress_bar.inspect(ProgressBar::finish);

    if report.failed() > 0 {
        warn!(
            failed = report.failed(),
            attempted = report.attempted,
            "Some tiles could not be processed"
        );
    }
    Ok(report)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        // Standard logger, configured via the RUST_LOG env variable
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let cli = Cli::parse();
    if !cli.no_progress {
        progress::enable()?;
    }

    let config = || load_config(cli.config.as_deref(), cli.inline_config.as_deref());
    match cli.command {
        Commands::RemovePredictedTraffic { graph_ids } => {
            let config = config()?;
            let graph_ids = ids_or_all(&config.tile_provider(), graph_ids)?;
            let report = run_batch(
                &config,
                config.workers(cli.concurrency),
                graph_ids,
                &RemovePredictedSpeeds,
            )?;
            println!(
                "Removed predicted traffic from {} of {} tiles in {:.1?}",
                report.succeeded, report.attempted, report.elapsed
            );
        }
        Commands::TileStats { graph_ids } => {
            let config = config()?;
            let graph_ids = ids_or_all(&config.tile_provider(), graph_ids)?;
            let report = run_batch(
                &config,
                config.workers(cli.concurrency),
                graph_ids,
                &CollectTileStats,
            )?;
            println!("{}", report.output);
        }
        Commands::ExportTiles {
            output_directory,
            feature_types,
            include_attributes,
            exclude_attributes,
            predicted_speed_indices,
            complete_graph,
            graph_ids,
        } => {
            let config = config()?;
            let features = FeatureTypes::from_names(&feature_types)?;
            let filter = AttributeFilter::new(&include_attributes, &exclude_attributes)?
                .with_predicted_speed_buckets(predicted_speed_indices)?;

            let graph_ids = if complete_graph {
                ids_or_all(&config.tile_provider(), Vec::new())?
            } else if graph_ids.is_empty() {
                read_ids_from_stdin()?
            } else {
                graph_ids
            };
            if graph_ids.is_empty() {
                bail!("No tiles to export; pass graph IDs, pipe them in, or use --complete-graph");
            }

            let operation = ExportTileAttributes::new(output_directory.clone(), features, filter);
            let report = run_batch(
                &config,
                config.workers(cli.concurrency),
                graph_ids,
                &operation,
            )?;
            let totals = report.output;
            println!(
                "Exported {} edges and {} nodes from {} tiles to {}",
                totals.edges,
                totals.nodes,
                totals.tiles,
                output_directory.display()
            );
        }
        Commands::TileIds { bounding_box } => {
            let mut out = std::io::stdout().lock();
            for level in &*STANDARD_LEVELS {
                for graph_id in level.tiles_intersecting_bbox(
                    bounding_box.west,
                    bounding_box.south,
                    bounding_box.east,
                    bounding_box.north,
                ) {
                    writeln!(out, "{graph_id}")?;
                }
            }
        }
        Commands::DecodeBuckets { encoded } => {
            let coefficients = decode_compressed_speeds(&encoded)?;
            let mut out = std::io::stdout().lock();
            for bucket in 0..BUCKETS_PER_WEEK {
                writeln!(
                    out,
                    "{} {:.2}",
                    bucket_label(bucket),
                    decompress_speed_bucket(&coefficients, bucket)
                )?;
            }
        }
    }

    Ok(())
}
