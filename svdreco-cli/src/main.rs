//! svdreco CLI
//!
//! Clusters SVD strip events and inspects channel maps.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};

use std::path::{Path, PathBuf};
use std::time::Instant;
use svdreco_algorithms::{Clusterizer, EventInput};
use svdreco_core::{ChannelMapConfig, ConstantCalibration, SensorId, StripGeometry};
use svdreco_io::{
    load_calibration, load_geometry, read_events, ClusterFileWriter, OutputFormat,
    RelationFileWriter, RunConfig,
};
use svdreco_map::ChannelMap;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    SvdrecoIo(#[from] svdreco_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] svdreco_core::Error),

    #[error("Channel map error: {0}")]
    Map(#[from] svdreco_map::Error),

    #[error("event {0} has no digits and no channel map was given (--map)")]
    NoMap(usize),
}

/// Cluster output format selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Comma-separated values with header
    Csv,
    /// Little-endian binary records
    Binary,
}

/// SVD strip clustering.
#[derive(Parser)]
#[command(name = "svdreco")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster the events of a JSON event file
    Cluster {
        /// Input event file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Cluster output file
        #[arg(short, long)]
        output: PathBuf,

        /// Channel map description (XML), needed for events without digits
        #[arg(short, long)]
        map: Option<PathBuf>,

        /// Relation output file (CSV)
        #[arg(long)]
        relations: Option<PathBuf>,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Calibration constants (JSON)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Sensor geometry (JSON)
        #[arg(long)]
        geometry: Option<PathBuf>,

        /// Output format; defaults from the output extension
        #[arg(short, long, value_enum)]
        format: Option<Format>,
    },

    /// Show channel map contents and unmapped chips
    MapInfo {
        /// Channel map description (XML)
        #[arg(short, long)]
        map: PathBuf,

        /// Sensors to check for unmapped chips, e.g. 3.1.1,4.2.1 (default: all mapped)
        #[arg(long, value_delimiter = ',')]
        sensors: Vec<SensorId>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Cluster {
            input,
            output,
            map,
            relations,
            config,
            calibration,
            geometry,
            format,
        } => run_cluster(&ClusterArgs {
            input,
            output,
            map,
            relations,
            config,
            calibration,
            geometry,
            format,
        }),
        Commands::MapInfo { map, sensors } => run_map_info(&map, sensors),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

struct ClusterArgs {
    input: PathBuf,
    output: PathBuf,
    map: Option<PathBuf>,
    relations: Option<PathBuf>,
    config: Option<PathBuf>,
    calibration: Option<PathBuf>,
    geometry: Option<PathBuf>,
    format: Option<Format>,
}

fn output_format(path: &Path, format: Option<Format>) -> OutputFormat {
    match format {
        Some(Format::Csv) => OutputFormat::Csv,
        Some(Format::Binary) => OutputFormat::Binary,
        None => {
            let ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase);
            match ext.as_deref() {
                Some("csv") => OutputFormat::Csv,
                Some("bin" | "dat") => OutputFormat::Binary,
                other => {
                    log::warn!("unknown output extension {other:?}, writing CSV");
                    OutputFormat::Csv
                }
            }
        }
    }
}

fn run_cluster(args: &ClusterArgs) -> Result<()> {
    let start = Instant::now();

    let config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    let calibration = match &args.calibration {
        Some(path) => load_calibration(path)?,
        None => ConstantCalibration::default(),
    };
    let geometry = match &args.geometry {
        Some(path) => load_geometry(path)?,
        None => StripGeometry::default(),
    };
    let map = args
        .map
        .as_ref()
        .map(|path| ChannelMap::load_or_empty(path, config.channel_map.clone()));
    if let Some(map) = &map {
        if !map.is_valid() {
            log::warn!("channel map unavailable, raw samples will not produce strips");
        }
    }

    log::debug!("clusterizer settings: {:?}", config.clusterizer);
    let clusterizer = Clusterizer::new(config.clusterizer.clone(), &calibration, &geometry)
        .with_time_fitter(&config.time_fitter);

    let events = read_events(&args.input)?;
    log::info!("{}: {} events", args.input.display(), events.len());

    let mut clusters_out =
        ClusterFileWriter::create(&args.output, output_format(&args.output, args.format))?;
    let mut relations_out = match &args.relations {
        Some(path) => Some(RelationFileWriter::create(path)?),
        None => None,
    };

    let mut total_digits = 0usize;
    let mut total_clusters = 0usize;
    for (index, event) in events.iter().enumerate() {
        let digits = match (&event.digits, &map) {
            (Some(digits), _) => digits.clone(),
            (None, Some(map)) => {
                let (digits, stats) = clusterizer
                    .unpacker(&config.unpacker, map)
                    .unpack(&event.raw);
                log::debug!("event {index}: {stats:?}");
                digits
            }
            (None, None) => return Err(CliError::NoMap(index)),
        };

        let mc = event.mc_table();
        let truehits = event.truehit_table();
        let mut input = EventInput::new(&digits, &event.raw);
        if let Some(table) = &mc {
            input = input.with_mc_relations(table);
        }
        if let Some(table) = &truehits {
            input = input.with_truehit_relations(table);
        }

        let output = clusterizer.process_event(&input)?;
        total_digits += digits.len();
        total_clusters += output.clusters.len();

        clusters_out.write_event(index, &output.clusters)?;
        if let Some(writer) = relations_out.as_mut() {
            writer.write_event(index, &output)?;
        }
    }
    clusters_out.flush()?;
    if let Some(writer) = relations_out.as_mut() {
        writer.flush()?;
    }
    if let Some(map) = &map {
        map.log_summary();
    }

    println!(
        "Processed {} events in {:.2}s",
        events.len(),
        start.elapsed().as_secs_f64()
    );
    println!("Total digits: {}", total_digits);
    println!("Total clusters: {}", total_clusters);
    Ok(())
}

fn run_map_info(path: &Path, sensors: Vec<SensorId>) -> Result<()> {
    let map = ChannelMap::from_file(path, ChannelMapConfig::default())?;

    println!("Map: {}", map.name().unwrap_or("<unnamed>"));
    println!("Chips: {}", map.chip_count());

    let sides = map.sensor_sides();
    for &(sensor, side) in &sides {
        let chips = map.chips_for(sensor, side);
        println!(
            "  {} {}: {} of {} chips",
            sensor,
            side,
            chips.len(),
            ChannelMap::expected_chips(sensor, side)
        );
        for chip in chips {
            println!(
                "    {} strips {}..{}",
                chip.address(),
                chip.strip_first,
                chip.strip_last
            );
        }
    }

    let sensors = if sensors.is_empty() {
        let mut all: Vec<SensorId> = sides.iter().map(|&(sensor, _)| sensor).collect();
        all.dedup();
        all
    } else {
        sensors
    };
    let missing = map.missing_apvs(sensors.iter().copied());
    println!("Missing APVs: {}", missing.len());
    for apv in &missing {
        println!(
            "  {} {} strips {}..={}",
            apv.sensor,
            apv.side,
            apv.first_strip,
            apv.last_strip
        );
    }
    Ok(())
}
