use anyhow::{Context, Result};
use clap::Parser;
use event_reconstruction::{
    calibration::{CalibrationConstants, CalibrationStore, RunningPedestal},
    config::ReconstructionConfig,
    models::ModelBundle,
    processing::EventPipeline,
    source_dep::SourcePosition,
};
use cherenkov_common::{
    RawWaveform, Real,
    geometry::CameraGeometry,
    metrics::{
        component_info_metric,
        metric_names::{
            EVENTS_INVALID, EVENTS_PROCESSED, EVENTS_RECONSTRUCTED, EVENTS_REJECTED,
            EVENTS_SKIPPED, PEDESTAL_UPDATES,
        },
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Reconstruction configuration document (JSON).
    #[clap(long)]
    config: PathBuf,

    /// Camera geometry file (JSON).
    #[clap(long)]
    geometry: PathBuf,

    /// Calibration constants (JSON). Required unless custom-calibration
    /// is set.
    #[clap(long)]
    calibration: Option<PathBuf>,

    /// Model bundle artifact (JSON).
    #[clap(long)]
    models: PathBuf,

    /// Input events (JSON array of raw waveforms).
    #[clap(long)]
    events: PathBuf,

    /// Output file for event records (JSON lines); stdout when unset.
    #[clap(long)]
    output: Option<PathBuf>,

    /// On-region source position in the camera frame, x coordinate.
    #[clap(long)]
    source_pos_x: Option<Real>,

    /// On-region source position in the camera frame, y coordinate.
    #[clap(long)]
    source_pos_y: Option<Real>,

    #[clap(long, default_value = "127.0.0.1:9090")]
    observability_address: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct GeometryFile {
    pix_x: Vec<Real>,
    pix_y: Vec<Real>,
    neighbor_radius: Real,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf, what: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {what} at {path:?}"))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parsing {what} at {path:?}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    PrometheusBuilder::new()
        .with_http_listener(args.observability_address)
        .install()
        .context("starting the prometheus exporter")?;
    component_info_metric("event-reconstruction");

    metrics::describe_counter!(
        EVENTS_PROCESSED,
        metrics::Unit::Count,
        "Number of events entering the chain"
    );
    metrics::describe_counter!(
        EVENTS_RECONSTRUCTED,
        metrics::Unit::Count,
        "Number of events fully reconstructed"
    );
    metrics::describe_counter!(
        EVENTS_INVALID,
        metrics::Unit::Count,
        "Number of events with no parameterizable image"
    );
    metrics::describe_counter!(
        EVENTS_REJECTED,
        metrics::Unit::Count,
        "Number of events failing a quality cut"
    );
    metrics::describe_counter!(
        EVENTS_SKIPPED,
        metrics::Unit::Count,
        "Number of events skipped before reconstruction"
    );
    metrics::describe_counter!(
        PEDESTAL_UPDATES,
        metrics::Unit::Count,
        "Number of interleaved pedestal events folded into the estimate"
    );

    let config: ReconstructionConfig = {
        let document = std::fs::read_to_string(&args.config)
            .with_context(|| format!("reading configuration at {:?}", args.config))?;
        ReconstructionConfig::from_json_str(&document)?
    };

    let geometry_file: GeometryFile = load_json(&args.geometry, "camera geometry")?;
    let geometry = Arc::new(CameraGeometry::from_positions(
        geometry_file.pix_x,
        geometry_file.pix_y,
        geometry_file.neighbor_radius,
    ));
    info!(n_pixels = geometry.n_pixels(), "camera geometry loaded");

    let calibration = match &args.calibration {
        Some(path) => {
            let constants: CalibrationConstants = load_json(path, "calibration constants")?;
            CalibrationStore::loaded(constants)
        }
        None => CalibrationStore::unset(),
    };

    let models: ModelBundle = load_json(&args.models, "model bundle")?;

    let on_region = match (args.source_pos_x, args.source_pos_y) {
        (Some(x), Some(y)) => Some(SourcePosition { x, y }),
        _ => None,
    };

    let pipeline = EventPipeline::new(&config, Arc::clone(&geometry), &calibration, models, on_region)?;

    let events: Vec<RawWaveform> = load_json(&args.events, "input events")?;
    info!(n_events = events.len(), "input events loaded");

    let cancelled = AtomicBool::new(false);
    let records = if config.calibrate_flatfields_and_pedestals {
        let mut running_pedestal = RunningPedestal::new(
            geometry.n_pixels(),
            config.running_pedestal.smoothing_factor,
            config.running_pedestal.warm_up,
        );
        pipeline.process_sequential(&events, &mut running_pedestal, &cancelled)
    } else {
        pipeline.process_batch(&events, &cancelled)
    };

    let mut writer: BufWriter<Box<dyn Write>> = BufWriter::new(match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating output at {path:?}"))?,
        ),
        None => Box::new(std::io::stdout()),
    });
    for record in &records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    info!(n_records = records.len(), "run complete");
    Ok(())
}
