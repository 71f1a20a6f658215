use anyhow::{Context, Result};
use clap::Parser;
use reco_simulator::Scenario;
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Scenario document (JSON).
    #[clap(long)]
    scenario: PathBuf,

    /// Directory the generated artifacts are written into.
    #[clap(long)]
    output_dir: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct GeometryFile {
    pix_x: Vec<f64>,
    pix_y: Vec<f64>,
    neighbor_radius: f64,
}

fn write_json<T: Serialize>(dir: &PathBuf, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("creating {path:?}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {path:?}"))?;
    info!(?path, "artifact written");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let document = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario at {:?}", args.scenario))?;
    let scenario = Scenario::from_json_str(&document)?;

    let simulation = scenario.run()?;
    info!(
        n_pixels = simulation.geometry.n_pixels(),
        n_events = simulation.events.len(),
        "scenario generated"
    );

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {:?}", args.output_dir))?;

    let geometry = GeometryFile {
        pix_x: (0..simulation.geometry.n_pixels())
            .map(|p| simulation.geometry.pix_x(p))
            .collect(),
        pix_y: (0..simulation.geometry.n_pixels())
            .map(|p| simulation.geometry.pix_y(p))
            .collect(),
        neighbor_radius: scenario.camera.pitch * 1.5,
    };

    write_json(&args.output_dir, "geometry.json", &geometry)?;
    write_json(&args.output_dir, "calibration.json", &simulation.constants)?;
    write_json(&args.output_dir, "events.json", &simulation.events)?;

    Ok(())
}
