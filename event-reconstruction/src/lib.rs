//! Per-event reconstruction chain for imaging-atmospheric-Cherenkov
//! camera data.
//!
//! The chain turns a calibrated camera waveform into physical event
//! parameters: waveform calibration, charge extraction, noise-aware
//! image cleaning, Hillas parameterization, feature-vector assembly,
//! ensemble-model inference and source-dependent region resolution.
//! Events are independent of each other; the only state shared across
//! events is the calibration store, the loaded models and (optionally)
//! a running pedestal estimator.

pub mod calibration;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod extraction;
pub mod features;
pub mod filters;
pub mod hillas;
pub mod models;
pub mod processing;
pub mod source_dep;
pub mod volume_reduction;
