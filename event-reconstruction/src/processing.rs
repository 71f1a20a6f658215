//! The per-event reconstruction chain and its batch drivers.
//!
//! Every input event yields exactly one [EventRecord]; per-event
//! failures downgrade the record instead of aborting the run.

use crate::calibration::{CalibrationStore, RunningPedestal, WaveformCalibrator};
use crate::cleaning::TailcutsCleaner;
use crate::config::{ObservationMode, OrderingMode, ReconstructionConfig};
use crate::error::{ConfigurationError, InvalidImageReason, RunResult};
use crate::extraction::{CalibratedImage, ChargeExtractor, Extractor};
use crate::filters::{EventFilter, FilterDecision};
use crate::hillas::{HillasParameters, hillas_parameters};
use crate::models::{EnsemblePredictor, ModelBundle, Prediction};
use crate::source_dep::{SourceDependentResolver, SourcePosition};
use crate::volume_reduction::VolumeReducer;
use cherenkov_common::{
    EventId, EventType, RawWaveform, TelId,
    geometry::CameraGeometry,
    metrics::{
        events_invalid, events_skipped,
        metric_names::{
            EVENTS_INVALID, EVENTS_PROCESSED, EVENTS_RECONSTRUCTED, EVENTS_REJECTED,
            EVENTS_SKIPPED, PEDESTAL_UPDATES,
        },
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::features::FeatureName;

/// Inference output for one on- or off-source region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegionPrediction {
    pub region: u32,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    TelescopeNotAllowed,
    PedestalEvent,
    Cancelled,
}

impl From<SkipReason> for events_skipped::SkipKind {
    fn from(value: SkipReason) -> Self {
        match value {
            SkipReason::TelescopeNotAllowed => Self::TelescopeNotAllowed,
            SkipReason::PedestalEvent => Self::PedestalEvent,
            SkipReason::Cancelled => Self::Cancelled,
        }
    }
}

/// The outcome of one event's pass through the chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum EventStatus {
    Reconstructed {
        hillas: HillasParameters,
        predictions: Vec<RegionPrediction>,
    },
    Invalid {
        reason: InvalidImageReason,
    },
    Rejected {
        criterion: FeatureName,
        hillas: HillasParameters,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventRecord {
    pub event_id: EventId,
    pub tel_id: TelId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub status: EventStatus,
}

/// The fully wired reconstruction chain for one run.
///
/// Immutable after construction, so batches may share it across worker
/// threads.
pub struct EventPipeline {
    geometry: Arc<CameraGeometry>,
    calibrator: WaveformCalibrator,
    extractor: Extractor,
    muon_extractor: Extractor,
    cleaner: TailcutsCleaner,
    volume_reducer: VolumeReducer,
    filter: EventFilter,
    predictor: EnsemblePredictor,
    resolver: Option<SourceDependentResolver>,
    allowed_tels: Option<BTreeSet<TelId>>,
    max_events: Option<usize>,
    ordering_mode: OrderingMode,
}

impl EventPipeline {
    /// Wires every stage from the validated configuration, failing fast
    /// on anything that would invalidate the whole run.
    pub fn new(
        config: &ReconstructionConfig,
        geometry: Arc<CameraGeometry>,
        calibration: &CalibrationStore,
        models: ModelBundle,
        on_region: Option<SourcePosition>,
    ) -> RunResult<Self> {
        config.validate()?;

        let calibrator = calibration.calibrator(
            geometry.n_pixels(),
            config.gain_selector.threshold(),
            config.custom_calibration,
            config.calibrate_flatfields_and_pedestals,
        )?;

        let extractor = Extractor::from_config(&config.image_extractor);
        let muon_extractor = config
            .image_extractor_for_muons
            .as_ref()
            .map(Extractor::from_config)
            .unwrap_or(extractor);

        let predictor = EnsemblePredictor::new(
            models,
            config.regression_schema()?,
            config.classification_schema()?,
        )?;

        let resolver = if config.source_dependent {
            let on_region = on_region.ok_or(ConfigurationError::MissingSourcePosition)?;
            Some(match config.observation_mode {
                ObservationMode::Wobble => {
                    SourceDependentResolver::wobble(on_region, config.n_off_wobble)
                }
                ObservationMode::On => SourceDependentResolver::on_only(on_region),
            })
        } else {
            None
        };

        Ok(Self {
            geometry,
            calibrator,
            extractor,
            muon_extractor,
            cleaner: TailcutsCleaner::new(config.tailcuts_clean_with_pedestal_threshold),
            volume_reducer: VolumeReducer::from_config(&config.volume_reducer),
            filter: EventFilter::new(&config.events_filters),
            predictor,
            resolver,
            allowed_tels: config.allowed_tels.clone(),
            max_events: config.max_events,
            ordering_mode: config.ordering_mode,
        })
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        self.ordering_mode
    }

    fn skip(raw: &RawWaveform, reason: SkipReason) -> EventRecord {
        counter!(EVENTS_SKIPPED, &[events_skipped::get_label(reason.into())]).increment(1);
        EventRecord {
            event_id: raw.event_id,
            tel_id: raw.tel_id,
            event_type: raw.event_type,
            timestamp: raw.timestamp,
            status: EventStatus::Skipped { reason },
        }
    }

    /// Runs one event through the full chain.
    #[tracing::instrument(skip_all, level = "debug", fields(event_id = raw.event_id))]
    pub fn process_event(
        &self,
        raw: &RawWaveform,
        running_pedestal: Option<&RunningPedestal>,
    ) -> EventRecord {
        counter!(EVENTS_PROCESSED).increment(1);

        if let Some(allowed) = &self.allowed_tels
            && !allowed.contains(&raw.tel_id)
        {
            return Self::skip(raw, SkipReason::TelescopeNotAllowed);
        }
        if raw.event_type == EventType::Pedestal {
            return Self::skip(raw, SkipReason::PedestalEvent);
        }

        let waveform = self.calibrator.calibrate(raw, running_pedestal);
        let extractor = match raw.event_type {
            EventType::MuonCandidate => &self.muon_extractor,
            _ => &self.extractor,
        };
        let mut image = extractor.extract(&waveform);

        let mask = self
            .cleaner
            .clean(&self.geometry, &image, &waveform.pedestal_std);
        self.volume_reducer
            .reduce(&self.geometry, &mut image, &mask);

        let record = |status| EventRecord {
            event_id: image.event_id,
            tel_id: image.tel_id,
            event_type: image.event_type,
            timestamp: image.timestamp,
            status,
        };

        let hillas = match hillas_parameters(&self.geometry, &image, &mask) {
            Ok(hillas) => hillas,
            Err(reason) => return record(Self::invalid(&image, reason)),
        };

        if let FilterDecision::Rejected { criterion } = self.filter.evaluate(&hillas) {
            counter!(EVENTS_REJECTED).increment(1);
            debug!(%criterion, "event rejected by quality cut");
            return record(EventStatus::Rejected { criterion, hillas });
        }

        let predictions = match self.predict_regions(&hillas) {
            Ok(predictions) => predictions,
            Err(reason) => return record(Self::invalid(&image, reason)),
        };

        counter!(EVENTS_RECONSTRUCTED).increment(1);
        record(EventStatus::Reconstructed {
            hillas,
            predictions,
        })
    }

    fn invalid(image: &CalibratedImage, reason: InvalidImageReason) -> EventStatus {
        counter!(EVENTS_INVALID, &[events_invalid::get_label(reason.into())]).increment(1);
        debug!(event_id = image.event_id, %reason, "image not parameterizable");
        EventStatus::Invalid { reason }
    }

    fn predict_regions(
        &self,
        hillas: &HillasParameters,
    ) -> Result<Vec<RegionPrediction>, InvalidImageReason> {
        match &self.resolver {
            Some(resolver) => resolver
                .features(hillas)
                .into_iter()
                .map(|(region, features)| {
                    self.predictor
                        .predict(hillas, Some(&features))
                        .map(|prediction| RegionPrediction { region, prediction })
                })
                .collect(),
            None => {
                let prediction = self.predictor.predict(hillas, None)?;
                Ok(vec![RegionPrediction {
                    region: 0,
                    prediction,
                }])
            }
        }
    }

    /// Processes a batch on the rayon pool. Results come back in input
    /// order; the ordered mode additionally sorts them by event id.
    ///
    /// Once `cancelled` is raised the remaining events are recorded as
    /// skipped rather than silently dropped.
    pub fn process_batch(
        &self,
        events: &[RawWaveform],
        cancelled: &AtomicBool,
    ) -> Vec<EventRecord> {
        let take = self.max_events.unwrap_or(events.len()).min(events.len());
        let mut records: Vec<EventRecord> = events[..take]
            .par_iter()
            .map(|raw| {
                if cancelled.load(Ordering::Relaxed) {
                    Self::skip(raw, SkipReason::Cancelled)
                } else {
                    self.process_event(raw, None)
                }
            })
            .collect();
        if self.ordering_mode == OrderingMode::Ordered {
            records.sort_by_key(|record| record.event_id);
        }
        records
    }

    /// Sequential driver for the adaptive-pedestal mode: interleaved
    /// pedestal events are folded into the running estimate in arrival
    /// order, and every later event is calibrated against it.
    ///
    /// `max-events` counts reconstructable events only; pedestal events
    /// are always folded.
    pub fn process_sequential(
        &self,
        events: &[RawWaveform],
        running_pedestal: &mut RunningPedestal,
        cancelled: &AtomicBool,
    ) -> Vec<EventRecord> {
        let mut records = Vec::with_capacity(events.len());
        let mut processed = 0usize;
        for raw in events {
            if cancelled.load(Ordering::Relaxed) {
                records.push(Self::skip(raw, SkipReason::Cancelled));
                continue;
            }
            if raw.event_type == EventType::Pedestal {
                running_pedestal.update(raw);
                counter!(PEDESTAL_UPDATES).increment(1);
                records.push(Self::skip(raw, SkipReason::PedestalEvent));
                continue;
            }
            if self.max_events.is_some_and(|max| processed >= max) {
                break;
            }
            records.push(self.process_event(raw, Some(running_pedestal)));
            processed += 1;
        }
        records
    }
}
