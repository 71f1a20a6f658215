//! Waveform calibration: pedestal subtraction, gain selection and time
//! calibration against the dragon reference pair.

use crate::error::CalibrationUnavailable;
use cherenkov_common::{
    EventId, EventType, HIGH_GAIN, LOW_GAIN, N_GAINS, RawWaveform, Real, TelId,
};
use chrono::{DateTime, Duration, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-pixel calibration constants, loaded once and shared read-only.
///
/// All arrays are laid out as `[gain][pixel]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CalibrationConstants {
    pub pedestal_mean: Array2<Real>,
    pub pedestal_std: Array2<Real>,
    pub dc_to_pe: Array2<Real>,
    /// Time-calibration offsets, in sample units.
    pub time_offsets: Array2<Real>,
    pub dragon_reference_counter: u64,
    pub dragon_reference_time: DateTime<Utc>,
    pub dragon_counter_tick_ns: Real,
}

impl CalibrationConstants {
    pub fn n_pixels(&self) -> usize {
        self.pedestal_mean.shape()[1]
    }

    /// Event timestamp aligned against the reference counter/time pair.
    pub fn align_timestamp(&self, dragon_counter: u64) -> DateTime<Utc> {
        let ticks = dragon_counter as i64 - self.dragon_reference_counter as i64;
        let nanoseconds = (ticks as Real * self.dragon_counter_tick_ns) as i64;
        self.dragon_reference_time + Duration::nanoseconds(nanoseconds)
    }
}

/// Holds the loaded constants for the lifetime of the run.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    constants: Option<Arc<CalibrationConstants>>,
}

impl CalibrationStore {
    pub fn loaded(constants: CalibrationConstants) -> Self {
        Self {
            constants: Some(Arc::new(constants)),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }

    pub fn constants(&self) -> Option<&Arc<CalibrationConstants>> {
        self.constants.as_ref()
    }

    /// Builds the calibrator for a camera of `n_pixels` pixels.
    ///
    /// With `custom_calibration` set the waveforms are taken as already
    /// calibrated and an identity calibrator is returned. Otherwise the
    /// constants must be loaded and match the camera size.
    pub fn calibrator(
        &self,
        n_pixels: usize,
        gain_threshold: Real,
        custom_calibration: bool,
        use_running_pedestal: bool,
    ) -> Result<WaveformCalibrator, CalibrationUnavailable> {
        if custom_calibration {
            return Ok(WaveformCalibrator {
                constants: None,
                gain_threshold,
                use_running_pedestal: false,
            });
        }
        let constants = self
            .constants
            .as_ref()
            .ok_or(CalibrationUnavailable::MissingConstants)?;
        if constants.n_pixels() != n_pixels {
            return Err(CalibrationUnavailable::PixelCountMismatch {
                expected: n_pixels,
                actual: constants.n_pixels(),
            });
        }
        Ok(WaveformCalibrator {
            constants: Some(Arc::clone(constants)),
            gain_threshold,
            use_running_pedestal,
        })
    }
}

/// Pedestal-subtracted, gain-selected samples for one event.
///
/// The per-pixel time offsets are applied downstream by the charge
/// extractor, on top of the extracted peak times.
#[derive(Debug, Clone)]
pub struct CalibratedWaveform {
    pub event_id: EventId,
    pub tel_id: TelId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// `[pixel][sample]`, in photo-electrons.
    pub samples: Array2<Real>,
    pub selected_gain: Vec<usize>,
    /// Per-pixel time-calibration offsets, in sample units.
    pub time_offsets: Vec<Real>,
    /// Pedestal noise of the selected gain channel, in photo-electrons.
    pub pedestal_std: Vec<Real>,
}

#[derive(Debug, Clone)]
pub struct WaveformCalibrator {
    constants: Option<Arc<CalibrationConstants>>,
    gain_threshold: Real,
    use_running_pedestal: bool,
}

impl WaveformCalibrator {
    pub fn is_identity(&self) -> bool {
        self.constants.is_none()
    }

    /// Calibrates one raw waveform.
    ///
    /// Gain selection is the threshold comparator: the high-gain channel
    /// is used unless any of its samples exceeds the saturation
    /// threshold. When a warm running pedestal estimate is supplied it
    /// replaces the static pedestal mean.
    pub fn calibrate(
        &self,
        raw: &RawWaveform,
        running_pedestal: Option<&RunningPedestal>,
    ) -> CalibratedWaveform {
        let n_pixels = raw.n_pixels();
        let n_samples = raw.n_samples();

        let Some(constants) = self.constants.as_ref() else {
            // Identity calibration: raw samples pass through as-is.
            let samples = raw.samples.index_axis(ndarray::Axis(0), HIGH_GAIN);
            return CalibratedWaveform {
                event_id: raw.event_id,
                tel_id: raw.tel_id,
                event_type: raw.event_type,
                timestamp: raw.timestamp,
                samples: samples.map(|&s| s as Real),
                selected_gain: vec![HIGH_GAIN; n_pixels],
                time_offsets: vec![0.0; n_pixels],
                pedestal_std: vec![0.0; n_pixels],
            };
        };

        let running = running_pedestal.filter(|r| self.use_running_pedestal && r.is_warm());

        let mut samples = Array2::<Real>::zeros((n_pixels, n_samples));
        let mut selected_gain = vec![HIGH_GAIN; n_pixels];
        let mut time_offsets = vec![0.0; n_pixels];
        let mut pedestal_std = vec![0.0; n_pixels];

        for pixel in 0..n_pixels {
            let saturated = (0..n_samples)
                .map(|s| raw.samples[[HIGH_GAIN, pixel, s]] as Real)
                .any(|v| v > self.gain_threshold);
            let gain = if saturated { LOW_GAIN } else { HIGH_GAIN };

            let pedestal = match running {
                Some(running) => running.mean(gain, pixel),
                None => constants.pedestal_mean[[gain, pixel]],
            };
            let gain_factor = constants.dc_to_pe[[gain, pixel]];

            for sample in 0..n_samples {
                samples[[pixel, sample]] =
                    (raw.samples[[gain, pixel, sample]] as Real - pedestal) * gain_factor;
            }
            selected_gain[pixel] = gain;
            time_offsets[pixel] = constants.time_offsets[[gain, pixel]];
            pedestal_std[pixel] = constants.pedestal_std[[gain, pixel]] * gain_factor;
        }

        CalibratedWaveform {
            event_id: raw.event_id,
            tel_id: raw.tel_id,
            event_type: raw.event_type,
            timestamp: constants.align_timestamp(raw.dragon_counter),
            samples,
            selected_gain,
            time_offsets,
            pedestal_std,
        }
    }
}

/// Exponentially smoothed pedestal estimate fed by interleaved pedestal
/// events.
///
/// Mutated across events, so it is owned by the sequential processing
/// path only; workers read a snapshot reference.
#[derive(Debug, Clone)]
pub struct RunningPedestal {
    mean: Array2<Real>,
    smoothing_factor: Real,
    warm_up: usize,
    count: usize,
}

impl RunningPedestal {
    pub fn new(n_pixels: usize, smoothing_factor: Real, warm_up: usize) -> Self {
        Self {
            mean: Array2::zeros((N_GAINS, n_pixels)),
            smoothing_factor,
            warm_up,
            count: 0,
        }
    }

    pub fn is_warm(&self) -> bool {
        self.count >= self.warm_up
    }

    pub fn mean(&self, gain: usize, pixel: usize) -> Real {
        self.mean[[gain, pixel]]
    }

    /// Folds one interleaved pedestal event into the estimate.
    pub fn update(&mut self, raw: &RawWaveform) {
        let n_samples = raw.n_samples();
        for gain in 0..N_GAINS {
            for pixel in 0..raw.n_pixels() {
                let event_mean = (0..n_samples)
                    .map(|s| raw.samples[[gain, pixel, s]] as Real)
                    .sum::<Real>()
                    / n_samples as Real;
                self.mean[[gain, pixel]] = if self.count == 0 {
                    event_mean
                } else {
                    event_mean * self.smoothing_factor
                        + self.mean[[gain, pixel]] * (1.0 - self.smoothing_factor)
                };
            }
        }
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use cherenkov_common::SampleValue;
    use ndarray::Array3;

    fn constants(n_pixels: usize) -> CalibrationConstants {
        CalibrationConstants {
            pedestal_mean: Array2::from_elem((N_GAINS, n_pixels), 400.0),
            pedestal_std: Array2::from_elem((N_GAINS, n_pixels), 2.0),
            dc_to_pe: Array2::from_shape_fn((N_GAINS, n_pixels), |(gain, _)| {
                if gain == HIGH_GAIN { 0.02 } else { 0.4 }
            }),
            time_offsets: Array2::from_elem((N_GAINS, n_pixels), 0.5),
            dragon_reference_counter: 1000,
            dragon_reference_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            dragon_counter_tick_ns: 10.0,
        }
    }

    fn raw(n_pixels: usize, n_samples: usize, fill: SampleValue) -> RawWaveform {
        RawWaveform {
            event_id: 1,
            tel_id: 1,
            event_type: EventType::Shower,
            timestamp: Utc::now(),
            dragon_counter: 1100,
            samples: Array3::from_elem((N_GAINS, n_pixels, n_samples), fill),
        }
    }

    #[test]
    fn missing_constants_is_fatal() {
        let store = CalibrationStore::unset();
        assert!(matches!(
            store.calibrator(4, 4000.0, false, false),
            Err(CalibrationUnavailable::MissingConstants)
        ));
    }

    #[test]
    fn pixel_count_mismatch_is_fatal() {
        let store = CalibrationStore::loaded(constants(8));
        assert!(matches!(
            store.calibrator(4, 4000.0, false, false),
            Err(CalibrationUnavailable::PixelCountMismatch {
                expected: 4,
                actual: 8
            })
        ));
    }

    #[test]
    fn identity_mode_passes_samples_through() {
        let store = CalibrationStore::unset();
        let calibrator = store.calibrator(2, 4000.0, true, false).unwrap();
        let raw = raw(2, 3, 7);
        let calibrated = calibrator.calibrate(&raw, None);
        assert_eq!(calibrated.samples[[0, 0]], 7.0);
        assert_eq!(calibrated.selected_gain, vec![HIGH_GAIN, HIGH_GAIN]);
        assert_eq!(calibrated.pedestal_std, vec![0.0, 0.0]);
        assert_eq!(calibrated.timestamp, raw.timestamp);
    }

    #[test]
    fn pedestal_subtraction_and_gain_factor() {
        let store = CalibrationStore::loaded(constants(2));
        let calibrator = store.calibrator(2, 4000.0, false, false).unwrap();
        let calibrated = calibrator.calibrate(&raw(2, 4, 450), None);
        // (450 - 400) * 0.02
        assert_approx_eq!(calibrated.samples[[0, 0]], 1.0, 1e-12);
        assert_eq!(calibrated.selected_gain[0], HIGH_GAIN);
        assert_approx_eq!(calibrated.pedestal_std[0], 0.04, 1e-12);
        assert_approx_eq!(calibrated.time_offsets[0], 0.5, 1e-12);
    }

    #[test]
    fn saturated_pixel_switches_to_low_gain() {
        let store = CalibrationStore::loaded(constants(1));
        let calibrator = store.calibrator(1, 4000.0, false, false).unwrap();
        let mut raw = raw(1, 4, 450);
        raw.samples[[HIGH_GAIN, 0, 2]] = 4100;
        raw.samples[[LOW_GAIN, 0, 2]] = 500;
        let calibrated = calibrator.calibrate(&raw, None);
        assert_eq!(calibrated.selected_gain[0], LOW_GAIN);
        // (500 - 400) * 0.4
        assert_approx_eq!(calibrated.samples[[0, 2]], 40.0, 1e-12);
    }

    #[test]
    fn timestamp_aligned_to_reference_pair() {
        let store = CalibrationStore::loaded(constants(1));
        let calibrator = store.calibrator(1, 4000.0, false, false).unwrap();
        let calibrated = calibrator.calibrate(&raw(1, 2, 400), None);
        let expected =
            DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::nanoseconds(1000);
        assert_eq!(calibrated.timestamp, expected);
    }

    #[test]
    fn running_pedestal_overrides_static_mean() {
        let store = CalibrationStore::loaded(constants(1));
        let calibrator = store.calibrator(1, 4000.0, false, true).unwrap();

        let mut running = RunningPedestal::new(1, 0.5, 1);
        assert!(!running.is_warm());
        let mut pedestal_event = raw(1, 4, 410);
        pedestal_event.event_type = EventType::Pedestal;
        running.update(&pedestal_event);
        assert!(running.is_warm());
        assert_approx_eq!(running.mean(HIGH_GAIN, 0), 410.0, 1e-12);

        let calibrated = calibrator.calibrate(&raw(1, 4, 450), Some(&running));
        // (450 - 410) * 0.02
        assert_approx_eq!(calibrated.samples[[0, 0]], 0.8, 1e-12);
    }

    #[test]
    fn running_pedestal_smooths_updates() {
        let mut running = RunningPedestal::new(1, 0.25, 2);
        running.update(&raw(1, 2, 400));
        running.update(&raw(1, 2, 440));
        // 440 * 0.25 + 400 * 0.75
        assert_approx_eq!(running.mean(HIGH_GAIN, 0), 410.0, 1e-12);
    }
}
