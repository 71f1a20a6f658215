//! Charge extraction: integrates a window around a located peak to give
//! per-pixel (charge, peak time) pairs.
//!
//! Two window-placement strategies are provided. [LocalPeakWindowSum]
//! places the window on each pixel's own sample peak;
//! [GlobalPeakWindowSum] places one window, located on the camera-wide
//! summed waveform, on every pixel. The latter trades per-pixel
//! adaptivity for timing consistency and is used for muon-ring images.

use crate::calibration::CalibratedWaveform;
use crate::config::ExtractorConfig;
use cherenkov_common::{EventId, EventType, Real, TelId};
use chrono::{DateTime, Utc};

/// Per-pixel charge and peak time for one event.
///
/// Peak times are in sample units with the per-pixel time-calibration
/// offset already applied.
#[derive(Debug, Clone)]
pub struct CalibratedImage {
    pub event_id: EventId,
    pub tel_id: TelId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub charges: Vec<Real>,
    pub peak_times: Vec<Real>,
}

impl CalibratedImage {
    pub fn n_pixels(&self) -> usize {
        self.charges.len()
    }
}

pub trait ChargeExtractor {
    fn extract(&self, waveform: &CalibratedWaveform) -> CalibratedImage;
}

#[derive(Debug, Clone, Copy)]
pub struct LocalPeakWindowSum {
    pub window_shift: usize,
    pub window_width: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalPeakWindowSum {
    pub window_shift: usize,
    pub window_width: usize,
}

/// Integration window `[start, end)` around `peak`, clamped to the
/// sample range.
fn window_bounds(peak: usize, shift: usize, width: usize, n_samples: usize) -> (usize, usize) {
    let start = peak
        .saturating_sub(shift)
        .min(n_samples.saturating_sub(width));
    let end = (start + width).min(n_samples);
    (start, end)
}

/// Sums the window and takes the pulse-weighted mean time.
///
/// A flat or negative window yields charge ≈ 0 and a peak time at the
/// window centre: present, but physically meaningless.
fn integrate(samples: &[Real], start: usize, end: usize, time_offset: Real) -> (Real, Real) {
    let charge: Real = samples[start..end].iter().sum();

    let mut weight_sum = 0.0;
    let mut weighted_time = 0.0;
    for (index, &value) in samples[start..end].iter().enumerate() {
        let weight = value.max(0.0);
        weight_sum += weight;
        weighted_time += weight * (start + index) as Real;
    }
    let peak_time = if weight_sum > 0.0 {
        weighted_time / weight_sum
    } else {
        (start + end.saturating_sub(1)) as Real / 2.0
    };
    (charge, peak_time + time_offset)
}

impl ChargeExtractor for LocalPeakWindowSum {
    fn extract(&self, waveform: &CalibratedWaveform) -> CalibratedImage {
        let n_samples = waveform.samples.shape()[1];
        let mut charges = Vec::with_capacity(waveform.samples.shape()[0]);
        let mut peak_times = Vec::with_capacity(waveform.samples.shape()[0]);

        for (pixel, row) in waveform.samples.outer_iter().enumerate() {
            let samples = row.as_slice().expect("waveform rows are contiguous");
            let peak = samples
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(index, _)| index)
                .unwrap_or(0);
            let (start, end) = window_bounds(peak, self.window_shift, self.window_width, n_samples);
            let (charge, peak_time) =
                integrate(samples, start, end, waveform.time_offsets[pixel]);
            charges.push(charge);
            peak_times.push(peak_time);
        }

        CalibratedImage {
            event_id: waveform.event_id,
            tel_id: waveform.tel_id,
            event_type: waveform.event_type,
            timestamp: waveform.timestamp,
            charges,
            peak_times,
        }
    }
}

impl ChargeExtractor for GlobalPeakWindowSum {
    fn extract(&self, waveform: &CalibratedWaveform) -> CalibratedImage {
        let n_samples = waveform.samples.shape()[1];

        let summed = waveform.samples.sum_axis(ndarray::Axis(0));
        let peak = summed
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap_or(0);
        let (start, end) = window_bounds(peak, self.window_shift, self.window_width, n_samples);

        let mut charges = Vec::with_capacity(waveform.samples.shape()[0]);
        let mut peak_times = Vec::with_capacity(waveform.samples.shape()[0]);
        for (pixel, row) in waveform.samples.outer_iter().enumerate() {
            let samples = row.as_slice().expect("waveform rows are contiguous");
            let (charge, peak_time) =
                integrate(samples, start, end, waveform.time_offsets[pixel]);
            charges.push(charge);
            peak_times.push(peak_time);
        }

        CalibratedImage {
            event_id: waveform.event_id,
            tel_id: waveform.tel_id,
            event_type: waveform.event_type,
            timestamp: waveform.timestamp,
            charges,
            peak_times,
        }
    }
}

/// Closed set of extraction strategies, selected by configuration.
#[derive(Debug, Clone, Copy)]
pub enum Extractor {
    LocalPeakWindowSum(LocalPeakWindowSum),
    GlobalPeakWindowSum(GlobalPeakWindowSum),
}

impl Extractor {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        match *config {
            ExtractorConfig::LocalPeakWindowSum {
                window_shift,
                window_width,
            } => Self::LocalPeakWindowSum(LocalPeakWindowSum {
                window_shift,
                window_width,
            }),
            ExtractorConfig::GlobalPeakWindowSum {
                window_shift,
                window_width,
            } => Self::GlobalPeakWindowSum(GlobalPeakWindowSum {
                window_shift,
                window_width,
            }),
        }
    }
}

impl ChargeExtractor for Extractor {
    fn extract(&self, waveform: &CalibratedWaveform) -> CalibratedImage {
        match self {
            Self::LocalPeakWindowSum(extractor) => extractor.extract(waveform),
            Self::GlobalPeakWindowSum(extractor) => extractor.extract(waveform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use cherenkov_common::HIGH_GAIN;
    use ndarray::Array2;

    fn waveform(rows: Vec<Vec<Real>>) -> CalibratedWaveform {
        let n_pixels = rows.len();
        let n_samples = rows[0].len();
        let flat: Vec<Real> = rows.into_iter().flatten().collect();
        CalibratedWaveform {
            event_id: 1,
            tel_id: 1,
            event_type: EventType::Shower,
            timestamp: Utc::now(),
            samples: Array2::from_shape_vec((n_pixels, n_samples), flat).unwrap(),
            selected_gain: vec![HIGH_GAIN; n_pixels],
            time_offsets: vec![0.0; n_pixels],
            pedestal_std: vec![0.0; n_pixels],
        }
    }

    #[test]
    fn local_peak_integrates_own_window() {
        let waveform = waveform(vec![
            vec![0.0, 0.0, 1.0, 4.0, 1.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 4.0, 1.0],
        ]);
        let extractor = LocalPeakWindowSum {
            window_shift: 1,
            window_width: 3,
        };
        let image = extractor.extract(&waveform);
        assert_approx_eq!(image.charges[0], 6.0, 1e-12);
        assert_approx_eq!(image.peak_times[0], 3.0, 1e-12);
        assert_approx_eq!(image.charges[1], 6.0, 1e-12);
        assert_approx_eq!(image.peak_times[1], 6.0, 1e-12);
    }

    #[test]
    fn global_peak_shares_one_window() {
        let waveform = waveform(vec![
            vec![0.0, 1.0, 8.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 2.0, 2.0],
        ]);
        let extractor = GlobalPeakWindowSum {
            window_shift: 1,
            window_width: 3,
        };
        let image = extractor.extract(&waveform);
        // camera-wide peak at sample 2, window [1, 4) for both pixels
        assert_approx_eq!(image.charges[0], 10.0, 1e-12);
        assert_approx_eq!(image.charges[1], 0.0, 1e-12);
        // flat pixel: peak time is the window centre
        assert_approx_eq!(image.peak_times[1], 2.0, 1e-12);
    }

    #[test]
    fn flat_pixel_yields_zero_charge_with_time_present() {
        let waveform = waveform(vec![vec![0.0; 8]]);
        let extractor = LocalPeakWindowSum {
            window_shift: 1,
            window_width: 4,
        };
        let image = extractor.extract(&waveform);
        assert_eq!(image.charges[0], 0.0);
        assert!(image.peak_times[0].is_finite());
    }

    #[test]
    fn window_is_clamped_at_the_edges() {
        let waveform = waveform(vec![vec![5.0, 1.0, 0.0, 0.0]]);
        let extractor = LocalPeakWindowSum {
            window_shift: 2,
            window_width: 3,
        };
        let image = extractor.extract(&waveform);
        // peak at sample 0, window clamped to [0, 3)
        assert_approx_eq!(image.charges[0], 6.0, 1e-12);
    }

    #[test]
    fn time_offsets_are_applied() {
        let mut waveform = waveform(vec![vec![0.0, 1.0, 4.0, 1.0, 0.0, 0.0]]);
        waveform.time_offsets[0] = 0.25;
        let extractor = LocalPeakWindowSum {
            window_shift: 1,
            window_width: 3,
        };
        let image = extractor.extract(&waveform);
        assert_approx_eq!(image.peak_times[0], 2.25, 1e-12);
    }
}
