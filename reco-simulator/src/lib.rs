//! Scenario-driven generator of synthetic camera data: a square-grid
//! camera, matching calibration constants and raw waveforms with
//! injected shower or muon-ring signals over pedestal noise.
//!
//! Everything is driven by a seeded generator, so a scenario always
//! produces the same data.

use anyhow::{Result, ensure};
use cherenkov_common::{
    EventId, EventType, HIGH_GAIN, LOW_GAIN, N_GAINS, RawWaveform, Real, SampleValue, TelId,
    geometry::CameraGeometry,
};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const PULSE_SIGMA: Real = 1.5;

/// A complete simulation scenario, loaded from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Scenario {
    pub seed: u64,
    pub tel_id: TelId,
    pub camera: CameraSpec,
    pub n_samples: usize,
    pub pedestal: PedestalSpec,
    /// dc-to-pe conversion per gain channel, `[high, low]`.
    pub dc_to_pe: [Real; 2],
    pub events: Vec<EventSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CameraSpec {
    /// Pixels per side of the square grid.
    pub side: usize,
    /// Pixel spacing in camera-frame units.
    pub pitch: Real,
}

impl CameraSpec {
    pub fn n_pixels(&self) -> usize {
        self.side * self.side
    }

    pub fn geometry(&self) -> CameraGeometry {
        let mut pix_x = Vec::with_capacity(self.n_pixels());
        let mut pix_y = Vec::with_capacity(self.n_pixels());
        let half = (self.side as Real - 1.0) / 2.0;
        for row in 0..self.side {
            for col in 0..self.side {
                pix_x.push((col as Real - half) * self.pitch);
                pix_y.push((row as Real - half) * self.pitch);
            }
        }
        CameraGeometry::from_positions(pix_x, pix_y, self.pitch * 1.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PedestalSpec {
    pub mean: Real,
    pub std: Real,
}

/// One event to generate. Shower and ring sources are exclusive; an
/// event with neither carries pedestal noise only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EventSpec {
    pub event_id: EventId,
    pub event_type: EventType,
    #[serde(default)]
    pub shower: Option<ShowerSpec>,
    #[serde(default)]
    pub ring: Option<RingSpec>,
}

/// An elliptical Gaussian light pool with a linear time gradient along
/// its major axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ShowerSpec {
    pub cog_x: Real,
    pub cog_y: Real,
    pub length: Real,
    pub width: Real,
    /// Major-axis orientation, radians.
    pub psi: Real,
    /// Peak pulse amplitude in ADC counts above pedestal.
    pub amplitude: Real,
    pub peak_sample: Real,
    /// Samples per camera-frame unit along the major axis.
    pub time_gradient: Real,
}

/// An annular muon-ring light distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RingSpec {
    pub center_x: Real,
    pub center_y: Real,
    pub radius: Real,
    pub ring_width: Real,
    pub amplitude: Real,
    pub peak_sample: Real,
}

/// The generated data set for one scenario.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub geometry: CameraGeometry,
    pub constants: GeneratedConstants,
    pub events: Vec<RawWaveform>,
}

/// Calibration constants matching the generated waveforms, in the
/// `[gain][pixel]` layout the reconstruction chain loads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneratedConstants {
    pub pedestal_mean: Array2<Real>,
    pub pedestal_std: Array2<Real>,
    pub dc_to_pe: Array2<Real>,
    pub time_offsets: Array2<Real>,
    pub dragon_reference_counter: u64,
    pub dragon_reference_time: DateTime<Utc>,
    pub dragon_counter_tick_ns: Real,
}

impl Scenario {
    pub fn from_json_str(document: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(document)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.camera.side > 0, "camera side must be at least 1");
        ensure!(self.n_samples > 0, "n-samples must be at least 1");
        ensure!(self.pedestal.std >= 0.0, "pedestal std must not be negative");
        for event in &self.events {
            ensure!(
                event.shower.is_none() || event.ring.is_none(),
                "event {} has both a shower and a ring source",
                event.event_id
            );
        }
        Ok(())
    }

    /// Generates the full data set. Deterministic in the seed.
    pub fn run(&self) -> Result<Simulation> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, self.pedestal.std.max(f64::EPSILON))?;
        let geometry = self.camera.geometry();

        let events = self
            .events
            .iter()
            .enumerate()
            .map(|(index, spec)| self.generate_event(spec, index as u64, &geometry, &mut rng, &noise))
            .collect();

        Ok(Simulation {
            constants: self.constants(),
            geometry,
            events,
        })
    }

    fn constants(&self) -> GeneratedConstants {
        let n_pixels = self.camera.n_pixels();
        let dc_to_pe = Array2::from_shape_fn((N_GAINS, n_pixels), |(gain, _)| {
            if gain == HIGH_GAIN {
                self.dc_to_pe[HIGH_GAIN]
            } else {
                self.dc_to_pe[LOW_GAIN]
            }
        });
        GeneratedConstants {
            pedestal_mean: Array2::from_elem((N_GAINS, n_pixels), self.pedestal.mean),
            pedestal_std: Array2::from_elem((N_GAINS, n_pixels), self.pedestal.std),
            dc_to_pe,
            time_offsets: Array2::zeros((N_GAINS, n_pixels)),
            dragon_reference_counter: 0,
            dragon_reference_time: DateTime::from_timestamp(1_700_000_000, 0)
                .expect("timestamp literal is in range"),
            dragon_counter_tick_ns: 10.0,
        }
    }

    fn generate_event(
        &self,
        spec: &EventSpec,
        sequence: u64,
        geometry: &CameraGeometry,
        rng: &mut StdRng,
        noise: &Normal<Real>,
    ) -> RawWaveform {
        let n_pixels = self.camera.n_pixels();
        let mut samples = Array3::<SampleValue>::zeros((N_GAINS, n_pixels, self.n_samples));

        for pixel in 0..n_pixels {
            let (amplitude, peak) = self.pixel_signal(spec, geometry, pixel);
            for sample in 0..self.n_samples {
                let pulse = amplitude * gaussian(sample as Real, peak, PULSE_SIGMA);
                for gain in 0..N_GAINS {
                    // the low-gain channel sees the signal attenuated by
                    // the dc-to-pe ratio
                    let scale = if gain == HIGH_GAIN {
                        1.0
                    } else {
                        self.dc_to_pe[HIGH_GAIN] / self.dc_to_pe[LOW_GAIN]
                    };
                    let value = self.pedestal.mean + pulse * scale + noise.sample(rng);
                    samples[[gain, pixel, sample]] =
                        value.round().clamp(0.0, SampleValue::MAX as Real) as SampleValue;
                }
            }
        }

        RawWaveform {
            event_id: spec.event_id,
            tel_id: self.tel_id,
            event_type: spec.event_type,
            timestamp: Utc::now(),
            dragon_counter: sequence * 1000,
            samples,
        }
    }

    /// Per-pixel pulse amplitude and peak sample for the event's source.
    fn pixel_signal(&self, spec: &EventSpec, geometry: &CameraGeometry, pixel: usize) -> (Real, Real) {
        if let Some(shower) = &spec.shower {
            let dx = geometry.pix_x(pixel) - shower.cog_x;
            let dy = geometry.pix_y(pixel) - shower.cog_y;
            let longi = dx * shower.psi.cos() + dy * shower.psi.sin();
            let trans = -dx * shower.psi.sin() + dy * shower.psi.cos();
            let amplitude = shower.amplitude
                * (-(longi * longi) / (2.0 * shower.length * shower.length)
                    - (trans * trans) / (2.0 * shower.width * shower.width))
                    .exp();
            let peak = shower.peak_sample + shower.time_gradient * longi;
            (amplitude, peak)
        } else if let Some(ring) = &spec.ring {
            let dx = geometry.pix_x(pixel) - ring.center_x;
            let dy = geometry.pix_y(pixel) - ring.center_y;
            let amplitude = ring.amplitude * gaussian(dx.hypot(dy), ring.radius, ring.ring_width);
            (amplitude, ring.peak_sample)
        } else {
            (0.0, 0.0)
        }
    }
}

fn gaussian(x: Real, mean: Real, sigma: Real) -> Real {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp()
}
