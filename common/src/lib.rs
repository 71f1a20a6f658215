pub mod geometry;
pub mod metrics;

use chrono::{DateTime, Utc};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

pub type TelId = u16;
pub type PixelId = usize;
pub type EventId = u64;
pub type SampleValue = u16;
pub type Real = f64;

pub const HIGH_GAIN: usize = 0;
pub const LOW_GAIN: usize = 1;
pub const N_GAINS: usize = 2;

/// The trigger class of a camera readout, as tagged upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// An ordinary air-shower trigger.
    Shower,
    /// An event tagged as a likely muon ring.
    MuonCandidate,
    /// An interleaved pedestal trigger, carries no signal.
    Pedestal,
}

/// Raw camera readout for a single event.
///
/// Samples are laid out as `[gain][pixel][sample]`. The dragon counter
/// is the readout counter used to align the event timestamp against the
/// calibration reference pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawWaveform {
    pub event_id: EventId,
    pub tel_id: TelId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub dragon_counter: u64,
    pub samples: Array3<SampleValue>,
}

impl RawWaveform {
    pub fn n_pixels(&self) -> usize {
        self.samples.shape()[1]
    }

    pub fn n_samples(&self) -> usize {
        self.samples.shape()[2]
    }
}
