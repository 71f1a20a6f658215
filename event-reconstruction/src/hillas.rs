//! Hillas parameterization: charge-weighted geometric moments of the
//! cleaned image.

use crate::cleaning::CleaningMask;
use crate::error::InvalidImageReason;
use crate::extraction::CalibratedImage;
use cherenkov_common::{Real, geometry::CameraGeometry};
use serde::Serialize;

/// Geometric moments of a cleaned image.
///
/// Angles are in radians; positions in the camera-frame units of the
/// geometry; `time_gradient` in sample units per position unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HillasParameters {
    pub intensity: Real,
    pub cog_x: Real,
    pub cog_y: Real,
    /// Distance of the centroid from the camera centre.
    pub r: Real,
    pub phi: Real,
    pub length: Real,
    pub width: Real,
    /// Orientation of the major axis.
    pub psi: Real,
    pub skewness: Real,
    pub kurtosis: Real,
    pub time_gradient: Real,
    pub time_intercept: Real,
    pub leakage_pixels_width_1: Real,
    pub leakage_pixels_width_2: Real,
    pub leakage_intensity_width_1: Real,
    pub leakage_intensity_width_2: Real,
}

impl HillasParameters {
    /// width/length, in [0, 1] by construction; undefined for a
    /// degenerate (zero-length) axis.
    pub fn wl(&self) -> Option<Real> {
        (self.length > 0.0).then(|| self.width / self.length)
    }
}

/// Computes the moments of the masked image.
///
/// Returns the reason instead of parameters when the moments are
/// undefined: an empty mask, fewer than three surviving pixels, or zero
/// total intensity. These are per-event outcomes, not errors.
pub fn hillas_parameters(
    geometry: &CameraGeometry,
    image: &CalibratedImage,
    mask: &CleaningMask,
) -> Result<HillasParameters, InvalidImageReason> {
    if mask.is_empty() {
        return Err(InvalidImageReason::EmptyMask);
    }
    let pixels: Vec<usize> = mask.iter_set().collect();
    if pixels.len() < 3 {
        return Err(InvalidImageReason::TooFewPixels);
    }

    let intensity: Real = pixels.iter().map(|&p| image.charges[p]).sum();
    if intensity <= 0.0 {
        return Err(InvalidImageReason::ZeroIntensity);
    }

    let cog_x = pixels
        .iter()
        .map(|&p| image.charges[p] * geometry.pix_x(p))
        .sum::<Real>()
        / intensity;
    let cog_y = pixels
        .iter()
        .map(|&p| image.charges[p] * geometry.pix_y(p))
        .sum::<Real>()
        / intensity;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for &p in &pixels {
        let w = image.charges[p];
        let dx = geometry.pix_x(p) - cog_x;
        let dy = geometry.pix_y(p) - cog_y;
        sxx += w * dx * dx;
        syy += w * dy * dy;
        sxy += w * dx * dy;
    }
    sxx /= intensity;
    syy /= intensity;
    sxy /= intensity;

    // closed-form eigenvalues of the 2x2 covariance matrix
    let trace_half = (sxx + syy) / 2.0;
    let discriminant = (((sxx - syy) / 2.0).powi(2) + sxy * sxy).sqrt();
    let length = (trace_half + discriminant).max(0.0).sqrt();
    let width = (trace_half - discriminant).max(0.0).sqrt();
    let psi = 0.5 * (2.0 * sxy).atan2(sxx - syy);

    // third and fourth standardized moments along the major axis
    let (cos_psi, sin_psi) = (psi.cos(), psi.sin());
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &p in &pixels {
        let w = image.charges[p];
        let longi = (geometry.pix_x(p) - cog_x) * cos_psi + (geometry.pix_y(p) - cog_y) * sin_psi;
        m3 += w * longi.powi(3);
        m4 += w * longi.powi(4);
    }
    m3 /= intensity;
    m4 /= intensity;
    let (skewness, kurtosis) = if length > 0.0 {
        (m3 / length.powi(3), m4 / length.powi(4))
    } else {
        (0.0, 0.0)
    };

    let (time_gradient, time_intercept) =
        time_regression(geometry, image, &pixels, cog_x, cog_y, cos_psi, sin_psi);

    let mut leakage_pixels_1 = 0usize;
    let mut leakage_pixels_2 = 0usize;
    let mut leakage_intensity_1 = 0.0;
    let mut leakage_intensity_2 = 0.0;
    for &p in &pixels {
        if geometry.on_border_width_1(p) {
            leakage_pixels_1 += 1;
            leakage_intensity_1 += image.charges[p];
        }
        if geometry.on_border_width_2(p) {
            leakage_pixels_2 += 1;
            leakage_intensity_2 += image.charges[p];
        }
    }

    Ok(HillasParameters {
        intensity,
        cog_x,
        cog_y,
        r: cog_x.hypot(cog_y),
        phi: cog_y.atan2(cog_x),
        length,
        width,
        psi,
        skewness,
        kurtosis,
        time_gradient,
        time_intercept,
        leakage_pixels_width_1: leakage_pixels_1 as Real / pixels.len() as Real,
        leakage_pixels_width_2: leakage_pixels_2 as Real / pixels.len() as Real,
        leakage_intensity_width_1: leakage_intensity_1 / intensity,
        leakage_intensity_width_2: leakage_intensity_2 / intensity,
    })
}

/// Weighted least-squares fit of peak time against the longitudinal
/// coordinate. A degenerate axis yields a zero gradient and the mean
/// peak time as intercept.
fn time_regression(
    geometry: &CameraGeometry,
    image: &CalibratedImage,
    pixels: &[usize],
    cog_x: Real,
    cog_y: Real,
    cos_psi: Real,
    sin_psi: Real,
) -> (Real, Real) {
    let mut weight_sum = 0.0;
    let mut time_mean = 0.0;
    let mut longi_time = 0.0;
    let mut longi_sq = 0.0;
    for &p in pixels {
        let w = image.charges[p];
        let longi = (geometry.pix_x(p) - cog_x) * cos_psi + (geometry.pix_y(p) - cog_y) * sin_psi;
        weight_sum += w;
        time_mean += w * image.peak_times[p];
        longi_time += w * longi * image.peak_times[p];
        longi_sq += w * longi * longi;
    }
    time_mean /= weight_sum;
    if longi_sq > Real::EPSILON {
        (longi_time / longi_sq, time_mean)
    } else {
        (0.0, time_mean)
    }
}
