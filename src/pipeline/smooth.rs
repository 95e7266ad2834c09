//! Moving-window smoothing along time
//!
//! Only full windows are kept: the output is `window - 1` samples shorter
//! than the input and the time axis start moves forward by half a window.

use super::{map_time_lanes, PipelineOutput};
use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::LabeledArray;
use crate::pipeline::config::{SmoothingOptions, WindowShape};

/// Normalized weights of a window of `width` points
#[must_use]
pub fn window_weights(shape: WindowShape, width: usize) -> Vec<f64> {
    let centre = (width as f64 - 1.0) / 2.0;
    let raw: Vec<f64> = (0..width)
        .map(|j| match shape {
            WindowShape::Square => 1.0,
            WindowShape::Triangle => (j.min(width - 1 - j) + 1) as f64,
            WindowShape::Gaussian => {
                let sigma = width as f64 / 4.0;
                (-0.5 * ((j as f64 - centre) / sigma).powi(2)).exp()
            }
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Apply the configured moving window to every time lane
///
/// Samples that are not finite are left out of their window and the
/// remaining weights are renormalized; a window without any valid sample
/// yields NaN.
///
/// # Errors
///
/// - `InvalidSmoothingWindow` for an even (or zero) window
/// - `TooShortTimePeriod` if the window is longer than the series
pub fn smooth(array: &LabeledArray, options: &SmoothingOptions) -> Result<PipelineOutput> {
    let width = options.window;
    if width % 2 == 0 {
        return Err(EnsoMetricsError::InvalidSmoothingWindow { window: width });
    }
    let n = array.n_time();
    if width > n {
        return Err(EnsoMetricsError::TooShortTimePeriod {
            required: width,
            found: n,
        });
    }

    let weights = window_weights(options.method, width);
    let mut out = map_time_lanes(array, n - width + 1, |lane| {
        Ok(lane
            .windows(width)
            .map(|window| {
                let (num, den) = window
                    .iter()
                    .zip(&weights)
                    .filter(|(v, _)| v.is_finite())
                    .fold((0.0, 0.0), |(num, den), (v, w)| (num + v * w, den + w));
                if den > 0.0 {
                    num / den
                } else {
                    f64::NAN
                }
            })
            .collect())
    })?;
    let shifted = array.time_axis().map(|t| t.shifted((width - 1) / 2));
    out.set_time_axis(shifted);

    Ok(PipelineOutput::new(
        out,
        format!("smoothed using a {} window of {width} points", options.method),
    ))
}
