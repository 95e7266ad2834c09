//! Seasonal-cycle removal and per-season normalization
//!
//! Both operations group samples by their phase in the seasonal cycle (the
//! calendar month for monthly data), which is taken from the time axis so a
//! series may start in any month.

use super::{map_time_lanes, PipelineOutput};
use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::{LabeledArray, TimeAxis};
use tracing::warn;

fn require_time_axis(array: &LabeledArray) -> Result<TimeAxis> {
    array
        .time_axis()
        .copied()
        .ok_or_else(|| EnsoMetricsError::InvalidConfiguration {
            message: format!("'{}' has no time axis to derive seasons from", array.metadata().name),
        })
}

/// Finite samples of a lane grouped by seasonal phase
fn phase_groups(lane: &[f64], time: &TimeAxis) -> Vec<Vec<f64>> {
    let mut groups = vec![Vec::new(); time.frequency.periodicity()];
    for (i, &v) in lane.iter().enumerate() {
        if v.is_finite() {
            groups[time.phase(i)].push(v);
        }
    }
    groups
}

/// Subtract the long-term mean of each season
///
/// # Errors
///
/// - `InvalidConfiguration` if the array carries no time axis
/// - `TooShortTimePeriod` for an empty series
pub fn seasonal_anomaly(array: &LabeledArray) -> Result<PipelineOutput> {
    let time = require_time_axis(array)?;
    let n = array.n_time();
    if n == 0 {
        return Err(EnsoMetricsError::TooShortTimePeriod {
            required: 1,
            found: 0,
        });
    }

    let out = map_time_lanes(array, n, |lane| {
        let climatology: Vec<f64> = phase_groups(lane, &time)
            .iter()
            .map(|g| mean(g).unwrap_or(f64::NAN))
            .collect();
        Ok(lane
            .iter()
            .enumerate()
            .map(|(i, &v)| v - climatology[time.phase(i)])
            .collect())
    })?;
    Ok(PipelineOutput::new(
        out,
        format!("seasonal cycle removed ({} climatology)", time.frequency),
    ))
}

/// Divide each season by its standard deviation over the whole series
///
/// Seasons whose spread is zero are left unscaled.
///
/// # Errors
///
/// - `IncompleteYears` if the length is not a multiple of the periodicity
/// - `TooShortTimePeriod` if fewer than two complete cycles are available
/// - `InvalidConfiguration` if the array carries no time axis
pub fn normalize(array: &LabeledArray) -> Result<PipelineOutput> {
    let time = require_time_axis(array)?;
    let period = time.frequency.periodicity();
    let n = array.n_time();
    if n % period != 0 {
        return Err(EnsoMetricsError::IncompleteYears { length: n, period });
    }
    if n < 2 * period {
        return Err(EnsoMetricsError::TooShortTimePeriod {
            required: 2 * period,
            found: n,
        });
    }

    let mut flat_season = false;
    let out = map_time_lanes(array, n, |lane| {
        let spreads: Vec<Option<f64>> = phase_groups(lane, &time)
            .iter()
            .map(|g| sample_std(g))
            .collect();
        flat_season |= spreads.iter().any(|s| *s == Some(0.0));
        Ok(lane
            .iter()
            .enumerate()
            .map(|(i, &v)| match spreads[time.phase(i)] {
                Some(s) if s > 0.0 => v / s,
                _ => v,
            })
            .collect())
    })?;
    if flat_season {
        warn!(name = %array.metadata().name, "season with zero spread left unnormalized");
    }
    Ok(PipelineOutput::new(out, "normalized".to_string()))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}
