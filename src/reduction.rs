//! Weighted reductions of labeled arrays
//!
//! Spatial reductions collapse latitude and/or longitude with a
//! [`WeightField`]; the temporal reduction collapses time with uniform weights.
//! Both share one rule: cells whose value is not finite drop out of the
//! numerator *and* the denominator, so weights are renormalized over the valid
//! cells of every individual reduction. Outer lanes (typically time steps) are
//! processed in parallel through ndarray's rayon integration.

use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::{Dim, LabeledArray};
use crate::method_log::MethodLog;
use crate::weights::{ReductionAxes, WeightField};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, ArrayD, ArrayView2, Axis, IxDyn};
use tracing::debug;

/// Summary key holding the number of time steps with at least one valid value
pub const VALID_TIME_STEPS: &str = "valid_time_steps";

/// Labeled arrays that can be collapsed with area or time weights
pub trait SpatialReduction {
    /// Weighted average over the axes of `weights`
    ///
    /// # Errors
    ///
    /// See [`reduce`].
    fn area_average(&self, weights: &WeightField, log: &mut MethodLog) -> Result<LabeledArray>;

    /// Uniform average over the time axis
    ///
    /// # Errors
    ///
    /// See [`reduce_time`].
    fn time_average(&self, log: &mut MethodLog) -> Result<LabeledArray>;
}

impl SpatialReduction for LabeledArray {
    fn area_average(&self, weights: &WeightField, log: &mut MethodLog) -> Result<LabeledArray> {
        reduce(self, weights, log)
    }

    fn time_average(&self, log: &mut MethodLog) -> Result<LabeledArray> {
        reduce_time(self, log)
    }
}

/// Weighted average of `array` over the axes of `weights`
///
/// The result keeps every other axis in its original order, followed by the
/// kept horizontal axis for single-axis reductions. A line with no valid cell
/// reduces to NaN.
///
/// # Errors
///
/// - `DimensionNotFound` if the array lacks a latitude or longitude axis
/// - `GridShapeMismatch` if the weights are not on the array's grid
pub fn reduce(
    array: &LabeledArray,
    weights: &WeightField,
    log: &mut MethodLog,
) -> Result<LabeledArray> {
    let ilat = array.require_axis(Dim::Latitude)?;
    let ilon = array.require_axis(Dim::Longitude)?;
    let shape = array.shape().to_vec();
    let (ny, nx) = (shape[ilat], shape[ilon]);
    if weights.values().dim() != (ny, nx) {
        return Err(EnsoMetricsError::shape_mismatch(
            "weights",
            &[ny, nx],
            weights.values().shape(),
        ));
    }

    let outer: Vec<usize> = (0..shape.len()).filter(|&a| a != ilat && a != ilon).collect();
    let outer_shape: Vec<usize> = outer.iter().map(|&a| shape[a]).collect();
    let n_outer: usize = outer_shape.iter().product();

    let mut order = outer.clone();
    order.extend([ilat, ilon]);
    let permuted = array.data().view().permuted_axes(order);
    let cube = Array3::from_shape_vec((n_outer, ny, nx), permuted.iter().copied().collect())?;

    let axes = weights.axes();
    let w = weights.values();
    let lanes: Vec<Vec<f64>> = cube
        .outer_iter()
        .into_par_iter()
        .map(|slice| reduce_slice(slice, w, axes))
        .collect();

    let mut out_shape = outer_shape;
    let mut out_dims: Vec<Dim> = outer.iter().map(|&a| array.dims()[a]).collect();
    match axes {
        ReductionAxes::Horizontal => {}
        ReductionAxes::Zonal => {
            out_shape.push(ny);
            out_dims.push(Dim::Latitude);
        }
        ReductionAxes::Meridional => {
            out_shape.push(nx);
            out_dims.push(Dim::Longitude);
        }
    }
    debug_assert!(out_dims.iter().all(|d| !axes.reduced_dims().contains(d)));

    let flat: Vec<f64> = lanes.into_iter().flatten().collect();
    let data = ArrayD::from_shape_vec(IxDyn(&out_shape), flat)?;
    let mut out = array.derive(data, out_dims)?;

    let description = format!("{axes} area average over {}", weights.label());
    debug!(region = weights.region(), lanes = n_outer, "{description}");
    out.metadata_mut().history.push(description.clone());
    log.push(description);
    Ok(out)
}

/// Uniform-weight average over the time axis
///
/// Records the number of time steps holding at least one valid value under
/// [`VALID_TIME_STEPS`] in the result's summary fields.
///
/// # Errors
///
/// Returns `DimensionNotFound` if the array has no time axis.
pub fn reduce_time(array: &LabeledArray, log: &mut MethodLog) -> Result<LabeledArray> {
    let it = array.require_axis(Dim::Time)?;
    let data = array.data();
    let valid_steps = data
        .axis_iter(Axis(it))
        .filter(|step| step.iter().any(|v| v.is_finite()))
        .count();

    let reduced = data.map_axis(Axis(it), |lane| {
        weighted_mean(lane.iter().map(|&x| (x, 1.0)))
    });
    let dims: Vec<Dim> = array.dims().iter().copied().filter(|&d| d != Dim::Time).collect();
    let mut out = array.derive(reduced, dims)?;
    out.set_time_axis(None);

    let description = format!("temporal average over {valid_steps} time steps");
    let meta = out.metadata_mut();
    meta.summary.insert(VALID_TIME_STEPS.to_string(), valid_steps as f64);
    meta.history.push(description.clone());
    log.push(description);
    Ok(out)
}

fn reduce_slice(slice: ArrayView2<'_, f64>, w: &Array2<f64>, axes: ReductionAxes) -> Vec<f64> {
    match axes {
        ReductionAxes::Horizontal => {
            vec![weighted_mean(slice.iter().copied().zip(w.iter().copied()))]
        }
        ReductionAxes::Zonal => slice
            .outer_iter()
            .zip(w.outer_iter())
            .map(|(row, wrow)| weighted_mean(row.iter().copied().zip(wrow.iter().copied())))
            .collect(),
        ReductionAxes::Meridional => slice
            .axis_iter(Axis(1))
            .zip(w.axis_iter(Axis(1)))
            .map(|(col, wcol)| weighted_mean(col.iter().copied().zip(wcol.iter().copied())))
            .collect(),
    }
}

/// `sum(w*x) / sum(w)` over pairs with a finite value and a positive weight
fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (num, den) = pairs
        .filter(|&(x, w)| x.is_finite() && w > 0.0)
        .fold((0.0, 0.0), |(num, den), (x, w)| (num + w * x, den + w));
    if den > 0.0 {
        num / den
    } else {
        f64::NAN
    }
}
