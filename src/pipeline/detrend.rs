//! Trend removal along the time axis
//!
//! A least-squares polynomial (a straight line by default) is fitted to the
//! finite samples of every time lane and subtracted; the lane mean is added
//! back so the series keeps its baseline. With breakpoints, each segment gets
//! its own independent fit.

use super::{map_time_lanes, PipelineOutput};
use crate::errors::Result;
use crate::labeled::LabeledArray;
use crate::pipeline::config::{DetrendMethod, DetrendOptions};
use nalgebra::{DMatrix, DVector};

const SVD_EPS: f64 = 1e-10;

/// Remove the configured trend from every time lane
///
/// # Errors
///
/// Returns `DimensionNotFound` if the array has no time axis.
pub fn detrend(array: &LabeledArray, options: &DetrendOptions) -> Result<PipelineOutput> {
    let degree = match options.method {
        DetrendMethod::Linear => 1,
        DetrendMethod::Polynomial { degree } => degree,
    };
    let n = array.n_time();
    let out = map_time_lanes(array, n, |lane| {
        Ok(detrend_lane(lane, degree, &options.breakpoints))
    })?;
    Ok(PipelineOutput::new(out, describe(options)))
}

fn describe(options: &DetrendOptions) -> String {
    let base = match options.method {
        DetrendMethod::Linear => "linearly detrended".to_string(),
        DetrendMethod::Polynomial { degree } => {
            format!("detrended with a polynomial of degree {degree}")
        }
    };
    if options.breakpoints.is_empty() {
        base
    } else {
        let points: Vec<String> = options.breakpoints.iter().map(ToString::to_string).collect();
        format!("{base} piecewise (breakpoints at {})", points.join(", "))
    }
}

fn detrend_lane(y: &[f64], degree: usize, breakpoints: &[usize]) -> Vec<f64> {
    let n = y.len();
    let finite: Vec<f64> = y.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return y.to_vec();
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;

    let mut bounds = vec![0];
    bounds.extend(breakpoints.iter().copied().filter(|&b| b > 0 && b < n));
    bounds.push(n);

    let mut out = y.to_vec();
    for seg in bounds.windows(2) {
        let (a, b) = (seg[0], seg[1]);
        let mid = (a + b - 1) as f64 / 2.0;
        let half = ((b - 1 - a) as f64 / 2.0).max(1.0);
        let scaled = |i: usize| (i as f64 - mid) / half;

        let (ts, ys): (Vec<f64>, Vec<f64>) = (a..b)
            .filter(|&i| y[i].is_finite())
            .map(|i| (scaled(i), y[i]))
            .unzip();
        if ys.is_empty() {
            continue;
        }
        let coeffs = fit_polynomial(&ts, &ys, degree.min(ys.len() - 1));
        for i in a..b {
            if y[i].is_finite() {
                out[i] = y[i] - evaluate(&coeffs, scaled(i)) + mean;
            }
        }
    }
    out
}

/// Least-squares coefficients, constant term first
///
/// Solves the normal equations by Cholesky and falls back to an SVD
/// pseudo-inverse when they are singular.
fn fit_polynomial(ts: &[f64], ys: &[f64], degree: usize) -> Vec<f64> {
    let design = DMatrix::from_fn(ts.len(), degree + 1, |i, k| ts[i].powi(k as i32));
    let ys = DVector::from_column_slice(ys);
    let xtx = design.transpose() * &design;
    let xty = design.transpose() * &ys;

    let beta = match xtx.clone().cholesky() {
        Some(chol) => chol.solve(&xty),
        None => match xtx.svd(true, true).solve(&xty, SVD_EPS) {
            Ok(beta) => beta,
            Err(_) => return vec![ys.mean()],
        },
    };
    beta.iter().copied().collect()
}

fn evaluate(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
}
