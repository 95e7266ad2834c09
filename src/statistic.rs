//! Scalar statistics with analytic standard errors
//!
//! With `n` valid samples and `σ` their sample standard deviation (`n - 1`
//! denominator), the reported uncertainties are the closed-form large-sample
//! standard errors:
//!
//! | statistic | value | error |
//! |---|---|---|
//! | average | mean | `σ / √n` |
//! | standard deviation | `σ` | `σ / √(2(n-1))` |
//! | variance | `σ²` | `σ² · √(2/(n-1))` |
//! | skewness | third standardized moment | `√(6n(n-1) / ((n-2)(n+1)(n+3)))` |

use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::{Dim, LabeledArray};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Arithmetic mean
    Average,
    /// Sample standard deviation
    StandardDeviation,
    /// Sample variance
    Variance,
    /// Third standardized moment
    Skewness,
}

impl Statistic {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::StandardDeviation => "standard_deviation",
            Self::Variance => "variance",
            Self::Skewness => "skewness",
        }
    }

    /// Fewest valid samples for which the error formula is defined
    #[must_use]
    pub const fn min_samples(self) -> usize {
        match self {
            Self::Skewness => 3,
            Self::Average | Self::StandardDeviation | Self::Variance => 2,
        }
    }
}

impl FromStr for Statistic {
    type Err = EnsoMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "mean" => Ok(Self::Average),
            "standard_deviation" | "std" => Ok(Self::StandardDeviation),
            "variance" | "var" => Ok(Self::Variance),
            "skewness" | "skew" => Ok(Self::Skewness),
            _ => Err(EnsoMetricsError::UnknownMethod {
                stage: "statistic".to_string(),
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statistic, its standard error and the sample size behind them
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticValue {
    pub value: f64,
    pub value_error: f64,
    pub n: usize,
}

/// Compute `statistic` over the finite entries of `series`
///
/// # Errors
///
/// Returns `TooShortTimePeriod` when fewer than
/// [`Statistic::min_samples`] finite values are available.
pub fn compute(series: &[f64], statistic: Statistic) -> Result<StatisticValue> {
    let valid: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = valid.len();
    if n < statistic.min_samples() {
        return Err(EnsoMetricsError::TooShortTimePeriod {
            required: statistic.min_samples(),
            found: n,
        });
    }

    let nf = n as f64;
    let mean = valid.iter().sum::<f64>() / nf;
    let ss: f64 = valid.iter().map(|v| (v - mean).powi(2)).sum();
    let sigma = (ss / (nf - 1.0)).sqrt();

    let (value, value_error) = match statistic {
        Statistic::Average => (mean, sigma / nf.sqrt()),
        Statistic::StandardDeviation => (sigma, sigma / (2.0 * (nf - 1.0)).sqrt()),
        Statistic::Variance => {
            let var = sigma * sigma;
            (var, var * (2.0 / (nf - 1.0)).sqrt())
        }
        Statistic::Skewness => {
            let error =
                (6.0 * nf * (nf - 1.0) / ((nf - 2.0) * (nf + 1.0) * (nf + 3.0))).sqrt();
            (skewness(&valid, mean), error)
        }
    };

    Ok(StatisticValue {
        value,
        value_error,
        n,
    })
}

/// Compute `statistic` over the finite values of a single time series
///
/// # Errors
///
/// - `GridShapeMismatch` if the array keeps any axis besides time
/// - otherwise see [`compute`]
pub fn compute_array(array: &LabeledArray, statistic: Statistic) -> Result<StatisticValue> {
    if array.dims() != [Dim::Time] {
        return Err(EnsoMetricsError::shape_mismatch(
            "statistic input",
            &[array.n_time()],
            array.shape(),
        ));
    }
    compute(&array.valid_values(), statistic)
}

/// Biased moment estimator `m3 / m2^1.5`; zero for a constant series
fn skewness(values: &[f64], mean: f64) -> f64 {
    let n = values.len() as f64;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return 0.0;
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    m3 / m2.powf(1.5)
}
