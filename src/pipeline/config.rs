//! Recognized pipeline options
//!
//! Options arrive as a JSON mapping. Switch-like options accept either a
//! boolean or an object with details:
//!
//! ```json
//! {
//!   "detrending": {"method": "linear", "axis": "time", "breakpoints": [120]},
//!   "seasonal_anomaly": true,
//!   "normalization": false,
//!   "smoothing": {"method": "triangle", "window": 5},
//!   "frequency": "monthly",
//!   "min_time_steps": 120,
//!   "mask_tolerance": 0.8
//! }
//! ```
//!
//! Keys outside this set are reported with a warning and recorded so the
//! pipeline can trace them in its method log.

use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::Frequency;
use crate::mask::DEFAULT_MASK_TOLERANCE;
use crate::weights::ReductionAxes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Default smoothing window when smoothing is switched on with `true`
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Polynomial trend model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetrendMethod {
    /// Straight line, optionally piecewise between breakpoints
    Linear,
    /// Least-squares polynomial of the given degree
    Polynomial { degree: usize },
}

impl DetrendMethod {
    fn parse(name: &str, degree: Option<usize>) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "polynomial" | "poly" => Ok(Self::Polynomial {
                degree: degree.unwrap_or(2),
            }),
            _ => Err(EnsoMetricsError::UnknownMethod {
                stage: "detrending".to_string(),
                method: name.to_string(),
            }),
        }
    }
}

/// Detrending options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetrendOptions {
    pub method: DetrendMethod,
    /// Time indices splitting the series into independently fitted segments
    pub breakpoints: Vec<usize>,
}

impl DetrendOptions {
    #[must_use]
    pub const fn linear() -> Self {
        Self {
            method: DetrendMethod::Linear,
            breakpoints: Vec::new(),
        }
    }

    #[must_use]
    pub const fn polynomial(degree: usize) -> Self {
        Self {
            method: DetrendMethod::Polynomial { degree },
            breakpoints: Vec::new(),
        }
    }
}

/// Shape of the moving-window weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowShape {
    Triangle,
    Square,
    Gaussian,
}

impl WindowShape {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::Square => "square",
            Self::Gaussian => "gaussian",
        }
    }
}

impl FromStr for WindowShape {
    type Err = EnsoMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "triangle" => Ok(Self::Triangle),
            "square" | "box" => Ok(Self::Square),
            "gaussian" => Ok(Self::Gaussian),
            _ => Err(EnsoMetricsError::UnknownMethod {
                stage: "smoothing".to_string(),
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smoothing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingOptions {
    pub method: WindowShape,
    pub window: usize,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            method: WindowShape::Triangle,
            window: DEFAULT_SMOOTHING_WINDOW,
        }
    }
}

/// Validated pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub detrending: Option<DetrendOptions>,
    pub seasonal_anomaly: bool,
    pub normalization: bool,
    pub smoothing: Option<SmoothingOptions>,
    pub frequency: Frequency,
    pub min_time_steps: Option<usize>,
    /// Land (or ocean) fraction at or above which a cell is excluded
    pub mask_tolerance: f64,
    pub reduction: ReductionAxes,
    /// Target resolution in degrees of an optional regridding step
    pub regridding: Option<f64>,
    /// Keys present in the mapping but not recognized
    pub unrecognized: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detrending: None,
            seasonal_anomaly: false,
            normalization: false,
            smoothing: None,
            frequency: Frequency::Monthly,
            min_time_steps: None,
            mask_tolerance: DEFAULT_MASK_TOLERANCE,
            reduction: ReductionAxes::Horizontal,
            regridding: None,
            unrecognized: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Toggle<T> {
    Flag(bool),
    Options(T),
}

#[derive(Debug, Default, Deserialize)]
struct RawDetrend {
    method: Option<String>,
    axis: Option<Value>,
    breakpoints: Option<Vec<usize>>,
    degree: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSmoothing {
    method: Option<String>,
    window: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    detrending: Option<Toggle<RawDetrend>>,
    seasonal_anomaly: Option<bool>,
    normalization: Option<bool>,
    smoothing: Option<Toggle<RawSmoothing>>,
    frequency: Option<String>,
    min_time_steps: Option<usize>,
    mask_tolerance: Option<f64>,
    reduction: Option<String>,
    regridding: Option<f64>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

impl PipelineConfig {
    /// Parse and validate a JSON option mapping
    ///
    /// # Errors
    ///
    /// - `Json` if the document does not have the expected structure
    /// - `UnknownMethod` / `UnknownFrequency` for unrecognized names
    /// - `InvalidConfiguration` for out-of-range values
    pub fn from_json(value: &Value) -> Result<Self> {
        let raw = RawConfig::deserialize(value)?;
        let defaults = Self::default();

        let detrending = match raw.detrending {
            None | Some(Toggle::Flag(false)) => None,
            Some(Toggle::Flag(true)) => Some(DetrendOptions::linear()),
            Some(Toggle::Options(opts)) => Some(parse_detrend(opts)?),
        };

        let smoothing = match raw.smoothing {
            None | Some(Toggle::Flag(false)) => None,
            Some(Toggle::Flag(true)) => Some(SmoothingOptions::default()),
            Some(Toggle::Options(opts)) => Some(SmoothingOptions {
                method: match opts.method {
                    Some(name) => name.parse()?,
                    None => WindowShape::Triangle,
                },
                window: opts.window.unwrap_or(DEFAULT_SMOOTHING_WINDOW),
            }),
        };

        let frequency = match raw.frequency {
            Some(name) => name.parse()?,
            None => defaults.frequency,
        };

        let mask_tolerance = raw.mask_tolerance.unwrap_or(defaults.mask_tolerance);
        if !(mask_tolerance > 0.0 && mask_tolerance <= 1.0) {
            return Err(EnsoMetricsError::InvalidConfiguration {
                message: format!("mask_tolerance must lie in (0, 1], got {mask_tolerance}"),
            });
        }

        if let Some(res) = raw.regridding {
            if !(res > 0.0) {
                return Err(EnsoMetricsError::InvalidConfiguration {
                    message: format!("regridding resolution must be positive, got {res}"),
                });
            }
        }

        let reduction = match raw.reduction {
            Some(name) => name.parse()?,
            None => defaults.reduction,
        };

        let unrecognized: Vec<String> = raw.unknown.into_keys().collect();
        for key in &unrecognized {
            warn!(option = %key, "unrecognized pipeline option");
        }

        Ok(Self {
            detrending,
            seasonal_anomaly: raw.seasonal_anomaly.unwrap_or(defaults.seasonal_anomaly),
            normalization: raw.normalization.unwrap_or(defaults.normalization),
            smoothing,
            frequency,
            min_time_steps: raw.min_time_steps,
            mask_tolerance,
            reduction,
            regridding: raw.regridding,
            unrecognized,
        })
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_json`].
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }
}

fn parse_detrend(raw: RawDetrend) -> Result<DetrendOptions> {
    if let Some(axis) = &raw.axis {
        let along_time = match axis {
            Value::String(name) => matches!(name.as_str(), "time" | "t" | "0"),
            Value::Number(n) => n.as_u64() == Some(0),
            _ => false,
        };
        if !along_time {
            return Err(EnsoMetricsError::InvalidConfiguration {
                message: format!("detrending is only supported along time, not {axis}"),
            });
        }
    }
    let method = match raw.method {
        Some(name) => DetrendMethod::parse(&name, raw.degree)?,
        None => DetrendMethod::Linear,
    };
    let mut breakpoints = raw.breakpoints.unwrap_or_default();
    breakpoints.sort_unstable();
    breakpoints.dedup();
    Ok(DetrendOptions {
        method,
        breakpoints,
    })
}
