//! Arrays with named axes, a time axis and attached metadata
//!
//! [`LabeledArray`] is the currency passed between stages. Stages never mutate
//! their input: each one derives a new array through [`LabeledArray::derive`],
//! which carries the metadata and time axis forward.

use crate::errors::{EnsoMetricsError, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use ndarray::{Array1, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Named axis of a labeled array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Time,
    Latitude,
    Longitude,
    Vertical,
}

impl Dim {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::Vertical => "vertical",
        }
    }
}

/// Sampling frequency of a time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Number of samples in one seasonal cycle (365-day calendar for daily data)
    #[must_use]
    pub const fn periodicity(self) -> usize {
        match self {
            Self::Daily => 365,
            Self::Monthly => 12,
            Self::Yearly => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = EnsoMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "monthly" | "month" | "mon" => Ok(Self::Monthly),
            "yearly" | "year" | "annual" => Ok(Self::Yearly),
            _ => Err(EnsoMetricsError::UnknownFrequency {
                frequency: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regular time axis: a start date and a sampling frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAxis {
    pub start: NaiveDate,
    pub frequency: Frequency,
}

impl TimeAxis {
    #[must_use]
    pub const fn new(start: NaiveDate, frequency: Frequency) -> Self {
        Self { start, frequency }
    }

    /// Position of sample `index` within the seasonal cycle
    ///
    /// For monthly data this is the zero-based calendar month, so a series
    /// starting in March has phase 2 at index 0.
    #[must_use]
    pub fn phase(&self, index: usize) -> usize {
        let period = self.frequency.periodicity();
        let offset = match self.frequency {
            Frequency::Monthly => self.start.month0() as usize,
            Frequency::Daily => (self.start.ordinal0() as usize).min(period - 1),
            Frequency::Yearly => 0,
        };
        (offset + index) % period
    }

    /// Date of sample `index`, `None` if it overflows the calendar
    #[must_use]
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        match self.frequency {
            Frequency::Daily => self.start.checked_add_days(Days::new(index as u64)),
            Frequency::Monthly => self
                .start
                .checked_add_months(Months::new(u32::try_from(index).ok()?)),
            Frequency::Yearly => self
                .start
                .checked_add_months(Months::new(u32::try_from(index * 12).ok()?)),
        }
    }

    /// Axis whose first sample is sample `steps` of this one
    #[must_use]
    pub fn shifted(&self, steps: usize) -> Self {
        Self {
            start: self.date_at(steps).unwrap_or(self.start),
            frequency: self.frequency,
        }
    }
}

/// Metadata carried along with a labeled array
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub units: Option<String>,
    /// Free-text processing history
    pub history: Vec<String>,
    /// Numeric summary fields
    pub summary: BTreeMap<String, f64>,
}

/// Multi-dimensional array with named axes
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    data: ArrayD<f64>,
    dims: Vec<Dim>,
    time: Option<TimeAxis>,
    metadata: Metadata,
}

impl LabeledArray {
    /// Wrap an array, naming each of its axes
    ///
    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if `dims` does not name every axis exactly once.
    pub fn new(data: ArrayD<f64>, dims: Vec<Dim>) -> Result<Self> {
        let distinct = dims
            .iter()
            .enumerate()
            .all(|(i, d)| !dims[..i].contains(d));
        if data.ndim() != dims.len() || !distinct {
            return Err(EnsoMetricsError::shape_mismatch(
                "dims",
                data.shape(),
                &[dims.len()],
            ));
        }
        Ok(Self {
            data,
            dims,
            time: None,
            metadata: Metadata::default(),
        })
    }

    /// 1-D time series
    #[must_use]
    pub fn series(values: Vec<f64>, time: TimeAxis) -> Self {
        Self {
            data: Array1::from(values).into_dyn(),
            dims: vec![Dim::Time],
            time: Some(time),
            metadata: Metadata::default(),
        }
    }

    #[must_use]
    pub fn with_time(mut self, time: TimeAxis) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.metadata.name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: &str) -> Self {
        self.metadata.units = Some(units.to_string());
        self
    }

    /// New array sharing this one's metadata and time axis
    ///
    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if `dims` does not match `data`.
    pub fn derive(&self, data: ArrayD<f64>, dims: Vec<Dim>) -> Result<Self> {
        let mut out = Self::new(data, dims)?;
        out.time = self.time;
        out.metadata = self.metadata.clone();
        Ok(out)
    }

    #[must_use]
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    #[must_use]
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn time_axis(&self) -> Option<&TimeAxis> {
        self.time.as_ref()
    }

    pub(crate) fn set_time_axis(&mut self, time: Option<TimeAxis>) {
        self.time = time;
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    #[must_use]
    pub fn axis_of(&self, dim: Dim) -> Option<usize> {
        self.dims.iter().position(|&d| d == dim)
    }

    /// Index of `dim`, or `DimensionNotFound`
    ///
    /// # Errors
    ///
    /// Returns `DimensionNotFound` when the array has no such axis.
    pub fn require_axis(&self, dim: Dim) -> Result<usize> {
        self.axis_of(dim)
            .ok_or_else(|| EnsoMetricsError::DimensionNotFound {
                var: self.metadata.name.clone(),
                dim: dim.as_str().to_string(),
            })
    }

    /// Length of the time axis (0 when the array has none)
    #[must_use]
    pub fn n_time(&self) -> usize {
        self.axis_of(Dim::Time).map_or(0, |ax| self.data.shape()[ax])
    }

    /// All finite values in memory order
    #[must_use]
    pub fn valid_values(&self) -> Vec<f64> {
        self.data.iter().copied().filter(|v| v.is_finite()).collect()
    }

    /// Scalar at a multi-index, `None` when out of bounds
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.data.get(IxDyn(index)).copied()
    }

    #[must_use]
    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }
}
