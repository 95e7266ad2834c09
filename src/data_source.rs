//! Gridded dataset abstraction
//!
//! A [`GridDatasetProvider`] hands the core a [`GriddedField`]: the variable as
//! a labeled array, its grid, and whichever ancillary fields (cell area, land
//! fraction) it could find. A missing ancillary is reported explicitly as
//! [`Ancillary::NotAvailable`], never as a zero-filled array, so the weighting
//! and masking stages can fall back to their own defaults.

use crate::errors::{EnsoMetricsError, Result};
use crate::grid::GridDescriptor;
use crate::labeled::{Dim, Frequency, LabeledArray};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Axis, Slice};
use std::collections::HashMap;
use tracing::debug;

/// Optional ancillary field of a dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Ancillary {
    Available(Array2<f64>),
    #[default]
    NotAvailable,
}

impl Ancillary {
    #[must_use]
    pub fn as_option(&self) -> Option<&Array2<f64>> {
        match self {
            Self::Available(values) => Some(values),
            Self::NotAvailable => None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl From<Option<Array2<f64>>> for Ancillary {
    fn from(value: Option<Array2<f64>>) -> Self {
        value.map_or(Self::NotAvailable, Self::Available)
    }
}

/// Lookup key of a provider request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub dataset: String,
    pub variable: String,
    /// Inclusive date range; `None` means the whole record
    pub time_range: Option<(NaiveDate, NaiveDate)>,
}

impl DatasetKey {
    #[must_use]
    pub fn new(dataset: &str, variable: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            variable: variable.to_string(),
            time_range: None,
        }
    }

    #[must_use]
    pub fn with_time_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.time_range = Some((start, end));
        self
    }
}

/// A variable on its grid, with optional ancillaries
#[derive(Debug, Clone)]
pub struct GriddedField {
    pub data: LabeledArray,
    pub grid: GridDescriptor,
    pub cell_area: Ancillary,
    pub land_fraction: Ancillary,
}

impl GriddedField {
    /// Pair an array with its grid
    ///
    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if the array's latitude/longitude axes
    /// do not match the grid.
    pub fn new(data: LabeledArray, grid: GridDescriptor) -> Result<Self> {
        if let (Some(ilat), Some(ilon)) = (data.axis_of(Dim::Latitude), data.axis_of(Dim::Longitude)) {
            grid.check_shape(&data.metadata().name, &[data.shape()[ilat], data.shape()[ilon]])?;
        }
        Ok(Self {
            data,
            grid,
            cell_area: Ancillary::NotAvailable,
            land_fraction: Ancillary::NotAvailable,
        })
    }

    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if `area` is not on the field's grid.
    pub fn with_cell_area(mut self, area: Array2<f64>) -> Result<Self> {
        self.grid.check_shape("cell_area", area.shape())?;
        self.cell_area = Ancillary::Available(area);
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if `fraction` is not on the field's grid.
    pub fn with_land_fraction(mut self, fraction: Array2<f64>) -> Result<Self> {
        self.grid.check_shape("land_fraction", fraction.shape())?;
        self.land_fraction = Ancillary::Available(fraction);
        Ok(self)
    }

    /// Restrict the field to the time steps dated within `[start, end]`
    ///
    /// Dates are compared at the resolution of the time axis: a monthly
    /// sample is kept when its month overlaps the range, a yearly one when
    /// its year does.
    ///
    /// # Errors
    ///
    /// - `DimensionNotFound` if the field has no time axis
    /// - `TooShortTimePeriod` if no time step falls in the range
    pub fn select_time(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let it = self.data.require_axis(Dim::Time)?;
        let time = self.data.time_axis().copied().ok_or_else(|| {
            EnsoMetricsError::DimensionNotFound {
                var: self.data.metadata().name.clone(),
                dim: Dim::Time.as_str().to_string(),
            }
        })?;
        let n = self.data.n_time();
        let (lo, hi) = (
            period_key(start, time.frequency),
            period_key(end, time.frequency),
        );
        let inside: Vec<usize> = (0..n)
            .filter(|&i| {
                time.date_at(i).is_some_and(|d| {
                    let key = period_key(d, time.frequency);
                    key >= lo && key <= hi
                })
            })
            .collect();
        let (Some(&first), Some(&last)) = (inside.first(), inside.last()) else {
            return Err(EnsoMetricsError::TooShortTimePeriod {
                required: 1,
                found: 0,
            });
        };

        let data = self
            .data
            .data()
            .slice_axis(Axis(it), Slice::from(first..last + 1))
            .to_owned();
        let mut selected = self.data.derive(data, self.data.dims().to_vec())?;
        selected.set_time_axis(Some(time.shifted(first)));
        debug!(first, last, "time range selected");

        Ok(Self {
            data: selected,
            grid: self.grid.clone(),
            cell_area: self.cell_area.clone(),
            land_fraction: self.land_fraction.clone(),
        })
    }
}

/// Sortable key of the sampling period containing `date`
fn period_key(date: NaiveDate, frequency: Frequency) -> (i32, u32, u32) {
    match frequency {
        Frequency::Daily => (date.year(), date.month(), date.day()),
        Frequency::Monthly => (date.year(), date.month(), 0),
        Frequency::Yearly => (date.year(), 0, 0),
    }
}

/// Source of gridded fields keyed by dataset, variable and time range
pub trait GridDatasetProvider {
    /// Load a field with whatever ancillaries the source holds
    ///
    /// # Errors
    ///
    /// Implementations report unknown variables as `VariableNotFound` and
    /// I/O failures through the data-access variants.
    fn load(&self, key: &DatasetKey) -> Result<GriddedField>;
}

/// Provider backed by fields already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    fields: HashMap<(String, String), GriddedField>,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: &str, variable: &str, field: GriddedField) {
        self.fields
            .insert((dataset.to_string(), variable.to_string()), field);
    }
}

impl GridDatasetProvider for InMemoryProvider {
    fn load(&self, key: &DatasetKey) -> Result<GriddedField> {
        let field = self
            .fields
            .get(&(key.dataset.clone(), key.variable.clone()))
            .ok_or_else(|| EnsoMetricsError::VariableNotFound {
                var: format!("{}/{}", key.dataset, key.variable),
            })?;
        match key.time_range {
            Some((start, end)) => field.select_time(start, end),
            None => Ok(field.clone()),
        }
    }
}
