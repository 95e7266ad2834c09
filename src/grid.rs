//! Latitude/longitude grid description
//!
//! A [`GridDescriptor`] holds the 1-D coordinate arrays of a rectilinear grid
//! and, when the dataset provides one, the 2-D cell-area field. Longitudes may
//! arrive on either the 0..360 or the -180..180 convention; every comparison
//! between longitudes of different origin goes through [`normalize_longitude`].

use crate::errors::{EnsoMetricsError, Result};
use ndarray::{Array1, Array2};

/// Full turn in degrees
pub const FULL_CIRCLE: f64 = 360.0;

/// Upper bound on the length of a generated coordinate axis
pub const MAX_AXIS_POINTS: usize = 100_000;

/// Map a longitude onto the canonical [0, 360) frame
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(FULL_CIRCLE);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= FULL_CIRCLE {
        0.0
    } else {
        wrapped
    }
}

/// Longitude convention of a coordinate array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LonConvention {
    /// Longitudes in [0, 360)
    ZeroTo360,
    /// Longitudes in [-180, 180)
    Signed180,
}

impl LonConvention {
    /// Infer the convention from the values of a longitude coordinate
    #[must_use]
    pub fn detect(lon: &Array1<f64>) -> Self {
        if lon.iter().any(|&x| x < 0.0) {
            Self::Signed180
        } else {
            Self::ZeroTo360
        }
    }
}

/// Rectilinear latitude/longitude grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridDescriptor {
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub cell_area: Option<Array2<f64>>,
}

impl GridDescriptor {
    /// Create a grid without cell areas
    #[must_use]
    pub fn new(lat: Array1<f64>, lon: Array1<f64>) -> Self {
        Self {
            lat,
            lon,
            cell_area: None,
        }
    }

    /// Attach a cell-area field; it must match the `(lat, lon)` shape
    ///
    /// # Errors
    ///
    /// Returns `GridShapeMismatch` if the area array has a different shape.
    pub fn with_cell_area(mut self, area: Array2<f64>) -> Result<Self> {
        self.check_shape("cell_area", area.shape())?;
        self.cell_area = Some(area);
        Ok(self)
    }

    /// Uniform grid spanning `[lat0, lat1] x [lon0, lon1]` with the given step
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a non-finite or non-positive step,
    /// reversed or non-finite bounds, or an axis longer than
    /// [`MAX_AXIS_POINTS`].
    pub fn uniform(lat0: f64, lat1: f64, lon0: f64, lon1: f64, step: f64) -> Result<Self> {
        Ok(Self::new(
            axis_points(lat0, lat1, step)?,
            axis_points(lon0, lon1, step)?,
        ))
    }

    /// `(n_lat, n_lon)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    #[must_use]
    pub fn lon_convention(&self) -> LonConvention {
        LonConvention::detect(&self.lon)
    }

    /// Grid longitudes translated to the canonical [0, 360) frame
    #[must_use]
    pub fn canonical_lon(&self) -> Array1<f64> {
        self.lon.mapv(normalize_longitude)
    }

    /// Verify that a 2-D ancillary field lives on this grid
    ///
    /// # Errors
    ///
    /// Returns `GridShapeMismatch` naming `field` when shapes differ.
    pub fn check_shape(&self, field: &str, found: &[usize]) -> Result<()> {
        let (ny, nx) = self.shape();
        if found != [ny, nx] {
            return Err(EnsoMetricsError::shape_mismatch(field, &[ny, nx], found));
        }
        Ok(())
    }
}

fn axis_points(start: f64, end: f64, step: f64) -> Result<Array1<f64>> {
    let invalid = |message: String| EnsoMetricsError::InvalidConfiguration { message };
    if !(step.is_finite() && step > 0.0) {
        return Err(invalid(format!("grid step must be positive, got {step}")));
    }
    if !(start.is_finite() && end.is_finite() && end >= start) {
        return Err(invalid(format!("invalid grid bounds [{start}, {end}]")));
    }
    let span = ((end - start) / step).round();
    if span >= MAX_AXIS_POINTS as f64 {
        return Err(invalid(format!(
            "a step of {step} over [{start}, {end}] exceeds {MAX_AXIS_POINTS} points"
        )));
    }
    let n = span as usize + 1;
    Ok(Array1::from_iter((0..n).map(|i| start + step * i as f64)))
}

/// Index of the coordinate closest to `value` (first one on ties)
pub(crate) fn nearest_index(coords: &Array1<f64>, value: f64) -> usize {
    coords
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, dist), (i, &c)| {
            let d = (c - value).abs();
            if d < dist {
                (i, d)
            } else {
                (best, dist)
            }
        })
        .0
}
