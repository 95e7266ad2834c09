//! Regridding onto uniform latitude/longitude grids
//!
//! The core only needs the [`Regridder`] contract; the crate ships a
//! nearest-neighbour implementation that picks, for every target point, the
//! closest source row and column.

use crate::data_source::{Ancillary, GriddedField};
use crate::errors::{EnsoMetricsError, Result};
use crate::grid::{nearest_index, GridDescriptor};
use crate::labeled::Dim;
use ndarray::{Array2, Axis};
use tracing::debug;

/// Pure transformation of a field onto a uniform grid
pub trait Regridder {
    /// Short method name for the method log
    fn name(&self) -> &str;

    /// Field resampled at `resolution` degrees in both directions
    ///
    /// # Errors
    ///
    /// Implementations reject non-positive resolutions with
    /// `InvalidConfiguration`.
    fn regrid(&self, field: &GriddedField, resolution: f64) -> Result<GriddedField>;
}

/// Nearest-neighbour resampling over the source grid's extent
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourRegridder;

impl NearestNeighbourRegridder {
    /// Uniform grid covering the extent of `grid`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an empty source grid or a
    /// resolution [`GridDescriptor::uniform`] rejects.
    pub fn target_grid(grid: &GridDescriptor, resolution: f64) -> Result<GridDescriptor> {
        if grid.lat.is_empty() || grid.lon.is_empty() {
            return Err(EnsoMetricsError::InvalidConfiguration {
                message: "cannot regrid a field with an empty grid".to_string(),
            });
        }
        let (lat0, lat1) = extent(grid.lat.iter().copied());
        let (lon0, lon1) = extent(grid.lon.iter().copied());
        GridDescriptor::uniform(lat0, lat1, lon0, lon1, resolution)
    }
}

impl Regridder for NearestNeighbourRegridder {
    fn name(&self) -> &str {
        "nearest neighbour"
    }

    fn regrid(&self, field: &GriddedField, resolution: f64) -> Result<GriddedField> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(EnsoMetricsError::InvalidConfiguration {
                message: format!("regridding resolution must be positive, got {resolution}"),
            });
        }
        let target = Self::target_grid(&field.grid, resolution)?;
        let rows: Vec<usize> = target
            .lat
            .iter()
            .map(|&v| nearest_index(&field.grid.lat, v))
            .collect();
        let cols: Vec<usize> = target
            .lon
            .iter()
            .map(|&v| nearest_index(&field.grid.lon, v))
            .collect();

        let data = &field.data;
        let ilat = data.require_axis(Dim::Latitude)?;
        let ilon = data.require_axis(Dim::Longitude)?;
        let values = data
            .data()
            .select(Axis(ilat), &rows)
            .select(Axis(ilon), &cols);
        let resampled = data.derive(values, data.dims().to_vec())?;

        let land_fraction = match field.land_fraction.as_option() {
            Some(fraction) => Ancillary::Available(pick(fraction, &rows, &cols)),
            None => Ancillary::NotAvailable,
        };
        debug!(
            from = ?field.grid.shape(),
            to = ?target.shape(),
            resolution,
            "regridded"
        );

        // source cell areas do not carry over; weighting falls back to cos(lat)
        Ok(GriddedField {
            data: resampled,
            grid: target,
            cell_area: Ancillary::NotAvailable,
            land_fraction,
        })
    }
}

fn pick(values: &Array2<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
    values.select(Axis(0), rows).select(Axis(1), cols)
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_grid_spans_source_extent() {
        let grid = GridDescriptor::uniform(-10.0, 10.0, 100.0, 200.0, 1.0).unwrap();
        let target = NearestNeighbourRegridder::target_grid(&grid, 5.0).unwrap();
        assert_eq!(target.shape(), (5, 21));
        assert_eq!(target.lat[0], -10.0);
        assert_eq!(target.lon[20], 200.0);
    }

    #[test]
    fn test_empty_or_overfine_targets_are_rejected() {
        let empty = GridDescriptor::new(ndarray::Array1::zeros(0), ndarray::Array1::zeros(0));
        let err = NearestNeighbourRegridder::target_grid(&empty, 5.0).unwrap_err();
        assert!(matches!(err, EnsoMetricsError::InvalidConfiguration { .. }));

        let grid = GridDescriptor::uniform(-10.0, 10.0, 100.0, 200.0, 1.0).unwrap();
        let err = NearestNeighbourRegridder::target_grid(&grid, 1e-12).unwrap_err();
        assert!(matches!(err, EnsoMetricsError::InvalidConfiguration { .. }));
    }
}
