//! Area weights for regional reductions
//!
//! Weights are the physical cell area (or `cos(latitude)` when the dataset
//! has no area field) multiplied by the mask value, normalized over the axes
//! being reduced. For a single-axis reduction every line along the kept axis
//! is normalized on its own.

use crate::errors::{EnsoMetricsError, Result};
use crate::grid::GridDescriptor;
use crate::labeled::Dim;
use crate::mask::MaskField;
use ndarray::{Array2, Axis, Zip};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Set of horizontal axes collapsed by a regional reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionAxes {
    /// Latitude and longitude
    #[default]
    Horizontal,
    /// Longitude only; the result keeps latitude
    Zonal,
    /// Latitude only; the result keeps longitude
    Meridional,
}

impl ReductionAxes {
    /// Axes removed from the array
    #[must_use]
    pub fn reduced_dims(self) -> &'static [Dim] {
        match self {
            Self::Horizontal => &[Dim::Latitude, Dim::Longitude],
            Self::Zonal => &[Dim::Longitude],
            Self::Meridional => &[Dim::Latitude],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Zonal => "zonal",
            Self::Meridional => "meridional",
        }
    }
}

impl FromStr for ReductionAxes {
    type Err = EnsoMetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" | "xy" => Ok(Self::Horizontal),
            "zonal" | "x" => Ok(Self::Zonal),
            "meridional" | "y" => Ok(Self::Meridional),
            _ => Err(EnsoMetricsError::UnknownMethod {
                stage: "reduction".to_string(),
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReductionAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, non-negative weights on a `(lat, lon)` grid
#[derive(Debug, Clone, PartialEq)]
pub struct WeightField {
    region: String,
    label: String,
    axes: ReductionAxes,
    values: Array2<f64>,
}

impl WeightField {
    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    #[must_use]
    pub const fn axes(&self) -> ReductionAxes {
        self.axes
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sum of all weights (1 for a horizontal field, number of non-empty
    /// lines for a single-axis field)
    #[must_use]
    pub fn total(&self) -> f64 {
        self.values.sum()
    }
}

/// Combine cell area and mask into a normalized weight field
///
/// `cell_area` takes precedence over the grid's own area field; without
/// either, weights are proportional to `cos(latitude)`. Non-finite or
/// negative areas count as zero.
///
/// # Errors
///
/// - `GridShapeMismatch` if the mask or an area field is not on `grid`
/// - `EmptyDomain` if no cell keeps a positive weight
pub fn compute_weights(
    grid: &GridDescriptor,
    mask: &MaskField,
    cell_area: Option<&Array2<f64>>,
    axes: ReductionAxes,
) -> Result<WeightField> {
    grid.check_shape("mask", mask.values().shape())?;

    let mut raw = match cell_area.or(grid.cell_area.as_ref()) {
        Some(area) => {
            grid.check_shape("cell_area", area.shape())?;
            area.mapv(|a| if a.is_finite() && a > 0.0 { a } else { 0.0 })
        }
        None => {
            let (ny, nx) = grid.shape();
            Array2::from_shape_fn((ny, nx), |(i, _)| {
                grid.lat[i].to_radians().cos().max(0.0)
            })
        }
    };
    Zip::from(&mut raw)
        .and(mask.values())
        .for_each(|w, &m| *w *= m.clamp(0.0, 1.0));

    let total = raw.sum();
    if !(total > 0.0) {
        return Err(EnsoMetricsError::EmptyDomain {
            region: mask.region().to_string(),
        });
    }

    match axes {
        ReductionAxes::Horizontal => raw.mapv_inplace(|w| w / total),
        ReductionAxes::Zonal => normalize_lanes(&mut raw, Axis(1)),
        ReductionAxes::Meridional => normalize_lanes(&mut raw, Axis(0)),
    }

    debug!(region = mask.region(), axes = %axes, "weights computed");
    Ok(WeightField {
        region: mask.region().to_string(),
        label: mask.label().to_string(),
        axes,
        values: raw,
    })
}

/// Normalize each 1-D lane along `axis`; all-zero lanes stay exactly zero
fn normalize_lanes(values: &mut Array2<f64>, axis: Axis) {
    for mut lane in values.lanes_mut(axis) {
        let sum = lane.sum();
        if sum > 0.0 {
            lane.mapv_inplace(|w| w / sum);
        } else {
            lane.fill(0.0);
        }
    }
}
