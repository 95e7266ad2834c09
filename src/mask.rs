//! Rasterization of regions onto a latitude/longitude grid
//!
//! Box regions are tested cell by cell in the canonical [0, 360) longitude
//! frame. Polygon regions are tested in grid-index space: each vertex is
//! snapped to its nearest grid row/column and the cell centres are classified
//! with an inclusive ray-casting test. Polygon longitudes outside the grid's
//! native range are handled by repeating the test with the vertices shifted
//! by +/-360 degrees and OR-ing the results.
//!
//! Snapping vertices to grid indices is an approximation: on coarse grids a
//! boundary cell can be classified differently than a continuous-coordinate
//! test would. It is kept so that values stay comparable with historical
//! results.

use crate::errors::{EnsoMetricsError, Result};
use crate::grid::{nearest_index, GridDescriptor, FULL_CIRCLE};
use crate::region::{Region, RegionShape, Sign};
use ndarray::{Array2, Zip};
use tracing::debug;

/// Default land (or ocean) fraction above which a cell is excluded
pub const DEFAULT_MASK_TOLERANCE: f64 = 0.8;

/// Land fraction fields whose largest value exceeds this are read as percent
pub const PERCENT_THRESHOLD: f64 = 1.5;

/// Per-cell inclusion weight in [0, 1] on a specific grid
#[derive(Debug, Clone, PartialEq)]
pub struct MaskField {
    region: String,
    label: String,
    values: Array2<f64>,
}

impl MaskField {
    #[must_use]
    pub fn new(region: &str, values: Array2<f64>) -> Self {
        Self {
            region: region.to_string(),
            label: region.to_string(),
            values,
        }
    }

    /// Replace the description used in method logs
    #[must_use]
    pub fn with_label(mut self, label: String) -> Self {
        self.label = label;
        self
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Region name with its land/ocean qualifier
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of cells with a non-zero inclusion weight
    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.values.iter().filter(|&&v| v > 0.0).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retained_count() == 0
    }
}

/// Mask of one signed term of a (possibly composite) region
#[derive(Debug, Clone)]
pub struct TermMask {
    pub sign: Sign,
    pub region: Region,
    pub mask: MaskField,
}

/// Rasterize a box or polygon region, then apply land/ocean exclusion
///
/// `land_fraction` may be given in [0, 1] or in percent (any value above
/// [`PERCENT_THRESHOLD`]). When the region asks for land or ocean exclusion
/// but no land fraction is available, the geometric mask is returned
/// unchanged.
///
/// # Errors
///
/// - `InvalidRegion` for an inconsistent region or a composite region
///   (composites are reduced term by term, see [`compute_term_masks`])
/// - `GridShapeMismatch` if `land_fraction` is not on `grid`
pub fn compute_mask(
    region: &Region,
    grid: &GridDescriptor,
    land_fraction: Option<&Array2<f64>>,
    tolerance: f64,
) -> Result<MaskField> {
    region.validate()?;

    let mut values = match &region.shape {
        RegionShape::Box(b) => {
            let (ny, nx) = grid.shape();
            let lon = grid.canonical_lon();
            Array2::from_shape_fn((ny, nx), |(i, j)| {
                if b.contains_lat(grid.lat[i]) && b.contains_lon(lon[j]) {
                    1.0
                } else {
                    0.0
                }
            })
        }
        RegionShape::Polygon(vertices) => polygon_mask(vertices, grid),
        RegionShape::Composite(_) => {
            return Err(EnsoMetricsError::InvalidRegion {
                region: region.name.clone(),
                reason: "composite regions are combined after reduction, not rasterized"
                    .to_string(),
            })
        }
    };

    if region.mask_land || region.mask_ocean {
        match land_fraction {
            Some(fraction) => {
                grid.check_shape("land_fraction", fraction.shape())?;
                apply_surface_exclusion(&mut values, fraction, region.mask_land, tolerance);
            }
            None => debug!(
                region = %region.name,
                "no land fraction available, surface exclusion skipped"
            ),
        }
    }

    let mask = MaskField::new(&region.name, values).with_label(region.to_string());
    debug!(
        region = %region.name,
        retained = mask.retained_count(),
        "mask computed"
    );
    Ok(mask)
}

/// Masks of every signed leaf term of `region`
///
/// A plain region yields a single `Plus` term; a composite recurses into its
/// terms, composing signs along the way.
///
/// # Errors
///
/// Propagates any error from [`compute_mask`].
pub fn compute_term_masks(
    region: &Region,
    grid: &GridDescriptor,
    land_fraction: Option<&Array2<f64>>,
    tolerance: f64,
) -> Result<Vec<TermMask>> {
    region.validate()?;
    let mut out = Vec::new();
    collect_terms(region, Sign::Plus, grid, land_fraction, tolerance, &mut out)?;
    Ok(out)
}

fn collect_terms(
    region: &Region,
    sign: Sign,
    grid: &GridDescriptor,
    land_fraction: Option<&Array2<f64>>,
    tolerance: f64,
    out: &mut Vec<TermMask>,
) -> Result<()> {
    match &region.shape {
        RegionShape::Composite(terms) => {
            for term in terms {
                let composed = if term.sign == sign {
                    Sign::Plus
                } else {
                    Sign::Minus
                };
                collect_terms(&term.region, composed, grid, land_fraction, tolerance, out)?;
            }
        }
        _ => out.push(TermMask {
            sign,
            region: region.clone(),
            mask: compute_mask(region, grid, land_fraction, tolerance)?,
        }),
    }
    Ok(())
}

fn apply_surface_exclusion(
    mask: &mut Array2<f64>,
    land_fraction: &Array2<f64>,
    exclude_land: bool,
    tolerance: f64,
) {
    let max = land_fraction
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let scale = if max > PERCENT_THRESHOLD { 0.01 } else { 1.0 };
    Zip::from(mask).and(land_fraction).for_each(|m, &raw| {
        let land = if raw.is_finite() {
            (raw * scale).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let excluded = if exclude_land { land } else { 1.0 - land };
        if excluded >= tolerance {
            *m = 0.0;
        } else {
            *m *= 1.0 - excluded;
        }
    });
}

fn polygon_mask(vertices: &[(f64, f64)], grid: &GridDescriptor) -> Array2<f64> {
    let (ny, nx) = grid.shape();
    let mut inside = Array2::from_elem((ny, nx), false);

    let lon_lo = grid.lon.iter().copied().fold(f64::INFINITY, f64::min);
    let lon_hi = grid.lon.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut shifts = vec![0.0];
    if vertices.iter().any(|&(_, lon)| lon < lon_lo) {
        shifts.push(FULL_CIRCLE);
    }
    if vertices.iter().any(|&(_, lon)| lon > lon_hi) {
        shifts.push(-FULL_CIRCLE);
    }

    for shift in shifts {
        let snapped: Vec<(f64, f64)> = vertices
            .iter()
            .map(|&(lat, lon)| {
                (
                    nearest_index(&grid.lat, lat) as f64,
                    nearest_index(&grid.lon, lon + shift) as f64,
                )
            })
            .collect();
        // vertices clamped onto a single row/column enclose nothing
        if polygon_area(&snapped) == 0.0 {
            continue;
        }
        for ((i, j), cell) in inside.indexed_iter_mut() {
            if !*cell && point_in_polygon(i as f64, j as f64, &snapped) {
                *cell = true;
            }
        }
    }

    inside.mapv(|b| if b { 1.0 } else { 0.0 })
}

/// Shoelace area (unsigned)
fn polygon_area(poly: &[(f64, f64)]) -> f64 {
    let n = poly.len();
    let twice: f64 = (0..n)
        .map(|k| {
            let (y0, x0) = poly[k];
            let (y1, x1) = poly[(k + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    (twice / 2.0).abs()
}

/// Ray-casting test; points on an edge count as inside
fn point_in_polygon(y: f64, x: f64, poly: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (yi, xi) = poly[i];
        let (yj, xj) = poly[j];
        if on_segment(y, x, (yi, xi), (yj, xj)) {
            return true;
        }
        if (yi > y) != (yj > y) {
            let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(y: f64, x: f64, a: (f64, f64), b: (f64, f64)) -> bool {
    let cross = (b.1 - a.1) * (y - a.0) - (b.0 - a.0) * (x - a.1);
    cross.abs() < 1e-12
        && y >= a.0.min(b.0)
        && y <= a.0.max(b.0)
        && x >= a.1.min(b.1)
        && x <= a.1.max(b.1)
}
