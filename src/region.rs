//! Named geographic regions and the process-wide region catalog
//!
//! A [`Region`] is a latitude/longitude box, a polygon, or a signed
//! combination of other regions (e.g. a gradient index "A minus B").
//! Regions are immutable once built; [`RegionCatalog::global`] exposes the
//! standard ENSO domains through an explicit lookup that fails on unknown names.

use crate::errors::{EnsoMetricsError, Result};
use crate::grid::{normalize_longitude, FULL_CIRCLE};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Inclusive latitude/longitude box
///
/// `lon_min > lon_max` (after normalization) describes a box crossing the
/// 0/360 seam, e.g. `350..10`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl LatLonBox {
    #[must_use]
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max
    }

    /// Longitude test in the canonical [0, 360) frame, seam-aware
    #[must_use]
    pub fn contains_lon(&self, lon: f64) -> bool {
        if self.lon_max - self.lon_min >= FULL_CIRCLE {
            return true;
        }
        let lo = normalize_longitude(self.lon_min);
        let hi = normalize_longitude(self.lon_max);
        let x = normalize_longitude(lon);
        if lo <= hi {
            x >= lo && x <= hi
        } else {
            x >= lo || x <= hi
        }
    }
}

/// Sign of a term in a composite region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::Plus => 1.0,
            Self::Minus => -1.0,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "plus",
            Self::Minus => "minus",
        }
    }
}

/// One signed sub-region of a composite
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTerm {
    pub sign: Sign,
    pub region: Region,
}

/// Geometry of a region
#[derive(Debug, Clone, PartialEq)]
pub enum RegionShape {
    Box(LatLonBox),
    /// Ordered `(lat, lon)` vertices of a simple polygon
    Polygon(Vec<(f64, f64)>),
    /// Reduced values of the terms are combined, not their masks
    Composite(Vec<CompositeTerm>),
}

/// Named geographic domain with optional land/ocean exclusion
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub shape: RegionShape,
    pub mask_land: bool,
    pub mask_ocean: bool,
}

impl Region {
    #[must_use]
    pub fn new_box(name: &str, lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self::with_shape(
            name,
            RegionShape::Box(LatLonBox {
                lat_min,
                lat_max,
                lon_min,
                lon_max,
            }),
        )
    }

    #[must_use]
    pub fn polygon(name: &str, vertices: Vec<(f64, f64)>) -> Self {
        Self::with_shape(name, RegionShape::Polygon(vertices))
    }

    #[must_use]
    pub fn composite(name: &str, terms: Vec<CompositeTerm>) -> Self {
        Self::with_shape(name, RegionShape::Composite(terms))
    }

    /// `a` minus `b`
    #[must_use]
    pub fn difference(name: &str, a: Region, b: Region) -> Self {
        Self::composite(
            name,
            vec![
                CompositeTerm {
                    sign: Sign::Plus,
                    region: a,
                },
                CompositeTerm {
                    sign: Sign::Minus,
                    region: b,
                },
            ],
        )
    }

    fn with_shape(name: &str, shape: RegionShape) -> Self {
        Self {
            name: name.to_string(),
            shape,
            mask_land: false,
            mask_ocean: false,
        }
    }

    /// Exclude land cells
    #[must_use]
    pub fn mask_land(mut self, flag: bool) -> Self {
        self.mask_land = flag;
        self
    }

    /// Exclude ocean cells
    #[must_use]
    pub fn mask_ocean(mut self, flag: bool) -> Self {
        self.mask_ocean = flag;
        self
    }

    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.shape, RegionShape::Composite(_))
    }

    /// Land/ocean qualifier used in method descriptions
    #[must_use]
    pub const fn qualifier(&self) -> Option<&'static str> {
        match (self.mask_land, self.mask_ocean) {
            (true, false) => Some("ocean only"),
            (false, true) => Some("land only"),
            _ => None,
        }
    }

    /// Check the definition for internal consistency
    ///
    /// # Errors
    ///
    /// Returns `InvalidRegion` when land and ocean are both masked, the box is
    /// inverted in latitude, a polygon has fewer than 3 vertices, or a
    /// composite has no terms. Composite terms are validated recursively.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| EnsoMetricsError::InvalidRegion {
            region: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.mask_land && self.mask_ocean {
            return Err(invalid("land and ocean cannot both be masked"));
        }
        match &self.shape {
            RegionShape::Box(b) => {
                if !(b.lat_min <= b.lat_max) {
                    return Err(invalid("lat_min exceeds lat_max"));
                }
                if !b.lon_min.is_finite() || !b.lon_max.is_finite() {
                    return Err(invalid("non-finite longitude bound"));
                }
            }
            RegionShape::Polygon(vertices) => {
                if vertices.len() < 3 {
                    return Err(invalid("a polygon needs at least 3 vertices"));
                }
                if vertices
                    .iter()
                    .any(|(lat, lon)| !lat.is_finite() || !lon.is_finite())
                {
                    return Err(invalid("non-finite polygon vertex"));
                }
            }
            RegionShape::Composite(terms) => {
                if terms.is_empty() {
                    return Err(invalid("composite region without terms"));
                }
                for term in terms {
                    term.region.validate()?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier() {
            Some(q) => write!(f, "{} ({q})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Immutable name -> region registry
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: BTreeMap<String, Region>,
}

impl RegionCatalog {
    /// Build a catalog from explicit definitions; later duplicates win
    #[must_use]
    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
        }
    }

    /// Standard catalog, initialized on first use
    pub fn global() -> &'static Self {
        static CATALOG: OnceLock<RegionCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| Self::from_regions(standard_regions()))
    }

    /// # Errors
    ///
    /// Returns `UnknownRegion` if `name` is not registered.
    pub fn lookup(&self, name: &str) -> Result<&Region> {
        self.regions
            .get(name)
            .ok_or_else(|| EnsoMetricsError::UnknownRegion {
                region: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn ocean_box(name: &str, lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Region {
    Region::new_box(name, lat_min, lat_max, lon_min, lon_max).mask_land(true)
}

fn standard_regions() -> Vec<Region> {
    let nino3 = ocean_box("nino3", -5.0, 5.0, 210.0, 270.0);
    let nino4 = ocean_box("nino4", -5.0, 5.0, 160.0, 210.0);
    vec![
        Region::new_box("global", -60.0, 60.0, 0.0, 360.0),
        ocean_box("nino1+2", -10.0, 0.0, 270.0, 280.0),
        ocean_box("nino3_LatExt", -15.0, 15.0, 210.0, 270.0),
        ocean_box("nino3.4", -5.0, 5.0, 190.0, 240.0),
        ocean_box("nino4_LatExt", -15.0, 15.0, 160.0, 210.0),
        ocean_box("equatorial_pacific", -5.0, 5.0, 150.0, 270.0),
        ocean_box("equatorial_pacific_LatExt", -15.0, 15.0, 150.0, 270.0),
        ocean_box("eastern_equatorial_pacific", -5.0, 5.0, 205.0, 280.0),
        ocean_box("western_equatorial_pacific", -5.0, 5.0, 120.0, 205.0),
        ocean_box("tropical_pacific", -30.0, 30.0, 120.0, 280.0),
        Region::polygon(
            "india",
            vec![
                (8.0, 77.0),
                (21.0, 68.0),
                (24.0, 68.5),
                (30.0, 73.0),
                (30.0, 80.0),
                (27.0, 89.0),
                (22.0, 89.0),
                (15.0, 80.5),
            ],
        )
        .mask_ocean(true),
        Region::difference("nino4_minus_nino3", nino4.clone(), nino3.clone()),
        nino3,
        nino4,
    ]
}
