//! NetCDF-backed gridded dataset provider
//!
//! Reads a `(time, lat, lon)` variable together with its coordinate variables,
//! the CF `units` attribute of the time coordinate (`"<unit> since
//! YYYY-MM-DD"`) and, when present, the `areacella`/`areacello` cell areas and
//! the `sftlf` land fraction. [`write_field`] produces files in the same layout.

use crate::data_source::{DatasetKey, GridDatasetProvider, GriddedField};
use crate::errors::{EnsoMetricsError, Result};
use crate::grid::GridDescriptor;
use crate::labeled::{Dim, Frequency, LabeledArray, TimeAxis};
use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use ndarray::{Array1, Array2, ArrayD, Ix2, IxDyn};
use netcdf::{AttributeValue, File, Variable};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cell-area variables, in order of preference
pub const AREA_VARIABLES: [&str; 2] = ["areacella", "areacello"];
/// Land-fraction variable
pub const LAND_FRACTION_VARIABLE: &str = "sftlf";
/// Fill value used by [`write_field`]
pub const FILL_VALUE: f64 = 1.0e20;

/// A single NetCDF file exposed as a [`GridDatasetProvider`]
#[derive(Debug, Clone)]
pub struct NetCDFDataset {
    path: PathBuf,
    frequency: Option<Frequency>,
}

impl NetCDFDataset {
    /// # Errors
    ///
    /// Returns `NetCDF` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        netcdf::open(&path)?;
        Ok(Self {
            path,
            frequency: None,
        })
    }

    /// Override the sampling frequency instead of reading the `frequency`
    /// global attribute
    #[must_use]
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `variable` with its grid and ancillaries
    ///
    /// # Errors
    ///
    /// - `VariableNotFound` for a missing variable or coordinate variable
    /// - `InvalidConfiguration` for an unsupported dimension or time unit
    /// - `NetCDF` / `Array` for read failures
    pub fn read_field(&self, variable: &str) -> Result<GriddedField> {
        let file = netcdf::open(&self.path)?;
        let var = file
            .variable(variable)
            .ok_or_else(|| EnsoMetricsError::VariableNotFound {
                var: variable.to_string(),
            })?;

        let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let dims = dim_names
            .iter()
            .map(|name| {
                classify_dimension(name).ok_or_else(|| EnsoMetricsError::InvalidConfiguration {
                    message: format!("unsupported dimension '{name}' in variable '{variable}'"),
                })
            })
            .collect::<Result<Vec<Dim>>>()?;

        let mut values = var.get_values::<f64, _>(..)?;
        let missing = missing_values(&var);
        if !missing.is_empty() {
            for v in &mut values {
                if missing.contains(v) {
                    *v = f64::NAN;
                }
            }
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        let mut array = LabeledArray::new(data, dims.clone())?.with_name(variable);
        if let Some(units) = string_attribute(&var, "units") {
            array = array.with_units(&units);
        }

        let coordinate = |dim: Dim| -> Result<Option<Array1<f64>>> {
            match dims.iter().position(|&d| d == dim) {
                Some(ax) => Ok(Some(read_coordinate(&file, &dim_names[ax])?)),
                None => Ok(None),
            }
        };
        let lat = coordinate(Dim::Latitude)?.unwrap_or_else(|| Array1::zeros(0));
        let lon = coordinate(Dim::Longitude)?.unwrap_or_else(|| Array1::zeros(0));

        if let Some(ax) = dims.iter().position(|&d| d == Dim::Time) {
            let frequency = match self.frequency {
                Some(f) => f,
                None => global_frequency(&file)?,
            };
            array = array.with_time(read_time_axis(&file, &dim_names[ax], frequency)?);
        }

        let mut field = GriddedField::new(array, GridDescriptor::new(lat, lon))?;
        if let Some(area) = AREA_VARIABLES
            .iter()
            .find_map(|name| file.variable(name))
        {
            field = field.with_cell_area(read_2d(&area)?)?;
        }
        if let Some(sftlf) = file.variable(LAND_FRACTION_VARIABLE) {
            let mut land = read_2d(&sftlf)?;
            if string_attribute(&sftlf, "units").is_some_and(|u| u.trim() == "%") {
                land.mapv_inplace(|v| v / 100.0);
            }
            field = field.with_land_fraction(land)?;
        }

        info!(
            path = %self.path.display(),
            variable,
            shape = ?field.data.shape(),
            cell_area = field.cell_area.is_available(),
            land_fraction = field.land_fraction.is_available(),
            "field loaded"
        );
        Ok(field)
    }
}

impl GridDatasetProvider for NetCDFDataset {
    fn load(&self, key: &DatasetKey) -> Result<GriddedField> {
        let field = self.read_field(&key.variable)?;
        match key.time_range {
            Some((start, end)) => field.select_time(start, end),
            None => Ok(field),
        }
    }
}

fn classify_dimension(name: &str) -> Option<Dim> {
    match name.to_ascii_lowercase().as_str() {
        "time" | "t" => Some(Dim::Time),
        "lat" | "latitude" | "y" | "nav_lat" | "rlat" => Some(Dim::Latitude),
        "lon" | "longitude" | "x" | "nav_lon" | "rlon" => Some(Dim::Longitude),
        "lev" | "plev" | "level" | "depth" | "olevel" | "z" => Some(Dim::Vertical),
        _ => None,
    }
}

fn numeric(value: AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        _ => None,
    }
}

fn missing_values(var: &Variable) -> Vec<f64> {
    ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| var.attribute(name)?.value().ok())
        .filter_map(numeric)
        .collect()
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn global_frequency(file: &File) -> Result<Frequency> {
    let value = file.attribute("frequency").and_then(|a| a.value().ok());
    match value {
        Some(AttributeValue::Str(s)) => s.parse(),
        _ => Ok(Frequency::Monthly),
    }
}

fn read_coordinate(file: &File, name: &str) -> Result<Array1<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| EnsoMetricsError::VariableNotFound {
            var: name.to_string(),
        })?;
    Ok(Array1::from(var.get_values::<f64, _>(..)?))
}

fn read_2d(var: &Variable) -> Result<Array2<f64>> {
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let mut values = var.get_values::<f64, _>(..)?;
    let missing = missing_values(var);
    for v in &mut values {
        if missing.contains(v) {
            *v = f64::NAN;
        }
    }
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?.into_dimensionality::<Ix2>()?)
}

fn read_time_axis(file: &File, name: &str, frequency: Frequency) -> Result<TimeAxis> {
    let var = file
        .variable(name)
        .ok_or_else(|| EnsoMetricsError::VariableNotFound {
            var: name.to_string(),
        })?;
    let units = string_attribute(&var, "units").ok_or_else(|| {
        EnsoMetricsError::InvalidConfiguration {
            message: format!("time coordinate '{name}' has no units attribute"),
        }
    })?;
    let first = var.get_values::<f64, _>(..)?.first().copied().unwrap_or(0.0);
    let start = decode_time(&units, first)?;

    // monthly and yearly samples are labeled by their month
    let start = match frequency {
        Frequency::Daily => start,
        Frequency::Monthly | Frequency::Yearly => {
            NaiveDate::from_ymd_opt(start.year(), start.month(), 1).unwrap_or(start)
        }
    };
    debug!(%units, %start, %frequency, "time axis decoded");
    Ok(TimeAxis::new(start, frequency))
}

/// Date of `offset` expressed in CF `units`, e.g. `"days since 1850-01-01"`
///
/// # Errors
///
/// Returns `InvalidConfiguration` for malformed units or an unsupported unit.
pub fn decode_time(units: &str, offset: f64) -> Result<NaiveDate> {
    let invalid = || EnsoMetricsError::InvalidConfiguration {
        message: format!("unsupported time units '{units}'"),
    };
    let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;
    let date_text = reference
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .ok_or_else(invalid)?;
    let reference =
        NaiveDate::parse_from_str(date_text, "%Y-%m-%d").map_err(|_| invalid())?;

    let whole = |v: f64| -> Result<u64> {
        if v.is_finite() && v >= 0.0 {
            Ok(v.floor() as u64)
        } else {
            Err(invalid())
        }
    };
    let months = |v: f64| -> Result<Months> {
        u32::try_from(whole(v.round())?)
            .map(Months::new)
            .map_err(|_| invalid())
    };
    let date = match unit.trim().to_ascii_lowercase().as_str() {
        "days" | "day" | "d" => reference.checked_add_days(Days::new(whole(offset)?)),
        "hours" | "hour" | "h" => reference.checked_add_days(Days::new(whole(offset / 24.0)?)),
        "months" | "month" => reference.checked_add_months(months(offset)?),
        "years" | "year" => reference.checked_add_months(months(offset * 12.0)?),
        _ => None,
    };
    date.ok_or_else(invalid)
}

fn encode_time(time: &TimeAxis, n: usize) -> (String, Vec<f64>) {
    let step = match time.frequency {
        Frequency::Daily => ("days", 1.0),
        Frequency::Monthly => ("months", 1.0),
        Frequency::Yearly => ("months", 12.0),
    };
    let units = format!("{} since {}", step.0, time.start.format("%Y-%m-%d"));
    (units, (0..n).map(|i| i as f64 * step.1).collect())
}

fn dimension_name(dim: Dim) -> &'static str {
    match dim {
        Dim::Time => "time",
        Dim::Latitude => "lat",
        Dim::Longitude => "lon",
        Dim::Vertical => "lev",
    }
}

/// Write `field` as `variable` to a new NetCDF file at `path`
///
/// NaN values are stored as [`FILL_VALUE`]; available ancillaries are written
/// under their CMIP names.
///
/// # Errors
///
/// Returns `Io` or `NetCDF` on write failures.
pub fn write_field(field: &GriddedField, variable: &str, path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = netcdf::create(path)?;
    let data = &field.data;

    let dims: Vec<&str> = data.dims().iter().map(|&d| dimension_name(d)).collect();
    for (name, &len) in dims.iter().zip(data.shape()) {
        file.add_dimension(name, len)?;
    }

    if data.axis_of(Dim::Latitude).is_some() {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        lat.put(field.grid.lat.view(), ..)?;
    }
    if data.axis_of(Dim::Longitude).is_some() {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_attribute("units", "degrees_east")?;
        lon.put(field.grid.lon.view(), ..)?;
    }
    if let Some(time) = data.time_axis() {
        let (units, offsets) = encode_time(time, data.n_time());
        let mut tvar = file.add_variable::<f64>("time", &["time"])?;
        tvar.put_attribute("units", units.as_str())?;
        tvar.put(Array1::from(offsets).view(), ..)?;
        file.add_attribute("frequency", time.frequency.as_str())?;
    }

    let filled = data.data().mapv(|v| if v.is_finite() { v } else { FILL_VALUE });
    let mut var = file.add_variable::<f64>(variable, &dims)?;
    var.put_attribute("_FillValue", FILL_VALUE)?;
    if let Some(units) = &data.metadata().units {
        var.put_attribute("units", units.as_str())?;
    }
    var.put(filled.view(), ..)?;

    let ancillaries = [
        (AREA_VARIABLES[0], field.cell_area.as_option()),
        (LAND_FRACTION_VARIABLE, field.land_fraction.as_option()),
    ];
    for (name, values) in ancillaries {
        if let Some(values) = values {
            let filled = values.mapv(|v| if v.is_finite() { v } else { FILL_VALUE });
            let mut avar = file.add_variable::<f64>(name, &["lat", "lon"])?;
            avar.put_attribute("_FillValue", FILL_VALUE)?;
            avar.put(filled.view(), ..)?;
        }
    }

    file.add_attribute(
        "history",
        format!("Created by enso-metrics on {}", Utc::now().to_rfc3339()),
    )?;
    debug!(path = %path.display(), variable, "field written");
    Ok(())
}
