//! enso-metrics: ENSO diagnostics from gridded climate time series
//!
//! Reduces a multi-decade `(time, lat, lon)` field to one number and its
//! analytic uncertainty for a named region: the region is rasterized on the
//! field's grid, the field is area-averaged with renormalized weights, the
//! resulting series goes through an ordered preprocessing pipeline and a
//! statistic with a closed-form standard error is taken at the end.
//!
//! ## Module Organization
//!
//! - [`region`]: region definitions and the process-wide region catalog
//! - [`grid`]: grid descriptors and longitude normalization
//! - [`mask`]: rasterization of regions with land/ocean exclusion
//! - [`weights`]: normalized area weights
//! - [`reduction`]: weighted spatial and temporal averages
//! - [`pipeline`]: detrending, seasonal anomalies, normalization, smoothing
//! - [`statistic`]: statistics with standard errors
//! - [`metric`]: end-to-end evaluation into a [`metric::MetricOutcome`]
//! - [`data_source`], [`netcdf_io`], [`regrid`]: data access collaborators
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use enso_metrics::prelude::*;
//!
//! let dataset = NetCDFDataset::open("tos_Omon.nc").unwrap();
//! let field = dataset.read_field("tos").unwrap();
//!
//! let config = PipelineConfig::from_json_str(
//!     r#"{"detrending": true, "seasonal_anomaly": true}"#,
//! )
//! .unwrap();
//! let definition = MetricDefinition::new("nino34_std", "nino3.4", Statistic::StandardDeviation, config);
//! let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);
//! println!("{}", outcome.to_json().unwrap());
//! ```

pub mod data_source;
pub mod errors;
pub mod grid;
pub mod labeled;
pub mod mask;
pub mod method_log;
pub mod metric;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod reduction;
pub mod regrid;
pub mod region;
pub mod statistic;
pub mod weights;

pub use errors::{EnsoMetricsError, ErrorKind, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::data_source::{Ancillary, DatasetKey, GridDatasetProvider, GriddedField, InMemoryProvider};
    pub use crate::errors::{EnsoMetricsError, ErrorKind, Result};
    pub use crate::grid::GridDescriptor;
    pub use crate::labeled::{Dim, Frequency, LabeledArray, TimeAxis};
    pub use crate::mask::{compute_mask, MaskField};
    pub use crate::method_log::MethodLog;
    pub use crate::metric::{evaluate_from_provider, evaluate_metric, MetricDefinition, MetricOutcome};
    pub use crate::netcdf_io::NetCDFDataset;
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{PipelineConfig, PipelineResult, PreprocessPipeline};
    pub use crate::reduction::SpatialReduction;
    pub use crate::regrid::{NearestNeighbourRegridder, Regridder};
    pub use crate::region::{Region, RegionCatalog};
    pub use crate::statistic::{Statistic, StatisticValue};
    pub use crate::weights::{compute_weights, ReductionAxes, WeightField};
}
