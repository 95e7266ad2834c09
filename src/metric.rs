//! Metric evaluation
//!
//! [`evaluate_metric`] runs one region × variable × dataset evaluation from
//! start to finish and always returns a [`MetricOutcome`]. Failures are data:
//! the outcome then carries the error kind, a one-line message, the stage that
//! failed and the method log up to that point, and no value.

use crate::data_source::{DatasetKey, GridDatasetProvider, GriddedField};
use crate::errors::{EnsoMetricsError, ErrorKind, Result};
use crate::method_log::MethodLog;
use crate::pipeline::{PipelineConfig, PipelineResult, PreprocessPipeline};
use crate::regrid::Regridder;
use crate::region::RegionCatalog;
use crate::statistic::{compute_array, Statistic, StatisticValue};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

/// What to compute: a named statistic of a preprocessed regional series
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub region: String,
    pub statistic: Statistic,
    pub config: PipelineConfig,
}

impl MetricDefinition {
    #[must_use]
    pub fn new(name: &str, region: &str, statistic: Statistic, config: PipelineConfig) -> Self {
        Self {
            name: name.to_string(),
            region: region.to_string(),
            statistic,
            config,
        }
    }
}

/// Why an evaluation produced no value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Name of the step that failed, if it happened inside a known step
    pub stage: Option<String>,
}

/// Terminal artifact of one metric evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricOutcome {
    pub metric: String,
    pub region: String,
    pub statistic: Statistic,
    pub value: Option<f64>,
    pub value_error: Option<f64>,
    /// Complete seasonal cycles in the input record
    pub n_years: usize,
    /// First and last date of the input record
    pub time_period: Option<(NaiveDate, NaiveDate)>,
    pub method_log: String,
    pub error: Option<MetricFailure>,
}

impl MetricOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct StageError {
    error: EnsoMetricsError,
    stage: Option<&'static str>,
}

impl StageError {
    fn at(stage: &'static str) -> impl FnOnce(EnsoMetricsError) -> Self {
        move |error| Self {
            error,
            stage: Some(stage),
        }
    }
}

/// Evaluate `definition` on an already loaded field
///
/// `regridder` is only consulted when the definition asks for regridding.
#[tracing::instrument(skip_all, fields(metric = %definition.name, region = %definition.region))]
pub fn evaluate_metric(
    definition: &MetricDefinition,
    field: &GriddedField,
    catalog: &RegionCatalog,
    regridder: Option<&dyn Regridder>,
) -> MetricOutcome {
    let n_time = field.data.n_time();
    let frequency = field
        .data
        .time_axis()
        .map_or(definition.config.frequency, |t| t.frequency);
    let time_period = field.data.time_axis().and_then(|t| {
        let last = t.date_at(n_time.checked_sub(1)?)?;
        Some((t.start, last))
    });

    let mut log = MethodLog::new();
    let result = evaluate_steps(definition, field, catalog, regridder, &mut log);

    let mut outcome = MetricOutcome {
        metric: definition.name.clone(),
        region: definition.region.clone(),
        statistic: definition.statistic,
        value: None,
        value_error: None,
        n_years: n_time / frequency.periodicity(),
        time_period,
        method_log: log.render(),
        error: None,
    };
    match result {
        Ok(stat) => {
            info!(value = stat.value, error = stat.value_error, n = stat.n, "metric computed");
            outcome.value = Some(stat.value);
            outcome.value_error = Some(stat.value_error);
        }
        Err(StageError { error, stage }) => {
            warn!(stage = stage.unwrap_or("-"), error = %error, "metric failed");
            outcome.error = Some(MetricFailure {
                kind: error.kind(),
                message: error.to_string(),
                stage: stage.map(str::to_string),
            });
        }
    }
    outcome
}

/// Load the field for `key` from `provider`, then evaluate
///
/// A load failure is reported in the outcome like any other failure.
pub fn evaluate_from_provider(
    definition: &MetricDefinition,
    provider: &dyn GridDatasetProvider,
    key: &DatasetKey,
    catalog: &RegionCatalog,
    regridder: Option<&dyn Regridder>,
) -> MetricOutcome {
    match provider.load(key) {
        Ok(field) => evaluate_metric(definition, &field, catalog, regridder),
        Err(error) => {
            warn!(dataset = %key.dataset, variable = %key.variable, error = %error, "load failed");
            MetricOutcome {
                metric: definition.name.clone(),
                region: definition.region.clone(),
                statistic: definition.statistic,
                value: None,
                value_error: None,
                n_years: 0,
                time_period: key.time_range,
                method_log: String::new(),
                error: Some(MetricFailure {
                    kind: error.kind(),
                    message: error.to_string(),
                    stage: Some("load".to_string()),
                }),
            }
        }
    }
}

fn evaluate_steps(
    definition: &MetricDefinition,
    field: &GriddedField,
    catalog: &RegionCatalog,
    regridder: Option<&dyn Regridder>,
    log: &mut MethodLog,
) -> std::result::Result<StatisticValue, StageError> {
    let region = catalog
        .lookup(&definition.region)
        .map_err(StageError::at("region_lookup"))?;

    let regridded = match definition.config.regridding {
        Some(resolution) => {
            let regridder = regridder.ok_or_else(|| {
                StageError::at("regridding")(EnsoMetricsError::InvalidConfiguration {
                    message: "regridding requested but no regridder is available".to_string(),
                })
            })?;
            let out = regridder
                .regrid(field, resolution)
                .map_err(StageError::at("regridding"))?;
            log.push(format!(
                "regridded to a uniform {resolution} degree grid ({})",
                regridder.name()
            ));
            Some(out)
        }
        None => None,
    };
    let field = regridded.as_ref().unwrap_or(field);

    let PipelineResult {
        value,
        method_log,
        error,
        failed_stage,
    } = PreprocessPipeline::new(definition.config.clone()).run(field, region);
    log.append(method_log);
    if let Some(error) = error {
        return Err(StageError {
            error,
            stage: failed_stage.map(|s| s.as_str()),
        });
    }
    let series = value.ok_or_else(|| {
        StageError::at("pipeline")(EnsoMetricsError::InvalidConfiguration {
            message: "pipeline produced no value".to_string(),
        })
    })?;

    let stat = compute_array(&series, definition.statistic).map_err(StageError::at("statistic"))?;
    log.push(format!("{} of {} values", definition.statistic, stat.n));
    Ok(stat)
}
