//! Preprocessing pipeline
//!
//! The stages run in a fixed order, each one optional:
//!
//! 1. regional reduction (mask, weights, area average; composite regions are
//!    reduced term by term and combined with their signs)
//! 2. minimum time-step guard
//! 3. detrending
//! 4. seasonal anomaly
//! 5. normalization
//! 6. smoothing
//!
//! Every successful stage adds one entry to the method log. The first failing
//! stage ends the run: its error is recorded in the [`PipelineResult`], no
//! later stage is invoked and the partial output is dropped.

pub mod anomaly;
pub mod config;
pub mod detrend;
pub mod smooth;

pub use config::{
    DetrendMethod, DetrendOptions, PipelineConfig, SmoothingOptions, WindowShape,
    DEFAULT_SMOOTHING_WINDOW,
};

use crate::data_source::GriddedField;
use crate::errors::{EnsoMetricsError, Result};
use crate::labeled::{Dim, LabeledArray};
use crate::mask::compute_term_masks;
use crate::method_log::MethodLog;
use crate::reduction::{reduce, reduce_time, VALID_TIME_STEPS};
use crate::region::{Region, Sign};
use crate::weights::compute_weights;
use ndarray::{ArrayD, ArrayView1, Axis, IxDyn};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use tracing::{debug, info, warn};

/// Array produced by a stage together with its method-log entry
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub array: LabeledArray,
    pub description: String,
}

impl PipelineOutput {
    #[must_use]
    pub fn new(array: LabeledArray, description: String) -> Self {
        Self { array, description }
    }
}

/// Apply `f` to every 1-D lane along time, producing lanes of `out_len`
pub(crate) fn map_time_lanes(
    array: &LabeledArray,
    out_len: usize,
    mut f: impl FnMut(&[f64]) -> Result<Vec<f64>>,
) -> Result<LabeledArray> {
    let it = array.require_axis(Dim::Time)?;
    let mut shape = array.shape().to_vec();
    shape[it] = out_len;
    let mut out = ArrayD::<f64>::zeros(IxDyn(&shape));

    for (lane, mut target) in array
        .data()
        .lanes(Axis(it))
        .into_iter()
        .zip(out.lanes_mut(Axis(it)))
    {
        let values = lane.to_vec();
        let mapped = f(&values)?;
        if mapped.len() != out_len {
            return Err(EnsoMetricsError::shape_mismatch(
                "time lane",
                &[out_len],
                &[mapped.len()],
            ));
        }
        target.assign(&ArrayView1::from(mapped.as_slice()));
    }
    array.derive(out, array.dims().to_vec())
}

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    RegionalReduction,
    TimeStepGuard,
    Detrend,
    SeasonalAnomaly,
    Normalize,
    Smooth,
}

impl Stage {
    pub const ORDER: [Self; 6] = [
        Self::RegionalReduction,
        Self::TimeStepGuard,
        Self::Detrend,
        Self::SeasonalAnomaly,
        Self::Normalize,
        Self::Smooth,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegionalReduction => "regional_reduction",
            Self::TimeStepGuard => "time_step_guard",
            Self::Detrend => "detrending",
            Self::SeasonalAnomaly => "seasonal_anomaly",
            Self::Normalize => "normalization",
            Self::Smooth => "smoothing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline run
///
/// Exactly one of `value` and `error` is set.
#[derive(Debug)]
pub struct PipelineResult {
    pub value: Option<LabeledArray>,
    pub method_log: MethodLog,
    pub error: Option<EnsoMetricsError>,
    /// Stage that produced `error`; `None` for failures before the first stage
    pub failed_stage: Option<Stage>,
}

impl PipelineResult {
    fn failed(method_log: MethodLog, error: EnsoMetricsError, stage: Option<Stage>) -> Self {
        Self {
            value: None,
            method_log,
            error: Some(error),
            failed_stage: stage,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain `Result`, dropping the method log
    ///
    /// # Errors
    ///
    /// Returns the recorded stage error.
    pub fn into_result(self) -> Result<LabeledArray> {
        match (self.value, self.error) {
            (_, Some(err)) => Err(err),
            (Some(value), None) => Ok(value),
            (None, None) => Err(EnsoMetricsError::InvalidConfiguration {
                message: "pipeline produced no value".to_string(),
            }),
        }
    }
}

/// Ordered preprocessing of a gridded field into a time series
#[derive(Debug, Clone, Default)]
pub struct PreprocessPipeline {
    config: PipelineConfig,
}

impl PreprocessPipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// See [`PipelineConfig::from_json`].
    pub fn from_json(options: &Value) -> Result<Self> {
        Ok(Self::new(PipelineConfig::from_json(options)?))
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage on `field` for `region`
    #[tracing::instrument(skip_all, fields(region = %region.name))]
    pub fn run(&self, field: &GriddedField, region: &Region) -> PipelineResult {
        let mut log = MethodLog::new();
        for key in &self.config.unrecognized {
            log.push(format!("ignored unrecognized option '{key}'"));
        }

        if let Err(err) = self.check_frequency(&field.data) {
            warn!(error = %err, "pipeline rejected input");
            return PipelineResult::failed(log, err, None);
        }

        let mut current = Cow::Borrowed(&field.data);
        for stage in Stage::ORDER {
            match self.apply(stage, current.as_ref(), field, region, &mut log) {
                Ok(Some(next)) => current = Cow::Owned(next),
                Ok(None) => debug!(stage = %stage, "stage skipped"),
                Err(err) => {
                    warn!(stage = %stage, error = %err, "pipeline halted");
                    return PipelineResult::failed(log, err, Some(stage));
                }
            }
        }

        info!(steps = log.len(), "pipeline finished");
        PipelineResult {
            value: Some(current.into_owned()),
            method_log: log,
            error: None,
            failed_stage: None,
        }
    }

    fn check_frequency(&self, array: &LabeledArray) -> Result<()> {
        match array.time_axis() {
            Some(time) if time.frequency != self.config.frequency => {
                Err(EnsoMetricsError::InvalidConfiguration {
                    message: format!(
                        "configured frequency is {} but '{}' is sampled {}",
                        self.config.frequency,
                        array.metadata().name,
                        time.frequency
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    /// `Ok(None)` when the stage is disabled or leaves the array unchanged
    fn apply(
        &self,
        stage: Stage,
        array: &LabeledArray,
        field: &GriddedField,
        region: &Region,
        log: &mut MethodLog,
    ) -> Result<Option<LabeledArray>> {
        let output = match stage {
            Stage::RegionalReduction => return self.regional_reduction(array, field, region, log),
            Stage::TimeStepGuard => {
                self.time_step_guard(array)?;
                return Ok(None);
            }
            Stage::Detrend => match &self.config.detrending {
                Some(options) => detrend::detrend(array, options)?,
                None => return Ok(None),
            },
            Stage::SeasonalAnomaly if self.config.seasonal_anomaly => {
                anomaly::seasonal_anomaly(array)?
            }
            Stage::Normalize if self.config.normalization => anomaly::normalize(array)?,
            Stage::Smooth => match &self.config.smoothing {
                Some(options) => smooth::smooth(array, options)?,
                None => return Ok(None),
            },
            Stage::SeasonalAnomaly | Stage::Normalize => return Ok(None),
        };

        let PipelineOutput {
            mut array,
            description,
        } = output;
        array.metadata_mut().history.push(description.clone());
        log.push(description);
        Ok(Some(array))
    }

    fn regional_reduction(
        &self,
        array: &LabeledArray,
        field: &GriddedField,
        region: &Region,
        log: &mut MethodLog,
    ) -> Result<Option<LabeledArray>> {
        let (Some(ilat), Some(ilon)) = (array.axis_of(Dim::Latitude), array.axis_of(Dim::Longitude))
        else {
            return Ok(None);
        };
        field
            .grid
            .check_shape(&array.metadata().name, &[array.shape()[ilat], array.shape()[ilon]])?;

        let terms = compute_term_masks(
            region,
            &field.grid,
            field.land_fraction.as_option(),
            self.config.mask_tolerance,
        )?;

        let mut combined: Option<(LabeledArray, ArrayD<f64>)> = None;
        for term in &terms {
            let weights = compute_weights(
                &field.grid,
                &term.mask,
                field.cell_area.as_option(),
                self.config.reduction,
            )?;
            let reduced = reduce(array, &weights, log)?;
            let factor = term.sign.factor();
            combined = Some(match combined {
                None => {
                    let acc = reduced.data().mapv(|v| factor * v);
                    (reduced, acc)
                }
                Some((first, mut acc)) => {
                    acc.zip_mut_with(reduced.data(), |a, &b| *a += factor * b);
                    (first, acc)
                }
            });
        }

        let Some((first, acc)) = combined else {
            return Err(EnsoMetricsError::InvalidRegion {
                region: region.name.clone(),
                reason: "region has no terms to reduce".to_string(),
            });
        };
        if terms.len() == 1 && terms[0].sign == Sign::Plus {
            return Ok(Some(first));
        }

        let mut out = first.derive(acc, first.dims().to_vec())?;
        let expression = terms
            .iter()
            .enumerate()
            .map(|(k, t)| match (k, t.sign) {
                (0, Sign::Plus) => t.region.name.clone(),
                (0, Sign::Minus) => format!("minus {}", t.region.name),
                (_, sign) => format!(" {} {}", sign.symbol(), t.region.name),
            })
            .collect::<String>();
        let description = format!("{} computed as {expression}", region.name);
        out.metadata_mut().history.push(description.clone());
        log.push(description);
        Ok(Some(out))
    }

    fn time_step_guard(&self, array: &LabeledArray) -> Result<()> {
        let Some(required) = self.config.min_time_steps else {
            return Ok(());
        };
        let mut scratch = MethodLog::new();
        let averaged = reduce_time(array, &mut scratch)?;
        let found = averaged
            .metadata()
            .summary
            .get(VALID_TIME_STEPS)
            .map_or(0, |&v| v as usize);
        if found < required {
            return Err(EnsoMetricsError::TooShortTimePeriod { required, found });
        }
        debug!(found, required, "enough valid time steps");
        Ok(())
    }
}
