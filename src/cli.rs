//! Defines command-line interface options using `clap` for the enso-metrics application.

use chrono::NaiveDate;
use clap::Parser;
use enso_metrics::pipeline::{DetrendOptions, PipelineConfig, SmoothingOptions, WindowShape};
use enso_metrics::statistic::Statistic;
use enso_metrics::weights::ReductionAxes;
use std::path::PathBuf;

/// Compute an ENSO metric from a gridded NetCDF field
#[derive(Parser, Debug)]
#[command(
    version,
    name = "enso-metrics",
    about = "Regional statistics with uncertainties for ENSO diagnostics"
)]
pub struct Args {
    /// Path to the NetCDF file
    #[arg(short, long, required_unless_present = "list_regions")]
    pub file: Option<PathBuf>,

    /// Variable to evaluate (e.g. ts, tos, pr)
    #[arg(long, required_unless_present = "list_regions")]
    pub variable: Option<String>,

    /// Region name from the catalog
    #[arg(short, long, default_value = "nino3.4")]
    pub region: String,

    /// Statistic: average, standard_deviation, variance or skewness
    #[arg(short, long, default_value = "average", value_parser = parse_statistic)]
    pub statistic: Statistic,

    /// Metric name reported in the outcome. Defaults to <region>_<statistic>
    #[arg(long)]
    pub name: Option<String>,

    /// JSON file with pipeline options; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Remove a linear trend
    #[arg(long, default_value_t = false)]
    pub detrend: bool,

    /// Remove the seasonal cycle
    #[arg(long, default_value_t = false)]
    pub anomalies: bool,

    /// Divide each season by its standard deviation
    #[arg(long, default_value_t = false)]
    pub normalize: bool,

    /// Moving-window smoothing, formatted as <method>:<window>
    #[arg(long, value_parser = parse_smooth_arg)]
    pub smooth: Option<SmoothingOptions>,

    /// Axes to average; only horizontal leaves a single series to summarize
    #[arg(long, value_parser = parse_reduction)]
    pub reduction: Option<ReductionAxes>,

    /// Fail unless at least this many valid time steps are present
    #[arg(long)]
    pub min_time_steps: Option<usize>,

    /// Regrid to a uniform grid of this resolution (degrees) before masking
    #[arg(long)]
    pub regrid: Option<f64>,

    /// First date to include, YYYY-MM-DD
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Last date to include, YYYY-MM-DD
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    /// Number of threads to use for parallel processing. Defaults to rayon's choice.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// List the regions of the catalog and exit
    #[arg(long)]
    pub list_regions: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Apply the flag-level options on top of `config`
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if self.detrend && config.detrending.is_none() {
            config.detrending = Some(DetrendOptions::linear());
        }
        config.seasonal_anomaly |= self.anomalies;
        config.normalization |= self.normalize;
        if let Some(smoothing) = self.smooth {
            config.smoothing = Some(smoothing);
        }
        if let Some(reduction) = self.reduction {
            config.reduction = reduction;
        }
        if self.min_time_steps.is_some() {
            config.min_time_steps = self.min_time_steps;
        }
        if self.regrid.is_some() {
            config.regridding = self.regrid;
        }
    }

    pub fn metric_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.region, self.statistic))
    }
}

fn parse_statistic(s: &str) -> Result<Statistic, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_reduction(s: &str) -> Result<ReductionAxes, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_smooth_arg(s: &str) -> Result<SmoothingOptions, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [method, window] => {
            let method: WindowShape = method.parse().map_err(|e| format!("{e}"))?;
            let window = window
                .parse::<usize>()
                .map_err(|_| format!("Invalid window '{window}': expected a positive integer"))?;
            Ok(SmoothingOptions { method, window })
        }
        [method] => Ok(SmoothingOptions {
            method: method.parse().map_err(|e| format!("{e}"))?,
            ..SmoothingOptions::default()
        }),
        _ => Err("Invalid format: Expected '<method>:<window>'.".to_string()),
    }
}
