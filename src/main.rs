//! Entry point for the enso-metrics application.
//! Parses the command line, loads the field and prints the metric outcome as JSON.

use clap::Parser;
use enso_metrics::prelude::*;
use std::{fs, process};

mod cli;
mod logging;

use cli::Args;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    let catalog = RegionCatalog::global();
    if args.list_regions {
        for name in catalog.names() {
            println!("{}", catalog.lookup(name)?);
        }
        return Ok(());
    }

    ParallelConfig::new(args.threads).setup_global_pool()?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_str(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    args.apply_overrides(&mut config);

    let file = args.file.as_ref().ok_or("--file is required")?;
    let variable = args.variable.as_deref().ok_or("--variable is required")?;
    let dataset = NetCDFDataset::open(file)?;
    let mut key = DatasetKey::new(&file.display().to_string(), variable);
    if let (Some(start), Some(end)) = (args.start, args.end) {
        key = key.with_time_range(start, end);
    }

    let definition = MetricDefinition::new(&args.metric_name(), &args.region, args.statistic, config);
    let regridder = NearestNeighbourRegridder;
    let outcome = evaluate_from_provider(&definition, &dataset, &key, catalog, Some(&regridder));

    println!("{}", outcome.to_json()?);
    if !outcome.is_success() {
        process::exit(2);
    }
    Ok(())
}
