use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use enso_metrics::metric::{evaluate_from_provider, evaluate_metric, MetricDefinition};
use enso_metrics::netcdf_io::{write_field, NetCDFDataset};
use enso_metrics::prelude::*;
use ndarray::{Array2, Array3, IxDyn};
use netcdf::{open, AttributeValue};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::f64::consts::PI;
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Synthetic tropical Pacific SST: trend, annual cycle of amplitude 2 and noise
fn pacific_field(n_months: usize) -> GriddedField {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 150.0, 280.0, 2.5).unwrap();
    let (ny, nx) = grid.shape();
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.2).unwrap();
    let series: Vec<f64> = (0..n_months)
        .map(|t| {
            let t = t as f64;
            26.0 + 0.01 * t + 2.0 * (2.0 * PI * t / 12.0).sin() + noise.sample(&mut rng)
        })
        .collect();
    let data = Array3::from_shape_fn((n_months, ny, nx), |(t, i, j)| {
        series[t] + 0.05 * i as f64 - 0.02 * j as f64
    });
    let array = LabeledArray::new(data.into_dyn(), vec![Dim::Time, Dim::Latitude, Dim::Longitude])
        .unwrap()
        .with_name("tos")
        .with_units("degC")
        .with_time(TimeAxis::new(date(2000, 1, 1), Frequency::Monthly));
    GriddedField::new(array, grid).unwrap()
}

fn anomaly_config() -> PipelineConfig {
    PipelineConfig::from_json(&json!({
        "detrending": {"method": "linear"},
        "seasonal_anomaly": true,
    }))
    .unwrap()
}

#[test]
fn test_nino34_mean_anomaly_is_zero() {
    let field = pacific_field(240);
    let definition = MetricDefinition::new("nino34_mean", "nino3.4", Statistic::Average, anomaly_config());
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(outcome.value.unwrap().abs() < 0.05);
    assert!(outcome.value_error.unwrap() >= 0.0);
    assert_eq!(outcome.n_years, 20);
    assert_eq!(outcome.time_period, Some((date(2000, 1, 1), date(2019, 12, 1))));
    assert_eq!(
        outcome.method_log,
        "(1) horizontal area average over nino3.4 (ocean only); ;\
         (2) linearly detrended; ;\
         (3) seasonal cycle removed (monthly climatology); ;\
         (4) average of 240 values"
    );
}

#[test]
fn test_nino34_variability() {
    let field = pacific_field(240);
    let definition = MetricDefinition::new(
        "nino34_std",
        "nino3.4",
        Statistic::StandardDeviation,
        anomaly_config(),
    );
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);
    // residual is the white noise of the synthetic series
    let sigma = outcome.value.unwrap();
    assert!(sigma > 0.1 && sigma < 0.3, "sigma = {sigma}");
    assert_abs_diff_eq!(
        outcome.value_error.unwrap(),
        sigma / (2.0 * 239.0_f64).sqrt(),
        epsilon = 1e-12
    );
}

#[test]
fn test_identical_composite_terms_cancel_exactly() {
    let east = Region::new_box("east", -5.0, 5.0, 210.0, 270.0);
    let catalog = RegionCatalog::from_regions([Region::difference("east_minus_east", east.clone(), east)]);
    let region = catalog.lookup("east_minus_east").unwrap();

    let field = pacific_field(36);
    let result = PreprocessPipeline::default().run(&field, region);
    let series = result.value.as_ref().unwrap();
    assert_eq!(series.n_time(), 36);
    assert!(series.data().iter().all(|&v| v == 0.0));
    assert_eq!(
        result.method_log.entries().last().map(String::as_str),
        Some("east_minus_east computed as east minus east")
    );
}

#[test]
fn test_gradient_index_from_catalog() {
    let field = pacific_field(48);
    let definition = MetricDefinition::new(
        "nino4_minus_nino3_mean",
        "nino4_minus_nino3",
        Statistic::Average,
        PipelineConfig::default(),
    );
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);
    assert!(outcome.is_success());
    // the synthetic field decreases eastward by 0.02 per 2.5 degrees
    assert!(outcome.value.unwrap() > 0.0);
    assert!(outcome
        .method_log
        .contains("nino4_minus_nino3 computed as nino4 minus nino3"));
}

#[test]
fn test_failures_are_reported_in_the_outcome() {
    let field = pacific_field(30);

    let unknown = MetricDefinition::new("x", "atlantis", Statistic::Average, PipelineConfig::default());
    let outcome = evaluate_metric(&unknown, &field, RegionCatalog::global(), None);
    let failure = outcome.error.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::UnknownRegion);
    assert_eq!(failure.stage.as_deref(), Some("region_lookup"));
    assert!(outcome.value.is_none());
    assert!(outcome.method_log.is_empty());

    let mut config = anomaly_config();
    config.normalization = true;
    let definition = MetricDefinition::new("nino3_std", "nino3", Statistic::StandardDeviation, config);
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);
    let failure = outcome.error.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::IncompleteYears);
    assert_eq!(failure.stage.as_deref(), Some("normalization"));
    assert_eq!(outcome.n_years, 2);
    assert!(outcome.value.is_none() && outcome.value_error.is_none());
    assert!(outcome.method_log.ends_with("(3) seasonal cycle removed (monthly climatology)"));
}

#[test]
fn test_zonal_series_is_not_pooled_into_a_scalar() {
    let field = pacific_field(24);
    let config = PipelineConfig::from_json(&json!({"reduction": "zonal"})).unwrap();
    let definition = MetricDefinition::new("nino34_mean", "nino3.4", Statistic::Average, config);
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);

    let failure = outcome.error.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::GridShapeMismatch);
    assert_eq!(failure.stage.as_deref(), Some("statistic"));
    assert!(outcome.value.is_none() && outcome.value_error.is_none());
}

#[test]
fn test_regridding_step() {
    let field = pacific_field(24);
    let mut config = PipelineConfig::default();
    config.regridding = Some(5.0);
    let definition = MetricDefinition::new("nino34_mean", "nino3.4", Statistic::Average, config);

    let regridder = NearestNeighbourRegridder;
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), Some(&regridder));
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(outcome
        .method_log
        .starts_with("(1) regridded to a uniform 5 degree grid (nearest neighbour); ;"));

    let regridded = regridder.regrid(&field, 5.0).unwrap();
    assert_eq!(regridded.grid.shape(), (5, 27));
    assert_eq!(regridded.data.shape(), &[24, 5, 27]);
    assert!(!regridded.cell_area.is_available());

    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);
    let failure = outcome.error.unwrap();
    assert_eq!(failure.kind, ErrorKind::InvalidConfiguration);
    assert_eq!(failure.stage.as_deref(), Some("regridding"));
}

#[test]
fn test_outcome_json() {
    let field = pacific_field(120);
    let definition = MetricDefinition::new("nino34_skew", "nino3.4", Statistic::Skewness, anomaly_config());
    let outcome = evaluate_metric(&definition, &field, RegionCatalog::global(), None);

    let json: Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
    assert_eq!(json["metric"], "nino34_skew");
    assert_eq!(json["region"], "nino3.4");
    assert_eq!(json["statistic"], "skewness");
    assert_eq!(json["n_years"], 10);
    assert_eq!(json["time_period"], json!(["2000-01-01", "2009-12-01"]));
    assert!(json["value"].is_f64());
    assert!(json["error"].is_null());
}

#[test]
fn test_in_memory_provider_selects_time() {
    let mut provider = InMemoryProvider::new();
    provider.insert("synthetic", "tos", pacific_field(120));
    let definition = MetricDefinition::new("nino3_mean", "nino3", Statistic::Average, PipelineConfig::default());

    let key = DatasetKey::new("synthetic", "tos").with_time_range(date(2003, 1, 1), date(2004, 12, 31));
    let outcome = evaluate_from_provider(&definition, &provider, &key, RegionCatalog::global(), None);
    assert!(outcome.is_success());
    assert_eq!(outcome.n_years, 2);
    assert_eq!(outcome.time_period, Some((date(2003, 1, 1), date(2004, 12, 1))));

    let missing = DatasetKey::new("synthetic", "pr");
    let outcome = evaluate_from_provider(&definition, &provider, &missing, RegionCatalog::global(), None);
    let failure = outcome.error.unwrap();
    assert_eq!(failure.kind, ErrorKind::DataAccess);
    assert_eq!(failure.stage.as_deref(), Some("load"));
}

#[test]
fn test_mid_month_bounds_keep_their_months() {
    let field = pacific_field(120);
    let selected = field.select_time(date(2003, 1, 15), date(2004, 12, 15)).unwrap();
    assert_eq!(selected.data.n_time(), 24);
    assert_eq!(selected.data.time_axis().unwrap().date_at(0), Some(date(2003, 1, 1)));

    let single = field.select_time(date(2005, 6, 10), date(2005, 6, 20)).unwrap();
    assert_eq!(single.data.n_time(), 1);
    assert_eq!(single.data.time_axis().unwrap().date_at(0), Some(date(2005, 6, 1)));
}

#[test]
fn test_netcdf_round_trip() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("tos_Omon.nc");

    let mut field = pacific_field(36);
    let (ny, nx) = field.grid.shape();
    let land = Array2::from_shape_fn((ny, nx), |(_, j)| if j < 4 { 100.0 } else { 0.0 });
    let area = Array2::from_elem((ny, nx), 7.5e10);
    field = field.with_land_fraction(land.clone()).unwrap().with_cell_area(area).unwrap();

    let mut data = field.data.data().clone();
    data[IxDyn(&[0, 0, 0])] = f64::NAN;
    field.data = field.data.derive(data, field.data.dims().to_vec()).unwrap();

    write_field(&field, "tos", &file_path).expect("Failed to write field");

    let dataset = NetCDFDataset::open(&file_path).unwrap();
    let read = dataset.read_field("tos").unwrap();
    assert_eq!(read.data.dims(), &[Dim::Time, Dim::Latitude, Dim::Longitude]);
    assert_eq!(read.data.shape(), field.data.shape());
    assert_eq!(read.data.metadata().units.as_deref(), Some("degC"));
    assert_eq!(read.data.time_axis(), field.data.time_axis());
    assert_eq!(read.grid.lat, field.grid.lat);
    assert_eq!(read.grid.lon, field.grid.lon);
    assert!(read.data.get(&[0, 0, 0]).unwrap().is_nan());
    assert_abs_diff_eq!(
        read.data.get(&[5, 3, 7]).unwrap(),
        field.data.get(&[5, 3, 7]).unwrap(),
        epsilon = 1e-12
    );
    assert_eq!(read.land_fraction.as_option(), Some(&land));
    assert!(read.cell_area.is_available());

    let file = open(&file_path).expect("Failed to open NetCDF file");
    match file.attribute("history").and_then(|a| a.value().ok()) {
        Some(AttributeValue::Str(history)) => assert!(history.starts_with("Created by enso-metrics")),
        other => panic!("unexpected history attribute: {other:?}"),
    }

    let definition = MetricDefinition::new("nino3.4_mean", "nino3.4", Statistic::Average, anomaly_config());
    let key = DatasetKey::new("tos_Omon", "tos").with_time_range(date(2000, 1, 1), date(2001, 12, 1));
    let outcome = evaluate_from_provider(&definition, &dataset, &key, RegionCatalog::global(), None);
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.n_years, 2);
    assert!(outcome.value.unwrap().abs() < 1e-9);
}

#[test]
fn test_missing_variable_in_file() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("short.nc");
    write_field(&pacific_field(12), "tos", &file_path).unwrap();

    let dataset = NetCDFDataset::open(&file_path).unwrap();
    let err = dataset.read_field("ts").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataAccess);
}

#[test]
fn test_percent_land_fraction_units_are_converted() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("sftlf_percent.nc");

    let field = pacific_field(12);
    let (ny, nx) = field.grid.shape();
    // coastal cells only: no value reaches the percent threshold
    let land = Array2::from_shape_fn((ny, nx), |(_, j)| if j == 0 { 1.0 } else { 0.0 });
    let field = field.with_land_fraction(land).unwrap();
    write_field(&field, "tos", &file_path).unwrap();
    {
        let mut file = netcdf::append(&file_path).expect("Failed to reopen NetCDF file");
        let mut sftlf = file.variable_mut("sftlf").unwrap();
        sftlf.put_attribute("units", "%").unwrap();
    }

    let read = NetCDFDataset::open(&file_path).unwrap().read_field("tos").unwrap();
    let fraction = read.land_fraction.as_option().unwrap();
    assert_abs_diff_eq!(fraction[[0, 0]], 0.01, epsilon = 1e-12);
    assert_eq!(fraction[[0, 1]], 0.0);
}
