//! Unit tests for the masking, weighting, reduction and statistic modules

use approx::{assert_abs_diff_eq, assert_relative_eq};
use enso_metrics::{
    errors::{EnsoMetricsError, ErrorKind},
    grid::GridDescriptor,
    labeled::{Dim, LabeledArray},
    mask::{compute_mask, compute_term_masks, DEFAULT_MASK_TOLERANCE},
    method_log::MethodLog,
    parallel::{parallel_info, ParallelConfig},
    reduction::{reduce, reduce_time, SpatialReduction, VALID_TIME_STEPS},
    region::{Region, RegionCatalog, Sign},
    statistic::{compute, Statistic},
    weights::{compute_weights, ReductionAxes},
};
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn cube(data: Array3<f64>) -> LabeledArray {
    LabeledArray::new(data.into_dyn(), vec![Dim::Time, Dim::Latitude, Dim::Longitude])
        .unwrap()
        .with_name("ts")
}

#[test]
fn test_error_kinds() {
    let err = EnsoMetricsError::EmptyDomain {
        region: "nino3".to_string(),
    };
    assert_eq!(err.kind(), ErrorKind::EmptyDomain);
    assert!(err.to_string().contains("nino3"));

    let err = EnsoMetricsError::InvalidSmoothingWindow { window: 4 };
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

    let err = EnsoMetricsError::VariableNotFound {
        var: "tos".to_string(),
    };
    assert_eq!(err.kind(), ErrorKind::DataAccess);
    assert!(err.to_string().contains("variable 'tos' not found"));

    assert_eq!(
        serde_json::to_string(&ErrorKind::IncompleteYears).unwrap(),
        "\"IncompleteYears\""
    );
}

#[test]
fn test_catalog_lookup() {
    let catalog = RegionCatalog::global();
    assert!(catalog.len() >= 10);

    let nino34 = catalog.lookup("nino3.4").unwrap();
    assert!(nino34.mask_land);
    assert_eq!(nino34.to_string(), "nino3.4 (ocean only)");

    let gradient = catalog.lookup("nino4_minus_nino3").unwrap();
    assert!(gradient.is_composite());

    let err = catalog.lookup("atlantis").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRegion);

    for name in catalog.names() {
        catalog.lookup(name).unwrap().validate().unwrap();
    }
}

#[test]
fn test_land_and_ocean_masks_are_exclusive() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    let region = Region::new_box("both", -5.0, 5.0, 180.0, 200.0)
        .mask_land(true)
        .mask_ocean(true);
    let err = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRegion);
}

#[test]
fn test_box_wraparound_on_0_360_grid() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 0.0, 355.0, 5.0).unwrap();
    let region = Region::new_box("seam", -5.0, 5.0, 350.0, 10.0);
    let mask = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();

    for ((i, j), &m) in mask.values().indexed_iter() {
        let lat = grid.lat[i];
        let lon = grid.lon[j];
        let expected = lat.abs() <= 5.0 && (lon >= 350.0 || lon <= 10.0);
        assert_eq!(m, if expected { 1.0 } else { 0.0 }, "cell ({lat}, {lon})");
    }
    assert_eq!(mask.retained_count(), 15);
}

#[test]
fn test_box_and_polygon_agree_across_the_seam() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 0.0, 355.0, 5.0).unwrap();
    let boxed = compute_mask(
        &Region::new_box("seam", -5.0, 5.0, 350.0, 10.0),
        &grid,
        None,
        DEFAULT_MASK_TOLERANCE,
    )
    .unwrap();

    let shifted = Region::polygon(
        "seam_polygon",
        vec![(-5.0, 350.0), (5.0, 350.0), (5.0, 370.0), (-5.0, 370.0)],
    );
    let signed = Region::polygon(
        "seam_signed",
        vec![(-5.0, -10.0), (5.0, -10.0), (5.0, 10.0), (-5.0, 10.0)],
    );
    for polygon in [shifted, signed] {
        let mask = compute_mask(&polygon, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
        assert_eq!(mask.values(), boxed.values(), "{}", polygon.name);
    }
}

#[test]
fn test_box_on_signed_grid() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, -180.0, 175.0, 5.0).unwrap();
    let mask = compute_mask(
        &Region::new_box("seam", -5.0, 5.0, 350.0, 10.0),
        &grid,
        None,
        DEFAULT_MASK_TOLERANCE,
    )
    .unwrap();
    assert_eq!(mask.retained_count(), 15);

    let nino34 = RegionCatalog::global().lookup("nino3.4").unwrap();
    let mask = compute_mask(nino34, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    // -170 .. -120 on this grid
    assert_eq!(mask.retained_count(), 3 * 11);
}

#[test]
fn test_mask_monotonicity() {
    let grid = GridDescriptor::uniform(-20.0, 20.0, 100.0, 300.0, 2.5).unwrap();
    let mut previous = usize::MAX;
    for k in 0..6 {
        let k = f64::from(k);
        let region = Region::new_box(
            "shrinking",
            -12.0 + 2.0 * k,
            12.0 - 2.0 * k,
            150.0 + 10.0 * k,
            280.0 - 10.0 * k,
        );
        let count = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE)
            .unwrap()
            .retained_count();
        assert!(count <= previous);
        previous = count;
    }
}

#[test]
fn test_land_fraction_exclusion() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    // percent: first column all land, second column half land
    let land = Array2::from_shape_fn((5, 5), |(_, j)| match j {
        0 => 100.0,
        1 => 50.0,
        _ => 0.0,
    });
    let ocean_only = Region::new_box("ocean", -10.0, 10.0, 180.0, 200.0).mask_land(true);
    let mask = compute_mask(&ocean_only, &grid, Some(&land), DEFAULT_MASK_TOLERANCE).unwrap();
    for row in mask.values().outer_iter() {
        assert_eq!(row.to_vec(), vec![0.0, 0.5, 1.0, 1.0, 1.0]);
    }

    let land_only = Region::new_box("land", -10.0, 10.0, 180.0, 200.0).mask_ocean(true);
    let mask = compute_mask(&land_only, &grid, Some(&land), DEFAULT_MASK_TOLERANCE).unwrap();
    for row in mask.values().outer_iter() {
        assert_eq!(row.to_vec(), vec![1.0, 0.5, 0.0, 0.0, 0.0]);
    }
}

#[test]
fn test_fraction_slightly_above_one_is_not_percent() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    let mut land = Array2::from_elem(grid.shape(), 1.0);
    land[[2, 3]] = 1.000_000_1;
    let ocean = Region::new_box("ocean", -10.0, 10.0, 180.0, 200.0).mask_land(true);
    let mask = compute_mask(&ocean, &grid, Some(&land), DEFAULT_MASK_TOLERANCE).unwrap();
    assert!(mask.values().iter().all(|&m| m == 0.0));
    let err = compute_weights(&grid, &mask, None, ReductionAxes::Horizontal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDomain);
}

#[test]
fn test_weights_sum_to_one() {
    let grid = GridDescriptor::uniform(-30.0, 30.0, 0.0, 357.5, 2.5).unwrap();
    let area = Array2::from_shape_fn(grid.shape(), |(i, _)| {
        1.0e10 * grid.lat[i].to_radians().cos()
    });
    let catalog = RegionCatalog::global();
    for name in ["nino3", "nino3.4", "nino4", "nino1+2", "tropical_pacific", "global"] {
        let region = catalog.lookup(name).unwrap();
        let mask = compute_mask(region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
        for cell_area in [None, Some(&area)] {
            let weights =
                compute_weights(&grid, &mask, cell_area, ReductionAxes::Horizontal).unwrap();
            assert_abs_diff_eq!(weights.total(), 1.0, epsilon = 1e-9);
            assert!(weights.values().iter().all(|&w| w >= 0.0));
        }
    }
}

#[test]
fn test_cos_latitude_default_is_not_uniform() {
    let grid = GridDescriptor::uniform(0.0, 60.0, 0.0, 10.0, 30.0).unwrap();
    let region = Region::new_box("band", 0.0, 60.0, 0.0, 10.0);
    let mask = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    let weights = compute_weights(&grid, &mask, None, ReductionAxes::Horizontal).unwrap();
    let w = weights.values();
    assert!(w[[0, 0]] > w[[1, 0]]);
    assert!(w[[1, 0]] > w[[2, 0]]);
    assert_relative_eq!(w[[2, 0]] / w[[0, 0]], 0.5, epsilon = 1e-12);
}

#[test]
fn test_empty_domain() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    let outside = Region::new_box("arctic", 70.0, 80.0, 0.0, 360.0);
    let mask = compute_mask(&outside, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    assert!(mask.is_empty());
    let err = compute_weights(&grid, &mask, None, ReductionAxes::Horizontal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDomain);

    let all_land = Array2::from_elem(grid.shape(), 1.0);
    let ocean = Region::new_box("ocean", -10.0, 10.0, 180.0, 200.0).mask_land(true);
    let mask = compute_mask(&ocean, &grid, Some(&all_land), DEFAULT_MASK_TOLERANCE).unwrap();
    let err = compute_weights(&grid, &mask, None, ReductionAxes::Zonal).unwrap_err();
    assert!(matches!(err, EnsoMetricsError::EmptyDomain { region } if region == "ocean"));
}

#[test]
fn test_single_axis_normalization() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    // rows 0 and 4 fall outside the box
    let region = Region::new_box("inner", -5.0, 5.0, 180.0, 200.0);
    let mask = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();

    let zonal = compute_weights(&grid, &mask, None, ReductionAxes::Zonal).unwrap();
    for (i, row) in zonal.values().outer_iter().enumerate() {
        let expected = if i == 0 || i == 4 { 0.0 } else { 1.0 };
        assert_abs_diff_eq!(row.sum(), expected, epsilon = 1e-12);
        assert!(row.iter().all(|w| w.is_finite()));
    }

    let meridional = compute_weights(&grid, &mask, None, ReductionAxes::Meridional).unwrap();
    for column in meridional.values().axis_iter(Axis(1)) {
        assert_abs_diff_eq!(column.sum(), 1.0, epsilon = 1e-12);
        assert_eq!(column[0], 0.0);
        assert_eq!(column[4], 0.0);
    }
}

#[test]
fn test_mismatched_ancillary_is_rejected() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 180.0, 200.0, 5.0).unwrap();
    let region = Region::new_box("box", -5.0, 5.0, 180.0, 200.0).mask_land(true);
    let land = Array2::zeros((3, 3));
    let err = compute_mask(&region, &grid, Some(&land), DEFAULT_MASK_TOLERANCE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GridShapeMismatch);

    let mask = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    let area = Array2::ones((4, 5));
    let err = compute_weights(&grid, &mask, Some(&area), ReductionAxes::Horizontal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GridShapeMismatch);
}

#[test]
fn test_composite_terms_carry_signs() {
    let grid = GridDescriptor::uniform(-10.0, 10.0, 150.0, 280.0, 5.0).unwrap();
    let gradient = RegionCatalog::global().lookup("nino4_minus_nino3").unwrap();
    let terms = compute_term_masks(gradient, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    assert_eq!(terms.len(), 2);
    assert_eq!(terms[0].sign, Sign::Plus);
    assert_eq!(terms[0].region.name, "nino4");
    assert_eq!(terms[1].sign, Sign::Minus);

    let err = compute_mask(gradient, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRegion);
}

#[test]
fn test_reduce_renormalizes_over_valid_cells() {
    let grid = GridDescriptor::uniform(0.0, 5.0, 0.0, 5.0, 5.0).unwrap();
    let region = Region::new_box("all", 0.0, 5.0, 0.0, 5.0);
    let mask = compute_mask(&region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    let area = Array2::ones((2, 2));
    let weights = compute_weights(&grid, &mask, Some(&area), ReductionAxes::Horizontal).unwrap();

    let mut data = Array3::from_shape_vec((3, 2, 2), (1..=12).map(f64::from).collect()).unwrap();
    data[[1, 1, 1]] = f64::NAN;
    data.index_axis_mut(Axis(0), 2).fill(f64::NAN);
    let array = cube(data);

    let mut log = MethodLog::new();
    let reduced = array.area_average(&weights, &mut log).unwrap();
    assert_eq!(reduced.dims(), &[Dim::Time]);
    assert_relative_eq!(reduced.get(&[0]).unwrap(), 2.5);
    assert_relative_eq!(reduced.get(&[1]).unwrap(), 6.0);
    assert!(reduced.get(&[2]).unwrap().is_nan());

    assert_eq!(log.len(), 1);
    assert!(log.entries()[0].starts_with("horizontal area average over all"));
    assert_eq!(reduced.metadata().name, "ts");
}

#[test]
fn test_zonal_reduction_keeps_latitude() {
    let grid = GridDescriptor::uniform(-5.0, 5.0, 190.0, 240.0, 5.0).unwrap();
    let region = RegionCatalog::global().lookup("nino3.4").unwrap();
    let mask = compute_mask(region, &grid, None, DEFAULT_MASK_TOLERANCE).unwrap();
    let weights = compute_weights(&grid, &mask, None, ReductionAxes::Zonal).unwrap();

    let (ny, nx) = grid.shape();
    let data = Array3::from_shape_fn((4, ny, nx), |(t, i, _)| (t * 10 + i) as f64);
    let mut log = MethodLog::new();
    let reduced = reduce(&cube(data), &weights, &mut log).unwrap();

    assert_eq!(reduced.dims(), &[Dim::Time, Dim::Latitude]);
    assert_eq!(reduced.shape(), &[4, ny]);
    assert_relative_eq!(reduced.get(&[2, 1]).unwrap(), 21.0, epsilon = 1e-12);
    assert!(log.entries()[0].contains("zonal area average over nino3.4 (ocean only)"));
}

#[test]
fn test_time_average_counts_valid_steps() {
    let mut data = Array3::from_elem((5, 2, 2), 3.0);
    data.index_axis_mut(Axis(0), 0).fill(f64::NAN);
    let array = cube(data);
    let mut log = MethodLog::new();
    let averaged = reduce_time(&array, &mut log).unwrap();

    assert_eq!(averaged.dims(), &[Dim::Latitude, Dim::Longitude]);
    assert!(averaged.time_axis().is_none());
    assert_eq!(averaged.metadata().summary[VALID_TIME_STEPS], 4.0);
    assert_relative_eq!(averaged.get(&[1, 1]).unwrap(), 3.0);
    assert_eq!(log.entries(), &["temporal average over 4 time steps".to_string()]);
}

#[test]
fn test_statistic_error_formulas() {
    let mut rng = StdRng::seed_from_u64(20_240_601);
    let normal = Normal::new(26.5, 0.8).unwrap();
    let series: Vec<f64> = (0..120).map(|_| normal.sample(&mut rng)).collect();

    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let sigma = (series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

    let avg = compute(&series, Statistic::Average).unwrap();
    assert_eq!(avg.n, 120);
    assert_relative_eq!(avg.value, mean, epsilon = 1e-12);
    assert_relative_eq!(avg.value_error, sigma / n.sqrt(), epsilon = 1e-12);

    let std = compute(&series, Statistic::StandardDeviation).unwrap();
    assert_relative_eq!(std.value, sigma, epsilon = 1e-12);
    assert_relative_eq!(std.value_error, sigma / (2.0 * (n - 1.0)).sqrt(), epsilon = 1e-12);

    let var = compute(&series, Statistic::Variance).unwrap();
    assert_relative_eq!(var.value, sigma * sigma, epsilon = 1e-12);
    assert_relative_eq!(
        var.value_error,
        sigma * sigma * (2.0 / (n - 1.0)).sqrt(),
        epsilon = 1e-12
    );

    let skew = compute(&series, Statistic::Skewness).unwrap();
    let expected = (6.0 * n * (n - 1.0) / ((n - 2.0) * (n + 1.0) * (n + 3.0))).sqrt();
    assert_relative_eq!(skew.value_error, expected, epsilon = 1e-12);
    assert!(skew.value.abs() < 1.0);

    // the sample should resemble the distribution it came from
    assert!((mean - 26.5).abs() < 4.0 * avg.value_error);
}

#[test]
fn test_statistic_names() {
    assert_eq!("std".parse::<Statistic>().unwrap(), Statistic::StandardDeviation);
    assert_eq!(Statistic::Skewness.to_string(), "skewness");
    let err = "median".parse::<Statistic>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownMethod);
}

#[test]
fn test_method_log_rendering() {
    let log = MethodLog::from(vec![
        "horizontal area average over nino3.4 (ocean only)".to_string(),
        "linearly detrended".to_string(),
        "normalized".to_string(),
    ]);
    assert_eq!(
        log.render(),
        "(1) horizontal area average over nino3.4 (ocean only); ;(2) linearly detrended; ;(3) normalized"
    );
    assert_eq!(MethodLog::new().render(), "");
}

#[test]
fn test_parallel_config() {
    assert!(ParallelConfig::default().num_threads.is_none());
    assert!(ParallelConfig::all_cores().num_threads.unwrap() > 0);
    let err = ParallelConfig::new(Some(0)).setup_global_pool().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

    let info = parallel_info();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
}
