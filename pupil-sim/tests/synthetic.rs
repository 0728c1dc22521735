use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::Array2;
use pupil_sim::{
    add_read_noise, gaussian_spot_pair, save_map_png, save_mask_png, synthesize_pair, Aberration,
    Illumination, PairSpec,
};
use roddier::{
    normalized_difference, PhysicalScale, PipelineConfig, RoddierAnalysis, RoddierPipeline,
    ShiftVector, TelescopeParams, WavefrontSolver,
};
use test_helpers::{assert_all_finite, max_abs_diff, output_path};

const WAVELENGTH_MM: f64 = 5.55e-4;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Defocus at which the default telescope images the pupil with `r_out` pixels
fn matched_defocus_mm(r_out: f64) -> f64 {
    TelescopeParams::default().defocus_from_radius_mm(r_out)
}

fn analyse(intra: &Array2<f64>, extra: &Array2<f64>) -> RoddierAnalysis {
    let config = PipelineConfig::new(TelescopeParams::default()).unwrap();
    RoddierPipeline::new(config)
        .run(&intra.view(), &extra.view())
        .unwrap()
}

fn amplitude_waves(analysis: &RoddierAnalysis, noll: usize) -> f64 {
    analysis.fit.amplitude(noll) / analysis.wavelength_mm
}

#[test]
fn full_frame_pair_solves_back_to_the_wavefront() {
    init_logging();
    let defocus_mm = 1.5;
    let mut spec = PairSpec::annular(64, 0.0, 20.0, WAVELENGTH_MM, defocus_mm).with_aberrations(
        vec![
            Aberration::new(4, 0.05),
            Aberration::new(6, 0.03),
            Aberration::new(11, -0.02),
        ],
    );
    spec.illumination = Illumination::FullFrame;
    let pair = synthesize_pair(&spec).unwrap();
    assert_eq!(pair.clipped_pixels, 0);
    assert!(pair.pupil.iter().all(|&lit| lit));

    let delta = normalized_difference(&pair.intra.view(), &pair.extra.view()).unwrap();
    let solved = WavefrontSolver::new()
        .solve(
            &delta.view(),
            &pair.pupil.view(),
            Some(PhysicalScale::new(WAVELENGTH_MM, defocus_mm)),
        )
        .unwrap();

    let truth_mm = pair.wavefront_waves.mapv(|w| w * WAVELENGTH_MM);
    let mean = truth_mm.mean().unwrap();
    let expected = truth_mm.mapv(|w| w - mean);
    let peak = expected.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
    assert!(peak > 0.0);
    assert!(max_abs_diff(&solved.wavefront, &expected) < 1e-6 * peak);
}

#[test]
fn unaberrated_annular_pair_gives_flat_wavefront() {
    init_logging();
    let spec = PairSpec::annular(96, 10.0, 40.0, WAVELENGTH_MM, matched_defocus_mm(40.0));
    let pair = synthesize_pair(&spec).unwrap();
    let analysis = analyse(&pair.intra, &pair.extra);
    assert!(analysis.refinement.converged());
    assert!(analysis.wavefront_mm().iter().all(|&v| v == 0.0));
    assert_abs_diff_eq!(analysis.r_out(), 40.0, epsilon = 1e-9);
    assert_relative_eq!(analysis.defocus_mm(), matched_defocus_mm(40.0), epsilon = 1e-9);
}

#[test]
fn annular_coma_is_recovered() {
    init_logging();
    let spec = PairSpec::annular(128, 10.0, 40.0, WAVELENGTH_MM, matched_defocus_mm(40.0))
        .with_aberrations(vec![Aberration::new(8, 0.05)]);
    let pair = synthesize_pair(&spec).unwrap();
    assert_eq!(pair.clipped_pixels, 0);

    let analysis = analyse(&pair.intra, &pair.extra);
    assert_relative_eq!(amplitude_waves(&analysis, 8), 0.05, max_relative = 0.05);
    // mirror symmetry about the coma axis keeps the orthogonal coma out
    assert!(amplitude_waves(&analysis, 7).abs() < 1e-3);
}

#[test]
fn annular_spherical_is_recovered_with_obstruction_loss() {
    init_logging();
    let spec = PairSpec::annular(128, 10.0, 40.0, WAVELENGTH_MM, matched_defocus_mm(40.0))
        .with_aberrations(vec![Aberration::new(11, 0.05)]);
    let pair = synthesize_pair(&spec).unwrap();
    assert_eq!(pair.clipped_pixels, 0);

    let analysis = analyse(&pair.intra, &pair.extra);
    // the solver sees no signal inside the obstruction, so part of the
    // spherical term is absorbed by defocus
    let spherical = amplitude_waves(&analysis, 11);
    assert!(
        (0.03..0.055).contains(&spherical),
        "spherical recovered as {spherical}"
    );
    assert!(amplitude_waves(&analysis, 7).abs() < 1e-3);
    assert!(amplitude_waves(&analysis, 8).abs() < 1e-3);
}

#[test]
fn noisy_offset_pair_runs_end_to_end() {
    init_logging();
    let offset = ShiftVector::new(2.0, -3.0);
    let spec = PairSpec::annular(128, 12.0, 48.0, WAVELENGTH_MM, matched_defocus_mm(48.0))
        .with_aberrations(vec![Aberration::new(11, 0.05), Aberration::new(8, 0.02)])
        .with_extra_offset(offset);
    let pair = synthesize_pair(&spec).unwrap();
    let intra = add_read_noise(&pair.intra, 5.0, 1).unwrap();
    let extra = add_read_noise(&pair.extra, 5.0, 2).unwrap();

    let analysis = analyse(&intra, &extra);

    let shift = analysis.refinement.registration_shift();
    assert!(
        (shift.dy + offset.dy).abs() < 0.5 && (shift.dx + offset.dx).abs() < 0.5,
        "registration shift {shift:?} does not cancel offset {offset:?}"
    );
    assert_all_finite(analysis.wavefront_mm(), "wavefront");
    assert_eq!(analysis.amplitudes_waves().len(), 23);
    assert!(analysis.amplitudes_waves().iter().all(|a| a.is_finite()));
    assert!(analysis.r_out() > 0.0);
    let report = analysis.report().unwrap();
    assert_eq!(report.terms.len(), 23);
    assert!(report.rms_waves.is_finite());
}

#[test]
fn gaussian_spots_do_not_break_the_pipeline() {
    init_logging();
    let (intra, extra) = gaussian_spot_pair((100, 100), 12.0, 800.0, 1200.0);
    let analysis = analyse(&intra, &extra);
    assert_all_finite(analysis.wavefront_mm(), "wavefront");
}

#[test]
fn result_maps_export_as_png() {
    init_logging();
    let spec = PairSpec::annular(64, 6.0, 24.0, WAVELENGTH_MM, matched_defocus_mm(24.0))
        .with_aberrations(vec![Aberration::new(11, 0.05)]);
    let pair = synthesize_pair(&spec).unwrap();

    let map_path = output_path("synthetic_truth.png");
    let mask_path = output_path("synthetic_pupil.png");
    save_map_png(&pair.wavefront_waves, Some(&pair.pupil), &map_path).unwrap();
    save_mask_png(&pair.pupil, &mask_path).unwrap();

    let loaded = image::open(&mask_path).unwrap().to_luma8();
    assert_eq!(loaded.dimensions(), (64, 64));
    assert_eq!(loaded.get_pixel(32 + 12, 32).0[0], 255);
    assert_eq!(loaded.get_pixel(32, 32).0[0], 0);

    let map = image::open(&map_path).unwrap().to_luma8();
    let values: Array2<u8> = Array2::from_shape_fn((64, 64), |(r, c)| {
        map.get_pixel(c as u32, r as u32).0[0]
    });
    assert!(values.iter().any(|&v| v == 255));
}
