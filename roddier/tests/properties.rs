use approx::assert_abs_diff_eq;
use ndarray::Array2;
use roddier::zernike::{fit, reconstruct, BasisSize, ZernikeBasis};
use roddier::{
    calculate_interferogram, calculate_psf, normalized_difference, Center, InterferogramOptions,
    PhysicalScale, PsfOptions, WavefrontSolver,
};
use test_helpers::{annular_mask, assert_all_finite, circular_mask, gaussian_spot, unit_polar};

#[test]
fn zero_difference_gives_zero_wavefront() {
    let delta = Array2::<f64>::zeros((64, 48));
    let mask = annular_mask((64, 48), (24.0, 32.0), 5.0, 20.0);
    let result = WavefrontSolver::new()
        .solve(
            &delta.view(),
            &mask.view(),
            Some(PhysicalScale::new(5.55e-4, 1.5)),
        )
        .unwrap();
    assert_eq!(result.wavefront.dim(), (64, 48));
    assert!(result.wavefront.iter().all(|&v| v == 0.0));
}

#[test]
fn basis_has_requested_terms_and_support() {
    let shape = (50, 60);
    let center = Center::new(29.0, 24.5);
    let mask = annular_mask(shape, (center.x, center.y), 6.0, 22.0);
    for size in [BasisSize::Terms(1), BasisSize::Terms(23), BasisSize::Order(6)] {
        let basis = ZernikeBasis::generate(shape, &mask.view(), 22.0, center, size).unwrap();
        assert_eq!(basis.len(), size.term_count());
        for term in basis.terms() {
            assert_eq!(term.dim(), shape);
            assert!(term
                .iter()
                .zip(mask.iter())
                .all(|(&v, &inside)| inside || v == 0.0));
        }
    }
}

#[test]
fn fit_then_reconstruct_reproduces_span_member() {
    let shape = (72, 72);
    let center = Center::new(35.5, 36.0);
    let mask = annular_mask(shape, (center.x, center.y), 8.0, 30.0);
    let basis =
        ZernikeBasis::generate(shape, &mask.view(), 30.0, center, BasisSize::Terms(21)).unwrap();

    let coefficients: Vec<f64> = (1..=21).map(|j| ((j * 7) % 5) as f64 * 0.1 - 0.2).collect();
    let wavefront = reconstruct(&coefficients, &basis, Some(&mask.view())).unwrap();
    let fitted = fit(&wavefront.view(), &mask.view(), &basis).unwrap();
    assert_eq!(fitted.len(), basis.len());

    let back = reconstruct(&fitted.coefficients, &basis, Some(&mask.view())).unwrap();
    for (a, b) in back.iter().zip(wavefront.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

#[test]
fn pure_defocus_is_dominant_at_noll_four() {
    let shape = (81, 81);
    let center = Center::new(40.0, 40.0);
    let mask = circular_mask(shape, (40.0, 40.0), 36.0);
    let (rho, _) = unit_polar(shape, (40.0, 40.0), 36.0);
    let wavefront = Array2::from_shape_fn(shape, |idx| {
        if mask[idx] {
            2.0 * rho[idx].powi(2) - 1.0
        } else {
            0.0
        }
    });

    let basis =
        ZernikeBasis::generate(shape, &mask.view(), 36.0, center, BasisSize::Order(4)).unwrap();
    let fitted = fit(&wavefront.view(), &mask.view(), &basis).unwrap();

    let defocus = fitted.coefficients[3].abs();
    assert!(defocus > 1.0);
    for (i, c) in fitted.coefficients.iter().enumerate().take(11) {
        if i != 3 {
            assert!(c.abs() < 1e-6 * defocus, "Z{} = {c}", i + 1);
        }
    }
    // 2r^2 - 1 is Z4 / sqrt(3)
    assert_abs_diff_eq!(fitted.amplitude(4), 1.0 / 3f64.sqrt(), epsilon = 1e-9);
}

#[test]
fn psf_is_finite_and_non_negative() {
    let shape = (64, 64);
    let mask = annular_mask(shape, (32.0, 32.0), 4.0, 16.0);
    let (rho, theta) = unit_polar(shape, (32.0, 32.0), 16.0);
    let wavefront = Array2::from_shape_fn(shape, |idx| {
        0.3 * rho[idx].powi(3) * theta[idx].cos()
    });
    let result = calculate_psf(&wavefront.view(), &mask.view(), &PsfOptions::default()).unwrap();
    assert_eq!(result.psf.dim(), shape);
    assert!(result.psf.iter().all(|&v| v.is_finite() && v >= 0.0));
    assert!(result
        .psf_log
        .iter()
        .all(|&v| v.is_finite() && v >= -8.0 - 1e-9));
    assert!(result.strehl_ratio > 0.0 && result.strehl_ratio <= 1.0 + 1e-12);
}

#[test]
fn interferogram_is_finite_non_negative_and_shaped() {
    let shape = (40, 56);
    let mask = circular_mask(shape, (28.0, 20.0), 18.0);
    let wavefront = Array2::from_shape_fn(shape, |(r, c)| ((r * c) as f64).sqrt() * 0.05);
    let options = InterferogramOptions {
        reference_frequency: 5.0,
        reference_intensity: 0.6,
        rescale: false,
    };
    let fringes = calculate_interferogram(&wavefront.view(), &mask.view(), &options).unwrap();
    assert_eq!(fringes.dim(), shape);
    assert!(fringes.iter().all(|&v| v.is_finite() && v >= 0.0));
}

#[test]
fn gaussian_spots_give_finite_wavefront() {
    let shape = (100, 100);
    let intra = gaussian_spot(shape, (50.0, 50.0), 12.0, 1000.0);
    let extra = gaussian_spot(shape, (50.0, 50.0), 12.0, 1600.0);
    let delta = normalized_difference(&intra.view(), &extra.view()).unwrap();
    let mask = circular_mask(shape, (50.0, 50.0), 30.0);
    let result = WavefrontSolver::new()
        .solve(&delta.view(), &mask.view(), None)
        .unwrap();
    assert_eq!(result.wavefront.dim(), shape);
    assert_all_finite(&result.wavefront, "wavefront");
}
