use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pupil_sim::{synthesize_pair, Aberration, PairSpec, SyntheticPair};
use roddier::{
    build_annular_mask, normalized_difference, BasisSize, Center, PhysicalScale, PipelineConfig,
    RoddierPipeline, TelescopeParams, WavefrontSolver, ZernikeBasis,
};

const WAVELENGTH_MM: f64 = 5.55e-4;

fn matched_defocus_mm(r_out: f64) -> f64 {
    TelescopeParams::default().defocus_from_radius_mm(r_out)
}

fn make_pair(size: usize) -> SyntheticPair {
    let r_out = size as f64 * 0.35;
    let defocus_mm = matched_defocus_mm(r_out);
    let spec = PairSpec::annular(size, r_out * 0.25, r_out, WAVELENGTH_MM, defocus_mm)
        .with_aberrations(vec![
            Aberration::new(5, 0.02),
            Aberration::new(8, 0.03),
            Aberration::new(11, 0.05),
        ]);
    synthesize_pair(&spec).unwrap()
}

fn bench_solver(c: &mut Criterion) {
    let solver = WavefrontSolver::new();

    let mut group = c.benchmark_group("wavefront_solver");
    for size in [128usize, 256, 512] {
        let pair = make_pair(size);
        let scale = Some(PhysicalScale::new(
            WAVELENGTH_MM,
            matched_defocus_mm(size as f64 * 0.35),
        ));
        let delta = normalized_difference(&pair.intra.view(), &pair.extra.view()).unwrap();
        group.bench_function(format!("{size}x{size}"), |b| {
            b.iter(|| {
                solver.solve(
                    black_box(&delta.view()),
                    black_box(&pair.pupil.view()),
                    scale,
                )
            })
        });
    }
    group.finish();
}

fn bench_basis_generation(c: &mut Criterion) {
    let shape = (256, 256);
    let center = Center::new(128.0, 128.0);
    let mask = build_annular_mask(center, 22.0, 90.0, shape).unwrap();

    let mut group = c.benchmark_group("zernike_basis");
    group.bench_function("23_terms_256x256", |b| {
        b.iter(|| {
            ZernikeBasis::generate(
                shape,
                black_box(&mask.view()),
                90.0,
                center,
                BasisSize::Terms(23),
            )
        })
    });
    group.bench_function("order_10_256x256", |b| {
        b.iter(|| {
            ZernikeBasis::generate(
                shape,
                black_box(&mask.view()),
                90.0,
                center,
                BasisSize::Order(10),
            )
        })
    });
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let pair = make_pair(256);
    let pipeline =
        RoddierPipeline::new(PipelineConfig::new(TelescopeParams::default()).unwrap());

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("run_256x256", |b| {
        b.iter(|| pipeline.run(black_box(&pair.intra.view()), black_box(&pair.extra.view())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_solver,
    bench_basis_generation,
    bench_full_pipeline,
);
criterion_main!(benches);
