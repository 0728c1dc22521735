//! Synthesize a defocused pupil pair and run the Roddier analysis on it.
//!
//! Generates an intra/extra-focal pair with the requested Zernike
//! aberrations, optionally adds detector noise, runs the full pipeline and
//! writes the input frames, result maps and the Zernike report to an output
//! directory.
//!
//! Usage:
//! ```
//! cargo run --release --bin roddier_synth -- --aberration 11:0.05 --aberration 7:0.03
//! cargo run --release --bin roddier_synth -- --profile my_newtonian --read-noise 5 -o out/
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use pupil_sim::{
    add_photon_noise, add_read_noise, save_map_png, save_mask_png, synthesize_pair, Aberration,
    PairSpec,
};
use roddier::{
    InterferogramOptions, NoiseFilter, PipelineConfig, PreprocessConfig, PsfOptions,
    RoddierPipeline, ShiftVector, TelescopeParams, TelescopeStore,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "roddier_synth")]
#[command(about = "Synthesize a defocused pupil pair and analyse it")]
#[command(version)]
struct Args {
    /// Frame side length in pixels
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Outer pupil radius in pixels
    #[arg(long, default_value_t = 90.0)]
    r_out: f64,

    /// Inner (obstruction) radius in pixels; derived from the telescope if omitted
    #[arg(long)]
    r_in: Option<f64>,

    /// Zernike term as NOLL:WAVES_RMS, repeatable
    #[arg(short, long = "aberration", value_parser = parse_aberration)]
    aberrations: Vec<Aberration>,

    /// Pointing error of the extra-focal frame as DY,DX in pixels
    #[arg(long, value_parser = parse_offset)]
    offset: Option<ShiftVector>,

    /// Mean irradiance of the lit pupil
    #[arg(long, default_value_t = 1000.0)]
    intensity: f64,

    /// Gaussian read noise standard deviation
    #[arg(long, default_value_t = 0.0)]
    read_noise: f64,

    /// Apply Poisson photon noise before read noise
    #[arg(long)]
    photon_noise: bool,

    /// Noise seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Named telescope profile from the profile store
    #[arg(short, long)]
    profile: Option<String>,

    /// Aperture diameter in mm, ignored with --profile
    #[arg(long, default_value_t = 200.0)]
    aperture: f64,

    /// Focal length in mm, ignored with --profile
    #[arg(long, default_value_t = 1000.0)]
    focal: f64,

    /// Secondary mirror diameter in mm, ignored with --profile
    #[arg(long, default_value_t = 50.0)]
    secondary: f64,

    /// Pixel size in microns, ignored with --profile
    #[arg(long, default_value_t = 3.76)]
    pixel: f64,

    /// Wavelength in nm, ignored with --profile
    #[arg(long, default_value_t = 555.0)]
    wavelength: f64,

    /// Crop both frames to a centred square of this side before analysis
    #[arg(long)]
    crop: Option<usize>,

    /// Smooth with this Gaussian sigma and zero pixels below --filter-threshold of the peak
    #[arg(long)]
    filter_sigma: Option<f64>,

    /// Relative threshold used with --filter-sigma
    #[arg(long, default_value_t = 0.05)]
    filter_threshold: f64,

    /// Equalise the total flux of the two frames before analysis
    #[arg(long)]
    normalize_energy: bool,

    /// Move each frame's pupil centroid to the frame centre before analysis
    #[arg(long)]
    center: bool,

    /// Save the command line telescope as a profile under this name
    #[arg(long)]
    save_profile: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = "roddier_output")]
    output: PathBuf,
}

fn parse_aberration(s: &str) -> std::result::Result<Aberration, String> {
    let (noll, amplitude) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NOLL:WAVES, got '{s}'"))?;
    let noll: usize = noll
        .trim()
        .parse()
        .map_err(|e| format!("bad Noll index '{noll}': {e}"))?;
    let amplitude: f64 = amplitude
        .trim()
        .parse()
        .map_err(|e| format!("bad amplitude '{amplitude}': {e}"))?;
    if noll == 0 {
        return Err("Noll indices start at 1".to_string());
    }
    Ok(Aberration::new(noll, amplitude))
}

fn parse_offset(s: &str) -> std::result::Result<ShiftVector, String> {
    let (dy, dx) = s
        .split_once(',')
        .ok_or_else(|| format!("expected DY,DX, got '{s}'"))?;
    let dy: f64 = dy.trim().parse().map_err(|e| format!("bad dy: {e}"))?;
    let dx: f64 = dx.trim().parse().map_err(|e| format!("bad dx: {e}"))?;
    Ok(ShiftVector::new(dy, dx))
}

fn telescope_from_args(args: &Args) -> Result<TelescopeParams> {
    if let Some(name) = &args.profile {
        let store = TelescopeStore::new().context("cannot open the telescope profile store")?;
        return match store.load(name) {
            Some(params) => params.with_context(|| format!("cannot read profile '{name}'")),
            None => {
                let known = store.list().unwrap_or_default();
                bail!("no telescope profile named '{name}' (known: {known:?})")
            }
        };
    }

    let mut telescope = TelescopeParams::new(args.aperture, args.focal, args.secondary, args.pixel);
    telescope.wavelength_nm = args.wavelength;
    telescope.validate()?;
    if let Some(name) = &args.save_profile {
        let store = TelescopeStore::new().context("cannot open the telescope profile store")?;
        let path = store.save(name, &telescope)?;
        info!("Saved telescope profile '{}' to {}", name, path.display());
    }
    Ok(telescope)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let telescope = telescope_from_args(&args)?;
    let defocus_mm = telescope.defocus_from_radius_mm(args.r_out);
    let r_in = args
        .r_in
        .unwrap_or_else(|| args.r_out * telescope.obstruction_ratio());
    if r_in >= args.r_out {
        bail!("inner radius {r_in} must be smaller than outer radius {}", args.r_out);
    }

    info!(
        "Telescope f/{:.2}, {} nm, pupil radius {:.1} px -> defocus {:.4} mm",
        telescope.focal_ratio(),
        telescope.wavelength_nm,
        args.r_out,
        defocus_mm
    );

    let mut spec = PairSpec::annular(
        args.size,
        r_in,
        args.r_out,
        telescope.wavelength_mm(),
        defocus_mm,
    )
    .with_aberrations(args.aberrations.clone());
    spec.intensity = args.intensity;
    if let Some(offset) = args.offset {
        spec = spec.with_extra_offset(offset);
    }

    let pair = synthesize_pair(&spec)?;
    if pair.clipped_pixels > 0 {
        warn!(
            "{} pixels clipped; the Laplacian model is outside its small-signal range",
            pair.clipped_pixels
        );
    }

    let (mut intra, mut extra) = (pair.intra, pair.extra);
    if args.photon_noise {
        intra = add_photon_noise(&intra, args.seed);
        extra = add_photon_noise(&extra, args.seed.wrapping_add(1));
    }
    if args.read_noise > 0.0 {
        intra = add_read_noise(&intra, args.read_noise, args.seed.wrapping_add(2))?;
        extra = add_read_noise(&extra, args.read_noise, args.seed.wrapping_add(3))?;
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let out = |name: &str| args.output.join(name);

    std::fs::write(out("pair_spec.json"), serde_json::to_string_pretty(&spec)?)?;
    save_map_png(&intra, None, out("intra.png"))?;
    save_map_png(&extra, None, out("extra.png"))?;
    save_map_png(&pair.wavefront_waves, Some(&pair.pupil), out("truth_waves.png"))?;

    let preprocess = PreprocessConfig {
        crop_size: args.crop,
        noise_filter: args.filter_sigma.map(|sigma| NoiseFilter {
            sigma,
            threshold_ratio: args.filter_threshold,
        }),
        normalize_energy: args.normalize_energy,
        center: args.center,
    };
    let config = PipelineConfig::new(telescope)?.with_preprocess(preprocess)?;
    let analysis = RoddierPipeline::new(config).run(&intra.view(), &extra.view())?;

    let mask = analysis.mask();
    save_mask_png(mask, out("mask.png"))?;
    save_map_png(&analysis.wavefront_waves(), Some(mask), out("wavefront_waves.png"))?;
    save_map_png(&analysis.aberration_waves()?, Some(mask), out("aberration_waves.png"))?;
    save_map_png(&analysis.filled_wavefront_waves()?, None, out("filled_waves.png"))?;

    let fringes = analysis.interferogram(&InterferogramOptions {
        reference_frequency: 10.0,
        ..InterferogramOptions::default()
    })?;
    save_map_png(&fringes, None, out("interferogram.png"))?;

    let psf = analysis.psf(&PsfOptions::default())?;
    save_map_png(&psf.psf_log, None, out("psf_log.png"))?;

    let report = analysis.report()?;
    report.save_text(&out("zernike.txt"))?;
    report.save_json(&out("zernike.json"))?;

    info!(
        "{:?} after {} iteration(s): centre ({:.2}, {:.2}), r_out {:.2} px, r_in {:.2} px",
        analysis.status(),
        analysis.refinement.iterations,
        analysis.center().x,
        analysis.center().y,
        analysis.r_out(),
        analysis.r_in()
    );
    println!("{}", report.to_text());
    println!(
        "RMS {:.4} waves, PV {:.4} waves, Strehl {:.3}",
        report.rms_waves, report.peak_to_valley_waves, psf.strehl_ratio
    );
    if let Some(term) = report.dominant_aberration() {
        println!(
            "Dominant aberration: Z{} {} ({:.4} waves)",
            term.noll, term.name, term.coefficient
        );
    }
    info!("Results written to {}", args.output.display());
    Ok(())
}
