//! End-to-end analysis of an intra/extra-focal image pair.

use ndarray::{Array2, ArrayView2};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::image_proc::preprocess_pair;
use crate::refine::{ConvergenceStatus, IterativeRefiner, RefinementResult};
use crate::registration::Center;
use crate::report::ZernikeReport;
use crate::synthesis::{
    calculate_interferogram, calculate_psf, InterferogramOptions, PsfOptions, PsfResult,
};
use crate::zernike::{
    fill_obstruction, fit, reconstruct_selected, without_alignment_terms, BasisSize, FitResult,
    ZernikeBasis,
};

/// Runs refinement, the full-order Zernike fit and on-demand synthesis.
#[derive(Debug, Clone)]
pub struct RoddierPipeline {
    config: PipelineConfig,
}

impl RoddierPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse one image pair.
    ///
    /// The configured preprocessing steps run first, so every output map has
    /// the shape of the preprocessed frames.
    ///
    /// # Errors
    /// Any preprocessing, registration, geometry or fit error of the underlying stages.
    pub fn run(&self, intra: &ArrayView2<f64>, extra: &ArrayView2<f64>) -> Result<RoddierAnalysis> {
        let (intra, extra) = preprocess_pair(
            intra,
            extra,
            &self.config.preprocess,
            self.config.registration.threshold_fraction,
        )?;
        let refinement =
            IterativeRefiner::new(&intra.view(), &extra.view(), &self.config)?.run()?;

        let basis = ZernikeBasis::generate(
            refinement.wavefront.dim(),
            &refinement.mask.view(),
            refinement.r_out(),
            refinement.center(),
            BasisSize::Terms(self.config.max_terms()),
        )?;
        let fit = fit(&refinement.wavefront.view(), &refinement.mask.view(), &basis)?;
        log::info!(
            "fitted {} Zernike terms after {} refinement iteration(s), residual RMS {:.3e} mm",
            basis.len(),
            refinement.iterations,
            fit.residual_rms
        );

        Ok(RoddierAnalysis {
            wavelength_mm: self.config.telescope.wavelength_mm(),
            refinement,
            basis,
            fit,
        })
    }
}

/// Result of [`RoddierPipeline::run`].
///
/// The fit is against the wavefront in millimetres; the `*_waves`
/// accessors divide by the wavelength.
#[derive(Debug, Clone)]
pub struct RoddierAnalysis {
    pub refinement: RefinementResult,
    pub basis: ZernikeBasis,
    pub fit: FitResult,
    pub wavelength_mm: f64,
}

impl RoddierAnalysis {
    /// Wavefront in millimetres of optical path
    pub fn wavefront_mm(&self) -> &Array2<f64> {
        &self.refinement.wavefront
    }

    pub fn wavefront_waves(&self) -> Array2<f64> {
        self.refinement.wavefront.mapv(|v| v / self.wavelength_mm)
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.refinement.mask
    }

    pub fn center(&self) -> Center {
        self.refinement.center()
    }

    pub fn r_in(&self) -> f64 {
        self.refinement.geometry.r_in
    }

    pub fn r_out(&self) -> f64 {
        self.refinement.r_out()
    }

    pub fn defocus_mm(&self) -> f64 {
        self.refinement.defocus_mm
    }

    pub fn status(&self) -> ConvergenceStatus {
        self.refinement.status
    }

    /// Basis coefficients in waves
    pub fn coefficients_waves(&self) -> Vec<f64> {
        self.fit
            .coefficients
            .iter()
            .map(|c| c / self.wavelength_mm)
            .collect()
    }

    /// Noll amplitudes in waves RMS
    pub fn amplitudes_waves(&self) -> Vec<f64> {
        self.fit
            .amplitudes
            .iter()
            .map(|a| a / self.wavelength_mm)
            .collect()
    }

    /// Wavefront in waves with piston, tilt and defocus removed
    pub fn aberration_waves(&self) -> Result<Array2<f64>> {
        let cleaned = without_alignment_terms(
            &self.refinement.wavefront.view(),
            &self.refinement.mask.view(),
            &self.fit,
            &self.basis,
        )?;
        Ok(cleaned.mapv(|v| v / self.wavelength_mm))
    }

    /// Reconstruction in waves from the chosen Noll indices only
    pub fn reconstruct_modes(&self, selection: &[usize]) -> Result<Array2<f64>> {
        let map = reconstruct_selected(
            &self.fit.coefficients,
            &self.basis,
            selection,
            Some(&self.refinement.mask.view()),
        )?;
        Ok(map.mapv(|v| v / self.wavelength_mm))
    }

    /// Fitted expansion in waves over the full disk, central obstruction included
    pub fn filled_wavefront_waves(&self) -> Result<Array2<f64>> {
        Ok(fill_obstruction(&self.fit, &self.basis)?.mapv(|v| v / self.wavelength_mm))
    }

    /// Interferogram of the aberration (alignment terms removed)
    pub fn interferogram(&self, options: &InterferogramOptions) -> Result<Array2<f64>> {
        let waves = self.aberration_waves()?;
        calculate_interferogram(&waves.view(), &self.refinement.mask.view(), options)
    }

    /// PSF of the aberration (alignment terms removed)
    pub fn psf(&self, options: &PsfOptions) -> Result<PsfResult> {
        let waves = self.aberration_waves()?;
        calculate_psf(&waves.view(), &self.refinement.mask.view(), options)
    }

    /// Coefficient report with RMS and peak-to-valley of the aberration
    pub fn report(&self) -> Result<ZernikeReport> {
        let waves = self.aberration_waves()?;
        ZernikeReport::from_analysis(self, &waves.view())
    }
}
