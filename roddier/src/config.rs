//! Telescope parameters and pipeline configuration.
//!
//! Every tunable of the pipeline lives in one immutable [`PipelineConfig`]
//! that is passed explicitly to each stage. Nothing in the crate falls back
//! to a hidden default wavelength, pixel scale, or threshold: the defaults
//! below only apply when a value is built with `Default` or when a JSON
//! profile omits a field.
//!
//! # Geometry
//!
//! A defocused pupil image of a telescope with aperture `D` and focal
//! length `f`, taken a distance `dz` from focus, is a disk of radius
//!
//! ```text
//! r = dz · tan(θ),   θ = atan((D/2) / f)
//! ```
//!
//! on the detector. [`TelescopeParams::defocus_from_radius_mm`] and
//! [`TelescopeParams::radius_from_defocus_px`] convert between the two,
//! in detector pixels of size `pixel_size_um × binning`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RoddierError};
use crate::registration::{estimate_defocus_mm, pupil_radius_px};

fn default_wavelength_nm() -> f64 {
    555.0
}

fn default_threshold() -> f64 {
    0.5
}

fn default_max_terms() -> usize {
    23
}

fn default_binning() -> u32 {
    1
}

/// Physical description of the telescope and detector under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelescopeParams {
    /// Primary aperture diameter in millimetres
    #[serde(default)]
    pub aperture_mm: f64,
    /// Effective focal length in millimetres
    #[serde(default)]
    pub focal_mm: f64,
    /// Secondary (central obstruction) diameter in millimetres, 0 for none
    #[serde(default)]
    pub secondary_mm: f64,
    /// Unbinned detector pixel size in micrometres
    #[serde(default)]
    pub pixel_size_um: f64,
    /// Observation wavelength in nanometres
    #[serde(default = "default_wavelength_nm")]
    pub wavelength_nm: f64,
    /// Pupil threshold as a fraction of the peak intensity
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Number of Zernike terms (Noll indices 1..=max_terms) in the final fit
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    /// Detector binning factor applied to the pixel size
    #[serde(default = "default_binning")]
    pub binning: u32,
}

impl Default for TelescopeParams {
    /// A 200 mm f/5 Newtonian with a 50 mm secondary and 3.76 µm pixels
    fn default() -> Self {
        Self {
            aperture_mm: 200.0,
            focal_mm: 1000.0,
            secondary_mm: 50.0,
            pixel_size_um: 3.76,
            wavelength_nm: default_wavelength_nm(),
            threshold: default_threshold(),
            max_terms: default_max_terms(),
            binning: default_binning(),
        }
    }
}

impl TelescopeParams {
    /// Create a parameter set with the default wavelength, threshold, term count and binning
    pub fn new(aperture_mm: f64, focal_mm: f64, secondary_mm: f64, pixel_size_um: f64) -> Self {
        Self {
            aperture_mm,
            focal_mm,
            secondary_mm,
            pixel_size_um,
            ..Self::default()
        }
    }

    /// Check every field for physical sense.
    ///
    /// # Errors
    /// * `InvalidParameter` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("aperture_mm", self.aperture_mm),
            ("focal_mm", self.focal_mm),
            ("pixel_size_um", self.pixel_size_um),
            ("wavelength_nm", self.wavelength_nm),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RoddierError::InvalidParameter(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if !(self.secondary_mm.is_finite() && self.secondary_mm >= 0.0) {
            return Err(RoddierError::InvalidParameter(format!(
                "secondary_mm must be non-negative, got {}",
                self.secondary_mm
            )));
        }
        if self.secondary_mm >= self.aperture_mm {
            return Err(RoddierError::InvalidParameter(format!(
                "secondary_mm ({}) must be smaller than aperture_mm ({})",
                self.secondary_mm, self.aperture_mm
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(RoddierError::InvalidParameter(format!(
                "threshold must lie in (0, 1), got {}",
                self.threshold
            )));
        }
        if self.max_terms == 0 {
            return Err(RoddierError::InvalidParameter(
                "max_terms must be at least 1".into(),
            ));
        }
        if self.binning == 0 {
            return Err(RoddierError::InvalidParameter(
                "binning must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Focal ratio `f/D`
    pub fn focal_ratio(&self) -> f64 {
        self.focal_mm / self.aperture_mm
    }

    /// Secondary to primary diameter ratio
    pub fn obstruction_ratio(&self) -> f64 {
        self.secondary_mm / self.aperture_mm
    }

    /// Wavelength in millimetres
    pub fn wavelength_mm(&self) -> f64 {
        self.wavelength_nm * 1.0e-6
    }

    /// Binned pixel size in millimetres
    pub fn effective_pixel_size_mm(&self) -> f64 {
        self.pixel_size_um * self.binning as f64 * 1.0e-3
    }

    /// Half-angle of the converging beam, `atan((D/2)/f)`
    pub fn beam_half_angle(&self) -> f64 {
        ((self.aperture_mm / 2.0) / self.focal_mm).atan()
    }

    /// Defocus distance (mm) that produces a pupil image of `radius_px` pixels
    pub fn defocus_from_radius_mm(&self, radius_px: f64) -> f64 {
        estimate_defocus_mm(
            radius_px,
            self.effective_pixel_size_mm(),
            self.focal_mm,
            self.aperture_mm,
        )
    }

    /// Pupil image radius (pixels) at `defocus_mm` from focus
    pub fn radius_from_defocus_px(&self, defocus_mm: f64) -> f64 {
        pupil_radius_px(
            defocus_mm,
            self.effective_pixel_size_mm(),
            self.focal_mm,
            self.aperture_mm,
        )
    }

    /// Save to a pretty-printed JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file; missing optional fields take their defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// How the inner (obstruction) radius of the annular mask is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObstructionMode {
    /// Smallest centroid distance among the thresholded pixels
    Auto,
    /// Fixed fraction of the outer radius (secondary/primary diameter ratio)
    Physical { ratio: f64 },
}

/// Parameters of the geometric registration stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Pixels brighter than this fraction of the peak belong to the pupil
    pub threshold_fraction: f64,
    /// Inner radius policy
    pub obstruction: ObstructionMode,
    /// Gaussian sigma (pixels) applied to both frames before correlation
    pub smoothing_sigma: Option<f64>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            threshold_fraction: default_threshold(),
            obstruction: ObstructionMode::Auto,
            smoothing_sigma: None,
        }
    }
}

impl RegistrationConfig {
    /// Registration settings derived from a telescope profile, using the
    /// physical obstruction ratio when the telescope has a secondary.
    pub fn from_telescope(telescope: &TelescopeParams) -> Self {
        let obstruction = if telescope.secondary_mm > 0.0 {
            ObstructionMode::Physical {
                ratio: telescope.obstruction_ratio(),
            }
        } else {
            ObstructionMode::Auto
        };
        Self {
            threshold_fraction: telescope.threshold,
            obstruction,
            smoothing_sigma: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.threshold_fraction > 0.0 && self.threshold_fraction < 1.0) {
            return Err(RoddierError::InvalidParameter(format!(
                "threshold_fraction must lie in (0, 1), got {}",
                self.threshold_fraction
            )));
        }
        if let ObstructionMode::Physical { ratio } = self.obstruction {
            if !(0.0..1.0).contains(&ratio) {
                return Err(RoddierError::InvalidParameter(format!(
                    "obstruction ratio must lie in [0, 1), got {ratio}"
                )));
            }
        }
        if let Some(sigma) = self.smoothing_sigma {
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(RoddierError::InvalidParameter(format!(
                    "smoothing_sigma must be non-negative, got {sigma}"
                )));
            }
        }
        Ok(())
    }
}

/// Stopping rule of the iterative refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Hard cap on registration/solve/correct cycles
    pub max_iterations: usize,
    /// Converged once tilt and defocus amplitudes change less than this
    pub tolerance: f64,
    /// Smallest acceptable outer pupil radius in pixels
    pub min_radius_px: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tolerance: 1.0e-6,
            min_radius_px: 2.0,
        }
    }
}

/// Gaussian smoothing followed by a relative threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseFilter {
    /// Smoothing sigma in pixels, 0 to skip smoothing
    pub sigma: f64,
    /// Pixels at or below this fraction of the smoothed peak are zeroed
    pub threshold_ratio: f64,
}

/// Optional clean-up applied to both raw frames before refinement.
///
/// Steps run in field order: crop, noise filter, energy normalization,
/// centering. Everything is off by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Square crop of this side around the frame centre
    #[serde(default)]
    pub crop_size: Option<usize>,
    #[serde(default)]
    pub noise_filter: Option<NoiseFilter>,
    /// Scale the extra-focal frame to the intra-focal total flux
    #[serde(default)]
    pub normalize_energy: bool,
    /// Move each frame's pupil centroid to the array centre
    #[serde(default)]
    pub center: bool,
}

impl PreprocessConfig {
    /// True when no step is enabled
    pub fn is_identity(&self) -> bool {
        self.crop_size.is_none()
            && self.noise_filter.is_none()
            && !self.normalize_energy
            && !self.center
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.crop_size == Some(0) {
            return Err(RoddierError::InvalidParameter(
                "crop_size must be at least 1".into(),
            ));
        }
        if let Some(filter) = self.noise_filter {
            if !(filter.sigma.is_finite() && filter.sigma >= 0.0) {
                return Err(RoddierError::InvalidParameter(format!(
                    "noise filter sigma must be non-negative, got {}",
                    filter.sigma
                )));
            }
            if !(0.0..1.0).contains(&filter.threshold_ratio) {
                return Err(RoddierError::InvalidParameter(format!(
                    "noise filter threshold_ratio must lie in [0, 1), got {}",
                    filter.threshold_ratio
                )));
            }
        }
        Ok(())
    }
}

/// The single configuration value threaded through the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub telescope: TelescopeParams,
    pub registration: RegistrationConfig,
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
}

impl PipelineConfig {
    /// Build a configuration for `telescope`, deriving registration settings from it.
    ///
    /// # Errors
    /// * `InvalidParameter` if the telescope profile is not physical
    pub fn new(telescope: TelescopeParams) -> Result<Self> {
        telescope.validate()?;
        let registration = RegistrationConfig::from_telescope(&telescope);
        Ok(Self {
            telescope,
            registration,
            refinement: RefinementConfig::default(),
            preprocess: PreprocessConfig::default(),
        })
    }

    /// Replace the registration settings
    pub fn with_registration(self, registration: RegistrationConfig) -> Result<Self> {
        registration.validate()?;
        Ok(Self {
            registration,
            ..self
        })
    }

    /// Replace the refinement stopping rule
    pub fn with_refinement(self, refinement: RefinementConfig) -> Result<Self> {
        if refinement.max_iterations == 0 {
            return Err(RoddierError::InvalidParameter(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(refinement.tolerance.is_finite() && refinement.tolerance >= 0.0) {
            return Err(RoddierError::InvalidParameter(format!(
                "tolerance must be non-negative, got {}",
                refinement.tolerance
            )));
        }
        Ok(Self { refinement, ..self })
    }

    /// Replace the frame preprocessing steps
    pub fn with_preprocess(self, preprocess: PreprocessConfig) -> Result<Self> {
        preprocess.validate()?;
        Ok(Self { preprocess, ..self })
    }

    /// Number of Zernike terms in the final fit
    pub fn max_terms(&self) -> usize {
        self.telescope.max_terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_profile_is_valid() {
        let params = TelescopeParams::default();
        params.validate().unwrap();
        assert_relative_eq!(params.focal_ratio(), 5.0);
        assert_relative_eq!(params.obstruction_ratio(), 0.25);
        assert_relative_eq!(params.wavelength_mm(), 5.55e-4);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut params = TelescopeParams::default();
        params.aperture_mm = 0.0;
        assert!(params.validate().is_err());

        let mut params = TelescopeParams::default();
        params.secondary_mm = 250.0;
        assert!(params.validate().is_err());

        let mut params = TelescopeParams::default();
        params.threshold = 1.0;
        assert!(params.validate().is_err());

        let mut params = TelescopeParams::default();
        params.binning = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_defocus_radius_round_trip() {
        let params = TelescopeParams::default();
        let dz = params.defocus_from_radius_mm(40.0);
        // f/5 beam: tan(theta) = 0.1, pixel 3.76 um
        assert_relative_eq!(dz, 40.0 * 3.76e-3 / 0.1, epsilon = 1e-9);
        assert_relative_eq!(params.radius_from_defocus_px(dz), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_binning_scales_pixel_size() {
        let mut params = TelescopeParams::default();
        params.binning = 2;
        assert_relative_eq!(params.effective_pixel_size_mm(), 2.0 * 3.76e-3);
    }

    #[test]
    fn test_json_missing_fields_take_defaults() {
        let json = r#"{"aperture_mm": 150.0, "focal_mm": 750.0, "pixel_size_um": 5.2}"#;
        let params: TelescopeParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.secondary_mm, 0.0);
        assert_eq!(params.wavelength_nm, 555.0);
        assert_eq!(params.threshold, 0.5);
        assert_eq!(params.max_terms, 23);
        assert_eq!(params.binning, 1);
    }

    #[test]
    fn test_registration_from_telescope() {
        let with_secondary = RegistrationConfig::from_telescope(&TelescopeParams::default());
        assert_eq!(
            with_secondary.obstruction,
            ObstructionMode::Physical { ratio: 0.25 }
        );

        let refractor = TelescopeParams::new(100.0, 600.0, 0.0, 4.0);
        let reg = RegistrationConfig::from_telescope(&refractor);
        assert_eq!(reg.obstruction, ObstructionMode::Auto);
    }

    #[test]
    fn test_pipeline_config_builders_validate() {
        let config = PipelineConfig::new(TelescopeParams::default()).unwrap();
        assert_eq!(config.max_terms(), 23);

        let bad = RefinementConfig {
            max_iterations: 0,
            ..RefinementConfig::default()
        };
        assert!(config.clone().with_refinement(bad).is_err());

        let bad_reg = RegistrationConfig {
            threshold_fraction: 1.5,
            ..RegistrationConfig::default()
        };
        assert!(config.with_registration(bad_reg).is_err());
    }

    #[test]
    fn test_preprocess_defaults_off_and_validates() {
        let config = PipelineConfig::new(TelescopeParams::default()).unwrap();
        assert!(config.preprocess.is_identity());

        let crop = PreprocessConfig {
            crop_size: Some(0),
            ..PreprocessConfig::default()
        };
        assert!(config.clone().with_preprocess(crop).is_err());

        let filter = PreprocessConfig {
            noise_filter: Some(NoiseFilter {
                sigma: 1.0,
                threshold_ratio: 1.0,
            }),
            ..PreprocessConfig::default()
        };
        assert!(config.clone().with_preprocess(filter).is_err());

        let ok = PreprocessConfig {
            crop_size: Some(64),
            normalize_energy: true,
            ..PreprocessConfig::default()
        };
        let config = config.with_preprocess(ok).unwrap();
        assert!(!config.preprocess.is_identity());
    }

    #[test]
    fn test_config_json_without_preprocess_section() {
        let config = PipelineConfig::new(TelescopeParams::default()).unwrap();
        let mut value = serde_json::to_value(&config).unwrap();
        value.as_object_mut().unwrap().remove("preprocess");
        let loaded: PipelineConfig = serde_json::from_value(value).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "roddier_params_{}.json",
            std::process::id()
        ));
        let params = TelescopeParams::new(254.0, 1200.0, 63.0, 2.9);
        params.save_to_file(&path).unwrap();
        let loaded = TelescopeParams::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, params);
    }
}
