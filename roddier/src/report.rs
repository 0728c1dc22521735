//! Zernike coefficient reports in text and JSON form.
//!
//! The text form has one line per term,
//!
//! ```text
//! Z4 - Defocus: 0.012345
//! ```
//!
//! with the Noll amplitude in waves RMS.

use ndarray::ArrayView2;
use pupil_math::{masked_peak_to_valley, masked_rms};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::pipeline::RoddierAnalysis;
use crate::refine::ConvergenceStatus;
use crate::zernike::mode_name;

/// One Zernike term of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTerm {
    pub noll: usize,
    pub name: String,
    /// Noll amplitude in waves RMS
    pub coefficient: f64,
}

/// Summary of one analysis, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZernikeReport {
    pub wavelength_nm: f64,
    pub defocus_mm: f64,
    pub r_out_px: f64,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    /// RMS of the wavefront (alignment terms removed) in waves
    pub rms_waves: f64,
    /// Peak-to-valley of the same wavefront in waves
    pub peak_to_valley_waves: f64,
    pub terms: Vec<ReportTerm>,
}

impl ZernikeReport {
    /// Build a report from named amplitudes and the aberration map in waves.
    pub fn new(
        amplitudes_waves: &[f64],
        aberration_waves: &ArrayView2<f64>,
        mask: &ArrayView2<bool>,
    ) -> Result<Self> {
        let terms = amplitudes_waves
            .iter()
            .enumerate()
            .map(|(i, &coefficient)| ReportTerm {
                noll: i + 1,
                name: mode_name(i + 1),
                coefficient,
            })
            .collect();
        Ok(Self {
            wavelength_nm: 0.0,
            defocus_mm: 0.0,
            r_out_px: 0.0,
            status: ConvergenceStatus::Converged,
            iterations: 0,
            rms_waves: masked_rms(aberration_waves, mask)?,
            peak_to_valley_waves: masked_peak_to_valley(aberration_waves, mask)?,
            terms,
        })
    }

    pub(crate) fn from_analysis(
        analysis: &RoddierAnalysis,
        aberration_waves: &ArrayView2<f64>,
    ) -> Result<Self> {
        let report = Self::new(
            &analysis.amplitudes_waves(),
            aberration_waves,
            &analysis.mask().view(),
        )?;
        Ok(Self {
            wavelength_nm: analysis.wavelength_mm * 1.0e6,
            defocus_mm: analysis.defocus_mm(),
            r_out_px: analysis.r_out(),
            status: analysis.status(),
            iterations: analysis.refinement.iterations,
            ..report
        })
    }

    /// `Z{j} - {name}: {coefficient:.6}` per term, newline terminated
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for term in &self.terms {
            // Writing to a String cannot fail
            let _ = writeln!(out, "Z{} - {}: {:.6}", term.noll, term.name, term.coefficient);
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_text(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Term with the largest absolute coefficient, ignoring piston, tilt and defocus
    pub fn dominant_aberration(&self) -> Option<&ReportTerm> {
        self.terms
            .iter()
            .filter(|t| t.noll > 4)
            .max_by(|a, b| a.coefficient.abs().total_cmp(&b.coefficient.abs()))
    }
}
