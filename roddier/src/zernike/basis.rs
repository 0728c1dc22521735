//! Mask-orthonormalized Zernike basis over a pixel grid.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::noll::{noll_normalization, noll_to_nm, terms_for_order, zernike_value};
use crate::error::{ensure_same_shape, Result, RoddierError};
use crate::registration::Center;

/// How many terms to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisSize {
    /// Noll indices `1..=n`
    Terms(usize),
    /// Every term with radial order ≤ `n`
    Order(usize),
}

impl BasisSize {
    pub fn term_count(&self) -> usize {
        match *self {
            BasisSize::Terms(n) => n,
            BasisSize::Order(order) => terms_for_order(order),
        }
    }
}

/// Ordered Zernike maps, one per Noll index starting at 1.
///
/// Each map is `N_j · Z_j(r/R_out, θ)` restricted to the mask and divided
/// by its mask-weighted L2 norm, so the maps are unit vectors under the
/// discrete inner product `Σ_mask a·b`. The norms are kept: a coefficient
/// `c_j` against this basis corresponds to the analytic Noll amplitude
/// `c_j / norm_j`. A term with no support on the mask stays all-zero with
/// a zero norm.
#[derive(Debug, Clone)]
pub struct ZernikeBasis {
    terms: Vec<Array2<f64>>,
    norms: Vec<f64>,
    center: Center,
    r_out: f64,
    shape: (usize, usize),
}

impl ZernikeBasis {
    /// Build the basis for a pupil of radius `r_out` centred at `center`.
    ///
    /// # Errors
    /// * `ShapeMismatch` if `mask` is not `shape`
    /// * `InvalidParameter` if `r_out` is not positive or no terms are requested
    pub fn generate(
        shape: (usize, usize),
        mask: &ArrayView2<bool>,
        r_out: f64,
        center: Center,
        size: BasisSize,
    ) -> Result<Self> {
        ensure_same_shape("basis mask", shape, mask.dim())?;
        if !(r_out.is_finite() && r_out > 0.0) {
            return Err(RoddierError::InvalidParameter(format!(
                "outer radius must be positive, got {r_out}"
            )));
        }
        let count = size.term_count();
        if count == 0 {
            return Err(RoddierError::InvalidParameter(
                "basis needs at least one term".into(),
            ));
        }

        let polar = polar_grid(shape, mask, center, r_out);
        let mut terms = Vec::with_capacity(count);
        let mut norms = Vec::with_capacity(count);
        for j in 1..=count {
            let (n, m) = noll_to_nm(j)?;
            let scale = noll_normalization(n, m);
            let mut term = Array2::from_shape_fn(shape, |idx| {
                if mask[idx] {
                    let (rho, theta) = polar[idx];
                    scale * zernike_value(n, m, rho, theta)
                } else {
                    0.0
                }
            });
            let norm = term.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                term.mapv_inplace(|v| v / norm);
            } else {
                log::warn!("Zernike term {j} has no support on the mask");
            }
            terms.push(term);
            norms.push(norm);
        }

        log::debug!(
            "generated {count} Zernike terms over R_out {r_out:.2} at ({:.2}, {:.2})",
            center.x,
            center.y
        );
        Ok(Self {
            terms,
            norms,
            center,
            r_out,
            shape,
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn center(&self) -> Center {
        self.center
    }

    pub fn r_out(&self) -> f64 {
        self.r_out
    }

    /// Basis maps in Noll order
    pub fn terms(&self) -> &[Array2<f64>] {
        &self.terms
    }

    /// Mask-weighted L2 norm of each analytically normalized term
    pub fn norms(&self) -> &[f64] {
        &self.norms
    }

    /// Map for Noll index `j` (1-based)
    pub fn term(&self, j: usize) -> Option<&Array2<f64>> {
        j.checked_sub(1).and_then(|i| self.terms.get(i))
    }

    /// Evaluate the analytically normalized term `j` over the full disk `r ≤ R_out`.
    ///
    /// Used to extend a fit across the central obstruction.
    ///
    /// # Errors
    /// * `InvalidParameter` if `j == 0`
    pub fn evaluate_on_disk(&self, j: usize) -> Result<Array2<f64>> {
        let (n, m) = noll_to_nm(j)?;
        let scale = noll_normalization(n, m);
        let (cx, cy, r_out) = (self.center.x, self.center.y, self.r_out);
        Ok(Array2::from_shape_fn(self.shape, |(row, col)| {
            let dx = col as f64 - cx;
            let dy = row as f64 - cy;
            let rho = dx.hypot(dy) / r_out;
            if rho <= 1.0 {
                scale * zernike_value(n, m, rho, dy.atan2(dx))
            } else {
                0.0
            }
        }))
    }
}

/// Normalized polar coordinates `(r/R_out, θ)`, zeroed outside the mask.
pub fn polar_grid(
    shape: (usize, usize),
    mask: &ArrayView2<bool>,
    center: Center,
    r_out: f64,
) -> Array2<(f64, f64)> {
    Array2::from_shape_fn(shape, |(row, col)| {
        if !mask[[row, col]] {
            return (0.0, 0.0);
        }
        let dx = col as f64 - center.x;
        let dy = row as f64 - center.y;
        (dx.hypot(dy) / r_out, dy.atan2(dx))
    })
}
