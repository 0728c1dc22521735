//! Noll indexing, radial polynomials and mode names.

use crate::error::{Result, RoddierError};

/// Radial order `n` and signed azimuthal frequency `m` of Noll index `j` (1-based).
///
/// Even `j` carry `m > 0` (cosine terms), odd `j` carry `m < 0` (sine terms).
///
/// # Errors
/// * `InvalidParameter` if `j == 0`
pub fn noll_to_nm(j: usize) -> Result<(usize, i32)> {
    if j == 0 {
        return Err(RoddierError::InvalidParameter(
            "Noll indices start at 1".into(),
        ));
    }
    let mut n = 0usize;
    let mut j1 = j - 1;
    while j1 > n {
        n += 1;
        j1 -= n;
    }
    let magnitude = (n % 2) + 2 * ((j1 + (n + 1) % 2) / 2);
    let m = magnitude as i32;
    Ok(if j % 2 == 0 { (n, m) } else { (n, -m) })
}

/// Number of Noll terms with radial order ≤ `order`.
pub fn terms_for_order(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

/// Analytic normalization so each term has unit RMS over the unit disk.
pub fn noll_normalization(n: usize, m: i32) -> f64 {
    if m == 0 {
        ((n + 1) as f64).sqrt()
    } else {
        (2.0 * (n + 1) as f64).sqrt()
    }
}

fn factorial(k: usize) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * i as f64)
}

/// Radial polynomial `R_n^|m|(rho)` from the finite factorial sum.
pub fn radial_polynomial(n: usize, m: i32, rho: f64) -> f64 {
    let m = m.unsigned_abs() as usize;
    if m > n || (n - m) % 2 != 0 {
        return 0.0;
    }
    (0..=(n - m) / 2)
        .map(|k| {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let coeff = sign * factorial(n - k)
                / (factorial(k) * factorial((n + m) / 2 - k) * factorial((n - m) / 2 - k));
            coeff * rho.powi((n - 2 * k) as i32)
        })
        .sum()
}

/// Unnormalized Zernike term `R_n^|m|(rho)·{cos(mθ), sin(|m|θ), 1}`.
pub fn zernike_value(n: usize, m: i32, rho: f64, theta: f64) -> f64 {
    let radial = radial_polynomial(n, m, rho);
    match m {
        0 => radial,
        m if m > 0 => radial * (m as f64 * theta).cos(),
        m => radial * ((-m) as f64 * theta).sin(),
    }
}

const MODE_NAMES: [&str; 22] = [
    "Piston",
    "Tilt X",
    "Tilt Y",
    "Defocus",
    "Astigmatism 45°",
    "Astigmatism 0°",
    "Coma Y",
    "Coma X",
    "Trefoil Y",
    "Trefoil X",
    "Primary spherical",
    "Secondary astigmatism 0°",
    "Secondary astigmatism 45°",
    "Tetrafoil X",
    "Tetrafoil Y",
    "Secondary coma X",
    "Secondary coma Y",
    "Secondary trefoil X",
    "Secondary trefoil Y",
    "Pentafoil X",
    "Pentafoil Y",
    "Secondary spherical",
];

/// Human-readable name of Noll term `j`, `Z{j}` past the named range.
pub fn mode_name(j: usize) -> String {
    match j.checked_sub(1).and_then(|i| MODE_NAMES.get(i)) {
        Some(name) => (*name).to_string(),
        None => format!("Z{j}"),
    }
}
