//! Iterative refinement of pupil geometry, focus distance and pointing.
//!
//! The refiner repeats registration, wavefront solution and a four-term
//! (piston, tilt, defocus) fit. After each fit the defocus amplitude is
//! turned into a focal shift `ΔF = 16·(f/D)²·c₄`, where `c₄` is the
//! coefficient of `2r² − 1`, which updates the defocus distance and the
//! effective pupil radius; the tilt amplitudes are turned into an image
//! displacement `4·a·f/(D·pixel)` and both frames are shifted back by it.
//!
//! Iteration stops as soon as the tilt X, tilt Y and defocus amplitudes
//! move less than [`RefinementConfig::tolerance`] between two iterations
//! (the first iteration compares against zero), or after
//! [`RefinementConfig::max_iterations`].
//!
//! [`RefinementConfig::tolerance`]: crate::config::RefinementConfig::tolerance
//! [`RefinementConfig::max_iterations`]: crate::config::RefinementConfig::max_iterations

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::config::{ObstructionMode, PipelineConfig};
use crate::error::{ensure_same_shape, Result, RoddierError};
use crate::image_proc::{normalized_difference, shift_image, ShiftVector};
use crate::registration::{build_annular_mask, register, Center, PupilGeometry};
use crate::solver::{PhysicalScale, WavefrontSolver};
use crate::zernike::{fit, noll_normalization, BasisSize, FitResult, ZernikeBasis};

/// Shifts smaller than this (pixels) are not applied.
const MIN_TILT_SHIFT_PX: f64 = 1.0e-3;

/// Where the refiner is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementState {
    /// Nothing computed yet
    Initial,
    /// Next step registers the frames
    Registering { iteration: usize },
    /// Next step solves and fits the low-order terms
    Solving { iteration: usize },
    /// Next step applies the focus and tilt corrections
    Correcting { iteration: usize },
    /// Low-order terms stopped changing
    Converged { iterations: usize },
    /// Iteration cap reached before convergence
    Exhausted { iterations: usize },
}

impl RefinementState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefinementState::Converged { .. } | RefinementState::Exhausted { .. }
        )
    }
}

/// How the refinement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    Converged,
    Exhausted,
}

/// Per-iteration diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub center: Center,
    pub r_out: f64,
    pub defocus_mm: f64,
    /// Shift registration applied to the extra-focal frame this iteration
    pub shift: ShiftVector,
    /// Noll amplitudes (wavefront units) of tilt X, tilt Y and defocus
    pub tilt_x: f64,
    pub tilt_y: f64,
    pub defocus: f64,
    /// Largest amplitude change since the previous iteration
    pub change: f64,
}

/// Final state of a finished refinement.
#[derive(Debug, Clone)]
pub struct RefinementResult {
    /// Wavefront in millimetres of optical path, zero outside `mask`
    pub wavefront: Array2<f64>,
    /// Normalized intensity difference the wavefront was solved from
    pub delta: Array2<f64>,
    pub mask: Array2<bool>,
    pub geometry: PupilGeometry,
    pub defocus_mm: f64,
    /// Frames after all pointing corrections (extra-focal aligned onto intra-focal)
    pub intra: Array2<f64>,
    pub extra: Array2<f64>,
    /// Four-term fit of the final iteration
    pub low_order: FitResult,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub history: Vec<IterationRecord>,
}

impl RefinementResult {
    pub fn center(&self) -> Center {
        self.geometry.center
    }

    pub fn r_out(&self) -> f64 {
        self.geometry.r_out
    }

    pub fn converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }

    /// Total shift registration applied to the extra-focal frame across all
    /// iterations. Tilt corrections move both frames and are not included.
    pub fn registration_shift(&self) -> ShiftVector {
        self.history
            .iter()
            .fold(ShiftVector::default(), |acc, record| {
                ShiftVector::new(acc.dy + record.shift.dy, acc.dx + record.shift.dx)
            })
    }
}

#[derive(Debug, Clone)]
struct Registered {
    geometry: PupilGeometry,
    shift: ShiftVector,
    mask: Array2<bool>,
    delta: Array2<f64>,
    intra: Array2<f64>,
    extra: Array2<f64>,
    defocus_mm: f64,
}

#[derive(Debug, Clone)]
struct Solved {
    wavefront: Array2<f64>,
    fit: FitResult,
}

#[derive(Debug)]
enum Stage {
    Initial,
    Registering {
        iteration: usize,
    },
    Solving {
        iteration: usize,
        registered: Registered,
    },
    Correcting {
        iteration: usize,
        registered: Registered,
        solved: Solved,
    },
    Done {
        iterations: usize,
        status: ConvergenceStatus,
        registered: Registered,
        solved: Solved,
    },
}

/// Registration → solve → low-order fit → correction state machine.
///
/// Drive it one transition at a time with [`step`](Self::step) or to the
/// end with [`run`](Self::run). A failed step resets the refiner to
/// [`RefinementState::Initial`] with the original frames.
#[derive(Debug)]
pub struct IterativeRefiner<'a> {
    config: &'a PipelineConfig,
    solver: WavefrontSolver,
    original: (Array2<f64>, Array2<f64>),
    intra: Array2<f64>,
    extra: Array2<f64>,
    defocus_mm: Option<f64>,
    radius_override: Option<f64>,
    previous: [f64; 3],
    history: Vec<IterationRecord>,
    stage: Stage,
}

impl<'a> IterativeRefiner<'a> {
    /// # Errors
    /// * `ShapeMismatch` if the frames differ in shape
    pub fn new(
        intra: &ArrayView2<f64>,
        extra: &ArrayView2<f64>,
        config: &'a PipelineConfig,
    ) -> Result<Self> {
        ensure_same_shape("extra-focal image", intra.dim(), extra.dim())?;
        Ok(Self {
            config,
            solver: WavefrontSolver::new(),
            original: (intra.to_owned(), extra.to_owned()),
            intra: intra.to_owned(),
            extra: extra.to_owned(),
            defocus_mm: None,
            radius_override: None,
            previous: [0.0; 3],
            history: Vec::new(),
            stage: Stage::Initial,
        })
    }

    pub fn state(&self) -> RefinementState {
        match &self.stage {
            Stage::Initial => RefinementState::Initial,
            Stage::Registering { iteration } => RefinementState::Registering {
                iteration: *iteration,
            },
            Stage::Solving { iteration, .. } => RefinementState::Solving {
                iteration: *iteration,
            },
            Stage::Correcting { iteration, .. } => RefinementState::Correcting {
                iteration: *iteration,
            },
            Stage::Done {
                iterations, status, ..
            } => match status {
                ConvergenceStatus::Converged => RefinementState::Converged {
                    iterations: *iterations,
                },
                ConvergenceStatus::Exhausted => RefinementState::Exhausted {
                    iterations: *iterations,
                },
            },
        }
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Advance by one transition and return the new state.
    ///
    /// Terminal states are returned unchanged.
    pub fn step(&mut self) -> Result<RefinementState> {
        let stage = std::mem::replace(&mut self.stage, Stage::Initial);
        match self.advance(stage) {
            Ok(next) => {
                self.stage = next;
                Ok(self.state())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Step until a terminal state and return the result.
    pub fn run(mut self) -> Result<RefinementResult> {
        while !self.state().is_terminal() {
            self.step()?;
        }
        self.into_result()
    }

    /// Result of a finished refinement.
    ///
    /// # Errors
    /// * `InvalidParameter` if the refiner has not reached a terminal state
    pub fn into_result(self) -> Result<RefinementResult> {
        match self.stage {
            Stage::Done {
                iterations,
                status,
                registered,
                solved,
            } => Ok(RefinementResult {
                wavefront: solved.wavefront,
                delta: registered.delta,
                mask: registered.mask,
                geometry: registered.geometry,
                defocus_mm: registered.defocus_mm,
                intra: registered.intra,
                extra: registered.extra,
                low_order: solved.fit,
                status,
                iterations,
                history: self.history,
            }),
            _ => Err(RoddierError::InvalidParameter(
                "refinement has not finished".into(),
            )),
        }
    }

    fn reset(&mut self) {
        self.intra = self.original.0.clone();
        self.extra = self.original.1.clone();
        self.defocus_mm = None;
        self.radius_override = None;
        self.previous = [0.0; 3];
        self.history.clear();
        self.stage = Stage::Initial;
    }

    fn advance(&mut self, stage: Stage) -> Result<Stage> {
        match stage {
            Stage::Initial => Ok(Stage::Registering { iteration: 1 }),
            Stage::Registering { iteration } => Ok(Stage::Solving {
                iteration,
                registered: self.register()?,
            }),
            Stage::Solving {
                iteration,
                registered,
            } => {
                let solved = self.solve(&registered)?;
                let change = self.record(iteration, &registered, &solved);
                if change <= self.config.refinement.tolerance {
                    log::info!("refinement converged after {iteration} iteration(s)");
                    Ok(Stage::Done {
                        iterations: iteration,
                        status: ConvergenceStatus::Converged,
                        registered,
                        solved,
                    })
                } else {
                    Ok(Stage::Correcting {
                        iteration,
                        registered,
                        solved,
                    })
                }
            }
            Stage::Correcting {
                iteration,
                registered,
                solved,
            } => {
                if iteration >= self.config.refinement.max_iterations {
                    log::warn!("refinement exhausted after {iteration} iteration(s)");
                    return Ok(Stage::Done {
                        iterations: iteration,
                        status: ConvergenceStatus::Exhausted,
                        registered,
                        solved,
                    });
                }
                self.correct(&registered, &solved);
                Ok(Stage::Registering {
                    iteration: iteration + 1,
                })
            }
            done @ Stage::Done { .. } => Ok(done),
        }
    }

    fn register(&mut self) -> Result<Registered> {
        let reg = register(
            &self.intra.view(),
            &self.extra.view(),
            &self.config.registration,
        )?;
        let mut geometry = reg.geometry;
        let mask = match self.radius_override {
            Some(r_out) => {
                geometry.r_in = match self.config.registration.obstruction {
                    ObstructionMode::Physical { ratio } => ratio * r_out,
                    ObstructionMode::Auto => geometry.r_in.min(r_out),
                };
                geometry.r_out = r_out;
                build_annular_mask(geometry.center, geometry.r_in, r_out, reg.intra.dim())?
            }
            None => reg.mask,
        };
        if geometry.r_out < self.config.refinement.min_radius_px {
            return Err(RoddierError::DegeneratePupil(format!(
                "pupil radius {:.2} px is below the {:.2} px minimum",
                geometry.r_out, self.config.refinement.min_radius_px
            )));
        }

        let telescope = &self.config.telescope;
        let defocus_mm = *self
            .defocus_mm
            .get_or_insert_with(|| telescope.defocus_from_radius_mm(geometry.r_out));

        let mut delta = normalized_difference(&reg.intra.view(), &reg.extra.view())?;
        Zip::from(&mut delta).and(&mask).for_each(|d, &inside| {
            if !inside {
                *d = 0.0;
            }
        });

        Ok(Registered {
            geometry,
            shift: reg.shift,
            mask,
            delta,
            intra: reg.intra,
            extra: reg.extra,
            defocus_mm,
        })
    }

    fn solve(&self, registered: &Registered) -> Result<Solved> {
        let scale = PhysicalScale::new(
            self.config.telescope.wavelength_mm(),
            registered.defocus_mm,
        );
        let wavefront = self
            .solver
            .solve(&registered.delta.view(), &registered.mask.view(), Some(scale))?
            .wavefront;
        let basis = ZernikeBasis::generate(
            wavefront.dim(),
            &registered.mask.view(),
            registered.geometry.r_out,
            registered.geometry.center,
            BasisSize::Terms(4),
        )?;
        let fit = fit(&wavefront.view(), &registered.mask.view(), &basis)?;
        Ok(Solved { wavefront, fit })
    }

    fn record(&mut self, iteration: usize, registered: &Registered, solved: &Solved) -> f64 {
        let current = [
            solved.fit.amplitude(2),
            solved.fit.amplitude(3),
            solved.fit.amplitude(4),
        ];
        let change = current
            .iter()
            .zip(self.previous.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        self.previous = current;

        log::info!(
            "iteration {iteration}: R_out {:.2} px, dz {:.4} mm, tilt ({:.3e}, {:.3e}), defocus {:.3e}, change {:.3e}",
            registered.geometry.r_out,
            registered.defocus_mm,
            current[0],
            current[1],
            current[2],
            change
        );
        self.history.push(IterationRecord {
            iteration,
            center: registered.geometry.center,
            r_out: registered.geometry.r_out,
            defocus_mm: registered.defocus_mm,
            shift: registered.shift,
            tilt_x: current[0],
            tilt_y: current[1],
            defocus: current[2],
            change,
        });
        change
    }

    fn correct(&mut self, registered: &Registered, solved: &Solved) {
        let telescope = &self.config.telescope;

        let defocus_coefficient = solved.fit.amplitude(4) * noll_normalization(2, 0);
        let focal_shift = 16.0 * telescope.focal_ratio().powi(2) * defocus_coefficient;
        let new_defocus = registered.defocus_mm + focal_shift;
        let new_radius = telescope.radius_from_defocus_px(new_defocus);
        let (rows, cols) = registered.mask.dim();
        let max_radius = 0.5 * (rows as f64).hypot(cols as f64);
        if new_radius.is_finite()
            && new_radius >= self.config.refinement.min_radius_px
            && new_radius <= max_radius
        {
            self.defocus_mm = Some(new_defocus);
            self.radius_override = Some(new_radius);
        } else {
            log::warn!(
                "rejected focus correction: dz {new_defocus:.4} mm gives radius {new_radius:.2} px"
            );
        }

        let px_per_amplitude = 4.0 * telescope.focal_mm
            / (telescope.aperture_mm * telescope.effective_pixel_size_mm());
        let shift = ShiftVector::new(
            solved.fit.amplitude(3) * px_per_amplitude,
            solved.fit.amplitude(2) * px_per_amplitude,
        )
        .negated();
        if shift.magnitude() >= MIN_TILT_SHIFT_PX && shift.magnitude().is_finite() {
            log::debug!("nulling tilt with shift dy={:.3} dx={:.3}", shift.dy, shift.dx);
            self.intra = shift_image(&registered.intra.view(), shift);
            self.extra = shift_image(&registered.extra.view(), shift);
        } else {
            self.intra = registered.intra.clone();
            self.extra = registered.extra.clone();
        }
    }
}

/// Run the refiner to completion.
pub fn refine(
    intra: &ArrayView2<f64>,
    extra: &ArrayView2<f64>,
    config: &PipelineConfig,
) -> Result<RefinementResult> {
    IterativeRefiner::new(intra, extra, config)?.run()
}
