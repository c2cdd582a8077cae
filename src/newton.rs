//! The DC Newton-Raphson driver.
//!
//! Relies solely on the convergence tolerance test and runs up to
//! `max_iter` iterations — it does not special-case or short-circuit after
//! the first iteration, so nonlinear (diode-bearing) networks keep
//! iterating until they actually satisfy the tolerance rather than being
//! assumed converged after one linear solve.

use crate::circuit::Circuit;
use crate::device::IterState;
use crate::error::NewtonError;
use crate::mna::StampContext;
use crate::solver::solve_dense;

/// Convergence and iteration-budget configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonConfig {
    pub max_iter: usize,
    pub tol_abs: f64,
    pub tol_rel: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol_abs: 1e-9,
            tol_rel: 1e-6,
        }
    }
}

/// Outcome of a converged (or exhausted) DC analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonReport {
    pub iterations: usize,
    pub converged: bool,
}

/// Runs the DC Newton-Raphson loop against a finalized circuit, writing
/// the solution into `x` (length `circuit.num_vars()`, zero-initialized by
/// this function). Returns the iteration count and convergence status, or
/// a [`NewtonError`] if the linear solve fails or the budget is exhausted.
pub fn run_dc(
    circuit: &Circuit,
    x: &mut Vec<f64>,
    config: &NewtonConfig,
) -> Result<NewtonReport, NewtonError> {
    let n = circuit.num_vars();
    x.clear();
    x.resize(n, 0.0);

    let mut ctx = StampContext::create(n as i64).expect("circuit.num_vars() is always positive");

    for iter in 0..config.max_iter {
        ctx.reset();
        let iter_state = IterState {
            iter,
            x_current: x,
            tol_abs: config.tol_abs,
            tol_rel: config.tol_rel,
        };
        for device in circuit.devices() {
            device.stamp_nonlinear(&mut ctx, &iter_state);
        }

        let mut a = vec![0.0; n * n];
        ctx.assemble_dense(&mut a);
        let z = ctx.z().to_vec();

        let x_new = solve_dense(&a, &z, n).map_err(|source| {
            log::warn!("newton iteration {iter} hit a singular system");
            NewtonError::LinearSolveFailed { iteration: iter, source }
        })?;

        let converged = x
            .iter()
            .zip(x_new.iter())
            .all(|(old, new)| (new - old).abs() <= config.tol_abs + config.tol_rel * new.abs());

        x.copy_from_slice(&x_new);
        log::trace!("newton iteration {iter}: converged={converged}");

        if converged {
            return Ok(NewtonReport {
                iterations: iter + 1,
                converged: true,
            });
        }
    }

    Err(NewtonError::DidNotConverge {
        max_iter: config.max_iter,
    })
}
