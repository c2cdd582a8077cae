//! Error taxonomy for the MNA core.
//!
//! Stamp accumulation (`StampContext::add_a`/`add_z`) is deliberately NOT
//! part of this taxonomy: out-of-range indices and zero values are a
//! silent-drop contract, not a failure, so devices can stamp unconditionally
//! (including ground terminals) without per-call error handling.

use thiserror::Error;

/// Failures from building and finalizing a [`crate::circuit::Circuit`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitError {
    /// `StampContext::create`/`Circuit::finalize` was asked to size a
    /// system with zero or negative variables.
    #[error("variable count must be positive, got {0}")]
    InvalidVariableCount(i64),

    /// A topology mutation (`add_node`, `add_device`) or a second
    /// `finalize` was attempted after the circuit was finalized.
    #[error("circuit is already finalized")]
    AlreadyFinalized,

    /// `finalize` was called on a circuit with zero non-ground nodes.
    #[error("circuit has no variables to solve for")]
    NoVariables,
}

/// Failures from the dense linear solve.
#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    /// Partial-pivoting search found no pivot with magnitude >= 1e-15.
    #[error("singular matrix: no usable pivot in column {column}")]
    Singular {
        /// Column where elimination stalled.
        column: usize,
    },

    /// The caller passed mismatched dimensions for `a`/`b`/`n`.
    #[error("dimension mismatch: expected n={expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length supplied.
        actual: usize,
    },
}

/// Failures from the Newton-Raphson DC driver.
#[derive(Debug, Error, PartialEq)]
pub enum NewtonError {
    /// The linear solve failed during an iteration.
    #[error("newton iteration {iteration} failed: {source}")]
    LinearSolveFailed {
        /// Iteration index (0-based) at which the solve failed.
        iteration: usize,
        /// Underlying solver error.
        #[source]
        source: SolverError,
    },

    /// `max_iter` iterations ran without satisfying the convergence test.
    #[error("failed to converge within {max_iter} iterations")]
    DidNotConverge {
        /// Iteration budget that was exhausted.
        max_iter: usize,
    },
}
