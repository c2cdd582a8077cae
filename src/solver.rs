//! Dense Gaussian elimination with partial pivoting.
//!
//! Every Newton-Raphson iteration re-assembles `A` from scratch (devices
//! are nonlinear and re-stamped each time), so there is no benefit to the
//! teacher's stateful `analyze`/`factor`/`solve` split that reuses a
//! symbolic factorization across calls — that split exists there to share
//! work with a sparse KLU backend. This is a single `solve_dense` entry
//! point: build a row-major working copy, eliminate, back-substitute.

use crate::error::SolverError;

const PIVOT_EPS: f64 = 1e-15;

/// Solves `a * x = b` for a row-major, `n * n` dense matrix `a` and
/// length-`n` vector `b`, via Gaussian elimination with partial pivoting.
/// `a` and `b` are consumed as working copies; the caller's originals are
/// untouched.
pub fn solve_dense(a: &[f64], b: &[f64], n: usize) -> Result<Vec<f64>, SolverError> {
    if a.len() != n * n {
        return Err(SolverError::DimensionMismatch {
            expected: n * n,
            actual: a.len(),
        });
    }
    if b.len() != n {
        return Err(SolverError::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    let mut m = a.to_vec();
    let mut rhs = b.to_vec();

    for k in 0..n {
        let mut pivot = k;
        let mut pivot_val = m[k * n + k].abs();
        for i in (k + 1)..n {
            let val = m[i * n + k].abs();
            if val > pivot_val {
                pivot_val = val;
                pivot = i;
            }
        }

        if pivot_val < PIVOT_EPS {
            log::warn!("dense solve: singular pivot in column {k} (|pivot|={pivot_val:e})");
            return Err(SolverError::Singular { column: k });
        }

        if pivot != k {
            for j in 0..n {
                m.swap(k * n + j, pivot * n + j);
            }
            rhs.swap(k, pivot);
        }

        let pivot_val = m[k * n + k];
        for i in (k + 1)..n {
            let factor = m[i * n + k] / pivot_val;
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                m[i * n + j] -= factor * m[k * n + j];
            }
            rhs[i] -= factor * rhs[k];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..n {
            sum -= m[i * n + j] * x[j];
        }
        x[i] = sum / m[i * n + i];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_2x2_system() {
        // [3 1][x0]   [9]
        // [1 2][x1] = [8]
        let a = vec![3.0, 1.0, 1.0, 2.0];
        let b = vec![9.0, 8.0];
        let x = solve_dense(&a, &b, 2).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn requires_pivoting() {
        // Zero on the diagonal forces a row swap.
        let a = vec![0.0, 1.0, 1.0, 1.0];
        let b = vec![2.0, 3.0];
        let x = solve_dense(&a, &b, 2).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reports_singular_matrix() {
        let a = vec![1.0, 2.0, 2.0, 4.0];
        let b = vec![1.0, 2.0];
        let err = solve_dense(&a, &b, 2).unwrap_err();
        assert_eq!(err, SolverError::Singular { column: 1 });
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            solve_dense(&a, &b, 2),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn solves_3x3_identity() {
        let a = vec![
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ];
        let b = vec![4.0, 5.0, 6.0];
        let x = solve_dense(&a, &b, 3).unwrap();
        assert_eq!(x, vec![4.0, 5.0, 6.0]);
    }
}
