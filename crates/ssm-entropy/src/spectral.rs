// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Symmetric Eigensolver
// ─────────────────────────────────────────────────────────────────────
//! Pure-Rust cyclic Jacobi eigensolver for the population covariance.
//!
//! The matrix handed in is always the smaller of the Gram and covariance
//! forms, so n stays around the sample count and a few sweeps suffice.

use ssm_types::{SsmError, SsmResult};

const MAX_SWEEPS: usize = 60;
const TOL: f64 = 1e-14;
/// Accepted residual (relative) when the sweep budget runs out.
const LOOSE_TOL: f64 = 1e-9;

/// Eigenpairs of a symmetric matrix.
///
/// `values` are descending. `vectors` is n×n row-major with one
/// eigenvector per column, matching `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    pub n: usize,
    pub values: Vec<f64>,
    pub vectors: Vec<f64>,
}

impl SymmetricEigen {
    /// Decompose the n×n row-major symmetric matrix `a`.
    pub fn decompose(a: &[f64], n: usize) -> SsmResult<Self> {
        if a.len() != n * n {
            return Err(SsmError::NumericInstability(format!(
                "eigen input has {} entries, expected {}",
                a.len(),
                n * n
            )));
        }
        if let Some(idx) = a.iter().position(|v| !v.is_finite()) {
            return Err(SsmError::NumericInstability(format!(
                "non-finite entry at ({}, {}) in eigen input",
                idx / n,
                idx % n
            )));
        }

        let mut work = a.to_vec();
        let mut values = vec![0.0; n];
        let mut vectors = vec![0.0; n * n];
        jacobi_eigen_symmetric(&mut work, n, &mut values, &mut vectors)?;
        sort_eigenpairs_descending(&mut values, &mut vectors, n);

        Ok(Self { n, values, vectors })
    }

    /// Component `row` of eigenvector `col`.
    #[inline]
    pub fn vector(&self, row: usize, col: usize) -> f64 {
        self.vectors[row * self.n + col]
    }

    /// V · diag(w) · Vᵀ, n×n row-major.
    pub fn reconstruct_with(&self, weights: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let mut acc = 0.0;
                for (k, w) in weights.iter().enumerate().take(n) {
                    acc += self.vector(i, k) * w * self.vector(j, k);
                }
                out[i * n + j] = acc;
                out[j * n + i] = acc;
            }
        }
        out
    }
}

/// Sort eigenvalues descending, rearranging eigenvector columns accordingly.
fn sort_eigenpairs_descending(eigvals: &mut [f64], eigvecs: &mut [f64], n: usize) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        eigvals[b]
            .partial_cmp(&eigvals[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let sorted_vals: Vec<f64> = indices.iter().map(|&i| eigvals[i]).collect();
    eigvals[..n].copy_from_slice(&sorted_vals);

    let old_vecs = eigvecs.to_vec();
    for (new_col, &old_col) in indices.iter().enumerate() {
        for row in 0..n {
            eigvecs[row * n + new_col] = old_vecs[row * n + old_col];
        }
    }
}

/// Cyclic Jacobi eigendecomposition for a symmetric n×n matrix.
///
/// `a` is n×n row-major (destroyed; its diagonal becomes the eigenvalues).
/// `eigvals_out` receives the n eigenvalues (unsorted).
/// `v_out` receives the n×n eigenvector matrix (columns = eigenvectors).
fn jacobi_eigen_symmetric(
    a: &mut [f64],
    n: usize,
    eigvals_out: &mut [f64],
    v_out: &mut [f64],
) -> SsmResult<()> {
    // V = I
    for i in 0..n {
        for j in 0..n {
            v_out[i * n + j] = if i == j { 1.0 } else { 0.0 };
        }
    }

    let scale = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        eigvals_out[..n].fill(0.0);
        return Ok(());
    }

    let mut max_off = off_diagonal_max(a, n);
    let mut sweep = 0;
    while max_off >= TOL * scale {
        if sweep == MAX_SWEEPS {
            if max_off < LOOSE_TOL * scale {
                log::debug!(
                    "jacobi: sweep budget exhausted, accepting residual {max_off:.3e} (scale {scale:.3e})"
                );
                break;
            }
            return Err(SsmError::NumericInstability(format!(
                "jacobi did not converge in {MAX_SWEEPS} sweeps (residual {max_off:.3e})"
            )));
        }

        // Skip tiny rotations during the first sweeps
        let threshold = if sweep < 4 {
            0.2 * max_off / (n * n) as f64
        } else {
            0.0
        };

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 || apq.abs() < threshold {
                    continue;
                }

                let app = a[p * n + p];
                let aqq = a[q * n + q];
                let diff = aqq - app;

                // Equal diagonals: rotate by π/4
                let t = if diff.abs() < 1e-300 {
                    if apq > 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                } else {
                    let tau = diff / (2.0 * apq);
                    // Smaller root
                    if tau >= 0.0 {
                        1.0 / (tau + (1.0 + tau * tau).sqrt())
                    } else {
                        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                    }
                };

                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;
                let tau_rot = s / (1.0 + c); // Rutishauser form

                // Diagonal
                a[p * n + p] -= t * apq;
                a[q * n + q] += t * apq;
                a[p * n + q] = 0.0;
                a[q * n + p] = 0.0;

                // Rows/cols p and q
                for r in 0..n {
                    if r == p || r == q {
                        continue;
                    }
                    let arp = a[r * n + p];
                    let arq = a[r * n + q];
                    a[r * n + p] = arp - s * (arq + tau_rot * arp);
                    a[p * n + r] = a[r * n + p];
                    a[r * n + q] = arq + s * (arp - tau_rot * arq);
                    a[q * n + r] = a[r * n + q];
                }

                // Accumulate the rotation into V
                for r in 0..n {
                    let vrp = v_out[r * n + p];
                    let vrq = v_out[r * n + q];
                    v_out[r * n + p] = vrp - s * (vrq + tau_rot * vrp);
                    v_out[r * n + q] = vrq + s * (vrp - tau_rot * vrq);
                }
            }
        }

        max_off = off_diagonal_max(a, n);
        sweep += 1;
    }

    for i in 0..n {
        eigvals_out[i] = a[i * n + i];
    }
    Ok(())
}

fn off_diagonal_max(a: &[f64], n: usize) -> f64 {
    let mut max_off = 0.0f64;
    for p in 0..n {
        for q in (p + 1)..n {
            max_off = max_off.max(a[p * n + q].abs());
        }
    }
    max_off
}
