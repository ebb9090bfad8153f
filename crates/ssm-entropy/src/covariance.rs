// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Population Covariance & Entropy Updates
// ─────────────────────────────────────────────────────────────────────
//! Y → centred Y → regularized inverse covariance → update matrix.
//!
//! Entropy mode, with Yc the centred features, n samples and floor α:
//!
//!   Gram form:        G = YcᵀYc / (n−1) = V Λ Vᵀ,  U = Yc · V f(Λ)⁻¹ Vᵀ
//!   Covariance form:  C = YcYcᵀ / (n−1) = W Λ Wᵀ,  U = W f(Λ)⁻¹ Wᵀ · Yc
//!   Energy:           E = ½ Σ ln f(λᵢ) over the min(d, n) largest λ
//!
//! Both forms share their nonzero spectrum, so U and E agree. Mean-energy
//! mode uses U = Yc and E = ½‖Yc‖².

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use ssm_types::{CovarianceForm, EigenRegularization, EnergyMode, EntropyConfig};

use crate::matrix::FeatureMatrix;
use crate::spectral::SymmetricEigen;

/// How the last update computation went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateDiagnostic {
    /// Eigenvalues were regularized; `below_floor` of them sat under α.
    Regularized { below_floor: usize },
    /// Every eigenvalue was under α; the floor alone shapes the update.
    AllBelowFloor,
    /// Mean-energy mode, no eigendecomposition.
    MeanEnergy,
    /// Fewer than two samples: zero update.
    TooFewSamples { samples: usize },
    /// Non-finite features or solver failure: zero update.
    Degenerate { reason: String },
    /// No rows or no columns.
    Empty,
}

impl UpdateDiagnostic {
    /// True when the update was replaced by zeros.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            UpdateDiagnostic::TooFewSamples { .. }
                | UpdateDiagnostic::Degenerate { .. }
                | UpdateDiagnostic::Empty
        )
    }
}

/// Result of one update computation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Same shape as Y; column j is the feature-space gradient of shape j.
    pub update: FeatureMatrix,
    /// Per-row sample mean of Y.
    pub mean: Vec<f64>,
    pub energy: f64,
    /// Smallest regularized eigenvalue (E/2 in mean-energy mode).
    pub minimum_eigenvalue: f64,
    pub diagnostic: UpdateDiagnostic,
    /// Formulation actually used (entropy mode only).
    pub form: Option<CovarianceForm>,
}

impl UpdateOutcome {
    fn fallback(rows: usize, cols: usize, mean: Vec<f64>, diagnostic: UpdateDiagnostic) -> Self {
        Self {
            update: FeatureMatrix::zeros(rows, cols),
            mean,
            energy: 0.0,
            minimum_eigenvalue: 0.0,
            diagnostic,
            form: None,
        }
    }
}

/// Per-row sample mean.
pub fn row_means(y: &FeatureMatrix) -> Vec<f64> {
    let (d, n) = (y.rows(), y.cols());
    let mut mean = vec![0.0; d];
    if n == 0 {
        return mean;
    }
    for col in y.columns() {
        for (m, v) in mean.iter_mut().zip(col) {
            *m += v;
        }
    }
    let inv_n = 1.0 / n as f64;
    for m in mean.iter_mut() {
        *m *= inv_n;
    }
    mean
}

/// Y with `mean` subtracted from every column.
pub fn centered(y: &FeatureMatrix, mean: &[f64]) -> FeatureMatrix {
    let columns = y
        .columns()
        .map(|col| col.iter().zip(mean).map(|(v, m)| v - m).collect::<Vec<f64>>())
        .collect();
    FeatureMatrix::from_columns(y.rows(), columns)
}

/// d×d row-major sample covariance YcYcᵀ / (n−1). Zeros when n < 2.
pub fn population_covariance(y: &FeatureMatrix) -> Vec<f64> {
    let mean = row_means(y);
    covariance_form(&centered(y, &mean))
}

fn covariance_form(yc: &FeatureMatrix) -> Vec<f64> {
    let (d, n) = (yc.rows(), yc.cols());
    let mut c = vec![0.0; d * d];
    if n < 2 {
        return c;
    }
    let inv = 1.0 / (n - 1) as f64;
    for col in yc.columns() {
        for a in 0..d {
            let va = col[a];
            if va == 0.0 {
                continue;
            }
            for b in a..d {
                c[a * d + b] += va * col[b];
            }
        }
    }
    for a in 0..d {
        for b in a..d {
            let v = c[a * d + b] * inv;
            c[a * d + b] = v;
            c[b * d + a] = v;
        }
    }
    c
}

fn gram_form(yc: &FeatureMatrix) -> Vec<f64> {
    let n = yc.cols();
    let mut g = vec![0.0; n * n];
    if n < 2 {
        return g;
    }
    let inv = 1.0 / (n - 1) as f64;
    for i in 0..n {
        let ci = yc.column(i);
        for j in i..n {
            let v = ci.iter().zip(yc.column(j)).map(|(a, b)| a * b).sum::<f64>() * inv;
            g[i * n + j] = v;
            g[j * n + i] = v;
        }
    }
    g
}

/// Regularized eigenvalue. Small negative λ from round-off count as 0.
#[inline]
pub fn regularize(lambda: f64, floor: f64, policy: EigenRegularization) -> f64 {
    let lambda = lambda.max(0.0);
    match policy {
        EigenRegularization::Shift => lambda + floor,
        EigenRegularization::Clamp => lambda.max(floor),
    }
}

/// Gram form when dims exceed samples, covariance form otherwise.
pub fn resolve_form(form: CovarianceForm, num_dims: usize, num_samples: usize) -> CovarianceForm {
    match form {
        CovarianceForm::Auto if num_dims > num_samples => CovarianceForm::Gram,
        CovarianceForm::Auto => CovarianceForm::Covariance,
        explicit => explicit,
    }
}

/// Compute the update matrix for Y under `config` and floor `floor`.
///
/// Never fails: degenerate inputs produce a zero update and a diagnostic.
pub fn compute_updates(y: &FeatureMatrix, floor: f64, config: &EntropyConfig) -> UpdateOutcome {
    let (d, n) = (y.rows(), y.cols());
    let mean = row_means(y);

    if d == 0 || n == 0 {
        return UpdateOutcome::fallback(d, n, mean, UpdateDiagnostic::Empty);
    }
    if !y.all_finite() {
        log::warn!("feature matrix contains non-finite values; using zero update");
        return UpdateOutcome::fallback(
            d,
            n,
            mean,
            UpdateDiagnostic::Degenerate {
                reason: "non-finite feature values".to_string(),
            },
        );
    }

    let yc = centered(y, &mean);

    match config.mode {
        EnergyMode::MeanEnergy => mean_energy_updates(yc, mean),
        EnergyMode::Entropy => {
            if n < 2 {
                log::warn!("entropy undefined for {n} sample(s); using zero update");
                return UpdateOutcome::fallback(
                    d,
                    n,
                    mean,
                    UpdateDiagnostic::TooFewSamples { samples: n },
                );
            }
            let form = resolve_form(config.covariance_form, d, n);
            entropy_updates(yc, mean, floor, config.regularization, form)
        }
    }
}

fn mean_energy_updates(yc: FeatureMatrix, mean: Vec<f64>) -> UpdateOutcome {
    let energy = 0.5 * yc.frobenius_sq();
    let diagnostic = if yc.cols() < 2 {
        UpdateDiagnostic::TooFewSamples {
            samples: yc.cols(),
        }
    } else {
        UpdateDiagnostic::MeanEnergy
    };
    UpdateOutcome {
        update: yc,
        mean,
        energy,
        minimum_eigenvalue: energy / 2.0,
        diagnostic,
        form: None,
    }
}

fn entropy_updates(
    yc: FeatureMatrix,
    mean: Vec<f64>,
    floor: f64,
    policy: EigenRegularization,
    form: CovarianceForm,
) -> UpdateOutcome {
    let (d, n) = (yc.rows(), yc.cols());
    let (matrix, size) = match form {
        CovarianceForm::Gram => (gram_form(&yc), n),
        _ => (covariance_form(&yc), d),
    };

    let eig = match SymmetricEigen::decompose(&matrix, size) {
        Ok(eig) => eig,
        Err(e) => {
            log::warn!("covariance eigendecomposition failed ({e}); using zero update");
            return UpdateOutcome::fallback(
                d,
                n,
                mean,
                UpdateDiagnostic::Degenerate {
                    reason: e.to_string(),
                },
            );
        }
    };

    let regularized: Vec<f64> = eig
        .values
        .iter()
        .map(|&l| regularize(l, floor, policy))
        .collect();

    // Energy over the spectrum both forms share
    let k = d.min(n);
    let top = &regularized[..k];
    if top.iter().all(|&v| v <= 0.0) {
        log::warn!("covariance is singular and the variance floor is zero; using zero update");
        return UpdateOutcome::fallback(
            d,
            n,
            mean,
            UpdateDiagnostic::Degenerate {
                reason: "all regularized eigenvalues are zero".to_string(),
            },
        );
    }
    let energy = 0.5 * top.iter().filter(|&&v| v > 0.0).map(|v| v.ln()).sum::<f64>();
    let minimum_eigenvalue = top
        .iter()
        .copied()
        .filter(|&v| v > 0.0)
        .fold(f64::INFINITY, f64::min);

    let below_floor = eig.values[..k].iter().filter(|&&l| l < floor).count();
    let diagnostic = if below_floor == k {
        log::debug!("all {k} covariance eigenvalues below floor {floor:.3e}");
        UpdateDiagnostic::AllBelowFloor
    } else {
        UpdateDiagnostic::Regularized { below_floor }
    };

    // Pseudo-inverse: directions with a zero regularized eigenvalue carry
    // no centred data and are dropped.
    let inverse: Vec<f64> = regularized
        .iter()
        .map(|&v| if v > 0.0 { 1.0 / v } else { 0.0 })
        .collect();
    let m = eig.reconstruct_with(&inverse);

    let columns: Vec<Vec<f64>> = match form {
        CovarianceForm::Gram => (0..n)
            .into_par_iter()
            .map(|j| {
                let mut out = vec![0.0; d];
                for i in 0..n {
                    let w = m[i * n + j];
                    if w == 0.0 {
                        continue;
                    }
                    for (o, v) in out.iter_mut().zip(yc.column(i)) {
                        *o += w * v;
                    }
                }
                out
            })
            .collect(),
        _ => (0..n)
            .into_par_iter()
            .map(|j| {
                let col = yc.column(j);
                (0..d)
                    .map(|a| {
                        m[a * d..(a + 1) * d]
                            .iter()
                            .zip(col)
                            .map(|(x, y)| x * y)
                            .sum::<f64>()
                    })
                    .collect::<Vec<f64>>()
            })
            .collect(),
    };

    UpdateOutcome {
        update: FeatureMatrix::from_columns(d, columns),
        mean,
        energy,
        minimum_eigenvalue,
        diagnostic,
        form: Some(form),
    }
}
