// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Entropy Engine Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{SsmError, SsmResult};

/// Objective evaluated over the population of shape samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyMode {
    /// Covariance-based differential entropy of the samples.
    #[default]
    Entropy,
    /// Squared distance from the population mean. Annealing is suppressed.
    MeanEnergy,
}

/// How the minimum-variance floor is applied to covariance eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EigenRegularization {
    /// λ' = λ + floor for every eigenvalue.
    #[default]
    Shift,
    /// λ' = max(λ, floor).
    Clamp,
}

/// Which side of the centred feature matrix is eigendecomposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceForm {
    /// Gram form when `num_dims > num_samples`, covariance form otherwise.
    #[default]
    Auto,
    /// samples × samples matrix YᵀY / (n − 1).
    Gram,
    /// dims × dims matrix YYᵀ / (n − 1).
    Covariance,
}

/// Geometric decay of the minimum-variance floor.
///
/// After `horizon` decay events the floor moves from `initial` to
/// `final_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecaySchedule {
    pub initial: f64,
    pub final_value: f64,
    /// Number of decay events (not iterations) to reach `final_value`.
    pub horizon: f64,
}

impl DecaySchedule {
    pub fn new(initial: f64, final_value: f64, horizon: f64) -> Self {
        Self {
            initial,
            final_value,
            horizon,
        }
    }

    pub fn validate(&self) -> SsmResult<()> {
        if !(self.initial.is_finite() && self.initial > 0.0) {
            return Err(SsmError::Configuration(format!(
                "decay initial value must be finite and > 0, got {}",
                self.initial
            )));
        }
        if !(self.final_value.is_finite() && self.final_value > 0.0) {
            return Err(SsmError::Configuration(format!(
                "decay final value must be finite and > 0, got {}",
                self.final_value
            )));
        }
        if !(self.horizon.is_finite() && self.horizon > 0.0) {
            return Err(SsmError::Configuration(format!(
                "decay horizon must be finite and > 0, got {}",
                self.horizon
            )));
        }
        Ok(())
    }

    /// Per-event multiplier: exp(ln(final / initial) / horizon).
    pub fn decay_constant(&self) -> SsmResult<f64> {
        self.validate()?;
        Ok(((self.final_value / self.initial).ln() / self.horizon).exp())
    }
}

/// Configuration of the general entropy gradient engine.
///
/// Per-slot arrays are indexed by the domain's position within its shape
/// (`domain % domains_per_shape`). `attribute_scales` holds one weight per
/// per-particle feature slot, laid out slot by slot in the order
/// xyz → normal → attributes; an empty list means unit weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    pub domains_per_shape: usize,
    pub attributes_per_domain: Vec<usize>,
    pub use_xyz: Vec<bool>,
    pub use_normals: Vec<bool>,
    pub attribute_scales: Vec<f64>,
    pub mode: EnergyMode,
    /// Freeze the minimum-variance floor. A `decay` schedule releases it.
    pub hold_minimum_variance: bool,
    /// Initial floor (overridden by `decay.initial` when a schedule is set).
    pub minimum_variance: f64,
    pub decay: Option<DecaySchedule>,
    /// Iterations between two decay events.
    pub recompute_interval: usize,
    pub regularization: EigenRegularization,
    pub covariance_form: CovarianceForm,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            domains_per_shape: 1,
            attributes_per_domain: vec![0],
            use_xyz: vec![true],
            use_normals: vec![false],
            attribute_scales: Vec::new(),
            mode: EnergyMode::Entropy,
            hold_minimum_variance: true,
            minimum_variance: 1.0e-5,
            decay: None,
            recompute_interval: 5,
            regularization: EigenRegularization::Shift,
            covariance_form: CovarianceForm::Auto,
        }
    }
}

impl EntropyConfig {
    /// Coordinates only, `domains_per_shape` slots, no attributes or normals.
    pub fn xyz_only(domains_per_shape: usize) -> Self {
        Self {
            domains_per_shape,
            attributes_per_domain: vec![0; domains_per_shape],
            use_xyz: vec![true; domains_per_shape],
            use_normals: vec![false; domains_per_shape],
            ..Self::default()
        }
    }

    /// Number of feature values each particle of slot `slot` contributes.
    pub fn features_per_particle(&self, slot: usize) -> usize {
        let mut n = self.attributes_per_domain.get(slot).copied().unwrap_or(0);
        if self.use_xyz.get(slot).copied().unwrap_or(false) {
            n += 3;
        }
        if self.use_normals.get(slot).copied().unwrap_or(false) {
            n += 3;
        }
        n
    }

    /// Index of the first scale weight belonging to `slot`.
    pub fn scale_offset(&self, slot: usize) -> usize {
        (0..slot).map(|j| self.features_per_particle(j)).sum()
    }

    /// Length `attribute_scales` must have when non-empty.
    pub fn scale_count(&self) -> usize {
        self.scale_offset(self.domains_per_shape)
    }

    /// Scale weight of feature `feature` within a particle of slot `slot`.
    #[inline]
    pub fn scale(&self, slot: usize, feature: usize) -> f64 {
        if self.attribute_scales.is_empty() {
            return 1.0;
        }
        self.attribute_scales
            .get(self.scale_offset(slot) + feature)
            .copied()
            .unwrap_or(1.0)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> SsmResult<()> {
        let dps = self.domains_per_shape;
        if dps == 0 {
            return Err(SsmError::Configuration(
                "domains_per_shape must be > 0".to_string(),
            ));
        }
        if self.attributes_per_domain.len() < dps {
            return Err(SsmError::Configuration(format!(
                "attributes_per_domain has {} entries, domains_per_shape is {dps}",
                self.attributes_per_domain.len()
            )));
        }
        if self.use_xyz.len() < dps {
            return Err(SsmError::Configuration(format!(
                "use_xyz has {} entries, domains_per_shape is {dps}",
                self.use_xyz.len()
            )));
        }
        if self.use_normals.len() < dps {
            return Err(SsmError::Configuration(format!(
                "use_normals has {} entries, domains_per_shape is {dps}",
                self.use_normals.len()
            )));
        }
        if !self.attribute_scales.is_empty() && self.attribute_scales.len() != self.scale_count() {
            return Err(SsmError::Configuration(format!(
                "attribute_scales has {} entries, expected {}",
                self.attribute_scales.len(),
                self.scale_count()
            )));
        }
        if let Some(bad) = self.attribute_scales.iter().find(|s| !s.is_finite()) {
            return Err(SsmError::Configuration(format!(
                "attribute_scales must be finite, got {bad}"
            )));
        }
        if self.recompute_interval == 0 {
            return Err(SsmError::Configuration(
                "recompute_interval must be >= 1".to_string(),
            ));
        }
        if !(self.minimum_variance.is_finite() && self.minimum_variance >= 0.0) {
            return Err(SsmError::Configuration(format!(
                "minimum_variance must be finite and >= 0, got {}",
                self.minimum_variance
            )));
        }
        if let Some(schedule) = &self.decay {
            schedule.validate()?;
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> SsmResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SsmError::Configuration(format!("JSON parse error: {e}")))
    }
}
