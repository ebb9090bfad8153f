// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — General Entropy Gradient Function
// ─────────────────────────────────────────────────────────────────────
//! Per-iteration driver tying assembly, covariance updates and annealing
//! together behind the `VectorFunction` interface the solver consumes.
//!
//! Iteration protocol:
//!   1. `before_iteration`: dimensions, Y, update matrix, energy
//!   2. solver calls `evaluate(domain, particle)` for every particle
//!   3. `after_iteration`: advance the minimum-variance schedule

use serde::{Deserialize, Serialize};

use ssm_particles::{Particle, ParticleSystem, Point3};
use ssm_types::{
    CovarianceForm, DecaySchedule, EigenRegularization, EnergyMode, EntropyConfig, SsmError,
    SsmResult,
};

use crate::annealing::{AnnealingPhase, VarianceAnnealer};
use crate::covariance::{self, UpdateDiagnostic};
use crate::features::{assemble, FeatureLayout};
use crate::matrix::FeatureMatrix;

/// Gradient of one particle plus the scalars the solver reads with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleGradient {
    /// Spatial ascent direction; the solver steps against it.
    pub gradient: Point3,
    /// Step-size hint (smallest regularized eigenvalue).
    pub max_move: f64,
    /// Population energy of the current iteration.
    pub energy: f64,
}

/// Gradient strategy consumed by the optimizer.
pub trait VectorFunction: Send + Sync {
    fn before_iteration(&mut self, system: &ParticleSystem) -> SsmResult<()>;

    fn after_iteration(&mut self);

    fn evaluate(
        &self,
        system: &ParticleSystem,
        domain: usize,
        particle: usize,
    ) -> SsmResult<ParticleGradient>;

    fn energy(&self, system: &ParticleSystem, domain: usize, particle: usize) -> SsmResult<f64> {
        Ok(self.evaluate(system, domain, particle)?.energy)
    }

    fn clone_boxed(&self) -> Box<dyn VectorFunction>;
}

/// Population entropy gradient over xyz, normal and attribute features.
///
/// A plain value: cloning copies the configuration, the annealing state
/// and the cached update of the last iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralEntropyGradient {
    config: EntropyConfig,
    annealer: VarianceAnnealer,
    layout: Option<FeatureLayout>,
    points_update: FeatureMatrix,
    mean: Vec<f64>,
    current_energy: f64,
    minimum_eigenvalue: f64,
    diagnostic: Option<UpdateDiagnostic>,
    form: Option<CovarianceForm>,
    iteration: u64,
}

impl GeneralEntropyGradient {
    pub fn new(config: EntropyConfig) -> SsmResult<Self> {
        config.validate()?;
        let annealer = VarianceAnnealer::from_config(&config)?;
        Ok(Self {
            config,
            annealer,
            layout: None,
            points_update: FeatureMatrix::default(),
            mean: Vec::new(),
            current_energy: 0.0,
            minimum_eigenvalue: 0.0,
            diagnostic: None,
            form: None,
            iteration: 0,
        })
    }

    // ── Configuration ───────────────────────────────────────────────

    /// Geometric decay from `initial` to `final_value` over `horizon`
    /// decay events. Resets the floor and releases the hold.
    pub fn set_minimum_variance_decay(
        &mut self,
        initial: f64,
        final_value: f64,
        horizon: f64,
    ) -> SsmResult<()> {
        let schedule = DecaySchedule::new(initial, final_value, horizon);
        self.annealer.set_decay(&schedule)?;
        self.config.decay = Some(schedule);
        self.config.minimum_variance = initial;
        self.config.hold_minimum_variance = false;
        Ok(())
    }

    pub fn set_minimum_variance(&mut self, value: f64) -> SsmResult<()> {
        self.annealer.set_minimum_variance(value)?;
        self.config.minimum_variance = value;
        Ok(())
    }

    pub fn set_hold_minimum_variance(&mut self, hold: bool) {
        self.annealer.set_hold(hold);
        self.config.hold_minimum_variance = hold;
    }

    pub fn set_recompute_interval(&mut self, interval: usize) -> SsmResult<()> {
        self.annealer.set_recompute_interval(interval)?;
        self.config.recompute_interval = interval;
        Ok(())
    }

    /// One weight per per-particle feature slot; empty for unit weights.
    /// Checked against the layout at the next `before_iteration`.
    pub fn set_attribute_scales(&mut self, scales: Vec<f64>) {
        self.config.attribute_scales = scales;
    }

    pub fn set_domains_per_shape(&mut self, domains_per_shape: usize) {
        self.config.domains_per_shape = domains_per_shape;
    }

    pub fn set_attributes_per_domain(&mut self, attributes: Vec<usize>) {
        self.config.attributes_per_domain = attributes;
    }

    pub fn use_mean_energy(&mut self) {
        self.config.mode = EnergyMode::MeanEnergy;
    }

    pub fn use_entropy(&mut self) {
        self.config.mode = EnergyMode::Entropy;
    }

    /// Toggle xyz features of `slot`; the flag array is resized to
    /// `domains_per_shape` first.
    pub fn set_xyz(&mut self, slot: usize, enabled: bool) -> SsmResult<()> {
        let dps = self.config.domains_per_shape;
        set_slot_flag(&mut self.config.use_xyz, dps, slot, enabled, "xyz")
    }

    pub fn set_normals(&mut self, slot: usize, enabled: bool) -> SsmResult<()> {
        let dps = self.config.domains_per_shape;
        set_slot_flag(&mut self.config.use_normals, dps, slot, enabled, "normals")
    }

    pub fn set_regularization(&mut self, policy: EigenRegularization) {
        self.config.regularization = policy;
    }

    pub fn set_covariance_form(&mut self, form: CovarianceForm) {
        self.config.covariance_form = form;
    }

    // ── Per-iteration work ──────────────────────────────────────────

    /// Recompute `num_dims` and `num_samples` for the current population.
    ///
    /// Drops the cached update; `evaluate` fails until the next
    /// successful `compute_updates`.
    pub fn set_dimensions(&mut self, system: &ParticleSystem) -> SsmResult<&FeatureLayout> {
        self.invalidate();
        let layout = FeatureLayout::new(&self.config, system)?;
        Ok(&*self.layout.insert(layout))
    }

    /// Build Y for `system` under the current configuration.
    pub fn feature_matrix(&self, system: &ParticleSystem) -> SsmResult<FeatureMatrix> {
        let layout = FeatureLayout::new(&self.config, system)?;
        assemble(&layout, system)
    }

    /// Rebuild Y and refresh the cached update, mean and energy.
    ///
    /// Only configuration problems are returned; numeric degeneracies
    /// yield a zero update and a fallback diagnostic. On error the cached
    /// state is cleared rather than left from the previous iteration.
    pub fn compute_updates(&mut self, system: &ParticleSystem) -> SsmResult<()> {
        self.invalidate();
        let layout = FeatureLayout::new(&self.config, system)?;
        let y = assemble(&layout, system)?;
        let outcome =
            covariance::compute_updates(&y, self.annealer.minimum_variance(), &self.config);

        if outcome.diagnostic.is_fallback() {
            log::debug!(
                "iteration {}: fallback update ({:?})",
                self.iteration,
                outcome.diagnostic
            );
        }

        self.layout = Some(layout);
        self.points_update = outcome.update;
        self.mean = outcome.mean;
        self.current_energy = outcome.energy;
        self.minimum_eigenvalue = outcome.minimum_eigenvalue;
        self.diagnostic = Some(outcome.diagnostic);
        self.form = outcome.form;
        Ok(())
    }

    /// Spatial gradient of `particle` at `(domain, index)` from the cached
    /// update matrix.
    pub fn spatial_gradient(
        &self,
        particle: &Particle,
        domain: usize,
        index: usize,
    ) -> SsmResult<Point3> {
        let layout = self.checked_layout(domain, index)?;
        let (shape, slot) = layout.locate(domain);
        let column = self.points_update.column(shape);
        let base = layout.row(slot, index);
        let scales = &layout.slot_scales[slot];

        let mut g = [0.0; 3];
        let mut k = 0;
        if layout.use_xyz[slot] {
            for x in 0..3 {
                g[x] += scales[x] * column[base + x];
            }
            k += 3;
        }
        if layout.use_normals[slot] {
            // g += Jnᵀ · u_n
            if let Some(jacobian) = &particle.normal_jacobian {
                for (c, row) in jacobian.iter().enumerate() {
                    let u = scales[k + c] * column[base + k + c];
                    for x in 0..3 {
                        g[x] += u * row[x];
                    }
                }
            }
            k += 3;
        }
        for a in 0..layout.attributes[slot] {
            if let Some(grad) = particle.attribute_gradients.get(a) {
                let u = scales[k + a] * column[base + k + a];
                for x in 0..3 {
                    g[x] += u * grad[x];
                }
            }
        }
        Ok(g)
    }

    /// Spatial gradients of every particle, indexed `[domain][particle]`.
    pub fn spatial_updates(&self, system: &ParticleSystem) -> SsmResult<Vec<Vec<Point3>>> {
        let layout = self.require_layout()?;
        let total = layout.num_samples * layout.domains_per_shape;
        (0..total)
            .map(|d| {
                system
                    .domain(d)?
                    .particles
                    .iter()
                    .enumerate()
                    .map(|(p, particle)| self.spatial_gradient(particle, d, p))
                    .collect()
            })
            .collect()
    }

    fn invalidate(&mut self) {
        self.layout = None;
        self.points_update = FeatureMatrix::default();
        self.mean.clear();
        self.current_energy = 0.0;
        self.minimum_eigenvalue = 0.0;
        self.diagnostic = None;
        self.form = None;
    }

    fn require_layout(&self) -> SsmResult<&FeatureLayout> {
        let layout = self.layout.as_ref().ok_or_else(|| {
            SsmError::Validation("before_iteration has not been called".to_string())
        })?;
        if self.points_update.rows() != layout.num_dims
            || self.points_update.cols() != layout.num_samples
        {
            return Err(SsmError::Validation(
                "no update for the current dimensions; call before_iteration".to_string(),
            ));
        }
        Ok(layout)
    }

    fn checked_layout(&self, domain: usize, index: usize) -> SsmResult<&FeatureLayout> {
        let layout = self.require_layout()?;
        let total = layout.num_samples * layout.domains_per_shape;
        if domain >= total {
            return Err(SsmError::Validation(format!(
                "domain {domain} out of range ({total} domains in the last iteration)"
            )));
        }
        let (_, slot) = layout.locate(domain);
        if index >= layout.slot_particles[slot] {
            return Err(SsmError::Validation(format!(
                "particle {index} out of range for domain {domain} ({} particles)",
                layout.slot_particles[slot]
            )));
        }
        Ok(layout)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &EntropyConfig {
        &self.config
    }

    pub fn annealer(&self) -> &VarianceAnnealer {
        &self.annealer
    }

    pub fn phase(&self) -> AnnealingPhase {
        self.annealer.phase(self.config.mode)
    }

    pub fn minimum_variance(&self) -> f64 {
        self.annealer.minimum_variance()
    }

    pub fn hold_minimum_variance(&self) -> bool {
        self.annealer.hold()
    }

    pub fn recompute_interval(&self) -> usize {
        self.annealer.recompute_interval()
    }

    pub fn domains_per_shape(&self) -> usize {
        self.config.domains_per_shape
    }

    pub fn layout(&self) -> Option<&FeatureLayout> {
        self.layout.as_ref()
    }

    pub fn num_dims(&self) -> usize {
        self.layout.as_ref().map_or(0, |l| l.num_dims)
    }

    pub fn num_samples(&self) -> usize {
        self.layout.as_ref().map_or(0, |l| l.num_samples)
    }

    pub fn points_update(&self) -> &FeatureMatrix {
        &self.points_update
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn current_energy(&self) -> f64 {
        self.current_energy
    }

    pub fn minimum_eigenvalue(&self) -> f64 {
        self.minimum_eigenvalue
    }

    pub fn diagnostic(&self) -> Option<&UpdateDiagnostic> {
        self.diagnostic.as_ref()
    }

    /// Formulation used by the last entropy-mode update.
    pub fn form(&self) -> Option<CovarianceForm> {
        self.form
    }

    /// Completed iterations (`after_iteration` calls).
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

impl VectorFunction for GeneralEntropyGradient {
    fn before_iteration(&mut self, system: &ParticleSystem) -> SsmResult<()> {
        self.compute_updates(system)
    }

    fn after_iteration(&mut self) {
        self.annealer.advance(self.config.mode);
        self.iteration += 1;
    }

    fn evaluate(
        &self,
        system: &ParticleSystem,
        domain: usize,
        particle: usize,
    ) -> SsmResult<ParticleGradient> {
        self.checked_layout(domain, particle)?;
        let p = system.particle(domain, particle)?;
        Ok(ParticleGradient {
            gradient: self.spatial_gradient(p, domain, particle)?,
            max_move: self.minimum_eigenvalue,
            energy: self.current_energy,
        })
    }

    fn clone_boxed(&self) -> Box<dyn VectorFunction> {
        Box::new(self.clone())
    }
}

fn set_slot_flag(
    flags: &mut Vec<bool>,
    domains_per_shape: usize,
    slot: usize,
    enabled: bool,
    name: &str,
) -> SsmResult<()> {
    if slot >= domains_per_shape {
        return Err(SsmError::Validation(format!(
            "{name} slot {slot} out of range (domains_per_shape = {domains_per_shape})"
        )));
    }
    if flags.len() != domains_per_shape {
        flags.resize(domains_per_shape, false);
    }
    flags[slot] = enabled;
    Ok(())
}
