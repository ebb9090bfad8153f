// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Optimizer Parameter Mapping
// ─────────────────────────────────────────────────────────────────────
//! Optimizer parameter-file keys consumed by the entropy engine.
//!
//! Parameter files name things the way users configure a run
//! (`starting_regularization`, `normal_weight`, ...). This module maps
//! them onto an [`EntropyConfig`].

use serde::{Deserialize, Serialize};

use crate::config::{DecaySchedule, EnergyMode, EntropyConfig};
use crate::error::{SsmError, SsmResult};

/// A value given once for every domain slot, or once per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerDomain<T> {
    Uniform(T),
    Each(Vec<T>),
}

impl<T: Clone> PerDomain<T> {
    /// Expand to exactly `n` entries.
    pub fn expand(&self, n: usize, name: &str) -> SsmResult<Vec<T>> {
        match self {
            PerDomain::Uniform(v) => Ok(vec![v.clone(); n]),
            PerDomain::Each(vs) if vs.len() >= n => Ok(vs[..n].to_vec()),
            PerDomain::Each(vs) => Err(SsmError::Configuration(format!(
                "{name} has {} entries, domains_per_shape is {n}",
                vs.len()
            ))),
        }
    }
}

/// Parameter-file view of a correspondence optimization run.
///
/// Flags are integers (0/1) as in the parameter files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationParameters {
    pub domains_per_shape: usize,
    pub use_xyz: PerDomain<u8>,
    pub use_normals: PerDomain<u8>,
    /// Scale applied to normal features when `attribute_scales` is empty.
    pub normal_weight: f64,
    pub attributes_per_domain: PerDomain<usize>,
    pub attribute_scales: Vec<f64>,
    pub starting_regularization: f64,
    pub ending_regularization: f64,
    pub recompute_regularization_interval: usize,
    pub optimization_iterations: usize,
    pub mean_energy: bool,
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            domains_per_shape: 1,
            use_xyz: PerDomain::Uniform(1),
            use_normals: PerDomain::Uniform(0),
            normal_weight: 1.0,
            attributes_per_domain: PerDomain::Uniform(0),
            attribute_scales: Vec::new(),
            starting_regularization: 1000.0,
            ending_regularization: 1.0,
            recompute_regularization_interval: 1,
            optimization_iterations: 2000,
            mean_energy: false,
        }
    }
}

impl OptimizationParameters {
    /// Load from JSON string.
    pub fn from_json(json: &str) -> SsmResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SsmError::Configuration(format!("JSON parse error: {e}")))
    }

    /// Build the engine configuration.
    ///
    /// The floor decays from `starting_regularization` to
    /// `ending_regularization` over the run: one decay event every
    /// `recompute_regularization_interval` iterations, so the horizon is
    /// `optimization_iterations / recompute_regularization_interval` events.
    pub fn to_entropy_config(&self) -> SsmResult<EntropyConfig> {
        let dps = self.domains_per_shape;
        if dps == 0 {
            return Err(SsmError::Configuration(
                "domains_per_shape must be > 0".to_string(),
            ));
        }
        if self.recompute_regularization_interval == 0 {
            return Err(SsmError::Configuration(
                "recompute_regularization_interval must be >= 1".to_string(),
            ));
        }

        let use_xyz: Vec<bool> = self
            .use_xyz
            .expand(dps, "use_xyz")?
            .into_iter()
            .map(|f| f != 0)
            .collect();
        let use_normals: Vec<bool> = self
            .use_normals
            .expand(dps, "use_normals")?
            .into_iter()
            .map(|f| f != 0)
            .collect();
        let attributes_per_domain = self
            .attributes_per_domain
            .expand(dps, "attributes_per_domain")?;

        let attribute_scales = if self.attribute_scales.is_empty() {
            let mut scales = Vec::new();
            for j in 0..dps {
                if use_xyz[j] {
                    scales.extend_from_slice(&[1.0; 3]);
                }
                if use_normals[j] {
                    scales.extend_from_slice(&[self.normal_weight; 3]);
                }
                scales.extend(std::iter::repeat(1.0).take(attributes_per_domain[j]));
            }
            scales
        } else {
            self.attribute_scales.clone()
        };

        let horizon =
            self.optimization_iterations as f64 / self.recompute_regularization_interval as f64;
        let schedule = DecaySchedule::new(
            self.starting_regularization,
            self.ending_regularization,
            horizon,
        );

        let config = EntropyConfig {
            domains_per_shape: dps,
            attributes_per_domain,
            use_xyz,
            use_normals,
            attribute_scales,
            mode: if self.mean_energy {
                EnergyMode::MeanEnergy
            } else {
                EnergyMode::Entropy
            },
            hold_minimum_variance: false,
            minimum_variance: self.starting_regularization,
            decay: Some(schedule),
            recompute_interval: self.recompute_regularization_interval,
            ..EntropyConfig::default()
        };
        config.validate()?;
        log::debug!(
            "parameter mapping: {} feature scales, decay {} -> {} over {horizon} events",
            config.attribute_scales.len(),
            self.starting_regularization,
            self.ending_regularization
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let cfg = OptimizationParameters::default().to_entropy_config().unwrap();
        assert_eq!(cfg.domains_per_shape, 1);
        assert_eq!(cfg.use_xyz, vec![true]);
        assert_eq!(cfg.attribute_scales, vec![1.0; 3]);
        let schedule = cfg.decay.unwrap();
        assert_eq!(schedule.initial, 1000.0);
        assert_eq!(schedule.horizon, 2000.0);
        assert!(!cfg.hold_minimum_variance);
    }

    #[test]
    fn test_parameter_file_json() {
        let json = r#"{
            "domains_per_shape": 1,
            "use_normals": 1,
            "normal_weight": 10.0,
            "starting_regularization": 100,
            "ending_regularization": 0.1,
            "recompute_regularization_interval": 2,
            "optimization_iterations": 4000
        }"#;
        let cfg = OptimizationParameters::from_json(json)
            .unwrap()
            .to_entropy_config()
            .unwrap();
        assert_eq!(cfg.use_normals, vec![true]);
        assert_eq!(cfg.attribute_scales, vec![1.0, 1.0, 1.0, 10.0, 10.0, 10.0]);
        assert_eq!(cfg.recompute_interval, 2);
        let schedule = cfg.decay.unwrap();
        assert_eq!(schedule.horizon, 2000.0);
        assert!((schedule.final_value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_per_domain_lists() {
        let json = r#"{
            "domains_per_shape": 2,
            "use_xyz": [1, 0],
            "use_normals": [0, 1],
            "attributes_per_domain": [2, 0]
        }"#;
        let cfg = OptimizationParameters::from_json(json)
            .unwrap()
            .to_entropy_config()
            .unwrap();
        assert_eq!(cfg.use_xyz, vec![true, false]);
        assert_eq!(cfg.use_normals, vec![false, true]);
        assert_eq!(cfg.attributes_per_domain, vec![2, 0]);
        assert_eq!(cfg.attribute_scales.len(), 8);
    }

    #[test]
    fn test_short_per_domain_list_rejected() {
        let params = OptimizationParameters {
            domains_per_shape: 3,
            use_normals: PerDomain::Each(vec![1, 0]),
            ..OptimizationParameters::default()
        };
        assert!(matches!(
            params.to_entropy_config(),
            Err(SsmError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let params = OptimizationParameters {
            optimization_iterations: 0,
            ..OptimizationParameters::default()
        };
        assert!(params.to_entropy_config().is_err());
    }

    #[test]
    fn test_mean_energy_flag() {
        let params = OptimizationParameters {
            mean_energy: true,
            ..OptimizationParameters::default()
        };
        let cfg = params.to_entropy_config().unwrap();
        assert_eq!(cfg.mode, EnergyMode::MeanEnergy);
    }
}
