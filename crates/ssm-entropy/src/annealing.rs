// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Minimum-Variance Annealing
// ─────────────────────────────────────────────────────────────────────
//! Geometric decay of the covariance regularization floor.
//!
//! Phases:
//!   - Active:     entropy mode, floor decays every `recompute_interval`
//!                 iterations by `decay_constant`
//!   - Held:       entropy mode, floor frozen
//!   - MeanEnergy: decay disabled by the energy mode
//!
//! The floor approaches the schedule's final value asymptotically; it is
//! never clamped.

use serde::{Deserialize, Serialize};

use ssm_types::{DecaySchedule, EnergyMode, EntropyConfig, SsmError, SsmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnealingPhase {
    Active,
    Held,
    MeanEnergy,
}

/// Annealing state carried across solver iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceAnnealer {
    minimum_variance: f64,
    decay_constant: f64,
    recompute_interval: usize,
    counter: usize,
    hold: bool,
    decay_events: u64,
}

impl VarianceAnnealer {
    /// Held floor with no decay configured.
    pub fn new(minimum_variance: f64, recompute_interval: usize) -> Self {
        Self {
            minimum_variance,
            decay_constant: 1.0,
            recompute_interval: recompute_interval.max(1),
            counter: 0,
            hold: true,
            decay_events: 0,
        }
    }

    /// Annealer for `config`. A decay schedule releases the hold, so
    /// `hold_minimum_variance` only matters when `decay` is `None`.
    pub fn from_config(config: &EntropyConfig) -> SsmResult<Self> {
        let mut annealer = Self::new(config.minimum_variance, config.recompute_interval);
        annealer.hold = config.hold_minimum_variance;
        if let Some(schedule) = &config.decay {
            annealer.set_decay(schedule)?;
        }
        Ok(annealer)
    }

    /// Install a decay schedule: floor ← initial, decay active.
    pub fn set_decay(&mut self, schedule: &DecaySchedule) -> SsmResult<()> {
        let decay_constant = schedule.decay_constant()?;
        self.decay_constant = decay_constant;
        self.minimum_variance = schedule.initial;
        self.hold = false;
        log::info!(
            "minimum variance decay {} -> {} over {} events (constant {decay_constant:.6})",
            schedule.initial,
            schedule.final_value,
            schedule.horizon
        );
        Ok(())
    }

    pub fn phase(&self, mode: EnergyMode) -> AnnealingPhase {
        if mode == EnergyMode::MeanEnergy {
            AnnealingPhase::MeanEnergy
        } else if self.hold {
            AnnealingPhase::Held
        } else {
            AnnealingPhase::Active
        }
    }

    /// One after-iteration tick. Returns true when the floor decayed.
    pub fn advance(&mut self, mode: EnergyMode) -> bool {
        if self.phase(mode) != AnnealingPhase::Active {
            return false;
        }
        self.counter += 1;
        if self.counter < self.recompute_interval {
            return false;
        }
        self.counter = 0;
        self.minimum_variance *= self.decay_constant;
        self.decay_events += 1;
        log::debug!(
            "minimum variance decayed to {:.6e} (event {})",
            self.minimum_variance,
            self.decay_events
        );
        true
    }

    pub fn minimum_variance(&self) -> f64 {
        self.minimum_variance
    }

    pub fn set_minimum_variance(&mut self, value: f64) -> SsmResult<()> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(SsmError::Configuration(format!(
                "minimum variance must be finite and >= 0, got {value}"
            )));
        }
        self.minimum_variance = value;
        Ok(())
    }

    pub fn hold(&self) -> bool {
        self.hold
    }

    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }

    pub fn recompute_interval(&self) -> usize {
        self.recompute_interval
    }

    pub fn set_recompute_interval(&mut self, interval: usize) -> SsmResult<()> {
        if interval == 0 {
            return Err(SsmError::Configuration(
                "recompute interval must be >= 1".to_string(),
            ));
        }
        self.recompute_interval = interval;
        Ok(())
    }

    pub fn decay_constant(&self) -> f64 {
        self.decay_constant
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Number of decay multiplications applied so far.
    pub fn decay_events(&self) -> u64 {
        self.decay_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_held() {
        let mut a = VarianceAnnealer::new(1e-5, 5);
        assert_eq!(a.phase(EnergyMode::Entropy), AnnealingPhase::Held);
        for _ in 0..20 {
            assert!(!a.advance(EnergyMode::Entropy));
        }
        assert_eq!(a.minimum_variance(), 1e-5);
        assert_eq!(a.counter(), 0);
    }

    #[test]
    fn test_schedule_reaches_final_value() {
        let mut a = VarianceAnnealer::new(1e-5, 1);
        a.set_decay(&DecaySchedule::new(1.0, 0.5, 10.0)).unwrap();
        assert_eq!(a.minimum_variance(), 1.0);
        for _ in 0..10 {
            a.advance(EnergyMode::Entropy);
        }
        assert_eq!(a.decay_events(), 10);
        assert!((a.minimum_variance() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_interval_gates_decay() {
        let mut a = VarianceAnnealer::new(1e-5, 3);
        a.set_decay(&DecaySchedule::new(1.0, 0.1, 4.0)).unwrap();
        let decayed: Vec<bool> = (0..7).map(|_| a.advance(EnergyMode::Entropy)).collect();
        assert_eq!(decayed, vec![false, false, true, false, false, true, false]);
        assert_eq!(a.decay_events(), 2);
        assert_eq!(a.counter(), 1);
    }

    #[test]
    fn test_monotone_non_increasing_when_active() {
        let mut a = VarianceAnnealer::new(1e-5, 2);
        a.set_decay(&DecaySchedule::new(100.0, 0.1, 50.0)).unwrap();
        let mut prev = a.minimum_variance();
        for _ in 0..200 {
            a.advance(EnergyMode::Entropy);
            assert!(a.minimum_variance() <= prev);
            prev = a.minimum_variance();
        }
        // Past the horizon the floor keeps shrinking, no clamp at 0.1
        assert!(a.minimum_variance() < 0.1);
    }

    #[test]
    fn test_mean_energy_suppresses_decay() {
        let mut a = VarianceAnnealer::new(1e-5, 1);
        a.set_decay(&DecaySchedule::new(1.0, 0.5, 10.0)).unwrap();
        assert_eq!(a.phase(EnergyMode::MeanEnergy), AnnealingPhase::MeanEnergy);
        for _ in 0..10 {
            assert!(!a.advance(EnergyMode::MeanEnergy));
        }
        assert_eq!(a.minimum_variance(), 1.0);
        assert_eq!(a.decay_events(), 0);
    }

    #[test]
    fn test_hold_freezes_active_schedule() {
        let mut a = VarianceAnnealer::new(1e-5, 1);
        a.set_decay(&DecaySchedule::new(1.0, 0.5, 10.0)).unwrap();
        a.advance(EnergyMode::Entropy);
        let frozen = a.minimum_variance();
        a.set_hold(true);
        for _ in 0..5 {
            a.advance(EnergyMode::Entropy);
        }
        assert_eq!(a.minimum_variance(), frozen);
    }

    #[test]
    fn test_invalid_schedule_keeps_state() {
        let mut a = VarianceAnnealer::new(0.3, 1);
        assert!(a.set_decay(&DecaySchedule::new(0.0, 0.5, 10.0)).is_err());
        assert_eq!(a.minimum_variance(), 0.3);
        assert!(a.hold());
    }

    #[test]
    fn test_setters_validate() {
        let mut a = VarianceAnnealer::new(0.3, 1);
        assert!(a.set_recompute_interval(0).is_err());
        assert!(a.set_minimum_variance(-1.0).is_err());
        assert!(a.set_minimum_variance(f64::NAN).is_err());
        a.set_recompute_interval(4).unwrap();
        assert_eq!(a.recompute_interval(), 4);
    }

    #[test]
    fn test_schedule_overrides_configured_hold() {
        let cfg = EntropyConfig {
            hold_minimum_variance: true,
            decay: Some(DecaySchedule::new(1.0, 0.5, 10.0)),
            ..EntropyConfig::default()
        };
        let a = VarianceAnnealer::from_config(&cfg).unwrap();
        assert!(!a.hold());

        let held = VarianceAnnealer::from_config(&EntropyConfig::default()).unwrap();
        assert!(held.hold());
    }

    #[test]
    fn test_state_survives_json_snapshot() {
        let mut a = VarianceAnnealer::new(1e-5, 2);
        a.set_decay(&DecaySchedule::new(1.0, 0.5, 10.0)).unwrap();
        for _ in 0..5 {
            a.advance(EnergyMode::Entropy);
        }
        let json = serde_json::to_string(&a).unwrap();
        let restored: VarianceAnnealer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.counter(), 1);
        assert_eq!(restored.decay_events(), 2);
        assert_eq!(restored.hold(), a.hold());
        assert_eq!(restored.recompute_interval(), 2);
        assert!((restored.minimum_variance() - a.minimum_variance()).abs() < 1e-15);
        assert!((restored.decay_constant() - a.decay_constant()).abs() < 1e-15);
    }

    #[test]
    fn test_from_config_with_schedule() {
        let cfg = EntropyConfig {
            decay: Some(DecaySchedule::new(2.0, 1.0, 4.0)),
            recompute_interval: 1,
            ..EntropyConfig::default()
        };
        let a = VarianceAnnealer::from_config(&cfg).unwrap();
        assert_eq!(a.phase(EnergyMode::Entropy), AnnealingPhase::Active);
        assert_eq!(a.minimum_variance(), 2.0);
    }
}
