// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Configuration, parameter-file mapping, and error hierarchy for the
//! particle correspondence kernel.

pub mod config;
pub mod error;
pub mod params;

pub use config::{CovarianceForm, DecaySchedule, EigenRegularization, EnergyMode, EntropyConfig};
pub use error::{SsmError, SsmResult};
pub use params::{OptimizationParameters, PerDomain};
