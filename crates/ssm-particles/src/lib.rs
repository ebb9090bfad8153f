// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Correspondence Particle Store
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Per-domain particle state read by the gradient engines and updated by
//! the solver, keyed by `(domain index, particle index)`.

pub mod particle;
pub mod system;

pub use particle::{Domain, Particle, Point3};
pub use system::ParticleSystem;
