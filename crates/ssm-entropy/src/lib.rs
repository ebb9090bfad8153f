// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Entropy Gradient Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Population entropy gradients for particle-based shape correspondence.
//!
//! Each iteration stacks every shape's particle features into one column
//! of Y, measures the population covariance, and turns its regularized
//! inverse into per-particle spatial updates that spread the population
//! in shape space while keeping it compact.
//!
//! Architecture:
//!   - FeatureLayout / assemble: particle store → Y (rayon over shapes)
//!   - covariance: centring, Gram or covariance form, regularized updates
//!   - SymmetricEigen: cyclic Jacobi eigensolver
//!   - VarianceAnnealer: minimum-variance floor schedule
//!   - GeneralEntropyGradient: the `VectorFunction` the solver drives

pub mod annealing;
pub mod covariance;
pub mod features;
pub mod function;
pub mod matrix;
pub mod spectral;

pub use annealing::{AnnealingPhase, VarianceAnnealer};
pub use covariance::{compute_updates, UpdateDiagnostic, UpdateOutcome};
pub use features::{assemble, FeatureLayout};
pub use function::{GeneralEntropyGradient, ParticleGradient, VectorFunction};
pub use matrix::FeatureMatrix;
pub use spectral::SymmetricEigen;
