// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all SSM kernel failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsmError {
    /// Setup mistake: mismatched array lengths, zero domains per shape,
    /// an unusable decay schedule. Fatal to the run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-finite features or a failed eigendecomposition.
    ///
    /// The gradient engine absorbs this into a zero update; it only
    /// surfaces from the lower-level numeric helpers.
    #[error("numeric instability: {0}")]
    NumericInstability(String),

    /// Out-of-range domain or particle lookup.
    #[error("validation error: {0}")]
    Validation(String),
}

pub type SsmResult<T> = Result<T, SsmError>;
