//! Error kinds surfaced by the simulation core.
//!
//! Range clamps and single-step balance noise are recovered locally and only
//! appear as diagnostic fields in the output stream; the variants here are
//! the stage- or run-level failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Invalid schedule, geometry, or run configuration. Raised before any
    /// stepping begins.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A correlation lookup fell outside the calibrated domain while strict
    /// mode was requested. Fatal for the active stage.
    #[error("{quantity} = {value} outside calibrated range [{min}, {max}]")]
    CorrelationRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The per-step mass-balance residual exceeded tolerance for too many
    /// consecutive steps.
    #[error(
        "mass balance violated {count} consecutive steps \
         (relative residual {relative:.3e} > tolerance {tolerance:.3e})"
    )]
    MassBalance {
        count: u32,
        relative: f64,
        tolerance: f64,
    },

    /// Concentration or residual stayed out of range after all step-size
    /// shortening attempts. Aborts the active stage; prior records are kept.
    #[error("numerical divergence at t = {t_h:.4} h: {reason}")]
    NumericalDivergence { t_h: f64, reason: String },

    /// Cooperative cancellation was requested between steps.
    #[error("run cancelled")]
    Cancelled,
}
