//! Fluid mass-balance bookkeeping.
//!
//! Cumulative injected / produced / vented / fill totals plus a per-step
//! closure check. A single out-of-tolerance step is a diagnostic, not a
//! failure; only a configured run of consecutive violations is treated as
//! real divergence rather than transient noise.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::MIN_STEP_REFERENCE_BBL;
use crate::error::{Result, SimError};

/// Closure diagnostics for one step, carried into the result record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepBalance {
    /// injected + fill − produced − Δfluid − Δinsoluble − vented
    pub residual_bbl: f64,
    /// Signed residual relative to the step's inflow (floored at 1 bbl).
    pub relative_residual: f64,
    pub violated: bool,
}

impl StepBalance {
    pub fn zero() -> StepBalance {
        StepBalance {
            residual_bbl: 0.0,
            relative_residual: 0.0,
            violated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceLedger {
    pub cumulative_injected_bbl: f64,
    pub cumulative_produced_bbl: f64,
    pub cumulative_vented_bbl: f64,
    pub cumulative_fill_bbl: f64,
    tolerance: f64,
    max_consecutive: u32,
    consecutive_violations: u32,
    total_violations: u64,
}

impl MassBalanceLedger {
    pub fn new(tolerance: f64, max_consecutive: u32) -> Result<MassBalanceLedger> {
        if tolerance <= 0.0 || !tolerance.is_finite() {
            return Err(SimError::Configuration(format!(
                "mass-balance tolerance {tolerance} must be positive and finite"
            )));
        }
        if max_consecutive == 0 {
            return Err(SimError::Configuration(
                "mass-balance escalation threshold must be at least 1".to_string(),
            ));
        }
        Ok(MassBalanceLedger {
            cumulative_injected_bbl: 0.0,
            cumulative_produced_bbl: 0.0,
            cumulative_vented_bbl: 0.0,
            cumulative_fill_bbl: 0.0,
            tolerance,
            max_consecutive,
            consecutive_violations: 0,
            total_violations: 0,
        })
    }

    /// Post one step's volumes and check closure.
    ///
    /// `delta_fluid_bbl` is the external fluid newly stored in the cavern
    /// proper and `delta_insoluble_bbl` the solid sediment growth; together
    /// they equal the step's net fluid demand (void growth minus dissolution
    /// swell). Returns the step diagnostics, or `MassBalance` once
    /// violations have run past the consecutive limit.
    pub fn record_step(
        &mut self,
        injected_bbl: f64,
        fill_bbl: f64,
        produced_bbl: f64,
        delta_fluid_bbl: f64,
        delta_insoluble_bbl: f64,
        vented_bbl: f64,
    ) -> Result<StepBalance> {
        self.cumulative_injected_bbl += injected_bbl;
        self.cumulative_fill_bbl += fill_bbl;
        self.cumulative_produced_bbl += produced_bbl;
        self.cumulative_vented_bbl += vented_bbl;

        let residual =
            injected_bbl + fill_bbl - produced_bbl - delta_fluid_bbl - delta_insoluble_bbl - vented_bbl;
        let reference = (injected_bbl + fill_bbl).max(MIN_STEP_REFERENCE_BBL);
        let relative = residual / reference;
        let violated = relative.abs() > self.tolerance;

        if violated {
            self.consecutive_violations += 1;
            self.total_violations += 1;
            warn!(
                residual_bbl = residual,
                relative,
                consecutive = self.consecutive_violations,
                "mass-balance residual exceeded tolerance"
            );
            if self.consecutive_violations >= self.max_consecutive {
                return Err(SimError::MassBalance {
                    count: self.consecutive_violations,
                    relative: relative.abs(),
                    tolerance: self.tolerance,
                });
            }
        } else {
            self.consecutive_violations = 0;
        }

        Ok(StepBalance {
            residual_bbl: residual,
            relative_residual: relative,
            violated,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn consecutive_violations(&self) -> u32 {
        self.consecutive_violations
    }

    pub fn total_violations(&self) -> u64 {
        self.total_violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ledger() -> MassBalanceLedger {
        MassBalanceLedger::new(1.0e-4, 3).unwrap()
    }

    #[test]
    fn balanced_step_has_zero_residual() {
        let mut l = ledger();
        // 100 in, 60 out, 30 into new fluid volume, 5 solids, 5 vented
        let b = l.record_step(100.0, 0.0, 60.0, 30.0, 5.0, 5.0).unwrap();
        assert_abs_diff_eq!(b.residual_bbl, 0.0, epsilon = 1e-12);
        assert!(!b.violated);
        assert_eq!(l.cumulative_injected_bbl, 100.0);
        assert_eq!(l.cumulative_produced_bbl, 60.0);
        assert_eq!(l.cumulative_vented_bbl, 5.0);
    }

    #[test]
    fn single_violation_is_diagnostic_only() {
        let mut l = ledger();
        let b = l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).unwrap();
        assert!(b.violated);
        assert_abs_diff_eq!(b.relative_residual, 0.2, epsilon = 1e-12);
        assert_eq!(l.consecutive_violations(), 1);
    }

    #[test]
    fn consecutive_violations_escalate() {
        let mut l = ledger();
        assert!(l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).is_ok());
        assert!(l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).is_ok());
        let err = l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).unwrap_err();
        match err {
            SimError::MassBalance { count, .. } => assert_eq!(count, 3),
            other => panic!("expected MassBalance, got {other:?}"),
        }
    }

    #[test]
    fn clean_step_resets_the_streak() {
        let mut l = ledger();
        assert!(l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).is_ok());
        assert!(l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).is_ok());
        assert!(l.record_step(100.0, 0.0, 100.0, 0.0, 0.0, 0.0).is_ok());
        assert_eq!(l.consecutive_violations(), 0);
        assert_eq!(l.total_violations(), 2);
        // The streak starts over after the clean step.
        assert!(l.record_step(100.0, 0.0, 60.0, 20.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn zero_flow_steps_use_the_reference_floor() {
        let mut l = ledger();
        let b = l.record_step(0.0, 0.0, 0.0, 0.0, 0.0, 0.0).unwrap();
        assert!(!b.violated);
        assert_eq!(b.relative_residual, 0.0);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(MassBalanceLedger::new(0.0, 3).is_err());
        assert!(MassBalanceLedger::new(1e-4, 0).is_err());
    }
}
