//! Injection/withdrawal stages and the scheduler state machine.
//!
//! A schedule is an ordered list of immutable stages; insertion order is
//! execution order. Each stage runs until its duration elapses or, for
//! target-volume stages, until the cavern volume first crosses the target.

use serde::{Deserialize, Serialize};

use crate::constants::{HOURS_PER_DAY, STAGE_TIME_EPS_H};
use crate::empirical::CorrelationTable;
use crate::error::{Result, SimError};
use crate::geometry::CavernProfile;
use crate::math_utils::interp_clamped;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageKind {
    /// Fixed injection rate for the whole stage, bbl/day.
    ConstantRate { rate_bbl_per_day: f64 },
    /// Piecewise-linear rate table in stage-local hours, bbl/hour, clamped
    /// at both ends.
    TabulatedRate { table: Vec<(f64, f64)> },
    /// No flow; dissolution continues toward saturation.
    ShutIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StopCondition {
    /// Run for the stage's full duration.
    DurationElapsed,
    /// End at the first crossing of this total cavern volume; the duration
    /// still acts as a cap.
    TargetVolume { target_bbl: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub duration_h: f64,
    pub injection_elevation_ft: f64,
    /// Brine withdrawal point. `None` models a pure-injection stage whose
    /// excess fluid leaves through the vent path.
    pub production_elevation_ft: Option<f64>,
    /// Specific gravity of the injected water.
    pub injection_sg: f64,
    /// Product (blanket) fill rate, bbl/day. Zero keeps the interface fixed.
    pub fill_rate_bbl_per_day: f64,
    pub stop: StopCondition,
}

impl Stage {
    /// Instantaneous injection rate in bbl/h at stage-local time `t_h`.
    pub fn rate_bbl_per_hour(&self, t_h: f64) -> f64 {
        match &self.kind {
            StageKind::ConstantRate { rate_bbl_per_day } => rate_bbl_per_day / HOURS_PER_DAY,
            StageKind::TabulatedRate { table } => {
                let times: Vec<f64> = table.iter().map(|p| p.0).collect();
                let rates: Vec<f64> = table.iter().map(|p| p.1).collect();
                interp_clamped(&times, &rates, t_h).0
            }
            StageKind::ShutIn => 0.0,
        }
    }

    pub fn fill_rate_bbl_per_hour(&self) -> f64 {
        self.fill_rate_bbl_per_day / HOURS_PER_DAY
    }

    pub fn is_shut_in(&self) -> bool {
        matches!(self.kind, StageKind::ShutIn)
    }

    /// Structural validation against the initial geometry and correlation
    /// domain. Runs before any stepping.
    pub fn validate(
        &self,
        index: usize,
        profile: &CavernProfile,
        table: &CorrelationTable,
    ) -> Result<()> {
        let fail = |msg: String| Err(SimError::Configuration(format!("stage {index}: {msg}")));

        if !self.duration_h.is_finite() || self.duration_h < 0.0 {
            return fail(format!("duration {} h is negative", self.duration_h));
        }
        match &self.kind {
            StageKind::ConstantRate { rate_bbl_per_day } => {
                if !rate_bbl_per_day.is_finite() || *rate_bbl_per_day < 0.0 {
                    return fail(format!("rate {rate_bbl_per_day} bbl/d is negative"));
                }
            }
            StageKind::TabulatedRate { table } => {
                if table.is_empty() {
                    return fail("rate table is empty".to_string());
                }
                if table[0].0 < 0.0 {
                    return fail("rate table starts before stage time zero".to_string());
                }
                if table.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return fail("rate table times must be strictly increasing".to_string());
                }
                if let Some((t, q)) = table.iter().find(|(_, q)| !q.is_finite() || *q < 0.0) {
                    return fail(format!("rate {q} bbl/h at table time {t} h is negative"));
                }
            }
            StageKind::ShutIn => {}
        }
        if !self.fill_rate_bbl_per_day.is_finite() || self.fill_rate_bbl_per_day < 0.0 {
            return fail(format!(
                "fill rate {} bbl/d is negative",
                self.fill_rate_bbl_per_day
            ));
        }
        if !profile.contains_elevation(self.injection_elevation_ft) {
            return fail(format!(
                "injection elevation {} ft is outside the cavern span [{}, {}]",
                self.injection_elevation_ft,
                profile.floor_elevation_ft(),
                profile.ceiling_elevation_ft()
            ));
        }
        if let Some(prod) = self.production_elevation_ft {
            if !profile.contains_elevation(prod) {
                return fail(format!(
                    "production elevation {prod} ft is outside the cavern span"
                ));
            }
            if (prod - self.injection_elevation_ft).abs() < 1.0 {
                return fail(format!(
                    "production elevation {prod} ft conflicts with injection at {} ft",
                    self.injection_elevation_ft
                ));
            }
        }
        let (sg_min, sg_max) = table.sg_domain();
        if self.injection_sg < sg_min || self.injection_sg > sg_max {
            return fail(format!(
                "injection sg {} is outside the calibrated domain [{sg_min:.4}, {sg_max:.4}]",
                self.injection_sg
            ));
        }
        if let StopCondition::TargetVolume { target_bbl } = self.stop {
            if !target_bbl.is_finite() || target_bbl <= 0.0 {
                return fail(format!("target volume {target_bbl} bbl is not positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(stages: Vec<Stage>) -> Schedule {
        Schedule { stages }
    }

    pub fn validate(&self, profile: &CavernProfile, table: &CorrelationTable) -> Result<()> {
        if self.stages.is_empty() {
            return Err(SimError::Configuration(
                "schedule contains no stages".to_string(),
            ));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate(i, profile, table)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Lifecycle of one scheduled stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Aborted,
}

/// Sequences stages in insertion order: `Pending → Active → Completed`
/// normally, `Active → Aborted` on a fatal step error (downstream stages
/// stay `Pending`).
#[derive(Debug, Clone)]
pub struct StageScheduler {
    statuses: Vec<StageStatus>,
    current: Option<usize>,
}

impl StageScheduler {
    pub fn new(stage_count: usize) -> StageScheduler {
        StageScheduler {
            statuses: vec![StageStatus::Pending; stage_count],
            current: None,
        }
    }

    /// Activate the next pending stage, if any. The prior stage must have
    /// left the `Active` state.
    pub fn activate_next(&mut self) -> Option<usize> {
        debug_assert!(self
            .current
            .is_none_or(|i| self.statuses[i] != StageStatus::Active));
        let next = self
            .statuses
            .iter()
            .position(|s| *s == StageStatus::Pending)?;
        self.statuses[next] = StageStatus::Active;
        self.current = Some(next);
        Some(next)
    }

    pub fn complete_current(&mut self) {
        if let Some(i) = self.current {
            self.statuses[i] = StageStatus::Completed;
        }
    }

    pub fn abort_current(&mut self) {
        if let Some(i) = self.current {
            self.statuses[i] = StageStatus::Aborted;
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn statuses(&self) -> &[StageStatus] {
        &self.statuses
    }

    pub fn all_completed(&self) -> bool {
        self.statuses.iter().all(|s| *s == StageStatus::Completed)
    }
}

/// Whether a stage-local elapsed time has consumed the stage duration.
pub fn stage_time_done(elapsed_in_stage_h: f64, duration_h: f64) -> bool {
    elapsed_in_stage_h >= duration_h - STAGE_TIME_EPS_H
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::empirical::DEFAULT_TABLE;
    use approx::assert_abs_diff_eq;

    fn profile() -> CavernProfile {
        CavernProfile::cylinder(0.0, 300.0, 25.0, 31).unwrap()
    }

    fn leach_stage() -> Stage {
        Stage {
            kind: StageKind::ConstantRate { rate_bbl_per_day: 2400.0 },
            duration_h: 72.0,
            injection_elevation_ft: 20.0,
            production_elevation_ft: Some(250.0),
            injection_sg: 1.0003,
            fill_rate_bbl_per_day: 0.0,
            stop: StopCondition::DurationElapsed,
        }
    }

    #[test]
    fn constant_rate_converts_to_hours() {
        let stage = leach_stage();
        assert_abs_diff_eq!(stage.rate_bbl_per_hour(0.0), 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stage.rate_bbl_per_hour(71.0), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn tabulated_rate_interpolates_and_clamps() {
        let mut stage = leach_stage();
        stage.kind = StageKind::TabulatedRate {
            table: vec![(0.0, 50.0), (10.0, 150.0)],
        };
        assert_abs_diff_eq!(stage.rate_bbl_per_hour(5.0), 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stage.rate_bbl_per_hour(-1.0), 50.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stage.rate_bbl_per_hour(99.0), 150.0, epsilon = 1e-12);
    }

    #[test]
    fn shut_in_has_no_flow() {
        let mut stage = leach_stage();
        stage.kind = StageKind::ShutIn;
        stage.production_elevation_ft = None;
        assert_eq!(stage.rate_bbl_per_hour(1.0), 0.0);
        assert!(stage.is_shut_in());
    }

    #[test]
    fn validation_rejects_bad_stages() {
        let p = profile();
        let table = &*DEFAULT_TABLE;

        let mut negative_duration = leach_stage();
        negative_duration.duration_h = -1.0;
        assert!(negative_duration.validate(0, &p, table).is_err());

        let mut negative_rate = leach_stage();
        negative_rate.kind = StageKind::ConstantRate { rate_bbl_per_day: -5.0 };
        assert!(negative_rate.validate(0, &p, table).is_err());

        let mut conflicting = leach_stage();
        conflicting.production_elevation_ft = Some(conflicting.injection_elevation_ft);
        assert!(conflicting.validate(0, &p, table).is_err());

        let mut outside = leach_stage();
        outside.injection_elevation_ft = 5000.0;
        assert!(outside.validate(0, &p, table).is_err());

        let mut unordered_table = leach_stage();
        unordered_table.kind = StageKind::TabulatedRate {
            table: vec![(0.0, 50.0), (0.0, 60.0)],
        };
        assert!(unordered_table.validate(0, &p, table).is_err());

        let mut bad_target = leach_stage();
        bad_target.stop = StopCondition::TargetVolume { target_bbl: 0.0 };
        assert!(bad_target.validate(0, &p, table).is_err());

        assert!(leach_stage().validate(0, &p, table).is_ok());
    }

    #[test]
    fn empty_schedule_is_invalid() {
        let p = profile();
        assert!(Schedule::default().validate(&p, &DEFAULT_TABLE).is_err());
    }

    #[test]
    fn scheduler_walks_pending_to_completed() {
        let mut sched = StageScheduler::new(3);
        assert_eq!(sched.statuses(), &[StageStatus::Pending; 3]);

        assert_eq!(sched.activate_next(), Some(0));
        assert_eq!(sched.statuses()[0], StageStatus::Active);
        sched.complete_current();

        assert_eq!(sched.activate_next(), Some(1));
        sched.complete_current();
        assert_eq!(sched.activate_next(), Some(2));
        sched.complete_current();

        assert!(sched.all_completed());
        assert_eq!(sched.activate_next(), None);
    }

    #[test]
    fn abort_freezes_downstream_stages() {
        let mut sched = StageScheduler::new(3);
        sched.activate_next();
        sched.complete_current();
        sched.activate_next();
        sched.abort_current();

        assert_eq!(
            sched.statuses(),
            &[
                StageStatus::Completed,
                StageStatus::Aborted,
                StageStatus::Pending
            ]
        );
        assert!(!sched.all_completed());
    }
}
