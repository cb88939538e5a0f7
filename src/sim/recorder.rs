//! Append-only result stream.
//!
//! One record is captured at run start and one after every completed step.
//! Stage boundaries always coincide with a record because the integrator
//! shortens the final step of a stage to land exactly on the boundary.
//! Records are never mutated or retracted after append.

use serde::{Deserialize, Serialize};

use crate::constants::HOURS_PER_DAY;
use crate::error::{Result, SimError};
use crate::ledger::StepBalance;
use crate::state::SimulationState;

/// One immutable snapshot of the run's diagnostic quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub t_h: f64,
    pub t_d: f64,
    /// Total cavern volume, bbl.
    pub v_cav_bbl: f64,
    /// Signed relative mass-balance residual for the step ending here.
    pub err_ode: f64,
    /// Brine sg at the production point.
    pub sg_out: f64,
    /// Volume-weighted mean brine sg.
    pub sg_ave: f64,
    /// Insoluble solids settled so far, bbl.
    pub v_insol_bbl: f64,
    /// Bed-top elevation, ft.
    pub z_insol_ft: f64,
    /// Brine/product interface elevation, ft.
    pub z_obi_ft: f64,
    /// Cumulative vented volume, bbl.
    pub v_vented_bbl: f64,
    /// Instantaneous injection rate, bbl/d.
    pub q_inj_bbl_per_day: f64,
    /// Instantaneous product fill rate, bbl/d.
    pub q_fill_bbl_per_day: f64,
    /// Cumulative injected volume, bbl.
    pub v_inj_bbl: f64,
    /// Cumulative product fill volume, bbl.
    pub v_fill_bbl: f64,
    pub stage: usize,
    pub balance_violated: bool,
}

impl ResultRecord {
    /// Capture the current state. `sg_out` is sampled at the production
    /// point when one exists, otherwise at the top active node.
    pub fn capture(
        state: &SimulationState,
        stage: usize,
        balance: &StepBalance,
        sg_out: f64,
        q_inj_bbl_per_day: f64,
        q_fill_bbl_per_day: f64,
    ) -> ResultRecord {
        ResultRecord {
            t_h: state.elapsed_h,
            t_d: state.elapsed_h / HOURS_PER_DAY,
            v_cav_bbl: state.cavern_volume_bbl(),
            err_ode: balance.relative_residual,
            sg_out,
            sg_ave: state.average_brine_sg(),
            v_insol_bbl: state.insolubles.solid_volume_bbl(),
            z_insol_ft: state.insolubles.top_elevation_ft(),
            z_obi_ft: state.obi_elevation_ft,
            v_vented_bbl: state.ledger.cumulative_vented_bbl,
            q_inj_bbl_per_day,
            q_fill_bbl_per_day,
            v_inj_bbl: state.ledger.cumulative_injected_bbl,
            v_fill_bbl: state.ledger.cumulative_fill_bbl,
            stage,
            balance_violated: balance.violated,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultsRecorder {
    records: Vec<ResultRecord>,
}

impl ResultsRecorder {
    pub fn new() -> ResultsRecorder {
        ResultsRecorder::default()
    }

    /// Append one record. Elapsed time must strictly increase.
    pub fn append(&mut self, record: ResultRecord) -> Result<()> {
        if let Some(last) = self.records.last() {
            if record.t_h <= last.t_h {
                return Err(SimError::NumericalDivergence {
                    t_h: record.t_h,
                    reason: format!(
                        "record time {} h does not advance past {} h",
                        record.t_h, last.t_h
                    ),
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// The initial boundary snapshot bypasses the monotonicity check only
    /// because nothing precedes it.
    pub fn append_initial(&mut self, record: ResultRecord) {
        debug_assert!(self.records.is_empty());
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&ResultRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }
}
