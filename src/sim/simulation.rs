//! The run controller.
//!
//! Owns the single live `SimulationState`, drives the stage scheduler and
//! the step integrator across the whole schedule, and collects the
//! append-only result stream. Observer ops are notified read-only at init,
//! after every record, and at the end of the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tracing::info;

use crate::constants::{
    DEFAULT_BALANCE_TOLERANCE, DEFAULT_MAX_CONSECUTIVE_VIOLATIONS,
    DEFAULT_SEDIMENT_PACKING_FRACTION,
};
use crate::empirical::{CorrelationTable, DEFAULT_TABLE};
use crate::error::{Result, SimError};
use crate::geometry::CavernProfile;
use crate::insolubles::InsolubleBed;
use crate::ledger::{MassBalanceLedger, StepBalance};
use crate::sim::integrator::{StepConfig, StepIntegrator, StepOutcome};
use crate::sim::recorder::{ResultRecord, ResultsRecorder};
use crate::sim::sim_op::{SimOp, SimOpHandle};
use crate::stage::{Schedule, Stage, StageScheduler, StageStatus, StopCondition, stage_time_done};
use crate::state::SimulationState;

/// Smallest fraction of a step used when interpolating to a target
/// crossing, so record times keep advancing.
const MIN_CROSSING_FRACTION: f64 = 1.0e-6;

#[derive(Debug, Clone)]
pub struct OpTiming {
    pub op_name: String,
    pub init_time: Duration,
    pub total_update_time: Duration,
    pub update_call_count: u32,
    pub after_time: Duration,
}

impl OpTiming {
    pub fn new(op_name: String) -> Self {
        Self {
            op_name,
            init_time: Duration::ZERO,
            total_update_time: Duration::ZERO,
            update_call_count: 0,
            after_time: Duration::ZERO,
        }
    }

    pub fn avg_update_time(&self) -> Duration {
        if self.update_call_count > 0 {
            self.total_update_time / self.update_call_count
        } else {
            Duration::ZERO
        }
    }

    pub fn total_time(&self) -> Duration {
        self.init_time + self.total_update_time + self.after_time
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Complete,
    Aborted { stage_index: usize, error: SimError },
}

pub struct SimProps {
    pub name: String,
    pub schedule: Schedule,
    pub profile: CavernProfile,
    /// Well-mixed initial brine specific gravity.
    pub initial_brine_sg: f64,
    /// Solid insolubles already on the floor at run start, bbl.
    pub initial_insoluble_bbl: f64,
    pub sediment_packing_fraction: f64,
    pub table: Arc<CorrelationTable>,
    pub step: StepConfig,
    pub balance_tolerance: f64,
    pub max_consecutive_violations: u32,
    pub ops: Vec<SimOpHandle>,
    /// Cooperative cancellation, checked once per step boundary.
    pub cancel: Option<Arc<AtomicBool>>,
    pub debug: bool,
}

impl SimProps {
    /// Props with documented defaults for everything but the scenario.
    pub fn new(name: &str, schedule: Schedule, profile: CavernProfile) -> SimProps {
        SimProps {
            name: name.to_string(),
            schedule,
            profile,
            initial_brine_sg: 1.0003,
            initial_insoluble_bbl: 0.0,
            sediment_packing_fraction: DEFAULT_SEDIMENT_PACKING_FRACTION,
            table: Arc::new(DEFAULT_TABLE.clone()),
            step: StepConfig::default(),
            balance_tolerance: DEFAULT_BALANCE_TOLERANCE,
            max_consecutive_violations: DEFAULT_MAX_CONSECUTIVE_VIOLATIONS,
            ops: Vec::new(),
            cancel: None,
            debug: false,
        }
    }
}

pub struct Simulation {
    pub name: String,
    schedule: Schedule,
    scheduler: StageScheduler,
    integrator: StepIntegrator,
    state: SimulationState,
    recorder: ResultsRecorder,
    ops: Vec<Box<dyn SimOp>>,
    op_timings: Vec<OpTiming>,
    cancel: Option<Arc<AtomicBool>>,
    status: Option<RunStatus>,
    debug: bool,
}

impl Simulation {
    /// Validate the whole scenario and assemble the run. All configuration
    /// errors surface here, before any stepping.
    pub fn new(props: SimProps) -> Result<Simulation> {
        props.schedule.validate(&props.profile, &props.table)?;
        let integrator = StepIntegrator::new(props.table.clone(), props.step.clone())?;
        let bed = InsolubleBed::new(
            props.initial_insoluble_bbl,
            props.sediment_packing_fraction,
            &props.profile,
        )?;
        let ledger =
            MassBalanceLedger::new(props.balance_tolerance, props.max_consecutive_violations)?;
        let state = SimulationState::initial(
            props.profile,
            props.initial_brine_sg,
            bed,
            ledger,
            &props.table,
            props.step.temperature_degc,
        )?;

        let ops: Vec<Box<dyn SimOp>> = props.ops.into_iter().map(|handle| handle.op).collect();
        let op_timings = ops
            .iter()
            .map(|op| OpTiming::new(op.name().to_string()))
            .collect();

        Ok(Simulation {
            name: props.name,
            scheduler: StageScheduler::new(props.schedule.len()),
            schedule: props.schedule,
            integrator,
            state,
            recorder: ResultsRecorder::new(),
            ops,
            op_timings,
            cancel: props.cancel,
            status: None,
            debug: props.debug,
        })
    }

    /// Run the schedule to completion or abort. Running again returns the
    /// stored status without stepping.
    pub fn run(&mut self) -> RunStatus {
        if let Some(status) = &self.status {
            return status.clone();
        }
        info!(name = %self.name, stages = self.schedule.len(), "starting run");
        self.ops_init();

        let initial = ResultRecord::capture(
            &self.state,
            0,
            &StepBalance::zero(),
            self.state.brine_sg_at(self.state.obi_elevation_ft),
            0.0,
            0.0,
        );
        self.recorder.append_initial(initial);

        let mut aborted = None;
        while let Some(stage_index) = self.scheduler.activate_next() {
            let stage = self.schedule.stages[stage_index].clone();
            match self.run_stage(stage_index, &stage) {
                Ok(()) => self.scheduler.complete_current(),
                Err(error) => {
                    self.scheduler.abort_current();
                    aborted = Some(RunStatus::Aborted { stage_index, error });
                    break;
                }
            }
        }
        let status = aborted.unwrap_or(RunStatus::Complete);

        self.status = Some(status.clone());
        self.ops_after();
        if self.debug {
            self.print_timing_report();
        }
        status
    }

    fn run_stage(&mut self, stage_index: usize, stage: &Stage) -> Result<()> {
        let mut elapsed_in_stage = 0.0_f64;
        loop {
            if self.cancel_requested() {
                return Err(SimError::Cancelled);
            }
            if stage_time_done(elapsed_in_stage, stage.duration_h) {
                return Ok(());
            }

            let target = match stage.stop {
                StopCondition::TargetVolume { target_bbl } => {
                    if self.state.cavern_volume_bbl() >= target_bbl {
                        return Ok(());
                    }
                    Some(target_bbl)
                }
                StopCondition::DurationElapsed => None,
            };

            let dt_req = self
                .integrator
                .config()
                .time_step_h
                .min(stage.duration_h - elapsed_in_stage);
            let snapshot = target.map(|_| self.state.clone());
            let v_before = self.state.cavern_volume_bbl();

            let mut outcome =
                self.integrator
                    .advance(&mut self.state, stage, elapsed_in_stage, dt_req)?;

            if let (Some(target_bbl), Some(pre_state)) = (target, snapshot) {
                let v_after = self.state.cavern_volume_bbl();
                if v_after >= target_bbl {
                    if v_after > v_before {
                        // First-crossing semantics: re-integrate the step
                        // over the interpolated fraction so the stage ends
                        // at the crossing instant instead of overshooting.
                        let frac = ((target_bbl - v_before) / (v_after - v_before))
                            .clamp(MIN_CROSSING_FRACTION, 1.0);
                        if frac < 1.0 {
                            self.state = pre_state;
                            outcome = self.integrator.advance(
                                &mut self.state,
                                stage,
                                elapsed_in_stage,
                                outcome.dt_h * frac,
                            )?;
                        }
                    }
                    self.finish_step(stage_index, &outcome)?;
                    return Ok(());
                }
            }

            elapsed_in_stage += outcome.dt_h;
            self.finish_step(stage_index, &outcome)?;
        }
    }

    fn finish_step(&mut self, stage_index: usize, outcome: &StepOutcome) -> Result<()> {
        let record = ResultRecord::capture(
            &self.state,
            stage_index,
            &outcome.balance,
            outcome.outlet_sg,
            outcome.q_inj_bbl_per_day,
            outcome.q_fill_bbl_per_day,
        );
        self.recorder.append(record)?;
        self.ops_update();
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn ops_init(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            op.init_sim(self);
            self.op_timings[i].init_time = start.elapsed();
        }
        self.ops = ops;
    }

    fn ops_update(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            op.update_sim(self);
            self.op_timings[i].total_update_time += start.elapsed();
            self.op_timings[i].update_call_count += 1;
        }
        self.ops = ops;
    }

    fn ops_after(&mut self) {
        let mut ops = std::mem::take(&mut self.ops);
        for (i, op) in ops.iter_mut().enumerate() {
            let start = Instant::now();
            op.after_sim(self);
            self.op_timings[i].after_time = start.elapsed();
        }
        self.ops = ops;
    }

    pub fn records(&self) -> &[ResultRecord] {
        self.recorder.records()
    }

    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    pub fn stage_statuses(&self) -> &[StageStatus] {
        self.scheduler.statuses()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn op_timings(&self) -> &[OpTiming] {
        &self.op_timings
    }

    /// Consume the run and keep only its permanent output.
    pub fn into_results(self) -> (Vec<ResultRecord>, Option<RunStatus>) {
        (self.recorder.into_records(), self.status)
    }

    pub fn print_timing_report(&self) {
        println!("\n{}", "=== RUN TIMING REPORT ===".bold());
        println!("records: {}", self.recorder.len());

        let mut total_time = Duration::ZERO;
        for timing in &self.op_timings {
            total_time += timing.total_time();
        }
        for timing in &self.op_timings {
            println!(
                "  {:<24} | total {:>8.2?} | avg/step {:>8.2?} | init {:>6.2?} | after {:>6.2?}",
                timing.op_name.cyan(),
                timing.total_time(),
                timing.avg_update_time(),
                timing.init_time,
                timing.after_time,
            );
        }
        println!("op time across run: {:.2?}", total_time);
        println!("{}\n", "=== END TIMING REPORT ===".bold());
    }
}
