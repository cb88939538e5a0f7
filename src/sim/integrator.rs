//! The per-step integration engine.
//!
//! Explicit forward (Euler-class) update with a fixed evaluation order that
//! breaks the geometry/concentration cycle: read concentrations, compute
//! dissolution increments, apply them to the geometry, then recompute
//! concentrations for the next step. Never mutates mid-read.
//!
//! The step size is only ever shortened: the controller trims it to land on
//! stage boundaries and target crossings, and `advance` halves it when a
//! trial step leaves the valid range. A step that stays invalid after all
//! shortenings is a numerical divergence and aborts the active stage.

use std::sync::Arc;

use tracing::debug;

use crate::constants::{
    DEFAULT_INSOLUBLE_FRACTION, DEFAULT_MAX_STEP_SHORTENINGS, DEFAULT_TEMPERATURE_DEGC,
    DEFAULT_TIME_STEP_H, ELEVATION_EPS_FT, FRESH_WATER_SG_FLOOR, HOURS_PER_DAY, SG_BOUNDS_SLACK,
};
use crate::empirical::CorrelationTable;
use crate::error::{Result, SimError};
use crate::ledger::StepBalance;
use crate::stage::Stage;
use crate::state::SimulationState;

#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Nominal step size; the integrator may take shorter steps, never
    /// longer ones.
    pub time_step_h: f64,
    /// Cavern temperature for all correlation lookups; solubility is not
    /// temperature-stepped within a run.
    pub temperature_degc: f64,
    /// Volume fraction of the leached formation that is insoluble.
    pub insoluble_fraction: f64,
    /// Halving attempts before a step is declared divergent.
    pub max_shortenings: u32,
}

impl Default for StepConfig {
    fn default() -> StepConfig {
        StepConfig {
            time_step_h: DEFAULT_TIME_STEP_H,
            temperature_degc: DEFAULT_TEMPERATURE_DEGC,
            insoluble_fraction: DEFAULT_INSOLUBLE_FRACTION,
            max_shortenings: DEFAULT_MAX_STEP_SHORTENINGS,
        }
    }
}

impl StepConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.time_step_h.is_finite() || self.time_step_h <= 0.0 {
            return Err(SimError::Configuration(format!(
                "time step {} h must be positive",
                self.time_step_h
            )));
        }
        if !(0.0..1.0).contains(&self.insoluble_fraction) {
            return Err(SimError::Configuration(format!(
                "insoluble fraction {} must be in [0, 1)",
                self.insoluble_fraction
            )));
        }
        if self.max_shortenings == 0 {
            return Err(SimError::Configuration(
                "at least one step-shortening attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Volumes and diagnostics produced by one accepted step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The step size actually taken, h.
    pub dt_h: f64,
    pub injected_bbl: f64,
    pub produced_bbl: f64,
    pub vented_bbl: f64,
    pub fill_bbl: f64,
    /// Geometric void growth this step, bbl.
    pub delta_void_bbl: f64,
    pub balance: StepBalance,
    pub outlet_sg: f64,
    pub q_inj_bbl_per_day: f64,
    pub q_fill_bbl_per_day: f64,
}

pub struct StepIntegrator {
    table: Arc<CorrelationTable>,
    config: StepConfig,
}

impl StepIntegrator {
    pub fn new(table: Arc<CorrelationTable>, config: StepConfig) -> Result<StepIntegrator> {
        config.validate()?;
        Ok(StepIntegrator { table, config })
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Take one step of at most `dt_h`, halving on invalid trial states.
    /// The state is restored to its pre-step snapshot on every failure path.
    pub fn advance(
        &self,
        state: &mut SimulationState,
        stage: &Stage,
        stage_elapsed_h: f64,
        dt_h: f64,
    ) -> Result<StepOutcome> {
        let snapshot = state.clone();
        let mut dt = dt_h;
        let mut last_failure = String::new();

        for attempt in 0..=self.config.max_shortenings {
            match self.try_step(state, stage, stage_elapsed_h, dt) {
                Ok(outcome) => return Ok(outcome),
                Err(StepFailure::Fatal(err)) => {
                    *state = snapshot;
                    return Err(err);
                }
                Err(StepFailure::Unstable(reason)) => {
                    debug!(attempt, dt_h = dt, %reason, "trial step rejected, shortening");
                    last_failure = reason;
                    *state = snapshot.clone();
                    dt *= 0.5;
                }
            }
        }
        *state = snapshot;
        Err(SimError::NumericalDivergence {
            t_h: state.elapsed_h,
            reason: format!(
                "step still invalid after {} shortenings: {last_failure}",
                self.config.max_shortenings
            ),
        })
    }

    fn try_step(
        &self,
        state: &mut SimulationState,
        stage: &Stage,
        stage_elapsed_h: f64,
        dt_h: f64,
    ) -> std::result::Result<StepOutcome, StepFailure> {
        let temp = self.config.temperature_degc;
        let table = &*self.table;

        let q_inj_bph = stage.rate_bbl_per_hour(stage_elapsed_h);
        let q_fill_bph = stage.fill_rate_bbl_per_hour();
        let injected = q_inj_bph * dt_h;
        let fill = q_fill_bph * dt_h;

        let wt_sat = table.saturated_wt_pct(temp).map_err(StepFailure::Fatal)?;
        let sat_sg = table.saturated_sg(temp).map_err(StepFailure::Fatal)?;

        let z_bed = state.insolubles.top_elevation_ft();
        let z_obi = state.obi_elevation_ft;
        let node_count = state.profile.node_count();
        let floor = state.profile.floor_elevation_ft();
        let ceiling = state.profile.ceiling_elevation_ft();

        // (1) Dissolution increments from the start-of-step concentrations.
        let mut growth_ft = vec![0.0; node_count];
        for (i, node) in state.profile.nodes().iter().enumerate() {
            let z = node.elevation_ft;
            if z < z_bed - ELEVATION_EPS_FT || z > z_obi + ELEVATION_EPS_FT {
                continue;
            }
            let wt = table
                .wt_pct_from_sg(state.brine_sg[i])
                .map_err(StepFailure::Fatal)?;
            let under = ((wt_sat - wt) / wt_sat).clamp(0.0, 1.0);
            let rate = table
                .recession_rate(under, temp)
                .map_err(StepFailure::Fatal)?;
            growth_ft[i] = rate * dt_h;
        }

        // (2) Single sequential mutation pass over the geometry.
        let bands_before = state.profile.node_band_volumes_bbl(floor, ceiling);
        let v_cav_before = state.profile.volume_bbl();
        for (i, dr) in growth_ft.iter().enumerate() {
            if *dr > 0.0 {
                state.profile.apply_radial_growth(i, *dr);
            }
        }
        let bands_after = state.profile.node_band_volumes_bbl(floor, ceiling);
        let delta_void = state.profile.volume_bbl() - v_cav_before;

        // (3) Partition wall retreat into dissolved salt and released solids.
        let insol_solid = delta_void * self.config.insoluble_fraction;
        state
            .insolubles
            .accumulate(insol_solid, &state.profile)
            .map_err(StepFailure::Fatal)?;

        // (4) Concentration update: dissolution source, then upwind
        // advection along the injection→production path.
        let active_bands = state.active_band_volumes_bbl();
        let mut sg_next = state.brine_sg.clone();
        for i in 0..node_count {
            let band = active_bands[i];
            if band <= 0.0 {
                continue;
            }
            let salt_solid = (bands_after[i] - bands_before[i]).max(0.0)
                * (1.0 - self.config.insoluble_fraction);
            if salt_solid > 0.0 {
                let mixed = sg_next[i]
                    + (crate::constants::RHO_NACL_SOLID_SG - sg_next[i]) * (salt_solid / band).min(1.0);
                sg_next[i] = mixed.min(sat_sg);
            }
        }

        let shut_in = stage.is_shut_in();
        let mut outlet_node = None;
        if !shut_in && injected > 0.0 {
            let clamp_z = |z: f64| z.clamp(state.insolubles.top_elevation_ft(), z_obi);
            let inj_node = state.profile.nearest_node(clamp_z(stage.injection_elevation_ft));
            let prod_node = stage
                .production_elevation_ft
                .map(|z| state.profile.nearest_node(clamp_z(z)));
            outlet_node = prod_node;

            let path: Vec<usize> = match prod_node {
                Some(p) if p >= inj_node => (inj_node..=p).collect(),
                Some(p) => (p..=inj_node).rev().collect(),
                None => vec![inj_node],
            };
            let mut upstream = stage.injection_sg;
            for &k in &path {
                let band = active_bands[k];
                if band <= 0.0 {
                    continue;
                }
                let frac = (q_inj_bph * dt_h / band).min(1.0);
                let old = state.brine_sg[k];
                sg_next[k] += frac * (upstream - sg_next[k]);
                upstream = old;
            }
        }

        // Trial-state sanity: concentrations must stay physical.
        let sg_floor = FRESH_WATER_SG_FLOOR.min(stage.injection_sg) - SG_BOUNDS_SLACK;
        let sg_ceil = sat_sg + SG_BOUNDS_SLACK;
        for (i, sg) in sg_next.iter().enumerate() {
            if active_bands[i] > 0.0 && (!sg.is_finite() || *sg < sg_floor || *sg > sg_ceil) {
                return Err(StepFailure::Unstable(format!(
                    "brine sg {sg} at node {i} left [{sg_floor:.4}, {sg_ceil:.4}]"
                )));
            }
        }
        state.brine_sg = sg_next;

        // (5) Product fill lowers the interface.
        if fill > 0.0 {
            state.product_volume_bbl += fill;
            state.obi_elevation_ft = state
                .profile
                .elevation_at_volume_below(ceiling, state.product_volume_bbl);
        }

        // (6) Continuity. New void demands fluid; dissolved salt gives some
        // back as brine swell; whatever inflow is left over leaves through
        // production or, without a production path, the vent. Nothing is
        // silently discarded.
        let salt_solid_total = delta_void - insol_solid;
        let swell = crate::constants::DISSOLVED_SALT_SWELL_FACTOR * salt_solid_total;
        // Net external fluid the cavern absorbs this step, split between the
        // cavern term and the bed term of the ledger.
        let water_demand = delta_void - insol_solid - swell;
        let delta_fluid = water_demand - insol_solid;
        let (produced, vented) = if shut_in {
            (0.0, 0.0)
        } else if stage.production_elevation_ft.is_some() {
            ((injected + fill - water_demand).max(0.0), 0.0)
        } else {
            (0.0, (injected + fill - water_demand).max(0.0))
        };

        // (7) Close the ledger. A shut-in step exchanges no fluid with the
        // surface, so it posts zeros; void growth shows up in the records
        // as cavern volume, not as a ledger flow.
        let balance = if shut_in {
            state
                .ledger
                .record_step(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
                .map_err(StepFailure::Fatal)?
        } else {
            state
                .ledger
                .record_step(injected, fill, produced, delta_fluid, insol_solid, vented)
                .map_err(StepFailure::Fatal)?
        };

        state.elapsed_h += dt_h;

        let outlet_sg = match outlet_node {
            Some(n) => state.brine_sg[n],
            None => state.brine_sg_at(state.obi_elevation_ft),
        };

        Ok(StepOutcome {
            dt_h,
            injected_bbl: injected,
            produced_bbl: produced,
            vented_bbl: vented,
            fill_bbl: fill,
            delta_void_bbl: delta_void,
            balance,
            outlet_sg,
            q_inj_bbl_per_day: q_inj_bph * HOURS_PER_DAY,
            q_fill_bbl_per_day: q_fill_bph * HOURS_PER_DAY,
        })
    }
}

enum StepFailure {
    /// Retry with a shorter step.
    Unstable(String),
    /// Abort the active stage.
    Fatal(SimError),
}
