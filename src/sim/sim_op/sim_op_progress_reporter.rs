use colored::Colorize;

use crate::sim::sim_op::{SimOp, SimOpHandle};
use crate::sim::Simulation;

/// Console progress reporter.
///
/// Prints a one-line summary every `report_every` records. Useful for long
/// schedules; leave it out of headless runs.
pub struct ProgressReporterOp {
    pub report_every: usize,
    seen: usize,
}

impl ProgressReporterOp {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            seen: 0,
        }
    }

    pub fn handle(report_every: usize) -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new(report_every)))
    }
}

impl SimOp for ProgressReporterOp {
    fn name(&self) -> &str {
        "ProgressReporter"
    }

    fn init_sim(&mut self, sim: &Simulation) {
        println!("{} {}", "▶ run".green().bold(), sim.name);
    }

    fn update_sim(&mut self, sim: &Simulation) {
        self.seen += 1;
        if self.seen % self.report_every != 0 {
            return;
        }
        if let Some(r) = sim.records().last() {
            println!(
                "  t = {:>9.3} d | V_cav = {:>12.1} bbl | sg_out = {:.4} | stage {}",
                r.t_d, r.v_cav_bbl, r.sg_out, r.stage
            );
        }
    }

    fn after_sim(&mut self, sim: &Simulation) {
        let label = match sim.status() {
            Some(status) if *status == crate::sim::RunStatus::Complete => "complete".green(),
            _ => "aborted".red(),
        };
        println!("{} {} ({} records)", "■ run".bold(), label, sim.records().len());
    }
}
