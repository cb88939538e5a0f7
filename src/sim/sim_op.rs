mod sim_op_csv_writer;
mod sim_op_progress_reporter;

pub use sim_op_csv_writer::CsvWriterOp;
pub use sim_op_progress_reporter::ProgressReporterOp;

use crate::sim::Simulation;

/// Read-only observer hooked into the run lifecycle.
///
/// Ops never touch the simulation state; they consume the record stream and
/// the public accessors. Anything with real I/O should do it in `after_sim`
/// so nothing blocks the per-step hot path.
pub trait SimOp {
    /// The name of this operator (for identification and timing reports)
    fn name(&self) -> &str;

    /// Called once before the first stage activates
    fn init_sim(&mut self, _sim: &Simulation) {
        // Default implementation does nothing
    }

    /// Called after every appended record
    fn update_sim(&mut self, _sim: &Simulation) {
        // Default implementation does nothing
    }

    /// Called once after the run reaches its terminal status
    fn after_sim(&mut self, _sim: &Simulation) {
        // Default implementation does nothing
    }
}

pub struct SimOpHandle {
    pub op: Box<dyn SimOp>,
}

impl SimOpHandle {
    pub fn new(op: Box<dyn SimOp>) -> Self {
        SimOpHandle { op }
    }
}
