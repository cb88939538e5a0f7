use std::fs::OpenOptions;
use std::io::Write;

use tracing::{error, info};

use crate::sim::sim_op::{SimOp, SimOpHandle};
use crate::sim::Simulation;

/// CSV Writer Operator
///
/// Writes the full result stream to a CSV file once the run has reached its
/// terminal status. Buffering until `after_sim` keeps file I/O out of the
/// stepping hot path; the sink only ever sees whole records.
///
/// Columns mirror the result record: time, cavern volume, balance error,
/// outlet/average sg, insolubles, interface, vented/injected/fill volumes
/// and rates, stage index.
pub struct CsvWriterOp {
    /// Path to the CSV file to write (created or overwritten)
    pub file_path: String,
}

impl CsvWriterOp {
    pub fn new(file_path: String) -> Self {
        Self { file_path }
    }

    pub fn handle(file_path: String) -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new(file_path)))
    }

    fn write_all(&self, sim: &Simulation) -> Result<(), std::io::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;

        writeln!(
            file,
            "t_d,v_cav_bbl,err_ode,sg_out,sg_ave,v_insol_bbl,z_insol_ft,z_obi_ft,\
             v_vented_bbl,q_inj_bbl_per_day,q_fill_bbl_per_day,v_inj_bbl,v_fill_bbl,stage"
        )?;
        for r in sim.records() {
            writeln!(
                file,
                "{:.6},{:.4},{:.6e},{:.6},{:.6},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
                r.t_d,
                r.v_cav_bbl,
                r.err_ode,
                r.sg_out,
                r.sg_ave,
                r.v_insol_bbl,
                r.z_insol_ft,
                r.z_obi_ft,
                r.v_vented_bbl,
                r.q_inj_bbl_per_day,
                r.q_fill_bbl_per_day,
                r.v_inj_bbl,
                r.v_fill_bbl,
                r.stage
            )?;
        }
        Ok(())
    }
}

impl SimOp for CsvWriterOp {
    fn name(&self) -> &str {
        "CsvWriter"
    }

    fn after_sim(&mut self, sim: &Simulation) {
        match self.write_all(sim) {
            Ok(()) => info!(path = %self.file_path, records = sim.records().len(), "wrote result CSV"),
            Err(e) => error!(path = %self.file_path, "failed to write result CSV: {e}"),
        }
    }
}
