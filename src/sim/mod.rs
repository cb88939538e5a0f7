pub mod integrator;
pub mod recorder;
pub mod sim_op;
pub mod simulation;

pub use integrator::{StepConfig, StepIntegrator, StepOutcome};
pub use recorder::{ResultRecord, ResultsRecorder};
pub use simulation::{RunStatus, SimProps, Simulation};
