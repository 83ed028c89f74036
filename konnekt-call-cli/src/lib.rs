pub mod application;
pub mod infrastructure;

pub use application::{
    envelope_schema, inspect, run_simulation, Inspection, SimulationConfig, SimulationReport,
};
pub use infrastructure::{CliError, LogConfig, Result};
