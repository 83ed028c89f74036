pub mod inspect;
pub mod schema;
pub mod simulate;

pub use inspect::{inspect, inspect_line, Inspection};
pub use schema::envelope_schema;
pub use simulate::{
    run_simulation, ConnectionReport, ParticipantReport, SimulationConfig, SimulationReport,
};
