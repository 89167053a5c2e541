//! Desk Sim - randomized session simulation and scenario replay
//!
//! - [`run_simulator`] drives a [`SessionManager`](desk_session::SessionManager)
//!   with a seeded sequence of operations and checks the tab invariants
//!   after every step
//! - [`run_scenario`] replays the reference autosave and eviction scenarios
//!   on the paused tokio clock

pub mod scenarios;
pub mod simulator;

pub use scenarios::{run_scenario, Scenario, ScenarioReport};
pub use simulator::{
    run_simulator, SimulatedOperation, SimulatorConfig, SimulatorReport, SimulatorStats, Violation,
};
