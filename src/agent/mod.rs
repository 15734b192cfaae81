//! Processing agents
//!
//! The handler contract, the registry that holds one live handler per type,
//! and simulated handlers used by the CLI and tests.

pub mod handler;
pub mod registry;
pub mod simulated;

pub use handler::Handler;
pub use registry::AgentRegistry;
pub use simulated::{SimulatedHandler, SIMULATE_FAILURE_KEY};
