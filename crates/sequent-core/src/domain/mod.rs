//! Domain model: identifiers and state machines.

pub mod ids;
pub mod state;

pub use ids::TaskId;
pub use state::{FutureState, ServiceState};
