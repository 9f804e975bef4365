//! Places layer graphs onto backends and runs them.

pub mod config;
pub mod executor;
pub mod placement;
pub mod plan;

pub use config::*;
pub use executor::*;
pub use placement::place;
pub use plan::{ExecutionPlan, LayerState};
