//! Internal implementation details of the simulation engine.
//!
//! Nothing in here is needed to write a mission model, but the driver and the
//! scheduler reach into it for incremental simulation.

pub mod cells;
pub mod engine;
pub mod reducer;
pub mod timeline;
