//! Optimization engine: states, force tables, the simulation dispatch loop
//! and the adapter seam to the external simulation engine.

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod forces;
pub mod progress;
pub mod state;
