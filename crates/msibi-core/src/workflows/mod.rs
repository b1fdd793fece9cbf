//! High-level entry points that tie states, forces, and the simulation
//! engine together into complete optimization runs.

pub mod optimize;

pub use optimize::Msibi;
