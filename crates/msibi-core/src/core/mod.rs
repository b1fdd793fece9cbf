//! Stateless numerics: grids and distributions, histogram sampling, the
//! f-fit similarity score, potential forms, and the Boltzmann-inversion
//! correction math. Nothing in this layer touches the filesystem or spawns
//! processes.

pub mod correction;
pub mod grid;
pub mod potentials;
pub mod sampling;
pub mod similarity;
pub mod topology;
