use crate::core::sampling::Frame;
use crate::core::topology::{Topology, TopologyError};
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Frames plus the bonded structure they were recorded under.
#[derive(Debug, Clone)]
pub struct TrajectoryData {
    pub frames: Vec<Frame>,
    pub topology: Topology,
}

/// Defines the interface for loading particle trajectories.
///
/// The optimizer treats trajectory parsing as a synchronous external
/// service: given a trajectory file and an optional topology file, an
/// implementation returns an ordered, frame-indexed sequence of positions
/// together with the bead types and bonds needed for sampling.
pub trait TrajectoryReader: Send + Sync {
    fn read(&self, traj_path: &Path, top_path: Option<&Path>)
        -> Result<TrajectoryData, TrajectoryError>;
}
