use crate::core::correction::CorrectionError;
use crate::core::grid::GridError;
use crate::core::potentials::PotentialError;
use crate::core::sampling::SamplingError;
use crate::io::table::TableError;
use crate::io::traits::TrajectoryError;
use thiserror::Error;

/// One state's failed query simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFailure {
    pub state: String,
    pub reason: String,
}

pub(crate) fn format_failures(failures: &[StateFailure]) -> String {
    let list: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.state, f.reason))
        .collect();
    format!(
        "Query simulation failed for {} state(s): {}",
        failures.len(),
        list.join(", ")
    )
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data error: {source}")]
    Data {
        #[from]
        source: SamplingError,
    },

    #[error("Data error: {source}")]
    Distribution {
        #[from]
        source: GridError,
    },

    #[error("Potential correction failed: {source}")]
    Correction {
        #[from]
        source: CorrectionError,
    },

    #[error("Invalid potential form: {source}")]
    Potential {
        #[from]
        source: PotentialError,
    },

    #[error("State '{state}' is already registered with force '{force}'")]
    DuplicateState { force: String, state: String },

    #[error("Unsupported form or engine target: {0}")]
    UnsupportedForm(String),

    #[error("{}", format_failures(failures))]
    SimulationFailure { failures: Vec<StateFailure> },

    #[error("Trajectory read failed: {source}")]
    Trajectory {
        #[from]
        source: TrajectoryError,
    },

    #[error("Table I/O failed: {source}")]
    Table {
        #[from]
        source: TableError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
