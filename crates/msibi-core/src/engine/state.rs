use super::error::EngineError;
use crate::core::correction::AlphaSchedule;
use crate::io::traits::{TrajectoryData, TrajectoryReader};
use std::path::{Path, PathBuf};

const DEFAULT_TRAJ_FILE: &str = "query.xyz";

/// One thermodynamic state of a multistate optimization.
///
/// A state owns a working directory that persists across iterations: the
/// engine runs its query simulation there, and the trajectory it produces is
/// reloaded after every run.
#[derive(Debug)]
pub struct State {
    name: String,
    kt: f64,
    dir: PathBuf,
    traj_file: String,
    top_file: Option<String>,
    alpha: AlphaSchedule,
    backup_trajectory: bool,
    trajectory: Option<TrajectoryData>,
}

impl State {
    pub fn new(kt: f64, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: format!("state-{kt:.3}"),
            kt,
            dir: dir.into(),
            traj_file: DEFAULT_TRAJ_FILE.to_string(),
            top_file: None,
            alpha: AlphaSchedule::Constant(1.0),
            backup_trajectory: false,
            trajectory: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_traj_file(mut self, file: impl Into<String>) -> Self {
        self.traj_file = file.into();
        self
    }

    pub fn with_top_file(mut self, file: impl Into<String>) -> Self {
        self.top_file = Some(file.into());
        self
    }

    pub fn with_alpha(mut self, alpha: AlphaSchedule) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_backup_trajectory(mut self, backup: bool) -> Self {
        self.backup_trajectory = backup;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kt(&self) -> f64 {
        self.kt
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn traj_path(&self) -> PathBuf {
        self.dir.join(&self.traj_file)
    }

    pub fn top_path(&self) -> Option<PathBuf> {
        self.top_file.as_ref().map(|f| self.dir.join(f))
    }

    #[inline]
    pub fn alpha(&self) -> AlphaSchedule {
        self.alpha
    }

    #[inline]
    pub fn backup_trajectory(&self) -> bool {
        self.backup_trajectory
    }

    /// Re-reads the query trajectory, replacing whatever frames were loaded
    /// before. Called once after every completed simulation.
    pub fn reload_trajectory(&mut self, reader: &dyn TrajectoryReader) -> Result<(), EngineError> {
        let data = reader.read(&self.traj_path(), self.top_path().as_deref())?;
        self.trajectory = Some(data);
        Ok(())
    }

    #[inline]
    pub fn trajectory(&self) -> Option<&TrajectoryData> {
        self.trajectory.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_is_derived_from_kt() {
        let state = State::new(1.5, "/tmp/s0");
        assert_eq!(state.name(), "state-1.500");
    }

    #[test]
    fn explicit_name_overrides_the_default() {
        let state = State::new(1.5, "/tmp/s0").with_name("liquid");
        assert_eq!(state.name(), "liquid");
    }

    #[test]
    fn paths_are_resolved_inside_the_state_dir() {
        let state = State::new(1.0, "/work/s0").with_top_file("top.txt");
        assert_eq!(state.traj_path(), PathBuf::from("/work/s0/query.xyz"));
        assert_eq!(state.top_path(), Some(PathBuf::from("/work/s0/top.txt")));
    }
}
