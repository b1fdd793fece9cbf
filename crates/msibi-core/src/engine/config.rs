use crate::core::grid::{Grid, GridError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Global run parameters shared by every optimized pair term.
///
/// `r_switch` defaults to five bins below the end of the potential grid, and
/// the potential cutoff defaults to the distribution cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsibiConfig {
    /// Upper cutoff of the pair distribution grid.
    pub rdf_cutoff: f64,
    /// Number of bins in the pair grids.
    pub n_rdf_points: usize,
    /// Upper cutoff of the pair potential grid.
    pub pot_cutoff: f64,
    /// Radius beyond which the tail correction forces the potential to zero.
    pub r_switch: f64,
    /// Low-pass filter the sampled distributions before scoring/correcting.
    pub smooth_rdfs: bool,
    /// Moving-average window used when smoothing is enabled.
    pub smoothing_window: usize,
    /// Cap on trajectory frames consulted per distribution.
    pub max_frames: usize,
    /// Integration time step handed to the engine adapter.
    pub dt: f64,
    /// Simulation steps per query run.
    pub n_steps: u64,
}

impl MsibiConfig {
    pub fn builder() -> MsibiConfigBuilder {
        MsibiConfigBuilder::default()
    }

    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidParameter {
                name: "path",
                message: e.to_string(),
            })?;
        let builder: MsibiConfigBuilder =
            toml::from_str(&contents).map_err(|e| ConfigError::InvalidParameter {
                name: "toml",
                message: e.to_string(),
            })?;
        builder.build()
    }

    /// Grid shared by pair distributions and pair potential tables.
    pub fn pair_grid(&self) -> Result<Grid, GridError> {
        Grid::new(0.0, self.pot_cutoff, self.n_rdf_points)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MsibiConfigBuilder {
    rdf_cutoff: Option<f64>,
    n_rdf_points: Option<usize>,
    pot_cutoff: Option<f64>,
    r_switch: Option<f64>,
    smooth_rdfs: Option<bool>,
    smoothing_window: Option<usize>,
    max_frames: Option<usize>,
    dt: Option<f64>,
    n_steps: Option<u64>,
}

impl MsibiConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rdf_cutoff(mut self, cutoff: f64) -> Self {
        self.rdf_cutoff = Some(cutoff);
        self
    }
    pub fn n_rdf_points(mut self, n: usize) -> Self {
        self.n_rdf_points = Some(n);
        self
    }
    pub fn pot_cutoff(mut self, cutoff: f64) -> Self {
        self.pot_cutoff = Some(cutoff);
        self
    }
    pub fn r_switch(mut self, r: f64) -> Self {
        self.r_switch = Some(r);
        self
    }
    pub fn smooth_rdfs(mut self, smooth: bool) -> Self {
        self.smooth_rdfs = Some(smooth);
        self
    }
    pub fn smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = Some(window);
        self
    }
    pub fn max_frames(mut self, frames: usize) -> Self {
        self.max_frames = Some(frames);
        self
    }
    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }
    pub fn n_steps(mut self, steps: u64) -> Self {
        self.n_steps = Some(steps);
        self
    }

    pub fn build(self) -> Result<MsibiConfig, ConfigError> {
        let rdf_cutoff = self
            .rdf_cutoff
            .ok_or(ConfigError::MissingParameter("rdf_cutoff"))?;
        let n_rdf_points = self
            .n_rdf_points
            .ok_or(ConfigError::MissingParameter("n_rdf_points"))?;
        if n_rdf_points < 6 {
            return Err(ConfigError::InvalidParameter {
                name: "n_rdf_points",
                message: "at least 6 bins are required for the tail correction".to_string(),
            });
        }
        let pot_cutoff = self.pot_cutoff.unwrap_or(rdf_cutoff);
        let grid = Grid::new(0.0, pot_cutoff, n_rdf_points)?;
        let centers = grid.centers();
        let r_switch = self.r_switch.unwrap_or(centers[n_rdf_points - 5]);
        if r_switch >= centers[n_rdf_points - 1] {
            return Err(ConfigError::InvalidParameter {
                name: "r_switch",
                message: format!(
                    "switch radius {r_switch} must lie inside the potential grid"
                ),
            });
        }
        Ok(MsibiConfig {
            rdf_cutoff,
            n_rdf_points,
            pot_cutoff,
            r_switch,
            smooth_rdfs: self.smooth_rdfs.unwrap_or(false),
            smoothing_window: self.smoothing_window.unwrap_or(5),
            max_frames: self.max_frames.unwrap_or(1000),
            dt: self.dt.unwrap_or(0.001),
            n_steps: self.n_steps.unwrap_or(1_000_000),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_cutoff_is_reported() {
        let err = MsibiConfig::builder().n_rdf_points(50).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("rdf_cutoff"));
    }

    #[test]
    fn defaults_are_derived_from_the_grid() {
        let config = MsibiConfig::builder()
            .rdf_cutoff(2.5)
            .n_rdf_points(100)
            .build()
            .unwrap();
        assert_eq!(config.pot_cutoff, 2.5);
        let centers = config.pair_grid().unwrap().centers();
        assert_eq!(config.r_switch, centers[95]);
        assert_eq!(config.max_frames, 1000);
        assert!(!config.smooth_rdfs);
    }

    #[test]
    fn r_switch_outside_the_grid_is_rejected() {
        let err = MsibiConfig::builder()
            .rdf_cutoff(2.5)
            .n_rdf_points(100)
            .r_switch(3.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }

    #[test]
    fn too_few_bins_for_the_tail_are_rejected() {
        let err = MsibiConfig::builder()
            .rdf_cutoff(2.5)
            .n_rdf_points(4)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "n_rdf_points",
                ..
            }
        ));
    }

    #[test]
    fn config_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msibi.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "rdf_cutoff = 3.0\nn_rdf_points = 60\nsmooth_rdfs = true\nmax_frames = 250"
        )
        .unwrap();
        let config = MsibiConfig::from_toml_path(&path).unwrap();
        assert_eq!(config.rdf_cutoff, 3.0);
        assert_eq!(config.n_rdf_points, 60);
        assert!(config.smooth_rdfs);
        assert_eq!(config.max_frames, 250);
        assert_eq!(config.pot_cutoff, 3.0);
    }
}
