use crate::core::sampling::SampleOptions;
use crate::engine::adapter::{EngineAdapter, RunInputs, TableRef};
use crate::engine::config::MsibiConfig;
use crate::engine::dispatch;
use crate::engine::error::EngineError;
use crate::engine::forces::Force;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::State;
use crate::io::table::{
    append_fit, distribution_file_name, fit_file_name, potential_file_name, write_distribution,
};
use crate::io::traits::TrajectoryReader;
use std::path::PathBuf;
use tracing::{info, instrument};

const POTENTIALS_DIR: &str = "potentials";
const DISTRIBUTIONS_DIR: &str = "distributions";

/// One multistate optimization session.
///
/// States and forces are added up front; [`Msibi::run_optimization`] then
/// drives the refinement loop for a number of iterations. The session is
/// resumable: a second call continues from where the first left off, with
/// the iteration counter and every archived table intact.
pub struct Msibi {
    config: MsibiConfig,
    base_dir: PathBuf,
    states: Vec<State>,
    forces: Vec<Force>,
    iterations_done: usize,
    initialized: bool,
}

impl Msibi {
    pub fn new(config: MsibiConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            states: Vec::new(),
            forces: Vec::new(),
            iterations_done: 0,
            initialized: false,
        }
    }

    /// Adds a thermodynamic state. The state set is frozen once the first
    /// iteration has run.
    pub fn add_state(&mut self, state: State) -> Result<(), EngineError> {
        if self.initialized {
            return Err(EngineError::Configuration(
                "states cannot be added after the optimization has started".to_string(),
            ));
        }
        if self.states.iter().any(|s| s.name() == state.name()) {
            return Err(EngineError::Configuration(format!(
                "duplicate state name '{}'",
                state.name()
            )));
        }
        self.states.push(state);
        Ok(())
    }

    /// Adds an interaction term. Optimized terms of the same kind must share
    /// a grid resolution so their tables stay comparable across iterations.
    pub fn add_force(&mut self, force: Force) -> Result<(), EngineError> {
        if self.initialized {
            return Err(EngineError::Configuration(
                "forces cannot be added after the optimization has started".to_string(),
            ));
        }
        if self
            .forces
            .iter()
            .any(|f| f.kind() == force.kind() && f.name() == force.name())
        {
            return Err(EngineError::Configuration(format!(
                "duplicate {} force '{}'",
                force.kind().label(),
                force.name()
            )));
        }
        if force.optimize() {
            if let Some(other) = self
                .forces
                .iter()
                .find(|f| f.optimize() && f.kind() != force.kind())
            {
                return Err(EngineError::Configuration(format!(
                    "only one kind of force can be optimized per run: \
                     '{}' is a {} force but '{}' is a {} force",
                    other.name(),
                    other.kind().label(),
                    force.name(),
                    force.kind().label()
                )));
            }
            if let Some(grid) = force.grid() {
                for other in self.forces.iter().filter(|f| {
                    f.optimize() && f.kind() == force.kind()
                }) {
                    if let Some(existing) = other.grid() {
                        if existing.n_bins != grid.n_bins {
                            return Err(EngineError::Configuration(format!(
                                "optimized {} forces must share a grid resolution: \
                                 '{}' has {} bins but '{}' has {}",
                                force.kind().label(),
                                other.name(),
                                existing.n_bins,
                                force.name(),
                                grid.n_bins
                            )));
                        }
                    }
                }
            }
        }
        self.forces.push(force);
        Ok(())
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn forces(&self) -> &[Force] {
        &self.forces
    }

    /// Completed iterations across every `run_optimization` call so far.
    pub fn iterations_done(&self) -> usize {
        self.iterations_done
    }

    fn potentials_dir(&self) -> PathBuf {
        self.base_dir.join(POTENTIALS_DIR)
    }

    fn distributions_dir(&self) -> PathBuf {
        self.base_dir.join(DISTRIBUTIONS_DIR)
    }

    fn sample_options(&self) -> SampleOptions {
        SampleOptions {
            max_frames: Some(self.config.max_frames),
            exclusion_depth: 0,
            smooth_window: self
                .config
                .smooth_rdfs
                .then_some(self.config.smoothing_window),
        }
    }

    fn table_refs(&self) -> Vec<TableRef> {
        let dir = self.potentials_dir();
        self.forces
            .iter()
            .map(|force| TableRef {
                name: force.name().to_string(),
                kind: force.kind(),
                types: force.types().to_vec(),
                path: dir.join(potential_file_name(force.kind().label(), force.name())),
                width: force.grid().map_or(0, |g| g.n_bins),
            })
            .collect()
    }

    /// First-run setup: load the initial trajectories, materialize every
    /// table, fix the target distributions, and stage the run scripts.
    fn initialize(
        &mut self,
        adapter: &dyn EngineAdapter,
        reader: &dyn TrajectoryReader,
    ) -> Result<(), EngineError> {
        if self.states.is_empty() {
            return Err(EngineError::Configuration(
                "no states were added to the optimizer".to_string(),
            ));
        }
        if self.forces.is_empty() {
            return Err(EngineError::Configuration(
                "no forces were added to the optimizer".to_string(),
            ));
        }
        std::fs::create_dir_all(self.potentials_dir())?;
        std::fs::create_dir_all(self.distributions_dir())?;

        for state in &mut self.states {
            state.reload_trajectory(reader)?;
        }

        let pair_grid = self.config.pair_grid()?;
        let opts = self.sample_options();
        let potentials_dir = self.potentials_dir();
        for force in &mut self.forces {
            force.initialize_table(&pair_grid)?;
            for state in &self.states {
                force.register_state(state, &opts)?;
            }
            force.tail_correct_initial(self.config.r_switch)?;
            force.save_table(&potentials_dir, Some(0))?;
        }

        let tables = self.table_refs();
        let inputs = RunInputs {
            tables: &tables,
            table_width: pair_grid.n_bins,
            dt: self.config.dt,
            n_steps: self.config.n_steps,
        };
        for state in &self.states {
            adapter.prepare(state, &inputs)?;
        }

        info!(
            states = self.states.len(),
            forces = self.forces.len(),
            "optimizer initialized"
        );
        self.initialized = true;
        Ok(())
    }

    fn write_current_distribution(
        &self,
        force: &Force,
        state: &State,
        iteration: usize,
    ) -> Result<(), EngineError> {
        let entry = force.state_entry(state.name()).ok_or_else(|| {
            EngineError::Configuration(format!(
                "state '{}' is not registered with force '{}'",
                state.name(),
                force.name()
            ))
        })?;
        if let Some(current) = &entry.current {
            let path = self.distributions_dir().join(distribution_file_name(
                force.kind().label(),
                force.name(),
                state.name(),
                iteration,
            ));
            write_distribution(&path, current)?;
        }
        Ok(())
    }

    /// Runs `n_iterations` refinement iterations. Zero iterations is a
    /// strict no-op: nothing is simulated, sampled, or written.
    #[instrument(skip_all, fields(n_iterations))]
    pub fn run_optimization(
        &mut self,
        n_iterations: usize,
        adapter: &dyn EngineAdapter,
        reader: &dyn TrajectoryReader,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        if n_iterations == 0 {
            return Ok(());
        }
        if !self.initialized {
            self.initialize(adapter, reader)?;
        }

        let opts = self.sample_options();
        let potentials_dir = self.potentials_dir();
        let distributions_dir = self.distributions_dir();
        for local in 0..n_iterations {
            let iteration = self.iterations_done;
            info!(iteration, "starting iteration");
            reporter.report(Progress::IterationStart { iteration });

            for force in &self.forces {
                force.save_table(&potentials_dir, None)?;
            }

            for state in &self.states {
                reporter.report(Progress::SimulationStart {
                    state: state.name().to_string(),
                });
            }
            dispatch::run_simulations(&mut self.states, adapter, reader)?;
            for state in &self.states {
                reporter.report(Progress::SimulationFinish {
                    state: state.name().to_string(),
                });
            }

            for force in &mut self.forces {
                for state in &self.states {
                    let score = force.refresh_state(state, &opts)?;
                    info!(
                        force = force.name(),
                        state = state.name(),
                        score,
                        "fit score"
                    );
                    reporter.report(Progress::FitScore {
                        force: force.name().to_string(),
                        state: state.name().to_string(),
                        score,
                    });
                    append_fit(
                        &distributions_dir.join(fit_file_name(
                            force.kind().label(),
                            force.name(),
                            state.name(),
                        )),
                        iteration,
                        score,
                    )?;
                }
                if force.optimize() {
                    force.apply_multistate_correction(
                        &self.states,
                        local,
                        n_iterations,
                        self.config.r_switch,
                    )?;
                }
                force.save_table(&potentials_dir, Some(iteration + 1))?;
            }
            for force in &self.forces {
                for state in &self.states {
                    self.write_current_distribution(force, state, iteration)?;
                }
            }

            self.iterations_done += 1;
            reporter.report(Progress::IterationFinish { iteration });
        }
        Ok(())
    }
}
