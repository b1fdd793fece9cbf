use super::error::EngineError;
use super::state::State;
use crate::core::correction::{self, AlphaSchedule};
use crate::core::grid::{Distribution, Grid};
use crate::core::potentials::{PotentialForm, repulsive_initial_guess};
use crate::core::sampling::{self, SampleOptions, SamplingTarget};
use crate::core::similarity::fit_score;
use crate::io::table::{archive_file_name, potential_file_name, write_table};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which bonded arity an interaction term describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceKind {
    Pair,
    Bond,
    Angle,
    Dihedral,
}

impl ForceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ForceKind::Pair => "pair",
            ForceKind::Bond => "bond",
            ForceKind::Angle => "angle",
            ForceKind::Dihedral => "dihedral",
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum NaturalToken {
    Number(u64),
    Text(String),
}

/// Splits a label into digit and non-digit runs so that `A2` sorts before
/// `A10`.
fn natural_key(label: &str) -> Vec<NaturalToken> {
    let mut tokens = Vec::new();
    let mut chars = label.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut n: u64 = 0;
            while let Some(&d) = chars.peek() {
                match d.to_digit(10) {
                    Some(digit) => {
                        n = n * 10 + digit as u64;
                        chars.next();
                    }
                    None => break,
                }
            }
            tokens.push(NaturalToken::Number(n));
        } else {
            let mut text = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    break;
                }
                text.push(d);
                chars.next();
            }
            tokens.push(NaturalToken::Text(text));
        }
    }
    tokens
}

/// Canonical label order: the sequence is compared against its reversal
/// under natural sort and the smaller one wins, so `(B, A)` and `(A, B)`
/// name the same term.
fn canonicalize(labels: Vec<String>) -> Vec<String> {
    let reversed: Vec<String> = labels.iter().rev().cloned().collect();
    let forward: Vec<_> = labels.iter().map(|l| natural_key(l)).collect();
    let backward: Vec<_> = reversed.iter().map(|l| natural_key(l)).collect();
    if backward < forward { reversed } else { labels }
}

/// Per-state bookkeeping for one interaction term.
#[derive(Debug)]
pub struct StateEntry {
    pub target: Distribution,
    pub current: Option<Distribution>,
    pub alpha: AlphaSchedule,
    pub fit_history: Vec<f64>,
    pub dir: PathBuf,
}

enum Seed {
    Form(PotentialForm),
    Repulsive { epsilon: f64, sigma: f64, m: i32 },
}

/// One interaction term of the coarse-grained model: a pair, bond, angle, or
/// dihedral potential tabulated on a fixed grid, together with the states it
/// must satisfy.
///
/// Terms with `optimize` set have their table refined every iteration; fixed
/// terms keep their initial table but still have their distributions
/// recomputed for observability.
pub struct Force {
    kind: ForceKind,
    types: Vec<String>,
    name: String,
    seed: Option<Seed>,
    grid: Option<Grid>,
    table: Option<Vec<f64>>,
    optimize: bool,
    exclusion_depth: usize,
    states: Vec<(String, StateEntry)>,
    pending_targets: HashMap<String, Distribution>,
}

impl Force {
    fn new(kind: ForceKind, types: Vec<String>, grid: Option<Grid>) -> Self {
        let types = canonicalize(types);
        let name = types.join("-");
        Self {
            kind,
            types,
            name,
            seed: None,
            grid,
            table: None,
            optimize: false,
            exclusion_depth: 0,
            states: Vec::new(),
            pending_targets: HashMap::new(),
        }
    }

    /// Non-bonded pair term. Its grid comes from the optimizer's global run
    /// parameters at initialization.
    pub fn pair(type1: &str, type2: &str) -> Self {
        Self::new(
            ForceKind::Pair,
            vec![type1.to_string(), type2.to_string()],
            None,
        )
    }

    pub fn bond(type1: &str, type2: &str, grid: Grid) -> Self {
        Self::new(
            ForceKind::Bond,
            vec![type1.to_string(), type2.to_string()],
            Some(grid),
        )
    }

    pub fn angle(types: [&str; 3], grid: Grid) -> Self {
        Self::new(
            ForceKind::Angle,
            types.iter().map(|t| t.to_string()).collect(),
            Some(grid),
        )
    }

    pub fn dihedral(types: [&str; 4], grid: Grid) -> Self {
        Self::new(
            ForceKind::Dihedral,
            types.iter().map(|t| t.to_string()).collect(),
            Some(grid),
        )
    }

    #[inline]
    pub fn kind(&self) -> ForceKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn types(&self) -> &[String] {
        &self.types
    }

    #[inline]
    pub fn optimize(&self) -> bool {
        self.optimize
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
    }

    /// Bonded-pair exclusion depth used when sampling this term's pair
    /// distances.
    pub fn set_exclusion_depth(&mut self, depth: usize) {
        self.exclusion_depth = depth;
    }

    pub fn set_form(&mut self, form: PotentialForm) {
        self.seed = Some(Seed::Form(form));
    }

    pub fn set_harmonic(&mut self, k: f64, x0: f64) {
        self.set_form(PotentialForm::Harmonic { k, x0 });
    }

    pub fn set_polynomial(&mut self, x0: f64, coeffs: Vec<f64>) {
        self.set_form(PotentialForm::Polynomial { x0, coeffs });
    }

    pub fn set_tabulated(&mut self, values: Vec<f64>) {
        self.set_form(PotentialForm::Tabulated { values });
    }

    /// Purely repulsive starting guess, the usual seed for an optimized pair.
    pub fn set_repulsive(&mut self, epsilon: f64, sigma: f64, m: i32) {
        self.seed = Some(Seed::Repulsive { epsilon, sigma, m });
    }

    /// Supplies an explicit target distribution for a state, instead of
    /// sampling the state's initial trajectory at registration.
    pub fn set_target(&mut self, state_name: &str, target: Distribution) {
        self.pending_targets.insert(state_name.to_string(), target);
    }

    #[inline]
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    #[inline]
    pub fn table(&self) -> Option<&[f64]> {
        self.table.as_deref()
    }

    pub fn fit_history(&self, state_name: &str) -> Option<&[f64]> {
        self.entry(state_name).map(|e| e.fit_history.as_slice())
    }

    pub fn state_entry(&self, state_name: &str) -> Option<&StateEntry> {
        self.entry(state_name)
    }

    fn entry(&self, state_name: &str) -> Option<&StateEntry> {
        self.states
            .iter()
            .find(|(name, _)| name == state_name)
            .map(|(_, e)| e)
    }

    pub(crate) fn sampling_target(&self) -> SamplingTarget {
        match self.kind {
            ForceKind::Pair => SamplingTarget::Pairs {
                type1: self.types[0].clone(),
                type2: self.types[1].clone(),
            },
            ForceKind::Bond => SamplingTarget::Bonds {
                type1: self.types[0].clone(),
                type2: self.types[1].clone(),
            },
            ForceKind::Angle => SamplingTarget::Angles {
                types: [
                    self.types[0].clone(),
                    self.types[1].clone(),
                    self.types[2].clone(),
                ],
            },
            ForceKind::Dihedral => SamplingTarget::Dihedrals {
                types: [
                    self.types[0].clone(),
                    self.types[1].clone(),
                    self.types[2].clone(),
                    self.types[3].clone(),
                ],
            },
        }
    }

    fn sample_options(&self, base: &SampleOptions) -> SampleOptions {
        SampleOptions {
            exclusion_depth: self.exclusion_depth,
            ..*base
        }
    }

    /// Materializes the potential table on the working grid. Pair terms
    /// without an explicit grid adopt `default_pair_grid`.
    pub(crate) fn initialize_table(&mut self, default_pair_grid: &Grid) -> Result<(), EngineError> {
        if self.grid.is_none() {
            if self.kind != ForceKind::Pair {
                return Err(EngineError::Configuration(format!(
                    "{} force '{}' was constructed without a grid",
                    self.kind.label(),
                    self.name
                )));
            }
            self.grid = Some(*default_pair_grid);
        }
        let grid = self.grid.unwrap();
        let table = match &self.seed {
            Some(Seed::Form(form)) => form.to_table(&grid)?,
            Some(Seed::Repulsive { epsilon, sigma, m }) => {
                repulsive_initial_guess(&grid, *epsilon, *sigma, *m)
            }
            None => {
                return Err(EngineError::Configuration(format!(
                    "force '{}' has no potential form set",
                    self.name
                )));
            }
        };
        self.table = Some(table);
        Ok(())
    }

    /// Registers a state with this term, fixing its target distribution.
    /// The target is the pending one supplied via [`Force::set_target`], or
    /// else is sampled from the state's currently loaded trajectory.
    pub(crate) fn register_state(
        &mut self,
        state: &State,
        opts: &SampleOptions,
    ) -> Result<(), EngineError> {
        if self.entry(state.name()).is_some() {
            return Err(EngineError::DuplicateState {
                force: self.name.clone(),
                state: state.name().to_string(),
            });
        }
        let grid = self.require_grid()?;
        let target = match self.pending_targets.remove(state.name()) {
            Some(target) => {
                target
                    .grid()
                    .check_matches(&grid)
                    .map_err(EngineError::from)?;
                target
            }
            None => {
                let data = state.trajectory().ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "state '{}' has no loaded trajectory to derive a target from",
                        state.name()
                    ))
                })?;
                sampling::sample(
                    &data.frames,
                    &data.topology,
                    &self.sampling_target(),
                    &grid,
                    &self.sample_options(opts),
                )?
            }
        };
        self.states.push((
            state.name().to_string(),
            StateEntry {
                target,
                current: None,
                alpha: state.alpha(),
                fit_history: Vec::new(),
                dir: state.dir().to_path_buf(),
            },
        ));
        Ok(())
    }

    /// Recomputes the current distribution for one state from its freshly
    /// reloaded trajectory, scores it against the target, and appends the
    /// score to the state's fit history.
    pub(crate) fn refresh_state(
        &mut self,
        state: &State,
        opts: &SampleOptions,
    ) -> Result<f64, EngineError> {
        let grid = self.require_grid()?;
        let target = self.sampling_target();
        let sample_opts = self.sample_options(opts);
        let data = state.trajectory().ok_or_else(|| {
            EngineError::Configuration(format!(
                "state '{}' has no loaded trajectory",
                state.name()
            ))
        })?;
        let current = sampling::sample(&data.frames, &data.topology, &target, &grid, &sample_opts)?;

        let entry = self
            .states
            .iter_mut()
            .find(|(name, _)| name == state.name())
            .map(|(_, e)| e)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "state '{}' is not registered with force '{}'",
                    state.name(),
                    self.name
                ))
            })?;
        let score = fit_score(&current, &entry.target)?;
        entry.current = Some(current);
        entry.fit_history.push(score);
        Ok(score)
    }

    /// Applies the Boltzmann-inversion correction for every registered state
    /// and blends the per-state tables into one update, weighted by alpha.
    /// Pair terms then get the tail correction beyond `r_switch`.
    ///
    /// Must only run after every state's distribution for this iteration has
    /// been refreshed; a partially refreshed term is rejected.
    pub(crate) fn apply_multistate_correction(
        &mut self,
        states: &[State],
        iteration: usize,
        total_iterations: usize,
        r_switch: f64,
    ) -> Result<(), EngineError> {
        let grid = self.require_grid()?;
        let table = self.table.clone().ok_or_else(|| {
            EngineError::Configuration(format!("force '{}' has no table to correct", self.name))
        })?;

        let mut corrections = Vec::with_capacity(self.states.len());
        for (name, entry) in &self.states {
            let kt = states
                .iter()
                .find(|s| s.name() == name)
                .map(State::kt)
                .ok_or_else(|| {
                    EngineError::Configuration(format!(
                        "state '{name}' registered with force '{}' is unknown to the optimizer",
                        self.name
                    ))
                })?;
            let current = entry.current.as_ref().ok_or_else(|| {
                EngineError::Configuration(format!(
                    "state '{name}' has no refreshed distribution for force '{}'",
                    self.name
                ))
            })?;
            let alpha = entry.alpha.at(iteration, total_iterations);
            let corrected = correction::ibi_update(&table, current, &entry.target, kt, alpha)?;
            corrections.push((alpha, corrected));
        }

        let mut blended = correction::blend(&corrections)?;
        if self.kind == ForceKind::Pair {
            blended = correction::tail_correction(&grid.centers(), &blended, r_switch);
        }
        self.table = Some(blended);
        Ok(())
    }

    /// Applies the tail correction to the initial pair table so the very
    /// first query simulation already sees a well-behaved cutoff.
    pub(crate) fn tail_correct_initial(&mut self, r_switch: f64) -> Result<(), EngineError> {
        if self.kind != ForceKind::Pair {
            return Ok(());
        }
        let grid = self.require_grid()?;
        let table = self.table.take().ok_or_else(|| {
            EngineError::Configuration(format!("force '{}' has no table", self.name))
        })?;
        self.table = Some(correction::tail_correction(
            &grid.centers(),
            &table,
            r_switch,
        ));
        Ok(())
    }

    /// Writes the query table (overwritten each iteration) and, when an
    /// iteration index is given, an archive copy for inspection.
    pub(crate) fn save_table(
        &self,
        potentials_dir: &Path,
        iteration: Option<usize>,
    ) -> Result<PathBuf, EngineError> {
        let grid = self.require_grid()?;
        let table = self.table.as_ref().ok_or_else(|| {
            EngineError::Configuration(format!("force '{}' has no table to save", self.name))
        })?;
        let centers = grid.centers();
        let query = potentials_dir.join(potential_file_name(self.kind.label(), &self.name));
        write_table(&query, &centers, table)?;
        if let Some(iteration) = iteration {
            let archive =
                potentials_dir.join(archive_file_name(self.kind.label(), &self.name, iteration));
            write_table(&archive, &centers, table)?;
        }
        Ok(query)
    }

    fn require_grid(&self) -> Result<Grid, EngineError> {
        self.grid.ok_or_else(|| {
            EngineError::Configuration(format!(
                "force '{}' has no grid; was the optimizer initialized?",
                self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Distribution;

    const TOLERANCE: f64 = 1e-12;

    fn test_grid() -> Grid {
        Grid::new(0.0, 3.0, 10).unwrap()
    }

    fn dist(grid: Grid, values: Vec<f64>) -> Distribution {
        Distribution::new(grid, values).unwrap()
    }

    #[test]
    fn pair_labels_are_order_independent() {
        let ab = Force::pair("A", "B");
        let ba = Force::pair("B", "A");
        assert_eq!(ab.name(), "A-B");
        assert_eq!(ab.name(), ba.name());
        assert_eq!(ab.types(), ba.types());
    }

    #[test]
    fn natural_sort_orders_numbered_types() {
        let force = Force::pair("A10", "A2");
        assert_eq!(force.name(), "A2-A10");
    }

    #[test]
    fn angle_labels_canonicalize_by_reversal() {
        let grid = test_grid();
        let abc = Force::angle(["C", "B", "A"], grid);
        let cba = Force::angle(["A", "B", "C"], grid);
        assert_eq!(abc.name(), "A-B-C");
        assert_eq!(abc.name(), cba.name());
    }

    #[test]
    fn asymmetric_angle_keeps_the_apex_in_place() {
        let grid = test_grid();
        let force = Force::angle(["B", "A", "A"], grid);
        assert_eq!(force.name(), "A-A-B");
    }

    #[test]
    fn duplicate_state_registration_is_rejected() {
        let grid = test_grid();
        let mut force = Force::bond("A", "B", grid);
        force.set_harmonic(100.0, 1.0);
        force.initialize_table(&grid).unwrap();

        let state = State::new(1.0, "/tmp/s0");
        force.set_target(state.name(), dist(grid, vec![1.0; 10]));
        force
            .register_state(&state, &SampleOptions::default())
            .unwrap();

        force.set_target(state.name(), dist(grid, vec![1.0; 10]));
        let err = force
            .register_state(&state, &SampleOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateState { .. }));
    }

    #[test]
    fn registration_without_target_or_trajectory_fails() {
        let grid = test_grid();
        let mut force = Force::bond("A", "B", grid);
        force.set_harmonic(100.0, 1.0);
        force.initialize_table(&grid).unwrap();
        let state = State::new(1.0, "/tmp/s0");
        let err = force
            .register_state(&state, &SampleOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn initialize_without_form_is_a_configuration_error() {
        let grid = test_grid();
        let mut force = Force::pair("A", "B");
        let err = force.initialize_table(&grid).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn pair_adopts_the_default_grid_at_initialization() {
        let grid = test_grid();
        let mut force = Force::pair("A", "B");
        force.set_repulsive(1.0, 1.0, 12);
        force.initialize_table(&grid).unwrap();
        assert_eq!(force.grid(), Some(&grid));
        assert_eq!(force.table().unwrap().len(), grid.n_bins);
    }

    #[test]
    fn correction_requires_refreshed_distributions() {
        let grid = test_grid();
        let mut force = Force::pair("A", "B");
        force.set_tabulated(vec![0.0; 10]);
        force.initialize_table(&grid).unwrap();

        let state = State::new(1.0, "/tmp/s0");
        force.set_target(state.name(), dist(grid, vec![1.0; 10]));
        force
            .register_state(&state, &SampleOptions::default())
            .unwrap();

        let err = force
            .apply_multistate_correction(&[state], 0, 1, 2.5)
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn two_identical_states_blend_like_one() {
        let grid = test_grid();
        let half = AlphaSchedule::Constant(0.5);
        let current = vec![2.0; 10];
        let target = vec![1.0; 10];

        let mut single = Force::bond("A", "B", grid);
        single.set_tabulated(vec![0.0; 10]);
        single.initialize_table(&grid).unwrap();
        let s0 = State::new(1.0, "/tmp/s0").with_alpha(half);
        single.set_target(s0.name(), dist(grid, target.clone()));
        single.register_state(&s0, &SampleOptions::default()).unwrap();
        force_current(&mut single, s0.name(), dist(grid, current.clone()));
        single
            .apply_multistate_correction(&[s0], 0, 1, 2.5)
            .unwrap();

        let mut double = Force::bond("A", "B", grid);
        double.set_tabulated(vec![0.0; 10]);
        double.initialize_table(&grid).unwrap();
        let sa = State::new(1.0, "/tmp/sa").with_name("sa").with_alpha(half);
        let sb = State::new(1.0, "/tmp/sb").with_name("sb").with_alpha(half);
        for s in [&sa, &sb] {
            double.set_target(s.name(), dist(grid, target.clone()));
            double.register_state(s, &SampleOptions::default()).unwrap();
            force_current(&mut double, s.name(), dist(grid, current.clone()));
        }
        double
            .apply_multistate_correction(&[sa, sb], 0, 1, 2.5)
            .unwrap();

        for (a, b) in single.table().unwrap().iter().zip(double.table().unwrap()) {
            assert!((a - b).abs() < TOLERANCE);
        }
    }

    fn force_current(force: &mut Force, state_name: &str, current: Distribution) {
        let entry = force
            .states
            .iter_mut()
            .find(|(name, _)| name == state_name)
            .map(|(_, e)| e)
            .unwrap();
        entry.current = Some(current);
    }
}
