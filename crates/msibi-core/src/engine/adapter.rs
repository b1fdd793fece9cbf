use super::error::EngineError;
use super::forces::ForceKind;
use super::state::State;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A force table written for the current iteration, as the engine adapter
/// needs to reference it from the run script.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub name: String,
    pub kind: ForceKind,
    pub types: Vec<String>,
    pub path: PathBuf,
    /// Bin count of this table's own grid; bonded grids need not match the
    /// pair grid.
    pub width: usize,
}

/// Everything an adapter needs to stage one state's query simulation.
#[derive(Debug, Clone, Copy)]
pub struct RunInputs<'a> {
    pub tables: &'a [TableRef],
    pub table_width: usize,
    pub dt: f64,
    pub n_steps: u64,
}

/// Narrow seam between the optimizer and the external simulation engine.
///
/// `prepare` stages run inputs inside the state directory; `launch` blocks
/// until the engine process exits, reporting a failure reason on a nonzero
/// exit. Tests substitute a fake adapter that produces trajectories without
/// spawning anything.
pub trait EngineAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, state: &State, inputs: &RunInputs) -> Result<(), EngineError>;

    fn launch(
        &self,
        state: &State,
        device: Option<&str>,
        log_path: &Path,
        err_path: &Path,
    ) -> Result<(), String>;
}

/// Resolves an engine target name to its adapter. The recognized set is
/// closed; anything else is an unsupported target.
pub fn adapter_for(engine: &str) -> Result<Box<dyn EngineAdapter>, EngineError> {
    match engine.to_ascii_lowercase().as_str() {
        "hoomd" => Ok(Box::new(HoomdAdapter::default())),
        other => Err(EngineError::UnsupportedForm(format!(
            "engine target '{other}'"
        ))),
    }
}

const RUNSCRIPT_FILE: &str = "run.py";
const TEMPLATE_FILE: &str = "hoomd_run_template.py";

/// Adapter for HOOMD-blue: renders a `run.py` from a header declaring the
/// table potentials plus a user-supplied template body, then invokes the
/// `hoomd` executable in the state directory.
#[derive(Debug, Clone)]
pub struct HoomdAdapter {
    executable: String,
    init_file: String,
}

impl Default for HoomdAdapter {
    fn default() -> Self {
        Self {
            executable: "hoomd".to_string(),
            init_file: "start.xml".to_string(),
        }
    }
}

impl HoomdAdapter {
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    fn render_header(&self, state: &State, inputs: &RunInputs) -> String {
        let mut header = format!(
            "import hoomd\n\
             import hoomd.md\n\
             \n\
             hoomd.context.initialize(\"\")\n\
             system = hoomd.deprecated.init.read_xml(filename=\"{init}\", wrap_coordinates=True)\n\
             T_final = {kt:.1}\n\
             dt = {dt}\n\
             n_steps = {steps}\n\
             \n\
             pot_width = {width}\n\
             nl = hoomd.md.nlist.cell()\n",
            init = self.init_file,
            kt = state.kt(),
            dt = inputs.dt,
            steps = inputs.n_steps,
            width = inputs.table_width,
        );

        if inputs.tables.iter().any(|t| t.kind == ForceKind::Pair) {
            header.push_str("table = hoomd.md.pair.table(width=pot_width, nlist=nl)\n");
        }
        for table in inputs.tables {
            let entry = match table.kind {
                ForceKind::Pair => format!(
                    "table.set_from_file('{}', '{}', filename='{}')\n",
                    table.types[0],
                    table.types[1],
                    table.path.display()
                ),
                ForceKind::Bond => format!(
                    "btable = hoomd.md.bond.table(width={})\n\
                     btable.set_from_file('{}', '{}')\n",
                    table.width,
                    table.name,
                    table.path.display()
                ),
                ForceKind::Angle => format!(
                    "atable = hoomd.md.angle.table(width={})\n\
                     atable.set_from_file('{}', '{}')\n",
                    table.width,
                    table.name,
                    table.path.display()
                ),
                ForceKind::Dihedral => format!(
                    "dtable = hoomd.md.dihedral.table(width={})\n\
                     dtable.set_from_file('{}', '{}')\n",
                    table.width,
                    table.name,
                    table.path.display()
                ),
            };
            header.push_str(&entry);
        }
        header
    }
}

impl EngineAdapter for HoomdAdapter {
    fn name(&self) -> &'static str {
        "hoomd"
    }

    fn prepare(&self, state: &State, inputs: &RunInputs) -> Result<(), EngineError> {
        let header = self.render_header(state, inputs);
        let body = std::fs::read_to_string(state.dir().join(TEMPLATE_FILE)).map_err(|e| {
            EngineError::Configuration(format!(
                "state '{}' is missing {TEMPLATE_FILE}: {e}",
                state.name()
            ))
        })?;
        let mut file = File::create(state.dir().join(RUNSCRIPT_FILE))?;
        file.write_all(header.as_bytes())?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    fn launch(
        &self,
        state: &State,
        device: Option<&str>,
        log_path: &Path,
        err_path: &Path,
    ) -> Result<(), String> {
        let open = |path: &Path| {
            File::create(path).map_err(|e| format!("cannot open {}: {e}", path.display()))
        };
        let log = open(log_path)?;
        let err = open(err_path)?;

        let mut command = match device {
            Some(card) => {
                let mut cmd = Command::new("mpiexec");
                cmd.args(["-n", "1", &self.executable, RUNSCRIPT_FILE]);
                cmd.arg(format!("--gpu={card}"));
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.executable);
                cmd.arg(RUNSCRIPT_FILE);
                cmd
            }
        };

        let status = command
            .current_dir(state.dir())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(err))
            .status()
            .map_err(|e| format!("failed to launch {}: {e}", self.executable))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {status}", self.executable))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_engine_target_is_unsupported() {
        assert!(matches!(
            adapter_for("espresso"),
            Err(EngineError::UnsupportedForm(_))
        ));
        assert!(adapter_for("HOOMD").is_ok());
    }

    #[test]
    fn header_declares_every_table() {
        let state = State::new(1.0, "/tmp/s0");
        let tables = vec![
            TableRef {
                name: "A-B".to_string(),
                kind: ForceKind::Pair,
                types: vec!["A".to_string(), "B".to_string()],
                path: PathBuf::from("/potentials/pot.pair.A-B.txt"),
                width: 100,
            },
            TableRef {
                name: "A-A".to_string(),
                kind: ForceKind::Bond,
                types: vec!["A".to_string(), "A".to_string()],
                path: PathBuf::from("/potentials/pot.bond.A-A.txt"),
                width: 60,
            },
        ];
        let inputs = RunInputs {
            tables: &tables,
            table_width: 100,
            dt: 0.001,
            n_steps: 5000,
        };
        let header = HoomdAdapter::default().render_header(&state, &inputs);
        assert!(header.contains("hoomd.md.pair.table(width=pot_width"));
        assert!(
            header.contains("table.set_from_file('A', 'B', filename='/potentials/pot.pair.A-B.txt')")
        );
        // Bonded tables carry their own grid resolution, not the pair one.
        assert!(header.contains("hoomd.md.bond.table(width=60)"));
        assert!(header.contains("n_steps = 5000"));
    }

    #[test]
    fn prepare_appends_the_template_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TEMPLATE_FILE),
            "hoomd.run(n_steps)\n",
        )
        .unwrap();
        let state = State::new(1.0, dir.path());
        let inputs = RunInputs {
            tables: &[],
            table_width: 10,
            dt: 0.001,
            n_steps: 100,
        };
        HoomdAdapter::default().prepare(&state, &inputs).unwrap();
        let script = std::fs::read_to_string(dir.path().join(RUNSCRIPT_FILE)).unwrap();
        assert!(script.starts_with("import hoomd"));
        assert!(script.ends_with("hoomd.run(n_steps)\n"));
    }

    #[test]
    fn missing_template_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::new(1.0, dir.path());
        let inputs = RunInputs {
            tables: &[],
            table_width: 10,
            dt: 0.001,
            n_steps: 100,
        };
        let err = HoomdAdapter::default().prepare(&state, &inputs).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
