use super::adapter::EngineAdapter;
use super::error::{EngineError, StateFailure};
use super::state::State;
use crate::io::traits::TrajectoryReader;
use rayon::prelude::*;
use std::path::Path;
use std::process::Command;

const LOG_FILE: &str = "log.txt";
const ERR_FILE: &str = "err.txt";

/// Queries `nvidia-smi -L` for attached GPUs. An empty list means CPU-only
/// execution; a missing binary is treated the same way.
pub fn detect_gpus() -> Vec<String> {
    let output = match Command::new("nvidia-smi").arg("-L").output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| line.starts_with("GPU "))
        .enumerate()
        .map(|(i, _)| i.to_string())
        .collect()
}

fn worker_count(n_states: usize, n_gpus: usize) -> usize {
    let slots = if n_gpus > 0 {
        n_gpus
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    };
    slots.min(n_states).max(1)
}

/// Moves `path` aside to the first free `<path>.bak{n}` before it would be
/// overwritten by a fresh run. Existing backups are never clobbered.
pub fn backup_file(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for n in 0.. {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".bak{n}"));
        let backup = path.with_file_name(name);
        if !backup.exists() {
            std::fs::rename(path, &backup)?;
            return Ok(());
        }
    }
    unreachable!()
}

fn run_one(
    state: &mut State,
    adapter: &dyn EngineAdapter,
    reader: &dyn TrajectoryReader,
    device: Option<&str>,
) -> Result<(), String> {
    backup_file(&state.dir().join(LOG_FILE)).map_err(|e| e.to_string())?;
    backup_file(&state.dir().join(ERR_FILE)).map_err(|e| e.to_string())?;
    if state.backup_trajectory() {
        backup_file(&state.traj_path()).map_err(|e| e.to_string())?;
    }

    adapter.launch(
        state,
        device,
        &state.dir().join(LOG_FILE),
        &state.dir().join(ERR_FILE),
    )?;
    state.reload_trajectory(reader).map_err(|e| e.to_string())
}

/// Runs every state's query simulation, in parallel across the available
/// workers, and reloads each trajectory afterwards. All states are attempted
/// even when some fail; failures are aggregated into one error naming each
/// failed state.
pub fn run_simulations(
    states: &mut [State],
    adapter: &dyn EngineAdapter,
    reader: &dyn TrajectoryReader,
) -> Result<(), EngineError> {
    let gpus = detect_gpus();
    let workers = worker_count(states.len(), gpus.len());
    if gpus.is_empty() {
        tracing::info!(workers, "no GPUs detected, running on CPU");
    } else {
        tracing::info!(gpus = gpus.len(), workers, "dispatching to GPUs");
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    let failures: Vec<StateFailure> = pool.install(|| {
        states
            .par_iter_mut()
            .enumerate()
            .filter_map(|(i, state)| {
                let device = if gpus.is_empty() {
                    None
                } else {
                    Some(gpus[i % gpus.len()].as_str())
                };
                tracing::info!(state = state.name(), "running query simulation");
                match run_one(state, adapter, reader, device) {
                    Ok(()) => None,
                    Err(reason) => Some(StateFailure {
                        state: state.name().to_string(),
                        reason,
                    }),
                }
            })
            .collect()
    });

    if failures.is_empty() {
        Ok(())
    } else {
        Err(EngineError::SimulationFailure { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_prefers_gpus_and_caps_at_states() {
        assert_eq!(worker_count(8, 2), 2);
        assert_eq!(worker_count(1, 4), 1);
        assert!(worker_count(8, 0) >= 1);
    }

    #[test]
    fn backup_keeps_every_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        for round in 0..3 {
            std::fs::write(&path, format!("run {round}")).unwrap();
            backup_file(&path).unwrap();
            assert!(!path.exists());
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log.txt.bak0")).unwrap(),
            "run 0"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("log.txt.bak2")).unwrap(),
            "run 2"
        );
    }

    #[test]
    fn backup_of_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        backup_file(&dir.path().join("absent.txt")).unwrap();
    }
}
