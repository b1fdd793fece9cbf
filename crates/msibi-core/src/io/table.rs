use crate::core::grid::{Distribution, Grid, GridError};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Engine-facing query table, overwritten each iteration.
///
/// File names carry the kind label as well as the type label: a nonbonded
/// pair and a bond over the same bead types are distinct terms and must not
/// share a file.
pub fn potential_file_name(kind: &str, force_name: &str) -> String {
    format!("pot.{kind}.{force_name}.txt")
}

/// Per-iteration archive copy, kept for inspecting how the potential evolves.
pub fn archive_file_name(kind: &str, force_name: &str, iteration: usize) -> String {
    format!("step{iteration}.pot.{kind}.{force_name}.txt")
}

/// Per-state, per-term distribution snapshot for offline inspection.
pub fn distribution_file_name(
    kind: &str,
    force_name: &str,
    state_name: &str,
    iteration: usize,
) -> String {
    format!("dist.{kind}.{force_name}.{state_name}.step{iteration}.txt")
}

/// Per-state, per-term fit-score record, one line appended per iteration.
pub fn fit_file_name(kind: &str, force_name: &str, state_name: &str) -> String {
    format!("fits.{kind}.{force_name}.{state_name}.txt")
}

/// Appends one `iteration score` line to a fit-history file.
pub fn append_fit(path: &Path, iteration: usize, score: f64) -> Result<(), TableError> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{iteration} {score:.6}")?;
    Ok(())
}

/// Writes a two-column (coordinate, value) text table.
///
/// The table is written to a temporary sibling and renamed into place, so a
/// failure mid-write never leaves a truncated file at the target path.
pub fn write_table(path: &Path, coords: &[f64], values: &[f64]) -> Result<(), TableError> {
    let tmp = tmp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for (x, v) in coords.iter().zip(values) {
            writeln!(writer, "{x:.17e} {v:.17e}")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_table(path: &Path) -> Result<(Vec<f64>, Vec<f64>), TableError> {
    let file = File::open(path)?;
    let mut coords = Vec::new();
    let mut values = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let mut next = |what: &str| -> Result<f64, TableError> {
            parts
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| TableError::Parse {
                    line: line_no + 1,
                    message: format!("expected {what} in '{trimmed}'"),
                })
        };
        coords.push(next("coordinate")?);
        values.push(next("value")?);
    }
    Ok((coords, values))
}

/// Writes a distribution snapshot as tab-separated (coordinate, density)
/// records.
pub fn write_distribution(path: &Path, dist: &Distribution) -> Result<(), TableError> {
    let tmp = tmp_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(&tmp)?;
        for (x, v) in dist.grid().centers().iter().zip(dist.values()) {
            writer.write_record(&[format!("{x:.17e}"), format!("{v:.17e}")])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads a distribution snapshot back onto an expected grid, e.g. a target
/// distribution prepared offline.
pub fn read_distribution(path: &Path, grid: &Grid) -> Result<Distribution, TableError> {
    let mut values = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    for record in reader.records() {
        let record = record?;
        let value: f64 = record
            .get(1)
            .and_then(|t| t.trim().parse().ok())
            .ok_or_else(|| TableError::Parse {
                line: values.len() + 1,
                message: "expected (coordinate, density) record".to_string(),
            })?;
        values.push(value);
    }
    Ok(Distribution::new(*grid, values)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
