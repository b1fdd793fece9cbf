use super::traits::{TrajectoryData, TrajectoryError, TrajectoryReader};
use crate::core::sampling::Frame;
use crate::core::topology::Topology;
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reader for plain-text XYZ trajectories with a box comment line.
///
/// Frame layout:
///
/// ```text
/// <n_particles>
/// box <Lx> <Ly> <Lz>
/// <type> <x> <y> <z>
/// ...
/// ```
///
/// Bead types come from the first frame. The optional topology file lists
/// one bond per line as two zero-based particle indices; without it the
/// system is treated as unbonded.
#[derive(Debug, Default, Clone, Copy)]
pub struct XyzReader;

impl XyzReader {
    fn parse_frames(path: &Path) -> Result<(Vec<Frame>, Vec<String>), TrajectoryError> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines().enumerate();
        let mut frames = Vec::new();
        let mut types: Vec<String> = Vec::new();

        while let Some((line_no, line)) = lines.next() {
            let line = line?;
            let header = line.trim();
            if header.is_empty() {
                continue;
            }
            let n: usize = header.parse().map_err(|_| TrajectoryError::Parse {
                line: line_no + 1,
                message: format!("expected particle count, got '{header}'"),
            })?;

            let (box_line_no, box_line) = lines.next().ok_or(TrajectoryError::Parse {
                line: line_no + 2,
                message: "missing box line".to_string(),
            })?;
            let box_lengths = parse_box(&box_line?, box_line_no + 1)?;

            let mut positions = Vec::with_capacity(n);
            for _ in 0..n {
                let (pos_line_no, pos_line) = lines.next().ok_or(TrajectoryError::Parse {
                    line: box_line_no + 2,
                    message: "truncated frame".to_string(),
                })?;
                let (label, point) = parse_position(&pos_line?, pos_line_no + 1)?;
                if frames.is_empty() {
                    types.push(label);
                }
                positions.push(point);
            }
            frames.push(Frame {
                positions,
                box_lengths,
            });
        }
        Ok((frames, types))
    }

    fn parse_bonds(path: &Path) -> Result<Vec<(usize, usize)>, TrajectoryError> {
        let file = File::open(path)?;
        let mut bonds = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let parse = |token: Option<&str>| -> Result<usize, TrajectoryError> {
                token
                    .and_then(|t| t.parse().ok())
                    .ok_or(TrajectoryError::Parse {
                        line: line_no + 1,
                        message: format!("expected two bond indices, got '{trimmed}'"),
                    })
            };
            let i = parse(parts.next())?;
            let j = parse(parts.next())?;
            bonds.push((i, j));
        }
        Ok(bonds)
    }
}

fn parse_box(line: &str, line_no: usize) -> Result<Vector3<f64>, TrajectoryError> {
    let parse_err = || TrajectoryError::Parse {
        line: line_no,
        message: format!("expected 'box Lx Ly Lz', got '{}'", line.trim()),
    };
    let mut parts = line.split_whitespace();
    if parts.next() != Some("box") {
        return Err(parse_err());
    }
    let mut next = || -> Result<f64, TrajectoryError> {
        parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| parse_err())
    };
    Ok(Vector3::new(next()?, next()?, next()?))
}

fn parse_position(line: &str, line_no: usize) -> Result<(String, Point3<f64>), TrajectoryError> {
    let parse_err = || TrajectoryError::Parse {
        line: line_no,
        message: format!("expected '<type> x y z', got '{}'", line.trim()),
    };
    let mut parts = line.split_whitespace();
    let label = parts.next().ok_or_else(|| parse_err())?.to_string();
    let mut next = || -> Result<f64, TrajectoryError> {
        parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| parse_err())
    };
    Ok((label, Point3::new(next()?, next()?, next()?)))
}

impl TrajectoryReader for XyzReader {
    fn read(
        &self,
        traj_path: &Path,
        top_path: Option<&Path>,
    ) -> Result<TrajectoryData, TrajectoryError> {
        let (frames, types) = Self::parse_frames(traj_path)?;
        let bonds = match top_path {
            Some(path) => Self::parse_bonds(path)?,
            None => Vec::new(),
        };
        let topology = Topology::new(types, &bonds)?;
        Ok(TrajectoryData { frames, topology })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_frames_types_and_bonds() {
        let dir = tempfile::tempdir().unwrap();
        let traj = write_file(
            dir.path(),
            "query.xyz",
            "2\nbox 10 10 10\nA 0.0 0.0 0.0\nB 1.0 0.0 0.0\n\
             2\nbox 10 10 10\nA 0.0 0.0 0.0\nB 1.5 0.0 0.0\n",
        );
        let top = write_file(dir.path(), "top.txt", "# bonds\n0 1\n");

        let data = XyzReader.read(&traj, Some(&top)).unwrap();
        assert_eq!(data.frames.len(), 2);
        assert_eq!(data.topology.n_particles(), 2);
        assert_eq!(data.topology.type_of(1), "B");
        assert_eq!(data.topology.bonds(), vec![(0, 1)]);
        assert!((data.frames[1].positions[1].x - 1.5).abs() < 1e-12);
    }

    #[test]
    fn missing_box_line_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let traj = write_file(dir.path(), "bad.xyz", "1\nA 0.0 0.0 0.0\n");
        let err = XyzReader.read(&traj, None).unwrap_err();
        assert!(matches!(err, TrajectoryError::Parse { line: 2, .. }));
    }

    #[test]
    fn empty_file_yields_zero_frames() {
        let dir = tempfile::tempdir().unwrap();
        let traj = write_file(dir.path(), "empty.xyz", "");
        let data = XyzReader.read(&traj, None).unwrap();
        assert!(data.frames.is_empty());
    }
}
