use super::grid::{Distribution, Grid, GridError};
use super::topology::{Topology, TopologyError};
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Trajectory contains no usable frames")]
    EmptyTrajectory,

    #[error("Frame {frame} holds {got} positions but the topology has {expected} particles")]
    FrameSizeMismatch {
        frame: usize,
        got: usize,
        expected: usize,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// One snapshot of particle positions in an orthorhombic periodic box.
#[derive(Debug, Clone)]
pub struct Frame {
    pub positions: Vec<Point3<f64>>,
    pub box_lengths: Vector3<f64>,
}

impl Frame {
    /// Minimum-image displacement from particle `i` to particle `j`.
    #[inline]
    pub fn min_image(&self, i: usize, j: usize) -> Vector3<f64> {
        let mut d = self.positions[j] - self.positions[i];
        for axis in 0..3 {
            let l = self.box_lengths[axis];
            if l > 0.0 {
                d[axis] -= l * (d[axis] / l).round();
            }
        }
        d
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.box_lengths.x * self.box_lengths.y * self.box_lengths.z
    }
}

/// Which observable to histogram from a trajectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingTarget {
    Pairs { type1: String, type2: String },
    Bonds { type1: String, type2: String },
    Angles { types: [String; 3] },
    Dihedrals { types: [String; 4] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOptions {
    /// Cap on the number of frames consulted, bounding memory and CPU.
    pub max_frames: Option<usize>,
    /// Exclude pairs separated by at most this many bonds (pairs only).
    pub exclusion_depth: usize,
    /// Moving-average window applied as a post-pass, if any.
    pub smooth_window: Option<usize>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            exclusion_depth: 0,
            smooth_window: None,
        }
    }
}

/// Computes a normalized distribution of the requested observable over the
/// given grid. Pair distances produce a radial distribution function
/// normalized against the ideal-gas count in each spherical shell; bonded
/// observables produce unit-area histograms.
///
/// Pure function of its inputs.
pub fn sample(
    frames: &[Frame],
    topology: &Topology,
    target: &SamplingTarget,
    grid: &Grid,
    opts: &SampleOptions,
) -> Result<Distribution, SamplingError> {
    let n_frames = opts.max_frames.unwrap_or(frames.len()).min(frames.len());
    if n_frames == 0 {
        return Err(SamplingError::EmptyTrajectory);
    }
    let frames = &frames[..n_frames];
    for (idx, frame) in frames.iter().enumerate() {
        if frame.positions.len() != topology.n_particles() {
            return Err(SamplingError::FrameSizeMismatch {
                frame: idx,
                got: frame.positions.len(),
                expected: topology.n_particles(),
            });
        }
    }

    let values = match target {
        SamplingTarget::Pairs { type1, type2 } => {
            radial_distribution(frames, topology, type1, type2, grid, opts.exclusion_depth)?
        }
        SamplingTarget::Bonds { type1, type2 } => {
            bond_histogram(frames, topology, type1, type2, grid)?
        }
        SamplingTarget::Angles { types } => angle_histogram(frames, topology, types, grid)?,
        SamplingTarget::Dihedrals { types } => dihedral_histogram(frames, topology, types, grid)?,
    };

    let dist = Distribution::new(*grid, values)?;
    Ok(match opts.smooth_window {
        Some(window) => dist.smoothed(window),
        None => dist,
    })
}

fn radial_distribution(
    frames: &[Frame],
    topology: &Topology,
    type1: &str,
    type2: &str,
    grid: &Grid,
    exclusion_depth: usize,
) -> Result<Vec<f64>, SamplingError> {
    let set1 = topology.indices_of(type1)?;
    let set2 = topology.indices_of(type2)?;
    let same_type = type1 == type2;
    let excluded = topology.exclusions(exclusion_depth);

    let n_pairs = if same_type {
        (set1.len() * (set1.len() - 1)) as f64 / 2.0
    } else {
        (set1.len() * set2.len()) as f64
    };
    if n_pairs == 0.0 {
        return Ok(vec![0.0; grid.n_bins]);
    }

    let mut counts = vec![0.0; grid.n_bins];
    let mut volume_sum = 0.0;
    for frame in frames {
        volume_sum += frame.volume();
        for (a, &i) in set1.iter().enumerate() {
            let partners: &[usize] = if same_type { &set1[a + 1..] } else { &set2 };
            for &j in partners {
                if i == j || excluded.contains(&(i.min(j), i.max(j))) {
                    continue;
                }
                if let Some(bin) = grid.bin_index(frame.min_image(i, j).norm()) {
                    counts[bin] += 1.0;
                }
            }
        }
    }

    // Normalize by the ideal-gas expectation for each spherical shell,
    // averaged over frames.
    let mean_volume = volume_sum / frames.len() as f64;
    let dr = grid.spacing();
    let values = counts
        .iter()
        .enumerate()
        .map(|(bin, &count)| {
            let r_lo = grid.lo + bin as f64 * dr;
            let r_hi = r_lo + dr;
            let shell = 4.0 / 3.0 * PI * (r_hi.powi(3) - r_lo.powi(3));
            let ideal = n_pairs * shell / mean_volume;
            count / (frames.len() as f64 * ideal)
        })
        .collect();
    Ok(values)
}

fn bond_histogram(
    frames: &[Frame],
    topology: &Topology,
    type1: &str,
    type2: &str,
    grid: &Grid,
) -> Result<Vec<f64>, SamplingError> {
    topology.indices_of(type1)?;
    topology.indices_of(type2)?;
    let bonds: Vec<(usize, usize)> = topology
        .bonds()
        .into_iter()
        .filter(|&(i, j)| {
            let (a, b) = (topology.type_of(i), topology.type_of(j));
            (a == type1 && b == type2) || (a == type2 && b == type1)
        })
        .collect();

    let mut counts = vec![0.0; grid.n_bins];
    for frame in frames {
        for &(i, j) in &bonds {
            if let Some(bin) = grid.bin_index(frame.min_image(i, j).norm()) {
                counts[bin] += 1.0;
            }
        }
    }
    Ok(normalize_unit_area(counts, grid.spacing()))
}

fn angle_histogram(
    frames: &[Frame],
    topology: &Topology,
    types: &[String; 3],
    grid: &Grid,
) -> Result<Vec<f64>, SamplingError> {
    for t in types {
        topology.indices_of(t)?;
    }
    let triplets: Vec<(usize, usize, usize)> = topology
        .angles()
        .into_iter()
        .filter(|&(i, j, k)| {
            let labels = [topology.type_of(i), topology.type_of(j), topology.type_of(k)];
            labels == [&types[0], &types[1], &types[2]]
                || labels == [&types[2], &types[1], &types[0]]
        })
        .collect();

    let mut counts = vec![0.0; grid.n_bins];
    for frame in frames {
        for &(i, j, k) in &triplets {
            let v1 = frame.min_image(j, i);
            let v2 = frame.min_image(j, k);
            let cosine = v1.dot(&v2) / (v1.norm() * v2.norm());
            let theta = cosine.clamp(-1.0, 1.0).acos();
            if let Some(bin) = grid.bin_index(theta) {
                counts[bin] += 1.0;
            }
        }
    }
    Ok(normalize_unit_area(counts, grid.spacing()))
}

fn dihedral_histogram(
    frames: &[Frame],
    topology: &Topology,
    types: &[String; 4],
    grid: &Grid,
) -> Result<Vec<f64>, SamplingError> {
    for t in types {
        topology.indices_of(t)?;
    }
    let quads: Vec<(usize, usize, usize, usize)> = topology
        .dihedrals()
        .into_iter()
        .filter(|&(i, j, k, l)| {
            let labels = [
                topology.type_of(i),
                topology.type_of(j),
                topology.type_of(k),
                topology.type_of(l),
            ];
            labels == [&types[0], &types[1], &types[2], &types[3]]
                || labels == [&types[3], &types[2], &types[1], &types[0]]
        })
        .collect();

    let mut counts = vec![0.0; grid.n_bins];
    for frame in frames {
        for &(i, j, k, l) in &quads {
            let b1 = frame.min_image(i, j);
            let b2 = frame.min_image(j, k);
            let b3 = frame.min_image(k, l);
            let n1 = b1.cross(&b2);
            let n2 = b2.cross(&b3);
            let phi = (b2.norm() * b1.dot(&n2)).atan2(n1.dot(&n2));
            if let Some(bin) = grid.bin_index(phi) {
                counts[bin] += 1.0;
            }
        }
    }
    Ok(normalize_unit_area(counts, grid.spacing()))
}

fn normalize_unit_area(counts: Vec<f64>, dx: f64) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total == 0.0 {
        return counts;
    }
    counts.into_iter().map(|c| c / (total * dx)).collect()
}
