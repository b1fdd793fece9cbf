use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum TopologyError {
    #[error("Particle type '{0}' is not present in the topology")]
    UnknownType(String),

    #[error("Bond ({0}, {1}) references a particle outside the topology of {2} particles")]
    BondOutOfRange(usize, usize, usize),
}

/// Bead types and bonded structure of the coarse-grained system.
///
/// Angles and dihedrals are not stored explicitly; they are enumerated from
/// the bond graph, so a topology file only needs to list bonds.
#[derive(Debug, Clone)]
pub struct Topology {
    types: Vec<String>,
    graph: UnGraph<usize, ()>,
}

impl Topology {
    pub fn new(types: Vec<String>, bonds: &[(usize, usize)]) -> Result<Self, TopologyError> {
        let n = types.len();
        let mut graph = UnGraph::<usize, ()>::with_capacity(n, bonds.len());
        let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
        for &(i, j) in bonds {
            if i >= n || j >= n {
                return Err(TopologyError::BondOutOfRange(i, j, n));
            }
            graph.add_edge(nodes[i], nodes[j], ());
        }
        Ok(Self { types, graph })
    }

    #[inline]
    pub fn n_particles(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn type_of(&self, i: usize) -> &str {
        &self.types[i]
    }

    /// Indices of all particles carrying the given type label.
    pub fn indices_of(&self, label: &str) -> Result<Vec<usize>, TopologyError> {
        let indices: Vec<usize> = (0..self.types.len())
            .filter(|&i| self.types[i] == label)
            .collect();
        if indices.is_empty() {
            return Err(TopologyError::UnknownType(label.to_string()));
        }
        Ok(indices)
    }

    pub fn bonds(&self) -> Vec<(usize, usize)> {
        self.graph
            .edge_indices()
            .map(|e| {
                let (a, b) = self.graph.edge_endpoints(e).unwrap();
                (self.graph[a], self.graph[b])
            })
            .collect()
    }

    fn neighbors(&self, i: usize) -> Vec<usize> {
        self.graph
            .neighbors(NodeIndex::new(i))
            .map(|n| self.graph[n])
            .collect()
    }

    /// All bonded triplets (i, j, k) with j the apex, each listed once with
    /// i < k regardless of bond insertion order.
    pub fn angles(&self) -> Vec<(usize, usize, usize)> {
        let mut triplets = Vec::new();
        for j in 0..self.n_particles() {
            let nbrs = self.neighbors(j);
            for a in 0..nbrs.len() {
                for b in (a + 1)..nbrs.len() {
                    let (i, k) = (nbrs[a].min(nbrs[b]), nbrs[a].max(nbrs[b]));
                    triplets.push((i, j, k));
                }
            }
        }
        triplets
    }

    /// All bonded quadruplets (i, j, k, l) around each central bond j-k.
    pub fn dihedrals(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut quads = Vec::new();
        for (j, k) in self.bonds() {
            for i in self.neighbors(j) {
                if i == k {
                    continue;
                }
                for l in self.neighbors(k) {
                    if l == j || l == i {
                        continue;
                    }
                    quads.push((i, j, k, l));
                }
            }
        }
        quads
    }

    /// Unordered particle pairs separated by at most `depth` bonds.
    ///
    /// Used to exclude covalently linked beads from pair sampling; depth 0
    /// excludes nothing.
    pub fn exclusions(&self, depth: usize) -> HashSet<(usize, usize)> {
        let mut excluded = HashSet::new();
        if depth == 0 {
            return excluded;
        }
        for start in 0..self.n_particles() {
            let mut seen = HashSet::from([start]);
            let mut queue = VecDeque::from([(start, 0usize)]);
            while let Some((node, dist)) = queue.pop_front() {
                if dist == depth {
                    continue;
                }
                for nbr in self.neighbors(node) {
                    if seen.insert(nbr) {
                        excluded.insert((start.min(nbr), start.max(nbr)));
                        queue.push_back((nbr, dist + 1));
                    }
                }
            }
        }
        excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_chain() -> Topology {
        // A-B-B-A linear chain
        let types = vec!["A", "B", "B", "A"]
            .into_iter()
            .map(String::from)
            .collect();
        Topology::new(types, &[(0, 1), (1, 2), (2, 3)]).unwrap()
    }

    #[test]
    fn indices_of_returns_all_occurrences() {
        let top = linear_chain();
        assert_eq!(top.indices_of("A").unwrap(), vec![0, 3]);
        assert_eq!(top.indices_of("B").unwrap(), vec![1, 2]);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let top = linear_chain();
        assert_eq!(
            top.indices_of("C").unwrap_err(),
            TopologyError::UnknownType("C".to_string())
        );
    }

    #[test]
    fn bond_out_of_range_is_rejected() {
        let types = vec!["A".to_string(), "B".to_string()];
        assert!(Topology::new(types, &[(0, 5)]).is_err());
    }

    #[test]
    fn angles_are_enumerated_from_bonds() {
        let top = linear_chain();
        let mut angles = top.angles();
        angles.sort_unstable();
        assert_eq!(angles, vec![(0, 1, 2), (1, 2, 3)]);
    }

    #[test]
    fn angle_triplets_are_canonical_whatever_the_bond_order() {
        // Same chain as linear_chain() with the bond list reversed; petgraph
        // then yields neighbors in the opposite order.
        let types = vec!["A", "B", "B", "A"]
            .into_iter()
            .map(String::from)
            .collect();
        let top = Topology::new(types, &[(2, 3), (1, 2), (0, 1)]).unwrap();
        let mut angles = top.angles();
        angles.sort_unstable();
        assert_eq!(angles, vec![(0, 1, 2), (1, 2, 3)]);
        assert!(angles.iter().all(|&(i, _, k)| i < k));
    }

    #[test]
    fn dihedrals_follow_central_bonds() {
        let top = linear_chain();
        assert_eq!(top.dihedrals(), vec![(0, 1, 2, 3)]);
    }

    #[test]
    fn exclusion_depth_counts_bond_separation() {
        let top = linear_chain();
        assert!(top.exclusions(0).is_empty());

        let one = top.exclusions(1);
        assert_eq!(one, HashSet::from([(0, 1), (1, 2), (2, 3)]));

        let two = top.exclusions(2);
        assert!(two.contains(&(0, 2)));
        assert!(two.contains(&(1, 3)));
        assert!(!two.contains(&(0, 3)));

        assert!(top.exclusions(3).contains(&(0, 3)));
    }
}
