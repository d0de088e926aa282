//! Country assignment and mesh construction (spec.md §4.7), grounded on the
//! teacher's `dag.rs` (petgraph usage, graph-shaped result type) and
//! `original_source/sparse_blobpool/p2p/topology.py` for the Random and
//! Geographic policies. Latency-aware and Diverse have no counterpart in
//! `original_source/` and are built directly from the normative text.

use std::collections::{HashMap, HashSet};

use petgraph::graph::UnGraph;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{CountryTable, InterconnectionPolicy};
use crate::types::{ActorId, Country};

/// Country assignment and canonical peer-mesh edge list for a run.
#[derive(Debug, Clone)]
pub struct Topology {
    pub country_of: HashMap<ActorId, Country>,
    pub edges: Vec<(ActorId, ActorId)>,
}

impl Topology {
    pub fn peers_of(&self, node: ActorId) -> Vec<ActorId> {
        self.edges
            .iter()
            .filter_map(|&(a, b)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// A petgraph view of the mesh, kept for callers that want graph
    /// algorithms (diameter, connectivity checks) rather than a flat edge
    /// list.
    pub fn as_graph(&self) -> UnGraph<ActorId, ()> {
        let mut graph = UnGraph::new_undirected();
        let mut index_of = HashMap::new();
        for &node in self.country_of.keys() {
            index_of.insert(node, graph.add_node(node));
        }
        for &(a, b) in &self.edges {
            graph.add_edge(index_of[&a], index_of[&b], ());
        }
        graph
    }
}

fn canonicalize(a: ActorId, b: ActorId) -> (ActorId, ActorId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deterministic 256-bit Kademlia-style identifier derived from the node's
/// display form (spec.md §4.7 "Geographic").
fn kademlia_id(node: ActorId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(node.to_string().as_bytes());
    hasher.finalize().into()
}

fn xor_distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// `bit_length(xor) - 1`, or `0` for an all-zero distance (spec.md §4.7).
fn bucket_of(xor: &[u8; 32]) -> u32 {
    for (i, &byte) in xor.iter().enumerate() {
        if byte != 0 {
            let bit_len = (32 - i) * 8 - byte.leading_zeros() as usize;
            return (bit_len - 1) as u32;
        }
    }
    0
}

/// Builds a [`Topology`] for `node_count` nodes per `policy` (spec.md §4.7).
pub fn build_topology(
    node_count: u32,
    mesh_degree: u32,
    policy: InterconnectionPolicy,
    countries: &CountryTable,
    rng: &mut ChaCha8Rng,
) -> Topology {
    let country_of = assign_countries(node_count, countries, rng);
    let nodes: Vec<ActorId> = (0..node_count).map(ActorId::node).collect();

    let edges = match policy {
        InterconnectionPolicy::Random => build_random(&nodes, mesh_degree, rng),
        InterconnectionPolicy::Geographic => build_geographic(&nodes, &country_of, mesh_degree, countries, rng),
        InterconnectionPolicy::LatencyAware => build_latency_aware(&nodes, &country_of, mesh_degree, countries, rng),
        InterconnectionPolicy::Diverse => build_diverse(&nodes, &country_of, mesh_degree, rng),
    };

    debug!(node_count, mesh_degree, ?policy, edge_count = edges.len(), "topology built");
    Topology { country_of, edges }
}

fn assign_countries(node_count: u32, countries: &CountryTable, rng: &mut ChaCha8Rng) -> HashMap<ActorId, Country> {
    let total: u32 = countries.weights.values().sum();
    let mut cumulative: Vec<(u32, &Country)> = Vec::new();
    let mut acc = 0u32;
    for (country, weight) in &countries.weights {
        acc += weight;
        cumulative.push((acc, country));
    }

    let mut assignment = HashMap::new();
    for i in 0..node_count {
        let node = ActorId::node(i);
        if total == 0 {
            assignment.insert(node, Country::from("US"));
            continue;
        }
        let draw = rng.gen_range(0..total);
        let country = cumulative
            .iter()
            .find(|&&(threshold, _)| draw < threshold)
            .map(|&(_, c)| c.clone())
            .unwrap_or_else(|| cumulative.last().unwrap().1.clone());
        assignment.insert(node, country);
    }
    assignment
}

/// Random policy: random-regular-graph-shaped construction when `n *
/// mesh_degree` is even and `mesh_degree < n`, per-node uniform sampling
/// otherwise (spec.md §4.7).
fn build_random(nodes: &[ActorId], mesh_degree: u32, rng: &mut ChaCha8Rng) -> Vec<(ActorId, ActorId)> {
    let n = nodes.len() as u32;
    let mut edges = HashSet::new();

    if n > 0 && mesh_degree < n && (n * mesh_degree) % 2 == 0 {
        // Pairing-model construction: each node gets `mesh_degree` stubs,
        // stubs are shuffled and paired up, matching networkx's
        // random_regular_graph in spirit without depending on it.
        let mut stubs: Vec<u32> = (0..n).flat_map(|i| std::iter::repeat(i).take(mesh_degree as usize)).collect();
        shuffle(&mut stubs, rng);
        let mut it = stubs.into_iter();
        while let (Some(a), Some(b)) = (it.next(), it.next()) {
            if a != b {
                edges.insert(canonicalize(nodes[a as usize], nodes[b as usize]));
            }
        }
    } else {
        for (i, &node) in nodes.iter().enumerate() {
            let mut candidates: Vec<u32> = (0..n).filter(|&j| j != i as u32).collect();
            shuffle(&mut candidates, rng);
            for &j in candidates.iter().take(mesh_degree as usize) {
                edges.insert(canonicalize(node, nodes[j as usize]));
            }
        }
    }

    edges.into_iter().collect()
}

fn shuffle<T>(items: &mut [T], rng: &mut ChaCha8Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Geographic/Kademlia policy (spec.md §4.7).
fn build_geographic(
    nodes: &[ActorId],
    country_of: &HashMap<ActorId, Country>,
    mesh_degree: u32,
    countries: &CountryTable,
    rng: &mut ChaCha8Rng,
) -> Vec<(ActorId, ActorId)> {
    let n = nodes.len();
    let kad_ids: Vec<[u8; 32]> = nodes.iter().map(|&node| kademlia_id(node)).collect();

    let mut edges = HashSet::new();
    for (i, &node) in nodes.iter().enumerate() {
        let my_country = &country_of[&node];
        let mut distances: Vec<(u32, usize)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (bucket_of(&xor_distance(&kad_ids[i], &kad_ids[j])), j))
            .collect();
        distances.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut buckets: HashMap<u32, Vec<usize>> = HashMap::new();
        for &(bucket, j) in &distances {
            buckets.entry(bucket).or_default().push(j);
        }

        let mut selected: HashSet<usize> = HashSet::new();
        let mut bucket_keys: Vec<u32> = buckets.keys().copied().collect();
        bucket_keys.sort_unstable();

        for bucket in bucket_keys {
            if selected.len() >= mesh_degree as usize {
                break;
            }
            let candidates = &buckets[&bucket];
            let same_country: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&j| &country_of[&nodes[j]] == my_country)
                .collect();
            if let Some(&pick) = same_country.first() {
                selected.insert(pick);
                continue;
            }
            let mut other: Vec<usize> = candidates.to_vec();
            other.sort_by(|&a, &b| {
                let la = countries.lookup_base_ms(my_country, &country_of[&nodes[a]]);
                let lb = countries.lookup_base_ms(my_country, &country_of[&nodes[b]]);
                la.partial_cmp(&lb).unwrap()
            });
            if let Some(&pick) = other.first() {
                selected.insert(pick);
            }
        }

        let mut same_country_fill: Vec<usize> = (0..n)
            .filter(|&j| j != i && !selected.contains(&j) && &country_of[&nodes[j]] == my_country)
            .collect();
        shuffle_indices(&mut same_country_fill, rng);
        for j in same_country_fill {
            if selected.len() >= mesh_degree as usize {
                break;
            }
            selected.insert(j);
        }

        if selected.len() < mesh_degree as usize {
            let mut cross: Vec<usize> = (0..n)
                .filter(|&j| j != i && !selected.contains(&j) && &country_of[&nodes[j]] != my_country)
                .collect();
            cross.sort_by(|&a, &b| {
                let la = countries.lookup_base_ms(my_country, &country_of[&nodes[a]]);
                let lb = countries.lookup_base_ms(my_country, &country_of[&nodes[b]]);
                la.partial_cmp(&lb).unwrap()
            });
            for j in cross {
                if selected.len() >= mesh_degree as usize {
                    break;
                }
                selected.insert(j);
            }
        }

        for j in selected {
            edges.insert(canonicalize(node, nodes[j]));
        }
    }

    edges.into_iter().collect()
}

fn shuffle_indices(items: &mut [usize], rng: &mut ChaCha8Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Latency-aware policy: ascending `(base_latency, random_tiebreak)`, top
/// `mesh_degree` (spec.md §4.7).
fn build_latency_aware(
    nodes: &[ActorId],
    country_of: &HashMap<ActorId, Country>,
    mesh_degree: u32,
    countries: &CountryTable,
    rng: &mut ChaCha8Rng,
) -> Vec<(ActorId, ActorId)> {
    let n = nodes.len();
    let mut edges = HashSet::new();

    for (i, &node) in nodes.iter().enumerate() {
        let my_country = &country_of[&node];
        let mut candidates: Vec<(f64, u64, usize)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| {
                let latency = countries.lookup_base_ms(my_country, &country_of[&nodes[j]]);
                (latency, rng.gen::<u64>(), j)
            })
            .collect();
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

        for &(_, _, j) in candidates.iter().take(mesh_degree as usize) {
            edges.insert(canonicalize(node, nodes[j]));
        }
    }

    edges.into_iter().collect()
}

/// Diverse policy: foreign-country diversity, then same-country fill, then
/// random fill (spec.md §4.7).
fn build_diverse(
    nodes: &[ActorId],
    country_of: &HashMap<ActorId, Country>,
    mesh_degree: u32,
    rng: &mut ChaCha8Rng,
) -> Vec<(ActorId, ActorId)> {
    let n = nodes.len();
    let mut edges = HashSet::new();

    let mut by_country: HashMap<&Country, Vec<usize>> = HashMap::new();
    for (j, &node) in nodes.iter().enumerate() {
        by_country.entry(&country_of[&node]).or_default().push(j);
    }

    for (i, &node) in nodes.iter().enumerate() {
        let my_country = &country_of[&node];
        let mut selected: HashSet<usize> = HashSet::new();

        let foreign_country_count = by_country.len().saturating_sub(1).min((mesh_degree as usize / 4).max(3));
        let mut foreign_countries: Vec<&Country> = by_country
            .keys()
            .filter(|c| ***c != *my_country)
            .map(|c| *c)
            .collect();
        shuffle_refs(&mut foreign_countries, rng);
        for country in foreign_countries.into_iter().take(foreign_country_count) {
            let mut candidates = by_country[country].clone();
            shuffle_indices(&mut candidates, rng);
            if let Some(&pick) = candidates.first() {
                selected.insert(pick);
            }
        }

        let same_country_target = selected.len() + (mesh_degree as usize / 3);
        let mut same_country: Vec<usize> = by_country
            .get(my_country)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&j| j != i && !selected.contains(&j))
            .collect();
        shuffle_indices(&mut same_country, rng);
        for j in same_country {
            if selected.len() >= same_country_target || selected.len() >= mesh_degree as usize {
                break;
            }
            selected.insert(j);
        }

        if selected.len() < mesh_degree as usize {
            let mut rest: Vec<usize> = (0..n).filter(|&j| j != i && !selected.contains(&j)).collect();
            shuffle_indices(&mut rest, rng);
            for j in rest {
                if selected.len() >= mesh_degree as usize {
                    break;
                }
                selected.insert(j);
            }
        }

        for j in selected {
            edges.insert(canonicalize(node, nodes[j]));
        }
    }

    edges.into_iter().collect()
}

fn shuffle_refs<T>(items: &mut [T], rng: &mut ChaCha8Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn edges_are_canonically_ordered_and_deduplicated() {
        let countries = CountryTable::default();
        let topo = build_topology(20, 5, InterconnectionPolicy::Random, &countries, &mut rng());
        let mut seen = HashSet::new();
        for (a, b) in &topo.edges {
            assert!(a < b, "edge must be canonically ordered");
            assert!(seen.insert((*a, *b)), "no duplicate edges");
        }
    }

    #[test]
    fn every_node_gets_a_country() {
        let countries = CountryTable::default();
        let topo = build_topology(10, 3, InterconnectionPolicy::Geographic, &countries, &mut rng());
        assert_eq!(topo.country_of.len(), 10);
    }

    #[test]
    fn latency_aware_prefers_low_latency_peers() {
        let countries = CountryTable::default();
        let topo = build_topology(15, 4, InterconnectionPolicy::LatencyAware, &countries, &mut rng());
        for node in (0..15).map(ActorId::node) {
            assert!(!topo.peers_of(node).is_empty(), "every node should have peers");
        }
    }

    #[test]
    fn diverse_policy_produces_expected_degree_bound() {
        let countries = CountryTable::default();
        let topo = build_topology(30, 6, InterconnectionPolicy::Diverse, &countries, &mut rng());
        for node in (0..30).map(ActorId::node) {
            assert!(topo.peers_of(node).len() <= 30);
        }
    }

    #[test]
    fn bucket_of_zero_distance_is_zero() {
        assert_eq!(bucket_of(&[0u8; 32]), 0);
    }
}
