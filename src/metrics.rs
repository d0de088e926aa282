//! Aggregate bandwidth, propagation, and protocol-behavior metrics (spec.md
//! §4.6), grounded on `original_source/sparse_blobpool/metrics/collector.py`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{ActorId, CellMask, Country, TxHash, FULL_BLOB_SIZE};

/// Role observed for a (node, tx) pair, used only for the provider-ratio
/// and coverage metrics — distinct from [`crate::node::Role`], which also
/// drives protocol behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedRole {
    Provider,
    Sampler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthSnapshot {
    pub timestamp: f64,
    pub total_bytes: u64,
    pub control_bytes: u64,
    pub data_bytes: u64,
    pub per_country: HashMap<Country, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationSnapshot {
    pub timestamp: f64,
    pub tx_hash: TxHash,
    pub nodes_seen: usize,
    pub nodes_with_full: usize,
    pub nodes_with_sample: usize,
    pub reconstruction_possible: bool,
}

#[derive(Debug, Clone, Default)]
struct TxMetrics {
    first_seen_time: f64,
    propagation_complete_time: Option<f64>,
    provider_count: u64,
    sampler_count: u64,
    nodes_seen: HashSet<ActorId>,
    cell_masks: HashMap<ActorId, CellMask>,
    included_at_slot: Option<u64>,
}

/// Minimum columns (of 128) whose union across all observing nodes must be
/// distinct for reconstruction to be possible (spec.md §4.6).
const RECONSTRUCTION_THRESHOLD: u32 = 64;

/// Shared handle passed to [`crate::network::Network`] and every
/// [`crate::node::Node`]; accumulates counters during the run and computes
/// derived aggregates at [`MetricsCollector::finalize`].
pub struct MetricsCollector {
    sample_interval: f64,
    node_count: u32,
    expected_provider_probability: f64,

    bytes_sent: HashMap<ActorId, u64>,
    bytes_received: HashMap<ActorId, u64>,
    bytes_sent_control: HashMap<ActorId, u64>,
    bytes_sent_data: HashMap<ActorId, u64>,

    node_countries: HashMap<ActorId, Country>,
    node_custody_masks: HashMap<ActorId, CellMask>,

    bandwidth_timeseries: Vec<BandwidthSnapshot>,
    propagation_timeseries: Vec<PropagationSnapshot>,
    tx_metrics: HashMap<TxHash, TxMetrics>,

    last_snapshot_time: f64,
    total_bytes: u64,
    control_bytes: u64,
    data_bytes: u64,
}

impl MetricsCollector {
    pub fn new(sample_interval: f64, expected_provider_probability: f64) -> Self {
        MetricsCollector {
            sample_interval,
            node_count: 0,
            expected_provider_probability,
            bytes_sent: HashMap::new(),
            bytes_received: HashMap::new(),
            bytes_sent_control: HashMap::new(),
            bytes_sent_data: HashMap::new(),
            node_countries: HashMap::new(),
            node_custody_masks: HashMap::new(),
            bandwidth_timeseries: Vec::new(),
            propagation_timeseries: Vec::new(),
            tx_metrics: HashMap::new(),
            last_snapshot_time: 0.0,
            total_bytes: 0,
            control_bytes: 0,
            data_bytes: 0,
        }
    }

    pub fn register_node(&mut self, node_id: ActorId, country: Country, custody_mask: CellMask) {
        self.node_countries.insert(node_id, country);
        self.node_custody_masks.insert(node_id, custody_mask);
        self.node_count += 1;
    }

    pub fn record_bandwidth(&mut self, from: ActorId, to: ActorId, size: u64, is_control: bool) {
        *self.bytes_sent.entry(from).or_insert(0) += size;
        *self.bytes_received.entry(to).or_insert(0) += size;
        self.total_bytes += size;
        if is_control {
            *self.bytes_sent_control.entry(from).or_insert(0) += size;
            self.control_bytes += size;
        } else {
            *self.bytes_sent_data.entry(from).or_insert(0) += size;
            self.data_bytes += size;
        }
    }

    pub fn record_tx_seen(
        &mut self,
        node_id: ActorId,
        tx_hash: TxHash,
        role: ObservedRole,
        cell_mask: CellMask,
        now: f64,
    ) {
        let node_count = self.node_count;
        let metrics = self.tx_metrics.entry(tx_hash).or_insert_with(|| TxMetrics {
            first_seen_time: now,
            ..Default::default()
        });

        metrics.nodes_seen.insert(node_id);
        metrics.cell_masks.insert(node_id, cell_mask);

        match role {
            ObservedRole::Provider => metrics.provider_count += 1,
            ObservedRole::Sampler => metrics.sampler_count += 1,
        }

        if metrics.propagation_complete_time.is_none()
            && metrics.nodes_seen.len() as f64 >= node_count as f64 * 0.99
        {
            metrics.propagation_complete_time = Some(now);
        }
    }

    pub fn record_inclusion(&mut self, tx_hash: TxHash, slot: u64) {
        if let Some(m) = self.tx_metrics.get_mut(&tx_hash) {
            m.included_at_slot = Some(slot);
        }
    }

    /// Periodic bandwidth + propagation snapshot (spec.md §4.6); a no-op if
    /// called before `sample_interval` simulated seconds have elapsed.
    pub fn snapshot(&mut self, now: f64) {
        if now - self.last_snapshot_time < self.sample_interval {
            return;
        }
        self.last_snapshot_time = now;

        let mut per_country: HashMap<Country, u64> = HashMap::new();
        for (node_id, bytes) in &self.bytes_sent {
            if let Some(country) = self.node_countries.get(node_id) {
                *per_country.entry(country.clone()).or_insert(0) += bytes;
            }
        }

        self.bandwidth_timeseries.push(BandwidthSnapshot {
            timestamp: now,
            total_bytes: self.total_bytes,
            control_bytes: self.control_bytes,
            data_bytes: self.data_bytes,
            per_country,
        });

        for (tx_hash, metrics) in &self.tx_metrics {
            if metrics.propagation_complete_time.is_some() {
                continue;
            }
            let full_count = metrics
                .cell_masks
                .values()
                .filter(|m| m.is_full())
                .count();
            let sample_count = metrics.nodes_seen.len() - full_count;
            let all_columns = metrics
                .cell_masks
                .values()
                .fold(CellMask::EMPTY, |acc, m| acc.union(*m));

            self.propagation_timeseries.push(PropagationSnapshot {
                timestamp: now,
                tx_hash: *tx_hash,
                nodes_seen: metrics.nodes_seen.len(),
                nodes_with_full: full_count,
                nodes_with_sample: sample_count,
                reconstruction_possible: all_columns.popcount() >= RECONSTRUCTION_THRESHOLD,
            });
        }
    }

    /// Computes every derived aggregate in spec.md §4.6 and consumes
    /// `self`.
    pub fn finalize(mut self, now: f64) -> SimulationResults {
        self.snapshot(now);

        let total_txs = self.tx_metrics.len();
        let mut propagation_times: Vec<f64> = Vec::new();
        let mut reconstruction_successes = 0usize;
        let mut inclusions: HashMap<String, u64> = HashMap::new();

        for (tx_hash, metrics) in &self.tx_metrics {
            if let Some(complete) = metrics.propagation_complete_time {
                propagation_times.push(complete - metrics.first_seen_time);
            }
            let all_columns = metrics
                .cell_masks
                .values()
                .fold(CellMask::EMPTY, |acc, m| acc.union(*m));
            if all_columns.popcount() >= RECONSTRUCTION_THRESHOLD {
                reconstruction_successes += 1;
            }
            if let Some(slot) = metrics.included_at_slot {
                inclusions.insert(tx_hash.to_hex(), slot);
            }
        }
        propagation_times.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let median_propagation_time = median(&propagation_times);
        let p99_propagation_time = if propagation_times.is_empty() {
            0.0
        } else {
            let idx = ((propagation_times.len() as f64) * 0.99) as usize;
            propagation_times[idx.min(propagation_times.len() - 1)]
        };

        let total_providers: u64 = self.tx_metrics.values().map(|m| m.provider_count).sum();
        let total_roles: u64 = self
            .tx_metrics
            .values()
            .map(|m| m.provider_count + m.sampler_count)
            .sum();

        let naive_bandwidth = FULL_BLOB_SIZE * self.node_count as u64 * total_txs as u64;
        let bandwidth_reduction_vs_full = if self.total_bytes > 0 {
            naive_bandwidth as f64 / self.total_bytes as f64
        } else {
            0.0
        };

        let mut provider_coverages = Vec::new();
        for metrics in self.tx_metrics.values() {
            let nodes_seen = metrics.nodes_seen.len();
            if nodes_seen > 0 {
                provider_coverages.push(metrics.provider_count as f64 / nodes_seen as f64);
            }
        }
        let provider_coverage = if provider_coverages.is_empty() {
            0.0
        } else {
            provider_coverages.iter().sum::<f64>() / provider_coverages.len() as f64
        };

        let mut local_availability_count = 0u64;
        let mut total_node_tx_pairs = 0u64;
        for metrics in self.tx_metrics.values() {
            for (node_id, cell_mask) in &metrics.cell_masks {
                total_node_tx_pairs += 1;
                if cell_mask.is_full() {
                    local_availability_count += 1;
                    continue;
                }
                if let Some(custody) = self.node_custody_masks.get(node_id) {
                    if cell_mask.covers(*custody) {
                        local_availability_count += 1;
                    }
                }
            }
        }
        let local_availability_met = if total_node_tx_pairs > 0 {
            local_availability_count as f64 / total_node_tx_pairs as f64
        } else {
            0.0
        };

        info!(
            total_txs,
            total_bytes = self.total_bytes,
            median_propagation_time,
            "metrics finalized"
        );

        SimulationResults {
            total_bandwidth_bytes: self.total_bytes,
            bandwidth_per_blob: if total_txs > 0 {
                self.total_bytes as f64 / total_txs as f64
            } else {
                0.0
            },
            bandwidth_reduction_vs_full,
            median_propagation_time,
            p99_propagation_time,
            propagation_success_rate: if total_txs > 0 {
                propagation_times.len() as f64 / total_txs as f64
            } else {
                0.0
            },
            observed_provider_ratio: if total_roles > 0 {
                total_providers as f64 / total_roles as f64
            } else {
                0.0
            },
            reconstruction_success_rate: if total_txs > 0 {
                reconstruction_successes as f64 / total_txs as f64
            } else {
                0.0
            },
            provider_coverage,
            expected_provider_coverage: self.expected_provider_probability,
            local_availability_met,
            bandwidth_timeseries: self.bandwidth_timeseries,
            propagation_timeseries: self.propagation_timeseries,
            bytes_sent_per_node: self.bytes_sent,
            bytes_received_per_node: self.bytes_received,
            inclusions,
        }
    }
}

/// Matches Python's `statistics.median()`: the single middle element for an
/// odd-length sorted list, the mean of the two middle elements for even.
fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Results record emitted by [`MetricsCollector::finalize`] (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResults {
    pub total_bandwidth_bytes: u64,
    pub bandwidth_per_blob: f64,
    pub bandwidth_reduction_vs_full: f64,
    pub median_propagation_time: f64,
    pub p99_propagation_time: f64,
    pub propagation_success_rate: f64,
    pub observed_provider_ratio: f64,
    pub reconstruction_success_rate: f64,
    pub provider_coverage: f64,
    pub expected_provider_coverage: f64,
    pub local_availability_met: f64,
    pub bandwidth_timeseries: Vec<BandwidthSnapshot>,
    pub propagation_timeseries: Vec<PropagationSnapshot>,
    pub bytes_sent_per_node: HashMap<ActorId, u64>,
    pub bytes_received_per_node: HashMap<ActorId, u64>,
    /// Slot each included transaction was packed into, keyed by the tx
    /// hash's hex encoding (spec.md §4.6 "Inclusion: `included_at_slot` per
    /// tx").
    pub inclusions: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagation_complete_time_set_at_99_percent() {
        let mut metrics = MetricsCollector::new(1.0, 0.15);
        for i in 0..100u32 {
            metrics.register_node(ActorId::node(i), "US".to_string(), CellMask::EMPTY);
        }
        let tx = TxHash([1u8; 32]);
        for i in 0..98u32 {
            metrics.record_tx_seen(ActorId::node(i), tx, ObservedRole::Provider, CellMask::ALL_ONES, i as f64);
        }
        assert!(metrics.tx_metrics[&tx].propagation_complete_time.is_none());
        metrics.record_tx_seen(ActorId::node(98), tx, ObservedRole::Provider, CellMask::ALL_ONES, 98.0);
        assert!(metrics.tx_metrics[&tx].propagation_complete_time.is_some());
    }

    #[test]
    fn finalize_with_no_txs_is_all_zero() {
        let metrics = MetricsCollector::new(1.0, 0.15);
        let results = metrics.finalize(10.0);
        assert_eq!(results.propagation_success_rate, 0.0);
        assert_eq!(results.reconstruction_success_rate, 0.0);
    }
}
