//! Per-link delay model and CoDel virtual congestion queue (spec.md §4.2).
//!
//! Keeps the teacher's `Network` shape — a component actors call into to
//! hand off a message, which schedules the eventual delivery on the kernel
//! and reports to the metrics collector — but replaces QUIC/rustls
//! transport with a pure delay computation, and replaces the speed-of-light
//! light cone with country latency + jitter + transmission + CoDel.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{trace, warn};

use crate::config::CountryTable;
use crate::error::KernelError;
use crate::event::EventPayload;
use crate::kernel::Kernel;
use crate::metrics::MetricsCollector;
use crate::protocol::Message;
use crate::types::{ActorId, Country};

#[derive(Debug, Clone, Copy)]
pub struct CoDelConfig {
    pub target_delay: f64,
    pub interval: f64,
    pub max_queue_bytes: f64,
    pub drain_rate: f64,
}

impl Default for CoDelConfig {
    fn default() -> Self {
        CoDelConfig {
            target_delay: 0.005,
            interval: 0.100,
            max_queue_bytes: 10.0 * 1024.0 * 1024.0,
            drain_rate: 100.0 * 1024.0 * 1024.0,
        }
    }
}

/// Per-directed-link virtual queue state (spec.md §3 `CoDelState`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CoDelState {
    queue_bytes: f64,
    queue_start_time: f64,
    drop_count: u32,
    last_drop_time: f64,
}

/// Computes per-delivery latency and relays messages onto the kernel.
///
/// Owns all `CoDelState`, per-node country/bandwidth registration, and
/// running bandwidth counters (spec.md §3 "The Network exclusively owns
/// CoDelState").
pub struct Network {
    country_table: Arc<CountryTable>,
    codel_config: CoDelConfig,
    default_bandwidth: f64,
    node_country: HashMap<ActorId, Country>,
    node_bandwidth: HashMap<ActorId, f64>,
    codel_state: HashMap<(ActorId, ActorId), CoDelState>,
    messages_delivered: u64,
    total_bytes: u64,
}

impl Network {
    pub fn new(country_table: Arc<CountryTable>, default_bandwidth: f64) -> Self {
        Network {
            country_table,
            codel_config: CoDelConfig::default(),
            default_bandwidth,
            node_country: HashMap::new(),
            node_bandwidth: HashMap::new(),
            codel_state: HashMap::new(),
            messages_delivered: 0,
            total_bytes: 0,
        }
    }

    pub fn with_codel_config(mut self, config: CoDelConfig) -> Self {
        self.codel_config = config;
        self
    }

    pub fn register_node(&mut self, actor_id: ActorId, country: Country, bandwidth: Option<f64>) {
        self.node_country.insert(actor_id, country);
        self.node_bandwidth
            .insert(actor_id, bandwidth.unwrap_or(self.default_bandwidth));
    }

    pub fn messages_delivered(&self) -> u64 {
        self.messages_delivered
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Computes the delay for `msg` travelling `from -> to`, schedules its
    /// arrival on `kernel`, and reports bandwidth to `metrics` (spec.md
    /// §4.2 `deliver`).
    pub fn deliver(
        &mut self,
        kernel: &mut Kernel,
        metrics: &mut MetricsCollector,
        msg: Message,
        from: ActorId,
        to: ActorId,
    ) -> Result<(), KernelError> {
        let size_bytes = msg.size_bytes();
        let is_control = msg.is_control();
        let delay = self.calculate_delay(kernel, from, to, size_bytes);

        self.messages_delivered += 1;
        self.total_bytes += size_bytes;
        metrics.record_bandwidth(from, to, size_bytes, is_control);

        trace!(?from, ?to, delay, size_bytes, "network delivery scheduled");
        kernel.schedule_after(delay, to, EventPayload::Message(msg))
    }

    fn calculate_delay(&mut self, kernel: &mut Kernel, from: ActorId, to: ActorId, size_bytes: u64) -> f64 {
        let from_country = self.node_country.get(&from).cloned().unwrap_or_default();
        let to_country = self.node_country.get(&to).cloned().unwrap_or_default();
        let base_ms = self.country_table.lookup_base_ms(&from_country, &to_country);
        let base = base_ms / 1000.0;

        let jitter_ratio = if base_ms < 30.0 {
            0.05
        } else if base_ms < 80.0 {
            0.10
        } else {
            0.15
        };
        let jitter = gaussian(kernel.rng(), 0.0, base * jitter_ratio);

        let from_bw = *self.node_bandwidth.get(&from).unwrap_or(&self.default_bandwidth);
        let to_bw = *self.node_bandwidth.get(&to).unwrap_or(&self.default_bandwidth);
        let transmission = size_bytes as f64 / from_bw.min(to_bw);

        let codel = self.codel_delay(kernel.current_time().as_secs_f64(), from, to, size_bytes);

        (base + jitter + transmission + codel).max(0.0)
    }

    /// Virtual-queue congestion delay for link `(from, to)` (spec.md §4.2
    /// CoDel steps 1-5).
    fn codel_delay(&mut self, now: f64, from: ActorId, to: ActorId, size_bytes: u64) -> f64 {
        let config = self.codel_config;
        let state = self.codel_state.entry((from, to)).or_default();

        let elapsed = now - state.queue_start_time;
        if elapsed > 0.0 {
            state.queue_bytes = (state.queue_bytes - elapsed * config.drain_rate).max(0.0);
            if state.queue_bytes == 0.0 {
                state.drop_count = 0;
            }
        }

        state.queue_bytes = (state.queue_bytes + size_bytes as f64).min(config.max_queue_bytes);
        state.queue_start_time = now;

        let sojourn = state.queue_bytes / config.drain_rate;

        if sojourn > config.target_delay {
            let time_since_drop = now - state.last_drop_time;
            if time_since_drop > config.interval / (state.drop_count.max(1) as f64).sqrt() {
                state.drop_count += 1;
                state.last_drop_time = now;
                warn!(?from, ?to, drop_count = state.drop_count, "codel backoff engaged");
            }
            sojourn * (1.0 + 0.5 * (state.drop_count as f64).sqrt())
        } else {
            if state.drop_count > 0 && sojourn <= config.target_delay * 0.5 {
                state.drop_count -= 1;
            }
            sojourn
        }
    }
}

/// Zero-mean Gaussian draw via Box-Muller, built on the kernel's uniform
/// stream rather than pulling in a distributions crate for one use site.
fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CountryTable;
    use crate::kernel::Kernel;

    fn network() -> Network {
        Network::new(Arc::new(CountryTable::default()), 1_000_000.0)
    }

    #[test]
    fn codel_delay_grows_under_sustained_load() {
        let mut net = network();
        let from = ActorId::node(0);
        let to = ActorId::node(1);
        let mut kernel = Kernel::new(1, 2);

        let first = net.codel_delay(kernel.current_time().as_secs_f64(), from, to, 1024);
        let second = net.codel_delay(kernel.current_time().as_secs_f64(), from, to, 100_000_000);
        assert!(second > first, "large burst must increase sojourn time");
    }

    #[test]
    fn codel_queue_drains_to_zero_after_idle() {
        let mut net = network();
        let from = ActorId::node(0);
        let to = ActorId::node(1);

        net.codel_delay(0.0, from, to, 1024);
        let drained = net.codel_delay(1000.0, from, to, 0);
        assert_eq!(drained, 0.0, "queue must fully drain after a long idle gap");
    }

    #[test]
    fn gaussian_zero_std_dev_returns_mean() {
        let mut kernel = Kernel::new(1, 1);
        assert_eq!(gaussian(kernel.rng(), 5.0, 0.0), 5.0);
    }
}
