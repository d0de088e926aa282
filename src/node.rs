//! The honest node protocol engine (spec.md §4.4): role assignment, the
//! announce/fetch/serve pipeline, request timeouts, and block cleanup.
//!
//! Keeps the teacher's actor shape (an id, a set of peers, an `on_event`
//! dispatch entry point) but replaces the async tokio/mpsc plumbing with
//! synchronous calls against the kernel, grounded on
//! `original_source/sparse_blobpool/p2p/node.py`.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::blobpool::{BlobTxEntry, Blobpool};
use crate::config::SimulationConfig;
use crate::event::EventPayload;
use crate::kernel::Kernel;
use crate::metrics::{MetricsCollector, ObservedRole};
use crate::network::Network;
use crate::protocol::{
    Announce, Block, BlockAnnouncement, Cell, Cells, Command, GetCells, GetTxBodies, Message, TxBodies, TxBody,
};
use crate::types::{ActorId, Address, CellMask, RequestId, TxHash, CELLS_PER_BLOB};

const DEFAULT_GAS_FEE_CAP: u64 = 1_000_000_000;
const DEFAULT_GAS_TIP_CAP: u64 = 100_000_000;
const DEFAULT_BLOB_GAS_PRICE: u64 = 1_000_000;
const DEFAULT_BLOB_TX_SIZE: u64 = 131_072;
const TX_CLEANUP_DELAY: f64 = 2.0;
const BLOB_TX_TYPE: u8 = 3;

/// A node's role for one specific transaction (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Provider,
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Announced,
    AwaitingProviders,
    FetchingTx,
    FetchingCells,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestType {
    TxBody,
    Cells,
}

#[derive(Debug, Clone)]
struct PendingTx {
    role: Role,
    state: TxState,
    provider_peers: HashSet<ActorId>,
    sampler_peers: HashSet<ActorId>,
    cells_received: CellMask,
    pending_request_id: Option<RequestId>,
}

impl PendingTx {
    fn new(role: Role) -> Self {
        PendingTx {
            role,
            state: TxState::Announced,
            provider_peers: HashSet::new(),
            sampler_peers: HashSet::new(),
            cells_received: CellMask::EMPTY,
            pending_request_id: None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingRequest {
    tx_hash: TxHash,
    target_peer: ActorId,
    request_type: RequestType,
}

/// Shared handles a node needs to act during one dispatched event; borrowed
/// for the duration of a single `on_event` call, never stored.
pub struct NodeContext<'a> {
    pub kernel: &'a mut Kernel,
    pub network: &'a mut Network,
    pub metrics: &'a mut MetricsCollector,
    pub config: &'a SimulationConfig,
}

/// One honest participant in the sparse-blobpool network.
pub struct Node {
    id: ActorId,
    pool: Blobpool,
    peers: HashSet<ActorId>,
    pending_txs: HashMap<TxHash, PendingTx>,
    pending_requests: HashMap<RequestId, PendingRequest>,
    next_request_id: u64,
    custody_mask: CellMask,
}

impl Node {
    pub fn new(id: ActorId, config: &SimulationConfig) -> Self {
        Node {
            id,
            pool: Blobpool::new(config.blobpool_max_bytes, config.max_txs_per_sender),
            peers: HashSet::new(),
            pending_txs: HashMap::new(),
            pending_requests: HashMap::new(),
            next_request_id: 0,
            custody_mask: compute_custody_mask(id, config.custody_columns),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn pool(&self) -> &Blobpool {
        &self.pool
    }

    pub fn custody_mask(&self) -> CellMask {
        self.custody_mask
    }

    pub fn add_peer(&mut self, peer: ActorId) {
        self.peers.insert(peer);
    }

    pub fn peers(&self) -> &HashSet<ActorId> {
        &self.peers
    }

    pub fn on_event(&mut self, payload: EventPayload, ctx: &mut NodeContext) {
        match payload {
            EventPayload::Message(msg) => self.handle_message(msg, ctx),
            EventPayload::Command(cmd) => self.handle_command(cmd, ctx),
        }
    }

    fn handle_message(&mut self, msg: Message, ctx: &mut NodeContext) {
        match msg {
            Message::Announce(m) => self.handle_announce(m, ctx),
            Message::GetTxBodies(m) => self.handle_get_tx_bodies(m, ctx),
            Message::TxBodies(m) => self.handle_tx_bodies(m, ctx),
            Message::GetCells(m) => self.handle_get_cells(m, ctx),
            Message::Cells(m) => self.handle_cells(m, ctx),
            Message::BlockAnnouncement(m) => self.handle_block_announcement(m, ctx),
        }
    }

    fn handle_command(&mut self, cmd: Command, ctx: &mut NodeContext) {
        match cmd {
            Command::BroadcastTransaction {
                tx_hash,
                tx_sender,
                nonce,
                gas_fee_cap,
                gas_tip_cap,
                blob_gas_price,
                tx_size,
                blob_count,
                cell_mask,
            } => self.handle_broadcast_transaction(
                tx_hash, tx_sender, nonce, gas_fee_cap, gas_tip_cap, blob_gas_price, tx_size, blob_count, cell_mask,
                ctx,
            ),
            Command::RequestTimeout { request_id } => self.handle_request_timeout(request_id, ctx),
            Command::ProviderObservationTimeout { tx_hash } => self.handle_provider_observation_timeout(tx_hash, ctx),
            Command::TxCleanup { tx_hash } => self.handle_tx_cleanup(tx_hash),
            Command::ProduceBlock { slot } => self.handle_produce_block(slot, ctx),
            Command::SlotTick => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_broadcast_transaction(
        &mut self,
        tx_hash: TxHash,
        tx_sender: Address,
        nonce: u64,
        gas_fee_cap: u64,
        gas_tip_cap: u64,
        blob_gas_price: u64,
        tx_size: u64,
        blob_count: u8,
        cell_mask: CellMask,
        ctx: &mut NodeContext,
    ) {
        let entry = BlobTxEntry {
            tx_hash,
            sender: tx_sender,
            nonce,
            gas_fee_cap,
            gas_tip_cap,
            blob_gas_price,
            tx_size,
            blob_count,
            cell_mask,
            received_at: ctx.kernel.current_time().as_secs_f64(),
            announced_to: BTreeSet::new(),
        };

        if self.pool.add(entry).is_ok() {
            ctx.metrics
                .record_tx_seen(self.id, tx_hash, ObservedRole::Provider, cell_mask, ctx.kernel.current_time().as_secs_f64());
            self.announce_tx(tx_hash, ctx);
        }
    }

    /// Selects blob transactions from the local pool and broadcasts a
    /// `BlockAnnouncement` to every peer (spec.md §4.5). The proposer applies
    /// the inclusion effects to itself directly rather than looping a
    /// message back through the network, since it already holds every
    /// included transaction by construction.
    fn handle_produce_block(&mut self, slot: u64, ctx: &mut NodeContext) {
        let blob_tx_hashes = self.select_for_inclusion(ctx.config);
        if blob_tx_hashes.is_empty() {
            return;
        }

        let block = Block {
            slot,
            proposer: self.id,
            blob_tx_hashes: blob_tx_hashes.clone(),
        };

        for &tx_hash in &blob_tx_hashes {
            self.pending_txs.remove(&tx_hash);
            ctx.metrics.record_inclusion(tx_hash, slot);
            self.schedule_tx_cleanup(tx_hash, ctx);
        }

        let peers: Vec<ActorId> = self.peers.iter().copied().collect();
        for peer in peers {
            let msg = Message::BlockAnnouncement(BlockAnnouncement {
                sender: self.id,
                block: block.clone(),
            });
            let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, msg, self.id, peer);
        }
    }

    /// Greedy pack by descending `effective_tip`, honoring `inclusion_policy`
    /// (spec.md §4.5): `Conservative`/`Proactive` require the full blob held
    /// locally, `Optimistic` accepts any non-empty `cell_mask`. Stops once
    /// `max_blobs_per_block` would be exceeded.
    fn select_for_inclusion(&self, config: &SimulationConfig) -> Vec<TxHash> {
        let mut selected = Vec::new();
        let mut blobs_used: u32 = 0;

        for entry in self.pool.iter_by_priority() {
            let eligible = match config.inclusion_policy {
                crate::config::InclusionPolicy::Optimistic => entry.cell_mask.popcount() > 0,
                crate::config::InclusionPolicy::Conservative | crate::config::InclusionPolicy::Proactive => {
                    entry.cell_mask.is_full()
                }
            };
            if !eligible {
                continue;
            }
            if blobs_used + entry.blob_count as u32 > config.max_blobs_per_block {
                continue;
            }
            blobs_used += entry.blob_count as u32;
            selected.push(entry.tx_hash);
        }

        selected
    }

    fn handle_announce(&mut self, msg: Announce, ctx: &mut NodeContext) {
        let sender = msg.sender;
        let is_full = msg.cell_mask.map_or(false, |m| m.is_full());

        for (i, &tx_hash) in msg.hashes.iter().enumerate() {
            let tx_type = msg.types.get(i).copied().unwrap_or(0);
            if tx_type != BLOB_TX_TYPE || self.pool.contains(&tx_hash) {
                continue;
            }

            if let Some(pending) = self.pending_txs.get_mut(&tx_hash) {
                if is_full {
                    pending.provider_peers.insert(sender);
                } else {
                    pending.sampler_peers.insert(sender);
                }
                let should_sample = pending.state == TxState::AwaitingProviders
                    && pending.provider_peers.len() >= ctx.config.min_providers_before_sample;
                if should_sample {
                    self.start_sampler_fetch(tx_hash, ctx);
                }
                continue;
            }

            let role = determine_role(self.id, tx_hash, ctx.config.provider_probability);
            let mut pending = PendingTx::new(role);
            if is_full {
                pending.provider_peers.insert(sender);
            } else {
                pending.sampler_peers.insert(sender);
            }
            let provider_count = pending.provider_peers.len();
            self.pending_txs.insert(tx_hash, pending);

            match role {
                Role::Provider if is_full => self.start_provider_fetch(tx_hash, sender, ctx),
                Role::Provider => {
                    self.set_state(tx_hash, TxState::AwaitingProviders);
                    self.schedule_provider_observation_timeout(tx_hash, ctx);
                }
                Role::Sampler if provider_count >= ctx.config.min_providers_before_sample => {
                    self.start_sampler_fetch(tx_hash, ctx)
                }
                Role::Sampler => {
                    self.set_state(tx_hash, TxState::AwaitingProviders);
                    self.schedule_provider_observation_timeout(tx_hash, ctx);
                }
            }
        }
    }

    fn set_state(&mut self, tx_hash: TxHash, state: TxState) {
        if let Some(pending) = self.pending_txs.get_mut(&tx_hash) {
            pending.state = state;
        }
    }

    fn start_provider_fetch(&mut self, tx_hash: TxHash, from_peer: ActorId, ctx: &mut NodeContext) {
        if self.pending_txs.get(&tx_hash).is_none() {
            return;
        }
        self.set_state(tx_hash, TxState::FetchingTx);
        let request_id = self.allocate_request_id();
        self.send_get_tx_bodies(tx_hash, from_peer, request_id, ctx);
    }

    fn start_sampler_fetch(&mut self, tx_hash: TxHash, ctx: &mut NodeContext) {
        let target = match self.pending_txs.get(&tx_hash) {
            Some(pending) => pending
                .provider_peers
                .iter()
                .next()
                .or_else(|| pending.sampler_peers.iter().next())
                .copied(),
            None => return,
        };
        let Some(target) = target else { return };

        self.set_state(tx_hash, TxState::FetchingTx);
        let request_id = self.allocate_request_id();
        self.send_get_tx_bodies(tx_hash, target, request_id, ctx);
    }

    fn send_get_tx_bodies(&mut self, tx_hash: TxHash, to_peer: ActorId, request_id: RequestId, ctx: &mut NodeContext) {
        if let Some(pending) = self.pending_txs.get_mut(&tx_hash) {
            pending.pending_request_id = Some(request_id);
        } else {
            return;
        }
        self.pending_requests.insert(
            request_id,
            PendingRequest {
                tx_hash,
                target_peer: to_peer,
                request_type: RequestType::TxBody,
            },
        );

        let msg = Message::GetTxBodies(GetTxBodies {
            sender: self.id,
            tx_hashes: vec![tx_hash],
        });
        let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, msg, self.id, to_peer);
        self.schedule_request_timeout(request_id, ctx);
    }

    fn handle_get_tx_bodies(&mut self, msg: GetTxBodies, ctx: &mut NodeContext) {
        let bodies: Vec<Option<TxBody>> = msg
            .tx_hashes
            .iter()
            .map(|h| self.pool.get(h).map(|e| TxBody { tx_hash: *h, tx_size: e.tx_size }))
            .collect();

        let response = Message::TxBodies(TxBodies { sender: self.id, bodies });
        let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, response, self.id, msg.sender);
    }

    fn handle_tx_bodies(&mut self, msg: TxBodies, ctx: &mut NodeContext) {
        for body in msg.bodies.into_iter().flatten() {
            let tx_hash = body.tx_hash;
            let role = match self.pending_txs.get_mut(&tx_hash) {
                Some(pending) => {
                    if let Some(rid) = pending.pending_request_id.take() {
                        self.pending_requests.remove(&rid);
                    }
                    pending.role
                }
                None => continue,
            };

            match role {
                Role::Provider => self.request_all_cells(tx_hash, msg.sender, ctx),
                Role::Sampler => self.request_custody_cells(tx_hash, msg.sender, ctx),
            }
        }
    }

    fn request_all_cells(&mut self, tx_hash: TxHash, from_peer: ActorId, ctx: &mut NodeContext) {
        self.set_state(tx_hash, TxState::FetchingCells);
        let request_id = self.allocate_request_id();
        if let Some(pending) = self.pending_txs.get_mut(&tx_hash) {
            pending.pending_request_id = Some(request_id);
        } else {
            return;
        }
        self.pending_requests.insert(
            request_id,
            PendingRequest {
                tx_hash,
                target_peer: from_peer,
                request_type: RequestType::Cells,
            },
        );

        let msg = Message::GetCells(GetCells {
            sender: self.id,
            tx_hashes: vec![tx_hash],
            cell_mask: CellMask::ALL_ONES,
        });
        let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, msg, self.id, from_peer);
        self.schedule_request_timeout(request_id, ctx);
    }

    fn request_custody_cells(&mut self, tx_hash: TxHash, from_peer: ActorId, ctx: &mut NodeContext) {
        self.set_state(tx_hash, TxState::FetchingCells);
        let request_id = self.allocate_request_id();
        let extra = self.select_extra_columns(ctx.kernel.rng(), ctx.config.extra_random_columns);
        let request_mask = self.custody_mask | extra;

        if let Some(pending) = self.pending_txs.get_mut(&tx_hash) {
            pending.pending_request_id = Some(request_id);
        } else {
            return;
        }
        self.pending_requests.insert(
            request_id,
            PendingRequest {
                tx_hash,
                target_peer: from_peer,
                request_type: RequestType::Cells,
            },
        );

        let msg = Message::GetCells(GetCells {
            sender: self.id,
            tx_hashes: vec![tx_hash],
            cell_mask: request_mask,
        });
        let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, msg, self.id, from_peer);
        self.schedule_request_timeout(request_id, ctx);
    }

    /// Picks `extra_random_columns` distinct columns outside the node's
    /// custody set using the kernel's PRNG (spec.md §4.4.2 "dynamic picks").
    fn select_extra_columns(&self, rng: &mut ChaCha8Rng, extra_random_columns: u32) -> CellMask {
        let mut available: Vec<u32> = (0..CELLS_PER_BLOB).filter(|&c| !self.custody_mask.contains(c)).collect();
        let count = (extra_random_columns as usize).min(available.len());
        let mut mask = CellMask::EMPTY;
        for _ in 0..count {
            let idx = rng.gen_range(0..available.len());
            mask.set(available.swap_remove(idx));
        }
        mask
    }

    fn handle_get_cells(&mut self, msg: GetCells, ctx: &mut NodeContext) {
        let mut cells_response: Vec<Vec<Option<Cell>>> = Vec::with_capacity(msg.tx_hashes.len());
        let mut provided_mask = CellMask::EMPTY;

        for tx_hash in &msg.tx_hashes {
            match self.pool.get(tx_hash) {
                None => cells_response.push(Vec::new()),
                Some(entry) => {
                    let available_mask = entry.cell_mask & msg.cell_mask;
                    let mut tx_cells = Vec::new();
                    for col in 0..CELLS_PER_BLOB {
                        if available_mask.contains(col) {
                            tx_cells.push(Some(Cell::placeholder()));
                        } else if msg.cell_mask.contains(col) {
                            tx_cells.push(None);
                        }
                    }
                    cells_response.push(tx_cells);
                    provided_mask |= available_mask;
                }
            }
        }

        let response = Message::Cells(Cells {
            sender: self.id,
            tx_hashes: msg.tx_hashes,
            cells: cells_response,
            cell_mask: provided_mask,
        });
        let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, response, self.id, msg.sender);
    }

    fn handle_cells(&mut self, msg: Cells, ctx: &mut NodeContext) {
        let custody_mask = self.custody_mask;
        for tx_hash in msg.tx_hashes.iter().copied() {
            let cleared_request = match self.pending_txs.get_mut(&tx_hash) {
                Some(pending) => pending.pending_request_id.take(),
                None => continue,
            };
            if let Some(rid) = cleared_request {
                self.pending_requests.remove(&rid);
            }

            let outcome = {
                let pending = self.pending_txs.get_mut(&tx_hash).expect("checked present above");
                pending.cells_received |= msg.cell_mask;
                match pending.role {
                    Role::Provider if msg.cell_mask.is_full() => Some(CellMask::ALL_ONES),
                    Role::Sampler if pending.cells_received.covers(custody_mask) => Some(pending.cells_received),
                    _ => None,
                }
            };
            if let Some(final_mask) = outcome {
                self.complete_tx(tx_hash, final_mask, ctx);
            }
        }
    }

    fn complete_tx(&mut self, tx_hash: TxHash, cell_mask: CellMask, ctx: &mut NodeContext) {
        let Some(pending) = self.pending_txs.remove(&tx_hash) else { return };

        let entry = BlobTxEntry {
            tx_hash,
            sender: Address::derive_from_tx_hash(&tx_hash),
            nonce: 0,
            gas_fee_cap: DEFAULT_GAS_FEE_CAP,
            gas_tip_cap: DEFAULT_GAS_TIP_CAP,
            blob_gas_price: DEFAULT_BLOB_GAS_PRICE,
            tx_size: DEFAULT_BLOB_TX_SIZE,
            blob_count: 1,
            cell_mask,
            received_at: ctx.kernel.current_time().as_secs_f64(),
            announced_to: BTreeSet::new(),
        };

        if self.pool.add(entry).is_ok() {
            let observed_role = match pending.role {
                Role::Provider => ObservedRole::Provider,
                Role::Sampler => ObservedRole::Sampler,
            };
            ctx.metrics
                .record_tx_seen(self.id, tx_hash, observed_role, cell_mask, ctx.kernel.current_time().as_secs_f64());
            self.announce_tx(tx_hash, ctx);
        }
    }

    fn handle_block_announcement(&mut self, msg: BlockAnnouncement, ctx: &mut NodeContext) {
        for tx_hash in msg.block.blob_tx_hashes {
            self.pending_txs.remove(&tx_hash);
            if self.pool.contains(&tx_hash) {
                ctx.metrics.record_inclusion(tx_hash, msg.block.slot);
                self.schedule_tx_cleanup(tx_hash, ctx);
            }
        }
    }

    fn handle_tx_cleanup(&mut self, tx_hash: TxHash) {
        self.pool.remove(&tx_hash);
    }

    /// Resolved on timeout (spec.md §9): TX_BODY requests retry once
    /// against another known peer; cell requests are dropped outright.
    fn handle_request_timeout(&mut self, request_id: RequestId, ctx: &mut NodeContext) {
        let Some(request) = self.pending_requests.remove(&request_id) else { return };
        let Some(pending) = self.pending_txs.get(&request.tx_hash) else { return };

        let is_tx_request = request.request_type == RequestType::TxBody;
        let other_peer = if is_tx_request {
            pending
                .provider_peers
                .iter()
                .chain(pending.sampler_peers.iter())
                .find(|&&p| p != request.target_peer)
                .copied()
        } else {
            None
        };

        if is_tx_request {
            match other_peer {
                Some(peer) => {
                    let new_id = self.allocate_request_id();
                    self.send_get_tx_bodies(request.tx_hash, peer, new_id, ctx);
                }
                None => {
                    self.pending_txs.remove(&request.tx_hash);
                }
            }
        } else {
            self.pending_txs.remove(&request.tx_hash);
        }
    }

    fn handle_provider_observation_timeout(&mut self, tx_hash: TxHash, ctx: &mut NodeContext) {
        let Some(pending) = self.pending_txs.get(&tx_hash) else { return };
        if pending.state != TxState::AwaitingProviders {
            return;
        }

        let role = pending.role;
        let target = pending
            .provider_peers
            .iter()
            .next()
            .or_else(|| pending.sampler_peers.iter().next())
            .copied();
        let has_any_peer = !pending.provider_peers.is_empty() || !pending.sampler_peers.is_empty();

        if !has_any_peer {
            self.pending_txs.remove(&tx_hash);
            return;
        }

        match role {
            Role::Provider => {
                if let Some(peer) = target {
                    self.start_provider_fetch(tx_hash, peer, ctx);
                }
            }
            Role::Sampler => self.start_sampler_fetch(tx_hash, ctx),
        }
    }

    /// Announces a completed/admitted transaction to every peer that has
    /// not already seen it (spec.md §4.4.4).
    fn announce_tx(&mut self, tx_hash: TxHash, ctx: &mut NodeContext) {
        let (tx_size, cell_mask, already_announced) = match self.pool.get(&tx_hash) {
            Some(entry) => (entry.tx_size, entry.cell_mask, entry.announced_to.clone()),
            None => return,
        };

        let targets: Vec<ActorId> = self.peers.iter().copied().filter(|p| !already_announced.contains(p)).collect();
        for peer in targets {
            let msg = Message::Announce(Announce {
                sender: self.id,
                types: vec![BLOB_TX_TYPE],
                sizes: vec![tx_size],
                hashes: vec![tx_hash],
                cell_mask: Some(cell_mask),
            });
            let _ = ctx.network.deliver(ctx.kernel, ctx.metrics, msg, self.id, peer);
            if let Some(entry) = self.pool.entry_mut(&tx_hash) {
                entry.announced_to.insert(peer);
            }
        }
    }

    fn schedule_request_timeout(&mut self, request_id: RequestId, ctx: &mut NodeContext) {
        let _ = ctx.kernel.schedule_after(
            ctx.config.request_timeout,
            self.id,
            EventPayload::Command(Command::RequestTimeout { request_id }),
        );
    }

    fn schedule_provider_observation_timeout(&mut self, tx_hash: TxHash, ctx: &mut NodeContext) {
        let _ = ctx.kernel.schedule_after(
            ctx.config.provider_observation_timeout,
            self.id,
            EventPayload::Command(Command::ProviderObservationTimeout { tx_hash }),
        );
    }

    fn schedule_tx_cleanup(&mut self, tx_hash: TxHash, ctx: &mut NodeContext) {
        trace!(?tx_hash, node = %self.id, "scheduling tx cleanup after block inclusion");
        let _ = ctx.kernel.schedule_after(
            TX_CLEANUP_DELAY,
            self.id,
            EventPayload::Command(Command::TxCleanup { tx_hash }),
        );
    }

    fn allocate_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

/// Deterministic custody column assignment from `node_id` (spec.md §4.4).
pub fn compute_custody_mask(node_id: ActorId, custody_columns: u32) -> CellMask {
    let mut hasher = Sha256::new();
    hasher.update(node_id.to_string().as_bytes());
    let digest = hasher.finalize();
    let seed = u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is 32 bytes"));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut mask = CellMask::EMPTY;
    let mut count = 0;
    while count < custody_columns {
        let col = rng.gen_range(0..CELLS_PER_BLOB);
        if !mask.contains(col) {
            mask.set(col);
            count += 1;
        }
    }
    mask
}

/// Deterministic provider/sampler role assignment from `(node_id, tx_hash)`
/// (spec.md §4.4).
pub fn determine_role(node_id: ActorId, tx_hash: TxHash, provider_probability: f64) -> Role {
    let mut hasher = Sha256::new();
    hasher.update(node_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(tx_hash.to_hex().as_bytes());
    let digest = hasher.finalize();
    let hash_int = u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is 32 bytes"));
    let probability = hash_int as f64 / (u64::MAX as f64 + 1.0);

    if probability < provider_probability {
        Role::Provider
    } else {
        Role::Sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custody_mask_is_deterministic_and_exact_count() {
        let a = compute_custody_mask(ActorId::node(5), 8);
        let b = compute_custody_mask(ActorId::node(5), 8);
        assert_eq!(a, b, "same node id must yield the same custody mask");
        assert_eq!(a.popcount(), 8);
    }

    #[test]
    fn different_nodes_get_different_masks_with_high_probability() {
        let a = compute_custody_mask(ActorId::node(1), 8);
        let b = compute_custody_mask(ActorId::node(2), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn role_assignment_is_pure_and_deterministic() {
        let hash = TxHash([42u8; 32]);
        let first = determine_role(ActorId::node(0), hash, 0.15);
        let second = determine_role(ActorId::node(0), hash, 0.15);
        assert_eq!(first, second);
    }

    #[test]
    fn new_node_has_empty_state() {
        let config = SimulationConfig::default();
        let node = Node::new(ActorId::node(0), &config);
        assert!(node.peers().is_empty());
        assert_eq!(node.pool().tx_count(), 0);
    }
}
