//! Wire messages and local commands — the two `EventPayload` families.
//!
//! Grounded on the teacher's `ProtocolMessage` (a single tagged enum of
//! wire payloads) and on `original_source/sparse_blobpool/protocol/{messages,commands}.py`.
//! Per spec.md §3, `Message`s carry a `sender` and a `size_bytes` accounting
//! field and traverse the network; `Command`s are local, always
//! zero-sized, and never traverse the network.

use serde::{Deserialize, Serialize};

use crate::types::{ActorId, Address, CellMask, RequestId, TxHash, CELL_SIZE, MESSAGE_OVERHEAD};

/// A single erasure-coded column of a blob. Opaque and fixed-size: no real
/// KZG proof is modeled (spec.md Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub data: [u8; CELL_SIZE as usize],
    pub proof: [u8; 48],
}

impl Cell {
    pub const SIZE_BYTES: u64 = CELL_SIZE + 48;

    pub fn placeholder() -> Self {
        Cell {
            data: [0u8; CELL_SIZE as usize],
            proof: [0u8; 48],
        }
    }
}

/// Placeholder transaction body returned by `GetTxBodies` (§4.4.3): just
/// enough to account bandwidth, since no real transaction payload is
/// modeled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TxBody {
    pub tx_hash: TxHash,
    pub tx_size: u64,
}

/// A produced block: a proposer identity, slot, and the blob tx hashes it
/// includes (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub slot: u64,
    pub proposer: ActorId,
    pub blob_tx_hashes: Vec<TxHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announce {
    pub sender: ActorId,
    pub types: Vec<u8>,
    pub sizes: Vec<u64>,
    pub hashes: Vec<TxHash>,
    pub cell_mask: Option<CellMask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTxBodies {
    pub sender: ActorId,
    pub tx_hashes: Vec<TxHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBodies {
    pub sender: ActorId,
    pub bodies: Vec<Option<TxBody>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCells {
    pub sender: ActorId,
    pub tx_hashes: Vec<TxHash>,
    pub cell_mask: CellMask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cells {
    pub sender: ActorId,
    pub tx_hashes: Vec<TxHash>,
    /// Per-tx, per-requested-column cells; `None` where the column was
    /// requested but unavailable.
    pub cells: Vec<Vec<Option<Cell>>>,
    pub cell_mask: CellMask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    pub sender: ActorId,
    pub block: Block,
}

/// Network-transmitted protocol payloads (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Announce(Announce),
    GetTxBodies(GetTxBodies),
    TxBodies(TxBodies),
    GetCells(GetCells),
    Cells(Cells),
    BlockAnnouncement(BlockAnnouncement),
}

impl Message {
    pub fn sender(&self) -> ActorId {
        match self {
            Message::Announce(m) => m.sender,
            Message::GetTxBodies(m) => m.sender,
            Message::TxBodies(m) => m.sender,
            Message::GetCells(m) => m.sender,
            Message::Cells(m) => m.sender,
            Message::BlockAnnouncement(m) => m.sender,
        }
    }

    /// Size in bytes for bandwidth accounting (spec.md §3/§4.2).
    pub fn size_bytes(&self) -> u64 {
        match self {
            Message::Announce(m) => {
                MESSAGE_OVERHEAD
                    + m.types.len() as u64
                    + m.sizes.len() as u64 * 4
                    + m.hashes.len() as u64 * 32
                    + if m.cell_mask.is_some() { 16 } else { 0 }
            }
            Message::GetTxBodies(m) => MESSAGE_OVERHEAD + m.tx_hashes.len() as u64 * 32,
            Message::TxBodies(m) => {
                MESSAGE_OVERHEAD
                    + m.bodies
                        .iter()
                        .map(|b| b.as_ref().map_or(0, |b| b.tx_size))
                        .sum::<u64>()
            }
            Message::GetCells(m) => MESSAGE_OVERHEAD + m.tx_hashes.len() as u64 * 32 + 16,
            Message::Cells(m) => {
                let cell_count: u64 = m
                    .cells
                    .iter()
                    .map(|per_tx| per_tx.iter().filter(|c| c.is_some()).count() as u64)
                    .sum();
                MESSAGE_OVERHEAD + m.tx_hashes.len() as u64 * 32 + 16 + cell_count * Cell::SIZE_BYTES
            }
            Message::BlockAnnouncement(m) => 64 + m.block.blob_tx_hashes.len() as u64 * 32,
        }
    }

    /// True for request/response *cells* or tx bodies; false (control) for
    /// announcements and their requests (spec.md §4.2).
    pub fn is_control(&self) -> bool {
        !matches!(
            self,
            Message::Cells(_) | Message::TxBodies(_) | Message::GetCells(_)
        )
    }
}

/// Local, self-addressed commands: never network-transmitted, always
/// `size_bytes == 0` (spec.md §3/§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    BroadcastTransaction {
        tx_hash: TxHash,
        tx_sender: Address,
        nonce: u64,
        gas_fee_cap: u64,
        gas_tip_cap: u64,
        blob_gas_price: u64,
        tx_size: u64,
        blob_count: u8,
        cell_mask: CellMask,
    },
    ProduceBlock {
        slot: u64,
    },
    /// Self-addressed to `BLOCK_PRODUCER_ID`; advances the slot clock
    /// (spec.md §4.5).
    SlotTick,
    RequestTimeout {
        request_id: RequestId,
    },
    ProviderObservationTimeout {
        tx_hash: TxHash,
    },
    TxCleanup {
        tx_hash: TxHash,
    },
}
