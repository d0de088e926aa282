//! Error kinds surfaced by the core (spec.md §7).
//!
//! Pool admission errors are ordinary control flow for protocol handlers —
//! they are always swallowed at the call site, never propagated with `?`.
//! Kernel/driver errors are programmer errors: they indicate a
//! misconfigured simulation and are fatal.

use thiserror::Error;

use crate::types::TxHash;

/// Errors from [`crate::blobpool::Blobpool::add`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("RBF rejected: fee bump insufficient to replace {0}")]
    RbfRejected(TxHash),

    #[error("sender limit exceeded")]
    SenderLimitExceeded,

    #[error("pool full")]
    PoolFull,
}

/// Errors from [`crate::kernel::Kernel`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KernelError {
    #[error("cannot schedule event at {requested} before current time {current}")]
    ScheduleInPast { current: u64, requested: u64 },

    #[error("actor already registered")]
    DuplicateActor,

    #[error("event targeted unknown actor")]
    UnknownActor,
}

/// Raised when a driver-owned component is accessed before [`crate::driver::Driver::build`]
/// has wired it in (spec.md §7 `SimulatorNotConfigured`).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("simulator not configured with {0}")]
pub struct NotConfigured(pub &'static str);
