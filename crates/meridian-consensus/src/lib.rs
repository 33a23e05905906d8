//! # Meridian Consensus - pluggable per-channel ordering
//!
//! The registry layer runs one consensus [`Chain`] per channel, produced by a
//! [`Consenter`] selected by name from an explicit registry. A chain sees its
//! channel only through [`ConsenterSupport`]: the batching policy, the shared
//! orderer configuration, and the block construction/commit surface.
//!
//! - **cutter**: count-based batching policy ([`cutter::Receiver`])
//! - **solo**: single-node reference consenter with synchronous hand-off

pub mod cutter;
pub mod solo;

use meridian_core::{Block, Envelope, OrdererConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Consensus error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The chain has not been started (or has been halted)
    #[error("Chain for channel {channel_id} is not ready")]
    NotReady {
        /// Channel whose chain was addressed
        channel_id: String,
    },

    /// The channel's commit surface rejected a block
    #[error("Commit failed on channel {channel_id}: {message}")]
    CommitFailed {
        /// Channel whose commit failed
        channel_id: String,
        /// Description of the failure
        message: String,
    },
}

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, Error>;

/// What a running chain sees of its channel.
///
/// Implemented by the registry layer's per-channel support object. All
/// methods are bounded; none blocks on another channel.
pub trait ConsenterSupport: Send + Sync {
    /// Channel this support serves.
    fn channel_id(&self) -> String;

    /// Current orderer configuration snapshot.
    fn shared_config(&self) -> OrdererConfig;

    /// Current configuration sequence number.
    fn sequence(&self) -> u64;

    /// Batching policy for this channel.
    fn block_cutter(&self) -> Arc<dyn cutter::Receiver>;

    /// Build the next block from a batch, chained to the ledger tip.
    fn create_next_block(&self, batch: &[Envelope]) -> Result<Block>;

    /// Commit a block of normal transactions.
    fn write_block(&self, block: Block) -> Result<()>;

    /// Commit a block containing exactly one configuration transaction,
    /// applying its side effects (snapshot replacement or channel creation).
    fn write_config_block(&self, block: Block) -> Result<()>;
}

/// A running per-channel consensus instance.
pub trait Chain: Send + Sync {
    /// Hand off a normal transaction for ordering. `config_seq` is the
    /// configuration sequence the caller validated against; the chain
    /// re-validates when the current sequence has moved past it.
    fn order(&self, env: Envelope, config_seq: u64) -> Result<()>;

    /// Hand off a configuration transaction for ordering. Config
    /// transactions commit alone in their own block.
    fn configure(&self, env: Envelope, config_seq: u64) -> Result<()>;

    /// Start the chain's ordering pipeline.
    fn start(&self);

    /// Stop accepting transactions.
    fn halt(&self);

    /// Block until the chain can accept ordering requests.
    fn wait_ready(&self) -> Result<()>;
}

/// Factory for one consensus implementation.
pub trait Consenter: Send + Sync {
    /// Produce a chain bound to the given channel support.
    fn handle_chain(&self, support: Arc<dyn ConsenterSupport>) -> Result<Box<dyn Chain>>;
}

/// Explicit registry mapping an ordering-implementation name to its factory.
pub type ConsenterRegistry = BTreeMap<String, Arc<dyn Consenter>>;
