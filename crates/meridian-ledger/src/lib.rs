//! # Meridian Ledger - block ledger abstraction
//!
//! One ledger per channel. The registry layer depends only on the traits
//! here: a [`Factory`] hands out per-channel [`ReadWriter`] handles and lists
//! the channels already present in storage; appends are all-or-nothing per
//! block and must preserve the dense numbering and hash chain.
//!
//! [`ram::RamLedger`] is the in-memory implementation used by tests and
//! single-process deployments.

pub mod ram;

use meridian_core::{Block, Envelope};
use std::sync::Arc;
use thiserror::Error;

/// Ledger error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An appended block does not continue the chain
    #[error("Out of order append: expected block {expected}, got block {got}")]
    OutOfOrder {
        /// Height the ledger expected next
        expected: u64,
        /// Number the appended block carried
        got: u64,
    },

    /// An appended block's previous-hash does not match the chain tip
    #[error("Hash chain mismatch at block {number}")]
    HashMismatch {
        /// Number of the offending block
        number: u64,
    },

    /// A referenced block is not available
    #[error("Block {number} not found")]
    BlockNotFound {
        /// The missing block number
        number: u64,
    },

    /// Block construction failed
    #[error(transparent)]
    Core(#[from] meridian_core::Error),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where a block iterator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// The oldest block still available
    Oldest,
    /// The block that will be committed next (i.e. start at current height)
    Newest,
    /// A specific block number
    Specified(u64),
}

/// Read side of a channel's ledger.
pub trait Reader: Send + Sync {
    /// Number of blocks ever committed; the next block number.
    fn height(&self) -> u64;

    /// Fetch a block by number, if still retained.
    fn get_block(&self, number: u64) -> Option<Block>;

    /// Number of the oldest block still retained.
    fn oldest_retained(&self) -> u64;
}

/// Write side of a channel's ledger.
pub trait Writer: Send + Sync {
    /// Append one block. All-or-nothing; rejects out-of-order numbers and
    /// broken hash chains.
    fn append(&self, block: Block) -> Result<()>;
}

/// Combined read/write handle to one channel's ledger.
pub trait ReadWriter: Reader + Writer {}
impl<T: Reader + Writer> ReadWriter for T {}

/// Per-process ledger storage, one ledger per channel.
pub trait Factory: Send + Sync {
    /// Open the ledger for `channel_id`, creating an empty one if absent.
    fn get_or_create(&self, channel_id: &str) -> Result<Arc<dyn ReadWriter>>;

    /// Whether a ledger already exists for `channel_id`.
    fn exists(&self, channel_id: &str) -> bool;

    /// Channel identifiers present in storage.
    fn chain_ids(&self) -> Vec<String>;
}

/// Iterator over the retained blocks of a ledger, oldest first.
///
/// Non-blocking: iteration ends at the current height. Delivery handlers that
/// need to follow the chain re-seek from where they left off.
pub struct BlockIterator {
    reader: Arc<dyn ReadWriter>,
    next: u64,
}

impl BlockIterator {
    /// Position an iterator on `reader` at `start`.
    pub fn seek(reader: Arc<dyn ReadWriter>, start: SeekPosition) -> Self {
        let next = match start {
            SeekPosition::Oldest => reader.oldest_retained(),
            SeekPosition::Newest => reader.height(),
            SeekPosition::Specified(number) => number,
        };
        Self { reader, next }
    }

    /// Block number the iterator will yield next.
    pub fn next_block_number(&self) -> u64 {
        self.next
    }
}

impl Iterator for BlockIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.reader.get_block(self.next)?;
        self.next += 1;
        Some(block)
    }
}

/// Build the next block for a ledger from a batch of envelopes, chained to
/// the current tip.
pub fn create_next_block<R: Reader + ?Sized>(reader: &R, messages: &[Envelope]) -> Result<Block> {
    let number = reader.height();
    let previous_hash = if number == 0 {
        Vec::new()
    } else {
        reader
            .get_block(number - 1)
            .ok_or(Error::BlockNotFound { number: number - 1 })?
            .header
            .hash()
    };
    Ok(Block::new(number, previous_hash, messages)?)
}
