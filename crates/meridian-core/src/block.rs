//! Blocks and block metadata
//!
//! A block carries a hash-chained header, a list of marshaled envelopes, and
//! a fixed-width metadata array. Metadata slot positions are a wire contract:
//! slot [`BlockMetadataIndex::LastConfig`] holds a marshaled [`Metadata`]
//! whose value is a marshaled [`LastConfig`] naming the block number of the
//! most recent configuration transaction as of that block. Genesis blocks
//! point at block 0.

use crate::envelope::{marshal, unmarshal, Envelope};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known block metadata slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMetadataIndex {
    /// Consenter signatures over the block (out of scope for this core)
    Signatures = 0,
    /// Pointer to the most recent configuration block
    LastConfig = 1,
}

/// Number of metadata slots every block carries.
pub const BLOCK_METADATA_SLOTS: usize = 2;

/// Generic metadata item stored in a block metadata slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Slot-dependent marshaled value
    pub value: Vec<u8>,
}

/// Value stored in the LAST_CONFIG metadata slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastConfig {
    /// Block number of the most recent configuration transaction
    pub index: u64,
}

/// Hash-chained block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number, dense from 0
    pub number: u64,
    /// Hash of the previous block's header; empty for genesis
    pub previous_hash: Vec<u8>,
    /// Hash of the block data
    pub data_hash: Vec<u8>,
}

impl BlockHeader {
    /// SHA-256 hash over the header fields, used to chain the next block.
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_le_bytes());
        hasher.update(&self.previous_hash);
        hasher.update(&self.data_hash);
        hasher.finalize().to_vec()
    }
}

/// Ordered transaction payloads of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    /// Marshaled envelopes, in commit order
    pub data: Vec<Vec<u8>>,
}

impl BlockData {
    /// SHA-256 hash over the concatenated entries.
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for entry in &self.data {
            hasher.update(entry);
        }
        hasher.finalize().to_vec()
    }
}

/// Per-block metadata array, indexed by [`BlockMetadataIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Slot values; an empty slot is an empty byte string
    pub metadata: Vec<Vec<u8>>,
}

impl Default for BlockMetadata {
    fn default() -> Self {
        Self {
            metadata: vec![Vec::new(); BLOCK_METADATA_SLOTS],
        }
    }
}

/// A committed (or candidate) block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash-chained header
    pub header: BlockHeader,
    /// Transaction payloads
    pub data: BlockData,
    /// Fixed-slot metadata
    pub metadata: BlockMetadata,
}

impl Block {
    /// Build a block at `number` containing the given envelopes, chained to
    /// `previous_hash` (empty for genesis).
    pub fn new(number: u64, previous_hash: Vec<u8>, envelopes: &[Envelope]) -> Result<Self> {
        let mut data = Vec::with_capacity(envelopes.len());
        for env in envelopes {
            data.push(marshal(env)?);
        }
        let data = BlockData { data };
        Ok(Self {
            header: BlockHeader {
                number,
                previous_hash,
                data_hash: data.hash(),
            },
            data,
            metadata: BlockMetadata::default(),
        })
    }

    /// Number of transactions in the block.
    pub fn envelope_count(&self) -> usize {
        self.data.data.len()
    }

    /// Decode the envelope at `index`.
    pub fn envelope(&self, index: usize) -> Result<Envelope> {
        let bytes = self.data.data.get(index).ok_or_else(|| {
            Error::not_found(format!(
                "no envelope at index {index} in block {}",
                self.header.number
            ))
        })?;
        unmarshal(bytes)
    }

    /// Stamp the LAST_CONFIG metadata slot with a pointer to `index`.
    pub fn set_last_config(&mut self, index: u64) -> Result<()> {
        let value = marshal(&LastConfig { index })?;
        let slots = &mut self.metadata.metadata;
        // A block decoded from elsewhere may carry fewer slots.
        if slots.len() < BLOCK_METADATA_SLOTS {
            slots.resize(BLOCK_METADATA_SLOTS, Vec::new());
        }
        slots[BlockMetadataIndex::LastConfig as usize] = marshal(&Metadata { value })?;
        Ok(())
    }

    /// Read the LAST_CONFIG pointer from the block metadata.
    ///
    /// Fails if the slot is empty or does not decode; callers treat that as
    /// an integrity fault, never as "no configuration".
    pub fn last_config_index(&self) -> Result<u64> {
        let slot = self
            .metadata
            .metadata
            .get(BlockMetadataIndex::LastConfig as usize)
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "block {} carries no LAST_CONFIG metadata",
                    self.header.number
                ))
            })?;
        let item: Metadata = unmarshal(slot)?;
        let last_config: LastConfig = unmarshal(&item.value)?;
        Ok(last_config.index)
    }
}
