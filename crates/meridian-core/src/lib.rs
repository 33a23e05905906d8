//! # Meridian Core - wire-level data model
//!
//! Shared data model of the Meridian ordering service:
//!
//! - **envelope**: transaction envelopes and their nested payload encoding
//! - **block**: hash-chained blocks and the fixed-slot metadata contract,
//!   including the LAST_CONFIG pointer
//! - **config**: the channel configuration tree, capability checking, and the
//!   immutable [`config::Bundle`] snapshot
//! - **configtx**: construction of config transactions, genesis blocks, and
//!   channel-creation wrappers
//!
//! Byte encodings use bincode throughout; the slot positions and nesting
//! structure are the wire contract, the codec itself is not.

pub mod block;
pub mod config;
pub mod configtx;
pub mod envelope;
pub mod error;

pub use block::{Block, BlockHeader, BlockMetadata, BlockMetadataIndex, LastConfig, Metadata};
pub use config::{
    Bundle, ChannelConfig, Config, ConfigEnvelope, ConfigUpdate, OrdererConfig,
    SUPPORTED_CAPABILITIES,
};
pub use envelope::{ChannelHeader, Envelope, HeaderType, Payload};
pub use error::{Error, Result};
