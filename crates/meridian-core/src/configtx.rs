//! Configuration transaction construction
//!
//! Helpers for the envelope shapes the configuration machinery exchanges:
//! committed config transactions, genesis blocks, and the system-channel
//! wrapper that carries a new channel's first config transaction.

use crate::block::Block;
use crate::config::{Config, ConfigEnvelope};
use crate::envelope::{marshal, unmarshal, Envelope, HeaderType};
use crate::error::{Error, Result};

/// Build a committed configuration transaction for a channel.
pub fn config_tx(channel_id: &str, config_env: &ConfigEnvelope) -> Result<Envelope> {
    Envelope::create(
        HeaderType::Config,
        channel_id,
        format!("config-seq-{}", config_env.config.sequence),
        marshal(config_env)?,
    )
}

/// Decode the [`ConfigEnvelope`] carried by a config transaction.
pub fn unwrap_config_tx(env: &Envelope) -> Result<ConfigEnvelope> {
    let payload = env.unwrap_payload()?;
    if payload.header.channel_header.header_type != HeaderType::Config {
        return Err(Error::invalid(format!(
            "expected a config transaction, got {:?}",
            payload.header.channel_header.header_type
        )));
    }
    unmarshal(&payload.data)
}

/// Wrap a new channel's config transaction in the system-channel envelope
/// that orders channel creation.
pub fn wrap_channel_creation(system_channel_id: &str, inner: &Envelope) -> Result<Envelope> {
    let inner_header = inner.channel_header()?;
    Envelope::create(
        HeaderType::OrdererTransaction,
        system_channel_id,
        format!("create-{}", inner_header.channel_id),
        marshal(inner)?,
    )
}

/// Extract the inner config transaction from a channel-creation wrapper.
pub fn unwrap_channel_creation(env: &Envelope) -> Result<Envelope> {
    let payload = env.unwrap_payload()?;
    if payload.header.channel_header.header_type != HeaderType::OrdererTransaction {
        return Err(Error::invalid(format!(
            "expected an orderer transaction, got {:?}",
            payload.header.channel_header.header_type
        )));
    }
    unmarshal(&payload.data)
}

/// Build a genesis block (block 0) committing the given configuration.
///
/// The block contains exactly the channel's first config transaction and its
/// LAST_CONFIG metadata points at block 0.
pub fn genesis_block(config: Config) -> Result<Block> {
    let channel_id = config.channel_group.channel_id.clone();
    let tx = config_tx(
        &channel_id,
        &ConfigEnvelope {
            config,
            last_update: None,
        },
    )?;
    genesis_block_from_tx(&tx)
}

/// Build a genesis block around an already-constructed config transaction,
/// as channel creation does with the transaction it unwrapped.
pub fn genesis_block_from_tx(tx: &Envelope) -> Result<Block> {
    let mut block = Block::new(0, Vec::new(), std::slice::from_ref(tx))?;
    block.set_last_config(0)?;
    Ok(block)
}
