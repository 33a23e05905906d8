//! Channel configuration model
//!
//! A channel's configuration is carried inside configuration transactions as
//! a [`ConfigEnvelope`]: a sequenced [`Config`] plus the update envelope that
//! produced it. The parsed, immutable view of a committed configuration is a
//! [`Bundle`]; bundles are built whole and replaced whole, never mutated in
//! place, so a reader always observes a fully-formed snapshot.
//!
//! Consortium definitions appear only in the system channel's configuration;
//! their presence is what classifies a channel as the system channel.

use crate::envelope::{marshal, unmarshal, Envelope, HeaderType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability names this binary knows how to honor.
///
/// A configuration declaring any capability outside this set cannot be run
/// (at startup) or must be rejected (at update time).
pub const SUPPORTED_CAPABILITIES: &[&str] = &["V1", "V1_1"];

/// Return the declared capabilities this binary does not support.
pub fn unsupported_capabilities(declared: &[String]) -> Vec<String> {
    declared
        .iter()
        .filter(|c| !SUPPORTED_CAPABILITIES.contains(&c.as_str()))
        .cloned()
        .collect()
}

/// Batching limits for one channel's block cutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSize {
    /// Maximum number of transactions per block
    pub max_message_count: u32,
}

impl Default for BatchSize {
    fn default() -> Self {
        Self {
            max_message_count: 10,
        }
    }
}

/// Orderer-level configuration of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdererConfig {
    /// Name of the consensus implementation that runs this channel
    pub consenter_type: String,
    /// Batching limits
    pub batch_size: BatchSize,
    /// Orderer capabilities the configuration requires
    pub capabilities: Vec<String>,
}

/// Application-level configuration of a channel.
///
/// An empty organization list is a legal minimal channel; membership checks
/// then simply have nothing to verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Member organizations of the channel
    pub organizations: Vec<String>,
}

/// A consortium definition, present only on the system channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consortium {
    /// Organizations allowed to participate in channels created under this
    /// consortium
    pub members: Vec<String>,
}

/// The full configuration tree of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel this configuration belongs to
    pub channel_id: String,
    /// Channel capabilities the configuration requires
    pub capabilities: Vec<String>,
    /// Orderer section; required for any channel this service runs
    pub orderer: Option<OrdererConfig>,
    /// Application section; present on application channels
    pub application: Option<ApplicationConfig>,
    /// Consortium definitions; present only on the system channel
    pub consortiums: Option<BTreeMap<String, Consortium>>,
    /// For application channels, the consortium they were created under
    pub consortium: Option<String>,
}

/// A sequenced configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Monotonically increasing count of committed configuration changes
    pub sequence: u64,
    /// The configuration tree effective at this sequence
    pub channel_group: ChannelConfig,
}

/// Body of a committed configuration transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    /// The committed configuration
    pub config: Config,
    /// The update envelope that produced it, if any
    pub last_update: Option<Envelope>,
}

/// Body of a proposed configuration update envelope.
///
/// Only the channel-creation shape is modeled here; general reconfiguration
/// updates are validated by the external configuration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Channel the update targets (for creation: the not-yet-existing one)
    pub channel_id: String,
    /// Consortium the new channel is created under
    pub consortium: String,
    /// Organizations of the new channel; may be empty
    pub organizations: Vec<String>,
    /// Channel capabilities requested for the new channel
    pub capabilities: Vec<String>,
}

impl ConfigUpdate {
    /// Wrap the update in a `ConfigUpdate`-typed envelope, the form clients
    /// submit channel-creation requests in.
    pub fn into_envelope(self) -> Result<Envelope> {
        let channel_id = self.channel_id.clone();
        Envelope::create(
            HeaderType::ConfigUpdate,
            channel_id,
            "config-update",
            marshal(&self)?,
        )
    }
}

/// Parsed, immutable snapshot of one channel's committed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    config: Config,
}

impl Bundle {
    /// Build a bundle directly from a sequenced configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Parse a bundle out of a committed configuration transaction: a
    /// `Config`-typed envelope whose body is a [`ConfigEnvelope`].
    pub fn from_config_tx(env: &Envelope) -> Result<Self> {
        let payload = env.unwrap_payload()?;
        if payload.header.channel_header.header_type != HeaderType::Config {
            return Err(Error::invalid(format!(
                "expected a config transaction, got {:?}",
                payload.header.channel_header.header_type
            )));
        }
        let config_env: ConfigEnvelope = unmarshal(&payload.data)?;
        if config_env.config.channel_group.channel_id != payload.header.channel_header.channel_id {
            return Err(Error::invalid(format!(
                "config transaction for channel {} carries configuration for channel {}",
                payload.header.channel_header.channel_id,
                config_env.config.channel_group.channel_id
            )));
        }
        Ok(Self::new(config_env.config))
    }

    /// Channel this bundle configures.
    pub fn channel_id(&self) -> &str {
        &self.config.channel_group.channel_id
    }

    /// Configuration sequence number of this snapshot.
    pub fn sequence(&self) -> u64 {
        self.config.sequence
    }

    /// The full configuration tree.
    pub fn channel_config(&self) -> &ChannelConfig {
        &self.config.channel_group
    }

    /// Orderer section, if present.
    pub fn orderer_config(&self) -> Option<&OrdererConfig> {
        self.config.channel_group.orderer.as_ref()
    }

    /// Application section, if present.
    pub fn application_config(&self) -> Option<&ApplicationConfig> {
        self.config.channel_group.application.as_ref()
    }

    /// Consortium definitions, if present.
    pub fn consortiums_config(&self) -> Option<&BTreeMap<String, Consortium>> {
        self.config.channel_group.consortiums.as_ref()
    }

    /// Whether this configuration marks the system channel.
    pub fn is_system_channel(&self) -> bool {
        self.config.channel_group.consortiums.is_some()
    }

    /// Validate a proposed update against this snapshot and produce the
    /// configuration envelope that would commit it, at sequence + 1.
    ///
    /// Nothing is committed here; the caller decides what to do with the
    /// resulting envelope.
    pub fn propose_config_update(&self, update_env: &Envelope) -> Result<ConfigEnvelope> {
        let payload = update_env.unwrap_payload()?;
        if payload.header.channel_header.header_type != HeaderType::ConfigUpdate {
            return Err(Error::invalid(format!(
                "expected a config update, got {:?}",
                payload.header.channel_header.header_type
            )));
        }
        let update: ConfigUpdate = unmarshal(&payload.data)?;
        if update.channel_id != self.channel_id() {
            return Err(Error::invalid(format!(
                "update targets channel {}, but this configuration is for channel {}",
                update.channel_id,
                self.channel_id()
            )));
        }
        Ok(ConfigEnvelope {
            config: Config {
                sequence: self.config.sequence + 1,
                channel_group: self.config.channel_group.clone(),
            },
            last_update: Some(update_env.clone()),
        })
    }
}
