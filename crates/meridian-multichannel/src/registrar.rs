//! Channel registrar
//!
//! The registrar owns the set of all running channels. It discovers existing
//! channels from ledger storage at startup, enforces the single-system-
//! channel invariant, routes submissions to the right channel, and executes
//! the channel-creation protocol when a creation transaction commits on the
//! system channel.
//!
//! ## Locking
//!
//! The channel map is the only cross-channel shared state. Its lock is held
//! for lookups and inserts only, never across a ledger append or a consensus
//! call. Channel-creation order is already total because creation
//! transactions are ordered on the system channel, so map updates never race
//! for the same identifier.

use crate::chain_support::{ChainSupport, LedgerResources};
use crate::error::{Error, IntegrityError, Result};
use crate::util::{check_resources, check_resources_or_panic, get_config_tx};
use meridian_consensus::cutter::Metrics;
use meridian_consensus::ConsenterRegistry;
use meridian_core::config::{ApplicationConfig, ConfigUpdate};
use meridian_core::envelope::unmarshal;
use meridian_core::{configtx, Bundle, ChannelConfig, Config, Envelope, HeaderType};
use meridian_ledger::Factory;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owner of all per-channel runtime state.
pub struct Registrar {
    ledger_factory: Arc<dyn Factory>,
    metrics: Arc<Metrics>,
    consenters: RwLock<ConsenterRegistry>,
    chains: RwLock<HashMap<String, Arc<ChainSupport>>>,
    system_channel_id: RwLock<Option<String>>,
}

impl Registrar {
    /// Create an uninitialized registrar over the given ledger storage.
    pub fn new(ledger_factory: Arc<dyn Factory>, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            ledger_factory,
            metrics,
            consenters: RwLock::new(ConsenterRegistry::new()),
            chains: RwLock::new(HashMap::new()),
            system_channel_id: RwLock::new(None),
        })
    }

    /// Discover and start every channel present in ledger storage.
    ///
    /// Classifies each discovered channel as system or application by its
    /// configuration; fails (fatally for the process) unless exactly one
    /// system channel is found. Single-threaded, one-time bootstrap: no
    /// request handling may begin before this returns `Ok`.
    pub fn initialize(self: &Arc<Self>, consenters: ConsenterRegistry) -> Result<()> {
        *self.consenters.write() = consenters;
        let consenters = self.consenters.read();

        let mut system_channels = Vec::new();
        let mut discovered = Vec::new();
        for channel_id in self.ledger_factory.chain_ids() {
            let ledger = self.ledger_factory.get_or_create(&channel_id)?;
            let config_tx = get_config_tx(ledger.as_ref())?;
            let bundle = Bundle::from_config_tx(&config_tx)?;
            if bundle.channel_id() != channel_id {
                return Err(IntegrityError::ChannelMismatch {
                    expected: channel_id,
                    found: bundle.channel_id().to_string(),
                }
                .into());
            }
            if bundle.is_system_channel() {
                system_channels.push(channel_id.clone());
            }
            debug!(
                channel_id = %channel_id,
                system = bundle.is_system_channel(),
                "discovered channel"
            );
            let support = ChainSupport::new(
                self,
                LedgerResources::new(ledger, bundle),
                &consenters,
                self.metrics.clone(),
            )?;
            discovered.push((channel_id, support));
        }

        match system_channels.len() {
            1 => {}
            0 => return Err(Error::NoSystemChannel(discovered.len())),
            _ => return Err(Error::MultipleSystemChannels(system_channels)),
        }
        let system_channel_id = system_channels.remove(0);
        *self.system_channel_id.write() = Some(system_channel_id.clone());

        {
            let mut chains = self.chains.write();
            for (channel_id, support) in &discovered {
                chains.insert(channel_id.clone(), support.clone());
            }
        }
        for (channel_id, support) in &discovered {
            support.start();
            debug!(channel_id = %channel_id, "started chain");
        }
        info!(
            system_channel = %system_channel_id,
            channels = discovered.len(),
            "registrar initialized"
        );
        Ok(())
    }

    /// Look up a channel's runtime state. Never blocks on long-running work.
    pub fn get_chain(&self, channel_id: &str) -> Option<Arc<ChainSupport>> {
        self.chains.read().get(channel_id).cloned()
    }

    /// Identifier of the system channel; `None` before initialization.
    pub fn system_channel_id(&self) -> Option<String> {
        self.system_channel_id.read().clone()
    }

    /// Validate a proposed channel-creation update against the system
    /// channel's current configuration and return the prospective
    /// configuration snapshot for the new channel. Nothing is committed.
    pub fn new_channel_config(&self, env_config_update: &Envelope) -> Result<Bundle> {
        let system_channel_id = self.system_channel_id().ok_or(Error::NotInitialized)?;
        let payload = env_config_update.unwrap_payload()?;
        let header = payload.header.channel_header;
        if header.header_type != HeaderType::ConfigUpdate {
            return Err(Error::InvalidCreation(format!(
                "expected a config update, got {:?}",
                header.header_type
            )));
        }
        let channel_id = header.channel_id;
        if channel_id == system_channel_id {
            return Err(Error::InvalidCreation(
                "cannot recreate the system channel".to_string(),
            ));
        }
        if self.get_chain(&channel_id).is_some() {
            return Err(Error::InvalidCreation(format!(
                "channel {channel_id} already exists"
            )));
        }
        let update: ConfigUpdate = unmarshal(&payload.data)?;
        if update.channel_id != channel_id {
            return Err(Error::InvalidCreation(format!(
                "update body targets channel {}, envelope targets channel {channel_id}",
                update.channel_id
            )));
        }

        let system_support = self
            .get_chain(&system_channel_id)
            .ok_or(Error::NotInitialized)?;
        let system_resources = system_support.ledger_resources();
        let system_bundle = system_resources.bundle();
        let consortiums = system_bundle.consortiums_config().ok_or_else(|| {
            Error::InvalidCreation("system channel carries no consortium definitions".to_string())
        })?;
        let consortium = consortiums.get(&update.consortium).ok_or_else(|| {
            Error::InvalidCreation(format!("unknown consortium {}", update.consortium))
        })?;
        // An empty organization list is a legal minimal channel; named
        // organizations must be consortium members.
        if update.organizations.is_empty() {
            debug!(channel_id = %channel_id, "validating organization-less channel creation");
        }
        for org in &update.organizations {
            if !consortium.members.contains(org) {
                return Err(Error::InvalidCreation(format!(
                    "organization {org} is not a member of consortium {}",
                    update.consortium
                )));
            }
        }

        let orderer = system_bundle
            .orderer_config()
            .ok_or(crate::error::ResourcesError::MissingOrdererConfig)?
            .clone();
        let bundle = Bundle::new(Config {
            sequence: 0,
            channel_group: ChannelConfig {
                channel_id,
                capabilities: update.capabilities.clone(),
                orderer: Some(orderer),
                application: Some(ApplicationConfig {
                    organizations: update.organizations.clone(),
                }),
                consortiums: None,
                consortium: Some(update.consortium.clone()),
            },
        });
        check_resources(&bundle)?;
        Ok(bundle)
    }

    /// Route a submitted envelope to its channel, classifying it for the
    /// caller.
    ///
    /// Returns the channel's support, whether the envelope is a
    /// configuration message, and the configuration sequence the caller
    /// should validate against. Envelopes typed as committed config or
    /// channel-creation wrappers are rejected outright; those commit through
    /// the configuration path, never through direct ordering.
    pub fn broadcast_channel_support(
        &self,
        env: &Envelope,
    ) -> Result<(Arc<ChainSupport>, bool, u64)> {
        let header = env.channel_header()?;
        let is_config = match header.header_type {
            HeaderType::Config | HeaderType::OrdererTransaction => {
                return Err(Error::NotSupportedDirectly(header.header_type))
            }
            HeaderType::ConfigUpdate => true,
            HeaderType::Message => false,
        };
        let support = self
            .get_chain(&header.channel_id)
            .ok_or_else(|| Error::ChannelNotFound(header.channel_id.clone()))?;
        let sequence = support.sequence();
        Ok((support, is_config, sequence))
    }

    /// Materialize a new channel from the config transaction a committed
    /// creation wrapper carried.
    ///
    /// Called by the system channel's commit path; creations arrive here in
    /// system-channel commit order, so a duplicate identifier means the
    /// serialization assumption is broken, not that a race was lost.
    pub(crate) fn create_new_chain(self: &Arc<Self>, ingress_tx: &Envelope) -> Result<()> {
        let header = ingress_tx.channel_header()?;
        let channel_id = header.channel_id.clone();
        let config_env = configtx::unwrap_config_tx(ingress_tx).map_err(|e| {
            IntegrityError::MalformedConfigTx {
                number: 0,
                reason: e.to_string(),
            }
        })?;
        if config_env.config.channel_group.channel_id != channel_id {
            return Err(IntegrityError::ChannelMismatch {
                expected: channel_id,
                found: config_env.config.channel_group.channel_id,
            }
            .into());
        }
        if self.get_chain(&channel_id).is_some() || self.ledger_factory.exists(&channel_id) {
            return Err(IntegrityError::ChannelAlreadyExists { channel_id }.into());
        }

        let bundle = Bundle::new(config_env.config);
        // Validated before ordering; failing here means unsound state.
        check_resources_or_panic(&bundle);

        let ledger = self.ledger_factory.get_or_create(&channel_id)?;
        let genesis = configtx::genesis_block_from_tx(ingress_tx)?;
        ledger.append(genesis)?;

        let consenters = self.consenters.read();
        let support = ChainSupport::new(
            self,
            LedgerResources::new(ledger, bundle),
            &consenters,
            self.metrics.clone(),
        )?;
        support.start();
        support.wait_ready()?;
        // Publish only a fully-constructed, runnable channel.
        self.chains.write().insert(channel_id.clone(), support);
        info!(channel_id = %channel_id, "created and started new channel");
        Ok(())
    }
}
