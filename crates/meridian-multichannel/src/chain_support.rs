//! Per-channel runtime unit
//!
//! A [`ChainSupport`] binds one channel's configuration snapshot, batching
//! policy and running consensus chain. It is also the channel's commit
//! surface: the chain writes blocks back through it, and committed
//! configuration transactions replace the snapshot or, on the system
//! channel, trigger channel creation in the registrar.
//!
//! Construction is a pure function of the ledger contents and the consenter
//! registry, so rebuilding after a restart reproduces exactly the state a
//! live process accumulated incrementally.

use crate::error::{Error, IntegrityError, Result};
use crate::registrar::Registrar;
use crate::util::{check_resources, check_resources_or_panic, get_config_tx, last_config_block_number};
use meridian_consensus::cutter::{BlockCutter, Metrics, Receiver};
use meridian_consensus::{Chain, ConsenterRegistry, ConsenterSupport};
use meridian_core::{configtx, Block, Bundle, Envelope, HeaderType, OrdererConfig};
use meridian_ledger::ReadWriter;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// One channel's ledger handle paired with its parsed configuration.
///
/// Replaced wholesale when a configuration block commits; never mutated in
/// place.
#[derive(Clone)]
pub struct LedgerResources {
    ledger: Arc<dyn ReadWriter>,
    bundle: Bundle,
}

impl LedgerResources {
    /// Pair a ledger handle with its current configuration snapshot.
    pub fn new(ledger: Arc<dyn ReadWriter>, bundle: Bundle) -> Self {
        Self { ledger, bundle }
    }

    /// The parsed configuration.
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// The ledger handle.
    pub fn ledger(&self) -> &Arc<dyn ReadWriter> {
        &self.ledger
    }
}

/// Per-channel runtime state: configuration, batching, consensus.
///
/// Created once per channel at initialization or channel creation and kept
/// for the process lifetime; channels are never deleted.
pub struct ChainSupport {
    channel_id: String,
    registrar: Weak<Registrar>,
    ledger: Arc<dyn ReadWriter>,
    resources: RwLock<Arc<LedgerResources>>,
    cutter: Arc<dyn Receiver>,
    chain: RwLock<Option<Box<dyn Chain>>>,
    last_config_seq: AtomicU64,
    last_config_block_number: AtomicU64,
}

impl ChainSupport {
    /// Build a chain support for one channel.
    ///
    /// Replays the most recent configuration transaction from the ledger to
    /// recover `last_config_seq`/`last_config_block_number`, validates the
    /// snapshot, and asks the consenter named by the channel's configuration
    /// to produce its chain. Fails if that consenter is not registered.
    pub fn new(
        registrar: &Arc<Registrar>,
        resources: LedgerResources,
        consenters: &ConsenterRegistry,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>> {
        let channel_id = resources.bundle().channel_id().to_string();
        check_resources(resources.bundle())?;

        let config_tx = get_config_tx(resources.ledger().as_ref())?;
        let config_env = configtx::unwrap_config_tx(&config_tx)?;
        let last_config_seq = config_env.config.sequence;
        let last_config_block = last_config_block_number(resources.ledger().as_ref())?;

        // Presence checked by check_resources above.
        let orderer = match resources.bundle().orderer_config() {
            Some(cfg) => cfg.clone(),
            None => unreachable!("orderer config validated above"),
        };
        let consenter = consenters
            .get(&orderer.consenter_type)
            .ok_or_else(|| Error::ConsenterNotFound(orderer.consenter_type.clone()))?
            .clone();

        let support = Arc::new(Self {
            channel_id: channel_id.clone(),
            registrar: Arc::downgrade(registrar),
            ledger: resources.ledger().clone(),
            resources: RwLock::new(Arc::new(resources)),
            cutter: Arc::new(BlockCutter::new(metrics)),
            chain: RwLock::new(None),
            last_config_seq: AtomicU64::new(last_config_seq),
            last_config_block_number: AtomicU64::new(last_config_block),
        });

        let chain = consenter.handle_chain(support.clone())?;
        *support.chain.write() = Some(chain);
        info!(
            channel_id = %channel_id,
            last_config_seq, last_config_block, "built chain support"
        );
        Ok(support)
    }

    /// Channel this support serves.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Current configuration snapshot.
    pub fn ledger_resources(&self) -> Arc<LedgerResources> {
        self.resources.read().clone()
    }

    /// Read handle for delivery/streaming callers.
    pub fn reader(&self) -> Arc<dyn ReadWriter> {
        self.ledger.clone()
    }

    /// Current configuration sequence number.
    pub fn sequence(&self) -> u64 {
        self.resources.read().bundle().sequence()
    }

    /// Configuration sequence recovered from the ledger at construction and
    /// advanced on every committed configuration block.
    pub fn last_config_seq(&self) -> u64 {
        self.last_config_seq.load(Ordering::Acquire)
    }

    /// Block number of the most recent committed configuration block.
    pub fn last_config_block_number(&self) -> u64 {
        self.last_config_block_number.load(Ordering::Acquire)
    }

    /// Forward a normal transaction to the consensus chain.
    pub fn order(&self, env: Envelope, config_seq: u64) -> Result<()> {
        self.with_chain(|chain| chain.order(env, config_seq))
    }

    /// Forward a configuration transaction to the consensus chain.
    pub fn configure(&self, env: Envelope, config_seq: u64) -> Result<()> {
        self.with_chain(|chain| chain.configure(env, config_seq))
    }

    /// Start the consensus chain.
    pub fn start(&self) {
        if let Some(chain) = self.chain.read().as_ref() {
            chain.start();
        }
    }

    /// Block until the consensus chain accepts requests.
    pub fn wait_ready(&self) -> Result<()> {
        self.with_chain(|chain| chain.wait_ready())
    }

    /// Stop the consensus chain.
    pub fn halt(&self) {
        if let Some(chain) = self.chain.read().as_ref() {
            chain.halt();
        }
    }

    fn with_chain<T>(
        &self,
        f: impl FnOnce(&dyn Chain) -> meridian_consensus::Result<T>,
    ) -> Result<T> {
        let guard = self.chain.read();
        let chain = guard
            .as_ref()
            .ok_or_else(|| meridian_consensus::Error::NotReady {
                channel_id: self.channel_id.clone(),
            })?;
        Ok(f(chain.as_ref())?)
    }

    fn commit_error(&self, message: impl std::fmt::Display) -> meridian_consensus::Error {
        meridian_consensus::Error::CommitFailed {
            channel_id: self.channel_id.clone(),
            message: message.to_string(),
        }
    }
}

impl fmt::Debug for ChainSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSupport")
            .field("channel_id", &self.channel_id)
            .field("last_config_seq", &self.last_config_seq())
            .field("last_config_block_number", &self.last_config_block_number())
            .finish_non_exhaustive()
    }
}

impl ConsenterSupport for ChainSupport {
    fn channel_id(&self) -> String {
        self.channel_id.clone()
    }

    fn shared_config(&self) -> OrdererConfig {
        let resources = self.resources.read();
        match resources.bundle().orderer_config() {
            Some(cfg) => cfg.clone(),
            None => panic!(
                "channel {}: configuration lost its orderer section",
                self.channel_id
            ),
        }
    }

    fn sequence(&self) -> u64 {
        ChainSupport::sequence(self)
    }

    fn block_cutter(&self) -> Arc<dyn Receiver> {
        self.cutter.clone()
    }

    fn create_next_block(&self, batch: &[Envelope]) -> meridian_consensus::Result<Block> {
        meridian_ledger::create_next_block(self.ledger.as_ref(), batch)
            .map_err(|e| self.commit_error(e))
    }

    fn write_block(&self, mut block: Block) -> meridian_consensus::Result<()> {
        block
            .set_last_config(self.last_config_block_number())
            .map_err(|e| self.commit_error(e))?;
        self.ledger.append(block).map_err(|e| self.commit_error(e))
    }

    fn write_config_block(&self, mut block: Block) -> meridian_consensus::Result<()> {
        if block.envelope_count() != 1 {
            return Err(self.commit_error(IntegrityError::NotExactlyOneTx {
                number: block.header.number,
                count: block.envelope_count(),
            }));
        }
        let env = block.envelope(0).map_err(|e| self.commit_error(e))?;
        let header = env.channel_header().map_err(|e| self.commit_error(e))?;

        match header.header_type {
            // A channel-creation wrapper on the system channel: materialize
            // the new channel, then commit the wrapper like a normal block.
            HeaderType::OrdererTransaction => {
                let inner =
                    configtx::unwrap_channel_creation(&env).map_err(|e| self.commit_error(e))?;
                let registrar = self
                    .registrar
                    .upgrade()
                    .ok_or_else(|| self.commit_error("registrar is gone"))?;
                registrar
                    .create_new_chain(&inner)
                    .map_err(|e| self.commit_error(e))?;
                self.write_block(block)
            }

            // A configuration change for this channel: commit it, then swap
            // in the new snapshot.
            HeaderType::Config => {
                let config_env =
                    configtx::unwrap_config_tx(&env).map_err(|e| self.commit_error(e))?;
                let bundle = Bundle::new(config_env.config);
                if bundle.channel_id() != self.channel_id {
                    return Err(self.commit_error(IntegrityError::ChannelMismatch {
                        expected: self.channel_id.clone(),
                        found: bundle.channel_id().to_string(),
                    }));
                }
                // The update was validated before ordering; a snapshot that
                // cannot run here means the process state is unsound.
                check_resources_or_panic(&bundle);

                let number = block.header.number;
                block.set_last_config(number).map_err(|e| self.commit_error(e))?;
                self.ledger.append(block).map_err(|e| self.commit_error(e))?;

                let sequence = bundle.sequence();
                let new_resources =
                    Arc::new(LedgerResources::new(self.ledger.clone(), bundle));
                *self.resources.write() = new_resources;
                self.last_config_seq.store(sequence, Ordering::Release);
                self.last_config_block_number
                    .store(number, Ordering::Release);
                debug!(
                    channel_id = %self.channel_id,
                    block = number,
                    sequence,
                    "committed configuration block"
                );
                Ok(())
            }

            other => Err(self.commit_error(format!(
                "transaction of type {other:?} cannot commit as a config block"
            ))),
        }
    }
}
