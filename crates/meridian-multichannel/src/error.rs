//! Error taxonomy of the channel registry
//!
//! Three categories, distinguishable at the type level:
//!
//! - [`IntegrityError`]: the ledger or the creation protocol is in a state
//!   that must never occur. Never downgraded to "not found"; during startup
//!   these are fatal.
//! - [`ResourcesError`]: a configuration snapshot cannot be run or accepted,
//!   with the failing condition identified.
//! - [`Error`]: everything the registry reports to callers, wrapping the
//!   above plus routing and validation failures.

use meridian_core::HeaderType;
use thiserror::Error;

/// Unrecoverable ledger or protocol inconsistency.
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    /// The ledger holds no blocks where at least a genesis block is required
    #[error("ledger is empty")]
    EmptyLedger,

    /// A block the replay needs is not available
    #[error("block {number} is not available in the ledger")]
    MissingBlock {
        /// The unavailable block number
        number: u64,
    },

    /// A visited block carries absent or undecodable LAST_CONFIG metadata
    #[error("block {number} carries unusable LAST_CONFIG metadata: {reason}")]
    BadLastConfigMetadata {
        /// The offending block number
        number: u64,
        /// Why the metadata could not be used
        reason: String,
    },

    /// The block named by a LAST_CONFIG pointer does not hold exactly one
    /// transaction
    #[error("config block {number} contains {count} transactions, expected exactly one")]
    NotExactlyOneTx {
        /// The targeted block number
        number: u64,
        /// Transactions actually present
        count: usize,
    },

    /// The targeted transaction is not a decodable configuration transaction
    #[error("transaction in config block {number} is not a valid config transaction: {reason}")]
    MalformedConfigTx {
        /// The targeted block number
        number: u64,
        /// Why the transaction was rejected
        reason: String,
    },

    /// A ledger's contents configure a different channel than the one it is
    /// stored under
    #[error("ledger for channel {expected} holds configuration for channel {found}")]
    ChannelMismatch {
        /// Channel the ledger is stored under
        expected: String,
        /// Channel named by the configuration
        found: String,
    },

    /// A channel-creation transaction committed for a channel that already
    /// exists; the system channel's total order should have made this
    /// impossible
    #[error("channel {channel_id} already exists; creation ordering invariant is broken")]
    ChannelAlreadyExists {
        /// The duplicated channel identifier
        channel_id: String,
    },
}

/// A configuration snapshot that cannot be run or accepted.
///
/// The three conditions are distinct so callers can tell "this channel
/// cannot run" from "this update must be rejected".
#[derive(Debug, Clone, Error)]
pub enum ResourcesError {
    /// The configuration has no orderer section
    #[error("config does not contain orderer config")]
    MissingOrdererConfig,

    /// The orderer section declares capabilities this binary lacks
    #[error("config requires unsupported orderer capabilities: {}", .0.join(", "))]
    UnsupportedOrdererCapabilities(Vec<String>),

    /// The channel section declares capabilities this binary lacks
    #[error("config requires unsupported channel capabilities: {}", .0.join(", "))]
    UnsupportedChannelCapabilities(Vec<String>),
}

/// Registry error type.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The addressed channel is not registered
    #[error("channel {0} does not exist")]
    ChannelNotFound(String),

    /// The envelope type must go through the configuration path and cannot
    /// be ordered as a normal transaction
    #[error("transactions of type {0:?} cannot be ordered directly")]
    NotSupportedDirectly(HeaderType),

    /// A channel's configured ordering implementation has no registered
    /// factory; the channel cannot run
    #[error("no consenter registered for ordering type {0}")]
    ConsenterNotFound(String),

    /// Startup found no system channel among the discovered channels
    #[error("no system channel found among {0} discovered channel(s)")]
    NoSystemChannel(usize),

    /// Startup found more than one system channel
    #[error("multiple system channels found: {}", .0.join(", "))]
    MultipleSystemChannels(Vec<String>),

    /// The registrar has not completed initialization
    #[error("registrar is not initialized")]
    NotInitialized,

    /// A channel-creation request failed validation
    #[error("invalid channel creation request: {0}")]
    InvalidCreation(String),

    /// A snapshot failed resource validation
    #[error(transparent)]
    Resources(#[from] ResourcesError),

    /// Unrecoverable inconsistency
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Data-model failure
    #[error(transparent)]
    Core(#[from] meridian_core::Error),

    /// Ledger failure
    #[error(transparent)]
    Ledger(#[from] meridian_ledger::Error),

    /// Consensus hand-off failure
    #[error(transparent)]
    Consensus(#[from] meridian_consensus::Error),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means the process must not continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Integrity(_)
                | Error::NoSystemChannel(_)
                | Error::MultipleSystemChannels(_)
                | Error::ConsenterNotFound(_)
        )
    }
}
