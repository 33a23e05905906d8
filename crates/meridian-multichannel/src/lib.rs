//! # Meridian Multichannel - the channel registry
//!
//! Tracks every channel the ordering service participates in, binds each to
//! a ledger and a pluggable consensus chain, and governs how new channels
//! come into existence.
//!
//! - **registrar**: discovery, the single-system-channel invariant, routing,
//!   and the channel-creation protocol
//! - **chain_support**: the per-channel unit coupling configuration
//!   snapshot, block cutter and consensus chain, plus last-config tracking
//! - **util**: configuration replay ([`util::get_config_tx`]) and resource
//!   validation ([`util::check_resources`])
//! - **error**: the recoverable/integrity error taxonomy

pub mod chain_support;
pub mod error;
pub mod registrar;
pub mod util;

pub use chain_support::{ChainSupport, LedgerResources};
pub use error::{Error, IntegrityError, ResourcesError, Result};
pub use registrar::Registrar;
pub use util::{check_resources, check_resources_or_panic, get_config_tx};
