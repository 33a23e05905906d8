//! Configuration extraction and resource checking
//!
//! [`get_config_tx`] reconstructs a channel's authoritative configuration
//! transaction by following the LAST_CONFIG pointer from the chain tip,
//! without scanning the whole chain. Any ambiguity is an [`IntegrityError`];
//! this function never guesses.

use crate::error::{IntegrityError, ResourcesError};
use meridian_core::config::unsupported_capabilities;
use meridian_core::{configtx, Bundle, Envelope};
use meridian_ledger::Reader;

/// Block number of the most recent configuration block, as recorded in the
/// chain tip's LAST_CONFIG metadata.
pub fn last_config_block_number<R: Reader + ?Sized>(
    reader: &R,
) -> Result<u64, IntegrityError> {
    let height = reader.height();
    if height == 0 {
        return Err(IntegrityError::EmptyLedger);
    }
    let tip_number = height - 1;
    let tip = reader
        .get_block(tip_number)
        .ok_or(IntegrityError::MissingBlock { number: tip_number })?;
    tip.last_config_index()
        .map_err(|e| IntegrityError::BadLastConfigMetadata {
            number: tip_number,
            reason: e.to_string(),
        })
}

/// Fetch the channel's most recent configuration transaction by following
/// the chain tip's LAST_CONFIG pointer.
///
/// Fails with an [`IntegrityError`] if the pointer is absent or malformed,
/// if the targeted block does not hold exactly one transaction, or if that
/// transaction does not decode as a configuration transaction.
pub fn get_config_tx<R: Reader + ?Sized>(reader: &R) -> Result<Envelope, IntegrityError> {
    let number = last_config_block_number(reader)?;
    let config_block = reader
        .get_block(number)
        .ok_or(IntegrityError::MissingBlock { number })?;

    let count = config_block.envelope_count();
    if count != 1 {
        return Err(IntegrityError::NotExactlyOneTx { number, count });
    }
    let env = config_block
        .envelope(0)
        .map_err(|e| IntegrityError::MalformedConfigTx {
            number,
            reason: e.to_string(),
        })?;
    // The transaction itself must be a well-formed config envelope.
    configtx::unwrap_config_tx(&env).map_err(|e| IntegrityError::MalformedConfigTx {
        number,
        reason: e.to_string(),
    })?;
    Ok(env)
}

/// Validate that a configuration snapshot can be run by this binary.
///
/// The three failure modes are reported distinctly; see [`ResourcesError`].
pub fn check_resources(bundle: &Bundle) -> Result<(), ResourcesError> {
    let orderer = bundle
        .orderer_config()
        .ok_or(ResourcesError::MissingOrdererConfig)?;

    let unsupported = unsupported_capabilities(&orderer.capabilities);
    if !unsupported.is_empty() {
        return Err(ResourcesError::UnsupportedOrdererCapabilities(unsupported));
    }

    let unsupported = unsupported_capabilities(&bundle.channel_config().capabilities);
    if !unsupported.is_empty() {
        return Err(ResourcesError::UnsupportedChannelCapabilities(unsupported));
    }
    Ok(())
}

/// Panicking variant of [`check_resources`] for call sites where a failing
/// snapshot means the process state is already unsound, not that an input
/// should be rejected.
pub fn check_resources_or_panic(bundle: &Bundle) {
    if let Err(e) = check_resources(bundle) {
        panic!("channel {}: {e}", bundle.channel_id());
    }
}
