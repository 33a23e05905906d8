//! In-memory block ledger
//!
//! Bounded retention: each ledger keeps at most `max_blocks` recent blocks
//! and evicts oldest-first. Height counts every block ever appended, so a
//! reader can tell "evicted" apart from "not yet committed".

use crate::{Error, Factory, Reader, ReadWriter, Result, Writer};
use meridian_core::Block;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

struct RamLedgerState {
    blocks: VecDeque<Block>,
    /// Number of the oldest retained block
    base: u64,
    /// Total blocks ever appended
    height: u64,
}

/// A bounded in-memory ledger for one channel.
pub struct RamLedger {
    channel_id: String,
    max_blocks: usize,
    state: RwLock<RamLedgerState>,
}

impl RamLedger {
    /// Create an empty ledger retaining at most `max_blocks` blocks.
    pub fn new(channel_id: impl Into<String>, max_blocks: usize) -> Self {
        Self {
            channel_id: channel_id.into(),
            max_blocks: max_blocks.max(1),
            state: RwLock::new(RamLedgerState {
                blocks: VecDeque::new(),
                base: 0,
                height: 0,
            }),
        }
    }
}

impl Reader for RamLedger {
    fn height(&self) -> u64 {
        self.state.read().height
    }

    fn get_block(&self, number: u64) -> Option<Block> {
        let state = self.state.read();
        if number < state.base {
            return None;
        }
        state.blocks.get((number - state.base) as usize).cloned()
    }

    fn oldest_retained(&self) -> u64 {
        self.state.read().base
    }
}

impl Writer for RamLedger {
    fn append(&self, block: Block) -> Result<()> {
        let mut state = self.state.write();
        if block.header.number != state.height {
            return Err(Error::OutOfOrder {
                expected: state.height,
                got: block.header.number,
            });
        }
        if let Some(tip) = state.blocks.back() {
            if block.header.previous_hash != tip.header.hash() {
                return Err(Error::HashMismatch {
                    number: block.header.number,
                });
            }
        }
        debug!(
            channel_id = %self.channel_id,
            number = block.header.number,
            tx_count = block.envelope_count(),
            data_hash = %hex::encode(&block.header.data_hash),
            "appended block"
        );
        state.blocks.push_back(block);
        state.height += 1;
        while state.blocks.len() > self.max_blocks {
            state.blocks.pop_front();
            state.base += 1;
        }
        Ok(())
    }
}

/// In-memory ledger factory keyed by channel identifier.
pub struct RamLedgerFactory {
    max_blocks: usize,
    ledgers: RwLock<BTreeMap<String, Arc<RamLedger>>>,
}

impl RamLedgerFactory {
    /// Create a factory whose ledgers retain at most `max_blocks` blocks.
    pub fn new(max_blocks: usize) -> Self {
        Self {
            max_blocks,
            ledgers: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Factory for RamLedgerFactory {
    fn get_or_create(&self, channel_id: &str) -> Result<Arc<dyn ReadWriter>> {
        let mut ledgers = self.ledgers.write();
        let ledger = ledgers
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                debug!(channel_id, "created in-memory ledger");
                Arc::new(RamLedger::new(channel_id, self.max_blocks))
            })
            .clone();
        Ok(ledger)
    }

    fn exists(&self, channel_id: &str) -> bool {
        self.ledgers.read().contains_key(channel_id)
    }

    fn chain_ids(&self) -> Vec<String> {
        self.ledgers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_next_block, BlockIterator, SeekPosition};
    use assert_matches::assert_matches;
    use meridian_core::{Envelope, HeaderType};

    fn tx(n: usize) -> Envelope {
        Envelope::create(HeaderType::Message, "ch", format!("tx-{n}"), Vec::new())
            .expect("create envelope")
    }

    fn append_next(ledger: &RamLedger, n: usize) {
        let block = create_next_block(ledger, &[tx(n)]).expect("build block");
        ledger.append(block).expect("append block");
    }

    #[test]
    fn test_append_and_get() {
        let ledger = RamLedger::new("ch", 10);
        for i in 0..3 {
            append_next(&ledger, i);
        }
        assert_eq!(ledger.height(), 3);
        let block = ledger.get_block(1).expect("block 1 retained");
        assert_eq!(block.envelope(0).expect("envelope"), tx(1));
        assert!(ledger.get_block(3).is_none());
    }

    #[test]
    fn test_append_rejects_out_of_order_and_broken_chain() {
        let ledger = RamLedger::new("ch", 10);
        append_next(&ledger, 0);

        let skipped = Block::new(5, Vec::new(), &[tx(1)]).expect("build block");
        assert_matches!(
            ledger.append(skipped),
            Err(Error::OutOfOrder {
                expected: 1,
                got: 5
            })
        );

        let unchained = Block::new(1, vec![0xde, 0xad], &[tx(1)]).expect("build block");
        assert_matches!(ledger.append(unchained), Err(Error::HashMismatch { number: 1 }));
    }

    #[test]
    fn test_eviction_keeps_height_and_drops_oldest() {
        let ledger = RamLedger::new("ch", 2);
        for i in 0..5 {
            append_next(&ledger, i);
        }
        assert_eq!(ledger.height(), 5);
        assert_eq!(ledger.oldest_retained(), 3);
        assert!(ledger.get_block(2).is_none());
        assert!(ledger.get_block(3).is_some());
    }

    #[test]
    fn test_iterator_from_positions() {
        let factory = RamLedgerFactory::new(10);
        let ledger = factory.get_or_create("ch").expect("create ledger");
        for i in 0..4 {
            let block = create_next_block(ledger.as_ref(), &[tx(i)]).expect("build block");
            ledger.append(block).expect("append block");
        }

        let from_start: Vec<_> =
            BlockIterator::seek(ledger.clone(), SeekPosition::Oldest).collect();
        assert_eq!(from_start.len(), 4);

        let mut from_two = BlockIterator::seek(ledger.clone(), SeekPosition::Specified(2));
        assert_eq!(
            from_two.next().map(|b| b.header.number),
            Some(2)
        );

        let mut at_tip = BlockIterator::seek(ledger, SeekPosition::Newest);
        assert!(at_tip.next().is_none());
    }

    #[test]
    fn test_factory_tracks_channels() {
        let factory = RamLedgerFactory::new(10);
        assert!(!factory.exists("a"));
        factory.get_or_create("a").expect("create a");
        factory.get_or_create("b").expect("create b");
        factory.get_or_create("a").expect("reopen a");
        assert!(factory.exists("a"));
        assert_eq!(factory.chain_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
