//! Merge builder: combine existing blocks against an authoritative series
//! list into one deduplicated block
//!
//! The k block queriers are heap-merged into a single fingerprint-ordered
//! stream that is walked in lockstep with the store truth. Series present
//! only in blocks are dropped; series present only in the truth get a fresh
//! bloom filled by the populate callback; series present in both are folded
//! into one row, truth chunks first, bloom from the first block at that
//! fingerprint.

use tracing::info;

use crate::backend::BlockWriter;
use crate::bloom::Bloom;
use crate::builder::{BlockBuilder, BuildStats};
use crate::iter::{Cursor, HeapCursor, PeekCursor};
use crate::{MistError, Result, Series, SeriesWithBloom};

/// Merges block queriers with an external series truth into a fresh block
pub struct MergeBuilder<B, T, P>
where
    B: Cursor<Item = SeriesWithBloom>,
    T: Cursor<Item = Series>,
    P: FnMut(&Series, &mut Bloom) -> Result<()>,
{
    blocks: Vec<B>,
    store: T,
    populate: P,
}

impl<B, T, P> MergeBuilder<B, T, P>
where
    B: Cursor<Item = SeriesWithBloom>,
    T: Cursor<Item = Series>,
    P: FnMut(&Series, &mut Bloom) -> Result<()>,
{
    /// `blocks` are queriers ordered by fingerprint; `store` is the
    /// authoritative series list, ordered and deduplicated by fingerprint;
    /// `populate` fills blooms for series no block covers.
    pub fn new(blocks: Vec<B>, store: T, populate: P) -> Self {
        Self {
            blocks,
            store,
            populate,
        }
    }

    /// Run the merge into `builder`, returning its digest and stats
    pub fn build<W: BlockWriter>(
        mut self,
        mut builder: BlockBuilder<W>,
    ) -> Result<(u32, BuildStats)> {
        let params = builder.options().schema.bloom_params();
        let mut heap = PeekCursor::new(HeapCursor::new(self.blocks, |swb: &SeriesWithBloom| {
            swb.series.fingerprint
        }));

        let mut populated = 0usize;
        let mut dropped = 0usize;

        while self.store.advance() {
            let mut out = self.store.at().clone();
            let fp = out.fingerprint;

            // series below the truth fingerprint exist only in blocks
            loop {
                match heap.peek() {
                    Some(next) if next.series.fingerprint < fp => {
                        heap.advance();
                        dropped += 1;
                    }
                    _ => break,
                }
            }
            if let Some(err) = heap.take_err() {
                return Err(err);
            }

            // fold every block entry at this fingerprint into one row
            let mut bloom: Option<Bloom> = None;
            loop {
                match heap.peek() {
                    Some(next) if next.series.fingerprint == fp => {
                        heap.advance();
                        let item = heap.take_at().unwrap();
                        out.union_chunks(&item.series.chunks);
                        if bloom.is_none() {
                            bloom = Some(item.bloom);
                        }
                    }
                    _ => break,
                }
            }
            if let Some(err) = heap.take_err() {
                return Err(err);
            }

            let bloom = match bloom {
                Some(bloom) => bloom,
                None => {
                    let mut fresh = Bloom::empty(params);
                    (self.populate)(&out, &mut fresh)
                        .map_err(|e| MistError::PopulateFailed(e.to_string()))?;
                    populated += 1;
                    fresh
                }
            };

            builder.add_series(&SeriesWithBloom { series: out, bloom })?;
        }
        if let Some(err) = self.store.take_err() {
            return Err(err);
        }

        info!(populated, dropped, "merge complete");
        builder.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ByteReader, MemoryBlockWriter};
    use crate::block::{Block, BlockQuerier};
    use crate::builder::BlockOptions;
    use crate::iter::{DedupCursor, MapCursor, SliceCursor};
    use crate::testutil::mk_series_with_blooms;

    fn test_options() -> BlockOptions {
        BlockOptions::new(100, 10 << 10)
    }

    fn build_block(data: &[SeriesWithBloom]) -> BlockQuerier<ByteReader> {
        let mut writer = MemoryBlockWriter::new();
        let builder = BlockBuilder::new(test_options(), &mut writer).unwrap();
        builder.build_from(&mut SliceCursor::new(data)).unwrap();
        BlockQuerier::new(Block::new(writer.reader()))
    }

    fn merge_to_block<B, T, P>(mb: MergeBuilder<B, T, P>) -> (u32, BlockQuerier<ByteReader>)
    where
        B: Cursor<Item = SeriesWithBloom>,
        T: Cursor<Item = Series>,
        P: FnMut(&Series, &mut Bloom) -> Result<()>,
    {
        let mut writer = MemoryBlockWriter::new();
        let builder = BlockBuilder::new(test_options(), &mut writer).unwrap();
        let (digest, _) = mb.build(builder).unwrap();
        (digest, BlockQuerier::new(Block::new(writer.reader())))
    }

    #[test]
    fn test_merge_dedups_overlapping_blocks() {
        let data = mk_series_with_blooms(100, 100, 0, 100, 0, 10_000);

        // three blocks covering overlapping fingerprint ranges
        let blocks = vec![
            build_block(&data[0..50]),
            build_block(&data[25..75]),
            build_block(&data[50..100]),
        ];
        let store = MapCursor::new(SliceCursor::new(&data), |swb| swb.series.clone());

        let mb = MergeBuilder::new(blocks, store, |_, _| {
            Err(MistError::InvalidInput("populate not expected".into()))
        });
        let (_, mut merged) = merge_to_block(mb);

        for expected in &data {
            assert!(merged.advance(), "merge ended early: {:?}", merged.err());
            assert_eq!(merged.at().series, expected.series);
        }
        assert!(!merged.advance());
        assert!(merged.err().is_none());
    }

    #[test]
    fn test_merge_digest_deterministic() {
        let data = mk_series_with_blooms(100, 100, 0, 100, 0, 10_000);

        let mut digests = Vec::new();
        for _ in 0..2 {
            let blocks = vec![
                build_block(&data[0..50]),
                build_block(&data[25..75]),
                build_block(&data[50..100]),
            ];
            let store = MapCursor::new(SliceCursor::new(&data), |swb| swb.series.clone());
            let mb = MergeBuilder::new(blocks, store, |_, _| Ok(()));
            let (digest, _) = merge_to_block(mb);
            digests.push(digest);
        }
        assert_eq!(digests[0], digests[1]);
    }

    #[test]
    fn test_merge_drops_series_absent_from_truth() {
        let data = mk_series_with_blooms(100, 100, 0, 100, 0, 10_000);
        let extra = mk_series_with_blooms(1, 100, 200, 400, 0, 10_000);

        // fingerprint 200 lives in one block but not in the truth
        let mut block_a: Vec<SeriesWithBloom> = data[0..50].to_vec();
        block_a.push(extra[0].clone());
        let blocks = vec![
            build_block(&block_a),
            build_block(&data[50..100]),
        ];
        let truth: Vec<Series> = data.iter().map(|swb| swb.series.clone()).collect();

        let mb = MergeBuilder::new(blocks, SliceCursor::new(&truth), |_, _| Ok(()));
        let (_, mut merged) = merge_to_block(mb);

        let mut fingerprints = Vec::new();
        while merged.advance() {
            fingerprints.push(merged.at().series.fingerprint);
        }
        assert_eq!(fingerprints, (0..100).collect::<Vec<u64>>());
        assert!(!fingerprints.contains(&200));
    }

    #[test]
    fn test_merge_populates_series_missing_from_blocks() {
        let data = mk_series_with_blooms(10, 100, 0, 100, 0, 10_000);

        // the block covers everything but the last truth series
        let blocks = vec![build_block(&data[0..9])];
        let truth: Vec<Series> = data.iter().map(|swb| swb.series.clone()).collect();

        let mut calls = 0usize;
        let mb = MergeBuilder::new(blocks, SliceCursor::new(&truth), |series, bloom| {
            calls += 1;
            assert_eq!(series.fingerprint, truth[9].fingerprint);
            bloom.add(b"freshly indexed");
            Ok(())
        });

        let mut writer = MemoryBlockWriter::new();
        let builder = BlockBuilder::new(test_options(), &mut writer).unwrap();
        mb.build(builder).unwrap();
        assert_eq!(calls, 1);

        let mut merged = BlockQuerier::new(Block::new(writer.reader()));
        let mut last = None;
        while merged.advance() {
            last = Some(merged.at().clone());
        }
        let last = last.unwrap();
        assert_eq!(last.series.fingerprint, truth[9].fingerprint);
        assert!(last.bloom.test(b"freshly indexed"));
    }

    #[test]
    fn test_merge_populate_error_aborts() {
        let data = mk_series_with_blooms(10, 100, 0, 100, 0, 10_000);

        let blocks = vec![build_block(&data[0..5])];
        let truth: Vec<Series> = data.iter().map(|swb| swb.series.clone()).collect();

        let mb = MergeBuilder::new(blocks, SliceCursor::new(&truth), |_, _| {
            Err(MistError::InvalidInput("no indexer available".into()))
        });

        let mut writer = MemoryBlockWriter::new();
        let builder = BlockBuilder::new(test_options(), &mut writer).unwrap();
        match mb.build(builder) {
            Err(MistError::PopulateFailed(_)) => {}
            other => panic!("expected PopulateFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_from_duplicated_stores() {
        // two blocks with identical data plus one with disjoint data; the
        // deduped union must come back out exactly once per fingerprint
        let xs = mk_series_with_blooms(100, 100, 0, 0xffff, 0, 10_000);
        let copies = [
            xs[0..50].to_vec(),
            xs[0..50].to_vec(),
            xs[50..100].to_vec(),
        ];

        let blocks: Vec<_> = copies.iter().map(|d| build_block(d)).collect();

        let store_inputs: Vec<_> = copies.iter().map(|d| SliceCursor::new(d)).collect();
        let store_heap =
            HeapCursor::new(store_inputs, |swb: &SeriesWithBloom| swb.series.fingerprint);
        let store = DedupCursor::new(
            store_heap,
            |next: &SeriesWithBloom, acc: &Series| next.series.fingerprint == acc.fingerprint,
            |first| first.series,
            |next, acc| {
                if next.series.chunks.len() > acc.chunks.len() {
                    next.series
                } else {
                    acc
                }
            },
        );

        let mb = MergeBuilder::new(blocks, store, |_, _| Ok(()));
        let (_, mut merged) = merge_to_block(mb);

        let mut fingerprints = Vec::new();
        while merged.advance() {
            fingerprints.push(merged.at().series.fingerprint);
        }
        let expected: Vec<u64> = xs.iter().map(|swb| swb.series.fingerprint).collect();
        assert_eq!(fingerprints, expected);
    }
}
