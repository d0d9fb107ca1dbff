//! Shared fixtures for the block store tests

use crate::bloom::Bloom;
use crate::schema::Schema;
use crate::{ChunkRef, Fingerprint, Series, SeriesWithBloom};

/// Tokens added to the bloom of the series with the given fingerprint
pub(crate) fn tokens_for(fp: Fingerprint, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key_{}_{}", fp, i)).collect()
}

/// Build `num_series` series with fingerprints evenly spaced over
/// `[min_fp, max_fp]`, each carrying one chunk over `[from_ms, through_ms]`
/// and a bloom holding `keys_per_series` tokens.
pub(crate) fn mk_series_with_blooms(
    num_series: u64,
    keys_per_series: usize,
    min_fp: Fingerprint,
    max_fp: Fingerprint,
    from_ms: i64,
    through_ms: i64,
) -> Vec<SeriesWithBloom> {
    let params = Schema::default().bloom_params();
    let step = (max_fp - min_fp) / num_series.max(1);

    (0..num_series)
        .map(|i| {
            let fp = min_fp + i * step;
            let series = Series {
                fingerprint: fp,
                chunks: vec![ChunkRef::new(fp, from_ms, through_ms, i as u32)],
            };
            let mut bloom = Bloom::empty(params);
            for token in tokens_for(fp, keys_per_series) {
                bloom.add(token.as_bytes());
            }
            SeriesWithBloom { series, bloom }
        })
        .collect()
}
