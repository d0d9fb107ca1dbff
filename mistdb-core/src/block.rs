//! Block loading and the lazy series querier
//!
//! [`Block::load_headers`] reads the schema and both index-of-pages without
//! touching page payloads. [`BlockQuerier`] then iterates `(series, bloom)`
//! pairs, keeping at most one series page and one bloom page resident, and
//! supports in-place fingerprint seeks.

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::backend::BlockReader;
use crate::bloom::Bloom;
use crate::builder::{decode_series_row, SeriesRow};
use crate::iter::Cursor;
use crate::page::{self, PageEntry, SeriesPageEntry};
use crate::schema::Schema;
use crate::{Fingerprint, MistError, Result, SeriesWithBloom};

/// Parsed stream headers: schema plus both page indexes
#[derive(Debug, Clone)]
pub struct BlockHeaders {
    pub schema: Schema,
    pub series_pages: Vec<SeriesPageEntry>,
    pub bloom_pages: Vec<PageEntry>,
}

/// An immutable sealed block observed through a [`BlockReader`]
pub struct Block<R: BlockReader> {
    reader: R,
    headers: Option<BlockHeaders>,
}

// Locate the footer of one stream: [index_of_pages][len: u32][schema trailer].
// Returns the stream schema, the raw index-of-pages bytes, and the end of the
// page data region.
fn read_footer(
    total: u64,
    read: impl Fn(u64, usize) -> Result<Bytes>,
) -> Result<(Schema, Bytes, u64)> {
    let min_len = (2 * Schema::ENCODED_LEN + 4) as u64;
    if total < min_len {
        return Err(MistError::Corrupt(format!(
            "stream too short: {} bytes",
            total
        )));
    }

    let header_bytes = read(0, Schema::ENCODED_LEN)?;
    let mut cursor: &[u8] = &header_bytes;
    let header = Schema::decode(&mut cursor)?;

    let trailer_offset = total - Schema::ENCODED_LEN as u64;
    let trailer_bytes = read(trailer_offset, Schema::ENCODED_LEN)?;
    let mut cursor: &[u8] = &trailer_bytes;
    let trailer = Schema::decode(&mut cursor)?;
    if header != trailer {
        return Err(MistError::Corrupt(
            "schema header and trailer disagree".into(),
        ));
    }

    let len_offset = trailer_offset - 4;
    let len_bytes = read(len_offset, 4)?;
    let mut cursor: &[u8] = &len_bytes;
    let index_len = cursor.get_u32_le() as u64;

    let data_end = len_offset
        .checked_sub(index_len)
        .filter(|&start| start >= Schema::ENCODED_LEN as u64)
        .ok_or_else(|| {
            MistError::Corrupt("index-of-pages inconsistent with stream length".into())
        })?;

    let raw_index = read(data_end, index_len as usize)?;
    Ok((header, raw_index, data_end))
}

fn check_page_bounds(entry: &PageEntry, data_end: u64) -> Result<()> {
    let end = entry
        .offset
        .checked_add(entry.stored_len() as u64)
        .filter(|&end| end <= data_end && entry.offset >= Schema::ENCODED_LEN as u64);
    if end.is_none() {
        return Err(MistError::Corrupt(format!(
            "page at offset {} overruns data region of {} bytes",
            entry.offset, data_end
        )));
    }
    Ok(())
}

impl<R: BlockReader> Block<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            headers: None,
        }
    }

    /// Read and validate schema plus both page indexes. Idempotent; page
    /// payloads are not touched.
    pub fn load_headers(&mut self) -> Result<()> {
        if self.headers.is_some() {
            return Ok(());
        }

        let (schema, raw, data_end) = read_footer(self.reader.index_len()?, |offset, len| {
            self.reader.read_index(offset, len)
        })?;
        if raw.len() % SeriesPageEntry::ENCODED_LEN != 0 {
            return Err(MistError::Corrupt(
                "series index-of-pages has a partial entry".into(),
            ));
        }
        let mut cursor: &[u8] = &raw;
        let mut series_pages = Vec::with_capacity(raw.len() / SeriesPageEntry::ENCODED_LEN);
        while cursor.has_remaining() {
            let entry = SeriesPageEntry::decode(&mut cursor)?;
            check_page_bounds(&entry.page, data_end)?;
            series_pages.push(entry);
        }

        let (bloom_schema, raw, data_end) =
            read_footer(self.reader.blooms_len()?, |offset, len| {
                self.reader.read_blooms(offset, len)
            })?;
        if bloom_schema != schema {
            return Err(MistError::Corrupt(
                "index and bloom streams carry different schemas".into(),
            ));
        }
        if raw.len() % PageEntry::ENCODED_LEN != 0 {
            return Err(MistError::Corrupt(
                "bloom index-of-pages has a partial entry".into(),
            ));
        }
        let mut cursor: &[u8] = &raw;
        let mut bloom_pages = Vec::with_capacity(raw.len() / PageEntry::ENCODED_LEN);
        while cursor.has_remaining() {
            let entry = PageEntry::decode(&mut cursor)?;
            check_page_bounds(&entry, data_end)?;
            bloom_pages.push(entry);
        }

        debug!(
            series_pages = series_pages.len(),
            bloom_pages = bloom_pages.len(),
            "loaded block headers"
        );
        self.headers = Some(BlockHeaders {
            schema,
            series_pages,
            bloom_pages,
        });
        Ok(())
    }

    /// Headers, if `load_headers` has run
    pub fn headers(&self) -> Option<&BlockHeaders> {
        self.headers.as_ref()
    }

    fn headers_ref(&self) -> Result<&BlockHeaders> {
        self.headers
            .as_ref()
            .ok_or_else(|| MistError::Corrupt("block headers not loaded".into()))
    }

    // Load and decode one series page into its rows
    fn read_series_page(&self, idx: usize) -> Result<Vec<SeriesRow>> {
        let headers = self.headers_ref()?;
        let entry = &headers.series_pages[idx];
        let stored = self
            .reader
            .read_index(entry.page.offset, entry.page.stored_len())?;
        let raw = page::open(&stored, &entry.page, headers.schema.encoding)?;

        let mut cursor: &[u8] = &raw;
        let mut rows = Vec::new();
        while cursor.has_remaining() {
            rows.push(decode_series_row(&mut cursor)?);
        }
        Ok(rows)
    }

    // Load, verify, and decompress one bloom page
    fn read_bloom_page(&self, idx: usize) -> Result<Vec<u8>> {
        let headers = self.headers_ref()?;
        let entry = headers.bloom_pages.get(idx).ok_or_else(|| {
            MistError::Corrupt(format!("series row references bloom page {}", idx))
        })?;
        let stored = self.reader.read_blooms(entry.offset, entry.stored_len())?;
        page::open(&stored, entry, headers.schema.encoding)
    }
}

struct LoadedSeriesPage {
    rows: Vec<SeriesRow>,
    next_row: usize,
}

/// Lazy cursor over the `(series, bloom)` pairs of one block.
///
/// Pages are loaded on demand and verified as they are loaded; a checksum
/// failure leaves the querier in a terminal error state.
pub struct BlockQuerier<R: BlockReader> {
    block: Block<R>,
    next_page: usize,
    cur_page: Option<LoadedSeriesPage>,
    cur_bloom: Option<(usize, Vec<u8>)>,
    current: Option<SeriesWithBloom>,
    err: Option<MistError>,
}

impl<R: BlockReader> BlockQuerier<R> {
    pub fn new(block: Block<R>) -> Self {
        Self {
            block,
            next_page: 0,
            cur_page: None,
            cur_bloom: None,
            current: None,
            err: None,
        }
    }

    /// Position on the smallest series with fingerprint >= `fp`.
    ///
    /// `seek(0)` resets to the first series. Seeking past the last
    /// fingerprint leaves the querier exhausted but not errored.
    pub fn seek(&mut self, fp: Fingerprint) -> Result<()> {
        self.block.load_headers()?;
        self.current = None;

        let idx = {
            let pages = &self.block.headers_ref()?.series_pages;
            pages.partition_point(|e| e.max_fp < fp)
        };
        let total = self.block.headers_ref()?.series_pages.len();
        if idx >= total {
            self.cur_page = None;
            self.next_page = total;
            self.err = None;
            return Ok(());
        }

        let rows = self.block.read_series_page(idx)?;
        let next_row = rows.partition_point(|r| r.series.fingerprint < fp);
        self.cur_page = Some(LoadedSeriesPage { rows, next_row });
        self.next_page = idx + 1;
        self.err = None;
        Ok(())
    }

    fn advance_inner(&mut self) -> Result<Option<SeriesWithBloom>> {
        loop {
            if self.cur_page.is_none() {
                self.block.load_headers()?;
                let total = self.block.headers_ref()?.series_pages.len();
                if self.next_page >= total {
                    return Ok(None);
                }
                let rows = self.block.read_series_page(self.next_page)?;
                self.cur_page = Some(LoadedSeriesPage { rows, next_row: 0 });
                self.next_page += 1;
            }

            let row = {
                let page = self.cur_page.as_mut().unwrap();
                if page.next_row >= page.rows.len() {
                    self.cur_page = None;
                    continue;
                }
                let row = page.rows[page.next_row].clone();
                page.next_row += 1;
                row
            };

            if self.cur_bloom.as_ref().map(|(idx, _)| *idx) != Some(row.bloom_page) {
                let raw = self.block.read_bloom_page(row.bloom_page)?;
                self.cur_bloom = Some((row.bloom_page, raw));
            }
            let (_, raw) = self.cur_bloom.as_ref().unwrap();

            let end = row
                .bloom_offset
                .checked_add(row.bloom_len)
                .filter(|&end| end <= raw.len())
                .ok_or_else(|| {
                    MistError::Corrupt("bloom reference outside its page".into())
                })?;
            let mut slice = &raw[row.bloom_offset..end];
            let params = self.block.headers_ref()?.schema.bloom_params();
            let bloom = Bloom::decode(&mut slice, params)?;

            return Ok(Some(SeriesWithBloom {
                series: row.series,
                bloom,
            }));
        }
    }
}

impl<R: BlockReader> Cursor for BlockQuerier<R> {
    type Item = SeriesWithBloom;

    fn advance(&mut self) -> bool {
        if self.err.is_some() {
            self.current = None;
            return false;
        }
        match self.advance_inner() {
            Ok(Some(swb)) => {
                self.current = Some(swb);
                true
            }
            Ok(None) => {
                self.current = None;
                false
            }
            Err(e) => {
                self.err = Some(e);
                self.current = None;
                false
            }
        }
    }

    fn at(&self) -> &SeriesWithBloom {
        self.current.as_ref().unwrap()
    }

    fn err(&self) -> Option<&MistError> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<MistError> {
        self.err.take()
    }
}
