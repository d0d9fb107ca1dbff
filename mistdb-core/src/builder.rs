//! Streaming block builder
//!
//! Consumes `(series, bloom)` pairs ordered by ascending fingerprint and
//! emits the two paged streams of a block. Page targets are soft upper
//! bounds honoured with a fixed predicate so identical logical input under
//! identical options always produces identical pages, and therefore an
//! identical digest.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, info};

use crate::backend::BlockWriter;
use crate::coding::{get_uvarint, put_uvarint};
use crate::iter::Cursor;
use crate::page::{self, PageEntry, SeriesPageEntry};
use crate::schema::Schema;
use crate::{ChunkRef, Fingerprint, MistError, Result, Series, SeriesWithBloom};

/// Options fixed for the lifetime of one block
#[derive(Debug, Clone, Copy)]
pub struct BlockOptions {
    pub schema: Schema,
    /// Soft upper bound on an uncompressed series page, in bytes
    pub series_page_target: usize,
    /// Soft upper bound on an uncompressed bloom page, in bytes
    pub bloom_page_target: usize,
}

impl BlockOptions {
    /// Options with the default schema and the given page targets
    pub fn new(series_page_target: usize, bloom_page_target: usize) -> Self {
        Self {
            schema: Schema::default(),
            series_page_target,
            bloom_page_target,
        }
    }
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self::new(4 << 10, 64 << 10)
    }
}

/// Figures reported by a completed build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub series_count: usize,
    pub series_pages: usize,
    pub bloom_pages: usize,
    pub bytes_written: u64,
}

/// One decoded row of a series page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeriesRow {
    pub series: Series,
    pub bloom_page: usize,
    pub bloom_offset: usize,
    pub bloom_len: usize,
}

pub(crate) fn encode_series_row(
    buf: &mut BytesMut,
    series: &Series,
    bloom_page: usize,
    bloom_offset: usize,
    bloom_len: usize,
) {
    buf.put_u64_le(series.fingerprint);
    put_uvarint(buf, series.chunks.len() as u64);
    for chunk in &series.chunks {
        buf.put_i64_le(chunk.from_ms);
        buf.put_i64_le(chunk.through_ms);
        buf.put_u32_le(chunk.checksum);
    }
    put_uvarint(buf, bloom_page as u64);
    put_uvarint(buf, bloom_offset as u64);
    put_uvarint(buf, bloom_len as u64);
}

pub(crate) fn decode_series_row(buf: &mut impl Buf) -> Result<SeriesRow> {
    if buf.remaining() < 8 {
        return Err(MistError::Corrupt("series row truncated".into()));
    }
    let fingerprint = buf.get_u64_le();
    let num_chunks = get_uvarint(buf)? as usize;
    match num_chunks.checked_mul(20) {
        Some(needed) if needed <= buf.remaining() => {}
        _ => return Err(MistError::Corrupt("series row chunk list truncated".into())),
    }
    let mut chunks = Vec::with_capacity(num_chunks);
    for _ in 0..num_chunks {
        chunks.push(ChunkRef {
            fingerprint,
            from_ms: buf.get_i64_le(),
            through_ms: buf.get_i64_le(),
            checksum: buf.get_u32_le(),
        });
    }
    Ok(SeriesRow {
        series: Series {
            fingerprint,
            chunks,
        },
        bloom_page: get_uvarint(buf)? as usize,
        bloom_offset: get_uvarint(buf)? as usize,
        bloom_len: get_uvarint(buf)? as usize,
    })
}

/// Streaming builder for one immutable block
pub struct BlockBuilder<W: BlockWriter> {
    opts: BlockOptions,
    writer: W,

    // series index stream
    index_offset: u64,
    series_buf: BytesMut,
    series_entries: usize,
    page_min_fp: Fingerprint,
    page_max_fp: Fingerprint,
    series_pages: Vec<SeriesPageEntry>,

    // blooms stream
    bloom_offset: u64,
    bloom_buf: BytesMut,
    bloom_entries: usize,
    bloom_pages: Vec<PageEntry>,

    last_fp: Option<Fingerprint>,
    series_count: usize,
}

impl<W: BlockWriter> BlockBuilder<W> {
    /// Create a builder, writing the schema header to both streams
    pub fn new(opts: BlockOptions, mut writer: W) -> Result<Self> {
        let mut header = BytesMut::with_capacity(Schema::ENCODED_LEN);
        opts.schema.encode(&mut header);
        writer.index().write_all(&header)?;
        writer.blooms().write_all(&header)?;

        Ok(Self {
            opts,
            writer,
            index_offset: Schema::ENCODED_LEN as u64,
            series_buf: BytesMut::new(),
            series_entries: 0,
            page_min_fp: 0,
            page_max_fp: 0,
            series_pages: Vec::new(),
            bloom_offset: Schema::ENCODED_LEN as u64,
            bloom_buf: BytesMut::new(),
            bloom_entries: 0,
            bloom_pages: Vec::new(),
            last_fp: None,
            series_count: 0,
        })
    }

    /// Options this builder was created with
    pub fn options(&self) -> &BlockOptions {
        &self.opts
    }

    /// Append one series. Input must be strictly ascending by fingerprint.
    pub fn add_series(&mut self, swb: &SeriesWithBloom) -> Result<()> {
        let fp = swb.series.fingerprint;
        if let Some(last) = self.last_fp {
            if fp <= last {
                return Err(MistError::OutOfOrder { last, got: fp });
            }
        }
        self.last_fp = Some(fp);
        self.series_count += 1;

        // seal when the open page already exceeds its target, so the new
        // entry starts the next page
        if self.bloom_entries >= 1 && self.bloom_buf.len() > self.opts.bloom_page_target {
            self.flush_bloom_page()?;
        }
        let bloom_page = self.bloom_pages.len();
        let bloom_offset = self.bloom_buf.len();
        swb.bloom.encode(&mut self.bloom_buf);
        let bloom_len = self.bloom_buf.len() - bloom_offset;
        self.bloom_entries += 1;

        if self.series_entries >= 1 && self.series_buf.len() > self.opts.series_page_target {
            self.flush_series_page()?;
        }
        if self.series_entries == 0 {
            self.page_min_fp = fp;
        }
        self.page_max_fp = fp;
        encode_series_row(
            &mut self.series_buf,
            &swb.series,
            bloom_page,
            bloom_offset,
            bloom_len,
        );
        self.series_entries += 1;

        Ok(())
    }

    /// Consume an ordered cursor of series, seal the block, and return its
    /// digest and build statistics
    pub fn build_from<C>(mut self, cursor: &mut C) -> Result<(u32, BuildStats)>
    where
        C: Cursor<Item = SeriesWithBloom>,
    {
        while cursor.advance() {
            self.add_series(cursor.at())?;
        }
        if let Some(err) = cursor.take_err() {
            return Err(err);
        }
        self.finalize()
    }

    /// Flush open pages, write both index-of-pages and schema trailers,
    /// fsync, and compute the block digest
    pub fn finalize(mut self) -> Result<(u32, BuildStats)> {
        if self.series_count == 0 {
            return Err(MistError::InvalidInput(
                "a block requires at least one series".into(),
            ));
        }
        self.flush_series_page()?;
        self.flush_bloom_page()?;

        let mut scratch = BytesMut::new();

        // series stream footer
        for entry in &self.series_pages {
            entry.encode(&mut scratch);
        }
        scratch.put_u32_le((self.series_pages.len() * SeriesPageEntry::ENCODED_LEN) as u32);
        self.opts.schema.encode(&mut scratch);
        self.writer.index().write_all(&scratch)?;
        self.index_offset += scratch.len() as u64;
        scratch.clear();

        // blooms stream footer
        for entry in &self.bloom_pages {
            entry.encode(&mut scratch);
        }
        scratch.put_u32_le((self.bloom_pages.len() * PageEntry::ENCODED_LEN) as u32);
        self.opts.schema.encode(&mut scratch);
        self.writer.blooms().write_all(&scratch)?;
        self.bloom_offset += scratch.len() as u64;

        self.writer.seal()?;

        // digest: CRC32-C over every page's CRC in write order, series
        // stream first
        let mut digest = 0u32;
        for entry in &self.series_pages {
            digest = crc32c::crc32c_append(digest, &entry.page.crc.to_le_bytes());
        }
        for entry in &self.bloom_pages {
            digest = crc32c::crc32c_append(digest, &entry.crc.to_le_bytes());
        }

        let stats = BuildStats {
            series_count: self.series_count,
            series_pages: self.series_pages.len(),
            bloom_pages: self.bloom_pages.len(),
            bytes_written: self.index_offset + self.bloom_offset,
        };
        let digest_hex = format!("{:#010x}", digest);
        info!(
            series = stats.series_count,
            series_pages = stats.series_pages,
            bloom_pages = stats.bloom_pages,
            bytes = stats.bytes_written,
            digest = %digest_hex,
            "sealed block"
        );

        Ok((digest, stats))
    }

    fn flush_series_page(&mut self) -> Result<()> {
        if self.series_entries == 0 {
            return Ok(());
        }
        let sealed = page::seal(&self.series_buf, self.opts.schema.encoding);
        self.writer.index().write_all(&sealed.bytes)?;
        self.series_pages.push(SeriesPageEntry {
            page: PageEntry {
                offset: self.index_offset,
                compressed_len: sealed.compressed_len,
                uncompressed_len: sealed.uncompressed_len,
                crc: sealed.crc,
            },
            min_fp: self.page_min_fp,
            max_fp: self.page_max_fp,
        });
        debug!(
            entries = self.series_entries,
            raw = sealed.uncompressed_len,
            compressed = sealed.compressed_len,
            "sealed series page"
        );
        self.index_offset += sealed.bytes.len() as u64;
        self.series_buf.clear();
        self.series_entries = 0;
        Ok(())
    }

    fn flush_bloom_page(&mut self) -> Result<()> {
        if self.bloom_entries == 0 {
            return Ok(());
        }
        let sealed = page::seal(&self.bloom_buf, self.opts.schema.encoding);
        self.writer.blooms().write_all(&sealed.bytes)?;
        self.bloom_pages.push(PageEntry {
            offset: self.bloom_offset,
            compressed_len: sealed.compressed_len,
            uncompressed_len: sealed.uncompressed_len,
            crc: sealed.crc,
        });
        debug!(
            entries = self.bloom_entries,
            raw = sealed.uncompressed_len,
            compressed = sealed.compressed_len,
            "sealed bloom page"
        );
        self.bloom_offset += sealed.bytes.len() as u64;
        self.bloom_buf.clear();
        self.bloom_entries = 0;
        Ok(())
    }
}
