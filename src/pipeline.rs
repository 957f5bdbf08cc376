//! The counting pipeline, end to end.
//!
//! High-level flow (single call):
//! 1) Map the input plus the scratch arena in one reservation; carve all
//!    working buffers up front.
//! 2) Walk the file in 64 KiB chunks. Per chunk: whitespace bitmasks per
//!    64-byte window, expand to start/end offsets, pair them into
//!    length-bucketed tokens (boundary stragglers go to the interblock
//!    list), hash each length class its own way, then drain the staged
//!    hashes into the two Robin-Hood tables with prefetch ahead.
//! 3) Replay the interblock list into the same tables.
//! 4) Compact both tables and the very-short counters into one dense
//!    entry array.
//! 5) Radix-sort by (count desc, bytes asc) and restore the counts the
//!    deep sort levels clobbered.
//!
//! The returned [`WordCounts`] owns the reservation; entries reference
//! token bytes inside it (file region or arena) and stay valid until it
//! is dropped.

use std::path::Path;
use std::time::Instant;

use crate::arena::{ArenaVec, FileArena};
use crate::buckets::{LengthBuckets, ROWS_LEN};
use crate::config::{
    CHUNK_SIZE, COUNT_RUNS_CAP, INTERBLOCK_MIN, LONG_RHT_POW, MEDIUM_STRING_LENGTH,
    SCAN_WINDOW, SHORT_RHT_POW, SORT_SLAB_WORDS, VERY_SHORT_COUNTS_LEN,
    VERY_SHORT_STRING_LENGTH,
};
use crate::entry::{CountCount, Entry, LenLo, LongHashString, RangeInBuffer};
use crate::errors::WordCountError;
use crate::hashes::{long_token_hash, short_token_hash};
use crate::merge::{compact_tables, flush_long, flush_short, replay_interblock};
use crate::radix::{restore_counts, sort_entries, CountRuns};
use crate::scan::{ends_mask, expand_mask, starts_mask, WindowScanner};
use crate::stats::StageTimings;
use crate::table::{extended_len, LongTable, ShortTable};

/// Counts every whitespace-delimited token in the file at `path`.
///
/// Output is ordered by count descending, ties by byte sequence
/// ascending. Delimiters are exactly 0x20, 0x09 and 0x0a; every other
/// byte, NUL included, is token content.
pub fn wordcount(path: &Path) -> Result<WordCounts, WordCountError> {
    let mut timings = StageTimings::default();
    let t = Instant::now();
    let arena = FileArena::map_file(path)?;

    let short_ext = extended_len(SHORT_RHT_POW);
    let long_ext = extended_len(LONG_RHT_POW);

    // All working memory, carved once. The short table comes first so
    // every in-table 8-byte key is followed by another slot's (zeroed)
    // count byte after compaction.
    let short_store: &mut [Entry] = arena.alloc_slice(short_ext);
    let long_store: &mut [Entry] = arena.alloc_slice(2 * long_ext);
    let lenlo_store: &mut [LenLo] = arena.alloc_slice(long_ext);
    let very_short_counts: &mut [u32] = arena.alloc_slice(VERY_SHORT_COUNTS_LEN);
    let bucket_rows: &mut [u16] = arena.alloc_slice(ROWS_LEN);
    let range_buf: &mut [RangeInBuffer] = arena.alloc_slice(CHUNK_SIZE / 2);
    let interblock_cap = (arena.padded_len() / CHUNK_SIZE + 2).max(INTERBLOCK_MIN);
    let staged_cap = (2 * CHUNK_SIZE).max(interblock_cap + 1);
    let short_staged_buf: &mut [u64] = arena.alloc_slice(staged_cap);
    let long_staged_buf: &mut [LongHashString] = arena.alloc_slice(staged_cap);
    let interblock_buf: &mut [LenLo] = arena.alloc_slice(interblock_cap);
    let starts_buf: &mut [u16] = arena.alloc_slice(CHUNK_SIZE / 2 + 64);
    let ends_buf: &mut [u16] = arena.alloc_slice(CHUNK_SIZE / 2 + 64);
    let slab: &mut [u32] = arena.alloc_slice(SORT_SLAB_WORDS);
    let runs_buf: &mut [CountCount] = arena.alloc_slice(COUNT_RUNS_CAP);

    let entries_off = arena.offset_of(long_store.as_ptr() as *const u8) as usize;
    let runs_off = arena.offset_of(runs_buf.as_ptr() as *const u8) as usize;
    timings.allocate = t.elapsed();

    let t = Instant::now();
    let base = arena.bytes_base();
    let padded = arena.padded_len();
    let scanner = WindowScanner::new();
    let mut buckets = LengthBuckets::new(bucket_rows);
    let mut ranges = ArenaVec::new(range_buf);
    let mut short_staged = ArenaVec::new(short_staged_buf);
    let mut long_staged = ArenaVec::new(long_staged_buf);
    let mut interblock = ArenaVec::new(interblock_buf);
    let mut short_table = ShortTable::new(&mut *short_store, SHORT_RHT_POW);
    let mut long_table = LongTable::new(
        &mut long_store[..long_ext],
        &mut *lenlo_store,
        LONG_RHT_POW,
    );

    // Window-edge state. The whitespace mask carries across chunks
    // (chunks are contiguous); all-ones at file start makes the first
    // non-space byte a token start.
    let mut prev_ws = !0u64;
    let mut pend_starts = 0u64;
    let mut pend_ends = 0u64;
    let mut pend_off = 0u16;
    let mut interblock_lo = 0u64;

    let mut chunk_lo = 0usize;
    while chunk_lo < padded {
        let slice_len = CHUNK_SIZE.min(padded - chunk_lo);

        // Edge masks are flushed one window late so the carry bit from
        // the previous window is available when they are derived.
        let mut starts_len = 0usize;
        let mut ends_len = 0usize;
        // SAFETY: windows stay inside the padded region (slice_len is a
        // multiple of 64) and the offset buffers have expansion slack.
        unsafe {
            let mut p = 0usize;
            while p < slice_len {
                let ws = scanner.mask(base.add(chunk_lo + p));
                starts_len += expand_mask(
                    pend_off,
                    pend_starts,
                    starts_buf.as_mut_ptr().add(starts_len),
                );
                ends_len +=
                    expand_mask(pend_off, pend_ends, ends_buf.as_mut_ptr().add(ends_len));
                pend_off = p as u16;
                pend_starts = starts_mask(ws, prev_ws);
                pend_ends = ends_mask(ws, prev_ws);
                prev_ws = ws;
                p += SCAN_WINDOW;
            }
            starts_len += expand_mask(
                pend_off,
                pend_starts,
                starts_buf.as_mut_ptr().add(starts_len),
            );
            ends_len += expand_mask(pend_off, pend_ends, ends_buf.as_mut_ptr().add(ends_len));
        }
        pend_starts = 0;
        pend_ends = 0;
        pend_off = 0;

        buckets.clear();
        ranges.clear();
        short_staged.clear();
        long_staged.clear();

        let starts = &starts_buf[..starts_len];
        let ends = &ends_buf[..ends_len];
        let mut si = 0usize;
        let mut ei = 0usize;

        // An end before any start completes the token carried over the
        // chunk boundary.
        if ends_len > 0 && (starts_len == 0 || starts[0] > ends[0]) {
            let hi = chunk_lo as u64 + ends[0] as u64;
            ei = 1;
            interblock.push(LenLo::pack(interblock_lo, hi - interblock_lo));
        }
        while ei < ends_len {
            let hi = ends[ei];
            let lo = starts[si];
            ei += 1;
            si += 1;
            let len = (hi - lo) as usize;
            if len < MEDIUM_STRING_LENGTH {
                buckets.push(len, lo);
            } else {
                ranges.push(RangeInBuffer { lo, hi });
            }
        }
        // A start with no end begins the next boundary-straddling token.
        if si < starts_len {
            interblock_lo = chunk_lo as u64 + starts[si] as u64;
        }

        // SAFETY: all offsets address token bytes inside the padded file
        // region; 8-byte short loads may run into padding or arena pages,
        // which are mapped.
        unsafe {
            for len in 9..MEDIUM_STRING_LENGTH {
                for &lo16 in buckets.row(len) {
                    let abs = chunk_lo as u64 + lo16 as u64;
                    long_staged.push(LongHashString {
                        hash: long_token_hash(base.add(abs as usize), len),
                        lenlo: LenLo::pack(abs, len as u64),
                    });
                }
            }
            for &r in ranges.as_slice() {
                let len = (r.hi - r.lo) as usize;
                let abs = chunk_lo as u64 + r.lo as u64;
                long_staged.push(LongHashString {
                    hash: long_token_hash(base.add(abs as usize), len),
                    lenlo: LenLo::pack(abs, len as u64),
                });
            }
            if VERY_SHORT_STRING_LENGTH > 1 {
                for &lo16 in buckets.row(1) {
                    let b = *base.add(chunk_lo + lo16 as usize);
                    very_short_counts[b as usize] += 1;
                }
            }
            if VERY_SHORT_STRING_LENGTH > 2 {
                for &lo16 in buckets.row(2) {
                    let b = std::ptr::read_unaligned(
                        base.add(chunk_lo + lo16 as usize) as *const u16
                    );
                    very_short_counts[b as usize] += 1;
                }
            }
            for len in VERY_SHORT_STRING_LENGTH..9 {
                for &lo16 in buckets.row(len) {
                    short_staged
                        .push(short_token_hash(base.add(chunk_lo + lo16 as usize), len));
                }
            }
        }

        flush_short(
            short_staged.as_slice(),
            long_staged.as_slice(),
            &mut short_table,
            &long_table,
        );
        // SAFETY: staged lenlos locate tokens inside the padded region.
        unsafe { flush_long(long_staged.as_slice(), &mut long_table, base) };

        chunk_lo += slice_len;
    }
    timings.scan = t.elapsed();

    let t = Instant::now();
    // SAFETY: interblock lenlos locate tokens inside the padded region;
    // the staged arrays were sized to hold a full replay.
    unsafe {
        replay_interblock(
            &mut interblock,
            &mut short_staged,
            &mut long_staged,
            very_short_counts,
            &mut short_table,
            &mut long_table,
            base,
        );
    }
    timings.interblock = t.elapsed();

    drop(short_table);
    drop(long_table);

    let t = Instant::now();
    let n_entries = compact_tables(
        long_store,
        long_ext,
        lenlo_store,
        short_store,
        very_short_counts,
        base,
    );
    timings.compact = t.elapsed();

    let t = Instant::now();
    assert!(
        2 * n_entries <= long_store.len(),
        "distinct tokens exceed the sort scratch"
    );
    let mut runs = CountRuns::new(runs_buf);
    let (entries, rest) = long_store.split_at_mut(n_entries);
    let scratch = &mut rest[..n_entries];
    // SAFETY: entry keys are packed length+offset records into the
    // reservation; comparison overreads stay inside it.
    unsafe { sort_entries(entries, scratch, base, slab, &mut runs) };
    timings.sort = t.elapsed();

    let t = Instant::now();
    restore_counts(entries, runs.as_slice());
    timings.restore = t.elapsed();

    let n_runs = runs.len();
    Ok(WordCounts {
        arena,
        entries_off,
        n_entries,
        runs_off,
        n_runs,
        timings,
    })
}

/// Sorted (count, token) records from one [`wordcount`] call.
///
/// Owns the reservation backing both the entry array and the token
/// bytes; everything borrowed from it dies with it.
#[derive(Debug)]
pub struct WordCounts {
    arena: FileArena,
    entries_off: usize,
    n_entries: usize,
    runs_off: usize,
    n_runs: usize,
    timings: StageTimings,
}

impl WordCounts {
    #[inline]
    pub fn len(&self) -> usize {
        self.n_entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    fn entries(&self) -> &[Entry] {
        // SAFETY: the offset was captured from an 8-aligned arena
        // allocation of at least n_entries records living as long as the
        // arena.
        unsafe {
            std::slice::from_raw_parts(
                self.arena.bytes_base().add(self.entries_off) as *const Entry,
                self.n_entries,
            )
        }
    }

    /// The `index`-th (count, token bytes) pair in output order.
    pub fn get(&self, index: usize) -> (u32, &[u8]) {
        let e = &self.entries()[index];
        // SAFETY: compaction only emits offsets of token bytes inside the
        // reservation.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                self.arena.bytes_base().add(e.lo() as usize),
                e.len() as usize,
            )
        };
        (e.count(), bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        (0..self.n_entries).map(move |i| self.get(i))
    }

    /// Equal-count runs in output order: (count, how many tokens).
    pub fn count_runs(&self) -> &[CountCount] {
        // SAFETY: as `entries`, for the run buffer.
        unsafe {
            std::slice::from_raw_parts(
                self.arena.bytes_base().add(self.runs_off) as *const CountCount,
                self.n_runs,
            )
        }
    }

    /// Total number of tokens in the input.
    pub fn total_tokens(&self) -> u64 {
        self.count_runs()
            .iter()
            .map(|r| r.count as u64 * r.n_strings as u64)
            .sum()
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    /// True when the run wanted hugepages but fell back to base pages.
    pub fn hugepage_fallback(&self) -> bool {
        self.arena.hugepage_fallback()
    }
}
