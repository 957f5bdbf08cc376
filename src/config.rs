//! Compile-time tuning knobs for the counting pipeline.
//!
//! These are deliberately `const`s rather than runtime options: buffer
//! widths, table sizes and the chunk geometry are load-bearing for the
//! index types used in the hot loops (`u16` chunk offsets, 40-bit file
//! offsets), so changing them is a recompile-the-world decision.

/// How many bytes to process at a time. Offsets inside a chunk are stored
/// as `u16`, so this cannot grow past 64 KiB without widening them.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes examined per scanner step; one whitespace bitmask per window.
pub const SCAN_WINDOW: usize = 64;

/// Tokens strictly shorter than this are counted in direct-index arrays
/// instead of a hash table. Valid values are 1, 2 or 3.
pub const VERY_SHORT_STRING_LENGTH: usize = 3;

/// Size of the direct-index count array (one `u32` per possible 1-byte or
/// 2-byte token value).
pub const VERY_SHORT_COUNTS_LEN: usize = if VERY_SHORT_STRING_LENGTH > 1 {
    1 << (8 * (VERY_SHORT_STRING_LENGTH - 1))
} else {
    0
};

/// Tokens at or beyond this length skip the per-length offset rows and go
/// through the (lo, hi) range list instead.
pub const MEDIUM_STRING_LENGTH: usize = 256;

/// log2 of the short hash table (tokens of 3..=8 bytes). 23 => 8M buckets.
pub const SHORT_RHT_POW: u32 = 23;

/// log2 of the long hash table (tokens of 9+ bytes). 26 => 67M buckets.
pub const LONG_RHT_POW: u32 = 26;

/// Ranges at or below this size are insertion-sorted instead of radixed.
pub const INSSORT_CUTOFF: usize = 55;

/// How many staged records ahead of the insertion cursor to prefetch.
/// A tuning knob only; correctness holds for any distance.
pub const PREFETCH_DISTANCE: usize = 40;

/// Whether the memory provider first tries a hugepage reservation.
pub const USE_HUGEPAGES: bool = true;

/// Fixed size of the scratch arena carved after the file region.
pub const ARENA_BYTES: usize = 4 << 30;

/// Stdout is flushed through a buffer of this size by the CLI renderer.
pub const WRITE_CHUNK_SIZE: usize = 32 * 1024;

/// Files at or beyond 2^40 bytes are rejected: file offsets are packed
/// into 40 bits.
pub const MAX_FILE_BYTES: u64 = 1 << 40;

/// Minimum capacity of the interblock token list. Grows with the input so
/// one boundary token per chunk always fits.
pub const INTERBLOCK_MIN: usize = 0x20000;

/// `u32` words in the radix sort's bucket slab. Each 2-bytes-per-level
/// recursion level consumes 0x10000 words.
pub const SORT_SLAB_WORDS: usize = 0x10000 * 1024;

/// Capacity of the equal-count run buffer produced by the count radix.
/// Runs are one per distinct count value, which is O(sqrt(total tokens)).
pub const COUNT_RUNS_CAP: usize = 1 << 20;
