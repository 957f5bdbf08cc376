//! MSD radix sorting of the compacted entry array.
//!
//! The sort key is (count descending, token bytes ascending) and runs in
//! two phases over the same 16-byte records:
//!
//! - **count phase**: MSD radix over the four big-endian count digits,
//!   buckets enumerated high to low so output is descending. When all
//!   four digits are consumed the equal-count run is recorded as a
//!   [`CountCount`] and handed to the byte phase.
//! - **byte phase**: MSD radix over the cached token bytes, buckets
//!   ascending. When the cache is exhausted every entry in a surviving
//!   bucket remounts the next eight token bytes from the backing storage
//!   and the digit index wraps to zero. Small ranges fall back to an
//!   insertion sort that compares the cached big-endian word first and
//!   only walks raw bytes on a tie.
//!
//! Both phases process two digit bytes per level while a range has at
//! least 2^16 records, one byte otherwise. Levels alternate between the
//! entry array and a same-sized scratch buffer; `final_dest` tracks which
//! buffer must hold the result of the current level so the caller's array
//! receives sorted data without a trailing copy.
//!
//! Bucket size/index arrays are carved from a shared `u32` slab, one
//! window per recursion level; a level that cannot get a window falls
//! back to insertion sort rather than overrun the slab.
//!
//! A separate in-place byte radix orders the interblock (length, offset)
//! list by its packed value; only the three length bytes are radixed,
//! which groups equal lengths, and small runs finish with a comparison
//! sort of the full packed value.

use crate::config::INSSORT_CUTOFF;
use crate::entry::{CountCount, Entry, LenLo};

const TWO_BYTE_BUCKETS: usize = 1 << 16;
const ONE_BYTE_BUCKETS: usize = 1 << 8;

/// Fixed-capacity sink for equal-count runs, in output order.
pub struct CountRuns<'a> {
    buf: &'a mut [CountCount],
    len: usize,
}

impl<'a> CountRuns<'a> {
    pub fn new(buf: &'a mut [CountCount]) -> Self {
        Self { buf, len: 0 }
    }

    #[inline]
    fn push(&mut self, run: CountCount) {
        self.buf[self.len] = run;
        self.len += 1;
    }

    #[inline]
    pub fn as_slice(&self) -> &[CountCount] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Byte-lexicographic "less than" for two token tails known to differ
/// before either leaves readable memory.
///
/// # Safety
/// Both pointers must stay readable for 8 bytes past the first
/// difference; inside the reservation this holds because distinct tokens
/// differ at or before the shorter token's terminating delimiter/zero.
#[inline(always)]
unsafe fn mem_less(mut a: *const u8, mut b: *const u8) -> bool {
    loop {
        let wa = std::ptr::read_unaligned(a as *const u64);
        let wb = std::ptr::read_unaligned(b as *const u64);
        if wa != wb {
            return wa.swap_bytes() < wb.swap_bytes();
        }
        a = a.add(8);
        b = b.add(8);
    }
}

/// In-place insertion sort by (cached word, then raw bytes from `depth`).
///
/// # Safety
/// Entry keys must be packed length+offset records into `base`, with the
/// reservation guarantees of [`mem_less`].
unsafe fn ins_sort(array: &mut [Entry], depth: u64, base: *const u8) {
    for i in 1..array.len() {
        let tmp = array[i];
        let icached = tmp.cached_word();
        let istr = base.add((tmp.lo() + depth) as usize);
        let mut j = i;
        while j > 0 {
            let jcached = array[j - 1].cached_word();
            if jcached < icached
                || (jcached == icached
                    && mem_less(base.add((array[j - 1].lo() + depth) as usize), istr))
            {
                break;
            }
            array[j] = array[j - 1];
            j -= 1;
        }
        array[j] = tmp;
    }
}

/// Insertion sort reading from `src` and writing the sorted result to
/// `dst` (same length).
///
/// # Safety
/// As [`ins_sort`].
unsafe fn ins_sort_into(src: &[Entry], dst: &mut [Entry], depth: u64, base: *const u8) {
    dst[0] = src[0];
    for i in 1..src.len() {
        let tmp = src[i];
        let icached = tmp.cached_word();
        let istr = base.add((tmp.lo() + depth) as usize);
        let mut j = i;
        while j > 0 {
            let jcached = dst[j - 1].cached_word();
            if jcached < icached
                || (jcached == icached
                    && mem_less(base.add((dst[j - 1].lo() + depth) as usize), istr))
            {
                break;
            }
            dst[j] = dst[j - 1];
            j -= 1;
        }
        dst[j] = tmp;
    }
}

/// Sorts `entries` by (count desc, bytes asc), capturing equal-count runs.
///
/// `scratch` must be at least as long as `entries`; `slab` provides the
/// per-level bucket arrays. On return `entries` holds the sorted records,
/// with count fields possibly clobbered by deep byte levels (restore with
/// [`restore_counts`]).
///
/// # Safety
/// Entry keys are packed length+offset records into `base`; all token
/// bytes plus the trailing slack named in [`mem_less`] are readable.
pub unsafe fn sort_entries(
    entries: &mut [Entry],
    scratch: &mut [Entry],
    base: *const u8,
    slab: &mut [u32],
    runs: &mut CountRuns<'_>,
) {
    debug_assert!(scratch.len() >= entries.len());
    if entries.is_empty() {
        return;
    }
    let n = entries.len();
    radix_count(entries, &mut scratch[..n], 0, true, true, slab, runs, base);
}

#[allow(clippy::too_many_arguments)]
unsafe fn radix_count(
    array: &mut [Entry],
    scratch: &mut [Entry],
    idx: usize,
    two: bool,
    final_dest: bool,
    slab: &mut [u32],
    runs: &mut CountRuns<'_>,
    base: *const u8,
) {
    let buckets = if two { TWO_BYTE_BUCKETS } else { ONE_BYTE_BUCKETS };
    let (sizes, rest) = slab.split_at_mut(buckets);
    sizes.fill(0);
    for e in array.iter() {
        let d = if two { e.count_digit2(idx) } else { e.count_digit1(idx) };
        sizes[d] += 1;
    }

    // Descending bucket bases: highest digit lands first.
    let index = &mut rest[..buckets];
    index[buckets - 1] = 0;
    for i in (1..buckets).rev() {
        index[i - 1] = index[i] + sizes[i];
    }
    for e in array.iter() {
        let d = if two { e.count_digit2(idx) } else { e.count_digit1(idx) };
        scratch[index[d] as usize] = *e;
        index[d] += 1;
    }

    let next_idx = idx + if two { 2 } else { 1 };
    let mut lo = 0usize;
    for i in (0..buckets).rev() {
        let len = sizes[i] as usize;
        let hi = lo + len;
        if len > 1 {
            if next_idx < 4 {
                radix_count(
                    &mut scratch[lo..hi],
                    &mut array[lo..hi],
                    next_idx,
                    len >= TWO_BYTE_BUCKETS,
                    !final_dest,
                    rest,
                    runs,
                    base,
                );
            } else {
                runs.push(CountCount {
                    count: scratch[lo].count(),
                    n_strings: len as u32,
                });
                radix_bytes(
                    &mut scratch[lo..hi],
                    &mut array[lo..hi],
                    4,
                    len >= TWO_BYTE_BUCKETS,
                    !final_dest,
                    rest,
                    4,
                    base,
                );
            }
        } else if len == 1 {
            runs.push(CountCount {
                count: scratch[lo].count(),
                n_strings: 1,
            });
            if final_dest {
                array[lo] = scratch[lo];
            }
        }
        lo = hi;
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn radix_bytes(
    array: &mut [Entry],
    scratch: &mut [Entry],
    idx: usize,
    two: bool,
    final_dest: bool,
    slab: &mut [u32],
    next_offset: u64,
    base: *const u8,
) {
    let buckets = if two { TWO_BYTE_BUCKETS } else { ONE_BYTE_BUCKETS };
    if slab.len() < 2 * buckets {
        // Pathological shared prefixes exhausted the level windows; finish
        // this range by comparison instead of overrunning the slab.
        if final_dest {
            ins_sort(array, next_offset, base);
        } else {
            ins_sort_into(array, scratch, next_offset, base);
        }
        return;
    }

    let (sizes, rest) = slab.split_at_mut(buckets);
    sizes.fill(0);
    for e in array.iter() {
        let d = if two { e.prefix_digit2(idx) } else { e.prefix_digit1(idx) };
        sizes[d] += 1;
    }

    // Ascending bucket bases.
    let index = &mut rest[..buckets];
    index[0] = 0;
    for i in 1..buckets {
        index[i] = index[i - 1] + sizes[i - 1];
    }
    for e in array.iter() {
        let d = if two { e.prefix_digit2(idx) } else { e.prefix_digit1(idx) };
        scratch[index[d] as usize] = *e;
        index[d] += 1;
    }

    let need_more = idx + if two { 2 } else { 1 } >= 8;
    let next_idx = if need_more { 0 } else { idx + if two { 2 } else { 1 } };
    let deeper_offset = if need_more { next_offset + 8 } else { next_offset };

    let mut lo = 0usize;
    for i in 0..buckets {
        let len = sizes[i] as usize;
        let hi = lo + len;
        if need_more && len > 1 {
            for e in &mut scratch[lo..hi] {
                e.remount(base, next_offset);
            }
        }
        if two && len >= TWO_BYTE_BUCKETS {
            radix_bytes(
                &mut scratch[lo..hi],
                &mut array[lo..hi],
                next_idx,
                true,
                !final_dest,
                rest,
                deeper_offset,
                base,
            );
        } else if len > INSSORT_CUTOFF {
            radix_bytes(
                &mut scratch[lo..hi],
                &mut array[lo..hi],
                next_idx,
                false,
                !final_dest,
                rest,
                deeper_offset,
                base,
            );
        } else if len > 1 {
            if final_dest {
                ins_sort_into(&scratch[lo..hi], &mut array[lo..hi], deeper_offset, base);
            } else {
                ins_sort(&mut scratch[lo..hi], deeper_offset, base);
            }
        } else if len == 1 && final_dest {
            array[lo] = scratch[lo];
        }
        lo = hi;
    }
}

/// Rewrites the count clobbered by deep byte levels from the captured
/// equal-count runs (which are in output order).
pub fn restore_counts(entries: &mut [Entry], runs: &[CountCount]) {
    let mut at = 0usize;
    for run in runs {
        for e in &mut entries[at..at + run.n_strings as usize] {
            e.set_count(run.count);
        }
        at += run.n_strings as usize;
    }
    debug_assert_eq!(at, entries.len());
}

/// Sorts the interblock list by its packed value, grouping equal lengths.
pub fn sort_lenlos(list: &mut [LenLo]) {
    radix_lenlos(list, 56);
}

fn radix_lenlos(list: &mut [LenLo], shift: u32) {
    let mut last = [0u32; 256];
    let mut pointer = [0u32; 256];

    for l in list.iter() {
        last[((l.0 >> shift) & 0xff) as usize] += 1;
    }
    pointer[0] = 0;
    for x in 1..256 {
        pointer[x] = last[x - 1];
        last[x] += last[x - 1];
    }

    // American-flag permutation: cycle each record into its bucket.
    for x in 0..256 {
        while pointer[x] != last[x] {
            let mut value = list[pointer[x] as usize];
            let mut y = ((value.0 >> shift) & 0xff) as usize;
            while x != y {
                let tmp = list[pointer[y] as usize];
                list[pointer[y] as usize] = value;
                pointer[y] += 1;
                value = tmp;
                y = ((value.0 >> shift) & 0xff) as usize;
            }
            list[pointer[x] as usize] = value;
            pointer[x] += 1;
        }
    }

    // Only the three length bytes are radixed; equal-length runs then get
    // a full-value comparison sort when small enough to bother.
    if shift > 40 {
        let mut y = 0usize;
        for x in 0..256 {
            let end = pointer[x] as usize;
            let len = end - y;
            if len > 64 {
                radix_lenlos(&mut list[y..end], shift - 8);
            } else if len > 1 {
                list[y..end].sort_unstable();
            }
            y = end;
        }
    }
}
