//! Table finalization: interblock replay and compaction.
//!
//! After the chunk loop the two tables hold every token that did not
//! straddle a chunk boundary. This module folds in the stragglers and
//! then rewrites everything into one dense entry array ready for sorting:
//!
//! - the long table is densified in place, each live slot's hash replaced
//!   by its parallel (length, offset) record;
//! - each live short slot is appended: unscrambling the key in the slot
//!   turns the slot itself into the token's bytes in arena memory, the
//!   length falls out of the leading zero bytes, and zeroing every slot's
//!   count plants a terminator after the preceding slot's 8-byte key;
//! - each nonzero very-short counter is appended, rewriting the counter
//!   cell to the literal token bytes so the entry has real bytes to point
//!   at (the cell's high bytes are zero, terminating the token).

use crate::arena::ArenaVec;
use crate::config::{PREFETCH_DISTANCE, VERY_SHORT_STRING_LENGTH};
use crate::entry::{Entry, LenLo, LongHashString};
use crate::hashes;
use crate::radix::sort_lenlos;
use crate::table::{LongTable, ShortTable};

/// Drains staged short hashes, prefetching ahead; the tail loop warms the
/// long table for the flush that follows it.
pub(crate) fn flush_short(
    staged: &[u64],
    long_peek: &[LongHashString],
    short_table: &mut ShortTable<'_>,
    long_table: &LongTable<'_>,
) {
    let n = staged.len();
    let mut i = 0;
    while i + PREFETCH_DISTANCE < n {
        short_table.prefetch(staged[i + PREFETCH_DISTANCE]);
        short_table.insert(staged[i]);
        i += 1;
    }
    let mut peek = 0;
    while i < n {
        if peek < long_peek.len() {
            long_table.prefetch(long_peek[peek].hash);
            peek += 1;
        }
        short_table.insert(staged[i]);
        i += 1;
    }
}

/// Drains staged long records, prefetching ahead.
///
/// # Safety
/// Every staged lenlo must locate a readable token of its length under
/// `base`.
pub(crate) unsafe fn flush_long(
    staged: &[LongHashString],
    table: &mut LongTable<'_>,
    base: *const u8,
) {
    let n = staged.len();
    let mut i = 0;
    while i + PREFETCH_DISTANCE < n {
        table.prefetch(staged[i + PREFETCH_DISTANCE].hash);
        let s = staged[i];
        table.insert(s.hash, s.lenlo, base.add(s.lenlo.lo() as usize));
        i += 1;
    }
    while i < n {
        let s = staged[i];
        table.insert(s.hash, s.lenlo, base.add(s.lenlo.lo() as usize));
        i += 1;
    }
}

/// Counts the boundary-straddling tokens into the same tables.
///
/// The pending list is sorted length-major (a trailing sentinel stops
/// every walk), very short tokens are counted directly, and the rest are
/// restaged through the same hashers and prefetched inserts as chunk
/// tokens. Ordering within a length run is irrelevant to the counts.
///
/// # Safety
/// Every pending lenlo must locate a readable token of its length under
/// `base`, and the staged arrays must have room for the whole list.
pub(crate) unsafe fn replay_interblock(
    interblock: &mut ArenaVec<'_, LenLo>,
    short_staged: &mut ArenaVec<'_, u64>,
    long_staged: &mut ArenaVec<'_, LongHashString>,
    very_short_counts: &mut [u32],
    short_table: &mut ShortTable<'_>,
    long_table: &mut LongTable<'_>,
    base: *const u8,
) {
    interblock.push(LenLo(!0));
    sort_lenlos(interblock.as_mut_slice());
    short_staged.clear();
    long_staged.clear();

    let list = interblock.as_slice();
    let mut i = 0usize;
    if VERY_SHORT_STRING_LENGTH > 1 {
        while list[i].len() == 1 {
            very_short_counts[*base.add(list[i].lo() as usize) as usize] += 1;
            i += 1;
        }
    }
    if VERY_SHORT_STRING_LENGTH > 2 {
        while list[i].len() == 2 {
            let b = std::ptr::read_unaligned(base.add(list[i].lo() as usize) as *const u16);
            very_short_counts[b as usize] += 1;
            i += 1;
        }
    }
    for target in VERY_SHORT_STRING_LENGTH..9 {
        while list[i].len() == target as u64 {
            short_staged.push(hashes::short_token_hash(
                base.add(list[i].lo() as usize),
                target,
            ));
            i += 1;
        }
    }
    while list[i].len() < 0xff_ffff {
        let lenlo = list[i];
        long_staged.push(LongHashString {
            hash: hashes::long_token_hash(base.add(lenlo.lo() as usize), lenlo.len() as usize),
            lenlo,
        });
        i += 1;
    }

    flush_short(
        short_staged.as_slice(),
        long_staged.as_slice(),
        short_table,
        long_table,
    );
    flush_long(long_staged.as_slice(), long_table, base);
}

/// Densifies the long table in place, folds in the short table and the
/// very-short counters. Returns the total entry count.
///
/// Afterwards `long_slots[..n]` each hold a count, four cached token
/// bytes and a packed (length, offset) key; short and very-short token
/// bytes live in the arena (the unscrambled slot, or the rewritten
/// counter cell) followed by a zero byte.
pub(crate) fn compact_tables(
    long_slots: &mut [Entry],
    long_ext: usize,
    lenlos: &[LenLo],
    short_slots: &mut [Entry],
    very_short_counts: &mut [u32],
    base: *const u8,
) -> usize {
    let mut j = 0usize;
    for i in 0..long_ext {
        let e = long_slots[i];
        long_slots[j] = Entry {
            bytes: e.bytes,
            key: lenlos[i].0,
        };
        j += (e.count() != 0) as usize;
    }

    for i in 0..short_slots.len() {
        let count = short_slots[i].count();
        let live = (count != 0) as usize;
        let key = hashes::unscramble(short_slots[i].key);
        short_slots[i].key = key;
        short_slots[i].set_count(0);
        let sp = &short_slots[i].key as *const u64 as *const u8;
        long_slots[j].set_count(count);
        // SAFETY: sp addresses the 8-byte key field we just wrote.
        unsafe { long_slots[j].set_prefix(sp) };
        let lo = (sp as usize).wrapping_sub(base as usize) as u64;
        long_slots[j].key = LenLo::pack(lo, hashes::short_key_len(key)).0;
        j += live;
    }

    if VERY_SHORT_STRING_LENGTH > 1 {
        for idx in 0..256usize {
            let count = very_short_counts[idx];
            if count != 0 {
                very_short_counts[idx] = idx as u32;
                let sp = &very_short_counts[idx] as *const u32 as *const u8;
                long_slots[j].set_count(count);
                // SAFETY: sp addresses the 4-byte counter cell, which now
                // holds the token byte followed by zeroes.
                unsafe { long_slots[j].set_prefix(sp) };
                let lo = (sp as usize).wrapping_sub(base as usize) as u64;
                long_slots[j].key = LenLo::pack(lo, 1).0;
                j += 1;
            }
        }
    }
    if VERY_SHORT_STRING_LENGTH > 2 {
        for idx in 256..65536usize {
            let count = very_short_counts[idx];
            if count != 0 {
                very_short_counts[idx] = idx as u32;
                let sp = &very_short_counts[idx] as *const u32 as *const u8;
                long_slots[j].set_count(count);
                // SAFETY: as above; two token bytes followed by zeroes.
                unsafe { long_slots[j].set_prefix(sp) };
                let lo = (sp as usize).wrapping_sub(base as usize) as u64;
                long_slots[j].key = LenLo::pack(lo, 2).0;
                j += 1;
            }
        }
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::extended_len;

    const TPOW: u32 = 8;
    const TLEN: usize = extended_len(TPOW);

    /// One contiguous backing region so all offsets fit in 40 bits.
    #[repr(C, align(8))]
    struct Backing {
        text: [u8; 64],
        short_slots: [Entry; TLEN],
        counts: [u32; 65536],
        lenlos: [LenLo; TLEN],
        long_slots: [Entry; 2 * TLEN],
    }

    impl Backing {
        fn new() -> Box<Self> {
            const ZERO_ENTRY: Entry = Entry {
                bytes: [0; 8],
                key: 0,
            };
            Box::new(Backing {
                text: [b' '; 64],
                short_slots: [ZERO_ENTRY; TLEN],
                counts: [0; 65536],
                lenlos: [LenLo(0); TLEN],
                long_slots: [ZERO_ENTRY; 2 * TLEN],
            })
        }

        fn base(&self) -> *const u8 {
            self as *const Backing as *const u8
        }

        fn put_token(&mut self, at: usize, token: &[u8]) -> LenLo {
            self.text[at..at + token.len()].copy_from_slice(token);
            let lo = (self.text.as_ptr() as usize + at) - self.base() as usize;
            LenLo::pack(lo as u64, token.len() as u64)
        }
    }

    fn decode(back: &Backing, e: &Entry) -> (u32, Vec<u8>) {
        let lo = e.lo() as usize;
        let len = e.len() as usize;
        // SAFETY: compaction only emits offsets inside the backing region.
        let bytes =
            unsafe { std::slice::from_raw_parts(back.base().add(lo), len) }.to_vec();
        (e.count(), bytes)
    }

    #[test]
    fn compact_folds_all_three_sources() {
        let mut back = Backing::new();
        let base = back.base();

        let cat = back.put_token(0, b"cat");
        let long_tok = back.put_token(8, b"preposterous");

        {
            let mut short_t = ShortTable::new(&mut back.short_slots, TPOW);
            let cat_hash =
                unsafe { hashes::short_token_hash(base.add(cat.lo() as usize), 3) };
            short_t.insert(cat_hash);
            short_t.insert(cat_hash);
        }
        {
            let mut long_t =
                LongTable::new(&mut back.long_slots[..TLEN], &mut back.lenlos, TPOW);
            let h = unsafe {
                hashes::long_token_hash(base.add(long_tok.lo() as usize), 12)
            };
            for _ in 0..3 {
                unsafe { long_t.insert(h, long_tok, base.add(long_tok.lo() as usize)) };
            }
        }
        back.counts[b'a' as usize] = 5;
        let ok = u16::from_le_bytes([b'o', b'k']) as usize;
        back.counts[ok] = 2;

        let lenlos = back.lenlos;
        let n = compact_tables(
            &mut back.long_slots,
            TLEN,
            &lenlos,
            &mut back.short_slots,
            &mut back.counts,
            base,
        );
        assert_eq!(n, 4);

        let mut got: Vec<(u32, Vec<u8>)> = back.long_slots[..n]
            .iter()
            .map(|e| decode(&back, e))
            .collect();
        got.sort();
        assert_eq!(
            got,
            vec![
                (1, b"a".to_vec()),
                (2, b"cat".to_vec()),
                (2, b"ok".to_vec()),
                (3, b"preposterous".to_vec()),
            ]
        );
    }

    #[test]
    fn compacted_short_tokens_get_zero_separators() {
        let mut back = Backing::new();
        let base = back.base();
        let tok = back.put_token(0, b"maximal8");
        {
            let mut short_t = ShortTable::new(&mut back.short_slots, TPOW);
            let h = unsafe { hashes::short_token_hash(base.add(tok.lo() as usize), 8) };
            short_t.insert(h);
        }
        let lenlos = back.lenlos;
        let n = compact_tables(
            &mut back.long_slots,
            TLEN,
            &lenlos,
            &mut back.short_slots,
            &mut back.counts,
            base,
        );
        assert_eq!(n, 1);
        let e = back.long_slots[0];
        assert_eq!(e.len(), 8);
        assert_eq!(decode(&back, &e), (1, b"maximal8".to_vec()));
        assert_eq!(&e.bytes[4..8], b"maxi");
        // Every short slot's count was zeroed, so the byte after any
        // in-table 8-byte string (the next slot's count) is zero.
        assert!(back.short_slots.iter().all(|s| s.count() == 0));
    }

    #[test]
    fn replay_counts_boundary_tokens() {
        let mut back = Backing::new();
        let base = back.base();
        let x = back.put_token(0, b"x");
        let ab = back.put_token(2, b"ab");
        let cat = back.put_token(5, b"cat");
        let long_tok = back.put_token(9, b"ponderously");

        let mut pending_buf = [LenLo(0); 16];
        let mut short_buf = [0u64; 16];
        let mut long_buf = [LongHashString {
            hash: 0,
            lenlo: LenLo(0),
        }; 16];
        let mut pending = ArenaVec::new(&mut pending_buf[..]);
        // Deliberately unsorted: the replay sorts length-major itself.
        pending.push(long_tok);
        pending.push(x);
        pending.push(cat);
        pending.push(ab);
        pending.push(cat);

        let mut short_t = ShortTable::new(&mut back.short_slots, TPOW);
        let mut long_t =
            LongTable::new(&mut back.long_slots[..TLEN], &mut back.lenlos, TPOW);
        let mut short_staged = ArenaVec::new(&mut short_buf[..]);
        let mut long_staged = ArenaVec::new(&mut long_buf[..]);
        unsafe {
            replay_interblock(
                &mut pending,
                &mut short_staged,
                &mut long_staged,
                &mut back.counts,
                &mut short_t,
                &mut long_t,
                base,
            );
        }
        drop(short_t);
        drop(long_t);

        assert_eq!(back.counts[b'x' as usize], 1);
        assert_eq!(back.counts[u16::from_le_bytes([b'a', b'b']) as usize], 1);
        let live_short: u32 = back.short_slots.iter().map(|e| e.count()).sum();
        assert_eq!(live_short, 2); // "cat" twice
        let live_long: u32 = back.long_slots[..TLEN].iter().map(|e| e.count()).sum();
        assert_eq!(live_long, 1); // "ponderously"
    }
}
