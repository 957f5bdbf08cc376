//! Length-stratified token hashing.
//!
//! Tokens of 3..=8 bytes are loaded as one word, masked to their length
//! and multiplied by a fixed odd constant. Odd multiplication is a
//! bijection on 2^64, so equal hashes imply equal keys and the compactor
//! can recover the original bytes by multiplying with the inverse.
//!
//! Tokens of 9+ bytes use wyhash with a fixed seed; the pipeline relies on
//! the 64-bit hash being collision-free at realistic cardinalities and
//! performs no byte-equality check.

/// Odd multiplier scrambling packed short keys.
pub const SCRAMBLE: u64 = 0x517cc1b727220a95;

/// Multiplicative inverse of [`SCRAMBLE`] mod 2^64.
pub const UNSCRAMBLE: u64 = 0x2040003d780970bd;

/// Seed for the 9+-byte string hash.
pub const LONG_HASH_SEED: u64 = 0;

#[inline(always)]
pub fn scramble(packed: u64) -> u64 {
    packed.wrapping_mul(SCRAMBLE)
}

#[inline(always)]
pub fn unscramble(hash: u64) -> u64 {
    hash.wrapping_mul(UNSCRAMBLE)
}

/// Keeps the low `len` bytes of a packed little-endian load.
#[inline(always)]
pub fn len_mask(len: usize) -> u64 {
    debug_assert!((1..=8).contains(&len));
    !0u64 >> (64 - 8 * len)
}

/// Unaligned 8-byte little-endian load.
///
/// # Safety
/// `p..p + 8` must be readable. Token starts always are: the file region
/// is padded and followed by the arena.
#[inline(always)]
pub unsafe fn load_u64(p: *const u8) -> u64 {
    std::ptr::read_unaligned(p as *const u64)
}

/// Hash of a token of 3..=8 bytes starting at `p`.
///
/// # Safety
/// As [`load_u64`].
#[inline(always)]
pub unsafe fn short_token_hash(p: *const u8, len: usize) -> u64 {
    scramble(load_u64(p) & len_mask(len))
}

/// Hash of a token of 9+ bytes.
///
/// # Safety
/// `p..p + len` must be readable.
#[inline(always)]
pub unsafe fn long_token_hash(p: *const u8, len: usize) -> u64 {
    wyhash::wyhash(std::slice::from_raw_parts(p, len), LONG_HASH_SEED)
}

/// Length of an unscrambled short key: 8 minus its leading zero bytes.
/// The key's top byte is nonzero for any token of its length, so flooring
/// the bit count is exact.
#[inline(always)]
pub fn short_key_len(unscrambled: u64) -> u64 {
    8 - (unscrambled.leading_zeros() as u64) / 8
}
