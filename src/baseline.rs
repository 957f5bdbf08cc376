//! Obviously-correct reference counter.
//!
//! Maps the file read-only, splits on the three delimiters and counts
//! into a hash map. Orders of magnitude slower than the pipeline and
//! used only to check it: by the CLI's `--verify` flag and by the test
//! suite as the model implementation.

use std::fs::File;
use std::io;
use std::path::Path;

use ahash::AHashMap;
use memchr::memchr3;
use memmap2::Mmap;

/// Counts tokens in `path`, sorted by (count desc, bytes asc).
pub fn count_tokens(path: &Path) -> io::Result<Vec<(u32, Vec<u8>)>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        // Zero-length mappings are rejected on some platforms.
        return Ok(Vec::new());
    }
    // SAFETY: read-only private mapping; the file may be concurrently
    // modified only by the caller's own doing.
    let map = unsafe { Mmap::map(&file)? };
    Ok(count_bytes(&map))
}

/// Counts tokens in a byte slice, sorted by (count desc, bytes asc).
pub fn count_bytes(data: &[u8]) -> Vec<(u32, Vec<u8>)> {
    let mut counts: AHashMap<&[u8], u32> = AHashMap::new();
    let mut pos = 0usize;
    while pos < data.len() {
        match memchr3(b' ', b'\t', b'\n', &data[pos..]) {
            Some(0) => pos += 1,
            Some(d) => {
                *counts.entry(&data[pos..pos + d]).or_insert(0) += 1;
                pos += d + 1;
            }
            None => {
                *counts.entry(&data[pos..]).or_insert(0) += 1;
                break;
            }
        }
    }
    let mut out: Vec<(u32, Vec<u8>)> = counts
        .into_iter()
        .map(|(token, count)| (count, token.to_vec()))
        .collect();
    out.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    out
}
