//! Token frequency counting at memory-bandwidth speed.
//!
//! Counts every whitespace-delimited token in a UTF-8 file and returns
//! the (count, token) pairs ordered by count descending, ties by byte
//! sequence ascending. The problem is trivial; the engine is not:
//!
//! - One virtual reservation holds the copy-on-write file mapping, its
//!   space padding and a bump-allocated scratch arena (hugepages when
//!   available).
//! - 64-byte vector scans produce whitespace bitmasks; token boundaries
//!   fall out of edge detection across window and chunk borders.
//! - Tokens are hashed by length class: direct-index counters (1-2 B), a
//!   bijective multiplicative scramble of the packed bytes (3-8 B), and
//!   wyhash (9+ B).
//! - Two open-addressed Robin-Hood tables count occurrences, fed from
//!   staged hash arrays with software prefetch ahead of the insert
//!   cursor.
//! - A merge pass folds both tables and the direct counters into one
//!   dense entry array; an MSD radix sort orders it by count then bytes,
//!   remounting cached key bytes from the mapping as it goes deeper.
//!
//! Everything is single-threaded and runs to completion; the returned
//! [`WordCounts`] owns all memory the entries reference.
//!
//! ```no_run
//! let counts = wordfreq_rs::wordcount(std::path::Path::new("corpus.txt"))?;
//! for (count, token) in counts.iter().take(10) {
//!     println!("{count}\t{}", String::from_utf8_lossy(token));
//! }
//! # Ok::<(), wordfreq_rs::WordCountError>(())
//! ```

#[cfg(not(unix))]
compile_error!("wordfreq-rs needs a Unix virtual-memory layout (mmap)");

#[cfg(target_endian = "big")]
compile_error!("packed key loads and prefix caching assume little-endian");

#[cfg(not(target_pointer_width = "64"))]
compile_error!("the reservation layout needs a 64-bit address space");

pub mod arena;
pub mod baseline;
pub mod buckets;
pub mod config;
pub mod entry;
pub mod errors;
pub mod hashes;
mod merge;
pub mod pipeline;
pub mod radix;
pub mod scan;
pub mod stats;
pub mod table;

pub use entry::CountCount;
pub use errors::WordCountError;
pub use pipeline::{wordcount, WordCounts};
pub use stats::StageTimings;
