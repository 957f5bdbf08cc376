//! Per-stage wall-clock timings.
//!
//! Collection is always on (a handful of `Instant::now` calls per run);
//! whether anything is printed is the caller's decision.

use std::fmt;
use std::time::Duration;

/// Wall-clock duration of each pipeline stage.
#[derive(Debug, Default, Clone)]
pub struct StageTimings {
    /// Reservation, file overlay and buffer carving.
    pub allocate: Duration,
    /// Chunk scan, bucketing, hashing and table inserts.
    pub scan: Duration,
    /// Interblock sort and replay.
    pub interblock: Duration,
    /// Table densification and folds.
    pub compact: Duration,
    /// Count and byte radix phases.
    pub sort: Duration,
    /// Count restoration from the equal-count runs.
    pub restore: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.allocate + self.scan + self.interblock + self.compact + self.sort + self.restore
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "allocate   {:>10.3?}", self.allocate)?;
        writeln!(f, "scan       {:>10.3?}", self.scan)?;
        writeln!(f, "interblock {:>10.3?}", self.interblock)?;
        writeln!(f, "compact    {:>10.3?}", self.compact)?;
        writeln!(f, "sort       {:>10.3?}", self.sort)?;
        writeln!(f, "restore    {:>10.3?}", self.restore)?;
        write!(f, "total      {:>10.3?}", self.total())
    }
}
