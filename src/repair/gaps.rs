use chrono::NaiveDateTime;
use std::fmt;

/// Silence longer than this between two consecutive records is a gap
pub const GAP_THRESHOLD_SECS: i64 = 60;

/// Interval between two consecutive records that exceeds the gap threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Gap {
    /// Strictly inside, so records sitting on a gap boundary are never recovered twice
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start < at && at < self.end
    }

    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}s)",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S"),
            self.seconds()
        )
    }
}

/// Gaps between consecutive times of an ascending sequence
pub fn detect_gaps(sorted: &[NaiveDateTime], threshold_secs: i64) -> Vec<Gap> {
    sorted
        .windows(2)
        .filter(|pair| (pair[1] - pair[0]).num_seconds() > threshold_secs)
        .map(|pair| Gap {
            start: pair[0],
            end: pair[1],
        })
        .collect()
}
