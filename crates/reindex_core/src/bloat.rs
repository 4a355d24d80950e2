//! Before/after storage accounting.

use serde::Serialize;
use std::fmt;

/// Sizes of an index before and after its rebuild, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeSample {
    /// Size of the original index.
    pub before: u64,
    /// Size of the rebuilt index.
    pub after: u64,
}

impl SizeSample {
    /// Summary line for this sample.
    pub fn summary(&self) -> BloatSummary {
        BloatSummary {
            size_before: self.before,
            size_after: self.after,
        }
    }
}

/// Sums of all successful swaps in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Sum of original sizes.
    pub size_before_sum: u64,
    /// Sum of rebuilt sizes.
    pub size_after_sum: u64,
}

impl RunTotals {
    /// Adds one swapped index.
    pub fn record(&mut self, sample: SizeSample) {
        self.size_before_sum += sample.before;
        self.size_after_sum += sample.after;
    }

    /// Summary line for the whole run.
    pub fn summary(&self) -> BloatSummary {
        BloatSummary {
            size_before: self.size_before_sum,
            size_after: self.size_after_sum,
        }
    }
}

/// Size change rendered as
/// `(before -> after) := change% | storage size usage reduced by diff to remaining%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BloatSummary {
    /// Size before.
    pub size_before: u64,
    /// Size after.
    pub size_after: u64,
}

impl BloatSummary {
    /// How much larger the old index was than the new one, in percent
    /// (zero when the new size is zero).
    pub fn percent_change(&self) -> f64 {
        if self.size_after == 0 {
            0.0
        } else {
            100.0 * (self.size_before as f64 / self.size_after as f64 - 1.0)
        }
    }

    /// New size as a percentage of the old (100 when the old size is zero).
    pub fn percent_remaining(&self) -> f64 {
        if self.size_before == 0 {
            100.0
        } else {
            100.0 * (self.size_after as f64 / self.size_before as f64)
        }
    }

    /// Bytes reclaimed; negative if the rebuild grew.
    pub fn reduced_by(&self) -> i128 {
        i128::from(self.size_before) - i128::from(self.size_after)
    }
}

impl fmt::Display for BloatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} -> {}) := {:5.2}% | storage size usage reduced by {} to {:5.2}%",
            format_size(i128::from(self.size_before)),
            format_size(i128::from(self.size_after)),
            self.percent_change(),
            format_size(self.reduced_by()),
            self.percent_remaining()
        )
    }
}

/// Formats a byte count with binary units (`0 bytes`, `1 byte`, `1.5 KiB`).
pub fn format_size(bytes: i128) -> String {
    const UNITS: [&str; 6] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();
    if magnitude < 1024 {
        let unit = if magnitude == 1 { "byte" } else { "bytes" };
        return format!("{}{} {}", sign, magnitude, unit);
    }

    let mut value = magnitude as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{}{} {}", sign, trimmed, UNITS[unit])
}
