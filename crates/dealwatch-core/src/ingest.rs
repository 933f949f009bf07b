use serde::{Deserialize, Serialize};

use crate::deals::ValidationError;

/// Counters for one ingest run. Every record the run touched lands in exactly
/// one of `invalid`, `filtered`, `new`, or `seen`, except records left
/// unprocessed after a storage failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub found: i32,
    pub invalid: i32,
    pub filtered: i32,
    pub new: i32,
    pub seen: i32,
    pub posted: i32,
    pub premium_posted: i32,
    pub notify_failures: i32,
}

impl IngestSummary {
    /// Counts a record rejected by the normalizer.
    pub fn record_rejection(&mut self, err: &ValidationError) {
        if err.is_below_threshold() {
            self.filtered = self.filtered.saturating_add(1);
        } else {
            self.invalid = self.invalid.saturating_add(1);
        }
    }

    /// Records not yet accounted for; non-zero only when a run was aborted.
    #[must_use]
    pub fn unprocessed(&self) -> i32 {
        let handled = self
            .invalid
            .saturating_add(self.filtered)
            .saturating_add(self.new)
            .saturating_add(self.seen);
        (self.found - handled).max(0)
    }

    /// Adds another summary's counters into this one.
    pub fn absorb(&mut self, other: &IngestSummary) {
        self.found = self.found.saturating_add(other.found);
        self.invalid = self.invalid.saturating_add(other.invalid);
        self.filtered = self.filtered.saturating_add(other.filtered);
        self.new = self.new.saturating_add(other.new);
        self.seen = self.seen.saturating_add(other.seen);
        self.posted = self.posted.saturating_add(other.posted);
        self.premium_posted = self.premium_posted.saturating_add(other.premium_posted);
        self.notify_failures = self.notify_failures.saturating_add(other.notify_failures);
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn rejection_splits_filtered_from_invalid() {
        let mut summary = IngestSummary::default();
        summary.record_rejection(&ValidationError::EmptyMerchant);
        summary.record_rejection(&ValidationError::BelowMinimumDiscount {
            discount_percent: Decimal::from(10),
            minimum: Decimal::from(15),
        });
        summary.record_rejection(&ValidationError::BelowMinimumDiscount {
            discount_percent: Decimal::from(3),
            minimum: Decimal::from(15),
        });
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.filtered, 2);
    }

    #[test]
    fn unprocessed_counts_records_left_after_abort() {
        let summary = IngestSummary {
            found: 10,
            invalid: 1,
            filtered: 2,
            new: 3,
            seen: 1,
            ..IngestSummary::default()
        };
        assert_eq!(summary.unprocessed(), 3);
    }

    #[test]
    fn absorb_adds_every_counter() {
        let mut total = IngestSummary {
            found: 2,
            new: 1,
            posted: 1,
            ..IngestSummary::default()
        };
        total.absorb(&IngestSummary {
            found: 3,
            seen: 2,
            notify_failures: 1,
            premium_posted: 1,
            ..IngestSummary::default()
        });
        assert_eq!(total.found, 5);
        assert_eq!(total.new, 1);
        assert_eq!(total.seen, 2);
        assert_eq!(total.posted, 1);
        assert_eq!(total.premium_posted, 1);
        assert_eq!(total.notify_failures, 1);
    }
}
