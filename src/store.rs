//! Storage seams used by the scheduler and session builder.
//!
//! `Database` implements both traits over SQLite; tests wrap it to inject
//! failures.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{MasteryDistribution, ReviewProgress, VocabularyItem};

/// Owns per-(learner, item) review state.
pub trait ProgressStore {
    /// Returns the existing row or creates the default one.
    ///
    /// Must be idempotent: concurrent first exposures of the same pair never
    /// produce two rows.
    fn get_or_create(&self, learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Result<ReviewProgress>;

    fn get_progress(&self, learner_id: &str, item_id: &str) -> Result<Option<ReviewProgress>>;

    /// Exposed items with `next_review_at <= as_of`, ordered by
    /// `next_review_at` then item id.
    fn due_items(&self, learner_id: &str, as_of: DateTime<Utc>) -> Result<Vec<String>>;

    /// Atomically replaces the row.
    ///
    /// `new_state.version` must be the version that was read. Fails with
    /// `ConcurrentModification` if the stored row has moved on since. On
    /// success the stored version is incremented and the committed row
    /// returned.
    fn apply_update(&self, learner_id: &str, item_id: &str, new_state: &ReviewProgress) -> Result<ReviewProgress>;

    fn mastery_distribution(&self, learner_id: &str) -> Result<MasteryDistribution>;

    /// Catalog items the learner has never been exposed to, by item id,
    /// at most `limit` of them.
    fn unexposed_items(&self, learner_id: &str, limit: usize) -> Result<Vec<String>>;
}

/// Read access to immutable vocabulary content.
pub trait Catalog {
    fn get_item(&self, item_id: &str) -> Result<Option<VocabularyItem>>;

    fn contains_item(&self, item_id: &str) -> Result<bool> {
        Ok(self.get_item(item_id)?.is_some())
    }
}
