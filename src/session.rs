//! Review session selection.
//!
//! Due items come first, most overdue first, ties broken by item id. Any
//! room left is filled with never-seen items in item id order. Nothing is
//! random, so the same stored state, `as_of` and size always give the same
//! session.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::ProgressStore;

/// Snapshot of the items chosen for one session.
///
/// Consumed once, in order. Progress written while the session is running
/// does not reorder it.
#[derive(Debug)]
pub struct ReviewSession {
    learner_id: String,
    as_of: DateTime<Utc>,
    due_count: usize,
    new_count: usize,
    items: std::vec::IntoIter<String>,
}

impl ReviewSession {
    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// How many of the selected items were due reviews.
    pub fn due_count(&self) -> usize {
        self.due_count
    }

    /// How many of the selected items are first exposures.
    pub fn new_count(&self) -> usize {
        self.new_count
    }
}

impl Iterator for ReviewSession {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for ReviewSession {}

pub struct SessionBuilder<'a, S: ?Sized> {
    store: &'a S,
    max_new_items: Option<usize>,
}

impl<'a, S: ProgressStore + ?Sized> SessionBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            max_new_items: None,
        }
    }

    /// Caps how many never-seen items one session may introduce.
    pub fn with_new_item_limit(mut self, limit: Option<usize>) -> Self {
        self.max_new_items = limit;
        self
    }

    pub fn build_session(&self, learner_id: &str, max_size: i64, as_of: DateTime<Utc>) -> Result<ReviewSession> {
        if max_size < 1 {
            return Err(Error::InvalidSessionSize {
                learner_id: learner_id.to_string(),
                size: max_size,
            });
        }
        let max_size = usize::try_from(max_size).unwrap_or(usize::MAX);

        let mut items = self.store.due_items(learner_id, as_of)?;
        items.truncate(max_size);
        let due_count = items.len();

        let room = max_size - due_count;
        let new_limit = match self.max_new_items {
            Some(cap) => room.min(cap),
            None => room,
        };
        if new_limit > 0 {
            items.extend(self.store.unexposed_items(learner_id, new_limit)?);
        }
        let new_count = items.len() - due_count;

        debug!(learner_id, max_size, due_count, new_count, "built review session");

        Ok(ReviewSession {
            learner_id: learner_id.to_string(),
            as_of,
            due_count,
            new_count,
            items: items.into_iter(),
        })
    }
}
