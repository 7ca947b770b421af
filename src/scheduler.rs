use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::ease;
use crate::error::{Error, Result};
use crate::models::{
    is_schedulable, IntervalPreview, MasteryDistribution, MasteryLevel, Quality, ReviewProgress,
    UpdatedProgress,
};
use crate::session::{ReviewSession, SessionBuilder};
use crate::store::{Catalog, ProgressStore};

/// Entry point for the review engine.
///
/// Every call takes its notion of "now" from the caller; nothing in here
/// reads the system clock.
pub struct Scheduler<S> {
    store: S,
    config: SchedulerConfig,
}

impl<S: ProgressStore + Catalog> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SchedulerConfig::default())
    }

    pub fn with_config(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn build_session(&self, learner_id: &str, max_size: i64, as_of: DateTime<Utc>) -> Result<ReviewSession> {
        SessionBuilder::new(&self.store)
            .with_new_item_limit(self.config.max_new_items)
            .build_session(learner_id, max_size, as_of)
    }

    pub fn due_items(&self, learner_id: &str, as_of: DateTime<Utc>) -> Result<Vec<String>> {
        self.store.due_items(learner_id, as_of)
    }

    pub fn mastery_distribution(&self, learner_id: &str) -> Result<MasteryDistribution> {
        self.store.mastery_distribution(learner_id)
    }

    /// Records one recall rating and reschedules the item.
    ///
    /// Exactly one progress row is written. Optimistic-concurrency conflicts
    /// are retried up to `max_update_attempts` times before surfacing as
    /// `UpdateConflict`.
    pub fn submit_response(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: i64,
        response_time: Option<StdDuration>,
        now: DateTime<Utc>,
    ) -> Result<UpdatedProgress> {
        let quality = Quality::validate(learner_id, item_id, quality)?;

        if !self.store.contains_item(item_id)? {
            return Err(Error::ItemNotFound {
                learner_id: learner_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let attempts = self.config.max_update_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_submit(learner_id, item_id, quality, response_time, now) {
                Err(e) if e.is_retryable() => {
                    warn!(learner_id, item_id, attempt, "progress changed underneath update, retrying");
                }
                result => return result,
            }
        }

        warn!(learner_id, item_id, attempts, "giving up on contended progress update");
        Err(Error::UpdateConflict {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            attempts,
        })
    }

    fn try_submit(
        &self,
        learner_id: &str,
        item_id: &str,
        quality: Quality,
        response_time: Option<StdDuration>,
        now: DateTime<Utc>,
    ) -> Result<UpdatedProgress> {
        let current = self.store.get_or_create(learner_id, item_id, now)?;
        let previous = current.mastery_level();
        let next = reschedule(&current, quality, response_time, now)?;

        let committed = self.store.apply_update(learner_id, item_id, &next)?;
        let updated = UpdatedProgress::new(committed, quality, previous);

        info!(
            learner_id,
            item_id,
            quality = quality.value(),
            interval_days = updated.progress.interval_days,
            ease_factor = updated.progress.ease_factor,
            mastery = updated.mastery_level.as_str(),
            "recorded review response"
        );
        Ok(updated)
    }

    /// What each rating would do to the item right now. Writes nothing.
    pub fn preview(&self, learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Result<Vec<IntervalPreview>> {
        if !self.store.contains_item(item_id)? {
            return Err(Error::ItemNotFound {
                learner_id: learner_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let current = match self.store.get_progress(learner_id, item_id)? {
            Some(progress) => progress,
            None => ReviewProgress::new(learner_id, item_id, now),
        };
        debug!(learner_id, item_id, "previewing intervals");

        Ok(Quality::all()
            .map(|quality| {
                let outcome = ease::apply(&current, quality);
                IntervalPreview {
                    quality: quality.value(),
                    interval_days: outcome.interval_days,
                    ease_factor: outcome.ease_factor,
                    mastery_level: MasteryLevel::classify(outcome.repetitions, outcome.interval_days, true),
                }
            })
            .collect())
    }
}

/// Next row state for a response. Keeps `version` so the store can detect
/// a concurrent writer.
fn reschedule(
    current: &ReviewProgress,
    quality: Quality,
    response_time: Option<StdDuration>,
    now: DateTime<Utc>,
) -> Result<ReviewProgress> {
    let outcome = ease::apply(current, quality);
    let next_review_at = now
        .checked_add_signed(Duration::days(i64::from(outcome.interval_days)))
        .filter(|ts| is_schedulable(*ts))
        .ok_or_else(|| Error::ScheduleOutOfRange {
            learner_id: current.learner_id.clone(),
            item_id: current.item_id.clone(),
        })?;
    let total_reviews = current.total_reviews.saturating_add(1);

    let avg_response_ms = match (response_time, current.avg_response_ms) {
        (Some(rt), Some(avg)) => {
            let ms = rt.as_secs_f64() * 1000.0;
            Some(avg + (ms - avg) / total_reviews as f64)
        }
        (Some(rt), None) => Some(rt.as_secs_f64() * 1000.0),
        (None, avg) => avg,
    };

    Ok(ReviewProgress {
        interval_days: outcome.interval_days,
        ease_factor: outcome.ease_factor,
        repetitions: outcome.repetitions,
        next_review_at,
        last_review_at: Some(now),
        total_reviews,
        correct_reviews: current.correct_reviews + u32::from(quality.is_success()),
        avg_response_ms,
        ..current.clone()
    })
}
