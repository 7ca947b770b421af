use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ease factor assigned to a row on first exposure.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// Interval assigned to a row on first exposure.
pub const INITIAL_INTERVAL_DAYS: u32 = 1;

/// Last calendar year a schedule may land in. Stored timestamps use a
/// four-digit year.
pub const MAX_SCHEDULE_YEAR: i32 = 9999;

/// Whether `ts` can be persisted and compared as stored text.
pub fn is_schedulable(ts: DateTime<Utc>) -> bool {
    (0..=MAX_SCHEDULE_YEAR).contains(&ts.year())
}

/// Immutable catalog content. Owned by ingestion; the scheduler only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub id: String,
    pub word: String,
    pub translation: String,
    pub part_of_speech: String,
    pub example_sentence: String,
    pub pronunciation: String,
    /// 1 = easy, 5 = hard
    pub difficulty: u8,
    /// Lower = more common
    pub frequency_rank: u32,
    pub language_code: String,
}

impl VocabularyItem {
    pub fn new(id: impl Into<String>, word: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            word: word.into(),
            translation: translation.into(),
            part_of_speech: String::new(),
            example_sentence: String::new(),
            pronunciation: String::new(),
            difficulty: 1,
            frequency_rank: 1000,
            language_code: "it".to_string(),
        }
    }
}

/// A learner's self-reported recall rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    /// Ratings at or above this count as a successful recall.
    pub const PASS_THRESHOLD: u8 = 3;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Quality(value as u8))
        } else {
            None
        }
    }

    /// Like [`Quality::new`], but reports the rejected rating with the
    /// learner and item it was submitted for.
    pub fn validate(learner_id: &str, item_id: &str, value: i64) -> Result<Self> {
        Self::new(value).ok_or_else(|| Error::InvalidQuality {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            quality: value,
        })
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= Self::PASS_THRESHOLD
    }

    pub fn all() -> impl Iterator<Item = Quality> {
        (Self::MIN..=Self::MAX).map(Quality)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl MasteryLevel {
    pub const ALL: [MasteryLevel; 4] = [
        MasteryLevel::New,
        MasteryLevel::Learning,
        MasteryLevel::Reviewing,
        MasteryLevel::Mastered,
    ];

    const REVIEWING_MIN_REPETITIONS: u32 = 3;
    const MASTERED_MIN_REPETITIONS: u32 = 7;
    const MASTERED_MIN_INTERVAL_DAYS: u32 = 21;

    /// Derives the level from the inputs that justify it.
    ///
    /// A row that has never been reviewed is `New`. Once reviewed, zero
    /// repetitions (a lapse) is `Learning`, so mastery never sticks across a
    /// failed recall.
    pub fn classify(repetitions: u32, interval_days: u32, reviewed: bool) -> Self {
        if !reviewed {
            MasteryLevel::New
        } else if repetitions >= Self::MASTERED_MIN_REPETITIONS
            || interval_days >= Self::MASTERED_MIN_INTERVAL_DAYS
        {
            MasteryLevel::Mastered
        } else if repetitions >= Self::REVIEWING_MIN_REPETITIONS {
            MasteryLevel::Reviewing
        } else {
            MasteryLevel::Learning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryLevel::New => "new",
            MasteryLevel::Learning => "learning",
            MasteryLevel::Reviewing => "reviewing",
            MasteryLevel::Mastered => "mastered",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MasteryLevel::New => "New",
            MasteryLevel::Learning => "Learning",
            MasteryLevel::Reviewing => "Reviewing",
            MasteryLevel::Mastered => "Mastered",
        }
    }
}

/// Per-(learner, item) schedule state.
///
/// `version` is bumped by every committed update and is what the store checks
/// for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewProgress {
    pub learner_id: String,
    pub item_id: String,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
    pub next_review_at: DateTime<Utc>,
    pub last_review_at: Option<DateTime<Utc>>,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub avg_response_ms: Option<f64>,
    pub version: i64,
}

impl ReviewProgress {
    /// Default state for a first exposure. Due immediately.
    pub fn new(learner_id: impl Into<String>, item_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.into(),
            item_id: item_id.into(),
            interval_days: INITIAL_INTERVAL_DAYS,
            ease_factor: INITIAL_EASE_FACTOR,
            repetitions: 0,
            next_review_at: now,
            last_review_at: None,
            total_reviews: 0,
            correct_reviews: 0,
            avg_response_ms: None,
            version: 0,
        }
    }

    pub fn mastery_level(&self) -> MasteryLevel {
        MasteryLevel::classify(
            self.repetitions,
            self.interval_days,
            self.last_review_at.is_some(),
        )
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_reviews == 0 {
            0.0
        } else {
            (self.correct_reviews as f64 / self.total_reviews as f64) * 100.0
        }
    }
}

/// What a response hands back to the review UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedProgress {
    #[serde(flatten)]
    pub progress: ReviewProgress,
    pub quality: u8,
    pub mastery_level: MasteryLevel,
    pub previous_mastery_level: MasteryLevel,
}

impl UpdatedProgress {
    pub fn new(progress: ReviewProgress, quality: Quality, previous: MasteryLevel) -> Self {
        let mastery_level = progress.mastery_level();
        Self {
            progress,
            quality: quality.value(),
            mastery_level,
            previous_mastery_level: previous,
        }
    }
}

/// Interval/ease a given rating would produce, without committing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalPreview {
    pub quality: u8,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub mastery_level: MasteryLevel,
}

/// Row counts per mastery level. Every level is present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MasteryDistribution {
    counts: BTreeMap<MasteryLevel, u64>,
}

impl MasteryDistribution {
    pub fn from_levels(levels: impl IntoIterator<Item = MasteryLevel>) -> Self {
        let mut counts: BTreeMap<MasteryLevel, u64> =
            MasteryLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for level in levels {
            *counts.entry(level).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn get(&self, level: MasteryLevel) -> u64 {
        self.counts.get(&level).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MasteryLevel, u64)> + '_ {
        self.counts.iter().map(|(level, count)| (*level, *count))
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
