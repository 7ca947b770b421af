//! Ease model: maps a recall rating onto the next interval and ease factor.
//!
//! Ratings (1-5):
//! - 1-2: lapse. Repetitions reset, interval back to one day, ease drops by 0.2.
//! - 3-5: success. Repetitions grow, ease rises by 0.1, interval grows.
//!
//! On the first success after a lapse (or from a fresh row) the interval
//! doubles. Later successes multiply it by the current ease factor.
//! The ease floor of 1.3 is applied after every update.

use crate::models::{Quality, ReviewProgress};

/// Ease factor never goes below this.
pub const MIN_EASE_FACTOR: f64 = 1.3;

pub const SUCCESS_EASE_BONUS: f64 = 0.1;
pub const LAPSE_EASE_PENALTY: f64 = 0.2;

/// Upper bound on a single interval (about a century).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EaseOutcome {
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
}

/// Next schedule for `current`. Raw ratings go through [`Quality::validate`]
/// first, so an out-of-range rating never reaches the model.
pub fn apply(current: &ReviewProgress, quality: Quality) -> EaseOutcome {
    next(
        current.interval_days,
        current.ease_factor,
        current.repetitions,
        quality,
    )
}

pub fn next(interval_days: u32, ease_factor: f64, repetitions: u32, quality: Quality) -> EaseOutcome {
    if !quality.is_success() {
        return EaseOutcome {
            interval_days: 1,
            ease_factor: floor_ease(ease_factor - LAPSE_EASE_PENALTY),
            repetitions: 0,
        };
    }

    let repetitions = repetitions.saturating_add(1);
    let interval_days = if repetitions <= 1 {
        interval_days.saturating_mul(2)
    } else {
        (interval_days as f64 * ease_factor).round() as u32
    };

    EaseOutcome {
        interval_days: interval_days.clamp(1, MAX_INTERVAL_DAYS),
        ease_factor: floor_ease(ease_factor + SUCCESS_EASE_BONUS),
        repetitions,
    }
}

fn floor_ease(ease_factor: f64) -> f64 {
    ease_factor.max(MIN_EASE_FACTOR)
}
