use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid quality {quality} for item '{item_id}' (learner '{learner_id}'): must be 1-5")]
    InvalidQuality {
        learner_id: String,
        item_id: String,
        quality: i64,
    },

    #[error("invalid session size {size} for learner '{learner_id}': must be at least 1")]
    InvalidSessionSize { learner_id: String, size: i64 },

    /// Row changed between read and write. Retried by the scheduler, never surfaced by it.
    #[error("progress for item '{item_id}' (learner '{learner_id}') was modified concurrently")]
    ConcurrentModification { learner_id: String, item_id: String },

    #[error(
        "gave up updating item '{item_id}' (learner '{learner_id}') after {attempts} attempts; re-fetch and resubmit"
    )]
    UpdateConflict {
        learner_id: String,
        item_id: String,
        attempts: u32,
    },

    #[error(
        "schedule for item '{item_id}' (learner '{learner_id}') falls outside years 0000-9999; nothing was written"
    )]
    ScheduleOutOfRange { learner_id: String, item_id: String },

    #[error("item '{item_id}' not found in catalog (learner '{learner_id}')")]
    ItemNotFound { learner_id: String, item_id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification { .. })
    }
}
