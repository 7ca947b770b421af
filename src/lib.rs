//! Spaced-repetition review scheduling for vocabulary learners.
//!
//! [`Scheduler`] is the entry point: it builds review sessions, records
//! recall ratings through the [`ease`] model and persists the result through
//! a [`ProgressStore`]. [`Database`] provides SQLite-backed storage.

pub mod config;
pub mod db;
pub mod ease;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod store;

pub use config::{Config, SchedulerConfig};
pub use db::Database;
pub use error::{Error, Result};
pub use models::{
    IntervalPreview, MasteryDistribution, MasteryLevel, Quality, ReviewProgress, UpdatedProgress,
    VocabularyItem,
};
pub use scheduler::Scheduler;
pub use session::{ReviewSession, SessionBuilder};
pub use store::{Catalog, ProgressStore};
