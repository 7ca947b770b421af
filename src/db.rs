use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    is_schedulable, MasteryDistribution, MasteryLevel, ReviewProgress, VocabularyItem, MAX_SCHEDULE_YEAR,
};
use crate::store::{Catalog, ProgressStore};

/// SQLite-backed catalog and progress store.
///
/// The connection sits behind a mutex so one `Database` can serve
/// concurrent requests; the row `version` column is what serializes
/// writers to the same (learner, item).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    pub fn init(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vocabulary (
                id TEXT PRIMARY KEY,
                word TEXT NOT NULL,
                translation TEXT NOT NULL,
                part_of_speech TEXT NOT NULL DEFAULT '',
                example_sentence TEXT NOT NULL DEFAULT '',
                pronunciation TEXT NOT NULL DEFAULT '',
                difficulty INTEGER NOT NULL DEFAULT 1 CHECK(difficulty BETWEEN 1 AND 5),
                frequency_rank INTEGER NOT NULL DEFAULT 1000,
                language_code TEXT NOT NULL DEFAULT 'it',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- One row per (learner, item). mastery is derived, never stored.
            CREATE TABLE IF NOT EXISTS review_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                interval_days INTEGER NOT NULL CHECK(interval_days >= 0),
                ease_factor REAL NOT NULL CHECK(ease_factor >= 1.3),
                repetitions INTEGER NOT NULL CHECK(repetitions >= 0),
                next_review_at TEXT NOT NULL,
                last_review_at TEXT,
                total_reviews INTEGER NOT NULL DEFAULT 0,
                correct_reviews INTEGER NOT NULL DEFAULT 0,
                avg_response_ms REAL,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(learner_id, item_id),
                FOREIGN KEY (item_id) REFERENCES vocabulary(id)
            );

            CREATE INDEX IF NOT EXISTS idx_progress_learner_due ON review_progress(learner_id, next_review_at);
            CREATE INDEX IF NOT EXISTS idx_vocabulary_language ON vocabulary(language_code);
            "#,
        )?;

        Ok(())
    }

    // Catalog operations
    pub fn add_item(&self, item: &VocabularyItem) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO vocabulary
                (id, word, translation, part_of_speech, example_sentence, pronunciation,
                 difficulty, frequency_rank, language_code)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                item.id,
                item.word,
                item.translation,
                item.part_of_speech,
                item.example_sentence,
                item.pronunciation,
                item.difficulty,
                item.frequency_rank,
                item.language_code
            ],
        )?;
        Ok(())
    }

    pub fn list_items(&self, language_filter: Option<&str>) -> Result<Vec<VocabularyItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, word, translation, part_of_speech, example_sentence, pronunciation,
                   difficulty, frequency_rank, language_code
            FROM vocabulary
            WHERE ?1 IS NULL OR language_code = ?1
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![language_filter], item_from_row)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Every progress row the learner owns, by item id.
    pub fn list_progress(&self, learner_id: &str) -> Result<Vec<ReviewProgress>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM review_progress WHERE learner_id = ?1 ORDER BY item_id ASC"
        ))?;
        let rows = stmt.query_map(params![learner_id], progress_from_row)?;
        let progress = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(progress)
    }
}

const PROGRESS_COLUMNS: &str = "learner_id, item_id, interval_days, ease_factor, repetitions, \
     next_review_at, last_review_at, total_reviews, correct_reviews, avg_response_ms, version";

impl Catalog for Database {
    fn get_item(&self, item_id: &str) -> Result<Option<VocabularyItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                r#"
                SELECT id, word, translation, part_of_speech, example_sentence, pronunciation,
                       difficulty, frequency_rank, language_code
                FROM vocabulary
                WHERE id = ?1
                "#,
                params![item_id],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }
}

impl ProgressStore for Database {
    fn get_or_create(&self, learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Result<ReviewProgress> {
        let fresh = ReviewProgress::new(learner_id, item_id, now);
        let next_review_at = format_ts(fresh.next_review_at)
            .ok_or_else(|| out_of_range(learner_id, item_id))?;
        let conn = self.conn()?;

        // The unique key makes a racing second insert a no-op.
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO review_progress
                (learner_id, item_id, interval_days, ease_factor, repetitions, next_review_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                learner_id,
                item_id,
                fresh.interval_days,
                fresh.ease_factor,
                fresh.repetitions,
                next_review_at
            ],
        )?;
        if inserted > 0 {
            debug!(learner_id, item_id, "created progress on first exposure");
        }

        let progress = conn.query_row(
            &format!(
                "SELECT {PROGRESS_COLUMNS} FROM review_progress WHERE learner_id = ?1 AND item_id = ?2"
            ),
            params![learner_id, item_id],
            progress_from_row,
        )?;
        Ok(progress)
    }

    fn get_progress(&self, learner_id: &str, item_id: &str) -> Result<Option<ReviewProgress>> {
        let conn = self.conn()?;
        let progress = conn
            .query_row(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM review_progress WHERE learner_id = ?1 AND item_id = ?2"
                ),
                params![learner_id, item_id],
                progress_from_row,
            )
            .optional()?;
        Ok(progress)
    }

    fn due_items(&self, learner_id: &str, as_of: DateTime<Utc>) -> Result<Vec<String>> {
        // Stored rows never leave the four-digit-year range, so a bound past
        // it matches everything and one before it matches nothing.
        let bound = match format_ts(as_of) {
            Some(ts) => ts,
            None if as_of.year() > MAX_SCHEDULE_YEAR => LATEST_TS.to_string(),
            None => return Ok(Vec::new()),
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id
            FROM review_progress
            WHERE learner_id = ?1 AND next_review_at <= ?2
            ORDER BY next_review_at ASC, item_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![learner_id, bound], |row| row.get(0))?;
        let items = rows.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(items)
    }

    fn apply_update(&self, learner_id: &str, item_id: &str, new_state: &ReviewProgress) -> Result<ReviewProgress> {
        let next_review_at = format_ts(new_state.next_review_at)
            .ok_or_else(|| out_of_range(learner_id, item_id))?;
        let last_review_at = new_state
            .last_review_at
            .map(|ts| format_ts(ts).ok_or_else(|| out_of_range(learner_id, item_id)))
            .transpose()?;

        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE review_progress
            SET interval_days = ?1,
                ease_factor = ?2,
                repetitions = ?3,
                next_review_at = ?4,
                last_review_at = ?5,
                total_reviews = ?6,
                correct_reviews = ?7,
                avg_response_ms = ?8,
                version = version + 1
            WHERE learner_id = ?9 AND item_id = ?10 AND version = ?11
            "#,
            params![
                new_state.interval_days,
                new_state.ease_factor,
                new_state.repetitions,
                next_review_at,
                last_review_at,
                new_state.total_reviews,
                new_state.correct_reviews,
                new_state.avg_response_ms,
                learner_id,
                item_id,
                new_state.version
            ],
        )?;

        if changed == 0 {
            return Err(Error::ConcurrentModification {
                learner_id: learner_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let progress = conn.query_row(
            &format!(
                "SELECT {PROGRESS_COLUMNS} FROM review_progress WHERE learner_id = ?1 AND item_id = ?2"
            ),
            params![learner_id, item_id],
            progress_from_row,
        )?;
        Ok(progress)
    }

    fn mastery_distribution(&self, learner_id: &str) -> Result<MasteryDistribution> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT repetitions, interval_days, last_review_at IS NOT NULL
            FROM review_progress
            WHERE learner_id = ?1
            "#,
        )?;
        let rows = stmt.query_map(params![learner_id], |row| {
            Ok(MasteryLevel::classify(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let levels = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(MasteryDistribution::from_levels(levels))
    }

    fn unexposed_items(&self, learner_id: &str, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT v.id
            FROM vocabulary v
            WHERE NOT EXISTS (
                SELECT 1 FROM review_progress p
                WHERE p.learner_id = ?1 AND p.item_id = v.id
            )
            ORDER BY v.id ASC
            LIMIT ?2
            "#,
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![learner_id, limit], |row| row.get(0))?;
        let items = rows.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(items)
    }
}

const LATEST_TS: &str = "9999-12-31T23:59:59.999999Z";

// Fixed-width UTC so that text order equals time order in SQL comparisons.
// Years outside 0000-9999 would break the width, so they are refused.
fn format_ts(ts: DateTime<Utc>) -> Option<String> {
    is_schedulable(ts).then(|| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn out_of_range(learner_id: &str, item_id: &str) -> Error {
    Error::ScheduleOutOfRange {
        learner_id: learner_id.to_string(),
        item_id: item_id.to_string(),
    }
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<VocabularyItem> {
    Ok(VocabularyItem {
        id: row.get(0)?,
        word: row.get(1)?,
        translation: row.get(2)?,
        part_of_speech: row.get(3)?,
        example_sentence: row.get(4)?,
        pronunciation: row.get(5)?,
        difficulty: row.get(6)?,
        frequency_rank: row.get(7)?,
        language_code: row.get(8)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewProgress> {
    let next_review_at: String = row.get(5)?;
    let last_review_at: Option<String> = row.get(6)?;
    Ok(ReviewProgress {
        learner_id: row.get(0)?,
        item_id: row.get(1)?,
        interval_days: row.get(2)?,
        ease_factor: row.get(3)?,
        repetitions: row.get(4)?,
        next_review_at: parse_ts(5, &next_review_at)?,
        last_review_at: last_review_at.map(|raw| parse_ts(6, &raw)).transpose()?,
        total_reviews: row.get(7)?,
        correct_reviews: row.get(8)?,
        avg_response_ms: row.get(9)?,
        version: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn seed(db: &Database, ids: &[&str]) {
        for id in ids {
            db.add_item(&VocabularyItem::new(*id, format!("word-{id}"), format!("tr-{id}")))
                .unwrap();
        }
    }

    fn row_count(db: &Database, learner: &str) -> i64 {
        db.conn()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM review_progress WHERE learner_id = ?1",
                params![learner],
                |row| row.get(0),
            )
            .unwrap()
    }

    mod init_tests {
        use super::*;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            let conn = db.conn().unwrap();
            let vocab: i64 = conn
                .query_row("SELECT COUNT(*) FROM vocabulary", [], |row| row.get(0))
                .expect("vocabulary table should exist");
            assert_eq!(vocab, 0);
            let progress: i64 = conn
                .query_row("SELECT COUNT(*) FROM review_progress", [], |row| row.get(0))
                .expect("review_progress table should exist");
            assert_eq!(progress, 0);
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            seed(&db, &["w1"]);
            db.init().expect("Re-init should succeed");
            assert_eq!(db.list_items(None).unwrap().len(), 1);
        }
    }

    mod catalog_tests {
        use super::*;

        #[test]
        fn add_and_get_item() {
            let db = setup_db();
            let mut item = VocabularyItem::new("casa", "casa", "house");
            item.part_of_speech = "noun".into();
            item.example_sentence = "La casa è grande.".into();
            item.pronunciation = "KAH-zah".into();
            item.difficulty = 2;
            db.add_item(&item).unwrap();

            assert_eq!(db.get_item("casa").unwrap(), Some(item));
            assert!(db.contains_item("casa").unwrap());
        }

        #[test]
        fn get_item_not_found() {
            let db = setup_db();
            assert!(db.get_item("nope").unwrap().is_none());
            assert!(!db.contains_item("nope").unwrap());
        }

        #[test]
        fn duplicate_id_fails() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let result = db.add_item(&VocabularyItem::new("w1", "x", "y"));
            assert!(matches!(result, Err(Error::Database(_))));
        }

        #[test]
        fn difficulty_out_of_range_fails() {
            let db = setup_db();
            let mut item = VocabularyItem::new("w1", "x", "y");
            item.difficulty = 9;
            assert!(db.add_item(&item).is_err());
        }

        #[test]
        fn list_items_sorted_and_filtered() {
            let db = setup_db();
            seed(&db, &["w3", "w1", "w2"]);
            let mut fr = VocabularyItem::new("f1", "maison", "house");
            fr.language_code = "fr".into();
            db.add_item(&fr).unwrap();

            let ids: Vec<String> = db.list_items(None).unwrap().into_iter().map(|i| i.id).collect();
            assert_eq!(ids, vec!["f1", "w1", "w2", "w3"]);

            let fr_items = db.list_items(Some("fr")).unwrap();
            assert_eq!(fr_items.len(), 1);
            assert_eq!(fr_items[0].word, "maison");
        }
    }

    mod progress_tests {
        use super::*;

        #[test]
        fn get_or_create_defaults() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let p = db.get_or_create("ana", "w1", t0()).unwrap();
            assert_eq!(p.interval_days, 1);
            assert_eq!(p.ease_factor, 2.5);
            assert_eq!(p.repetitions, 0);
            assert_eq!(p.mastery_level(), MasteryLevel::New);
            assert_eq!(p.next_review_at, t0());
            assert!(p.last_review_at.is_none());
            assert_eq!(p.version, 0);
        }

        #[test]
        fn get_or_create_is_idempotent() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let first = db.get_or_create("ana", "w1", t0()).unwrap();
            let second = db
                .get_or_create("ana", "w1", t0() + Duration::days(3))
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(row_count(&db, "ana"), 1);
        }

        #[test]
        fn get_or_create_concurrent_first_exposure() {
            let db = Arc::new(setup_db());
            seed(&db, &["w1"]);

            std::thread::scope(|s| {
                for _ in 0..8 {
                    let db = Arc::clone(&db);
                    s.spawn(move || {
                        db.get_or_create("ana", "w1", t0()).unwrap();
                    });
                }
            });

            assert_eq!(row_count(&db, "ana"), 1);
        }

        #[test]
        fn get_or_create_unknown_item_fails() {
            let db = setup_db();
            assert!(db.get_or_create("ana", "ghost", t0()).is_err());
            assert_eq!(row_count(&db, "ana"), 0);
        }

        #[test]
        fn rows_are_per_learner() {
            let db = setup_db();
            seed(&db, &["w1"]);
            db.get_or_create("ana", "w1", t0()).unwrap();
            db.get_or_create("ben", "w1", t0()).unwrap();
            assert_eq!(row_count(&db, "ana"), 1);
            assert_eq!(row_count(&db, "ben"), 1);
        }

        #[test]
        fn get_progress_missing_is_none() {
            let db = setup_db();
            seed(&db, &["w1"]);
            assert!(db.get_progress("ana", "w1").unwrap().is_none());
        }

        #[test]
        fn apply_update_replaces_and_bumps_version() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let mut p = db.get_or_create("ana", "w1", t0()).unwrap();
            p.interval_days = 2;
            p.ease_factor = 2.6;
            p.repetitions = 1;
            p.last_review_at = Some(t0());
            p.next_review_at = t0() + Duration::days(2);
            p.total_reviews = 1;
            p.correct_reviews = 1;
            p.avg_response_ms = Some(1500.0);

            let committed = db.apply_update("ana", "w1", &p).unwrap();
            assert_eq!(committed.version, 1);
            assert_eq!(committed.interval_days, 2);
            assert_eq!(committed.last_review_at, Some(t0()));
            assert_eq!(committed.avg_response_ms, Some(1500.0));
            assert_eq!(db.get_progress("ana", "w1").unwrap(), Some(committed));
        }

        #[test]
        fn apply_update_with_stale_version_fails_and_leaves_row() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let read_a = db.get_or_create("ana", "w1", t0()).unwrap();
            let read_b = read_a.clone();

            let mut a = read_a;
            a.repetitions = 1;
            a.last_review_at = Some(t0());
            let committed = db.apply_update("ana", "w1", &a).unwrap();

            let mut b = read_b;
            b.repetitions = 0;
            b.interval_days = 1;
            let result = db.apply_update("ana", "w1", &b);
            assert!(matches!(result, Err(Error::ConcurrentModification { .. })));
            assert_eq!(db.get_progress("ana", "w1").unwrap(), Some(committed));
        }

        #[test]
        fn apply_update_missing_row_is_conflict() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let p = ReviewProgress::new("ana", "w1", t0());
            let result = db.apply_update("ana", "w1", &p);
            assert!(matches!(result, Err(Error::ConcurrentModification { .. })));
        }

        #[test]
        fn ease_below_floor_is_refused_by_schema() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let mut p = db.get_or_create("ana", "w1", t0()).unwrap();
            p.ease_factor = 1.0;
            assert!(matches!(
                db.apply_update("ana", "w1", &p),
                Err(Error::Database(_))
            ));
        }

        #[test]
        fn apply_update_past_year_9999_writes_nothing() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let before = db.get_or_create("ana", "w1", t0()).unwrap();

            let mut p = before.clone();
            p.last_review_at = Some(t0());
            p.total_reviews = 1;
            p.next_review_at = Utc.with_ymd_and_hms(10000, 1, 2, 0, 0, 0).unwrap();
            assert!(matches!(
                db.apply_update("ana", "w1", &p),
                Err(Error::ScheduleOutOfRange { .. })
            ));

            assert_eq!(db.get_progress("ana", "w1").unwrap(), Some(before));
            assert!(db
                .due_items("ana", t0() - Duration::days(1))
                .unwrap()
                .is_empty());
        }

        #[test]
        fn get_or_create_past_year_9999_creates_nothing() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
            assert!(matches!(
                db.get_or_create("ana", "w1", far),
                Err(Error::ScheduleOutOfRange { .. })
            ));
            assert_eq!(row_count(&db, "ana"), 0);
        }

        #[test]
        fn list_progress_sorted_by_item() {
            let db = setup_db();
            seed(&db, &["w1", "w2"]);
            db.get_or_create("ana", "w2", t0()).unwrap();
            db.get_or_create("ana", "w1", t0()).unwrap();
            let items: Vec<String> = db
                .list_progress("ana")
                .unwrap()
                .into_iter()
                .map(|p| p.item_id)
                .collect();
            assert_eq!(items, vec!["w1", "w2"]);
        }
    }

    mod due_tests {
        use super::*;
        use proptest::prelude::*;

        fn schedule(db: &Database, item: &str, next: DateTime<Utc>) {
            let mut p = db.get_or_create("ana", item, t0()).unwrap();
            p.last_review_at = Some(t0());
            p.repetitions = 1;
            p.next_review_at = next;
            db.apply_update("ana", item, &p).unwrap();
        }

        #[test]
        fn due_boundary_is_inclusive() {
            let db = setup_db();
            seed(&db, &["w1"]);
            let next = t0() + Duration::days(2);
            schedule(&db, "w1", next);

            assert!(db.due_items("ana", next - Duration::microseconds(1)).unwrap().is_empty());
            assert_eq!(db.due_items("ana", next).unwrap(), vec!["w1"]);
            assert_eq!(db.due_items("ana", next + Duration::days(1)).unwrap(), vec!["w1"]);
        }

        #[test]
        fn due_excludes_never_exposed_items() {
            let db = setup_db();
            seed(&db, &["w1", "w2"]);
            db.get_or_create("ana", "w1", t0()).unwrap();
            assert_eq!(db.due_items("ana", t0()).unwrap(), vec!["w1"]);
        }

        #[test]
        fn due_ordered_by_time_then_id() {
            let db = setup_db();
            seed(&db, &["a", "b", "c"]);
            schedule(&db, "c", t0() + Duration::days(1));
            schedule(&db, "b", t0() + Duration::days(2));
            schedule(&db, "a", t0() + Duration::days(2));
            assert_eq!(
                db.due_items("ana", t0() + Duration::days(5)).unwrap(),
                vec!["c", "a", "b"]
            );
        }

        #[test]
        fn due_is_scoped_to_learner() {
            let db = setup_db();
            seed(&db, &["w1"]);
            db.get_or_create("ana", "w1", t0()).unwrap();
            assert!(db.due_items("ben", t0()).unwrap().is_empty());
        }

        #[test]
        fn timestamps_order_across_second_boundaries() {
            // Fractional seconds must not break text ordering.
            let db = setup_db();
            seed(&db, &["a", "b"]);
            schedule(&db, "a", t0() + Duration::milliseconds(999));
            schedule(&db, "b", t0() + Duration::seconds(1));
            assert_eq!(
                db.due_items("ana", t0() + Duration::seconds(1)).unwrap(),
                vec!["a", "b"]
            );
            assert_eq!(
                db.due_items("ana", t0() + Duration::milliseconds(999)).unwrap(),
                vec!["a"]
            );
        }

        #[test]
        fn as_of_outside_four_digit_years() {
            let db = setup_db();
            seed(&db, &["w1"]);
            schedule(&db, "w1", Utc.with_ymd_and_hms(9999, 12, 31, 23, 0, 0).unwrap());

            let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
            assert_eq!(db.due_items("ana", far).unwrap(), vec!["w1"]);
            let ancient = Utc.with_ymd_and_hms(-1, 1, 1, 0, 0, 0).unwrap();
            assert!(db.due_items("ana", ancient).unwrap().is_empty());
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_due_iff_next_review_not_after_as_of(
                next_us in -864_000_000_000i64..864_000_000_000,
                // mostly near the boundary, sometimes days away
                gap_us in prop_oneof![-3i64..=3, -1_500_000i64..1_500_000, -864_000_000_000i64..864_000_000_000],
            ) {
                let db = setup_db();
                seed(&db, &["w1"]);
                let next = t0() + Duration::microseconds(next_us);
                let as_of = next + Duration::microseconds(gap_us);
                schedule(&db, "w1", next);

                let due = db.due_items("ana", as_of).unwrap();
                prop_assert_eq!(due.contains(&"w1".to_string()), next <= as_of);
            }
        }
    }

    mod unexposed_tests {
        use super::*;

        #[test]
        fn unexposed_in_id_order_with_limit() {
            let db = setup_db();
            seed(&db, &["w5", "w3", "w1", "w4", "w2"]);
            db.get_or_create("ana", "w2", t0()).unwrap();
            assert_eq!(
                db.unexposed_items("ana", 3).unwrap(),
                vec!["w1", "w3", "w4"]
            );
            assert_eq!(db.unexposed_items("ana", 0).unwrap(), Vec::<String>::new());
            assert_eq!(db.unexposed_items("ben", 10).unwrap().len(), 5);
        }
    }

    mod distribution_tests {
        use super::*;

        #[test]
        fn distribution_empty_learner() {
            let db = setup_db();
            let d = db.mastery_distribution("ana").unwrap();
            assert_eq!(d.total(), 0);
        }

        #[test]
        fn distribution_is_derived_from_fields() {
            let db = setup_db();
            seed(&db, &["w1", "w2", "w3", "w4"]);
            db.get_or_create("ana", "w1", t0()).unwrap();

            let mut p = db.get_or_create("ana", "w2", t0()).unwrap();
            p.last_review_at = Some(t0());
            p.repetitions = 0;
            db.apply_update("ana", "w2", &p).unwrap();

            let mut p = db.get_or_create("ana", "w3", t0()).unwrap();
            p.last_review_at = Some(t0());
            p.repetitions = 4;
            p.interval_days = 10;
            db.apply_update("ana", "w3", &p).unwrap();

            let mut p = db.get_or_create("ana", "w4", t0()).unwrap();
            p.last_review_at = Some(t0());
            p.repetitions = 2;
            p.interval_days = 30;
            db.apply_update("ana", "w4", &p).unwrap();

            let d = db.mastery_distribution("ana").unwrap();
            assert_eq!(d.get(MasteryLevel::New), 1);
            assert_eq!(d.get(MasteryLevel::Learning), 1);
            assert_eq!(d.get(MasteryLevel::Reviewing), 1);
            assert_eq!(d.get(MasteryLevel::Mastered), 1);
        }
    }
}
