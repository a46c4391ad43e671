use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    EXPORT_VERSION, ExportData, ExportGoal, ExportWeightEntry, ImportSummary, NewWeightEntry,
    NewWeightGoal, UpdateWeightEntry, User, UserRecord, WeightEntry, WeightGoal, invalid,
    validate_export_entry, validate_export_goal,
};
use crate::progress::check_goal_target;

const ENTRY_COLUMNS: &str = "id, uuid, user_id, date, weight_kg, notes, created_at, updated_at";
const GOAL_COLUMNS: &str = "id, user_id, target_weight_kg, target_date, initial_weight_kg,
     daily_goal_g, weekly_goal_kg, monthly_goal_kg, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Session expiry is compared as text, so every stored instant uses this one format.
fn utc_str(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_date_column(value: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    name TEXT,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                    target_weight_kg REAL NOT NULL,
                    target_date TEXT,
                    initial_weight_kg REAL,
                    daily_goal_g REAL,
                    weekly_goal_kg REAL,
                    monthly_goal_kg REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_weight_entries_user_date
                    ON weight_entries(user_id, date);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

                PRAGMA user_version = 2;",
            )?;
        }

        // Entry uuids are unique per user, not per database, so one user's
        // export can be merged into another account.
        if version < 3 {
            self.conn.execute_batch(
                "BEGIN;

                CREATE TABLE weight_entries_v3 (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, uuid)
                );

                INSERT INTO weight_entries_v3 (id, uuid, user_id, date, weight_kg, notes, created_at, updated_at)
                    SELECT id, uuid, user_id, date, weight_kg, notes, created_at, updated_at
                    FROM weight_entries;

                DROP TABLE weight_entries;
                ALTER TABLE weight_entries_v3 RENAME TO weight_entries;

                CREATE INDEX IF NOT EXISTS idx_weight_entries_user_date
                    ON weight_entries(user_id, date);

                PRAGMA user_version = 3;

                COMMIT;",
            )?;
        }

        Ok(())
    }

    // --- Users ---

    pub fn create_user(
        &self,
        username: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (username, name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, name, password_hash, now],
            )
            .with_context(|| format!("Failed to create user '{username}'"))?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, name, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Case-insensitive lookup, including the password hash.
    pub fn find_user_record(&self, username: &str) -> Result<Option<UserRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, username, name, created_at, password_hash
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        user: Self::user_from_row(row)?,
                        password_hash: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // --- Sessions ---

    pub fn create_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, utc_str(Utc::now()), utc_str(expires_at)],
        )?;
        Ok(())
    }

    /// The user owning an unexpired session, if any.
    pub fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.name, u.created_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2",
                params![token_hash, utc_str(now)],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![utc_str(now)],
        )?;
        Ok(rows)
    }

    // --- Weight Entries ---

    pub fn insert_weight(&self, user_id: i64, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO weight_entries (uuid, user_id, date, weight_kg, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid,
                user_id,
                date_str(entry.date),
                entry.weight_kg,
                entry.notes,
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_weight_entry(user_id, id)?
            .context("Weight entry not found after insert")
    }

    pub fn get_weight_entry(&self, user_id: i64, id: i64) -> Result<Option<WeightEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM weight_entries WHERE id = ?1 AND user_id = ?2"
                ),
                params![id, user_id],
                Self::weight_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Newest date first; entries sharing a date stay in insertion order.
    pub fn list_weights(&self, user_id: i64, limit: Option<i64>) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM weight_entries
             WHERE user_id = ?1
             ORDER BY date DESC, id ASC
             LIMIT ?2"
        ))?;
        // SQLite treats a negative LIMIT as unbounded.
        let entries = stmt
            .query_map(params![user_id, limit.unwrap_or(-1)], Self::weight_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn list_weights_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM weight_entries
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date DESC, id ASC"
        ))?;
        let entries = stmt
            .query_map(
                params![user_id, date_str(start), date_str(end)],
                Self::weight_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Edit an entry in place. Returns `None` if the user has no such entry.
    pub fn update_weight(
        &self,
        user_id: i64,
        id: i64,
        update: &UpdateWeightEntry,
    ) -> Result<Option<WeightEntry>> {
        let Some(existing) = self.get_weight_entry(user_id, id)? else {
            return Ok(None);
        };
        let date = update.date.unwrap_or(existing.date);
        let weight_kg = update.weight_kg.unwrap_or(existing.weight_kg);
        let notes = match &update.notes {
            Some(notes) => notes.clone(),
            None => existing.notes,
        };
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE weight_entries SET date = ?1, weight_kg = ?2, notes = ?3, updated_at = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![date_str(date), weight_kg, notes, now, id, user_id],
        )?;
        self.get_weight_entry(user_id, id)
    }

    pub fn delete_weight(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM weight_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    fn weight_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        let date: String = row.get(3)?;
        Ok(WeightEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            date: parse_date_column(&date, 3)?,
            weight_kg: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    // --- Goals ---

    pub fn get_goal(&self, user_id: i64) -> Result<Option<WeightGoal>> {
        let goal = self
            .conn
            .query_row(
                &format!("SELECT {GOAL_COLUMNS} FROM weight_goals WHERE user_id = ?1"),
                params![user_id],
                Self::goal_from_row,
            )
            .optional()?;
        Ok(goal)
    }

    /// One goal per user: saving replaces the previous one but keeps its `created_at`.
    pub fn upsert_goal(&self, user_id: i64, goal: &NewWeightGoal) -> Result<WeightGoal> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO weight_goals (user_id, target_weight_kg, target_date, initial_weight_kg,
                 daily_goal_g, weekly_goal_kg, monthly_goal_kg, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                target_weight_kg = excluded.target_weight_kg,
                target_date = excluded.target_date,
                initial_weight_kg = excluded.initial_weight_kg,
                daily_goal_g = excluded.daily_goal_g,
                weekly_goal_kg = excluded.weekly_goal_kg,
                monthly_goal_kg = excluded.monthly_goal_kg,
                updated_at = excluded.updated_at",
            params![
                user_id,
                goal.target_weight_kg,
                goal.target_date.map(date_str),
                goal.initial_weight_kg,
                goal.daily_goal_g,
                goal.weekly_goal_kg,
                goal.monthly_goal_kg,
                now,
                now,
            ],
        )?;
        self.get_goal(user_id)?
            .context("Weight goal not found after upsert")
    }

    pub fn delete_goal(&self, user_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM weight_goals WHERE user_id = ?1", params![user_id])?;
        Ok(rows > 0)
    }

    fn goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightGoal> {
        let target_date: Option<String> = row.get(3)?;
        Ok(WeightGoal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            target_weight_kg: row.get(2)?,
            target_date: target_date
                .as_deref()
                .map(|d| parse_date_column(d, 3))
                .transpose()?,
            initial_weight_kg: row.get(4)?,
            daily_goal_g: row.get(5)?,
            weekly_goal_kg: row.get(6)?,
            monthly_goal_kg: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // --- Export / Import ---

    pub fn export_user(&self, user_id: i64) -> Result<ExportData> {
        let username = self.get_user(user_id)?.map(|u| u.username);
        let mut entries = self.list_weights(user_id, None)?;
        entries.reverse();
        let weight_entries = entries
            .into_iter()
            .map(|e| ExportWeightEntry {
                uuid: e.uuid,
                date: date_str(e.date),
                weight_kg: e.weight_kg,
                notes: e.notes,
                created_at: e.created_at,
                updated_at: e.updated_at,
            })
            .collect();
        let goal = self.get_goal(user_id)?.map(|g| ExportGoal {
            target_weight_kg: g.target_weight_kg,
            target_date: g.target_date.map(date_str),
            initial_weight_kg: g.initial_weight_kg,
            daily_goal_g: g.daily_goal_g,
            weekly_goal_kg: g.weekly_goal_kg,
            monthly_goal_kg: g.monthly_goal_kg,
        });

        Ok(ExportData {
            version: EXPORT_VERSION,
            exported_at: Local::now().to_rfc3339(),
            username,
            weight_entries,
            goal,
        })
    }

    /// Merge an export into `user_id`'s data. Entries whose uuid is already
    /// stored are skipped; a goal in the file replaces the current one.
    /// Everything is validated up front and applied in one transaction.
    pub fn import_user(&self, user_id: i64, data: &ExportData) -> Result<ImportSummary> {
        if data.version > EXPORT_VERSION {
            return Err(invalid(format!(
                "Unsupported export version {} (expected {EXPORT_VERSION} or lower)",
                data.version
            )));
        }
        for entry in &data.weight_entries {
            validate_export_entry(entry)?;
        }
        let goal = data.goal.as_ref().map(validate_export_goal).transpose()?;
        if let Some(goal) = &goal {
            let stored = self.list_weights(user_id, None)?;
            let weights = stored
                .iter()
                .map(|e| e.weight_kg)
                .chain(data.weight_entries.iter().map(|e| e.weight_kg));
            check_goal_target(goal.target_weight_kg, weights).context("Imported goal")?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        let mut imported: i64 = 0;
        let mut skipped: i64 = 0;

        for entry in &data.weight_entries {
            let uuid = if entry.uuid.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                entry.uuid.clone()
            };
            let created_at = if entry.created_at.is_empty() {
                now.clone()
            } else {
                entry.created_at.clone()
            };
            let updated_at = if entry.updated_at.is_empty() {
                created_at.clone()
            } else {
                entry.updated_at.clone()
            };
            let rows = tx.execute(
                "INSERT OR IGNORE INTO weight_entries
                    (uuid, user_id, date, weight_kg, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    uuid,
                    user_id,
                    entry.date,
                    entry.weight_kg,
                    entry.notes,
                    created_at,
                    updated_at,
                ],
            )?;
            if rows > 0 {
                imported += 1;
            } else {
                skipped += 1;
            }
        }

        let goal_imported = goal.is_some();
        if let Some(goal) = goal {
            self.upsert_goal(user_id, &goal)?;
        }

        tx.commit()?;
        Ok(ImportSummary {
            weight_entries_imported: imported,
            weight_entries_skipped: skipped,
            goal_imported,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rejection;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn db_with_user() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("maria", Some("Maria"), "hash").unwrap();
        (db, user.id)
    }

    fn weight(d: &str, kg: f64) -> NewWeightEntry {
        NewWeightEntry {
            date: date(d),
            weight_kg: kg,
            notes: None,
        }
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);
        let fk: i64 = db
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weighin.db");
        {
            let db = Database::open(&path).unwrap();
            let user = db.create_user("maria", None, "hash").unwrap();
            db.insert_weight(user.id, &weight("2024-01-01", 80.0)).unwrap();
        }
        let db = Database::open(&path).unwrap();
        let record = db.find_user_record("maria").unwrap().unwrap();
        assert_eq!(db.list_weights(record.user.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_create_and_find_user() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("maria", Some("Maria"), "phc-hash").unwrap();
        assert_eq!(user.username, "maria");
        assert_eq!(user.name.as_deref(), Some("Maria"));

        let record = db.find_user_record("MARIA").unwrap().unwrap();
        assert_eq!(record.user.id, user.id);
        assert_eq!(record.password_hash, "phc-hash");
        assert!(db.find_user_record("joao").unwrap().is_none());
        assert_eq!(db.get_user(user.id).unwrap().unwrap(), user);
    }

    #[test]
    fn test_duplicate_username_rejected_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("maria", None, "h").unwrap();
        assert!(db.create_user("Maria", None, "h").is_err());
    }

    #[test]
    fn test_session_lifecycle() {
        let (db, user_id) = db_with_user();
        let now = Utc::now();
        db.create_session("digest-1", user_id, now + Duration::days(30))
            .unwrap();

        let user = db.session_user("digest-1", now).unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert!(db.session_user("digest-2", now).unwrap().is_none());

        assert!(db.delete_session("digest-1").unwrap());
        assert!(!db.delete_session("digest-1").unwrap());
        assert!(db.session_user("digest-1", now).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_ignored_and_purged() {
        let (db, user_id) = db_with_user();
        let now = Utc::now();
        db.create_session("old", user_id, now - Duration::hours(1))
            .unwrap();
        db.create_session("new", user_id, now + Duration::hours(1))
            .unwrap();

        assert!(db.session_user("old", now).unwrap().is_none());
        assert_eq!(db.purge_expired_sessions(now).unwrap(), 1);
        assert!(db.session_user("new", now).unwrap().is_some());
    }

    #[test]
    fn test_insert_weight_allows_same_date() {
        let (db, user_id) = db_with_user();
        let a = db.insert_weight(user_id, &weight("2024-01-02", 79.5)).unwrap();
        let b = db.insert_weight(user_id, &weight("2024-01-02", 79.8)).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.uuid, b.uuid);
        assert_eq!(db.list_weights(user_id, None).unwrap().len(), 2);
    }

    #[test]
    fn test_list_weights_order_and_limit() {
        let (db, user_id) = db_with_user();
        let first = db.insert_weight(user_id, &weight("2024-01-02", 79.5)).unwrap();
        db.insert_weight(user_id, &weight("2024-01-01", 80.0)).unwrap();
        let second = db.insert_weight(user_id, &weight("2024-01-02", 79.7)).unwrap();
        db.insert_weight(user_id, &weight("2024-01-03", 79.2)).unwrap();

        let all = db.list_weights(user_id, None).unwrap();
        let dates: Vec<String> = all.iter().map(|e| date_str(e.date)).collect();
        assert_eq!(
            dates,
            vec!["2024-01-03", "2024-01-02", "2024-01-02", "2024-01-01"]
        );
        // Same-date entries keep insertion order.
        assert_eq!(all[1].id, first.id);
        assert_eq!(all[2].id, second.id);

        assert_eq!(db.list_weights(user_id, Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_list_weights_between_inclusive() {
        let (db, user_id) = db_with_user();
        for (d, kg) in [
            ("2023-12-31", 81.0),
            ("2024-01-01", 80.0),
            ("2024-01-07", 79.0),
            ("2024-01-08", 78.5),
        ] {
            db.insert_weight(user_id, &weight(d, kg)).unwrap();
        }
        let within = db
            .list_weights_between(user_id, date("2024-01-01"), date("2024-01-07"))
            .unwrap();
        assert_eq!(within.len(), 2);
        assert_eq!(within[0].date, date("2024-01-07"));
    }

    #[test]
    fn test_entries_are_scoped_per_user() {
        let (db, maria) = db_with_user();
        let joao = db.create_user("joao", None, "h").unwrap().id;
        let entry = db.insert_weight(maria, &weight("2024-01-01", 80.0)).unwrap();

        assert!(db.list_weights(joao, None).unwrap().is_empty());
        assert!(db.get_weight_entry(joao, entry.id).unwrap().is_none());
        assert!(!db.delete_weight(joao, entry.id).unwrap());
        let update = UpdateWeightEntry {
            weight_kg: Some(1.0),
            ..UpdateWeightEntry::default()
        };
        assert!(db.update_weight(joao, entry.id, &update).unwrap().is_none());
        assert_eq!(
            db.get_weight_entry(maria, entry.id).unwrap().unwrap().weight_kg,
            80.0
        );
    }

    #[test]
    fn test_update_weight_in_place() {
        let (db, user_id) = db_with_user();
        let entry = db
            .insert_weight(
                user_id,
                &NewWeightEntry {
                    date: date("2024-01-01"),
                    weight_kg: 80.0,
                    notes: Some("after run".to_string()),
                },
            )
            .unwrap();

        let updated = db
            .update_weight(
                user_id,
                entry.id,
                &UpdateWeightEntry {
                    weight_kg: Some(79.6),
                    ..UpdateWeightEntry::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, entry.id);
        assert_eq!(updated.uuid, entry.uuid);
        assert_eq!(updated.weight_kg, 79.6);
        assert_eq!(updated.date, entry.date);
        assert_eq!(updated.notes.as_deref(), Some("after run"));
        assert_eq!(updated.created_at, entry.created_at);

        let cleared = db
            .update_weight(
                user_id,
                entry.id,
                &UpdateWeightEntry {
                    date: Some(date("2024-01-02")),
                    notes: Some(None),
                    ..UpdateWeightEntry::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(cleared.date, date("2024-01-02"));
        assert!(cleared.notes.is_none());
        assert_eq!(cleared.weight_kg, 79.6);
    }

    #[test]
    fn test_update_weight_missing_returns_none() {
        let (db, user_id) = db_with_user();
        let update = UpdateWeightEntry {
            weight_kg: Some(70.0),
            ..UpdateWeightEntry::default()
        };
        assert!(db.update_weight(user_id, 999, &update).unwrap().is_none());
    }

    #[test]
    fn test_delete_weight() {
        let (db, user_id) = db_with_user();
        let entry = db.insert_weight(user_id, &weight("2024-01-01", 80.0)).unwrap();
        assert!(db.delete_weight(user_id, entry.id).unwrap());
        assert!(!db.delete_weight(user_id, entry.id).unwrap());
        assert!(db.list_weights(user_id, None).unwrap().is_empty());
    }

    #[test]
    fn test_goal_upsert_replaces() {
        let (db, user_id) = db_with_user();
        assert!(db.get_goal(user_id).unwrap().is_none());

        let first = db
            .upsert_goal(
                user_id,
                &NewWeightGoal {
                    target_weight_kg: 70.0,
                    target_date: Some(date("2024-06-01")),
                    initial_weight_kg: Some(80.0),
                    daily_goal_g: Some(66.2),
                    ..NewWeightGoal::default()
                },
            )
            .unwrap();
        assert_eq!(first.target_date, Some(date("2024-06-01")));

        let second = db
            .upsert_goal(
                user_id,
                &NewWeightGoal {
                    target_weight_kg: 72.0,
                    ..NewWeightGoal::default()
                },
            )
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.target_weight_kg, 72.0);
        assert!(second.target_date.is_none());
        assert!(second.daily_goal_g.is_none());
        assert_eq!(second.created_at, first.created_at);

        assert!(db.delete_goal(user_id).unwrap());
        assert!(!db.delete_goal(user_id).unwrap());
        assert!(db.get_goal(user_id).unwrap().is_none());
    }

    #[test]
    fn test_export_import_roundtrip_into_other_user() {
        let (db, maria) = db_with_user();
        db.insert_weight(maria, &weight("2024-01-02", 79.5)).unwrap();
        db.insert_weight(maria, &weight("2024-01-01", 80.0)).unwrap();
        db.upsert_goal(
            maria,
            &NewWeightGoal {
                target_weight_kg: 70.0,
                target_date: Some(date("2024-02-01")),
                ..NewWeightGoal::default()
            },
        )
        .unwrap();

        let export = db.export_user(maria).unwrap();
        assert_eq!(export.version, EXPORT_VERSION);
        assert_eq!(export.username.as_deref(), Some("maria"));
        assert_eq!(export.weight_entries.len(), 2);
        assert_eq!(export.weight_entries[0].date, "2024-01-01");

        // Uuids are scoped per user, so a second account in the same
        // database receives its own copies.
        let joao = db.create_user("joao", None, "h").unwrap().id;
        let summary = db.import_user(joao, &export).unwrap();
        assert_eq!(summary.weight_entries_imported, 2);
        assert_eq!(summary.weight_entries_skipped, 0);
        assert!(summary.goal_imported);
        assert_eq!(db.list_weights(maria, None).unwrap().len(), 2);
        let copied = db.list_weights(joao, None).unwrap();
        assert_eq!(copied.len(), 2);
        assert!(copied.iter().all(|e| e.user_id == joao));

        let other = Database::open_in_memory().unwrap();
        let fresh = other.create_user("maria", None, "h").unwrap().id;
        let summary = other.import_user(fresh, &export).unwrap();
        assert_eq!(summary.weight_entries_imported, 2);
        let goal = other.get_goal(fresh).unwrap().unwrap();
        assert_eq!(goal.target_date, Some(date("2024-02-01")));
        let entries = other.list_weights(fresh, None).unwrap();
        assert_eq!(entries[0].uuid, export.weight_entries[1].uuid);
    }

    #[test]
    fn test_import_is_idempotent() {
        let (db, user_id) = db_with_user();
        db.insert_weight(user_id, &weight("2024-01-01", 80.0)).unwrap();
        let export = db.export_user(user_id).unwrap();
        let summary = db.import_user(user_id, &export).unwrap();
        assert_eq!(summary.weight_entries_imported, 0);
        assert_eq!(summary.weight_entries_skipped, 1);
        assert!(!summary.goal_imported);
        assert_eq!(db.list_weights(user_id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_import_rejects_bad_rows_without_partial_writes() {
        let (db, user_id) = db_with_user();
        let data = ExportData {
            version: EXPORT_VERSION,
            exported_at: String::new(),
            username: None,
            weight_entries: vec![
                ExportWeightEntry {
                    uuid: "good".to_string(),
                    date: "2024-01-01".to_string(),
                    weight_kg: 80.0,
                    notes: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                },
                ExportWeightEntry {
                    uuid: "bad".to_string(),
                    date: "2024-01-02".to_string(),
                    weight_kg: -1.0,
                    notes: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                },
            ],
            goal: None,
        };
        assert!(db.import_user(user_id, &data).is_err());
        assert!(db.list_weights(user_id, None).unwrap().is_empty());
    }

    #[test]
    fn test_import_rejects_goal_above_every_weight() {
        let (db, user_id) = db_with_user();
        db.insert_weight(user_id, &weight("2024-01-02", 80.0)).unwrap();
        let data = ExportData {
            version: EXPORT_VERSION,
            exported_at: String::new(),
            username: None,
            weight_entries: vec![ExportWeightEntry {
                uuid: "incoming".to_string(),
                date: "2024-01-03".to_string(),
                weight_kg: 79.0,
                notes: None,
                created_at: String::new(),
                updated_at: String::new(),
            }],
            goal: Some(ExportGoal {
                target_weight_kg: 90.0,
                target_date: Some("2024-02-01".to_string()),
                initial_weight_kg: None,
                daily_goal_g: None,
                weekly_goal_kg: None,
                monthly_goal_kg: None,
            }),
        };

        let err = db.import_user(user_id, &data).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Rejection>(),
            Some(Rejection::Invalid(_))
        ));
        assert!(db.get_goal(user_id).unwrap().is_none());
        assert_eq!(db.list_weights(user_id, None).unwrap().len(), 1);

        // Incoming entries count toward the history the target is checked against.
        let fresh = db.create_user("joao", None, "h").unwrap().id;
        let mut heavier = data.clone();
        heavier.weight_entries[0].weight_kg = 95.0;
        let summary = db.import_user(fresh, &heavier).unwrap();
        assert!(summary.goal_imported);
    }

    #[test]
    fn test_import_rejects_newer_version() {
        let (db, user_id) = db_with_user();
        let data = ExportData {
            version: EXPORT_VERSION + 1,
            exported_at: String::new(),
            username: None,
            weight_entries: Vec::new(),
            goal: None,
        };
        assert!(db.import_user(user_id, &data).is_err());
    }

    #[test]
    fn test_import_fills_missing_uuid_and_timestamps() {
        let (db, user_id) = db_with_user();
        let json = r#"{"version":1,"exported_at":"","weight_entries":[{"uuid":"","date":"2024-01-01","weight":80.0}]}"#;
        let data: ExportData = serde_json::from_str(json).unwrap();
        let summary = db.import_user(user_id, &data).unwrap();
        assert_eq!(summary.weight_entries_imported, 1);
        let entry = &db.list_weights(user_id, None).unwrap()[0];
        assert!(!entry.uuid.is_empty());
        assert!(!entry.created_at.is_empty());
    }

    #[test]
    fn test_user_delete_cascades() {
        let (db, user_id) = db_with_user();
        db.insert_weight(user_id, &weight("2024-01-01", 80.0)).unwrap();
        db.conn
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .unwrap();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM weight_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
