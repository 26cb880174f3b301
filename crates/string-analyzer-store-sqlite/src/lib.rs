use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use string_analyzer_core::{StringProperties, StringRecord};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS analyzed_strings (
  content_fingerprint TEXT PRIMARY KEY,
  value TEXT NOT NULL UNIQUE,
  length INTEGER NOT NULL CHECK (length >= 1),
  is_palindrome INTEGER NOT NULL CHECK (is_palindrome IN (0, 1)),
  unique_characters INTEGER NOT NULL CHECK (unique_characters >= 1),
  word_count INTEGER NOT NULL CHECK (word_count >= 0),
  character_frequency_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyzed_strings_created_at ON analyzed_strings(created_at);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

/// Outcome of an insert attempt: a duplicate value is a domain result at the
/// uniqueness boundary, not a storage error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl SqliteStore {
    /// Open a SQLite-backed string store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.conn
                .execute_batch(MIGRATION_001_SQL)
                .context("failed to create analyzed_strings tables")?;
            record_schema_version(&self.conn, 1)?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Persist one analyzed string record.
    ///
    /// Uniqueness is enforced on `content_fingerprint` (and equivalently on
    /// `value`); a conflicting insert reports [`InsertOutcome::AlreadyExists`].
    ///
    /// # Errors
    /// Returns an error when serialization or the insert itself fails for any
    /// reason other than a uniqueness conflict.
    pub fn insert_record(&mut self, record: &StringRecord) -> Result<InsertOutcome> {
        let properties = &record.properties;
        let frequency_json = serde_json::to_string(&properties.character_frequency)
            .context("failed to serialize character frequency map")?;

        let inserted = self.conn.execute(
            "INSERT INTO analyzed_strings(
                content_fingerprint, value, length, is_palindrome,
                unique_characters, word_count, character_frequency_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                properties.content_fingerprint,
                properties.value,
                i64::try_from(properties.length).context("length exceeds sqlite integer range")?,
                properties.is_palindrome,
                i64::try_from(properties.unique_characters)
                    .context("unique_characters exceeds sqlite integer range")?,
                i64::try_from(properties.word_count)
                    .context("word_count exceeds sqlite integer range")?,
                frequency_json,
                rfc3339(record.created_at)?,
            ],
        );

        match inserted {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(err) => Err(anyhow::Error::new(err).context("failed to insert analyzed string")),
        }
    }

    /// Fetch one record by its exact stored value.
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or decoded.
    pub fn get_record_by_value(&self, value: &str) -> Result<Option<StringRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT content_fingerprint, value, length, is_palindrome,
                        unique_characters, word_count, character_frequency_json, created_at
                 FROM analyzed_strings
                 WHERE value = ?1",
                params![value],
                RawRecordRow::from_row,
            )
            .optional()
            .context("failed to query analyzed string by value")?;

        row.map(RawRecordRow::decode).transpose()
    }

    /// Delete one record by its exact stored value.
    ///
    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn delete_record_by_value(&mut self, value: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM analyzed_strings WHERE value = ?1", params![value])
            .context("failed to delete analyzed string")?;
        Ok(deleted > 0)
    }

    /// Load a stable snapshot of all persisted records.
    ///
    /// Ordered by creation time then fingerprint so repeated reads of an
    /// unchanged store observe the same sequence. Filtering stays out of SQL
    /// on purpose; the core evaluator is the single source of truth.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_records(&self) -> Result<Vec<StringRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_fingerprint, value, length, is_palindrome,
                    unique_characters, word_count, character_frequency_json, created_at
             FROM analyzed_strings
             ORDER BY created_at ASC, content_fingerprint ASC",
        )?;

        let rows = stmt
            .query_map([], RawRecordRow::from_row)
            .context("failed to query analyzed strings")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed to read analyzed string row")?.decode()?);
        }
        Ok(records)
    }
}

struct RawRecordRow {
    content_fingerprint: String,
    value: String,
    length: i64,
    is_palindrome: bool,
    unique_characters: i64,
    word_count: i64,
    character_frequency_json: String,
    created_at: String,
}

impl RawRecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_fingerprint: row.get(0)?,
            value: row.get(1)?,
            length: row.get(2)?,
            is_palindrome: row.get(3)?,
            unique_characters: row.get(4)?,
            word_count: row.get(5)?,
            character_frequency_json: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<StringRecord> {
        Ok(StringRecord {
            properties: StringProperties {
                content_fingerprint: self.content_fingerprint,
                value: self.value,
                length: u64::try_from(self.length).context("negative length in database")?,
                is_palindrome: self.is_palindrome,
                unique_characters: u64::try_from(self.unique_characters)
                    .context("negative unique_characters in database")?,
                word_count: u64::try_from(self.word_count)
                    .context("negative word_count in database")?,
                character_frequency: serde_json::from_str(&self.character_frequency_json)
                    .context("failed to deserialize character frequency map")?,
            },
            created_at: parse_rfc3339(&self.created_at)?,
        })
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get(0)
    })
    .context("failed to read current schema version")
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, rfc3339(OffsetDateTime::now_utc())?],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use string_analyzer_core::analyze;
    use time::Duration;

    use super::*;

    fn unique_temp_db_path(tag: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
            .as_nanos();
        std::env::temp_dir().join(format!("string-analyzer-store-{tag}-{now}.sqlite3"))
    }

    fn fixture_time(offset_seconds: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000 + offset_seconds)
    }

    fn mk_record(value: &str, offset_seconds: i64) -> StringRecord {
        StringRecord { properties: analyze(value), created_at: fixture_time(offset_seconds) }
    }

    fn open_migrated(tag: &str) -> (SqliteStore, PathBuf) {
        let db_path = unique_temp_db_path(tag);
        let mut store = match SqliteStore::open(&db_path) {
            Ok(store) => store,
            Err(err) => panic!("store should open: {err}"),
        };
        if let Err(err) = store.migrate() {
            panic!("store should migrate: {err}");
        }
        (store, db_path)
    }

    // Test IDs: TST-001
    #[test]
    fn schema_status_tracks_pending_and_applied_migrations() -> Result<()> {
        let db_path = unique_temp_db_path("schema");
        let mut store = SqliteStore::open(&db_path)?;

        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.target_version, LATEST_SCHEMA_VERSION);
        assert_eq!(before.pending_versions, vec![1]);

        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TST-002
    #[test]
    fn insert_and_list_round_trip_preserves_every_field() -> Result<()> {
        let (mut store, db_path) = open_migrated("roundtrip");

        let record = mk_record("Racecar one", 0);
        assert_eq!(store.insert_record(&record)?, InsertOutcome::Inserted);

        let records = store.list_records()?;
        assert_eq!(records, vec![record]);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TST-003
    #[test]
    fn duplicate_value_reports_already_exists() -> Result<()> {
        let (mut store, db_path) = open_migrated("duplicate");

        let record = mk_record("noon", 0);
        assert_eq!(store.insert_record(&record)?, InsertOutcome::Inserted);
        assert_eq!(store.insert_record(&mk_record("noon", 5))?, InsertOutcome::AlreadyExists);
        assert_eq!(store.list_records()?.len(), 1);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TST-004
    #[test]
    fn get_and_delete_by_value_cover_missing_rows() -> Result<()> {
        let (mut store, db_path) = open_migrated("lookup");

        let record = mk_record("level", 0);
        store.insert_record(&record)?;

        let found = store.get_record_by_value("level")?;
        assert_eq!(found, Some(record));
        assert_eq!(store.get_record_by_value("absent")?, None);

        assert!(store.delete_record_by_value("level")?);
        assert!(!store.delete_record_by_value("level")?);
        assert_eq!(store.get_record_by_value("level")?, None);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TST-005
    #[test]
    fn list_orders_by_creation_time_then_fingerprint() -> Result<()> {
        let (mut store, db_path) = open_migrated("ordering");

        store.insert_record(&mk_record("third", 20))?;
        store.insert_record(&mk_record("first", 0))?;
        store.insert_record(&mk_record("second", 10))?;

        let values = store
            .list_records()?
            .iter()
            .map(|record| record.properties.value.clone())
            .collect::<Vec<_>>();
        assert_eq!(values, ["first", "second", "third"]);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }
}
