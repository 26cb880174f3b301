use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use string_analyzer_core::{analyze, apply_filters, interpret, CoreError, FilterSet, StringRecord};
use string_analyzer_store_sqlite::{InsertOutcome, SchemaStatus, SqliteStore};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Client-visible failure taxonomy. Everything that is not one of the named
/// domain outcomes is an internal storage or serialization fault.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("value must contain at least one character")]
    EmptyValue,
    #[error("string already exists in the system")]
    AlreadyExists,
    #[error("string does not exist in the system")]
    NotFound,
    #[error("unable to parse natural language query")]
    QueryNotUnderstood,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreateStringRequest {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// Result of the structured-parameter listing path, echoing only the filter
/// dimensions that were actually constrained.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilteredStrings {
    pub data: Vec<StringRecord>,
    pub count: usize,
    pub filters_applied: FilterSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct InterpretedQuery {
    pub original: String,
    pub parsed_filters: FilterSet,
}

/// Result of the natural-language path: the same record selection as the
/// structured path plus the interpretation echoed back for the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NlFilteredStrings {
    pub data: Vec<StringRecord>,
    pub count: usize,
    pub interpreted_query: InterpretedQuery,
}

#[derive(Debug, Clone)]
pub struct StringAnalyzerApi {
    db_path: PathBuf,
}

impl StringAnalyzerApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore, ApiError> {
        Ok(SqliteStore::open(&self.db_path)?)
    }

    fn open_migrated_store(&self) -> Result<SqliteStore, ApiError> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus, ApiError> {
        let store = self.open_store()?;
        Ok(store.schema_status()?)
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult, ApiError> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Analyze one new string and persist its property record.
    ///
    /// The analysis runs exactly once per accepted value; the resulting
    /// record is immutable from then on.
    ///
    /// # Errors
    /// Returns [`ApiError::EmptyValue`] for an empty value (the request
    /// boundary owns this validation, not the analyzer),
    /// [`ApiError::AlreadyExists`] for a duplicate value, or an internal
    /// error when persistence fails.
    pub fn create_string(&self, request: CreateStringRequest) -> Result<StringRecord, ApiError> {
        if request.value.is_empty() {
            return Err(ApiError::EmptyValue);
        }

        let mut store = self.open_migrated_store()?;
        let record = StringRecord {
            properties: analyze(&request.value),
            created_at: OffsetDateTime::now_utc(),
        };

        match store.insert_record(&record)? {
            InsertOutcome::Inserted => Ok(record),
            InsertOutcome::AlreadyExists => Err(ApiError::AlreadyExists),
        }
    }

    /// Fetch the property record for one exact stored value.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when the value was never stored.
    pub fn get_string(&self, value: &str) -> Result<StringRecord, ApiError> {
        let store = self.open_migrated_store()?;
        store.get_record_by_value(value)?.ok_or(ApiError::NotFound)
    }

    /// Delete the record for one exact stored value.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when the value was never stored.
    pub fn delete_string(&self, value: &str) -> Result<(), ApiError> {
        let mut store = self.open_migrated_store()?;
        if store.delete_record_by_value(value)? {
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }

    /// List stored records through the structured-parameter filter path.
    ///
    /// # Errors
    /// Returns an error when the snapshot cannot be read.
    pub fn list_strings(&self, filters: FilterSet) -> Result<FilteredStrings, ApiError> {
        let store = self.open_migrated_store()?;
        let records = store.list_records()?;
        let data = apply_filters(&filters, &records);
        Ok(FilteredStrings { count: data.len(), data, filters_applied: filters })
    }

    /// List stored records through the natural-language filter path.
    ///
    /// Interpretation is a one-shot, stateless attempt; the selection itself
    /// goes through the same evaluator as [`Self::list_strings`], so
    /// equivalent filters always produce identical results.
    ///
    /// # Errors
    /// Returns [`ApiError::QueryNotUnderstood`] when no recognition rule
    /// fires, or an internal error when the snapshot cannot be read.
    pub fn filter_by_natural_language(&self, sentence: &str) -> Result<NlFilteredStrings, ApiError> {
        let filters = interpret(sentence).map_err(|err| match err {
            CoreError::QueryNotUnderstood(_) => ApiError::QueryNotUnderstood,
        })?;

        let store = self.open_migrated_store()?;
        let records = store.list_records()?;
        let data = apply_filters(&filters, &records);
        Ok(NlFilteredStrings {
            count: data.len(),
            data,
            interpreted_query: InterpretedQuery {
                original: sentence.to_string(),
                parsed_filters: filters,
            },
        })
    }
}
