#![forbid(unsafe_code)]
//! Core traits for the tagstore CRUD harness.
//! This crate is database-agnostic and should not contain any backend-specific logic.

// Re-export for downstream trait implementations.
pub use async_trait::async_trait;

use chrono::{DateTime, SubsecRound, Utc};

pub mod schema;

pub use schema::{ColumnDef, ColumnType, DefaultValue, TableSchema, UniqueIndex};

/// Compile-time metadata about the table an entity is stored in.
pub trait Fetchable {
    const TABLE: &'static str;
    /// Columns in the order a `RowAdapter` expects them.
    const SELECT_COLUMNS: &'static [&'static str];
}

/// A backend-agnostic representation of a database parameter value.
/// This is used to pass entity field values to backend adapters
/// without making `tagstore_core` dependent on a specific database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
    Null,
}

impl ParamValue {
    /// Timestamps are stored as unix milliseconds; `None` becomes `NULL`.
    pub fn timestamp(ts: Option<DateTime<Utc>>) -> Self {
        ts.map_or(ParamValue::Null, |t| ParamValue::I64(t.timestamp_millis()))
    }
}

/// Trait for entities that have an identifiable key.
pub trait Identifiable {
    /// The type of the primary key (e.g., `i64`).
    type Key;

    /// The name of the primary key column in the database.
    const ID_COLUMN: &'static str;

    /// Returns a copy of the entity's ID, if it has one.
    fn id(&self) -> Option<Self::Key>;
}

/// Trait for types whose fields can be extracted for an INSERT statement.
pub trait Insertable {
    /// The columns to be used in an INSERT statement, excluding auto-generated keys.
    const INSERT_COLUMNS: &'static [&'static str];

    /// The values of the fields corresponding to `INSERT_COLUMNS`.
    fn insert_values(&self) -> Vec<ParamValue>;
}

/// Trait for types whose fields can be extracted for an UPDATE statement.
pub trait Updatable {
    /// The columns to be used in an UPDATE statement's SET clause.
    const UPDATE_COLUMNS: &'static [&'static str];

    /// The values of the fields corresponding to `UPDATE_COLUMNS`, followed by the id.
    fn update_values(&self) -> Vec<ParamValue>;
}

/// Entities whose creation and modification times are maintained by the store.
pub trait Timestamped {
    /// Called before an insert. Implementations should keep an existing creation
    /// time and always refresh the modification time.
    fn stamp_created(&mut self, now: DateTime<Utc>);

    /// Called before an update.
    fn stamp_updated(&mut self, now: DateTime<Utc>);
}

/// Current time truncated to the millisecond precision timestamps are stored with.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Lightweight, backend-agnostic error type for repository and schema operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The entity was not found.
    #[error("entity not found")]
    NotFound,
    /// The store could not be opened or connected to.
    #[error("connection error")]
    Connection {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The table could not be created, or exists with an incompatible shape.
    #[error("schema error: {reason}")]
    Schema { reason: String },
    /// A uniqueness or primary-key constraint rejected the write.
    #[error("constraint violation")]
    Constraint {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Error while mapping a backend row into an entity.
    #[error("mapping error")]
    Mapping {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Opaque backend error from the underlying driver or adapter.
    #[error("backend error")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RepoError {
    /// Wrap a backend/driver error.
    pub fn backend<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Backend {
            source: Box::new(e),
        }
    }
    /// Wrap a row-mapping error.
    pub fn mapping<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Mapping {
            source: Box::new(e),
        }
    }
    /// Wrap an error raised while opening or connecting to the store.
    pub fn connection<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Connection {
            source: Box::new(e),
        }
    }
    /// Wrap a constraint violation reported by the driver.
    pub fn constraint<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Constraint {
            source: Box::new(e),
        }
    }
    pub fn schema(reason: impl Into<String>) -> Self {
        RepoError::Schema {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound)
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, RepoError::Constraint { .. })
    }
}

/// Convenience alias for results returned by repository methods.
pub type RepoResult<T> = Result<T, RepoError>;

/// A minimal, asynchronous repository interface for an entity `T`.
/// This is intentionally DB-agnostic. Concrete backends provide implementations.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Identifiable + Send + Sync + 'static,
{
    /// Fetch an entity by its primary key. Returns Ok(None) if not found.
    async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>>;

    /// Fetch the entity with the lowest primary key.
    /// Returns `RepoError::NotFound` when the table is empty.
    async fn find_first(&self) -> RepoResult<T>;

    /// Number of stored entities.
    async fn count(&self) -> RepoResult<u64>;

    /// Insert a new entity. The returned entity carries the fields the store
    /// assigned (id, timestamps). An entity that already has an id is inserted
    /// under that id.
    async fn insert(&self, entity: &T) -> RepoResult<T>;

    /// Update an existing entity in place. Returns `RepoError::NotFound` when no
    /// row has the entity's id.
    async fn update(&self, entity: &T) -> RepoResult<T>;

    /// Persist an entity: update it when it has an id, insert it otherwise.
    /// An id that matches no row falls back to an insert under that id.
    async fn save(&self, entity: &T) -> RepoResult<T> {
        if entity.id().is_none() {
            return self.insert(entity).await;
        }
        match self.update(entity).await {
            Err(RepoError::NotFound) => self.insert(entity).await,
            other => other,
        }
    }

    /// Delete an entity by key. Returns true if a row was affected; deleting an
    /// absent key is not an error.
    async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool>;
}

/// Creates or verifies tables from an explicit schema description.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    /// Make sure the table described by `schema` exists with a compatible shape.
    async fn ensure_schema(&self, schema: &TableSchema) -> RepoResult<()>;
}

/// A tiny adapter for mapping a backend-specific row type into an entity `T`.
#[allow(clippy::wrong_self_convention)]
pub trait RowAdapter<T> {
    type Row;
    fn from_row(&self, row: &Self::Row) -> RepoResult<T>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn repo_error_display_messages() {
        let e1 = RepoError::NotFound;
        assert_eq!(format!("{}", e1), "entity not found");

        let e2 = RepoError::mapping(std::io::Error::new(std::io::ErrorKind::Other, "bad row"));
        assert_eq!(format!("{}", e2), "mapping error");

        let e3 = RepoError::backend(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{}", e3), "backend error");

        let e4 = RepoError::schema("column owner_id has type TEXT, expected INTEGER");
        assert_eq!(
            format!("{}", e4),
            "schema error: column owner_id has type TEXT, expected INTEGER"
        );

        let e5 = RepoError::connection(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no dir",
        ));
        assert_eq!(format!("{}", e5), "connection error");
        assert!(std::error::Error::source(&e5).is_some());
    }

    #[test]
    fn not_found_is_distinguishable_from_other_kinds() {
        assert!(RepoError::NotFound.is_not_found());
        let c = RepoError::constraint(std::io::Error::new(std::io::ErrorKind::Other, "dup"));
        assert!(c.is_constraint());
        assert!(!c.is_not_found());
        assert!(!RepoError::schema("x").is_not_found());
    }

    #[test]
    fn timestamp_param_uses_millis_and_null() {
        assert_eq!(ParamValue::timestamp(None), ParamValue::Null);
        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000, 5_000_000).unwrap();
        assert_eq!(
            ParamValue::timestamp(Some(ts)),
            ParamValue::I64(1_700_000_000_005)
        );
    }

    #[test]
    fn timestamp_now_has_millisecond_precision() {
        let now = timestamp_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    // A tiny in-memory repository used to exercise the default `save` behaviour.
    #[derive(Debug, Clone, PartialEq)]
    struct Mini {
        id: Option<i64>,
        label: String,
    }

    impl Identifiable for Mini {
        type Key = i64;
        const ID_COLUMN: &'static str = "id";
        fn id(&self) -> Option<Self::Key> {
            self.id
        }
    }

    #[derive(Default)]
    struct MiniRepo {
        rows: Mutex<Vec<Mini>>,
    }

    #[async_trait]
    impl Repository<Mini> for MiniRepo {
        async fn find_by_id(&self, id: &i64) -> RepoResult<Option<Mini>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.id == Some(*id))
                .cloned())
        }

        async fn find_first(&self) -> RepoResult<Mini> {
            let rows = self.rows.lock().unwrap();
            rows.iter()
                .min_by_key(|m| m.id)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn count(&self) -> RepoResult<u64> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }

        async fn insert(&self, entity: &Mini) -> RepoResult<Mini> {
            let mut rows = self.rows.lock().unwrap();
            let next = rows.iter().filter_map(|m| m.id).max().unwrap_or(0) + 1;
            let mut e = entity.clone();
            e.id = Some(e.id.unwrap_or(next));
            rows.push(e.clone());
            Ok(e)
        }

        async fn update(&self, entity: &Mini) -> RepoResult<Mini> {
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|m| m.id == entity.id) {
                Some(row) => {
                    *row = entity.clone();
                    Ok(entity.clone())
                }
                None => Err(RepoError::NotFound),
            }
        }

        async fn delete_by_id(&self, id: &i64) -> RepoResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|m| m.id != Some(*id));
            Ok(rows.len() != before)
        }
    }

    #[test]
    fn save_inserts_without_id_and_updates_with_id() {
        let repo = MiniRepo::default();
        let created = futures::executor::block_on(repo.save(&Mini {
            id: None,
            label: "a".into(),
        }))
        .unwrap();
        assert_eq!(created.id, Some(1));

        let mut changed = created.clone();
        changed.label = "b".into();
        futures::executor::block_on(repo.save(&changed)).unwrap();
        let first = futures::executor::block_on(repo.find_first()).unwrap();
        assert_eq!(first.label, "b");
        assert_eq!(futures::executor::block_on(repo.count()).unwrap(), 1);
    }

    #[test]
    fn save_with_unknown_id_falls_back_to_insert() {
        let repo = MiniRepo::default();
        let saved = futures::executor::block_on(repo.save(&Mini {
            id: Some(42),
            label: "x".into(),
        }))
        .unwrap();
        assert_eq!(saved.id, Some(42));
        let found = futures::executor::block_on(repo.find_by_id(&42)).unwrap();
        assert_eq!(found.map(|m| m.label), Some("x".to_string()));
    }

    struct MiniAdapter;
    impl RowAdapter<Mini> for MiniAdapter {
        type Row = (i64, &'static str);
        fn from_row(&self, row: &Self::Row) -> RepoResult<Mini> {
            Ok(Mini {
                id: Some(row.0),
                label: row.1.to_string(),
            })
        }
    }

    #[test]
    fn row_adapter_from_row_works() {
        let ent = MiniAdapter.from_row(&(7, "seven")).unwrap();
        assert_eq!(
            ent,
            Mini {
                id: Some(7),
                label: "seven".into()
            }
        );
    }
}
