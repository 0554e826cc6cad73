#![forbid(unsafe_code)]
//! Facade crate for the tagstore CRUD harness.
//!
//! Re-exports the core traits and the libsql store so that a single dependency
//! is enough, and adds the [`TaggedRecord`] entity together with the
//! [`verify`] sequence that exercises it end to end.
//!
//! ```no_run
//! use tagstore::{verify, LibsqlStore, TaggedRecordRowAdapter};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LibsqlStore::open("").await?; // in-memory
//! let repo = store.repository(TaggedRecordRowAdapter);
//! let report = verify::run(&store, &repo).await?;
//! assert_eq!(report.persisted.owner_id, 100);
//! # Ok(())
//! # }
//! ```

pub mod record;
pub mod verify;

// Re-export all core traits.
pub use tagstore_core::{
    timestamp_now, ColumnDef, ColumnType, DefaultValue, Fetchable, Identifiable, Insertable,
    ParamValue, RepoError, RepoResult, Repository, RowAdapter, SchemaManager, TableSchema,
    Timestamped, UniqueIndex, Updatable,
};

pub use record::{TaggedRecord, TaggedRecordRowAdapter};

// Optional re-export of the SQL builder helpers.
#[cfg(feature = "sql-builder")]
pub use tagstore_sql_builder as sql_builder;

pub mod backends {
    pub use tagstore_libsql::{LibsqlRepository, LibsqlStore, StoreConfig};
}

pub use backends::{LibsqlStore, StoreConfig};

/// Repository type for [`TaggedRecord`] on the libsql backend.
pub type TaggedRecordRepository = backends::LibsqlRepository<TaggedRecord, TaggedRecordRowAdapter>;
