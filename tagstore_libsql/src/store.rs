use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use libsql::{Builder, Connection, Database, Row};
use tagstore_core::{
    ColumnDef, ColumnType, Fetchable, Identifiable, Insertable, RepoError, RepoResult,
    RowAdapter, SchemaManager, TableSchema, Updatable,
};

#[cfg(feature = "tracing")]
use tracing::info;

use crate::{obs_record, LibsqlRepository, Observe, StoreConfig};

/// Handle to one embedded database, holding a single connection for its lifetime.
///
/// Every repository obtained from [`LibsqlStore::repository`] runs on that same
/// connection, so an in-memory database stays visible to all of them, and
/// stays open for as long as any of them is alive.
pub struct LibsqlStore {
    // Shared with every vended repository.
    db: Arc<Database>,
    conn: Connection,
    config: StoreConfig,
}

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug)]
struct ExistingColumn {
    name: String,
    declared_type: String,
    primary_key: bool,
}

impl LibsqlStore {
    /// Open (or create) the database at `path`. An empty path opens an in-memory database.
    pub async fn open(path: &str) -> RepoResult<Self> {
        Self::open_with(StoreConfig::new(path)).await
    }

    pub async fn open_with(config: StoreConfig) -> RepoResult<Self> {
        let db = Builder::new_local(config.database_path())
            .build()
            .await
            .map_err(RepoError::connection)?;
        let conn = db.connect().map_err(RepoError::connection)?;
        if let Some(timeout) = config.busy_timeout {
            conn.query(
                &format!("PRAGMA busy_timeout = {}", timeout.as_millis()),
                (),
            )
            .await
            .map_err(RepoError::connection)?;
        }
        // Touch the database file so an unusable path fails here rather than on first use.
        conn.query("PRAGMA schema_version", ())
            .await
            .map_err(RepoError::connection)?;

        #[cfg(feature = "tracing")]
        info!(
            path = config.database_path(),
            in_memory = config.is_in_memory(),
            "store opened"
        );

        Ok(Self {
            db: Arc::new(db),
            conn,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The store's connection, for statements the repository API does not cover.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// A repository for entity `T` bound to this store's connection.
    pub fn repository<T, A>(&self, adapter: A) -> LibsqlRepository<T, A>
    where
        T: Fetchable + Identifiable + Insertable + Updatable + 'static,
        A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
    {
        LibsqlRepository::from_conn(self.conn.clone(), adapter)
            .with_observe(Observe::from(&self.config))
            .holding(Arc::clone(&self.db))
    }

    async fn exec_ddl(&self, sql: &str) -> RepoResult<()> {
        self.conn
            .execute(sql, ())
            .await
            .map_err(|e| RepoError::schema(format!("`{}` failed: {}", sql, e)))?;
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> RepoResult<Vec<ExistingColumn>> {
        let sql = tagstore_sql_builder::table_info(table);
        let inspect = |e: libsql::Error| RepoError::schema(format!("inspecting {}: {}", table, e));
        let mut rows = self.conn.query(&sql, ()).await.map_err(inspect)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(inspect)? {
            let name: String = row.get(1).map_err(inspect)?;
            let declared_type: String = row.get(2).map_err(inspect)?;
            let pk: i64 = row.get(5).map_err(inspect)?;
            out.push(ExistingColumn {
                name,
                declared_type,
                primary_key: pk != 0,
            });
        }
        Ok(out)
    }

    async fn index_columns(&self, index: &str) -> RepoResult<Vec<String>> {
        let sql = tagstore_sql_builder::index_info(index);
        let inspect = |e: libsql::Error| RepoError::schema(format!("inspecting {}: {}", index, e));
        let mut rows = self.conn.query(&sql, ()).await.map_err(inspect)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(inspect)? {
            let name: String = row.get(2).map_err(inspect)?;
            out.push(name);
        }
        Ok(out)
    }

    /// Names of the UNIQUE indexes defined on `table`.
    async fn unique_index_names(&self, table: &str) -> RepoResult<Vec<String>> {
        let sql = tagstore_sql_builder::index_list(table);
        let inspect = |e: libsql::Error| RepoError::schema(format!("inspecting {}: {}", table, e));
        let mut rows = self.conn.query(&sql, ()).await.map_err(inspect)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(inspect)? {
            let name: String = row.get(1).map_err(inspect)?;
            let unique: i64 = row.get(2).map_err(inspect)?;
            if unique != 0 {
                out.push(name);
            }
        }
        Ok(out)
    }

    async fn migrate(&self, schema: &TableSchema) -> RepoResult<()> {
        schema.validate()?;
        self.exec_ddl(&tagstore_sql_builder::create_table(schema))
            .await?;

        let existing = self.table_columns(&schema.name).await?;
        for col in &schema.columns {
            match existing.iter().find(|c| c.name == col.name) {
                Some(found) => check_compatible(&schema.name, col, found)?,
                None if col.primary_key => {
                    return Err(RepoError::schema(format!(
                        "table `{}` exists without primary key column `{}`",
                        schema.name, col.name
                    )));
                }
                None if col.not_null && col.default.is_none() => {
                    return Err(RepoError::schema(format!(
                        "cannot add NOT NULL column `{}` to `{}` without a default",
                        col.name, schema.name
                    )));
                }
                None => {
                    self.exec_ddl(&tagstore_sql_builder::add_column(&schema.name, col))
                        .await?;
                    #[cfg(feature = "tracing")]
                    info!(table = %schema.name, column = %col.name, "added missing column");
                }
            }
        }

        for idx in &schema.unique_indexes {
            self.exec_ddl(&tagstore_sql_builder::create_unique_index(
                &schema.name,
                idx,
            ))
            .await?;
            // IF NOT EXISTS keeps a same-named index even if it is plain or on another table.
            if !self
                .unique_index_names(&schema.name)
                .await?
                .contains(&idx.name)
            {
                return Err(RepoError::schema(format!(
                    "index `{}` exists but is not a unique index on `{}`",
                    idx.name, schema.name
                )));
            }
            let covered = self.index_columns(&idx.name).await?;
            if covered != idx.columns {
                return Err(RepoError::schema(format!(
                    "index `{}` covers ({}), expected ({})",
                    idx.name,
                    covered.join(", "),
                    idx.columns.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn check_compatible(table: &str, want: &ColumnDef, found: &ExistingColumn) -> RepoResult<()> {
    if ColumnType::from_declared(&found.declared_type) != Some(want.column_type) {
        return Err(RepoError::schema(format!(
            "column `{}.{}` has type `{}`, expected {}",
            table,
            want.name,
            found.declared_type,
            want.column_type.sql_name()
        )));
    }
    if found.primary_key != want.primary_key {
        return Err(RepoError::schema(format!(
            "column `{}.{}` primary key mismatch (existing: {}, declared: {})",
            table, want.name, found.primary_key, want.primary_key
        )));
    }
    Ok(())
}

#[async_trait]
impl SchemaManager for LibsqlStore {
    async fn ensure_schema(&self, schema: &TableSchema) -> RepoResult<()> {
        let start = Instant::now();
        let out = self.migrate(schema).await;
        obs_record(
            &Observe::from(&self.config),
            "ensure_schema",
            &schema.name,
            start,
            0,
            out.as_ref().err(),
        );
        out
    }
}
