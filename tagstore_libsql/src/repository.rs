use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use libsql::{Connection, Database, Row, Value};
use tagstore_core::{
    timestamp_now, Fetchable, Identifiable, Insertable, ParamValue, RepoError, RepoResult,
    Repository, RowAdapter, Timestamped, Updatable,
};

use crate::{classify, obs_record, Observe};

// Helper function to convert ParamValue to libsql::Value.
fn to_libsql_value(p: ParamValue) -> Value {
    match p {
        ParamValue::String(s) => s.into(),
        ParamValue::I32(i) => (i as i64).into(), // libsql uses i64 for integers
        ParamValue::I64(i) => i.into(),
        ParamValue::F64(f) => f.into(),
        ParamValue::Bool(b) => (b as i64).into(), // SQLite bools are 0/1
        ParamValue::Null => Value::Null,
    }
}

/// Statements prepared once per repository from the entity metadata.
struct RepoSql<T> {
    select_by_id: String,
    select_first: String,
    count: String,
    delete_by_id: String,
    insert: String,
    insert_with_id: String,
    update_by_id: String,
    _marker: PhantomData<T>,
}

impl<T> RepoSql<T>
where
    T: Fetchable + Identifiable + Insertable + Updatable,
{
    fn new() -> Self {
        Self {
            select_by_id: tagstore_sql_builder::select_by_id::<T>(T::ID_COLUMN),
            select_first: tagstore_sql_builder::select_first::<T>(T::ID_COLUMN),
            count: tagstore_sql_builder::select_count_all::<T>(),
            delete_by_id: tagstore_sql_builder::delete_by_id::<T>(T::ID_COLUMN),
            insert: tagstore_sql_builder::insert::<T>(),
            insert_with_id: tagstore_sql_builder::insert_with_id::<T>(T::ID_COLUMN),
            update_by_id: tagstore_sql_builder::update_by_id::<T>(T::ID_COLUMN),
            _marker: PhantomData,
        }
    }
}

/// A fully asynchronous, `libsql`-backed repository running on one connection.
pub struct LibsqlRepository<T, A>
where
    T: Identifiable + 'static,
    A: RowAdapter<T> + Send + Sync + 'static,
{
    conn: Connection,
    // Set when vended by a store, so the database outlives the store handle.
    _db: Option<Arc<Database>>,
    adapter: A,
    sql: RepoSql<T>,
    obs: Observe,
}

impl<T, A> LibsqlRepository<T, A>
where
    T: Identifiable + 'static,
    A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
{
    /// Creates a repository over an existing connection. Prefer
    /// [`LibsqlStore::repository`](crate::LibsqlStore::repository), which also
    /// carries the store's logging settings.
    pub fn from_conn(conn: Connection, adapter: A) -> Self
    where
        T: Fetchable + Insertable + Updatable,
    {
        Self {
            conn,
            _db: None,
            adapter,
            sql: RepoSql::<T>::new(),
            obs: Observe::default(),
        }
    }

    pub(crate) fn with_observe(mut self, obs: Observe) -> Self {
        self.obs = obs;
        self
    }

    pub(crate) fn holding(mut self, db: Arc<Database>) -> Self {
        self._db = Some(db);
        self
    }

    async fn fetch_optional(&self, sql: &str, params: Vec<Value>) -> RepoResult<Option<T>> {
        let mut rows = self.conn.query(sql, params).await.map_err(classify)?;
        match rows.next().await.map_err(classify)? {
            Some(row) => Ok(Some(self.adapter.from_row(&row)?)),
            None => Ok(None),
        }
    }
}

impl<T, A> LibsqlRepository<T, A>
where
    T: Fetchable + Identifiable + Insertable + Updatable + Timestamped + Send + Sync + Clone + 'static,
    A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
    T::Key: Clone + Send + Sync + 'static + Into<Value> + serde::de::DeserializeOwned,
{
    fn record<R>(&self, op: &str, start: Instant, out: &RepoResult<R>, rows: usize) {
        obs_record(&self.obs, op, T::TABLE, start, rows, out.as_ref().err());
    }

    async fn insert_inner(&self, entity: &T) -> RepoResult<T> {
        let mut entity = entity.clone();
        entity.stamp_created(timestamp_now());
        let mut values: Vec<Value> = Vec::with_capacity(T::INSERT_COLUMNS.len() + 1);

        let key: T::Key = match entity.id() {
            Some(id) => {
                values.push(id.clone().into());
                values.extend(entity.insert_values().into_iter().map(to_libsql_value));
                self.conn
                    .execute(&self.sql.insert_with_id, values)
                    .await
                    .map_err(classify)?;
                id
            }
            None => {
                values.extend(entity.insert_values().into_iter().map(to_libsql_value));
                self.conn
                    .execute(&self.sql.insert, values)
                    .await
                    .map_err(classify)?;
                let new_id = self.conn.last_insert_rowid();
                serde_json::from_value(serde_json::Value::from(new_id))
                    .map_err(RepoError::mapping)?
            }
        };

        // Read back on the same connection so the caller sees stored values.
        self.fetch_optional(&self.sql.select_by_id, vec![key.into()])
            .await?
            .ok_or_else(|| {
                RepoError::backend(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "Failed to fetch entity after insert",
                ))
            })
    }

    async fn update_inner(&self, entity: &T) -> RepoResult<T> {
        let id = entity.id().ok_or(RepoError::NotFound)?;
        let mut entity = entity.clone();
        entity.stamp_updated(timestamp_now());
        let values: Vec<Value> = entity
            .update_values()
            .into_iter()
            .map(to_libsql_value)
            .collect();
        let n = self
            .conn
            .execute(&self.sql.update_by_id, values)
            .await
            .map_err(classify)?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch_optional(&self.sql.select_by_id, vec![id.into()])
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn count_inner(&self) -> RepoResult<u64> {
        let mut rows = self
            .conn
            .query(&self.sql.count, ())
            .await
            .map_err(classify)?;
        let row = rows.next().await.map_err(classify)?.ok_or_else(|| {
            RepoError::backend(std::io::Error::new(
                std::io::ErrorKind::Other,
                "COUNT(*) returned no row",
            ))
        })?;
        let n: i64 = row.get(0).map_err(RepoError::mapping)?;
        Ok(n as u64)
    }
}

#[async_trait]
impl<T, A> Repository<T> for LibsqlRepository<T, A>
where
    T: Fetchable + Identifiable + Insertable + Updatable + Timestamped + Send + Sync + Clone + 'static,
    A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
    T::Key: Clone + Send + Sync + 'static + Into<Value> + serde::de::DeserializeOwned,
{
    async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>> {
        let start = Instant::now();
        let out = self
            .fetch_optional(&self.sql.select_by_id, vec![id.clone().into()])
            .await;
        let rows = matches!(out, Ok(Some(_))) as usize;
        self.record("find_by_id", start, &out, rows);
        out
    }

    async fn find_first(&self) -> RepoResult<T> {
        let start = Instant::now();
        let out = self
            .fetch_optional(&self.sql.select_first, Vec::new())
            .await
            .and_then(|found| found.ok_or(RepoError::NotFound));
        self.record("find_first", start, &out, out.is_ok() as usize);
        out
    }

    async fn count(&self) -> RepoResult<u64> {
        let start = Instant::now();
        let out = self.count_inner().await;
        self.record("count", start, &out, 1);
        out
    }

    async fn insert(&self, entity: &T) -> RepoResult<T> {
        let start = Instant::now();
        let out = self.insert_inner(entity).await;
        self.record("insert", start, &out, out.is_ok() as usize);
        out
    }

    async fn update(&self, entity: &T) -> RepoResult<T> {
        let start = Instant::now();
        let out = self.update_inner(entity).await;
        self.record("update", start, &out, out.is_ok() as usize);
        out
    }

    async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool> {
        let start = Instant::now();
        let out = self
            .conn
            .execute(&self.sql.delete_by_id, vec![id.clone().into()])
            .await
            .map_err(classify);
        let n = *out.as_ref().unwrap_or(&0) as usize;
        self.record("delete_by_id", start, &out, n);
        out.map(|n| n > 0)
    }
}
