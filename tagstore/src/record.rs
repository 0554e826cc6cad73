//! The tagged record entity: an `(owner_id, key)` pair associated with a value.

use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use tagstore_core::{
    ColumnDef, DefaultValue, Fetchable, Identifiable, Insertable, ParamValue, RepoError,
    RepoResult, RowAdapter, TableSchema, Timestamped, UniqueIndex, Updatable,
};

pub const TABLE: &str = "tb_tagged_record";
pub const OWNER_KEY_INDEX: &str = "idx_owner_id_key";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedRecord {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    pub owner_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub updated_by: i64,
}

impl TaggedRecord {
    pub fn new(owner_id: i64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            owner_id,
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// True when every field the caller controls matches `other`. Ignores the
    /// id and both timestamps.
    pub fn same_caller_fields(&self, other: &Self) -> bool {
        self.owner_id == other.owner_id
            && self.key == other.key
            && self.value == other.value
            && self.created_by == other.created_by
            && self.updated_by == other.updated_by
    }
}

impl Fetchable for TaggedRecord {
    const TABLE: &'static str = TABLE;
    const SELECT_COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "tag_key",
        "tag_value",
        "created_at",
        "updated_at",
        "created_by",
        "updated_by",
    ];
}

impl Identifiable for TaggedRecord {
    type Key = i64;
    const ID_COLUMN: &'static str = "id";

    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl Insertable for TaggedRecord {
    const INSERT_COLUMNS: &'static [&'static str] = &[
        "owner_id",
        "tag_key",
        "tag_value",
        "created_at",
        "updated_at",
        "created_by",
        "updated_by",
    ];

    fn insert_values(&self) -> Vec<ParamValue> {
        vec![
            ParamValue::I64(self.owner_id),
            ParamValue::String(self.key.clone()),
            ParamValue::String(self.value.clone()),
            ParamValue::timestamp(self.created_at),
            ParamValue::timestamp(self.updated_at),
            ParamValue::I64(self.created_by),
            ParamValue::I64(self.updated_by),
        ]
    }
}

impl Updatable for TaggedRecord {
    const UPDATE_COLUMNS: &'static [&'static str] = Self::INSERT_COLUMNS;

    fn update_values(&self) -> Vec<ParamValue> {
        let mut values = self.insert_values();
        values.push(self.id.map_or(ParamValue::Null, ParamValue::I64));
        values
    }
}

impl Timestamped for TaggedRecord {
    fn stamp_created(&mut self, now: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    fn stamp_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

/// Table layout for [`TaggedRecord`], including the `(owner_id, tag_key)` uniqueness pair.
pub fn schema() -> TableSchema {
    TableSchema::new(TABLE)
        .with_column(ColumnDef::integer("id").as_primary_key())
        .with_column(ColumnDef::integer("owner_id").required(DefaultValue::Integer(0)))
        .with_column(ColumnDef::text("tag_key").required(DefaultValue::Text(String::new())))
        .with_column(ColumnDef::text("tag_value").required(DefaultValue::Text(String::new())))
        .with_column(ColumnDef::integer("created_at"))
        .with_column(ColumnDef::integer("updated_at"))
        .with_column(ColumnDef::integer("created_by").required(DefaultValue::Integer(0)))
        .with_column(ColumnDef::integer("updated_by").required(DefaultValue::Integer(0)))
        .with_unique_index(UniqueIndex::new(OWNER_KEY_INDEX, &["owner_id", "tag_key"]))
}

#[derive(Debug, thiserror::Error)]
#[error("column {column} holds {found}, expected unix milliseconds or NULL")]
struct BadTimestamp {
    column: &'static str,
    found: String,
}

fn timestamp_at(row: &Row, idx: i32, column: &'static str) -> RepoResult<Option<DateTime<Utc>>> {
    match row.get_value(idx).map_err(RepoError::mapping)? {
        Value::Null => Ok(None),
        Value::Integer(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| {
                RepoError::mapping(BadTimestamp {
                    column,
                    found: ms.to_string(),
                })
            }),
        other => Err(RepoError::mapping(BadTimestamp {
            column,
            found: format!("{:?}", other),
        })),
    }
}

/// Maps a `libsql::Row` selected with [`TaggedRecord::SELECT_COLUMNS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedRecordRowAdapter;

impl RowAdapter<TaggedRecord> for TaggedRecordRowAdapter {
    type Row = Row;

    fn from_row(&self, row: &Row) -> RepoResult<TaggedRecord> {
        Ok(TaggedRecord {
            id: Some(row.get::<i64>(0).map_err(RepoError::mapping)?),
            owner_id: row.get(1).map_err(RepoError::mapping)?,
            key: row.get(2).map_err(RepoError::mapping)?,
            value: row.get(3).map_err(RepoError::mapping)?,
            created_at: timestamp_at(row, 4, "created_at")?,
            updated_at: timestamp_at(row, 5, "updated_at")?,
            created_by: row.get(6).map_err(RepoError::mapping)?,
            updated_by: row.get(7).map_err(RepoError::mapping)?,
        })
    }
}
