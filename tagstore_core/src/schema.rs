//! Explicit table descriptions used to create and verify tables.
//!
//! A `TableSchema` is plain data: backends render it to DDL and compare it with
//! what the database already holds.

use crate::{RepoError, RepoResult};

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Real,
    Blob,
}

impl ColumnType {
    /// The declared type written into `CREATE TABLE`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }

    /// Parse a declared type as reported by the database (case-insensitive).
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Some(ColumnType::Integer),
            "TEXT" => Some(ColumnType::Text),
            "REAL" => Some(ColumnType::Real),
            "BLOB" => Some(ColumnType::Blob),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
}

impl DefaultValue {
    /// SQL literal for a `DEFAULT` clause.
    pub fn sql_literal(&self) -> String {
        match self {
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Real(f) => f.to_string(),
            DefaultValue::Null => "NULL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub not_null: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            auto_increment: false,
            not_null: false,
            default: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    /// Mark as an auto-assigned integer primary key.
    pub fn as_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = true;
        self
    }

    /// Mark as `NOT NULL`, with the default used for existing rows when the
    /// column is added to an existing table.
    pub fn required(mut self, default: DefaultValue) -> Self {
        self.not_null = true;
        self.default = Some(default);
        self
    }
}

/// A named unique index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub name: String,
    pub columns: Vec<String>,
}

impl UniqueIndex {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub unique_indexes: Vec<UniqueIndex>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique_indexes: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_unique_index(mut self, index: UniqueIndex) -> Self {
        self.unique_indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Reject descriptions that cannot be rendered into valid DDL.
    pub fn validate(&self) -> RepoResult<()> {
        if !is_valid_ident(&self.name) {
            return Err(RepoError::schema(format!(
                "invalid table name `{}`",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(RepoError::schema(format!(
                "table `{}` declares no columns",
                self.name
            )));
        }
        for (i, col) in self.columns.iter().enumerate() {
            if !is_valid_ident(&col.name) {
                return Err(RepoError::schema(format!(
                    "invalid column name `{}`",
                    col.name
                )));
            }
            if self.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(RepoError::schema(format!(
                    "duplicate column `{}`",
                    col.name
                )));
            }
            if let Some(DefaultValue::Real(f)) = &col.default {
                if !f.is_finite() {
                    return Err(RepoError::schema(format!(
                        "column `{}` has a non-finite default `{}`",
                        col.name, f
                    )));
                }
            }
            if col.auto_increment && col.column_type != ColumnType::Integer {
                return Err(RepoError::schema(format!(
                    "auto-increment column `{}` must be INTEGER",
                    col.name
                )));
            }
        }
        let pk_count = self.columns.iter().filter(|c| c.primary_key).count();
        if pk_count != 1 {
            return Err(RepoError::schema(format!(
                "table `{}` must declare exactly one primary key (found {})",
                self.name, pk_count
            )));
        }
        for idx in &self.unique_indexes {
            if !is_valid_ident(&idx.name) {
                return Err(RepoError::schema(format!(
                    "invalid index name `{}`",
                    idx.name
                )));
            }
            if idx.columns.is_empty() {
                return Err(RepoError::schema(format!(
                    "index `{}` covers no columns",
                    idx.name
                )));
            }
            if let Some(missing) = idx.columns.iter().find(|c| self.column(c).is_none()) {
                return Err(RepoError::schema(format!(
                    "index `{}` references undeclared column `{}`",
                    idx.name, missing
                )));
            }
        }
        Ok(())
    }
}

/// ASCII letters, digits or `_`, not starting with a digit.
pub fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}
