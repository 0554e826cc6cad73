#![forbid(unsafe_code)]
//! Minimal SQL builder helpers that leverage entity metadata (`Fetchable`,
//! `Insertable`, `Updatable`) and explicit `TableSchema` descriptions.
//!
//! All statements use SQLite `?` placeholders, bound positionally.

use tagstore_core::{ColumnDef, TableSchema, UniqueIndex};

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Build a simple SELECT ... WHERE id = ? statement using metadata from `E`.
pub fn select_by_id<E>(id_column: &str) -> String
where
    E: tagstore_core::Fetchable,
{
    let cols = E::SELECT_COLUMNS.join(", ");
    let table = E::TABLE;
    format!(
        "SELECT {cols} FROM {table} WHERE {id} = ?",
        cols = cols,
        table = table,
        id = id_column,
    )
}

/// Build SELECT <cols> FROM <table>
pub fn select_all<E>() -> String
where
    E: tagstore_core::Fetchable,
{
    let cols = E::SELECT_COLUMNS.join(", ");
    let table = E::TABLE;
    format!("SELECT {cols} FROM {table}", cols = cols, table = table)
}

/// Build SELECT with optional ORDER BY, LIMIT, OFFSET
pub fn select_with_pagination<E>(
    order_by: Option<&str>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> String
where
    E: tagstore_core::Fetchable,
{
    let mut sql = select_all::<E>();
    if let Some(ob) = order_by {
        if !ob.trim().is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(ob);
        }
    }
    if let Some(l) = limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&l.to_string());
    }
    if let Some(off) = offset {
        sql.push_str(" OFFSET ");
        sql.push_str(&off.to_string());
    }
    sql
}

/// Build SELECT ... ORDER BY <id> ASC LIMIT 1, the row with the lowest key.
pub fn select_first<E>(id_column: &str) -> String
where
    E: tagstore_core::Fetchable,
{
    let order = format!("{} ASC", id_column);
    select_with_pagination::<E>(Some(&order), Some(1), None)
}

/// Build SELECT COUNT(*) FROM <table>
pub fn select_count_all<E>() -> String
where
    E: tagstore_core::Fetchable,
{
    format!("SELECT COUNT(*) FROM {table}", table = E::TABLE)
}

/// Build DELETE ... WHERE id = ?
pub fn delete_by_id<E>(id_column: &str) -> String
where
    E: tagstore_core::Fetchable,
{
    format!(
        "DELETE FROM {table} WHERE {id} = ?",
        table = E::TABLE,
        id = id_column,
    )
}

/// Build INSERT INTO <table> (<cols>) VALUES (<placeholders>), letting the
/// database assign the key.
pub fn insert<E>() -> String
where
    E: tagstore_core::Fetchable + tagstore_core::Insertable,
{
    let cols = E::INSERT_COLUMNS;
    format!(
        "INSERT INTO {table} ({cols}) VALUES ({vals})",
        table = E::TABLE,
        cols = cols.join(", "),
        vals = placeholders(cols.len())
    )
}

/// Build INSERT INTO <table> (<id>, <cols>) VALUES (...) for an entity whose
/// key is already known. The id is bound first.
pub fn insert_with_id<E>(id_column: &str) -> String
where
    E: tagstore_core::Fetchable + tagstore_core::Insertable,
{
    let cols = E::INSERT_COLUMNS;
    format!(
        "INSERT INTO {table} ({id}, {cols}) VALUES ({vals})",
        table = E::TABLE,
        id = id_column,
        cols = cols.join(", "),
        vals = placeholders(cols.len() + 1)
    )
}

/// Build UPDATE <table> SET <col1> = ?, ... WHERE <id> = ?
pub fn update_by_id<E>(id_column: &str) -> String
where
    E: tagstore_core::Fetchable + tagstore_core::Updatable,
{
    let assignments: Vec<String> = E::UPDATE_COLUMNS
        .iter()
        .map(|col| format!("{col} = ?", col = col))
        .collect();
    format!(
        "UPDATE {table} SET {set_clause} WHERE {id} = ?",
        table = E::TABLE,
        set_clause = assignments.join(", "),
        id = id_column,
    )
}

/// Render one column definition as used by CREATE TABLE and ADD COLUMN.
pub fn column_definition(col: &ColumnDef) -> String {
    let mut sql = format!("{} {}", col.name, col.column_type.sql_name());
    if col.primary_key {
        sql.push_str(" PRIMARY KEY");
        if col.auto_increment {
            sql.push_str(" AUTOINCREMENT");
        }
    }
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default.sql_literal());
    }
    sql
}

/// Build CREATE TABLE IF NOT EXISTS from a schema description.
pub fn create_table(schema: &TableSchema) -> String {
    let cols: Vec<String> = schema.columns.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({cols})",
        table = schema.name,
        cols = cols.join(", ")
    )
}

/// Build CREATE UNIQUE INDEX IF NOT EXISTS <name> ON <table> (<cols>)
pub fn create_unique_index(table: &str, index: &UniqueIndex) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table} ({cols})",
        name = index.name,
        table = table,
        cols = index.columns.join(", ")
    )
}

/// Build ALTER TABLE <table> ADD COLUMN <definition>
pub fn add_column(table: &str, col: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {table} ADD COLUMN {def}",
        table = table,
        def = column_definition(col)
    )
}

/// PRAGMA listing (cid, name, type, notnull, dflt_value, pk) per column.
pub fn table_info(table: &str) -> String {
    format!("PRAGMA table_info({})", table)
}

/// PRAGMA listing (seqno, cid, name) per indexed column.
pub fn index_info(index: &str) -> String {
    format!("PRAGMA index_info({})", index)
}

/// PRAGMA listing (seq, name, unique, origin, partial) per index on a table.
pub fn index_list(table: &str) -> String {
    format!("PRAGMA index_list({})", table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagstore_core::{
        ColumnDef, DefaultValue, Fetchable, Identifiable, Insertable, ParamValue, TableSchema,
        UniqueIndex, Updatable,
    };

    struct User {
        id: Option<i64>,
        email: String,
    }

    impl Fetchable for User {
        const TABLE: &'static str = "users";
        const SELECT_COLUMNS: &'static [&'static str] = &["id", "email"];
    }

    impl Identifiable for User {
        type Key = i64;
        const ID_COLUMN: &'static str = "id";
        fn id(&self) -> Option<i64> {
            self.id
        }
    }

    impl Insertable for User {
        const INSERT_COLUMNS: &'static [&'static str] = &["email"];
        fn insert_values(&self) -> Vec<ParamValue> {
            vec![ParamValue::String(self.email.clone())]
        }
    }

    impl Updatable for User {
        const UPDATE_COLUMNS: &'static [&'static str] = &["email"];
        fn update_values(&self) -> Vec<ParamValue> {
            vec![
                ParamValue::String(self.email.clone()),
                self.id.map_or(ParamValue::Null, ParamValue::I64),
            ]
        }
    }

    // Custom table and column mapping with more than one insert column.
    struct Person;

    impl Fetchable for Person {
        const TABLE: &'static str = "people";
        const SELECT_COLUMNS: &'static [&'static str] = &["id", "email_address", "full_name"];
    }

    impl Insertable for Person {
        const INSERT_COLUMNS: &'static [&'static str] = &["email_address", "full_name"];
        fn insert_values(&self) -> Vec<ParamValue> {
            Vec::new()
        }
    }

    impl Updatable for Person {
        const UPDATE_COLUMNS: &'static [&'static str] = &["email_address", "full_name"];
        fn update_values(&self) -> Vec<ParamValue> {
            Vec::new()
        }
    }

    #[test]
    fn test_select_by_id() {
        let sql = select_by_id::<User>("id");
        assert_eq!(sql, "SELECT id, email FROM users WHERE id = ?");
    }

    #[test]
    fn test_delete_by_id() {
        assert_eq!(delete_by_id::<User>("id"), "DELETE FROM users WHERE id = ?");
    }

    #[test]
    fn test_insert() {
        assert_eq!(insert::<User>(), "INSERT INTO users (email) VALUES (?)");
    }

    #[test]
    fn test_insert_with_id_binds_id_first() {
        assert_eq!(
            insert_with_id::<Person>("id"),
            "INSERT INTO people (id, email_address, full_name) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_update_by_id() {
        assert_eq!(
            update_by_id::<User>("id"),
            "UPDATE users SET email = ? WHERE id = ?"
        );
        assert_eq!(
            update_by_id::<Person>("id"),
            "UPDATE people SET email_address = ?, full_name = ? WHERE id = ?"
        );
        // One placeholder per update value, id last.
        let u = User {
            id: Some(1),
            email: "a@x".into(),
        };
        assert_eq!(
            update_by_id::<User>(User::ID_COLUMN).matches('?').count(),
            u.update_values().len()
        );
        assert_eq!(u.id(), Some(1));
    }

    #[test]
    fn test_select_first_orders_by_key() {
        assert_eq!(
            select_first::<User>("id"),
            "SELECT id, email FROM users ORDER BY id ASC LIMIT 1"
        );
    }

    #[test]
    fn test_select_with_pagination_none() {
        let sql = select_with_pagination::<User>(None, None, None);
        assert_eq!(sql, "SELECT id, email FROM users");
    }

    #[test]
    fn test_select_with_pagination_full() {
        let sql = select_with_pagination::<User>(Some("email DESC"), Some(10), Some(20));
        assert_eq!(
            sql,
            "SELECT id, email FROM users ORDER BY email DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_select_with_pagination_order_by_whitespace_only_ignored() {
        let sql = select_with_pagination::<User>(Some("   \t"), Some(5), Some(0));
        assert_eq!(sql, "SELECT id, email FROM users LIMIT 5 OFFSET 0");
    }

    #[test]
    fn test_select_count_all() {
        assert_eq!(select_count_all::<User>(), "SELECT COUNT(*) FROM users");
    }

    #[test]
    fn test_custom_table_and_columns_select_all() {
        assert_eq!(
            select_all::<Person>(),
            "SELECT id, email_address, full_name FROM people"
        );
    }

    fn tag_schema() -> TableSchema {
        TableSchema::new("tb_tag")
            .with_column(ColumnDef::integer("id").as_primary_key())
            .with_column(ColumnDef::integer("owner_id").required(DefaultValue::Integer(0)))
            .with_column(ColumnDef::text("tag_key").required(DefaultValue::Text(String::new())))
            .with_column(ColumnDef::integer("created_at"))
            .with_unique_index(UniqueIndex::new("idx_owner_key", &["owner_id", "tag_key"]))
    }

    #[test]
    fn test_create_table_from_schema() {
        assert_eq!(
            create_table(&tag_schema()),
            "CREATE TABLE IF NOT EXISTS tb_tag (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             owner_id INTEGER NOT NULL DEFAULT 0, tag_key TEXT NOT NULL DEFAULT '', \
             created_at INTEGER)"
        );
    }

    #[test]
    fn test_create_unique_index() {
        let schema = tag_schema();
        assert_eq!(
            create_unique_index(&schema.name, &schema.unique_indexes[0]),
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_owner_key ON tb_tag (owner_id, tag_key)"
        );
    }

    #[test]
    fn test_add_column_and_pragmas() {
        let col = ColumnDef::text("tag_value").required(DefaultValue::Text(String::new()));
        assert_eq!(
            add_column("tb_tag", &col),
            "ALTER TABLE tb_tag ADD COLUMN tag_value TEXT NOT NULL DEFAULT ''"
        );
        assert_eq!(table_info("tb_tag"), "PRAGMA table_info(tb_tag)");
        assert_eq!(index_info("idx_owner_key"), "PRAGMA index_info(idx_owner_key)");
        assert_eq!(index_list("tb_tag"), "PRAGMA index_list(tb_tag)");
    }
}
