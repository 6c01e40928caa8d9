//! Row-level primitives over the schema-derived tables. Rows travel as JSON
//! objects keyed by field name; columns are resolved through the schema.

use super::map_sqlite_error;
use crate::error::{CrmError, Result};
use crate::schema::ddl::quote_ident;
use crate::schema::{FieldDefinition, FieldType, SchemaDefinition, TableDefinition};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

/// An equality condition on a field; `id` and many-to-many fields are
/// accepted too (membership for the latter).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Insert a row from the column fields present in `data`. Many-to-many
/// fields are ignored here. Returns the new id.
pub fn insert_row(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    data: &Map<String, Value>,
) -> Result<i64> {
    let def = schema.table(table)?;
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (field_name, field) in def.columns() {
        if let Some(value) = data.get(field_name) {
            columns.push(quote_ident(&field.column_name(field_name)));
            values.push(json_to_sql(field_name, field, value)?);
        }
    }

    let db_table = quote_ident(&def.db_table_name(table));
    let sql = if columns.is_empty() {
        format!("INSERT INTO {db_table} DEFAULT VALUES")
    } else {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {db_table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    conn.execute(&sql, params_from_iter(values))
        .map_err(|e| map_sqlite_error(schema, e))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the column fields present in `data`. Fails with `NotFound`
/// when no row has the id.
pub fn update_row(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    id: i64,
    data: &Map<String, Value>,
) -> Result<()> {
    let def = schema.table(table)?;
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for (field_name, field) in def.columns() {
        if let Some(value) = data.get(field_name) {
            values.push(json_to_sql(field_name, field, value)?);
            assignments.push(format!(
                "{} = ?{}",
                quote_ident(&field.column_name(field_name)),
                values.len()
            ));
        }
    }
    if assignments.is_empty() {
        return if row_exists(conn, schema, table, id)? {
            Ok(())
        } else {
            Err(not_found(table, id))
        };
    }

    values.push(SqlValue::Integer(id));
    let sql = format!(
        "UPDATE {} SET {} WHERE \"id\" = ?{}",
        quote_ident(&def.db_table_name(table)),
        assignments.join(", "),
        values.len()
    );
    let changed = conn
        .execute(&sql, params_from_iter(values))
        .map_err(|e| map_sqlite_error(schema, e))?;
    if changed == 0 {
        return Err(not_found(table, id));
    }
    Ok(())
}

/// Fetch one row, including its many-to-many id lists.
pub fn get_row(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    id: i64,
) -> Result<Option<Map<String, Value>>> {
    let def = schema.table(table)?;
    let sql = format!("{} WHERE \"id\" = ?1", select_sql(table, def));
    let row = conn
        .query_row(&sql, params![id], |row| read_row(def, row))
        .optional()?;

    match row {
        Some(mut row) => {
            attach_many_to_many(conn, schema, table, id, &mut row)?;
            Ok(Some(row))
        }
        None => Ok(None),
    }
}

/// List rows matching every filter, ordered by id.
pub fn list_rows(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    filters: &[Filter],
) -> Result<Vec<Map<String, Value>>> {
    let def = schema.table(table)?;
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    for filter in filters {
        if filter.field == "id" {
            values.push(id_value(&filter.field, &filter.value)?);
            conditions.push(format!("\"id\" = ?{}", values.len()));
            continue;
        }
        let field = def.fields.get(&filter.field).ok_or_else(|| {
            CrmError::Validation(format!("{table} has no field '{}' to filter on", filter.field))
        })?;

        if field.is_many_to_many() {
            let target = field.target.as_deref().unwrap_or_default();
            let (owner_col, target_col) = schema.join_columns(table, target);
            values.push(id_value(&filter.field, &filter.value)?);
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM {join} WHERE {join}.{owner} = {main}.\"id\" AND {join}.{target} = ?{n})",
                join = quote_ident(&def.join_table_name(table, &filter.field)),
                owner = quote_ident(&owner_col),
                target = quote_ident(&target_col),
                main = quote_ident(&def.db_table_name(table)),
                n = values.len()
            ));
        } else if filter.value.is_null() {
            conditions.push(format!(
                "{} IS NULL",
                quote_ident(&field.column_name(&filter.field))
            ));
        } else {
            values.push(json_to_sql(&filter.field, field, &filter.value)?);
            conditions.push(format!(
                "{} = ?{}",
                quote_ident(&field.column_name(&filter.field)),
                values.len()
            ));
        }
    }

    let mut sql = select_sql(table, def);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY \"id\"");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| read_row(def, row))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    for row in &mut results {
        if let Some(id) = row.get("id").and_then(Value::as_i64) {
            attach_many_to_many(conn, schema, table, id, row)?;
        }
    }
    Ok(results)
}

/// Ids of rows in `table` whose reference `field` points at `target_id`.
pub fn referencing_ids(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    field: &str,
    target_id: i64,
) -> Result<Vec<i64>> {
    let def = schema.table(table)?;
    let column = def
        .fields
        .get(field)
        .map(|f| f.column_name(field))
        .ok_or_else(|| CrmError::Schema(format!("{table} has no field '{field}'")))?;

    let sql = format!(
        "SELECT \"id\" FROM {} WHERE {} = ?1 ORDER BY \"id\"",
        quote_ident(&def.db_table_name(table)),
        quote_ident(&column)
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt.query_map(params![target_id], |row| row.get(0))?;

    let mut results = Vec::new();
    for id in ids {
        results.push(id?);
    }
    Ok(results)
}

/// Delete one row. Returns whether a row was removed.
pub fn delete_row(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    id: i64,
) -> Result<bool> {
    let def = schema.table(table)?;
    let sql = format!(
        "DELETE FROM {} WHERE \"id\" = ?1",
        quote_ident(&def.db_table_name(table))
    );
    let deleted = conn
        .execute(&sql, params![id])
        .map_err(|e| map_sqlite_error(schema, e))?;
    Ok(deleted > 0)
}

pub fn count_rows(conn: &Connection, schema: &SchemaDefinition, table: &str) -> Result<i64> {
    let def = schema.table(table)?;
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&def.db_table_name(table)));
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

pub fn row_exists(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    id: i64,
) -> Result<bool> {
    let def = schema.table(table)?;
    let sql = format!(
        "SELECT 1 FROM {} WHERE \"id\" = ?1",
        quote_ident(&def.db_table_name(table))
    );
    let found: Option<i64> = conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

/// Replace the links of a many-to-many field with `ids`.
pub fn set_many_to_many(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    field: &str,
    owner_id: i64,
    ids: &[i64],
) -> Result<()> {
    let (join, owner_col, target_col) = join_table(schema, table, field)?;

    conn.execute(
        &format!("DELETE FROM {join} WHERE {owner_col} = ?1"),
        params![owner_id],
    )?;
    let insert = format!("INSERT OR IGNORE INTO {join} ({owner_col}, {target_col}) VALUES (?1, ?2)");
    for target_id in ids {
        conn.execute(&insert, params![owner_id, target_id])
            .map_err(|e| map_sqlite_error(schema, e))?;
    }
    Ok(())
}

/// Linked ids of a many-to-many field, ascending.
pub fn get_many_to_many(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    field: &str,
    owner_id: i64,
) -> Result<Vec<i64>> {
    let (join, owner_col, target_col) = join_table(schema, table, field)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {target_col} FROM {join} WHERE {owner_col} = ?1 ORDER BY {target_col}"
    ))?;
    let ids = stmt.query_map(params![owner_id], |row| row.get(0))?;

    let mut results = Vec::new();
    for id in ids {
        results.push(id?);
    }
    Ok(results)
}

/// Quoted (join table, owner column, target column) of a many-to-many field.
fn join_table(
    schema: &SchemaDefinition,
    table: &str,
    field: &str,
) -> Result<(String, String, String)> {
    let def = schema.table(table)?;
    let target = def
        .fields
        .get(field)
        .filter(|f| f.is_many_to_many())
        .and_then(|f| f.target.as_deref())
        .ok_or_else(|| CrmError::Schema(format!("{table}.{field} is not a many-to-many field")))?;
    let (owner_col, target_col) = schema.join_columns(table, target);
    Ok((
        quote_ident(&def.join_table_name(table, field)),
        quote_ident(&owner_col),
        quote_ident(&target_col),
    ))
}

fn attach_many_to_many(
    conn: &Connection,
    schema: &SchemaDefinition,
    table: &str,
    id: i64,
    row: &mut Map<String, Value>,
) -> Result<()> {
    let def = schema.table(table)?;
    for (field_name, _) in def.many_to_many() {
        let ids = get_many_to_many(conn, schema, table, field_name, id)?;
        row.insert(field_name.clone(), Value::from(ids));
    }
    Ok(())
}

fn select_sql(table: &str, def: &TableDefinition) -> String {
    let mut columns = vec![quote_ident("id")];
    for (field_name, field) in def.columns() {
        columns.push(quote_ident(&field.column_name(field_name)));
    }
    format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_ident(&def.db_table_name(table))
    )
}

/// Read a row selected by [`select_sql`] into a JSON object.
fn read_row(def: &TableDefinition, row: &Row<'_>) -> rusqlite::Result<Map<String, Value>> {
    let mut map = Map::new();
    map.insert("id".into(), Value::from(row.get::<_, i64>(0)?));
    for (i, (field_name, field)) in def.columns().enumerate() {
        let value: SqlValue = row.get(i + 1)?;
        map.insert(field_name.clone(), sql_to_json(field, value));
    }
    Ok(map)
}

fn id_value(field: &str, value: &Value) -> Result<SqlValue> {
    value
        .as_i64()
        .map(SqlValue::Integer)
        .ok_or_else(|| CrmError::Validation(format!("Filter on '{field}' expects a record id")))
}

fn not_found(table: &str, id: i64) -> CrmError {
    CrmError::NotFound {
        table: table.to_string(),
        id,
    }
}

/// Convert a field's JSON value to its SQLite representation.
pub fn json_to_sql(field_name: &str, field: &FieldDefinition, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n.as_i64().map(SqlValue::Integer).ok_or_else(|| {
            CrmError::Validation(format!("Field '{field_name}' expects an integer, got {n}"))
        }),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        _ => Err(CrmError::Validation(format!(
            "Field '{field_name}' ({:?}) cannot store {value}",
            field.field_type
        ))),
    }
}

/// Convert a stored SQLite value back to JSON for a field.
pub fn sql_to_json(field: &FieldDefinition, value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) if field.field_type == FieldType::Boolean => Value::Bool(n != 0),
        SqlValue::Integer(n) => Value::from(n),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into()),
    }
}
