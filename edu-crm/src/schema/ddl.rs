//! SQLite DDL derived from a [`SchemaDefinition`].

use super::{FieldDefinition, FieldType, OnDeletePolicy, SchemaDefinition};

/// CREATE TABLE / CREATE INDEX statements for every table and join table.
/// All statements are idempotent (`IF NOT EXISTS`).
pub fn create_statements(schema: &SchemaDefinition) -> Vec<String> {
    let mut statements = Vec::new();

    for (key, table) in &schema.tables {
        let db_table = table.db_table_name(key);
        let mut lines = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident("id"))];

        for (field_name, field) in table.columns() {
            lines.push(column_sql(schema, field_name, field));
        }

        for group in &table.unique_together {
            let columns: Vec<String> = group
                .iter()
                .filter_map(|member| {
                    table
                        .fields
                        .get(member)
                        .map(|def| quote_ident(&def.column_name(member)))
                })
                .collect();
            lines.push(format!("UNIQUE ({})", columns.join(", ")));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&db_table),
            lines.join(",\n    ")
        ));

        for (field_name, field) in table.columns() {
            if field.field_type == FieldType::Ref {
                statements.push(index_sql(&db_table, &field.column_name(field_name)));
            }
        }

        for (field_name, field) in table.many_to_many() {
            let Some(target) = field.target.as_deref() else {
                continue;
            };
            let Some(target_table) = schema.tables.get(target) else {
                continue;
            };
            let join_table = table.join_table_name(key, field_name);
            let (owner_col, target_col) = schema.join_columns(key, target);

            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n    {} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n    {} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n    UNIQUE ({}, {})\n)",
                quote_ident(&join_table),
                quote_ident("id"),
                quote_ident(&owner_col),
                quote_ident(&db_table),
                quote_ident("id"),
                quote_ident(&target_col),
                quote_ident(&target_table.db_table_name(target)),
                quote_ident("id"),
                quote_ident(&owner_col),
                quote_ident(&target_col),
            ));
            statements.push(index_sql(&join_table, &target_col));
        }
    }

    statements
}

fn column_sql(schema: &SchemaDefinition, field_name: &str, field: &FieldDefinition) -> String {
    let column = field.column_name(field_name);
    let quoted = quote_ident(&column);

    let sql_type = match field.field_type {
        FieldType::String | FieldType::Email => match field.max_length {
            Some(n) => format!("VARCHAR({n})"),
            None => "TEXT".to_string(),
        },
        FieldType::Text => "TEXT".to_string(),
        FieldType::Integer | FieldType::Ref | FieldType::ManyToMany => "INTEGER".to_string(),
        FieldType::Boolean => "BOOLEAN".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Datetime => "DATETIME".to_string(),
    };

    let mut sql = format!("{quoted} {sql_type}");

    if field.required || field.default.is_some() || field.auto_now_add {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &field.default {
        sql.push_str(&format!(" DEFAULT {}", literal_sql(default)));
    }
    if field.unique {
        sql.push_str(" UNIQUE");
    }

    let mut checks = Vec::new();
    if let Some(min) = field.min {
        checks.push(format!("{quoted} >= {min}"));
    }
    if let Some(choices) = &field.choices {
        let values: Vec<String> = choices.iter().map(|c| c.value.to_string()).collect();
        checks.push(format!("{quoted} IN ({})", values.join(", ")));
    }
    if field.field_type == FieldType::Boolean {
        checks.push(format!("{quoted} IN (0, 1)"));
    }
    if !checks.is_empty() {
        sql.push_str(&format!(" CHECK ({})", checks.join(" AND ")));
    }

    if field.field_type == FieldType::Ref {
        if let Some(target) = field.target.as_deref() {
            let target_table = schema
                .tables
                .get(target)
                .map(|t| t.db_table_name(target))
                .unwrap_or_else(|| target.to_string());
            let action = match field.effective_on_delete() {
                OnDeletePolicy::Cascade => "CASCADE",
                OnDeletePolicy::Nullify => "SET NULL",
                OnDeletePolicy::Error => "RESTRICT",
            };
            sql.push_str(&format!(
                " REFERENCES {} ({}) ON DELETE {action}",
                quote_ident(&target_table),
                quote_ident("id")
            ));
        }
    }

    sql
}

fn index_sql(table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&format!("idx_{table}_{column}")),
        quote_ident(table),
        quote_ident(column)
    )
}

fn literal_sql(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        _ => "NULL".to_string(),
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
