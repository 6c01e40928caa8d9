//! The record store: opens the database, applies the schema and provides
//! table handles, typed and dynamic CRUD, delete plans and batches.

mod batch;
mod plan;
mod table;

pub use batch::{Batch, BatchTable};
pub use plan::{DeletePlan, NullifiedRef, RecordRef};
pub use table::Table;

use crate::db::rows::{self, Filter};
use crate::db::Database;
use crate::display::{default_display, DisplayTemplate};
use crate::error::{CrmError, Result};
use crate::models::{Entity, Model};
use crate::schema::{self, ddl, hash_schema, FieldType, OnDeletePolicy, SchemaDefinition};
use crate::validation;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A stored row: `id` plus one entry per field, keyed by field name.
pub type Record = Map<String, Value>;

/// Reference chains deeper than this render as bare ids.
const MAX_DISPLAY_DEPTH: usize = 3;

/// The main entry point: a SQLite database governed by a schema.
pub struct Store {
    db: Database,
    schema: SchemaDefinition,
    schema_yaml: String,
    displays: HashMap<String, DisplayTemplate>,
}

impl Store {
    /// Open (or create) a store file using the built-in CRM schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening store at {}", path.display());
        Self::open_with_schema(Database::open(path)?, schema::CRM_SCHEMA)
    }

    /// Open an in-memory store with the built-in CRM schema (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_schema(Database::open_in_memory()?, schema::CRM_SCHEMA)
    }

    /// Open a store over `db` governed by the given schema YAML.
    pub fn open_with_schema(db: Database, yaml: &str) -> Result<Self> {
        let schema = schema::parse_schema_str(yaml)?;

        let mut displays = HashMap::new();
        for (name, table) in &schema.tables {
            if let Some(template) = &table.display {
                displays.insert(name.clone(), DisplayTemplate::parse(template)?);
            }
        }

        let store = Store {
            db,
            schema,
            schema_yaml: yaml.to_string(),
            displays,
        };
        store.boot()?;
        Ok(store)
    }

    /// Create missing tables and record the schema when its hash changed.
    fn boot(&self) -> Result<()> {
        self.db.apply_ddl(&self.ddl())?;

        let current_hash = hash_schema(&self.schema_yaml);
        let last_hash = self.db.get_last_schema_hash()?;
        if last_hash.as_deref() != Some(current_hash.as_str()) {
            log::info!(
                "Schema changed ({} -> {current_hash}), recording new version",
                last_hash.as_deref().unwrap_or("none")
            );
            self.db.record_schema(&current_hash, &self.schema_yaml)?;
        }
        Ok(())
    }

    /// Get a handle for a table.
    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        self.schema.table(name)?;
        Ok(Table::new(self, name))
    }

    /// Get the parsed schema
    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// DDL statements derived from the schema.
    pub fn ddl(&self) -> Vec<String> {
        ddl::create_statements(&self.schema)
    }

    /// Create a batch for all-or-nothing execution of multiple writes.
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    // ── Typed API ───────────────────────────────────────────────────

    pub fn get<M: Model>(&self, id: i64) -> Result<Entity<M>> {
        let record = self.table(M::TABLE)?.get(id)?;
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    pub fn list<M: Model>(&self) -> Result<Vec<Entity<M>>> {
        self.filter(&[])
    }

    pub fn filter<M: Model>(&self, filters: &[Filter]) -> Result<Vec<Entity<M>>> {
        self.table(M::TABLE)?
            .filter(filters)?
            .into_iter()
            .map(|record| Ok(serde_json::from_value(Value::Object(record))?))
            .collect()
    }

    /// Insert a typed record. Returns its id.
    pub fn insert<M: Model>(&self, record: &M) -> Result<i64> {
        self.table(M::TABLE)?.insert(serde_json::to_value(record)?)
    }

    /// Replace a typed record.
    pub fn update<M: Model>(&self, id: i64, record: &M) -> Result<()> {
        self.table(M::TABLE)?.update(id, serde_json::to_value(record)?)
    }

    pub fn delete<M: Model>(&self, id: i64) -> Result<DeletePlan> {
        self.table(M::TABLE)?.delete(id)
    }

    // ── Dynamic API (for CLI / HTTP) ────────────────────────────────

    /// Get a record as JSON, with display labels.
    pub fn get_dynamic(&self, table: &str, id: i64) -> Result<Value> {
        self.schema.table(table)?;
        self.db.with_conn(|conn| {
            let record = self.fetch(conn, table, id)?;
            self.decorate(conn, table, record)
        })
    }

    /// List records matching string filters (`field=value`), with display labels.
    pub fn list_dynamic(&self, table: &str, filters: &HashMap<String, String>) -> Result<Value> {
        let filters = self.parse_filters(table, filters)?;
        self.db.with_conn(|conn| {
            let records = rows::list_rows(conn, &self.schema, table, &filters)?;
            let mut results = Vec::with_capacity(records.len());
            for record in records {
                results.push(self.decorate(conn, table, record)?);
            }
            Ok(Value::Array(results))
        })
    }

    /// Insert a record from JSON. Returns the stored record.
    pub fn insert_dynamic(&self, table: &str, data: Value) -> Result<Value> {
        let data = self.without_display_keys(table, data)?;
        let id = self.table(table)?.insert(data)?;
        self.get_dynamic(table, id)
    }

    /// Replace a record from JSON. Returns the stored record.
    pub fn update_dynamic(&self, table: &str, id: i64, data: Value) -> Result<Value> {
        let data = self.without_display_keys(table, data)?;
        self.table(table)?.update(id, data)?;
        self.get_dynamic(table, id)
    }

    /// Merge fields into a record. Returns the stored record.
    pub fn update_partial_dynamic(&self, table: &str, id: i64, data: Value) -> Result<Value> {
        let data = self.without_display_keys(table, data)?;
        self.table(table)?.update_partial(id, data)?;
        self.get_dynamic(table, id)
    }

    /// Delete a record and its dependents. Returns what was removed.
    pub fn delete_dynamic(&self, table: &str, id: i64) -> Result<Value> {
        let plan = self.table(table)?.delete(id)?;
        Ok(serde_json::to_value(plan)?)
    }

    /// What deleting a record would remove or nullify.
    pub fn delete_plan_dynamic(&self, table: &str, id: i64) -> Result<Value> {
        let plan = self.table(table)?.delete_plan(id)?;
        Ok(serde_json::to_value(plan)?)
    }

    /// Drop the `display` and `<choice>_display` keys added by [`Self::decorate`],
    /// so a fetched record can be sent back as-is.
    fn without_display_keys(&self, table: &str, mut data: Value) -> Result<Value> {
        let def = self.schema.table(table)?;
        if let Some(mapping) = data.as_object_mut() {
            if !def.fields.contains_key("display") {
                mapping.remove("display");
            }
            for (field_name, field) in &def.fields {
                let key = format!("{field_name}_display");
                if field.choices.is_some() && !def.fields.contains_key(&key) {
                    mapping.remove(&key);
                }
            }
        }
        Ok(data)
    }

    /// Turn `field=value` strings into a JSON object typed per the schema.
    pub fn coerce_fields(&self, table: &str, fields: &[(String, String)]) -> Result<Value> {
        let def = self.schema.table(table)?;
        let mut data = Map::new();
        for (name, raw) in fields {
            let value = match def.fields.get(name) {
                Some(field) => validation::coerce_str(field, raw),
                None => Value::String(raw.clone()),
            };
            data.insert(name.clone(), value);
        }
        Ok(Value::Object(data))
    }

    fn parse_filters(&self, table: &str, raw: &HashMap<String, String>) -> Result<Vec<Filter>> {
        let def = self.schema.table(table)?;
        let mut names: Vec<&String> = raw.keys().collect();
        names.sort();

        let mut filters = Vec::new();
        for name in names {
            let text = raw[name].as_str();
            let field = def.fields.get(name.as_str());
            let value = match field {
                _ if name == "id" => parse_id(name, text)?,
                Some(f) if f.is_many_to_many() => parse_id(name, text)?,
                Some(f) => match validation::coerce_str(f, text) {
                    Value::String(label) if f.choices.is_some() => f
                        .choice_value(&label)
                        .map(Value::from)
                        .unwrap_or(Value::String(label)),
                    value => value,
                },
                None => {
                    return Err(CrmError::Validation(format!(
                        "{table} has no field '{name}' to filter on"
                    )))
                }
            };
            filters.push(Filter::new(name.as_str(), value));
        }
        Ok(filters)
    }

    // ── Status & Validation ─────────────────────────────────────────

    /// Schema hash and per-table record counts.
    pub fn status(&self) -> Result<Value> {
        let schema_versions = self.db.schema_versions()?;
        self.db.with_conn(|conn| {
            let mut tables = Map::new();
            for (name, def) in &self.schema.tables {
                tables.insert(
                    name.clone(),
                    serde_json::json!({
                        "db_table": def.db_table_name(name),
                        "verbose_name": def.verbose_name,
                        "count": rows::count_rows(conn, &self.schema, name)?,
                    }),
                );
            }
            Ok(serde_json::json!({
                "schema_hash": hash_schema(&self.schema_yaml),
                "schema_versions": schema_versions,
                "tables": tables,
            }))
        })
    }

    /// Re-validate every stored row against the schema.
    pub fn validate_all(&self) -> Result<Value> {
        self.db.with_conn(|conn| {
            let mut results = Map::new();
            for (name, def) in &self.schema.tables {
                let records = rows::list_rows(conn, &self.schema, name, &[])?;
                let mut issues = Vec::new();

                for record in &records {
                    let id = record.get("id").cloned().unwrap_or(Value::Null);
                    let mut data = record.clone();
                    data.remove("id");
                    let mut missing_stamps = Vec::new();
                    for (field_name, field) in &def.fields {
                        if field.auto_now_add
                            && data.remove(field_name).map(|v| v.is_null()).unwrap_or(true)
                        {
                            missing_stamps.push(format!("Field '{field_name}' has no timestamp"));
                        }
                    }

                    let mut vr = validation::validate_record(def, &Value::Object(data));
                    vr.errors.extend(missing_stamps);
                    if !vr.is_ok() || vr.has_warnings() {
                        let mut entry = Map::new();
                        entry.insert("id".into(), id);
                        if !vr.errors.is_empty() {
                            entry.insert("errors".into(), Value::from(vr.errors));
                        }
                        if !vr.warnings.is_empty() {
                            entry.insert("warnings".into(), Value::from(vr.warnings));
                        }
                        issues.push(Value::Object(entry));
                    }
                }

                results.insert(
                    name.clone(),
                    serde_json::json!({
                        "total": records.len(),
                        "issues": issues,
                    }),
                );
            }
            Ok(Value::Object(results))
        })
    }

    // ── Write paths (run inside a transaction) ──────────────────────

    fn fetch(&self, conn: &Connection, table: &str, id: i64) -> Result<Record> {
        rows::get_row(conn, &self.schema, table, id)?.ok_or_else(|| CrmError::NotFound {
            table: table.to_string(),
            id,
        })
    }

    pub(crate) fn insert_in(&self, conn: &Connection, table: &str, mut data: Value) -> Result<i64> {
        let def = self.schema.table(table)?;
        let warnings = validation::validate_and_prepare(table, def, &mut data)?;
        log_warnings(table, &warnings);

        let mut record = into_record(data)?;
        self.check_references(conn, table, &record)?;

        for (field_name, field) in &def.fields {
            if field.auto_now_add {
                record.insert(field_name.clone(), now_value(field.field_type));
            }
        }

        let id = rows::insert_row(conn, &self.schema, table, &record)?;
        self.write_links(conn, table, id, &record)?;
        log::debug!("Inserted {table}/{id}");
        Ok(id)
    }

    /// Full replace: optional fields left out are cleared, many-to-many
    /// fields left out become empty. Creation timestamps are kept.
    pub(crate) fn update_in(
        &self,
        conn: &Connection,
        table: &str,
        id: i64,
        mut data: Value,
    ) -> Result<()> {
        let def = self.schema.table(table)?;
        if !rows::row_exists(conn, &self.schema, table, id)? {
            return Err(CrmError::NotFound {
                table: table.to_string(),
                id,
            });
        }

        let warnings = validation::validate_and_prepare(table, def, &mut data)?;
        log_warnings(table, &warnings);

        let mut record = into_record(data)?;
        self.check_references(conn, table, &record)?;

        for (field_name, field) in &def.fields {
            if !field.auto_now_add && !record.contains_key(field_name) {
                let cleared = if field.is_many_to_many() {
                    Value::Array(Vec::new())
                } else {
                    Value::Null
                };
                record.insert(field_name.clone(), cleared);
            }
        }

        rows::update_row(conn, &self.schema, table, id, &record)?;
        self.write_links(conn, table, id, &record)?;
        log::debug!("Updated {table}/{id}");
        Ok(())
    }

    /// Merge `patch` over the stored fields, then replace.
    pub(crate) fn update_partial_in(
        &self,
        conn: &Connection,
        table: &str,
        id: i64,
        patch: Value,
    ) -> Result<()> {
        let def = self.schema.table(table)?;
        let Value::Object(patch) = patch else {
            return Err(CrmError::Validation(
                "Partial update data must be a JSON object".into(),
            ));
        };

        let mut merged = self.fetch(conn, table, id)?;
        merged.remove("id");
        for (field_name, field) in &def.fields {
            if field.auto_now_add {
                merged.remove(field_name);
            }
        }
        for (key, value) in patch {
            merged.insert(key, value);
        }

        self.update_in(conn, table, id, Value::Object(merged))
    }

    pub(crate) fn delete_in(&self, conn: &Connection, table: &str, id: i64) -> Result<DeletePlan> {
        let plan = self.plan_delete(conn, table, id)?;
        rows::delete_row(conn, &self.schema, table, id)?;
        log::debug!(
            "Deleted {table}/{id} ({} dependent rows removed, {} nullified)",
            plan.deleted.len() - 1,
            plan.nullified.len()
        );
        Ok(plan)
    }

    /// Walk the references to `table/id`: cascade targets are collected
    /// transitively, nullify targets are listed, restrict references fail.
    pub(crate) fn plan_delete(&self, conn: &Connection, table: &str, id: i64) -> Result<DeletePlan> {
        if !rows::row_exists(conn, &self.schema, table, id)? {
            return Err(CrmError::NotFound {
                table: table.to_string(),
                id,
            });
        }

        let root = RecordRef::new(table, id);
        let mut seen: HashSet<RecordRef> = HashSet::from([root.clone()]);
        let mut plan = DeletePlan {
            deleted: vec![root.clone()],
            nullified: Vec::new(),
        };
        let mut pending = vec![root];

        while let Some(current) = pending.pop() {
            for (child_table, field_name, field) in self.schema.references_to(&current.table) {
                let ids =
                    rows::referencing_ids(conn, &self.schema, child_table, field_name, current.id)?;
                if ids.is_empty() {
                    continue;
                }
                match field.effective_on_delete() {
                    OnDeletePolicy::Cascade => {
                        for child_id in ids {
                            let child = RecordRef::new(child_table, child_id);
                            if seen.insert(child.clone()) {
                                plan.deleted.push(child.clone());
                                pending.push(child);
                            }
                        }
                    }
                    OnDeletePolicy::Nullify => {
                        plan.nullified.extend(
                            ids.into_iter()
                                .map(|child_id| NullifiedRef::new(child_table, child_id, field_name)),
                        );
                    }
                    OnDeletePolicy::Error => {
                        return Err(CrmError::ReferentialIntegrity(format!(
                            "Cannot delete {}/{}: referenced by {child_table} {ids:?} (field '{field_name}')",
                            current.table, current.id
                        )));
                    }
                }
            }
        }

        plan.nullified
            .retain(|n| !seen.contains(&RecordRef::new(&n.table, n.id)));
        Ok(plan)
    }

    /// Every referenced id must exist before the row is written.
    fn check_references(&self, conn: &Connection, table: &str, record: &Record) -> Result<()> {
        let def = self.schema.table(table)?;
        for (field_name, field) in &def.fields {
            let Some(target) = field.target.as_deref() else {
                continue;
            };
            for target_id in ids_of(record.get(field_name)) {
                if !rows::row_exists(conn, &self.schema, target, target_id)? {
                    return Err(CrmError::ReferentialIntegrity(format!(
                        "{table}.{field_name} references {target}/{target_id}, which does not exist"
                    )));
                }
            }
        }
        Ok(())
    }

    fn write_links(&self, conn: &Connection, table: &str, id: i64, record: &Record) -> Result<()> {
        let def = self.schema.table(table)?;
        for (field_name, _) in def.many_to_many() {
            if let Some(value) = record.get(field_name) {
                let ids = ids_of(Some(value));
                rows::set_many_to_many(conn, &self.schema, table, field_name, id, &ids)?;
            }
        }
        Ok(())
    }

    // ── Display strings ─────────────────────────────────────────────

    /// Human-readable label of a record.
    pub(crate) fn display_of(
        &self,
        conn: &Connection,
        table: &str,
        record: &Record,
        depth: usize,
    ) -> Result<String> {
        let id = record.get("id").and_then(Value::as_i64).unwrap_or_default();
        let Some(template) = self.displays.get(table) else {
            return Ok(default_display(table, id));
        };
        template.render(|name| self.field_text(conn, table, record, name, depth))
    }

    fn field_text(
        &self,
        conn: &Connection,
        table: &str,
        record: &Record,
        name: &str,
        depth: usize,
    ) -> Result<String> {
        let value = record.get(name).cloned().unwrap_or(Value::Null);
        let field = match self.schema.table(table)?.fields.get(name) {
            Some(field) => field,
            None => return Ok(plain_text(&value)),
        };

        match (field.field_type, value.as_i64()) {
            (FieldType::Ref, Some(ref_id)) => {
                let target = field.target.as_deref().unwrap_or_default();
                if depth >= MAX_DISPLAY_DEPTH {
                    return Ok(ref_id.to_string());
                }
                match rows::get_row(conn, &self.schema, target, ref_id)? {
                    Some(referenced) => self.display_of(conn, target, &referenced, depth + 1),
                    None => Ok(ref_id.to_string()),
                }
            }
            (FieldType::Integer, Some(code)) => Ok(field
                .choice_label(code)
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string())),
            _ => Ok(plain_text(&value)),
        }
    }

    /// Add `display` and `<choice>_display` entries to a record.
    fn decorate(&self, conn: &Connection, table: &str, mut record: Record) -> Result<Value> {
        let def = self.schema.table(table)?;
        let display = self.display_of(conn, table, &record, 0)?;

        let mut labels = Vec::new();
        for (field_name, field) in &def.fields {
            let code = record.get(field_name).and_then(Value::as_i64);
            if let Some(label) = code.and_then(|c| field.choice_label(c)) {
                labels.push((format!("{field_name}_display"), label.to_string()));
            }
        }
        for (key, label) in labels {
            record.insert(key, Value::String(label));
        }
        record.insert("display".into(), Value::String(display));
        Ok(Value::Object(record))
    }
}

fn log_warnings(table: &str, warnings: &[String]) {
    for warning in warnings {
        log::warn!("{table}: {warning}");
    }
}

fn into_record(data: Value) -> Result<Record> {
    match data {
        Value::Object(record) => Ok(record),
        _ => Err(CrmError::Validation("Record data must be a JSON object".into())),
    }
}

/// Ids held by a reference (single id) or many-to-many (list) value.
fn ids_of(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

fn now_value(field_type: FieldType) -> Value {
    let now = Utc::now();
    match field_type {
        FieldType::Date => Value::String(now.date_naive().format("%Y-%m-%d").to_string()),
        _ => Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(plain_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn parse_id(field: &str, text: &str) -> Result<Value> {
    text.trim()
        .parse::<i64>()
        .map(Value::from)
        .map_err(|_| CrmError::Validation(format!("Filter on '{field}' expects a record id, got '{text}'")))
}
