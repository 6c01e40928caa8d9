use super::{DeletePlan, Record, Store};
use crate::db::rows::{self, Filter};
use crate::error::Result;
use crate::schema::TableDefinition;
use serde_json::Value;

/// A handle to one table within a store.
/// Records are JSON objects keyed by field name.
pub struct Table<'a> {
    store: &'a Store,
    name: String,
}

impl<'a> Table<'a> {
    pub(super) fn new(store: &'a Store, name: &str) -> Self {
        Table {
            store,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.store.schema.tables[&self.name]
    }

    /// Get a record by id
    pub fn get(&self, id: i64) -> Result<Record> {
        self.store
            .db
            .with_conn(|conn| self.store.fetch(conn, &self.name, id))
    }

    /// List all records, ordered by id
    pub fn list(&self) -> Result<Vec<Record>> {
        self.filter(&[])
    }

    /// List records matching every filter, ordered by id
    pub fn filter(&self, filters: &[Filter]) -> Result<Vec<Record>> {
        self.store
            .db
            .with_conn(|conn| rows::list_rows(conn, &self.store.schema, &self.name, filters))
    }

    pub fn count(&self) -> Result<i64> {
        self.store
            .db
            .with_conn(|conn| rows::count_rows(conn, &self.store.schema, &self.name))
    }

    /// Insert a new record. Returns its id.
    pub fn insert(&self, data: Value) -> Result<i64> {
        self.store
            .db
            .transaction(|conn| self.store.insert_in(conn, &self.name, data))
    }

    /// Replace a record. Creation timestamps are preserved.
    pub fn update(&self, id: i64, data: Value) -> Result<()> {
        self.store
            .db
            .transaction(|conn| self.store.update_in(conn, &self.name, id, data))
    }

    /// Merge the given fields into a record. A null value clears its field.
    pub fn update_partial(&self, id: i64, data: Value) -> Result<()> {
        self.store
            .db
            .transaction(|conn| self.store.update_partial_in(conn, &self.name, id, data))
    }

    /// Delete a record, cascading to its dependents.
    pub fn delete(&self, id: i64) -> Result<DeletePlan> {
        self.store
            .db
            .transaction(|conn| self.store.delete_in(conn, &self.name, id))
    }

    /// What [`Table::delete`] would remove or nullify, without deleting.
    pub fn delete_plan(&self, id: i64) -> Result<DeletePlan> {
        self.store
            .db
            .with_conn(|conn| self.store.plan_delete(conn, &self.name, id))
    }

    /// Display string of a record.
    pub fn display(&self, id: i64) -> Result<String> {
        self.store.db.with_conn(|conn| {
            let record = self.store.fetch(conn, &self.name, id)?;
            self.store.display_of(conn, &self.name, &record, 0)
        })
    }
}
