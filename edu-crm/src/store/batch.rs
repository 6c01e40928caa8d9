use super::Store;
use crate::error::Result;
use serde_json::Value;

/// A deferred write operation for batch execution.
enum BatchOp {
    Insert { table: String, data: Value },
    Update { table: String, id: i64, data: Value },
    UpdatePartial { table: String, id: i64, data: Value },
    Delete { table: String, id: i64 },
}

/// A batch of write operations that execute all-or-nothing in a single
/// transaction.
pub struct Batch<'a> {
    store: &'a Store,
    ops: Vec<BatchOp>,
}

/// A scoped handle for queuing batch writes to one table.
pub struct BatchTable<'a, 'b> {
    batch: &'b mut Batch<'a>,
    table: String,
}

impl<'a> Batch<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Batch {
            store,
            ops: Vec::new(),
        }
    }

    /// Get a handle for queuing operations on a table.
    pub fn table(&mut self, name: &str) -> BatchTable<'a, '_> {
        BatchTable {
            batch: self,
            table: name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Execute all queued operations atomically. Returns the id each
    /// operation touched, in order. Nothing is written if any operation fails.
    pub fn execute(self) -> Result<Vec<i64>> {
        let store = self.store;
        let ops = self.ops;

        let ids = store.db.transaction(|conn| {
            let mut ids = Vec::with_capacity(ops.len());
            for op in ops {
                let id = match op {
                    BatchOp::Insert { table, data } => store.insert_in(conn, &table, data)?,
                    BatchOp::Update { table, id, data } => {
                        store.update_in(conn, &table, id, data)?;
                        id
                    }
                    BatchOp::UpdatePartial { table, id, data } => {
                        store.update_partial_in(conn, &table, id, data)?;
                        id
                    }
                    BatchOp::Delete { table, id } => {
                        store.delete_in(conn, &table, id)?;
                        id
                    }
                };
                ids.push(id);
            }
            Ok(ids)
        })?;

        log::debug!("Batch committed {} operations", ids.len());
        Ok(ids)
    }
}

impl<'a, 'b> BatchTable<'a, 'b> {
    /// Queue an insert operation.
    pub fn insert(&mut self, data: Value) -> &mut Self {
        self.batch.ops.push(BatchOp::Insert {
            table: self.table.clone(),
            data,
        });
        self
    }

    /// Queue a full update.
    pub fn update(&mut self, id: i64, data: Value) -> &mut Self {
        self.batch.ops.push(BatchOp::Update {
            table: self.table.clone(),
            id,
            data,
        });
        self
    }

    /// Queue a partial update.
    pub fn update_partial(&mut self, id: i64, data: Value) -> &mut Self {
        self.batch.ops.push(BatchOp::UpdatePartial {
            table: self.table.clone(),
            id,
            data,
        });
        self
    }

    /// Queue a delete operation.
    pub fn delete(&mut self, id: i64) -> &mut Self {
        self.batch.ops.push(BatchOp::Delete {
            table: self.table.clone(),
            id,
        });
        self
    }
}
