use serde::Serialize;

/// A record addressed by table key and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordRef {
    pub table: String,
    pub id: i64,
}

impl RecordRef {
    pub fn new(table: &str, id: i64) -> Self {
        RecordRef {
            table: table.to_string(),
            id,
        }
    }
}

/// A record whose reference `field` is set to null by a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NullifiedRef {
    pub table: String,
    pub id: i64,
    pub field: String,
}

impl NullifiedRef {
    pub fn new(table: &str, id: i64, field: &str) -> Self {
        NullifiedRef {
            table: table.to_string(),
            id,
            field: field.to_string(),
        }
    }
}

/// The effect of deleting a record. `deleted` starts with the record itself,
/// followed by its dependents in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletePlan {
    pub deleted: Vec<RecordRef>,
    pub nullified: Vec<NullifiedRef>,
}

impl DeletePlan {
    /// Ids of `table` removed by this plan.
    pub fn deleted_in(&self, table: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .deleted
            .iter()
            .filter(|r| r.table == table)
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
