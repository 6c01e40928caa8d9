use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level schema definition parsed from the schema YAML.
/// Tables and fields keep their declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub tables: IndexMap<String, TableDefinition>,
}

/// Definition of a single record type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Persisted table name; defaults to the table key.
    #[serde(default)]
    pub db_table: Option<String>,
    #[serde(default)]
    pub verbose_name: Option<String>,
    /// Display template, e.g. `"{branch} {course} {semester}"`.
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDefinition>,
    /// Field combinations that must not repeat across records.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

/// Definition of a single field in a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Inclusive lower bound for integer fields.
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub on_delete: Option<OnDeletePolicy>,
    /// Stamped once at insertion and never rewritten.
    #[serde(default)]
    pub auto_now_add: bool,
    /// Explicit column name, overriding the derived one.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub relevant_when: Option<Condition>,
    #[serde(default)]
    pub verbose_name: Option<String>,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Text,
    Email,
    Integer,
    Boolean,
    Date,
    Datetime,
    Ref,
    ManyToMany,
}

/// One labeled integer code of an enumerated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: i64,
    pub label: String,
}

/// Holds when `field` equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: serde_json::Value,
}

/// On-delete referential integrity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDeletePolicy {
    Error,
    Cascade,
    Nullify,
}
