use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: i64 },

    #[error("Table '{0}' not found in schema")]
    UnknownTable(String),

    #[error("Unique constraint violated on {table}: ({})", .fields.join(", "))]
    UniqueViolation { table: String, fields: Vec<String> },

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CrmError>;
