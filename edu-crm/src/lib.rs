pub mod db;
pub mod display;
pub mod error;
pub mod models;
pub mod schema;
pub mod store;
pub mod validation;

pub use db::rows::Filter;
pub use error::{CrmError, Result};
pub use models::{Entity, Model};
pub use schema::SchemaDefinition;
pub use store::{DeletePlan, Record, Store};
