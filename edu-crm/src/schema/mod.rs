//! Declarative table definitions and the embedded CRM schema.

pub mod ddl;
mod types;

pub use types::*;

use crate::display::DisplayTemplate;
use crate::error::{CrmError, Result};
use std::path::Path;

/// The training-institute CRM schema shipped with the crate.
pub const CRM_SCHEMA: &str = include_str!("crm.yaml");

/// Parse and check the embedded CRM schema.
pub fn builtin() -> Result<SchemaDefinition> {
    parse_schema_str(CRM_SCHEMA)
}

/// Parse a schema YAML file into a checked SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a checked SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    schema.check()?;
    Ok(schema)
}

/// Stable hash of the schema source, recorded in the schema history.
pub fn hash_schema(yaml: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    yaml.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl SchemaDefinition {
    /// Look up a table by its key.
    pub fn table(&self, name: &str) -> Result<&TableDefinition> {
        self.tables
            .get(name)
            .ok_or_else(|| CrmError::UnknownTable(name.to_string()))
    }

    /// Find a table key by its persisted table name.
    pub fn table_for_db_name(&self, db_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|(name, def)| def.db_table_name(name) == db_table)
            .map(|(name, _)| name.as_str())
    }

    /// Column names of a join table from `owner` to `target`: (owner column,
    /// target column). A table linked to itself gets `from_`/`to_` columns.
    pub fn join_columns(&self, owner: &str, target: &str) -> (String, String) {
        let model = |key: &str| {
            self.tables
                .get(key)
                .map(|t| t.model_name(key))
                .unwrap_or_else(|| key.to_string())
        };
        let (owner_model, target_model) = (model(owner), model(target));
        if owner_model == target_model {
            (
                format!("from_{owner_model}_id"),
                format!("to_{target_model}_id"),
            )
        } else {
            (format!("{owner_model}_id"), format!("{target_model}_id"))
        }
    }

    /// All reference fields pointing at `target`, as (table, field, definition).
    pub fn references_to<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str, &'a FieldDefinition)> + 'a {
        self.tables.iter().flat_map(move |(table_name, table)| {
            table
                .fields
                .iter()
                .filter(move |(_, def)| {
                    def.field_type == FieldType::Ref && def.target.as_deref() == Some(target)
                })
                .map(move |(field_name, def)| (table_name.as_str(), field_name.as_str(), def))
        })
    }

    /// Check internal consistency: targets exist, constraints name real
    /// columns, defaults and templates are valid.
    pub fn check(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (table_name, table) in &self.tables {
            for (field_name, field) in &table.fields {
                let at = format!("{table_name}.{field_name}");
                check_field(self, &at, field, &mut problems);

                if let Some(cond) = &field.relevant_when {
                    if !table.fields.contains_key(&cond.field) {
                        problems.push(format!(
                            "{at}: relevant_when names unknown field '{}'",
                            cond.field
                        ));
                    }
                }
            }

            for group in &table.unique_together {
                if group.len() < 2 {
                    problems.push(format!(
                        "{table_name}: unique_together group {group:?} needs at least two fields"
                    ));
                }
                for member in group {
                    match table.fields.get(member) {
                        None => problems.push(format!(
                            "{table_name}: unique_together names unknown field '{member}'"
                        )),
                        Some(def) if def.is_many_to_many() => problems.push(format!(
                            "{table_name}: unique_together cannot include many-to-many field '{member}'"
                        )),
                        Some(_) => {}
                    }
                }
            }

            if let Some(display) = &table.display {
                match DisplayTemplate::parse(display) {
                    Ok(template) => {
                        for name in template.field_names() {
                            if name != "id" && !table.fields.contains_key(name) {
                                problems.push(format!(
                                    "{table_name}: display template names unknown field '{name}'"
                                ));
                            }
                        }
                    }
                    Err(e) => problems.push(format!("{table_name}: {e}")),
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CrmError::Schema(problems.join("; ")))
        }
    }
}

fn check_field(
    schema: &SchemaDefinition,
    at: &str,
    field: &FieldDefinition,
    problems: &mut Vec<String>,
) {
    let is_relation = matches!(field.field_type, FieldType::Ref | FieldType::ManyToMany);

    match (&field.target, is_relation) {
        (Some(target), true) => {
            if !schema.tables.contains_key(target) {
                problems.push(format!("{at}: target table '{target}' does not exist"));
            }
        }
        (None, true) => problems.push(format!("{at}: relation field needs a target")),
        (Some(_), false) => problems.push(format!("{at}: only relation fields take a target")),
        (None, false) => {}
    }

    if field.on_delete.is_some() && field.field_type != FieldType::Ref {
        problems.push(format!("{at}: on_delete only applies to ref fields"));
    }
    if field.on_delete == Some(OnDeletePolicy::Nullify) && field.required {
        problems.push(format!("{at}: a required reference cannot be nullified"));
    }
    if field.unique && field.is_many_to_many() {
        problems.push(format!("{at}: many-to-many fields cannot be unique"));
    }
    if field.max_length.is_some()
        && !matches!(field.field_type, FieldType::String | FieldType::Email)
    {
        problems.push(format!("{at}: max_length only applies to string fields"));
    }
    if field.auto_now_add && !matches!(field.field_type, FieldType::Date | FieldType::Datetime) {
        problems.push(format!("{at}: auto_now_add only applies to date/datetime fields"));
    }

    if let Some(choices) = &field.choices {
        if field.field_type != FieldType::Integer {
            problems.push(format!("{at}: choices only apply to integer fields"));
        }
        if choices.is_empty() {
            problems.push(format!("{at}: choices must not be empty"));
        }
        for (i, choice) in choices.iter().enumerate() {
            let repeated = choices[..i]
                .iter()
                .any(|c| c.value == choice.value || c.label == choice.label);
            if repeated {
                problems.push(format!(
                    "{at}: choice {} ({}) is declared twice",
                    choice.value, choice.label
                ));
            }
        }
        if let Some(default) = &field.default {
            let valid = default
                .as_i64()
                .map(|v| choices.iter().any(|c| c.value == v))
                .unwrap_or(false);
            if !valid {
                problems.push(format!("{at}: default {default} is not one of the choices"));
            }
        }
    }
}

impl TableDefinition {
    /// Persisted table name.
    pub fn db_table_name(&self, key: &str) -> String {
        self.db_table.clone().unwrap_or_else(|| key.to_string())
    }

    /// Fields stored as columns of the table itself (everything except many-to-many).
    pub fn columns(&self) -> impl Iterator<Item = (&String, &FieldDefinition)> {
        self.fields.iter().filter(|(_, def)| !def.is_many_to_many())
    }

    /// Many-to-many fields, stored in join tables.
    pub fn many_to_many(&self) -> impl Iterator<Item = (&String, &FieldDefinition)> {
        self.fields.iter().filter(|(_, def)| def.is_many_to_many())
    }

    /// Map a persisted column name back to its field name.
    pub fn field_for_column(&self, column: &str) -> Option<&str> {
        self.columns()
            .find(|(name, def)| def.column_name(name) == column)
            .map(|(name, _)| name.as_str())
    }

    /// Join table name for a many-to-many field.
    pub fn join_table_name(&self, key: &str, field: &str) -> String {
        format!("{}_{}", self.db_table_name(key), field)
    }

    /// Model name used in join column names: the persisted table name
    /// without its app prefix (`crm_classlist` -> `classlist`).
    pub fn model_name(&self, key: &str) -> String {
        match self.db_table.as_deref().and_then(|t| t.split_once('_')) {
            Some((_, model)) if !model.is_empty() => model.to_string(),
            _ => key.to_string(),
        }
    }
}


impl FieldDefinition {
    /// Persisted column name: explicit `column`, `<field>_id` for references,
    /// otherwise the field name.
    pub fn column_name(&self, field: &str) -> String {
        match (&self.column, self.field_type) {
            (Some(column), _) => column.clone(),
            (None, FieldType::Ref) => format!("{field}_id"),
            (None, _) => field.to_string(),
        }
    }

    pub fn is_many_to_many(&self) -> bool {
        self.field_type == FieldType::ManyToMany
    }

    /// On-delete policy, defaulting to `Error` (restrict).
    pub fn effective_on_delete(&self) -> OnDeletePolicy {
        self.on_delete.unwrap_or(OnDeletePolicy::Error)
    }

    pub fn choice_label(&self, value: i64) -> Option<&str> {
        self.choices
            .as_ref()?
            .iter()
            .find(|c| c.value == value)
            .map(|c| c.label.as_str())
    }

    pub fn choice_value(&self, label: &str) -> Option<i64> {
        self.choices
            .as_ref()?
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schema_parses() {
        let schema = builtin().unwrap();
        let names: Vec<_> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "customer",
                "tag",
                "customer_follow_up",
                "branch",
                "course",
                "class_list",
                "course_record",
                "study_record",
                "enrollment",
                "payment",
                "user_profile",
                "role",
            ]
        );
    }

    #[test]
    fn test_persisted_names() {
        let schema = builtin().unwrap();

        let customer = schema.table("customer").unwrap();
        assert_eq!(customer.db_table_name("customer"), "crm_customer");
        assert_eq!(
            customer.fields["consult_course"].column_name("consult_course"),
            "consult_course_id"
        );
        assert_eq!(customer.join_table_name("customer", "tags"), "crm_customer_tags");

        let class_list = schema.table("class_list").unwrap();
        assert_eq!(
            class_list.fields["start_date"].column_name("start_date"),
            "start_data"
        );
        assert_eq!(class_list.field_for_column("branch_id"), Some("branch"));

        let payment = schema.table("payment").unwrap();
        assert_eq!(payment.field_for_column("courses_id"), Some("course"));

        assert_eq!(schema.table_for_db_name("crm_studyrecord"), Some("study_record"));
    }

    #[test]
    fn test_join_columns_use_model_names() {
        let schema = builtin().unwrap();
        assert_eq!(
            schema.join_columns("class_list", "user_profile"),
            ("classlist_id".to_string(), "userprofile_id".to_string())
        );
        assert_eq!(
            schema.join_columns("user_profile", "role"),
            ("userprofile_id".to_string(), "role_id".to_string())
        );
        assert_eq!(
            schema.join_columns("customer", "tag"),
            ("customer_id".to_string(), "tag_id".to_string())
        );
    }

    #[test]
    fn test_join_columns_for_self_link() {
        let yaml = r#"
tables:
  person:
    fields:
      friends: { type: many_to_many, target: person }
"#;
        let schema = parse_schema_str(yaml).unwrap();
        assert_eq!(
            schema.join_columns("person", "person"),
            ("from_person_id".to_string(), "to_person_id".to_string())
        );
    }

    #[test]
    fn test_score_choices() {
        let schema = builtin().unwrap();
        let score = &schema.table("study_record").unwrap().fields["score"];
        assert_eq!(score.choice_value("A+"), Some(100));
        assert_eq!(score.choice_value("COPY"), Some(-100));
        assert_eq!(score.choice_value("N/A"), Some(0));
        assert_eq!(score.choice_label(-50), Some("D"));
        assert_eq!(score.choice_label(42), None);
    }

    #[test]
    fn test_references_to_customer() {
        let schema = builtin().unwrap();
        let mut refs: Vec<_> = schema
            .references_to("customer")
            .map(|(table, field, _)| format!("{table}.{field}"))
            .collect();
        refs.sort();
        assert_eq!(
            refs,
            vec![
                "customer_follow_up.customer",
                "enrollment.customer",
                "payment.customer",
            ]
        );
    }

    #[test]
    fn test_unknown_table() {
        let schema = builtin().unwrap();
        assert!(matches!(
            schema.table("invoice"),
            Err(CrmError::UnknownTable(name)) if name == "invoice"
        ));
    }

    #[test]
    fn test_check_rejects_missing_target() {
        let yaml = r#"
tables:
  post:
    fields:
      author: { type: ref, target: users, required: true }
"#;
        let err = parse_schema_str(yaml).unwrap_err();
        assert!(err.to_string().contains("target table 'users' does not exist"));
    }

    #[test]
    fn test_check_rejects_bad_unique_together() {
        let yaml = r#"
tables:
  tag:
    fields:
      name: { type: string }
  item:
    unique_together:
      - [name, tags]
    fields:
      name: { type: string }
      tags: { type: many_to_many, target: tag }
"#;
        let err = parse_schema_str(yaml).unwrap_err();
        assert!(err.to_string().contains("cannot include many-to-many field 'tags'"));
    }

    #[test]
    fn test_check_rejects_default_outside_choices() {
        let yaml = r#"
tables:
  record:
    fields:
      status:
        type: integer
        default: 7
        choices:
          - { value: 0, label: open }
          - { value: 1, label: closed }
"#;
        let err = parse_schema_str(yaml).unwrap_err();
        assert!(err.to_string().contains("default 7 is not one of the choices"));
    }

    #[test]
    fn test_check_rejects_unknown_display_field() {
        let yaml = r#"
tables:
  branch:
    display: "{title}"
    fields:
      name: { type: string }
"#;
        let err = parse_schema_str(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown field 'title'"));
    }

    #[test]
    fn test_hash_schema_stable() {
        assert_eq!(hash_schema(CRM_SCHEMA), hash_schema(CRM_SCHEMA));
        assert_ne!(hash_schema(CRM_SCHEMA), hash_schema("tables: {}"));
    }
}
