use crate::error::{CrmError, Result};
use crate::schema::{FieldDefinition, FieldType, TableDefinition};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Result of validating a record
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("e-mail pattern is valid")
    })
}

/// Rewrite choice labels (e.g. `"A+"`) and numeric strings to integer codes.
pub fn normalize_choices(table: &TableDefinition, data: &mut Value) {
    let Some(mapping) = data.as_object_mut() else {
        return;
    };

    for (field_name, field_def) in &table.fields {
        if field_def.choices.is_none() {
            continue;
        }
        let Some(Value::String(raw)) = mapping.get(field_name) else {
            continue;
        };
        let code = field_def
            .choice_value(raw)
            .or_else(|| raw.trim().parse::<i64>().ok());
        if let Some(code) = code {
            mapping.insert(field_name.clone(), Value::from(code));
        }
    }
}

/// Remove fields the store manages itself: `id` and creation timestamps.
/// Returns a warning for every supplied value that was dropped.
pub fn strip_managed_fields(table: &TableDefinition, data: &mut Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(mapping) = data.as_object_mut() else {
        return warnings;
    };

    if let Some(id) = mapping.remove("id") {
        if !id.is_null() {
            warnings.push("Field 'id' is assigned by the store and was ignored".to_string());
        }
    }
    for (field_name, field_def) in &table.fields {
        if !field_def.auto_now_add {
            continue;
        }
        if let Some(value) = mapping.remove(field_name) {
            if !value.is_null() {
                warnings.push(format!(
                    "Field '{field_name}' is set at creation and was ignored"
                ));
            }
        }
    }

    warnings
}

/// Apply default values to a record's data. Modifies the data in place.
pub fn apply_defaults(table: &TableDefinition, data: &mut Value) {
    let Some(mapping) = data.as_object_mut() else {
        return;
    };

    for (field_name, field_def) in &table.fields {
        let has_value = mapping.get(field_name).map(|v| !v.is_null()).unwrap_or(false);
        if !has_value {
            if let Some(default) = &field_def.default {
                mapping.insert(field_name.clone(), default.clone());
            }
        }
    }
}

/// Validate a record's data against its table definition.
/// Creation timestamps and `id` are expected to be stripped already.
pub fn validate_record(table: &TableDefinition, data: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let mapping = match data.as_object() {
        Some(m) => m,
        None => {
            result.errors.push("Record data must be a JSON object".into());
            return result;
        }
    };

    for (field_name, field_def) in &table.fields {
        if field_def.auto_now_add {
            continue;
        }
        let value = mapping.get(field_name).filter(|v| !v.is_null());

        match value {
            None => {
                if field_def.required && field_def.default.is_none() {
                    result
                        .errors
                        .push(format!("Required field '{field_name}' is missing"));
                }
            }
            Some(val) => {
                validate_field_value(field_name, field_def, val, &mut result);
                check_relevance(field_name, field_def, val, mapping, &mut result);
            }
        }
    }

    for key in mapping.keys() {
        if !table.fields.contains_key(key) {
            result.errors.push(format!("Unexpected field '{key}'"));
        }
    }

    result
}

fn validate_field_value(
    field_name: &str,
    field_def: &FieldDefinition,
    value: &Value,
    result: &mut ValidationResult,
) {
    match field_def.field_type {
        FieldType::String | FieldType::Text | FieldType::Email => {
            let Some(s) = value.as_str() else {
                result.errors.push(format!(
                    "Field '{field_name}' expected string, got {}",
                    type_name(value)
                ));
                return;
            };
            if field_def.required && s.trim().is_empty() {
                result
                    .errors
                    .push(format!("Field '{field_name}' may not be blank"));
            }
            if let Some(max) = field_def.max_length {
                let len = s.chars().count();
                if len > max {
                    result.errors.push(format!(
                        "Field '{field_name}' is {len} characters long, at most {max} allowed"
                    ));
                }
            }
            if field_def.field_type == FieldType::Email
                && !s.is_empty()
                && !email_regex().is_match(s)
            {
                result
                    .errors
                    .push(format!("Field '{field_name}' is not a valid e-mail address"));
            }
        }
        FieldType::Integer => {
            let Some(n) = value.as_i64() else {
                result.errors.push(format!(
                    "Field '{field_name}' expected integer, got {}",
                    type_name(value)
                ));
                return;
            };
            if let Some(min) = field_def.min {
                if n < min {
                    result
                        .errors
                        .push(format!("Field '{field_name}' must be at least {min}, got {n}"));
                }
            }
            if let Some(choices) = &field_def.choices {
                if !choices.iter().any(|c| c.value == n) {
                    let valid: Vec<String> = choices
                        .iter()
                        .map(|c| format!("{} ({})", c.value, c.label))
                        .collect();
                    result.errors.push(format!(
                        "Field '{field_name}' value {n} is not a valid choice: {}",
                        valid.join(", ")
                    ));
                }
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                result.errors.push(format!(
                    "Field '{field_name}' expected boolean, got {}",
                    type_name(value)
                ));
            }
        }
        FieldType::Date => {
            let valid = value
                .as_str()
                .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
                .unwrap_or(false);
            if !valid {
                result.errors.push(format!(
                    "Field '{field_name}' expected a YYYY-MM-DD date, got {value}"
                ));
            }
        }
        FieldType::Datetime => {
            let valid = value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
            if !valid {
                result.errors.push(format!(
                    "Field '{field_name}' expected an RFC 3339 timestamp, got {value}"
                ));
            }
        }
        FieldType::Ref => {
            if !is_record_id(value) {
                result.errors.push(format!(
                    "Field '{field_name}' (ref) expected a record id, got {value}"
                ));
            }
        }
        FieldType::ManyToMany => match value.as_array() {
            Some(ids) => {
                if ids.iter().any(|v| !is_record_id(v)) {
                    result.errors.push(format!(
                        "Field '{field_name}' (many-to-many) expected a list of record ids"
                    ));
                } else if field_def.required && ids.is_empty() {
                    result
                        .errors
                        .push(format!("Field '{field_name}' needs at least one entry"));
                }
            }
            None => result.errors.push(format!(
                "Field '{field_name}' (many-to-many) expected list, got {}",
                type_name(value)
            )),
        },
    }
}

fn check_relevance(
    field_name: &str,
    field_def: &FieldDefinition,
    value: &Value,
    mapping: &serde_json::Map<String, Value>,
    result: &mut ValidationResult,
) {
    let Some(cond) = &field_def.relevant_when else {
        return;
    };
    if value.as_str().map(str::is_empty).unwrap_or(false) {
        return;
    }
    if mapping.get(&cond.field) != Some(&cond.value) {
        result.warnings.push(format!(
            "Field '{field_name}' is only meaningful when '{}' is {}",
            cond.field, cond.value
        ));
    }
}

fn is_record_id(value: &Value) -> bool {
    value.as_i64().map(|id| id > 0).unwrap_or(false)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Normalize choices, drop store-managed fields, apply defaults and validate.
/// Returns an error if validation fails, otherwise the warnings.
pub fn validate_and_prepare(
    table_name: &str,
    table: &TableDefinition,
    data: &mut Value,
) -> Result<Vec<String>> {
    normalize_choices(table, data);
    let mut warnings = strip_managed_fields(table, data);
    apply_defaults(table, data);
    let result = validate_record(table, data);

    if !result.is_ok() {
        return Err(CrmError::Validation(format!(
            "{table_name} record failed validation:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }

    warnings.extend(result.warnings);
    Ok(warnings)
}

/// Convert command-line or query-string text into a JSON value for a field.
/// Text that does not fit the field type is kept as a string so validation
/// can report it.
pub fn coerce_str(field_def: &FieldDefinition, raw: &str) -> Value {
    let trimmed = raw.trim();
    match field_def.field_type {
        FieldType::String
        | FieldType::Text
        | FieldType::Email
        | FieldType::Date
        | FieldType::Datetime => Value::String(raw.to_string()),
        FieldType::Integer | FieldType::Ref => {
            if trimmed == "null" {
                return Value::Null;
            }
            trimmed
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        FieldType::ManyToMany => {
            if trimmed.starts_with('[') {
                return serde_json::from_str(trimmed)
                    .unwrap_or_else(|_| Value::String(raw.to_string()));
            }
            if trimmed.is_empty() {
                return Value::Array(Vec::new());
            }
            let ids: std::result::Result<Vec<i64>, _> =
                trimmed.split(',').map(|s| s.trim().parse::<i64>()).collect();
            match ids {
                Ok(ids) => Value::from(ids),
                Err(_) => Value::String(raw.to_string()),
            }
        }
    }
}
