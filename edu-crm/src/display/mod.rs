// Display templates - the human-readable label of a record, e.g.
// "{branch} {course} {semester}" for a class.

use crate::error::{CrmError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayTemplate {
    pub raw: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Field(String),
}

impl DisplayTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    let name = name.trim().to_string();
                    if !closed {
                        return Err(CrmError::Schema(format!(
                            "unclosed '{{' in display template '{template}'"
                        )));
                    }
                    if name.is_empty() {
                        return Err(CrmError::Schema(format!(
                            "empty field name in display template '{template}'"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' => {
                    return Err(CrmError::Schema(format!(
                        "unmatched '}}' in display template '{template}'"
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(DisplayTemplate {
            raw: template.to_string(),
            segments,
        })
    }

    /// Names of the fields the template interpolates.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template, asking `resolve` for the text of each field.
    pub fn render<F>(&self, mut resolve: F) -> Result<String>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(&resolve(name)?),
            }
        }
        Ok(out)
    }
}

/// Fallback label for tables without a display template.
pub fn default_display(table: &str, id: i64) -> String {
    format!("{table} object ({id})")
}
