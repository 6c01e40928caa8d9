use super::choices::{CustomerSource, Intention};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prospective or enrolled student, identified by a unique contact handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub qq: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub source: CustomerSource,
    /// Contact handle of the referrer, for `CustomerSource::Referral`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_from: Option<String>,
    pub consult_course: i64,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<i64>,
    pub consultant: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// A sales contact with a customer and the intention it revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFollowUp {
    pub customer: i64,
    pub content: String,
    pub consultant: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub intention: Intention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub customer: i64,
    pub course: i64,
    pub amount: i64,
    pub consultant: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}
