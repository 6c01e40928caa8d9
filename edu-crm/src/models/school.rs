use super::choices::{Attendance, ClassType, Score};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub price: i64,
    /// Duration in months.
    pub period: i64,
    pub outline: String,
}

/// One run of a course at a branch. Unique per (branch, course, semester).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassList {
    pub branch: i64,
    pub course: i64,
    pub semester: i64,
    pub teachers: Vec<i64>,
    pub class_type: ClassType,
    pub start_date: NaiveDate,
}

/// One teaching day of a class. Unique per (from_class, day_num).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub from_class: i64,
    pub day_num: i64,
    pub teacher: i64,
    pub has_homework: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homework_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homework_content: Option<String>,
    pub outline: String,
}

/// Attendance and grade of one enrolled student for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    /// The student's enrollment.
    pub student: i64,
    pub course_record: i64,
    #[serde(default)]
    pub attendance: Attendance,
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub customer: i64,
    pub enrolled_class: i64,
    pub consultant: i64,
    #[serde(default)]
    pub contract_agreed: bool,
    #[serde(default)]
    pub contract_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}
