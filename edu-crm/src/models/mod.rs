//! Typed records, one struct per table of the CRM schema.
//!
//! Reference fields hold the referenced record's id, many-to-many fields a
//! list of ids. Creation timestamps are `None` until the store assigns them.

mod choices;
mod customer;
mod school;
mod staff;

pub use choices::{Attendance, ClassType, CustomerSource, Intention, Score};
pub use customer::{Customer, CustomerFollowUp, Payment, Tag};
pub use school::{Branch, ClassList, Course, CourseRecord, Enrollment, StudyRecord};
pub use staff::{Role, UserProfile};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record type stored in a schema table.
pub trait Model: Serialize + DeserializeOwned {
    /// Table key in the schema.
    const TABLE: &'static str;
}

/// A stored record together with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity<M> {
    pub id: i64,
    #[serde(flatten)]
    pub data: M,
}

macro_rules! impl_model {
    ($($ty:ty => $table:literal),* $(,)?) => {
        $(impl Model for $ty {
            const TABLE: &'static str = $table;
        })*
    };
}

impl_model! {
    Customer => "customer",
    Tag => "tag",
    CustomerFollowUp => "customer_follow_up",
    Branch => "branch",
    Course => "course",
    ClassList => "class_list",
    CourseRecord => "course_record",
    StudyRecord => "study_record",
    Enrollment => "enrollment",
    Payment => "payment",
    UserProfile => "user_profile",
    Role => "role",
}
