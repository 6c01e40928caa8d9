use serde::{Deserialize, Serialize};

/// A staff member. `user` is the id of the externally managed login account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: i64,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
}
