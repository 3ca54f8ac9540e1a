use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An employee record as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A partial update to an employee record.
///
/// Fields left as `None` keep their stored values; the update only touches
/// what the caller supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub age: Option<i64>,
}

impl EmployeePatch {
    /// Returns `true` when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none()
    }
}
