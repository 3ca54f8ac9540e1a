//! Rules that gate how records enter the roster: input validation, the
//! historical-maximum id sequence, and case-folded name comparison.

use thiserror::Error;

/// Highest id the store may ever assign. Once the historical maximum
/// reaches this value no further inserts are admitted, even after deletes.
pub const MAX_EMPLOYEE_ID: i64 = 30;

/// A validated create request: both fields present and non-degenerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeDraft {
    pub name: String,
    pub age: i64,
}

impl EmployeeDraft {
    /// Validates raw request fields into a draft.
    ///
    /// Rejects a missing or empty name and a missing or zero age; the zero
    /// case mirrors the truthiness test the API has always applied.
    pub fn new(name: Option<String>, age: Option<i64>) -> Result<Self, AdmissionError> {
        let name = match name {
            Some(value) if !value.is_empty() => value,
            _ => return Err(AdmissionError::MissingFields),
        };
        let age = match age {
            Some(value) if value != 0 => value,
            _ => return Err(AdmissionError::MissingFields),
        };
        Ok(Self { name, age })
    }
}

/// Computes the id for the next insert, or `None` once the cap is reached.
///
/// `current_max` is `MAX(id)` over the live table; the empty store yields
/// id 1. Ids below a past maximum are never handed out again.
pub fn next_id(current_max: Option<i64>) -> Option<i64> {
    let max = current_max.unwrap_or(0);
    if max >= MAX_EMPLOYEE_ID {
        return None;
    }
    Some(max + 1)
}

/// Case-folds a name for duplicate comparison.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Validation failures raised before a record reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Name and age are required.")]
    MissingFields,
}
