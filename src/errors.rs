use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// one rejected field and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid {entity}: {}", join_fields(.errors))]
    Validation {
        entity: &'static str,
        errors: Vec<FieldError>,
    },

    #[error("cannot delete {entity} {id}: {count} dependent {dependent} exist")]
    Conflict {
        entity: &'static str,
        id: Uuid,
        dependent: &'static str,
        count: usize,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: Uuid,
    },

    #[error("invalid configuration: {message}")]
    Configuration {
        message: String,
    },
}

impl LedgerError {
    /// single-field validation failure
    pub fn invalid(entity: &'static str, field: &str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            entity,
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        LedgerError::NotFound { entity, id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }

    /// field errors carried by a validation failure, empty otherwise
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            LedgerError::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// collects field errors and turns them into a single validation failure
#[derive(Debug, Default)]
pub(crate) struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
    }

    pub(crate) fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub(crate) fn finish(self, entity: &'static str) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation {
                entity,
                errors: self.errors,
            })
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let mut v = Validator::new();
        v.check(false, "amount", "must be greater than 0");
        v.check(true, "term_months", "must be greater than 0");
        v.add("status", "is not included in the list");
        let err = v.finish("loan").unwrap_err();

        assert!(err.is_validation());
        assert_eq!(err.field_errors().len(), 2);
        assert_eq!(
            err.to_string(),
            "invalid loan: amount must be greater than 0, status is not included in the list"
        );
    }

    #[test]
    fn test_conflict_message() {
        let id = Uuid::nil();
        let err = LedgerError::Conflict {
            entity: "loan",
            id,
            dependent: "payments",
            count: 2,
        };
        assert!(err.is_conflict());
        assert!(err.field_errors().is_empty());
        assert_eq!(
            err.to_string(),
            format!("cannot delete loan {}: 2 dependent payments exist", id)
        );
    }
}
