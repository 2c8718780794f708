//! Typed error hierarchy for the shop back end.
//!
//! `ShopError` is raised by the domain and storage layers. Storage code
//! returns `anyhow::Result` and wraps a `ShopError` when the failure is
//! something a caller can act on; the HTTP layer downcasts it back to pick a
//! status code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single failed form field, reported back to the wizard UI.
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

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors from checklist edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecklistError {
    #[error("Checklist index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Checklist item text must not be empty")]
    EmptyText,
}

/// Errors from the shop domain and storage layers.
#[derive(Debug, Error)]
pub enum ShopError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Workshop '{slug}' not found")]
    WorkshopSlugNotFound { slug: String },

    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Cannot move page {page_id} under its own descendant {parent_id}")]
    CycleDetected { page_id: i64, parent_id: i64 },

    #[error("Page {id} is not a folder")]
    NotAFolder { id: i64 },

    #[error("Control checklist has {remaining} open item(s)")]
    ChecklistIncomplete { remaining: usize },

    #[error(transparent)]
    Checklist(#[from] ChecklistError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShopError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
