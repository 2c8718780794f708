//! Service and control checklists.
//!
//! A checklist is an ordered list of items a mechanic works through. The
//! "current" item is the first one that is neither completed nor skipped.
//! Edits are expressed as [`ChecklistAction`]s so the HTTP layer can apply a
//! single change to the stored array and write the whole array back.

use serde::{Deserialize, Serialize};

use super::models::ChecklistTemplate;
use super::ordering::move_item;
use crate::errors::ChecklistError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    /// Flags the item for the customer's attention (worn part, follow-up).
    #[serde(default)]
    pub warning: bool,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            notes: None,
            skipped: false,
            warning: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed || self.skipped
    }
}

/// Seed a fresh checklist from a template's item texts.
pub fn from_template(template: &ChecklistTemplate) -> Vec<ChecklistItem> {
    from_texts(&template.items)
}

/// Clean up an array submitted wholesale: trims text and keeps `completed`
/// and `skipped` exclusive, with `completed` winning.
pub fn normalize(items: &[ChecklistItem]) -> Result<Vec<ChecklistItem>, ChecklistError> {
    items
        .iter()
        .map(|item| {
            let text = item.text.trim();
            if text.is_empty() {
                return Err(ChecklistError::EmptyText);
            }
            Ok(ChecklistItem {
                text: text.to_string(),
                skipped: item.skipped && !item.completed,
                ..item.clone()
            })
        })
        .collect()
}

pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Vec<ChecklistItem> {
    texts
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(ChecklistItem::new)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChecklistAction {
    Complete {
        index: usize,
        #[serde(default)]
        notes: Option<String>,
    },
    Skip {
        index: usize,
        #[serde(default)]
        reason: Option<String>,
    },
    Warn {
        index: usize,
        #[serde(default)]
        note: Option<String>,
    },
    ClearWarning {
        index: usize,
    },
    Reset {
        index: usize,
    },
    Add {
        text: String,
    },
    Remove {
        index: usize,
    },
    Edit {
        index: usize,
        text: String,
    },
    Move {
        from: usize,
        to: usize,
    },
}

fn item_mut(
    items: &mut [ChecklistItem],
    index: usize,
) -> Result<&mut ChecklistItem, ChecklistError> {
    let len = items.len();
    items
        .get_mut(index)
        .ok_or(ChecklistError::IndexOutOfRange { index, len })
}

fn non_empty(text: &str) -> Result<String, ChecklistError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChecklistError::EmptyText);
    }
    Ok(trimmed.to_string())
}

/// Apply one edit in place. On error the list is left untouched.
pub fn apply(items: &mut Vec<ChecklistItem>, action: ChecklistAction) -> Result<(), ChecklistError> {
    match action {
        ChecklistAction::Complete { index, notes } => {
            let item = item_mut(items, index)?;
            item.completed = true;
            item.skipped = false;
            if notes.is_some() {
                item.notes = notes;
            }
        }
        ChecklistAction::Skip { index, reason } => {
            let item = item_mut(items, index)?;
            item.skipped = true;
            item.completed = false;
            if reason.is_some() {
                item.notes = reason;
            }
        }
        ChecklistAction::Warn { index, note } => {
            let item = item_mut(items, index)?;
            item.warning = true;
            if note.is_some() {
                item.notes = note;
            }
        }
        ChecklistAction::ClearWarning { index } => {
            item_mut(items, index)?.warning = false;
        }
        ChecklistAction::Reset { index } => {
            let item = item_mut(items, index)?;
            let text = std::mem::take(&mut item.text);
            *item = ChecklistItem::new(text);
        }
        ChecklistAction::Add { text } => {
            items.push(ChecklistItem::new(non_empty(&text)?));
        }
        ChecklistAction::Remove { index } => {
            item_mut(items, index)?;
            items.remove(index);
        }
        ChecklistAction::Edit { index, text } => {
            let text = non_empty(&text)?;
            item_mut(items, index)?.text = text;
        }
        ChecklistAction::Move { from, to } => move_item(items, from, to)?,
    }
    Ok(())
}

/// Index of the item the mechanic should work on next.
pub fn current_index(items: &[ChecklistItem]) -> Option<usize> {
    items.iter().position(|i| !i.is_done())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub warnings: usize,
    pub remaining: usize,
    pub percent: u8,
    pub current: Option<usize>,
    pub finished: bool,
}

pub fn progress(items: &[ChecklistItem]) -> ChecklistProgress {
    let total = items.len();
    let completed = items.iter().filter(|i| i.completed).count();
    let skipped = items.iter().filter(|i| i.skipped && !i.completed).count();
    let warnings = items.iter().filter(|i| i.warning).count();
    let done = items.iter().filter(|i| i.is_done()).count();
    let percent = if total == 0 {
        0
    } else {
        ((done * 100) / total) as u8
    };
    ChecklistProgress {
        total,
        completed,
        skipped,
        warnings,
        remaining: total - done,
        percent,
        current: current_index(items),
        finished: done == total,
    }
}
