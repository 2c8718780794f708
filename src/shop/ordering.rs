//! Drag-and-drop reordering helpers shared by checklists, the task board and
//! the notebook sidebar.

use crate::errors::ChecklistError;

/// Move the element at `from` so that it ends up at index `to`.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), ChecklistError> {
    let len = items.len();
    if from >= len {
        return Err(ChecklistError::IndexOutOfRange { index: from, len });
    }
    if to >= len {
        return Err(ChecklistError::IndexOutOfRange { index: to, len });
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

/// Place `id` at `position` within `siblings` (ids in display order) and
/// return the new dense ordering. `id` is removed first if already present;
/// positions past the end append.
pub fn place_at(siblings: &[i64], id: i64, position: i32) -> Vec<i64> {
    let mut ordered: Vec<i64> = siblings.iter().copied().filter(|s| *s != id).collect();
    let index = position.clamp(0, ordered.len() as i32) as usize;
    ordered.insert(index, id);
    ordered
}
