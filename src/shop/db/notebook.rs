use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{ShopDb, next_position, renumber};
use crate::errors::ShopError;
use crate::shop::models::{NewPage, NotebookNode, NotebookPage, PagePatch};
use crate::shop::notebook::{build_tree, sibling_ids, subtree_ids, would_create_cycle};
use crate::shop::ordering::place_at;

const PAGE_COLUMNS: &str =
    "id, workshop_id, parent_id, title, content, is_folder, position, created_at, updated_at";

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<NotebookPage> {
    Ok(NotebookPage {
        id: row.get(0)?,
        workshop_id: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        is_folder: row.get(5)?,
        position: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl ShopDb {
    /// Parents must be folders of the same workshop.
    fn check_parent(&self, workshop_id: i64, parent_id: Option<i64>) -> Result<()> {
        if let Some(pid) = parent_id {
            let parent = self.require_page(workshop_id, pid)?;
            if !parent.is_folder {
                return Err(ShopError::NotAFolder { id: pid }.into());
            }
        }
        Ok(())
    }

    pub fn create_page(&self, workshop_id: i64, page: &NewPage) -> Result<NotebookPage> {
        self.require_workshop(workshop_id)?;
        let title = page.title.trim();
        if title.is_empty() {
            return Err(ShopError::validation("title", "is required").into());
        }
        self.check_parent(workshop_id, page.parent_id)?;
        let max: Option<i32> = self
            .conn
            .query_row(
                "SELECT MAX(position) FROM notebook_pages WHERE workshop_id = ?1 AND parent_id IS ?2",
                params![workshop_id, page.parent_id],
                |row| row.get(0),
            )
            .context("Failed to read page positions")?;
        self.conn
            .execute(
                "INSERT INTO notebook_pages (workshop_id, parent_id, title, content, is_folder, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    workshop_id,
                    page.parent_id,
                    title,
                    page.content,
                    page.is_folder,
                    next_position(max)
                ],
            )
            .context("Failed to insert notebook page")?;
        let id = self.conn.last_insert_rowid();
        self.require_page(workshop_id, id)
    }

    pub fn list_pages(&self, workshop_id: i64) -> Result<Vec<NotebookPage>> {
        let sql = format!(
            "SELECT {} FROM notebook_pages WHERE workshop_id = ?1 ORDER BY position, id",
            PAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_pages")?;
        let rows = stmt
            .query_map(params![workshop_id], page_from_row)
            .context("Failed to query notebook pages")?;
        let mut pages = Vec::new();
        for row in rows {
            pages.push(row.context("Failed to read notebook page row")?);
        }
        Ok(pages)
    }

    pub fn notebook_tree(&self, workshop_id: i64) -> Result<Vec<NotebookNode>> {
        self.require_workshop(workshop_id)?;
        Ok(build_tree(&self.list_pages(workshop_id)?))
    }

    pub fn get_page(&self, workshop_id: i64, id: i64) -> Result<Option<NotebookPage>> {
        let sql = format!(
            "SELECT {} FROM notebook_pages WHERE id = ?1 AND workshop_id = ?2",
            PAGE_COLUMNS
        );
        self.conn
            .query_row(&sql, params![id, workshop_id], page_from_row)
            .optional()
            .context("Failed to query notebook page")
    }

    pub fn require_page(&self, workshop_id: i64, id: i64) -> Result<NotebookPage> {
        self.get_page(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("NotebookPage", id).into())
    }

    pub fn update_page(&self, workshop_id: i64, id: i64, patch: &PagePatch) -> Result<NotebookPage> {
        let current = self.require_page(workshop_id, id)?;
        let title = patch.title.as_deref().map(str::trim).unwrap_or(&current.title);
        if title.is_empty() {
            return Err(ShopError::validation("title", "is required").into());
        }
        self.conn
            .execute(
                "UPDATE notebook_pages SET title = ?1, content = ?2, updated_at = datetime('now')
                 WHERE id = ?3 AND workshop_id = ?4",
                params![
                    title,
                    patch.content.as_ref().unwrap_or(&current.content),
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update notebook page")?;
        self.require_page(workshop_id, id)
    }

    /// Drag-and-drop in the sidebar: reparent the page under `parent_id`
    /// (or the root) at `position`. Rejects non-folder parents and any move
    /// that would put a page beneath itself.
    pub fn move_page(
        &self,
        workshop_id: i64,
        id: i64,
        parent_id: Option<i64>,
        position: i32,
    ) -> Result<NotebookPage> {
        let page = self.require_page(workshop_id, id)?;
        if let Some(pid) = parent_id {
            if pid == id {
                return Err(ShopError::CycleDetected {
                    page_id: id,
                    parent_id: pid,
                }
                .into());
            }
            self.check_parent(workshop_id, parent_id)?;
        }
        let pages = self.list_pages(workshop_id)?;
        if let Some(pid) = parent_id
            && would_create_cycle(&pages, id, parent_id)
        {
            tracing::warn!(workshop_id, page_id = id, parent_id = pid, "Rejected cyclic page move");
            return Err(ShopError::CycleDetected {
                page_id: id,
                parent_id: pid,
            }
            .into());
        }

        let target = place_at(&sibling_ids(&pages, parent_id), id, position);
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE notebook_pages SET parent_id = ?1, updated_at = datetime('now')
             WHERE id = ?2 AND workshop_id = ?3",
            params![parent_id, id, workshop_id],
        )
        .context("Failed to move notebook page")?;
        renumber(&tx, "notebook_pages", &target)?;
        if page.parent_id != parent_id {
            let mut old_siblings = sibling_ids(&pages, page.parent_id);
            old_siblings.retain(|p| *p != id);
            renumber(&tx, "notebook_pages", &old_siblings)?;
        }
        tx.commit().context("Failed to commit page move")?;
        self.require_page(workshop_id, id)
    }

    /// Delete a page; a folder takes its whole subtree with it. Returns the
    /// ids that were removed, or `None` when the page does not exist.
    pub fn delete_page(&self, workshop_id: i64, id: i64) -> Result<Option<Vec<i64>>> {
        let Some(page) = self.get_page(workshop_id, id)? else {
            return Ok(None);
        };
        let removed = subtree_ids(&self.list_pages(workshop_id)?, id);
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM notebook_pages WHERE id = ?1 AND workshop_id = ?2",
            params![id, workshop_id],
        )
        .context("Failed to delete notebook page")?;
        let remaining = self.list_pages(workshop_id)?;
        renumber(&tx, "notebook_pages", &sibling_ids(&remaining, page.parent_id))?;
        tx.commit().context("Failed to commit page delete")?;
        Ok(Some(removed))
    }
}
