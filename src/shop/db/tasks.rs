use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{ShopDb, clean_due_date, merge_nullable, next_position, parse_enum, renumber};
use crate::errors::ShopError;
use crate::shop::models::{BoardColumn, NewTask, ShopTask, TaskBoard, TaskColumn, TaskPatch};
use crate::shop::ordering::place_at;

const TASK_COLUMNS: &str = "id, workshop_id, title, description, status, priority, position, \
     assignee_id, due_date, created_at, updated_at";

struct TaskRow {
    id: i64,
    workshop_id: i64,
    title: String,
    description: String,
    status: String,
    priority: String,
    position: i32,
    assignee_id: Option<i64>,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            position: row.get(6)?,
            assignee_id: row.get(7)?,
            due_date: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_task(self) -> Result<ShopTask> {
        Ok(ShopTask {
            id: self.id,
            workshop_id: self.workshop_id,
            title: self.title,
            description: self.description,
            status: parse_enum(&self.status).context("Failed to parse task column")?,
            priority: parse_enum(&self.priority).context("Failed to parse task priority")?,
            position: self.position,
            assignee_id: self.assignee_id,
            due_date: self.due_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ShopDb {
    pub fn create_task(&self, workshop_id: i64, task: &NewTask) -> Result<ShopTask> {
        self.require_workshop(workshop_id)?;
        let title = task.title.trim();
        if title.is_empty() {
            return Err(ShopError::validation("title", "is required").into());
        }
        self.check_employee_ref(workshop_id, "assignee_id", task.assignee_id)?;
        let due_date = clean_due_date("due_date", task.due_date.as_deref())?;
        let max: Option<i32> = self
            .conn
            .query_row(
                "SELECT MAX(position) FROM shop_tasks WHERE workshop_id = ?1 AND status = ?2",
                params![workshop_id, task.status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to read task positions")?;
        self.conn
            .execute(
                "INSERT INTO shop_tasks (workshop_id, title, description, status, priority,
                     position, assignee_id, due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    workshop_id,
                    title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    next_position(max),
                    task.assignee_id,
                    due_date,
                ],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.require_task(workshop_id, id)
    }

    /// All tasks of a workshop, ordered by column then position.
    pub fn list_tasks(&self, workshop_id: i64) -> Result<Vec<ShopTask>> {
        let sql = format!(
            "SELECT {} FROM shop_tasks WHERE workshop_id = ?1 ORDER BY status, position, id",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(params![workshop_id], TaskRow::from_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, workshop_id: i64, id: i64) -> Result<Option<ShopTask>> {
        let sql = format!(
            "SELECT {} FROM shop_tasks WHERE id = ?1 AND workshop_id = ?2",
            TASK_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, workshop_id], TaskRow::from_row)
            .optional()
            .context("Failed to query task")?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn require_task(&self, workshop_id: i64, id: i64) -> Result<ShopTask> {
        self.get_task(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("Task", id).into())
    }

    pub fn update_task(&self, workshop_id: i64, id: i64, patch: &TaskPatch) -> Result<ShopTask> {
        let current = self.require_task(workshop_id, id)?;
        let title = patch.title.as_deref().map(str::trim).unwrap_or(&current.title);
        if title.is_empty() {
            return Err(ShopError::validation("title", "is required").into());
        }
        let assignee_id = merge_nullable(&patch.assignee_id, &current.assignee_id);
        self.check_employee_ref(workshop_id, "assignee_id", assignee_id)?;
        let due_date = clean_due_date(
            "due_date",
            merge_nullable(&patch.due_date, &current.due_date).as_deref(),
        )?;
        self.conn
            .execute(
                "UPDATE shop_tasks SET title = ?1, description = ?2, priority = ?3,
                     assignee_id = ?4, due_date = ?5, updated_at = datetime('now')
                 WHERE id = ?6 AND workshop_id = ?7",
                params![
                    title,
                    patch.description.as_ref().unwrap_or(&current.description),
                    patch.priority.unwrap_or(current.priority).as_str(),
                    assignee_id,
                    due_date,
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update task")?;
        self.require_task(workshop_id, id)
    }

    /// Kanban view: every column in board order, tasks sorted by position.
    pub fn get_board(&self, workshop_id: i64) -> Result<TaskBoard> {
        self.require_workshop(workshop_id)?;
        let all_tasks = self.list_tasks(workshop_id)?;
        let columns = TaskColumn::ORDER
            .iter()
            .map(|col| {
                let mut tasks: Vec<ShopTask> =
                    all_tasks.iter().filter(|t| t.status == *col).cloned().collect();
                tasks.sort_by_key(|t| (t.position, t.id));
                BoardColumn { name: *col, tasks }
            })
            .collect();
        Ok(TaskBoard {
            workshop_id,
            columns,
        })
    }

    fn column_task_ids(&self, workshop_id: i64, column: TaskColumn) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM shop_tasks WHERE workshop_id = ?1 AND status = ?2
                 ORDER BY position, id",
            )
            .context("Failed to prepare column query")?;
        let rows = stmt
            .query_map(params![workshop_id, column.as_str()], |row| row.get(0))
            .context("Failed to query column tasks")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read task id")?);
        }
        Ok(ids)
    }

    /// Drag-and-drop: put the task at `position` in `column` and renumber
    /// both the source and target columns densely.
    pub fn move_task(
        &self,
        workshop_id: i64,
        id: i64,
        column: TaskColumn,
        position: i32,
    ) -> Result<ShopTask> {
        let task = self.require_task(workshop_id, id)?;
        let target = place_at(&self.column_task_ids(workshop_id, column)?, id, position);
        let source = if task.status != column {
            let mut ids = self.column_task_ids(workshop_id, task.status)?;
            ids.retain(|t| *t != id);
            Some(ids)
        } else {
            None
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE shop_tasks SET status = ?1, updated_at = datetime('now')
             WHERE id = ?2 AND workshop_id = ?3",
            params![column.as_str(), id, workshop_id],
        )
        .context("Failed to move task")?;
        renumber(&tx, "shop_tasks", &target)?;
        if let Some(ids) = &source {
            renumber(&tx, "shop_tasks", ids)?;
        }
        tx.commit().context("Failed to commit task move")?;
        tracing::debug!(workshop_id, task_id = id, column = column.as_str(), position, "Task moved");
        self.require_task(workshop_id, id)
    }

    pub fn delete_task(&self, workshop_id: i64, id: i64) -> Result<bool> {
        let Some(task) = self.get_task(workshop_id, id)? else {
            return Ok(false);
        };
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM shop_tasks WHERE id = ?1 AND workshop_id = ?2",
            params![id, workshop_id],
        )
        .context("Failed to delete task")?;
        let mut remaining = self.column_task_ids(workshop_id, task.status)?;
        remaining.retain(|t| *t != id);
        renumber(&tx, "shop_tasks", &remaining)?;
        tx.commit().context("Failed to commit task delete")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::models::{EmployeeRole, Priority};

    fn task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..NewTask::default()
        }
    }

    fn titles(column: &BoardColumn) -> Vec<&str> {
        column.tasks.iter().map(|t| t.title.as_str()).collect()
    }

    fn positions(column: &BoardColumn) -> Vec<i32> {
        column.tasks.iter().map(|t| t.position).collect()
    }

    #[test]
    fn test_create_task_appends_to_column() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let a = db.create_task(wid, &task("Order tubes"))?;
        let b = db.create_task(wid, &task("Clean floor"))?;
        assert_eq!(a.status, TaskColumn::Todo);
        assert_eq!(a.priority, Priority::Medium);
        assert_eq!((a.position, b.position), (0, 1));
        Ok(())
    }

    #[test]
    fn test_board_has_all_columns_in_order() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        db.create_task(
            wid,
            &NewTask {
                status: TaskColumn::Done,
                ..task("Done already")
            },
        )?;
        let board = db.get_board(wid)?;
        let names: Vec<TaskColumn> = board.columns.iter().map(|c| c.name).collect();
        assert_eq!(names, TaskColumn::ORDER.to_vec());
        assert!(board.columns[0].tasks.is_empty());
        assert_eq!(titles(&board.columns[2]), vec!["Done already"]);
        Ok(())
    }

    #[test]
    fn test_move_within_column_keeps_positions_dense() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        db.create_task(wid, &task("A"))?;
        db.create_task(wid, &task("B"))?;
        let c = db.create_task(wid, &task("C"))?;
        db.move_task(wid, c.id, TaskColumn::Todo, 0)?;
        let board = db.get_board(wid)?;
        assert_eq!(titles(&board.columns[0]), vec!["C", "A", "B"]);
        assert_eq!(positions(&board.columns[0]), vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_move_across_columns_renumbers_both() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let a = db.create_task(wid, &task("A"))?;
        db.create_task(wid, &task("B"))?;
        db.create_task(wid, &task("C"))?;
        db.create_task(
            wid,
            &NewTask {
                status: TaskColumn::InProgress,
                ..task("X")
            },
        )?;

        let moved = db.move_task(wid, a.id, TaskColumn::InProgress, 99)?;
        assert_eq!(moved.status, TaskColumn::InProgress);
        assert_eq!(moved.position, 1);

        let board = db.get_board(wid)?;
        assert_eq!(titles(&board.columns[0]), vec!["B", "C"]);
        assert_eq!(positions(&board.columns[0]), vec![0, 1]);
        assert_eq!(titles(&board.columns[1]), vec!["X", "A"]);
        assert_eq!(positions(&board.columns[1]), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn test_delete_task_closes_gap() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let a = db.create_task(wid, &task("A"))?;
        db.create_task(wid, &task("B"))?;
        assert!(db.delete_task(wid, a.id)?);
        assert!(!db.delete_task(wid, a.id)?);
        let board = db.get_board(wid)?;
        assert_eq!(positions(&board.columns[0]), vec![0]);
        Ok(())
    }

    #[test]
    fn test_update_task_fields() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let t = db.create_task(wid, &task("A"))?;
        let patch = TaskPatch {
            priority: Some(Priority::Urgent),
            due_date: Some(Some("2024-06-01".into())),
            ..TaskPatch::default()
        };
        let t = db.update_task(wid, t.id, &patch)?;
        assert_eq!(t.priority, Priority::Urgent);
        assert_eq!(t.due_date.as_deref(), Some("2024-06-01"));
        assert_eq!(t.title, "A");
        Ok(())
    }

    #[test]
    fn test_update_task_clears_assignee() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let sam = db.create_employee(wid, "Sam", EmployeeRole::Mechanic, None)?;
        let t = db.create_task(wid, &task("A"))?;
        let patch = TaskPatch {
            assignee_id: Some(Some(sam.id)),
            due_date: Some(Some("2024-06-01".into())),
            ..TaskPatch::default()
        };
        let t = db.update_task(wid, t.id, &patch)?;
        assert_eq!(t.assignee_id, Some(sam.id));

        let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id": null}"#)?;
        let t = db.update_task(wid, t.id, &patch)?;
        assert_eq!(t.assignee_id, None);
        assert_eq!(t.due_date.as_deref(), Some("2024-06-01"));
        Ok(())
    }
}
