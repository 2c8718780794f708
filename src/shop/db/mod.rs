//! SQLite storage for the shop.
//!
//! `ShopDb` owns one connection; the `impl` blocks are split per table across
//! the submodules. Every query that touches workshop data filters on
//! `workshop_id`, so a row asked for through the wrong workshop is simply
//! not found.

mod builds;
mod feedback;
mod notebook;
mod orders;
mod tasks;
mod templates;
mod workshops;

pub use workshops::slugify;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::checklist::ChecklistItem;
use super::wizard;
use crate::errors::ShopError;

/// Async-safe handle to the shop database.
///
/// Wraps `ShopDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ShopDb>>,
}

impl DbHandle {
    pub fn new(db: ShopDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ShopDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| ShopError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct ShopDb {
    conn: Connection,
}

impl ShopDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure connection")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workshops (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS employees (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'mechanic',
                    email TEXT,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    seq INTEGER NOT NULL,
                    order_number TEXT NOT NULL,
                    customer_name TEXT NOT NULL,
                    customer_email TEXT,
                    customer_phone TEXT,
                    bike_brand TEXT NOT NULL DEFAULT '',
                    bike_model TEXT NOT NULL DEFAULT '',
                    bike_type TEXT,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'new',
                    source TEXT NOT NULL DEFAULT 'staff',
                    tracking_code TEXT NOT NULL UNIQUE,
                    assigned_to INTEGER REFERENCES employees(id) ON DELETE SET NULL,
                    estimated_price REAL,
                    final_price REAL,
                    due_date TEXT,
                    checklist TEXT NOT NULL DEFAULT '[]',
                    control_checklist TEXT NOT NULL DEFAULT '[]',
                    end_control TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(workshop_id, seq)
                );

                CREATE TABLE IF NOT EXISTS bike_builds (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    customer_name TEXT,
                    brand TEXT NOT NULL,
                    model TEXT NOT NULL,
                    frame_size TEXT,
                    color TEXT,
                    frame_number TEXT,
                    status TEXT NOT NULL DEFAULT 'planned',
                    mechanic_id INTEGER REFERENCES employees(id) ON DELETE SET NULL,
                    due_date TEXT,
                    notes TEXT NOT NULL DEFAULT '',
                    checklist TEXT NOT NULL DEFAULT '[]',
                    control_checklist TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS checklist_templates (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'service',
                    items TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(workshop_id, name)
                );

                CREATE TABLE IF NOT EXISTS shop_tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'todo',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    position INTEGER NOT NULL DEFAULT 0,
                    assignee_id INTEGER REFERENCES employees(id) ON DELETE SET NULL,
                    due_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS notebook_pages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    parent_id INTEGER REFERENCES notebook_pages(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL DEFAULT '',
                    is_folder INTEGER NOT NULL DEFAULT 0,
                    position INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS feedback (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workshop_id INTEGER NOT NULL REFERENCES workshops(id) ON DELETE CASCADE,
                    order_id INTEGER REFERENCES orders(id) ON DELETE SET NULL,
                    kind TEXT NOT NULL,
                    rating INTEGER,
                    message TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_employees_workshop ON employees(workshop_id);
                CREATE INDEX IF NOT EXISTS idx_orders_workshop ON orders(workshop_id, status);
                CREATE INDEX IF NOT EXISTS idx_builds_workshop ON bike_builds(workshop_id, status);
                CREATE INDEX IF NOT EXISTS idx_templates_workshop ON checklist_templates(workshop_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_column ON shop_tasks(workshop_id, status, position);
                CREATE INDEX IF NOT EXISTS idx_pages_parent ON notebook_pages(workshop_id, parent_id);
                CREATE INDEX IF NOT EXISTS idx_feedback_workshop ON feedback(workshop_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read setting")
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .context("Failed to write setting")?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .context("Failed to delete setting")?;
        Ok(())
    }
}

/// Which of the two checklist columns an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistColumn {
    Service,
    Control,
}

impl ChecklistColumn {
    fn column(&self) -> &'static str {
        match self {
            Self::Service => "checklist",
            Self::Control => "control_checklist",
        }
    }
}

// ── Column codecs ─────────────────────────────────────────────────────

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(|e| anyhow::anyhow!(e))
}

fn parse_checklist(raw: &str) -> Result<Vec<ChecklistItem>> {
    serde_json::from_str(raw).context("Failed to parse checklist JSON")
}

fn encode_checklist(items: &[ChecklistItem]) -> Result<String> {
    serde_json::to_string(items).context("Failed to encode checklist")
}

/// Next free position at the end of a list, given the current max (or NULL).
/// Resolve a clearable PATCH field against the stored value.
fn merge_nullable<T: Clone>(patch: &Option<Option<T>>, current: &Option<T>) -> Option<T> {
    match patch {
        Some(value) => value.clone(),
        None => current.clone(),
    }
}

/// Blank dates are stored as NULL; anything else must be `YYYY-MM-DD`.
fn clean_due_date(field: &str, value: Option<&str>) -> Result<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let mut errors = Vec::new();
    wizard::check_date(&mut errors, field, value);
    if !errors.is_empty() {
        return Err(ShopError::Validation(errors).into());
    }
    Ok(Some(value.to_string()))
}

fn next_position(max: Option<i32>) -> i32 {
    max.map(|m| m + 1).unwrap_or(0)
}

/// Rewrite `position` as `0..n` following the order of `ids`.
fn renumber(conn: &Connection, table: &str, ids: &[i64]) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET position = ?1, updated_at = datetime('now') WHERE id = ?2",
        table
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare renumber")?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute(params![position as i32, id])
            .with_context(|| format!("Failed to renumber {} row {}", table, id))?;
    }
    Ok(())
}

fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            names
        };
        for expected in [
            "bike_builds",
            "checklist_templates",
            "employees",
            "feedback",
            "notebook_pages",
            "orders",
            "settings",
            "shop_tasks",
            "workshops",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shop.db");
        {
            let db = ShopDb::new(&path)?;
            db.create_workshop("Spokes", None)?;
        }
        let db = ShopDb::new(&path)?;
        assert_eq!(db.list_workshops()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_get_setting_returns_none_for_missing_key() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        assert_eq!(db.get_setting("nope")?, None);
        Ok(())
    }

    #[test]
    fn test_set_setting_overwrites_existing() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        db.set_setting("k", "v1")?;
        db.set_setting("k", "v2")?;
        assert_eq!(db.get_setting("k")?.as_deref(), Some("v2"));
        db.delete_setting("k")?;
        assert_eq!(db.get_setting("k")?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() -> Result<()> {
        let handle = DbHandle::new(ShopDb::new_in_memory()?);
        let ws = handle.call(|db| db.create_workshop("Async Bikes", None)).await?;
        assert_eq!(ws.slug, "async-bikes");
        Ok(())
    }

    #[test]
    fn test_next_position() {
        assert_eq!(next_position(None), 0);
        assert_eq!(next_position(Some(4)), 5);
    }
}
