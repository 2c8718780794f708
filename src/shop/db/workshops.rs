use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{ShopDb, parse_enum};
use crate::errors::ShopError;
use crate::shop::branding::{self, Branding};
use crate::shop::models::{Employee, EmployeePatch, EmployeeRole, Workshop};

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed into
/// single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if dash && !slug.is_empty() {
                slug.push('-');
            }
            dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            dash = true;
        }
    }
    slug
}

fn workshop_from_row(row: &Row<'_>) -> rusqlite::Result<Workshop> {
    Ok(Workshop {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: row.get(3)?,
    })
}

struct EmployeeRow {
    id: i64,
    workshop_id: i64,
    name: String,
    role: String,
    email: Option<String>,
    active: bool,
    created_at: String,
}

impl EmployeeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            email: row.get(4)?,
            active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_employee(self) -> Result<Employee> {
        Ok(Employee {
            id: self.id,
            workshop_id: self.workshop_id,
            name: self.name,
            role: parse_enum(&self.role)?,
            email: self.email,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

const EMPLOYEE_COLUMNS: &str = "id, workshop_id, name, role, email, active, created_at";

impl ShopDb {
    // ── Workshops ─────────────────────────────────────────────────────

    pub fn create_workshop(&self, name: &str, slug: Option<&str>) -> Result<Workshop> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ShopError::validation("name", "is required").into());
        }
        let slug = slugify(slug.unwrap_or(name));
        if slug.is_empty() {
            return Err(ShopError::validation("slug", "must contain letters or digits").into());
        }
        if self.get_workshop_by_slug(&slug)?.is_some() {
            return Err(ShopError::Conflict(format!("Workshop slug '{}' is taken", slug)).into());
        }
        self.conn
            .execute(
                "INSERT INTO workshops (name, slug) VALUES (?1, ?2)",
                params![name, slug],
            )
            .context("Failed to insert workshop")?;
        let id = self.conn.last_insert_rowid();
        self.require_workshop(id)
    }

    pub fn list_workshops(&self) -> Result<Vec<Workshop>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, created_at FROM workshops ORDER BY id")
            .context("Failed to prepare list_workshops")?;
        let rows = stmt
            .query_map([], workshop_from_row)
            .context("Failed to query workshops")?;
        let mut workshops = Vec::new();
        for row in rows {
            workshops.push(row.context("Failed to read workshop row")?);
        }
        Ok(workshops)
    }

    pub fn get_workshop(&self, id: i64) -> Result<Option<Workshop>> {
        self.conn
            .query_row(
                "SELECT id, name, slug, created_at FROM workshops WHERE id = ?1",
                params![id],
                workshop_from_row,
            )
            .optional()
            .context("Failed to query workshop")
    }

    pub fn require_workshop(&self, id: i64) -> Result<Workshop> {
        self.get_workshop(id)?
            .ok_or_else(|| ShopError::not_found("Workshop", id).into())
    }

    pub fn get_workshop_by_slug(&self, slug: &str) -> Result<Option<Workshop>> {
        self.conn
            .query_row(
                "SELECT id, name, slug, created_at FROM workshops WHERE slug = ?1",
                params![slug],
                workshop_from_row,
            )
            .optional()
            .context("Failed to query workshop by slug")
    }

    // ── Employees ─────────────────────────────────────────────────────

    pub fn create_employee(
        &self,
        workshop_id: i64,
        name: &str,
        role: EmployeeRole,
        email: Option<&str>,
    ) -> Result<Employee> {
        self.require_workshop(workshop_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ShopError::validation("name", "is required").into());
        }
        self.conn
            .execute(
                "INSERT INTO employees (workshop_id, name, role, email) VALUES (?1, ?2, ?3, ?4)",
                params![workshop_id, name, role.as_str(), email],
            )
            .context("Failed to insert employee")?;
        let id = self.conn.last_insert_rowid();
        self.require_employee(workshop_id, id)
    }

    pub fn list_employees(&self, workshop_id: i64, active_only: bool) -> Result<Vec<Employee>> {
        let sql = format!(
            "SELECT {} FROM employees WHERE workshop_id = ?1 {} ORDER BY name, id",
            EMPLOYEE_COLUMNS,
            if active_only { "AND active = 1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_employees")?;
        let rows = stmt
            .query_map(params![workshop_id], EmployeeRow::from_row)
            .context("Failed to query employees")?;
        let mut employees = Vec::new();
        for row in rows {
            employees.push(row.context("Failed to read employee row")?.into_employee()?);
        }
        Ok(employees)
    }

    pub fn get_employee(&self, workshop_id: i64, id: i64) -> Result<Option<Employee>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM employees WHERE id = ?1 AND workshop_id = ?2",
                    EMPLOYEE_COLUMNS
                ),
                params![id, workshop_id],
                EmployeeRow::from_row,
            )
            .optional()
            .context("Failed to query employee")?;
        row.map(EmployeeRow::into_employee).transpose()
    }

    pub fn require_employee(&self, workshop_id: i64, id: i64) -> Result<Employee> {
        self.get_employee(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("Employee", id).into())
    }

    pub fn update_employee(&self, workshop_id: i64, id: i64, patch: &EmployeePatch) -> Result<Employee> {
        let current = self.require_employee(workshop_id, id)?;
        let name = patch.name.as_deref().map(str::trim).unwrap_or(&current.name);
        if name.is_empty() {
            return Err(ShopError::validation("name", "is required").into());
        }
        self.conn
            .execute(
                "UPDATE employees SET name = ?1, role = ?2, email = ?3, active = ?4
                 WHERE id = ?5 AND workshop_id = ?6",
                params![
                    name,
                    patch.role.unwrap_or(current.role).as_str(),
                    patch.email.as_deref().or(current.email.as_deref()),
                    patch.active.unwrap_or(current.active),
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update employee")?;
        self.require_employee(workshop_id, id)
    }

    /// Soft delete: employees stay referenced by past orders.
    pub fn deactivate_employee(&self, workshop_id: i64, id: i64) -> Result<Employee> {
        let patch = EmployeePatch {
            active: Some(false),
            ..EmployeePatch::default()
        };
        self.update_employee(workshop_id, id, &patch)
    }

    /// Reject employee ids that don't belong to the workshop.
    pub(super) fn check_employee_ref(&self, workshop_id: i64, field: &str, id: Option<i64>) -> Result<()> {
        if let Some(id) = id
            && self.get_employee(workshop_id, id)?.is_none()
        {
            return Err(ShopError::validation(field, "unknown employee").into());
        }
        Ok(())
    }

    // ── Branding ──────────────────────────────────────────────────────

    /// Stored branding, or the defaults when the workshop never saved any.
    pub fn get_branding(&self, workshop_id: i64) -> Result<Branding> {
        self.require_workshop(workshop_id)?;
        match self.get_setting(&branding::settings_key(workshop_id))? {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse branding JSON"),
            None => Ok(Branding::default()),
        }
    }

    pub fn save_branding(&self, workshop_id: i64, branding: &Branding) -> Result<Branding> {
        self.require_workshop(workshop_id)?;
        let errors = branding.validate();
        if !errors.is_empty() {
            return Err(ShopError::Validation(errors).into());
        }
        let key = branding::settings_key(workshop_id);
        if *branding == Branding::default() {
            // Saving the defaults resets the workshop to the built-in theme.
            self.delete_setting(&key)?;
        } else {
            let raw = serde_json::to_string(branding).context("Failed to encode branding")?;
            self.set_setting(&key, &raw)?;
        }
        Ok(branding.clone())
    }
}
