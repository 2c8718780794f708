use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{ShopDb, parse_enum};
use crate::errors::ShopError;
use crate::shop::models::{ChecklistTemplate, TemplateKind, TemplatePatch};

const TEMPLATE_COLUMNS: &str = "id, workshop_id, name, kind, items, created_at";

struct TemplateRow {
    id: i64,
    workshop_id: i64,
    name: String,
    kind: String,
    items: String,
    created_at: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            items: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_template(self) -> Result<ChecklistTemplate> {
        Ok(ChecklistTemplate {
            id: self.id,
            workshop_id: self.workshop_id,
            name: self.name,
            kind: parse_enum(&self.kind).context("Failed to parse template kind")?,
            items: serde_json::from_str(&self.items).context("Failed to parse template items JSON")?,
            created_at: self.created_at,
        })
    }
}

/// Trimmed item texts with blank lines dropped.
fn clean_items(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

impl ShopDb {
    pub fn create_template(
        &self,
        workshop_id: i64,
        name: &str,
        kind: TemplateKind,
        items: &[String],
    ) -> Result<ChecklistTemplate> {
        self.require_workshop(workshop_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ShopError::validation("name", "is required").into());
        }
        if self.get_template_by_name(workshop_id, name)?.is_some() {
            return Err(ShopError::Conflict(format!("Template '{}' already exists", name)).into());
        }
        let items = serde_json::to_string(&clean_items(items)).context("Failed to encode items")?;
        self.conn
            .execute(
                "INSERT INTO checklist_templates (workshop_id, name, kind, items) VALUES (?1, ?2, ?3, ?4)",
                params![workshop_id, name, kind.as_str(), items],
            )
            .context("Failed to insert checklist template")?;
        let id = self.conn.last_insert_rowid();
        self.require_template(workshop_id, id)
    }

    pub fn list_templates(
        &self,
        workshop_id: i64,
        kind: Option<TemplateKind>,
    ) -> Result<Vec<ChecklistTemplate>> {
        let sql = format!(
            "SELECT {} FROM checklist_templates
             WHERE workshop_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY name",
            TEMPLATE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_templates")?;
        let rows = stmt
            .query_map(
                params![workshop_id, kind.map(|k| k.as_str())],
                TemplateRow::from_row,
            )
            .context("Failed to query checklist templates")?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row.context("Failed to read template row")?.into_template()?);
        }
        Ok(templates)
    }

    pub fn get_template(&self, workshop_id: i64, id: i64) -> Result<Option<ChecklistTemplate>> {
        let sql = format!(
            "SELECT {} FROM checklist_templates WHERE id = ?1 AND workshop_id = ?2",
            TEMPLATE_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, workshop_id], TemplateRow::from_row)
            .optional()
            .context("Failed to query checklist template")?;
        row.map(TemplateRow::into_template).transpose()
    }

    pub fn require_template(&self, workshop_id: i64, id: i64) -> Result<ChecklistTemplate> {
        self.get_template(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("ChecklistTemplate", id).into())
    }

    pub fn get_template_by_name(&self, workshop_id: i64, name: &str) -> Result<Option<ChecklistTemplate>> {
        let sql = format!(
            "SELECT {} FROM checklist_templates WHERE workshop_id = ?1 AND name = ?2",
            TEMPLATE_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![workshop_id, name.trim()], TemplateRow::from_row)
            .optional()
            .context("Failed to query checklist template by name")?;
        row.map(TemplateRow::into_template).transpose()
    }

    pub fn update_template(
        &self,
        workshop_id: i64,
        id: i64,
        patch: &TemplatePatch,
    ) -> Result<ChecklistTemplate> {
        let current = self.require_template(workshop_id, id)?;
        let name = patch.name.as_deref().map(str::trim).unwrap_or(&current.name);
        if name.is_empty() {
            return Err(ShopError::validation("name", "is required").into());
        }
        if name != current.name
            && let Some(other) = self.get_template_by_name(workshop_id, name)?
            && other.id != id
        {
            return Err(ShopError::Conflict(format!("Template '{}' already exists", name)).into());
        }
        let items = match &patch.items {
            Some(items) => clean_items(items),
            None => current.items.clone(),
        };
        let items = serde_json::to_string(&items).context("Failed to encode items")?;
        self.conn
            .execute(
                "UPDATE checklist_templates SET name = ?1, kind = ?2, items = ?3
                 WHERE id = ?4 AND workshop_id = ?5",
                params![
                    name,
                    patch.kind.unwrap_or(current.kind).as_str(),
                    items,
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update checklist template")?;
        self.require_template(workshop_id, id)
    }

    pub fn delete_template(&self, workshop_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM checklist_templates WHERE id = ?1 AND workshop_id = ?2",
                params![id, workshop_id],
            )
            .context("Failed to delete checklist template")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_template_cleans_items() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let t = db.create_template(
            wid,
            " Standard service ",
            TemplateKind::Service,
            &texts(&["Brakes ", "", "Gears"]),
        )?;
        assert_eq!(t.name, "Standard service");
        assert_eq!(t.items, vec!["Brakes", "Gears"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_template_name_conflicts() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        db.create_template(wid, "Basic", TemplateKind::Service, &[])?;
        let err = db
            .create_template(wid, "Basic", TemplateKind::Control, &[])
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ShopError>(), Some(ShopError::Conflict(_))));

        let other = db.create_workshop("Other", None)?.id;
        assert!(db.create_template(other, "Basic", TemplateKind::Service, &[]).is_ok());
        Ok(())
    }

    #[test]
    fn test_list_templates_filters_by_kind() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        db.create_template(wid, "Service A", TemplateKind::Service, &[])?;
        db.create_template(wid, "Control A", TemplateKind::Control, &[])?;
        assert_eq!(db.list_templates(wid, None)?.len(), 2);
        let controls = db.list_templates(wid, Some(TemplateKind::Control))?;
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].name, "Control A");
        Ok(())
    }

    #[test]
    fn test_update_and_delete_template() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let t = db.create_template(wid, "Basic", TemplateKind::Service, &texts(&["One"]))?;
        let patch = TemplatePatch {
            items: Some(texts(&["One", "Two"])),
            ..TemplatePatch::default()
        };
        let t = db.update_template(wid, t.id, &patch)?;
        assert_eq!(t.items.len(), 2);
        assert_eq!(t.name, "Basic");
        assert!(db.delete_template(wid, t.id)?);
        assert!(db.get_template(wid, t.id)?.is_none());
        Ok(())
    }
}
