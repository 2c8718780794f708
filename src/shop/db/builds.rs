use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{
    ChecklistColumn, ShopDb, clean_due_date, encode_checklist, merge_nullable, parse_checklist, parse_enum,
};
use crate::errors::ShopError;
use crate::shop::checklist::{self, ChecklistAction, ChecklistItem};
use crate::shop::models::{BikeBuild, BuildPatch, BuildStatus, NewBuild};

const BUILD_COLUMNS: &str = "id, workshop_id, customer_name, brand, model, frame_size, color, \
     frame_number, status, mechanic_id, due_date, notes, checklist, control_checklist, \
     created_at, updated_at";

struct BuildRow {
    id: i64,
    workshop_id: i64,
    customer_name: Option<String>,
    brand: String,
    model: String,
    frame_size: Option<String>,
    color: Option<String>,
    frame_number: Option<String>,
    status: String,
    mechanic_id: Option<i64>,
    due_date: Option<String>,
    notes: String,
    checklist: String,
    control_checklist: String,
    created_at: String,
    updated_at: String,
}

impl BuildRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            customer_name: row.get(2)?,
            brand: row.get(3)?,
            model: row.get(4)?,
            frame_size: row.get(5)?,
            color: row.get(6)?,
            frame_number: row.get(7)?,
            status: row.get(8)?,
            mechanic_id: row.get(9)?,
            due_date: row.get(10)?,
            notes: row.get(11)?,
            checklist: row.get(12)?,
            control_checklist: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_build(self) -> Result<BikeBuild> {
        Ok(BikeBuild {
            id: self.id,
            workshop_id: self.workshop_id,
            customer_name: self.customer_name,
            brand: self.brand,
            model: self.model,
            frame_size: self.frame_size,
            color: self.color,
            frame_number: self.frame_number,
            status: parse_enum(&self.status).context("Failed to parse build status")?,
            mechanic_id: self.mechanic_id,
            due_date: self.due_date,
            notes: self.notes,
            checklist: parse_checklist(&self.checklist)?,
            control_checklist: parse_checklist(&self.control_checklist)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ShopError::validation(field, "is required").into());
    }
    Ok(())
}

impl ShopDb {
    pub fn create_build(&self, workshop_id: i64, build: &NewBuild) -> Result<BikeBuild> {
        self.require_workshop(workshop_id)?;
        require_text("brand", &build.brand)?;
        require_text("model", &build.model)?;
        self.check_employee_ref(workshop_id, "mechanic_id", build.mechanic_id)?;
        let due_date = clean_due_date("due_date", build.due_date.as_deref())?;
        let items = checklist::normalize(&build.checklist).map_err(ShopError::from)?;
        let control_items = checklist::normalize(&build.control_checklist).map_err(ShopError::from)?;
        self.conn
            .execute(
                "INSERT INTO bike_builds (workshop_id, customer_name, brand, model, frame_size,
                     color, frame_number, mechanic_id, due_date, notes, checklist, control_checklist)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    workshop_id,
                    build.customer_name,
                    build.brand.trim(),
                    build.model.trim(),
                    build.frame_size,
                    build.color,
                    build.frame_number,
                    build.mechanic_id,
                    due_date,
                    build.notes,
                    encode_checklist(&items)?,
                    encode_checklist(&control_items)?,
                ],
            )
            .context("Failed to insert bike build")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(workshop_id, build_id = id, "Bike build created");
        self.require_build(workshop_id, id)
    }

    pub fn list_builds(&self, workshop_id: i64) -> Result<Vec<BikeBuild>> {
        let sql = format!(
            "SELECT {} FROM bike_builds WHERE workshop_id = ?1 ORDER BY id",
            BUILD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_builds")?;
        let rows = stmt
            .query_map(params![workshop_id], BuildRow::from_row)
            .context("Failed to query bike builds")?;
        let mut builds = Vec::new();
        for row in rows {
            builds.push(row.context("Failed to read bike build row")?.into_build()?);
        }
        Ok(builds)
    }

    pub fn get_build(&self, workshop_id: i64, id: i64) -> Result<Option<BikeBuild>> {
        let sql = format!(
            "SELECT {} FROM bike_builds WHERE id = ?1 AND workshop_id = ?2",
            BUILD_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, workshop_id], BuildRow::from_row)
            .optional()
            .context("Failed to query bike build")?;
        row.map(BuildRow::into_build).transpose()
    }

    pub fn require_build(&self, workshop_id: i64, id: i64) -> Result<BikeBuild> {
        self.get_build(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("BikeBuild", id).into())
    }

    pub fn update_build(&self, workshop_id: i64, id: i64, patch: &BuildPatch) -> Result<BikeBuild> {
        let current = self.require_build(workshop_id, id)?;
        if let Some(brand) = &patch.brand {
            require_text("brand", brand)?;
        }
        if let Some(model) = &patch.model {
            require_text("model", model)?;
        }
        let mechanic_id = merge_nullable(&patch.mechanic_id, &current.mechanic_id);
        self.check_employee_ref(workshop_id, "mechanic_id", mechanic_id)?;
        let due_date = clean_due_date(
            "due_date",
            merge_nullable(&patch.due_date, &current.due_date).as_deref(),
        )?;
        self.conn
            .execute(
                "UPDATE bike_builds SET customer_name = ?1, brand = ?2, model = ?3, frame_size = ?4,
                     color = ?5, frame_number = ?6, mechanic_id = ?7, due_date = ?8, notes = ?9,
                     updated_at = datetime('now')
                 WHERE id = ?10 AND workshop_id = ?11",
                params![
                    merge_nullable(&patch.customer_name, &current.customer_name),
                    patch.brand.as_deref().map(str::trim).unwrap_or(&current.brand),
                    patch.model.as_deref().map(str::trim).unwrap_or(&current.model),
                    merge_nullable(&patch.frame_size, &current.frame_size),
                    merge_nullable(&patch.color, &current.color),
                    merge_nullable(&patch.frame_number, &current.frame_number),
                    mechanic_id,
                    due_date,
                    patch.notes.as_ref().unwrap_or(&current.notes),
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update bike build")?;
        self.require_build(workshop_id, id)
    }

    /// Move a build along its lifecycle. Leaving `in_control` for `done`
    /// needs the control checklist finished.
    pub fn set_build_status(&self, workshop_id: i64, id: i64, status: BuildStatus) -> Result<BikeBuild> {
        let build = self.require_build(workshop_id, id)?;
        if !build.status.can_transition_to(status) {
            return Err(ShopError::InvalidTransition {
                from: build.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        if status == BuildStatus::Done && build.status == BuildStatus::InControl {
            let progress = checklist::progress(&build.control_checklist);
            if !progress.finished {
                return Err(ShopError::ChecklistIncomplete {
                    remaining: progress.remaining,
                }
                .into());
            }
        }
        self.conn
            .execute(
                "UPDATE bike_builds SET status = ?1, updated_at = datetime('now')
                 WHERE id = ?2 AND workshop_id = ?3",
                params![status.as_str(), id, workshop_id],
            )
            .context("Failed to update bike build status")?;
        tracing::info!(workshop_id, build_id = id, from = %build.status, to = %status, "Build status changed");
        self.require_build(workshop_id, id)
    }

    pub fn save_build_checklist(
        &self,
        workshop_id: i64,
        id: i64,
        column: ChecklistColumn,
        items: &[ChecklistItem],
    ) -> Result<BikeBuild> {
        let items = checklist::normalize(items).map_err(ShopError::from)?;
        let sql = format!(
            "UPDATE bike_builds SET {} = ?1, updated_at = datetime('now') WHERE id = ?2 AND workshop_id = ?3",
            column.column()
        );
        let changed = self
            .conn
            .execute(&sql, params![encode_checklist(&items)?, id, workshop_id])
            .context("Failed to save build checklist")?;
        if changed == 0 {
            return Err(ShopError::not_found("BikeBuild", id).into());
        }
        self.require_build(workshop_id, id)
    }

    pub fn apply_build_checklist_action(
        &self,
        workshop_id: i64,
        id: i64,
        column: ChecklistColumn,
        action: ChecklistAction,
    ) -> Result<BikeBuild> {
        let build = self.require_build(workshop_id, id)?;
        let mut items = match column {
            ChecklistColumn::Service => build.checklist,
            ChecklistColumn::Control => build.control_checklist,
        };
        checklist::apply(&mut items, action).map_err(ShopError::from)?;
        self.save_build_checklist(workshop_id, id, column, &items)
    }

    pub fn delete_build(&self, workshop_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM bike_builds WHERE id = ?1 AND workshop_id = ?2",
                params![id, workshop_id],
            )
            .context("Failed to delete bike build")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::models::EmployeeRole;

    fn new_build() -> NewBuild {
        NewBuild {
            brand: "Trek".into(),
            model: "FX 3".into(),
            frame_size: Some("L".into()),
            checklist: checklist::from_texts(&["Mount wheels", "Set gears"]),
            control_checklist: checklist::from_texts(&["Torque check"]),
            ..NewBuild::default()
        }
    }

    #[test]
    fn test_create_and_list_builds() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let build = db.create_build(wid, &new_build())?;
        assert_eq!(build.status, BuildStatus::Planned);
        assert_eq!(build.checklist.len(), 2);
        assert_eq!(db.list_builds(wid)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_create_build_requires_brand_and_model() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let input = NewBuild {
            model: " ".into(),
            ..new_build()
        };
        let err = db.create_build(wid, &input).unwrap_err();
        match err.downcast_ref::<ShopError>() {
            Some(ShopError::Validation(fields)) => assert_eq!(fields[0].field, "model"),
            other => panic!("Expected validation error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_build_done_requires_control_checklist() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let build = db.create_build(wid, &new_build())?;
        db.set_build_status(wid, build.id, BuildStatus::Assembling)?;
        db.set_build_status(wid, build.id, BuildStatus::InControl)?;

        let err = db.set_build_status(wid, build.id, BuildStatus::Done).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::ChecklistIncomplete { remaining: 1 })
        ));

        db.apply_build_checklist_action(
            wid,
            build.id,
            ChecklistColumn::Control,
            ChecklistAction::Complete { index: 0, notes: None },
        )?;
        let done = db.set_build_status(wid, build.id, BuildStatus::Done)?;
        assert_eq!(done.status, BuildStatus::Done);
        Ok(())
    }

    #[test]
    fn test_build_rejects_skipped_statuses() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let build = db.create_build(wid, &new_build())?;
        let err = db.set_build_status(wid, build.id, BuildStatus::Delivered).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShopError>(),
            Some(ShopError::InvalidTransition { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_update_build_and_tenant_isolation() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let a = db.create_workshop("A", None)?.id;
        let b = db.create_workshop("B", None)?.id;
        let build = db.create_build(a, &new_build())?;
        let patch = BuildPatch {
            color: Some(Some("Matte black".into())),
            ..BuildPatch::default()
        };
        let updated = db.update_build(a, build.id, &patch)?;
        assert_eq!(updated.color.as_deref(), Some("Matte black"));
        assert_eq!(updated.frame_size.as_deref(), Some("L"));

        assert!(db.get_build(b, build.id)?.is_none());
        assert!(db.update_build(b, build.id, &patch).is_err());
        assert!(!db.delete_build(b, build.id)?);
        assert!(db.delete_build(a, build.id)?);
        Ok(())
    }

    #[test]
    fn test_update_build_clears_mechanic_and_due_date() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let mechanic = db.create_employee(wid, "Sam", EmployeeRole::Mechanic, None)?;
        let mut new = new_build();
        new.mechanic_id = Some(mechanic.id);
        new.due_date = Some("2030-01-01".into());
        let build = db.create_build(wid, &new)?;
        assert_eq!(build.mechanic_id, Some(mechanic.id));

        let patch: BuildPatch = serde_json::from_str(r#"{"mechanic_id": null, "due_date": null}"#)?;
        let cleared = db.update_build(wid, build.id, &patch)?;
        assert_eq!(cleared.mechanic_id, None);
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.frame_size.as_deref(), Some("L"));

        let patch = BuildPatch {
            due_date: Some(Some("soon".into())),
            ..BuildPatch::default()
        };
        assert!(db.update_build(wid, build.id, &patch).is_err());
        Ok(())
    }

    #[test]
    fn test_saved_build_checklist_keeps_flags_exclusive() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let build = db.create_build(wid, &new_build())?;
        let mut item = ChecklistItem::new("Torque check");
        item.completed = true;
        item.skipped = true;
        let saved = db.save_build_checklist(wid, build.id, ChecklistColumn::Control, &[item])?;
        assert!(!saved.control_checklist[0].skipped);
        assert!(checklist::progress(&saved.control_checklist).finished);
        Ok(())
    }
}
