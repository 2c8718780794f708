use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{ShopDb, parse_enum};
use crate::errors::{FieldError, ShopError};
use crate::shop::models::{
    EndControl, Feedback, FeedbackKind, FeedbackStatus, FeedbackSummary, KindCount, NewFeedback,
};

const FEEDBACK_COLUMNS: &str = "id, workshop_id, order_id, kind, rating, message, status, created_at";

struct FeedbackRow {
    id: i64,
    workshop_id: i64,
    order_id: Option<i64>,
    kind: String,
    rating: Option<u8>,
    message: String,
    status: String,
    created_at: String,
}

impl FeedbackRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            order_id: row.get(2)?,
            kind: row.get(3)?,
            rating: row.get(4)?,
            message: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_feedback(self) -> Result<Feedback> {
        Ok(Feedback {
            id: self.id,
            workshop_id: self.workshop_id,
            order_id: self.order_id,
            kind: parse_enum(&self.kind).context("Failed to parse feedback kind")?,
            rating: self.rating,
            message: self.message,
            status: parse_enum(&self.status).context("Failed to parse feedback status")?,
            created_at: self.created_at,
        })
    }
}

/// Count and pass rate over the end controls recorded for a workshop.
fn control_pass_rate(controls: &[EndControl]) -> (usize, Option<f64>) {
    if controls.is_empty() {
        return (0, None);
    }
    let passed = controls.iter().filter(|c| c.passed).count();
    (controls.len(), Some(passed as f64 / controls.len() as f64))
}

impl ShopDb {
    pub fn create_feedback(&self, workshop_id: i64, input: &NewFeedback) -> Result<Feedback> {
        self.require_workshop(workshop_id)?;
        let mut errors = Vec::new();
        if input.message.trim().is_empty() {
            errors.push(FieldError::new("message", "is required"));
        }
        if let Some(rating) = input.rating
            && !(1..=5).contains(&rating)
        {
            errors.push(FieldError::new("rating", "must be between 1 and 5"));
        }
        if let Some(order_id) = input.order_id
            && self.get_order(workshop_id, order_id)?.is_none()
        {
            errors.push(FieldError::new("order_id", "unknown order"));
        }
        if !errors.is_empty() {
            return Err(ShopError::Validation(errors).into());
        }
        self.conn
            .execute(
                "INSERT INTO feedback (workshop_id, order_id, kind, rating, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    workshop_id,
                    input.order_id,
                    input.kind.as_str(),
                    input.rating,
                    input.message.trim()
                ],
            )
            .context("Failed to insert feedback")?;
        let id = self.conn.last_insert_rowid();
        self.require_feedback(workshop_id, id)
    }

    /// Newest first.
    pub fn list_feedback(&self, workshop_id: i64) -> Result<Vec<Feedback>> {
        let sql = format!(
            "SELECT {} FROM feedback WHERE workshop_id = ?1 ORDER BY created_at DESC, id DESC",
            FEEDBACK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_feedback")?;
        let rows = stmt
            .query_map(params![workshop_id], FeedbackRow::from_row)
            .context("Failed to query feedback")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read feedback row")?.into_feedback()?);
        }
        Ok(items)
    }

    pub fn get_feedback(&self, workshop_id: i64, id: i64) -> Result<Option<Feedback>> {
        let sql = format!(
            "SELECT {} FROM feedback WHERE id = ?1 AND workshop_id = ?2",
            FEEDBACK_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, workshop_id], FeedbackRow::from_row)
            .optional()
            .context("Failed to query feedback")?;
        row.map(FeedbackRow::into_feedback).transpose()
    }

    pub fn require_feedback(&self, workshop_id: i64, id: i64) -> Result<Feedback> {
        self.get_feedback(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("Feedback", id).into())
    }

    pub fn set_feedback_status(
        &self,
        workshop_id: i64,
        id: i64,
        status: FeedbackStatus,
    ) -> Result<Feedback> {
        let changed = self
            .conn
            .execute(
                "UPDATE feedback SET status = ?1 WHERE id = ?2 AND workshop_id = ?3",
                params![status.as_str(), id, workshop_id],
            )
            .context("Failed to update feedback status")?;
        if changed == 0 {
            return Err(ShopError::not_found("Feedback", id).into());
        }
        self.require_feedback(workshop_id, id)
    }

    pub fn delete_feedback(&self, workshop_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM feedback WHERE id = ?1 AND workshop_id = ?2",
                params![id, workshop_id],
            )
            .context("Failed to delete feedback")?;
        Ok(count > 0)
    }

    fn end_controls(&self, workshop_id: i64) -> Result<Vec<EndControl>> {
        let mut stmt = self
            .conn
            .prepare("SELECT end_control FROM orders WHERE workshop_id = ?1 AND end_control IS NOT NULL")
            .context("Failed to prepare end control query")?;
        let rows = stmt
            .query_map(params![workshop_id], |row| row.get::<_, String>(0))
            .context("Failed to query end controls")?;
        let mut controls = Vec::new();
        for row in rows {
            let raw = row.context("Failed to read end control")?;
            controls.push(serde_json::from_str(&raw).context("Failed to parse end control JSON")?);
        }
        Ok(controls)
    }

    /// Dashboard numbers: counts per status and kind, average rating over
    /// rated feedback, and the end-control pass rate.
    pub fn feedback_summary(&self, workshop_id: i64) -> Result<FeedbackSummary> {
        self.require_workshop(workshop_id)?;
        let items = self.list_feedback(workshop_id)?;
        let count_status = |s: FeedbackStatus| items.iter().filter(|f| f.status == s).count();

        let by_kind = [
            FeedbackKind::Praise,
            FeedbackKind::Complaint,
            FeedbackKind::Suggestion,
            FeedbackKind::Bug,
        ]
        .into_iter()
        .map(|kind| KindCount {
            kind,
            count: items.iter().filter(|f| f.kind == kind).count(),
        })
        .collect();

        let ratings: Vec<u8> = items.iter().filter_map(|f| f.rating).collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64)
        };

        let (controls_recorded, control_pass_rate) =
            control_pass_rate(&self.end_controls(workshop_id)?);

        Ok(FeedbackSummary {
            total: items.len(),
            open: count_status(FeedbackStatus::Open),
            acknowledged: count_status(FeedbackStatus::Acknowledged),
            resolved: count_status(FeedbackStatus::Resolved),
            by_kind,
            average_rating,
            controls_recorded,
            control_pass_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::checklist;
    use crate::shop::models::{NewOrder, OrderSource, OrderStatus};

    fn feedback(kind: FeedbackKind, rating: Option<u8>) -> NewFeedback {
        NewFeedback {
            order_id: None,
            kind,
            rating,
            message: "Thanks for the quick fix".to_string(),
        }
    }

    #[test]
    fn test_create_feedback_validates_rating_and_message() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let bad = NewFeedback {
            message: "  ".into(),
            ..feedback(FeedbackKind::Bug, Some(9))
        };
        let err = db.create_feedback(wid, &bad).unwrap_err();
        match err.downcast_ref::<ShopError>() {
            Some(ShopError::Validation(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["message", "rating"]);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_feedback_order_must_belong_to_workshop() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let a = db.create_workshop("A", None)?.id;
        let b = db.create_workshop("B", None)?.id;
        let order = db.create_order(
            a,
            &NewOrder {
                customer_name: "Ada".into(),
                ..NewOrder::default()
            },
            OrderSource::Staff,
        )?;
        let input = NewFeedback {
            order_id: Some(order.id),
            ..feedback(FeedbackKind::Praise, Some(5))
        };
        assert!(db.create_feedback(b, &input).is_err());
        let created = db.create_feedback(a, &input)?;
        assert_eq!(created.order_id, Some(order.id));
        assert_eq!(created.status, FeedbackStatus::Open);
        Ok(())
    }

    #[test]
    fn test_status_update_and_delete() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let f = db.create_feedback(wid, &feedback(FeedbackKind::Complaint, None))?;
        let f = db.set_feedback_status(wid, f.id, FeedbackStatus::Resolved)?;
        assert_eq!(f.status, FeedbackStatus::Resolved);
        assert!(db.set_feedback_status(wid, 999, FeedbackStatus::Open).is_err());
        assert!(db.delete_feedback(wid, f.id)?);
        assert!(db.list_feedback(wid)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_summary_counts_and_rates() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        db.create_feedback(wid, &feedback(FeedbackKind::Praise, Some(5)))?;
        db.create_feedback(wid, &feedback(FeedbackKind::Praise, Some(4)))?;
        let c = db.create_feedback(wid, &feedback(FeedbackKind::Complaint, None))?;
        db.set_feedback_status(wid, c.id, FeedbackStatus::Acknowledged)?;

        for passed in [true, false] {
            let order = db.create_order(
                wid,
                &NewOrder {
                    customer_name: "Ada".into(),
                    control_checklist: checklist::from_texts(&["Test ride"]),
                    ..NewOrder::default()
                },
                OrderSource::Staff,
            )?;
            db.set_order_status(wid, order.id, OrderStatus::InProgress)?;
            db.set_order_status(wid, order.id, OrderStatus::InControl)?;
            db.apply_order_checklist_action(
                wid,
                order.id,
                super::super::ChecklistColumn::Control,
                checklist::ChecklistAction::Complete { index: 0, notes: None },
            )?;
            db.record_end_control(wid, order.id, None, "Kim", passed, "")?;
        }

        let summary = db.feedback_summary(wid)?;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.open, 2);
        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.resolved, 0);
        assert_eq!(summary.by_kind[0], KindCount { kind: FeedbackKind::Praise, count: 2 });
        assert_eq!(summary.average_rating, Some(4.5));
        assert_eq!(summary.controls_recorded, 2);
        assert_eq!(summary.control_pass_rate, Some(0.5));
        Ok(())
    }

    #[test]
    fn test_empty_summary() -> Result<()> {
        let db = ShopDb::new_in_memory()?;
        let wid = db.create_workshop("Spokes", None)?.id;
        let summary = db.feedback_summary(wid)?;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average_rating, None);
        assert_eq!(summary.control_pass_rate, None);
        assert_eq!(summary.by_kind.len(), 4);
        Ok(())
    }

    #[test]
    fn test_control_pass_rate_helper() {
        assert_eq!(control_pass_rate(&[]), (0, None));
    }
}
