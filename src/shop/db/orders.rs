use anyhow::{Context, Result};
use chrono::Datelike;
use rusqlite::{OptionalExtension, Row, params};

use super::{
    ChecklistColumn, ShopDb, clean_due_date, encode_checklist, merge_nullable, now_timestamp,
    parse_checklist, parse_enum,
};
use crate::errors::ShopError;
use crate::shop::checklist::{self, ChecklistAction, ChecklistItem};
use crate::shop::models::{
    EndControl, NewOrder, Order, OrderDetail, OrderPatch, OrderSource, OrderStatus,
};

const ORDER_COLUMNS: &str = "id, workshop_id, order_number, customer_name, customer_email, \
     customer_phone, bike_brand, bike_model, bike_type, description, status, source, \
     tracking_code, assigned_to, estimated_price, final_price, due_date, checklist, \
     control_checklist, end_control, created_at, updated_at";

/// Intermediate row struct: status, source and the JSON columns are decoded
/// in `into_order`.
struct OrderRow {
    id: i64,
    workshop_id: i64,
    order_number: String,
    customer_name: String,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    bike_brand: String,
    bike_model: String,
    bike_type: Option<String>,
    description: String,
    status: String,
    source: String,
    tracking_code: String,
    assigned_to: Option<i64>,
    estimated_price: Option<f64>,
    final_price: Option<f64>,
    due_date: Option<String>,
    checklist: String,
    control_checklist: String,
    end_control: Option<String>,
    created_at: String,
    updated_at: String,
}

impl OrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workshop_id: row.get(1)?,
            order_number: row.get(2)?,
            customer_name: row.get(3)?,
            customer_email: row.get(4)?,
            customer_phone: row.get(5)?,
            bike_brand: row.get(6)?,
            bike_model: row.get(7)?,
            bike_type: row.get(8)?,
            description: row.get(9)?,
            status: row.get(10)?,
            source: row.get(11)?,
            tracking_code: row.get(12)?,
            assigned_to: row.get(13)?,
            estimated_price: row.get(14)?,
            final_price: row.get(15)?,
            due_date: row.get(16)?,
            checklist: row.get(17)?,
            control_checklist: row.get(18)?,
            end_control: row.get(19)?,
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    fn into_order(self) -> Result<Order> {
        let end_control = match self.end_control.as_deref() {
            Some(raw) => Some(
                serde_json::from_str::<EndControl>(raw).context("Failed to parse end control JSON")?,
            ),
            None => None,
        };
        Ok(Order {
            id: self.id,
            workshop_id: self.workshop_id,
            order_number: self.order_number,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            bike_brand: self.bike_brand,
            bike_model: self.bike_model,
            bike_type: self.bike_type,
            description: self.description,
            status: parse_enum(&self.status).context("Failed to parse order status")?,
            source: parse_enum(&self.source).context("Failed to parse order source")?,
            tracking_code: self.tracking_code,
            assigned_to: self.assigned_to,
            estimated_price: self.estimated_price,
            final_price: self.final_price,
            due_date: self.due_date,
            checklist: parse_checklist(&self.checklist)?,
            control_checklist: parse_checklist(&self.control_checklist)?,
            end_control,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Public tracking codes: 12 uppercase hex characters.
fn new_tracking_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_uppercase()
}

fn check_price(field: &str, price: Option<f64>) -> Result<()> {
    if let Some(p) = price
        && (!p.is_finite() || p < 0.0)
    {
        return Err(ShopError::validation(field, "must be a non-negative amount").into());
    }
    Ok(())
}

impl ShopDb {
    pub fn create_order(&self, workshop_id: i64, order: &NewOrder, source: OrderSource) -> Result<Order> {
        self.require_workshop(workshop_id)?;
        if order.customer_name.trim().is_empty() {
            return Err(ShopError::validation("customer_name", "is required").into());
        }
        check_price("estimated_price", order.estimated_price)?;
        self.check_employee_ref(workshop_id, "assigned_to", order.assigned_to)?;
        let due_date = clean_due_date("due_date", order.due_date.as_deref())?;
        let items = checklist::normalize(&order.checklist).map_err(ShopError::from)?;
        let control_items = checklist::normalize(&order.control_checklist).map_err(ShopError::from)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let seq: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM orders WHERE workshop_id = ?1",
                params![workshop_id],
                |row| row.get(0),
            )
            .context("Failed to allocate order number")?;
        let order_number = format!("{}-{:04}", chrono::Utc::now().year(), seq);
        tx.execute(
            "INSERT INTO orders (workshop_id, seq, order_number, customer_name, customer_email,
                 customer_phone, bike_brand, bike_model, bike_type, description, source,
                 tracking_code, assigned_to, estimated_price, due_date, checklist, control_checklist)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                workshop_id,
                seq,
                order_number,
                order.customer_name.trim(),
                order.customer_email,
                order.customer_phone,
                order.bike_brand,
                order.bike_model,
                order.bike_type,
                order.description,
                source.as_str(),
                new_tracking_code(),
                order.assigned_to,
                order.estimated_price,
                due_date,
                encode_checklist(&items)?,
                encode_checklist(&control_items)?,
            ],
        )
        .context("Failed to insert order")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit order insert")?;
        tracing::info!(workshop_id, order_id = id, %order_number, source = source.as_str(), "Order created");
        self.require_order(workshop_id, id)
    }

    pub fn list_orders(&self, workshop_id: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE workshop_id = ?1 ORDER BY id",
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_orders")?;
        let rows = stmt
            .query_map(params![workshop_id], OrderRow::from_row)
            .context("Failed to query orders")?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.context("Failed to read order row")?.into_order()?);
        }
        Ok(orders)
    }

    pub fn get_order(&self, workshop_id: i64, id: i64) -> Result<Option<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE id = ?1 AND workshop_id = ?2",
            ORDER_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, workshop_id], OrderRow::from_row)
            .optional()
            .context("Failed to query order")?;
        row.map(OrderRow::into_order).transpose()
    }

    pub fn require_order(&self, workshop_id: i64, id: i64) -> Result<Order> {
        self.get_order(workshop_id, id)?
            .ok_or_else(|| ShopError::not_found("Order", id).into())
    }

    pub fn get_order_detail(&self, workshop_id: i64, id: i64) -> Result<OrderDetail> {
        let order = self.require_order(workshop_id, id)?;
        let assignee = match order.assigned_to {
            Some(eid) => self.get_employee(workshop_id, eid)?,
            None => None,
        };
        Ok(OrderDetail {
            progress: checklist::progress(&order.checklist),
            control_progress: checklist::progress(&order.control_checklist),
            assignee,
            order,
        })
    }

    /// Lookup for the public status page. Codes are matched case-insensitively.
    pub fn get_order_by_tracking_code(&self, workshop_id: i64, code: &str) -> Result<Option<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE tracking_code = ?1 AND workshop_id = ?2",
            ORDER_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![code.trim().to_uppercase(), workshop_id], OrderRow::from_row)
            .optional()
            .context("Failed to query order by tracking code")?;
        row.map(OrderRow::into_order).transpose()
    }

    pub fn update_order(&self, workshop_id: i64, id: i64, patch: &OrderPatch) -> Result<Order> {
        let current = self.require_order(workshop_id, id)?;
        let customer_name = patch
            .customer_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.customer_name);
        if customer_name.is_empty() {
            return Err(ShopError::validation("customer_name", "is required").into());
        }
        let estimated_price = merge_nullable(&patch.estimated_price, &current.estimated_price);
        let final_price = merge_nullable(&patch.final_price, &current.final_price);
        check_price("estimated_price", estimated_price)?;
        check_price("final_price", final_price)?;
        let assigned_to = merge_nullable(&patch.assigned_to, &current.assigned_to);
        self.check_employee_ref(workshop_id, "assigned_to", assigned_to)?;
        let due_date = clean_due_date(
            "due_date",
            merge_nullable(&patch.due_date, &current.due_date).as_deref(),
        )?;

        self.conn
            .execute(
                "UPDATE orders SET customer_name = ?1, customer_email = ?2, customer_phone = ?3,
                     bike_brand = ?4, bike_model = ?5, bike_type = ?6, description = ?7,
                     assigned_to = ?8, estimated_price = ?9, final_price = ?10, due_date = ?11,
                     updated_at = datetime('now')
                 WHERE id = ?12 AND workshop_id = ?13",
                params![
                    customer_name,
                    merge_nullable(&patch.customer_email, &current.customer_email),
                    merge_nullable(&patch.customer_phone, &current.customer_phone),
                    patch.bike_brand.as_ref().unwrap_or(&current.bike_brand),
                    patch.bike_model.as_ref().unwrap_or(&current.bike_model),
                    merge_nullable(&patch.bike_type, &current.bike_type),
                    patch.description.as_ref().unwrap_or(&current.description),
                    assigned_to,
                    estimated_price,
                    final_price,
                    due_date,
                    id,
                    workshop_id
                ],
            )
            .context("Failed to update order")?;
        self.require_order(workshop_id, id)
    }

    /// Move an order along its lifecycle. `completed` is only reachable
    /// through a passed end control.
    pub fn set_order_status(&self, workshop_id: i64, id: i64, status: OrderStatus) -> Result<Order> {
        let order = self.require_order(workshop_id, id)?;
        if !order.status.can_transition_to(status) {
            return Err(ShopError::InvalidTransition {
                from: order.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        if status == OrderStatus::Completed
            && order.status != OrderStatus::Completed
            && !order.end_control.as_ref().is_some_and(|c| c.passed)
        {
            return Err(ShopError::Conflict(
                "An order is completed by recording a passed end control".to_string(),
            )
            .into());
        }
        self.write_order_status(workshop_id, id, status)?;
        tracing::info!(workshop_id, order_id = id, from = %order.status, to = %status, "Order status changed");
        self.require_order(workshop_id, id)
    }

    fn write_order_status(&self, workshop_id: i64, id: i64, status: OrderStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE orders SET status = ?1, updated_at = datetime('now')
                 WHERE id = ?2 AND workshop_id = ?3",
                params![status.as_str(), id, workshop_id],
            )
            .context("Failed to update order status")?;
        Ok(())
    }

    /// Replace one of the order's checklists wholesale.
    pub fn save_order_checklist(
        &self,
        workshop_id: i64,
        id: i64,
        column: ChecklistColumn,
        items: &[ChecklistItem],
    ) -> Result<Order> {
        let items = checklist::normalize(items).map_err(ShopError::from)?;
        let sql = format!(
            "UPDATE orders SET {} = ?1, updated_at = datetime('now') WHERE id = ?2 AND workshop_id = ?3",
            column.column()
        );
        let changed = self
            .conn
            .execute(&sql, params![encode_checklist(&items)?, id, workshop_id])
            .context("Failed to save order checklist")?;
        if changed == 0 {
            return Err(ShopError::not_found("Order", id).into());
        }
        self.require_order(workshop_id, id)
    }

    /// Apply a single checklist edit and persist the whole array.
    pub fn apply_order_checklist_action(
        &self,
        workshop_id: i64,
        id: i64,
        column: ChecklistColumn,
        action: ChecklistAction,
    ) -> Result<Order> {
        let order = self.require_order(workshop_id, id)?;
        let mut items = match column {
            ChecklistColumn::Service => order.checklist,
            ChecklistColumn::Control => order.control_checklist,
        };
        checklist::apply(&mut items, action).map_err(ShopError::from)?;
        self.save_order_checklist(workshop_id, id, column, &items)
    }

    /// Record the quality-control review. Only orders in `in_control` can be
    /// reviewed, and a pass needs every control item completed or skipped.
    /// A pass completes the order; a failure sends it back to work.
    pub fn record_end_control(
        &self,
        workshop_id: i64,
        id: i64,
        reviewer_id: Option<i64>,
        reviewer_name: &str,
        passed: bool,
        notes: &str,
    ) -> Result<Order> {
        let order = self.require_order(workshop_id, id)?;
        let next = if passed {
            OrderStatus::Completed
        } else {
            OrderStatus::InProgress
        };
        if order.status != OrderStatus::InControl {
            return Err(ShopError::InvalidTransition {
                from: order.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        if passed {
            let progress = checklist::progress(&order.control_checklist);
            if !progress.finished {
                return Err(ShopError::ChecklistIncomplete {
                    remaining: progress.remaining,
                }
                .into());
            }
        }

        let reviewer_name = match reviewer_id {
            Some(eid) => {
                let employee = self
                    .get_employee(workshop_id, eid)?
                    .ok_or_else(|| ShopError::validation("reviewer_id", "unknown employee"))?;
                if reviewer_name.trim().is_empty() {
                    employee.name
                } else {
                    reviewer_name.trim().to_string()
                }
            }
            None => reviewer_name.trim().to_string(),
        };
        if reviewer_name.is_empty() {
            return Err(ShopError::validation("reviewer_name", "is required").into());
        }

        let control = EndControl {
            reviewer_id,
            reviewer_name,
            passed,
            notes: notes.trim().to_string(),
            checked_at: now_timestamp(),
        };
        let raw = serde_json::to_string(&control).context("Failed to encode end control")?;
        self.conn
            .execute(
                "UPDATE orders SET end_control = ?1, status = ?2, updated_at = datetime('now')
                 WHERE id = ?3 AND workshop_id = ?4",
                params![raw, next.as_str(), id, workshop_id],
            )
            .context("Failed to record end control")?;
        tracing::info!(workshop_id, order_id = id, passed, "End control recorded");
        self.require_order(workshop_id, id)
    }

    pub fn delete_order(&self, workshop_id: i64, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM orders WHERE id = ?1 AND workshop_id = ?2",
                params![id, workshop_id],
            )
            .context("Failed to delete order")?;
        Ok(count > 0)
    }
}
