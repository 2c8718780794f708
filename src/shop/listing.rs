//! Filtering and sorting for the order and build tables.

use std::cmp::Ordering;

use serde::Deserialize;

use super::models::{BikeBuild, BuildStatus, Order, OrderStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    CreatedAt,
    DueDate,
    Customer,
    Status,
    OrderNumber,
}

/// Query string accepted by the order list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub assigned_to: Option<i64>,
    /// Hide picked-up and cancelled orders.
    pub active_only: bool,
    pub sort: OrderSort,
    pub dir: SortDir,
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn search_needle(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Missing due dates sort after present ones regardless of direction.
fn cmp_due(a: &Option<String>, b: &Option<String>, dir: SortDir) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => apply_dir(a.cmp(b), dir),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn apply_dir(ord: Ordering, dir: SortDir) -> Ordering {
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if self.active_only && order.status.is_terminal() {
            return false;
        }
        if let Some(assignee) = self.assigned_to
            && order.assigned_to != Some(assignee)
        {
            return false;
        }
        match search_needle(&self.search) {
            None => true,
            Some(needle) => {
                contains_ci(&order.order_number, &needle)
                    || contains_ci(&order.customer_name, &needle)
                    || order.customer_email.as_deref().is_some_and(|e| contains_ci(e, &needle))
                    || order.customer_phone.as_deref().is_some_and(|p| contains_ci(p, &needle))
                    || contains_ci(&order.bike_brand, &needle)
                    || contains_ci(&order.bike_model, &needle)
            }
        }
    }

    fn compare(&self, a: &Order, b: &Order) -> Ordering {
        let primary = match self.sort {
            OrderSort::CreatedAt => apply_dir(a.created_at.cmp(&b.created_at), self.dir),
            OrderSort::DueDate => cmp_due(&a.due_date, &b.due_date, self.dir),
            OrderSort::Customer => apply_dir(
                a.customer_name.to_lowercase().cmp(&b.customer_name.to_lowercase()),
                self.dir,
            ),
            OrderSort::Status => apply_dir(status_rank(a.status).cmp(&status_rank(b.status)), self.dir),
            OrderSort::OrderNumber => apply_dir(a.order_number.cmp(&b.order_number), self.dir),
        };
        // Ties fall back to id so the table never reshuffles between refreshes.
        primary.then_with(|| apply_dir(a.id.cmp(&b.id), self.dir))
    }

    pub fn apply(&self, orders: Vec<Order>) -> Vec<Order> {
        let mut out: Vec<Order> = orders.into_iter().filter(|o| self.matches(o)).collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}

fn status_rank(status: OrderStatus) -> usize {
    OrderStatus::ALL
        .iter()
        .position(|s| *s == status)
        .unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSort {
    #[default]
    CreatedAt,
    DueDate,
    Brand,
    Status,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildQuery {
    pub status: Option<BuildStatus>,
    pub search: Option<String>,
    pub mechanic_id: Option<i64>,
    pub sort: BuildSort,
    pub dir: SortDir,
}

impl BuildQuery {
    pub fn matches(&self, build: &BikeBuild) -> bool {
        if let Some(status) = self.status
            && build.status != status
        {
            return false;
        }
        if let Some(mechanic) = self.mechanic_id
            && build.mechanic_id != Some(mechanic)
        {
            return false;
        }
        match search_needle(&self.search) {
            None => true,
            Some(needle) => {
                contains_ci(&build.brand, &needle)
                    || contains_ci(&build.model, &needle)
                    || build.customer_name.as_deref().is_some_and(|c| contains_ci(c, &needle))
                    || build.frame_number.as_deref().is_some_and(|f| contains_ci(f, &needle))
            }
        }
    }

    fn compare(&self, a: &BikeBuild, b: &BikeBuild) -> Ordering {
        let primary = match self.sort {
            BuildSort::CreatedAt => apply_dir(a.created_at.cmp(&b.created_at), self.dir),
            BuildSort::DueDate => cmp_due(&a.due_date, &b.due_date, self.dir),
            BuildSort::Brand => apply_dir(
                (a.brand.to_lowercase(), a.model.to_lowercase())
                    .cmp(&(b.brand.to_lowercase(), b.model.to_lowercase())),
                self.dir,
            ),
            BuildSort::Status => apply_dir((a.status as u8).cmp(&(b.status as u8)), self.dir),
        };
        primary.then_with(|| apply_dir(a.id.cmp(&b.id), self.dir))
    }

    pub fn apply(&self, builds: Vec<BikeBuild>) -> Vec<BikeBuild> {
        let mut out: Vec<BikeBuild> = builds.into_iter().filter(|b| self.matches(b)).collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}
