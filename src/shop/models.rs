use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::checklist::{ChecklistItem, ChecklistProgress};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workshop {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Mechanic,
    Manager,
    Admin,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mechanic => "mechanic",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for EmployeeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mechanic" => Ok(Self::Mechanic),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid employee role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub workshop_id: i64,
    pub name: String,
    pub role: EmployeeRole,
    pub email: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub role: Option<EmployeeRole>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

// ── Orders ───────────────────────────────────────────────────────────

/// Lifecycle of a repair order.
///
/// ```text
/// new ─► in_progress ◄─► waiting_for_parts
///             │  ▲
///             ▼  │ (failed end control)
///         in_control ─► completed ─► picked_up
/// ```
///
/// Every non-terminal status may also go to `cancelled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    InProgress,
    WaitingForParts,
    InControl,
    Completed,
    PickedUp,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::New,
        Self::InProgress,
        Self::WaitingForParts,
        Self::InControl,
        Self::Completed,
        Self::PickedUp,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::WaitingForParts => "waiting_for_parts",
            Self::InControl => "in_control",
            Self::Completed => "completed",
            Self::PickedUp => "picked_up",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PickedUp | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (New, InProgress)
                | (InProgress, WaitingForParts)
                | (WaitingForParts, InProgress)
                | (InProgress, InControl)
                | (InControl, InProgress)
                | (InControl, Completed)
                | (Completed, PickedUp)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "waiting_for_parts" => Ok(Self::WaitingForParts),
            "in_control" => Ok(Self::InControl),
            "completed" => Ok(Self::Completed),
            "picked_up" => Ok(Self::PickedUp),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// Where an order came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Staff,
    Intake,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Intake => "intake",
        }
    }
}

impl FromStr for OrderSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Self::Staff),
            "intake" => Ok(Self::Intake),
            _ => Err(format!("Invalid order source: {}", s)),
        }
    }
}

/// Quality-control review recorded against an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndControl {
    pub reviewer_id: Option<i64>,
    pub reviewer_name: String,
    pub passed: bool,
    #[serde(default)]
    pub notes: String,
    pub checked_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub workshop_id: i64,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub bike_brand: String,
    pub bike_model: String,
    pub bike_type: Option<String>,
    pub description: String,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub tracking_code: String,
    pub assigned_to: Option<i64>,
    pub estimated_price: Option<f64>,
    pub final_price: Option<f64>,
    pub due_date: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub control_checklist: Vec<ChecklistItem>,
    pub end_control: Option<EndControl>,
    pub created_at: String,
    pub updated_at: String,
}

/// Validated input for inserting an order.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub bike_brand: String,
    pub bike_model: String,
    pub bike_type: Option<String>,
    pub description: String,
    pub assigned_to: Option<i64>,
    pub estimated_price: Option<f64>,
    pub due_date: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub control_checklist: Vec<ChecklistItem>,
}

/// Partial update of an order's editable fields. `None` leaves a field as is.
/// An order together with its checklist progress, as shown on the detail page.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub progress: ChecklistProgress,
    pub control_progress: ChecklistProgress,
    pub assignee: Option<Employee>,
}

/// PATCH field that can be cleared: a missing key leaves the stored value
/// alone (`None`), an explicit `null` clears it (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub customer_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub customer_phone: Option<Option<String>>,
    pub bike_brand: Option<String>,
    pub bike_model: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub bike_type: Option<Option<String>>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub estimated_price: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub final_price: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
}

// ── Bike builds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Planned,
    Assembling,
    InControl,
    Done,
    Delivered,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Assembling => "assembling",
            Self::InControl => "in_control",
            Self::Done => "done",
            Self::Delivered => "delivered",
        }
    }

    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Planned, Assembling)
                    | (Assembling, InControl)
                    | (InControl, Assembling)
                    | (InControl, Done)
                    | (Done, Delivered)
            )
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "assembling" => Ok(Self::Assembling),
            "in_control" => Ok(Self::InControl),
            "done" => Ok(Self::Done),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("Invalid build status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BikeBuild {
    pub id: i64,
    pub workshop_id: i64,
    pub customer_name: Option<String>,
    pub brand: String,
    pub model: String,
    pub frame_size: Option<String>,
    pub color: Option<String>,
    pub frame_number: Option<String>,
    pub status: BuildStatus,
    pub mechanic_id: Option<i64>,
    pub due_date: Option<String>,
    pub notes: String,
    pub checklist: Vec<ChecklistItem>,
    pub control_checklist: Vec<ChecklistItem>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBuild {
    pub customer_name: Option<String>,
    pub brand: String,
    pub model: String,
    pub frame_size: Option<String>,
    pub color: Option<String>,
    pub frame_number: Option<String>,
    pub mechanic_id: Option<i64>,
    pub due_date: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub control_checklist: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub customer_name: Option<Option<String>>,
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub frame_size: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub frame_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub mechanic_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
    pub notes: Option<String>,
}

// ── Checklist templates ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Service,
    Control,
    Build,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Control => "control",
            Self::Build => "build",
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(Self::Service),
            "control" => Ok(Self::Control),
            "build" => Ok(Self::Build),
            _ => Err(format!("Invalid template kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub id: i64,
    pub workshop_id: i64,
    pub name: String,
    pub kind: TemplateKind,
    pub items: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub kind: Option<TemplateKind>,
    pub items: Option<Vec<String>>,
}

// ── Shop tasks (kanban) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskColumn {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskColumn {
    pub const ORDER: [TaskColumn; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl FromStr for TaskColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid column: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopTask {
    pub id: i64,
    pub workshop_id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskColumn,
    pub priority: Priority,
    pub position: i32,
    pub assignee_id: Option<i64>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskColumn,
    #[serde(default)]
    pub priority: Priority,
    pub assignee_id: Option<i64>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBoard {
    pub workshop_id: i64,
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardColumn {
    pub name: TaskColumn,
    pub tasks: Vec<ShopTask>,
}

// ── Notebook ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookPage {
    pub id: i64,
    pub workshop_id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub is_folder: bool,
    pub position: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPage {
    pub parent_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_folder: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// A page with its children, as rendered in the notebook sidebar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookNode {
    #[serde(flatten)]
    pub page: NotebookPage,
    pub children: Vec<NotebookNode>,
}

// ── Feedback ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Praise,
    Complaint,
    Suggestion,
    Bug,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Praise => "praise",
            Self::Complaint => "complaint",
            Self::Suggestion => "suggestion",
            Self::Bug => "bug",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "praise" => Ok(Self::Praise),
            "complaint" => Ok(Self::Complaint),
            "suggestion" => Ok(Self::Suggestion),
            "bug" => Ok(Self::Bug),
            _ => Err(format!("Invalid feedback kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for FeedbackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Invalid feedback status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub workshop_id: i64,
    pub order_id: Option<i64>,
    pub kind: FeedbackKind,
    pub rating: Option<u8>,
    pub message: String,
    pub status: FeedbackStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub order_id: Option<i64>,
    pub kind: FeedbackKind,
    pub rating: Option<u8>,
    pub message: String,
}

/// Aggregates shown on the feedback dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackSummary {
    pub total: usize,
    pub open: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_kind: Vec<KindCount>,
    pub average_rating: Option<f64>,
    pub controls_recorded: usize,
    pub control_pass_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KindCount {
    pub kind: FeedbackKind,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_roundtrip() {
        for status in OrderStatus::ALL {
            let parsed: OrderStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("invalid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_happy_path_transitions() {
        use OrderStatus::*;
        let path = [New, InProgress, InControl, Completed, PickedUp];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_order_status_rejects_skips_and_terminal_moves() {
        use OrderStatus::*;
        assert!(!New.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Completed));
        assert!(!PickedUp.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(New));
        assert!(!PickedUp.can_transition_to(Cancelled));
    }

    #[test]
    fn test_order_status_cancel_from_any_open_status() {
        for status in OrderStatus::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn test_failed_control_returns_to_work() {
        assert!(OrderStatus::InControl.can_transition_to(OrderStatus::InProgress));
        assert!(BuildStatus::InControl.can_transition_to(BuildStatus::Assembling));
    }

    #[test]
    fn test_build_status_transitions() {
        use BuildStatus::*;
        assert!(Planned.can_transition_to(Assembling));
        assert!(Done.can_transition_to(Delivered));
        assert!(!Planned.can_transition_to(Done));
        assert!(!Delivered.can_transition_to(Planned));
    }

    #[test]
    fn test_serde_produces_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::WaitingForParts).unwrap(),
            "\"waiting_for_parts\""
        );
        assert_eq!(
            serde_json::to_string(&TaskColumn::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::from_str::<FeedbackKind>("\"complaint\"").unwrap(),
            FeedbackKind::Complaint
        );
    }

    #[test]
    fn test_small_enums_roundtrip() {
        for s in &["mechanic", "manager", "admin"] {
            assert_eq!(s.parse::<EmployeeRole>().unwrap().as_str(), *s);
        }
        for s in &["service", "control", "build"] {
            assert_eq!(s.parse::<TemplateKind>().unwrap().as_str(), *s);
        }
        for s in &["low", "medium", "high", "urgent"] {
            assert_eq!(s.parse::<Priority>().unwrap().as_str(), *s);
        }
        for s in &["open", "acknowledged", "resolved"] {
            assert_eq!(s.parse::<FeedbackStatus>().unwrap().as_str(), *s);
        }
        assert!("critical".parse::<Priority>().is_err());
    }
}
