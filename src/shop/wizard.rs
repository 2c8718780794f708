//! Order creation wizard and the public intake form.
//!
//! The dashboard walks staff through four steps before a single insert.
//! Each step only checks presence and shape of its own fields; the final
//! submit runs every step again.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::checklist::ChecklistItem;
use super::models::NewOrder;
use crate::errors::FieldError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Customer,
    Bike,
    Service,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [Self::Customer, Self::Bike, Self::Service, Self::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Bike => "bike",
            Self::Service => "service",
            Self::Review => "review",
        }
    }

    pub fn next(&self) -> Option<WizardStep> {
        match self {
            Self::Customer => Some(Self::Bike),
            Self::Bike => Some(Self::Service),
            Self::Service => Some(Self::Review),
            Self::Review => None,
        }
    }

    pub fn previous(&self) -> Option<WizardStep> {
        match self {
            Self::Customer => None,
            Self::Bike => Some(Self::Customer),
            Self::Service => Some(Self::Bike),
            Self::Review => Some(Self::Service),
        }
    }
}

impl FromStr for WizardStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "bike" => Ok(Self::Bike),
            "service" => Ok(Self::Service),
            "review" => Ok(Self::Review),
            _ => Err(format!("Invalid wizard step: {}", s)),
        }
    }
}

/// Everything the wizard collects. Prices arrive as the raw text typed into
/// the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderDraft {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub bike_brand: String,
    pub bike_model: String,
    pub bike_type: String,
    pub description: String,
    pub estimated_price: String,
    pub due_date: String,
    pub assigned_to: Option<i64>,
    pub template_id: Option<i64>,
    pub checklist: Vec<String>,
}

/// Parse a price typed by a person: `12.50`, `12,50` and ` 12 ` are all fine.
/// Empty input means "no price".
pub fn parse_price(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let normalized = trimmed.replace(',', ".");
    let value: f64 = normalized
        .parse()
        .map_err(|_| format!("'{}' is not a number", trimmed))?;
    if !value.is_finite() {
        return Err(format!("'{}' is not a number", trimmed));
    }
    if value < 0.0 {
        return Err("must not be negative".to_string());
    }
    Ok(Some(value))
}

fn optional(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn require(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "is required"));
    }
}

fn check_contact(errors: &mut Vec<FieldError>, email: &str, phone: &str) {
    let email = email.trim();
    let phone = phone.trim();
    if email.is_empty() && phone.is_empty() {
        errors.push(FieldError::new("customer_email", "email or phone is required"));
    }
    if !email.is_empty() && !EMAIL_RE.is_match(email) {
        errors.push(FieldError::new("customer_email", "is not a valid email address"));
    }
    if !phone.is_empty() && phone.chars().filter(|c| c.is_ascii_digit()).count() < 6 {
        errors.push(FieldError::new("customer_phone", "is not a valid phone number"));
    }
}

pub(crate) fn check_date(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let valid = DATE_RE.is_match(value)
        && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
    if !valid {
        errors.push(FieldError::new(field, "must be a date (YYYY-MM-DD)"));
    }
}

/// Validate the fields owned by one wizard step.
pub fn validate_step(step: WizardStep, draft: &OrderDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match step {
        WizardStep::Customer => {
            require(&mut errors, "customer_name", &draft.customer_name);
            check_contact(&mut errors, &draft.customer_email, &draft.customer_phone);
        }
        WizardStep::Bike => {
            require(&mut errors, "bike_brand", &draft.bike_brand);
            require(&mut errors, "bike_model", &draft.bike_model);
        }
        WizardStep::Service => {
            require(&mut errors, "description", &draft.description);
            if let Err(msg) = parse_price(&draft.estimated_price) {
                errors.push(FieldError::new("estimated_price", msg));
            }
            check_date(&mut errors, "due_date", &draft.due_date);
        }
        WizardStep::Review => {}
    }
    errors
}

pub fn validate_all(draft: &OrderDraft) -> Vec<FieldError> {
    WizardStep::ALL
        .iter()
        .flat_map(|step| validate_step(*step, draft))
        .collect()
}

/// Convert a draft into an insertable order. `template_items` seeds the
/// service checklist ahead of any ad-hoc lines typed into the draft.
pub fn into_new_order(
    draft: &OrderDraft,
    template_items: &[String],
    control_items: &[String],
) -> Result<NewOrder, Vec<FieldError>> {
    let errors = validate_all(draft);
    if !errors.is_empty() {
        return Err(errors);
    }
    let estimated_price = parse_price(&draft.estimated_price)
        .map_err(|msg| vec![FieldError::new("estimated_price", msg)])?;

    let mut checklist = super::checklist::from_texts(template_items);
    checklist.extend(super::checklist::from_texts(&draft.checklist));

    Ok(NewOrder {
        customer_name: draft.customer_name.trim().to_string(),
        customer_email: optional(&draft.customer_email),
        customer_phone: optional(&draft.customer_phone),
        bike_brand: draft.bike_brand.trim().to_string(),
        bike_model: draft.bike_model.trim().to_string(),
        bike_type: optional(&draft.bike_type),
        description: draft.description.trim().to_string(),
        assigned_to: draft.assigned_to,
        estimated_price,
        due_date: optional(&draft.due_date),
        checklist,
        control_checklist: super::checklist::from_texts(control_items),
    })
}

/// The unauthenticated self-service form customers fill in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub bike_brand: String,
    pub bike_model: String,
    pub bike_type: String,
    pub description: String,
    pub preferred_date: String,
}

impl IntakeForm {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        require(&mut errors, "name", &self.name);
        let before = errors.len();
        check_contact(&mut errors, &self.email, &self.phone);
        for e in errors.iter_mut().skip(before) {
            e.field = e.field.trim_start_matches("customer_").to_string();
        }
        require(&mut errors, "bike_brand", &self.bike_brand);
        require(&mut errors, "description", &self.description);
        if self.description.len() > 4000 {
            errors.push(FieldError::new("description", "is too long"));
        }
        check_date(&mut errors, "preferred_date", &self.preferred_date);
        errors
    }

    pub fn into_new_order(&self, checklist: Vec<ChecklistItem>) -> Result<NewOrder, Vec<FieldError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(NewOrder {
            customer_name: self.name.trim().to_string(),
            customer_email: optional(&self.email),
            customer_phone: optional(&self.phone),
            bike_brand: self.bike_brand.trim().to_string(),
            bike_model: self.bike_model.trim().to_string(),
            bike_type: optional(&self.bike_type),
            description: self.description.trim().to_string(),
            due_date: optional(&self.preferred_date),
            checklist,
            ..NewOrder::default()
        })
    }
}
