//! Per-workshop branding used by the dashboard theme and printed documents.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::FieldError;

static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid color regex")
});

/// Settings key under which a workshop's branding JSON is stored.
pub fn settings_key(workshop_id: i64) -> String {
    format!("branding:{}", workshop_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub shop_name: String,
    pub primary_color: String,
    pub accent_color: String,
    pub text_color: String,
    pub logo_url: Option<String>,
    pub footer_text: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            shop_name: String::new(),
            primary_color: "#1f6feb".to_string(),
            accent_color: "#f59e0b".to_string(),
            text_color: "#1f2328".to_string(),
            logo_url: None,
            footer_text: None,
        }
    }
}

impl Branding {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("primary_color", &self.primary_color),
            ("accent_color", &self.accent_color),
            ("text_color", &self.text_color),
        ] {
            if !HEX_COLOR_RE.is_match(value) {
                errors.push(FieldError::new(field, "must be a hex color like #1f6feb"));
            }
        }
        if let Some(url) = &self.logo_url
            && !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with("data:image/"))
        {
            errors.push(FieldError::new("logo_url", "must be an http(s) or data:image URL"));
        }
        if self.shop_name.len() > 120 {
            errors.push(FieldError::new("shop_name", "is too long"));
        }
        errors
    }

    /// The name printed on documents, falling back to the workshop's own.
    pub fn display_name<'a>(&'a self, workshop_name: &'a str) -> &'a str {
        if self.shop_name.trim().is_empty() {
            workshop_name
        } else {
            self.shop_name.trim()
        }
    }

    /// `:root` block exposing the palette as CSS custom properties.
    /// Colors are validated on save, so they can be interpolated directly.
    pub fn css_variables(&self) -> String {
        format!(
            ":root {{\n  --brand-primary: {};\n  --brand-accent: {};\n  --brand-text: {};\n}}\n",
            self.primary_color, self.accent_color, self.text_color
        )
    }
}
