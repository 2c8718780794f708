//! Database bootstrap command (`shopfloor init`).

use anyhow::{Context, Result};
use std::path::Path;

use shopfloor::errors::ShopError;
use shopfloor::shop::db::{ShopDb, slugify};
use shopfloor::shop::models::TemplateKind;

const SERVICE_TEMPLATE: (&str, &[&str]) = (
    "Standard service",
    &[
        "Check tyre pressure and wear",
        "Inspect and adjust brakes",
        "Clean and lube chain",
        "Index gears",
        "Check headset and bottom bracket play",
        "Tighten all bolts to torque",
    ],
);

const CONTROL_TEMPLATE: (&str, &[&str]) = (
    "End control",
    &[
        "Brakes stop the bike safely",
        "Gears shift cleanly across the range",
        "Wheels are true and secured",
        "Test ride",
    ],
);

pub fn cmd_init(db_path: &Path, workshop: Option<&str>) -> Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = ShopDb::new(db_path).context("Failed to initialize shop database")?;
    println!("Shop database initialized at {}", db_path.display());

    let Some(name) = workshop else {
        return Ok(());
    };
    if let Some(existing) = db.get_workshop_by_slug(&slugify(name))? {
        println!(
            "{} Workshop '{}' already exists (id {})",
            console::style("!").yellow(),
            existing.name,
            existing.id
        );
        return Ok(());
    }

    let created = db.create_workshop(name, None)?;
    for (template, kind) in [
        (SERVICE_TEMPLATE, TemplateKind::Service),
        (CONTROL_TEMPLATE, TemplateKind::Control),
    ] {
        let items: Vec<String> = template.1.iter().map(|s| s.to_string()).collect();
        match db.create_template(created.id, template.0, kind, &items) {
            Ok(_) => {}
            Err(e) if matches!(e.downcast_ref::<ShopError>(), Some(ShopError::Conflict(_))) => {}
            Err(e) => return Err(e),
        }
    }
    tracing::info!(workshop_id = created.id, slug = %created.slug, "Workshop seeded");

    println!(
        "{} Created workshop '{}' (id {}, intake at /intake/{})",
        console::style("✓").green(),
        created.name,
        created.id,
        created.slug
    );
    Ok(())
}
