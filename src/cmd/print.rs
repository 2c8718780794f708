//! Printable document commands (`shopfloor print-order` / `print-build`).

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use shopfloor::shop::db::ShopDb;
use shopfloor::shop::export::{self, ExportOptions};

pub enum PrintTarget {
    Order { workshop_id: i64, order_id: i64 },
    Build { workshop_id: i64, build_id: i64 },
}

impl PrintTarget {
    fn file_name(&self) -> String {
        match self {
            Self::Order { order_id, .. } => format!("shopfloor-order-{}.html", order_id),
            Self::Build { build_id, .. } => format!("shopfloor-build-{}.html", build_id),
        }
    }
}

fn render(db: &ShopDb, target: &PrintTarget, options: ExportOptions) -> Result<String> {
    match *target {
        PrintTarget::Order {
            workshop_id,
            order_id,
        } => {
            let workshop = db.require_workshop(workshop_id)?;
            let order = db.require_order(workshop_id, order_id)?;
            let branding = db.get_branding(workshop_id)?;
            Ok(export::render_work_order(&workshop, &order, &branding, options))
        }
        PrintTarget::Build {
            workshop_id,
            build_id,
        } => {
            let workshop = db.require_workshop(workshop_id)?;
            let build = db.require_build(workshop_id, build_id)?;
            let branding = db.get_branding(workshop_id)?;
            Ok(export::render_build_sheet(&workshop, &build, &branding, options))
        }
    }
}

/// Render a document from the database. Without `out` the HTML goes to
/// stdout, unless `open` is set, in which case it lands in the temp dir.
pub fn cmd_print(db_path: &Path, target: PrintTarget, out: Option<&Path>, open: bool) -> Result<()> {
    if !db_path.exists() {
        anyhow::bail!(
            "No database at {}. Run 'shopfloor init' first.",
            db_path.display()
        );
    }
    let db = ShopDb::new(db_path).context("Failed to open shop database")?;
    let html = render(&db, &target, ExportOptions { auto_print: open })?;

    let out: Option<PathBuf> = match (out, open) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, true) => Some(std::env::temp_dir().join(target.file_name())),
        (None, false) => None,
    };

    match out {
        Some(path) => {
            std::fs::write(&path, &html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", console::style("✓").green(), path.display());
            if open {
                open::that(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
            }
        }
        None => {
            std::io::stdout()
                .write_all(html.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
