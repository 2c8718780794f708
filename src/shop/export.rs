//! Printable work orders and build sheets.
//!
//! Documents are self-contained HTML pages styled with the workshop's
//! branding variables. Printing goes through the browser's own dialog.

use std::fmt::Write as _;

use super::branding::Branding;
use super::checklist::{ChecklistItem, progress};
use super::models::{BikeBuild, EndControl, Order, Workshop};

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Open the print dialog as soon as the page loads.
    pub auto_print: bool,
}

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const BASE_CSS: &str = "
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; color: var(--brand-text); margin: 2rem; }
header { display: flex; justify-content: space-between; align-items: center; border-bottom: 3px solid var(--brand-primary); padding-bottom: .5rem; }
header img { max-height: 60px; }
h1 { color: var(--brand-primary); margin: 0; }
h2 { border-left: 4px solid var(--brand-accent); padding-left: .5rem; font-size: 1.1rem; }
table { width: 100%; border-collapse: collapse; }
td, th { border: 1px solid #d0d7de; padding: .35rem .5rem; text-align: left; vertical-align: top; }
th { background: #f6f8fa; width: 30%; }
.state { width: 2.5rem; text-align: center; }
.warning { color: #b45309; font-weight: bold; }
.passed { color: #15803d; }
.failed { color: #b91c1c; }
footer { margin-top: 2rem; font-size: .8rem; color: #57606a; }
.signature { margin-top: 3rem; display: flex; gap: 4rem; }
.signature div { border-top: 1px solid #000; width: 14rem; padding-top: .25rem; }
@media print { body { margin: 0; } .no-print { display: none; } }
";

fn document_head(out: &mut String, title: &str, branding: &Branding) {
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", escape_html(title));
    out.push_str("<style>\n");
    out.push_str(&branding.css_variables());
    out.push_str(BASE_CSS);
    out.push_str("</style>\n</head>\n<body>\n");
}

fn document_header(out: &mut String, shop_name: &str, heading: &str, branding: &Branding) {
    out.push_str("<header>\n<div>\n");
    let _ = writeln!(out, "<h1>{}</h1>", escape_html(heading));
    let _ = writeln!(out, "<div>{}</div>", escape_html(shop_name));
    out.push_str("</div>\n");
    if let Some(logo) = &branding.logo_url {
        let _ = writeln!(out, "<img src=\"{}\" alt=\"logo\">", escape_html(logo));
    }
    out.push_str("</header>\n");
}

fn row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<tr><th>{}</th><td>{}</td></tr>",
        escape_html(label),
        escape_html(value)
    );
}

fn checklist_section(out: &mut String, title: &str, items: &[ChecklistItem]) {
    if items.is_empty() {
        return;
    }
    let p = progress(items);
    let _ = writeln!(
        out,
        "<h2>{} ({}/{})</h2>",
        escape_html(title),
        p.completed + p.skipped,
        p.total
    );
    out.push_str("<table>\n");
    for item in items {
        let state = if item.completed {
            "&#10003;"
        } else if item.skipped {
            "&ndash;"
        } else {
            "&#9744;"
        };
        let warning = if item.warning {
            " <span class=\"warning\">&#9888;</span>"
        } else {
            ""
        };
        let notes = item
            .notes
            .as_deref()
            .map(|n| format!("<br><small>{}</small>", escape_html(n)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "<tr><td class=\"state\">{}</td><td>{}{}{}</td></tr>",
            state,
            escape_html(&item.text),
            warning,
            notes
        );
    }
    out.push_str("</table>\n");
}

fn end_control_section(out: &mut String, control: &EndControl) {
    out.push_str("<h2>End control</h2>\n<table>\n");
    let result = if control.passed {
        "<span class=\"passed\">Passed</span>"
    } else {
        "<span class=\"failed\">Failed</span>"
    };
    let _ = writeln!(out, "<tr><th>Result</th><td>{}</td></tr>", result);
    row(out, "Reviewer", &control.reviewer_name);
    row(out, "Checked at", &control.checked_at);
    if !control.notes.is_empty() {
        row(out, "Notes", &control.notes);
    }
    out.push_str("</table>\n");
}

fn document_footer(out: &mut String, branding: &Branding, options: ExportOptions) {
    out.push_str("<div class=\"signature\"><div>Mechanic</div><div>Customer</div></div>\n");
    if let Some(footer) = &branding.footer_text {
        let _ = writeln!(out, "<footer>{}</footer>", escape_html(footer));
    }
    if options.auto_print {
        out.push_str("<script>window.addEventListener('load', () => window.print());</script>\n");
    }
    out.push_str("</body>\n</html>\n");
}

fn format_price(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

pub fn render_work_order(
    workshop: &Workshop,
    order: &Order,
    branding: &Branding,
    options: ExportOptions,
) -> String {
    let shop_name = branding.display_name(&workshop.name);
    let title = format!("Work order {}", order.order_number);
    let mut out = String::with_capacity(8 * 1024);

    document_head(&mut out, &title, branding);
    document_header(&mut out, shop_name, &title, branding);

    out.push_str("<h2>Customer</h2>\n<table>\n");
    row(&mut out, "Name", &order.customer_name);
    row(&mut out, "Email", order.customer_email.as_deref().unwrap_or(""));
    row(&mut out, "Phone", order.customer_phone.as_deref().unwrap_or(""));
    out.push_str("</table>\n");

    out.push_str("<h2>Bike</h2>\n<table>\n");
    row(&mut out, "Brand", &order.bike_brand);
    row(&mut out, "Model", &order.bike_model);
    if let Some(kind) = &order.bike_type {
        row(&mut out, "Type", kind);
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Job</h2>\n<table>\n");
    row(&mut out, "Status", order.status.as_str());
    row(&mut out, "Received", &order.created_at);
    row(&mut out, "Due", order.due_date.as_deref().unwrap_or(""));
    row(&mut out, "Description", &order.description);
    row(&mut out, "Estimate", &format_price(order.estimated_price));
    if order.final_price.is_some() {
        row(&mut out, "Final price", &format_price(order.final_price));
    }
    row(&mut out, "Tracking code", &order.tracking_code);
    out.push_str("</table>\n");

    checklist_section(&mut out, "Service checklist", &order.checklist);
    checklist_section(&mut out, "Control checklist", &order.control_checklist);
    if let Some(control) = &order.end_control {
        end_control_section(&mut out, control);
    }

    document_footer(&mut out, branding, options);
    out
}

pub fn render_build_sheet(
    workshop: &Workshop,
    build: &BikeBuild,
    branding: &Branding,
    options: ExportOptions,
) -> String {
    let shop_name = branding.display_name(&workshop.name);
    let title = format!("Build sheet #{} - {} {}", build.id, build.brand, build.model);
    let mut out = String::with_capacity(8 * 1024);

    document_head(&mut out, &title, branding);
    document_header(&mut out, shop_name, &title, branding);

    out.push_str("<h2>Bike</h2>\n<table>\n");
    row(&mut out, "Customer", build.customer_name.as_deref().unwrap_or(""));
    row(&mut out, "Brand", &build.brand);
    row(&mut out, "Model", &build.model);
    row(&mut out, "Frame size", build.frame_size.as_deref().unwrap_or(""));
    row(&mut out, "Color", build.color.as_deref().unwrap_or(""));
    row(&mut out, "Frame number", build.frame_number.as_deref().unwrap_or(""));
    row(&mut out, "Status", build.status.as_str());
    row(&mut out, "Due", build.due_date.as_deref().unwrap_or(""));
    if !build.notes.is_empty() {
        row(&mut out, "Notes", &build.notes);
    }
    out.push_str("</table>\n");

    checklist_section(&mut out, "Assembly checklist", &build.checklist);
    checklist_section(&mut out, "Control checklist", &build.control_checklist);

    document_footer(&mut out, branding, options);
    out
}
