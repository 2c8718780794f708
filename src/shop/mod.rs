//! Shopfloor: workshop management back end for bicycle repair shops.
//!
//! ## Overview
//!
//! Every workshop (tenant) keeps its own repair orders, bike builds,
//! checklist templates, kanban tasks, notebook pages and customer feedback
//! in one SQLite database. Dashboards talk JSON over HTTP and receive change
//! events over a WebSocket; customers reach the workshop through a public
//! intake form and a tracking-code status page.
//!
//! ## Module Map
//!
//! ```text
//! ┌───────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │ Dashboard │ ───────> │  server.rs  (Router, ServerConfig)               │
//! │ / intake  │ <─────── │    ├─ middleware.rs  (request span, api key)     │
//! └───────────┘ WebSocket│    └─ api.rs  (route handlers, AppState)         │
//!                        │         │                                        │
//!                        │         │ wizard / checklist / listing / export  │
//!                        │         v                                        │
//!                        │  db/  (ShopDb, DbHandle, one file per table)     │
//!                        │         │                                        │
//!                        │         └─ ws.rs  (WsMessage broadcast)          │
//!                        └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | Shared types: `Order`, `BikeBuild`, `ShopTask`, ...     |
//! | `checklist` | Step-by-step checklist edits and progress               |
//! | `ordering`  | Drag-and-drop reorder helpers                           |
//! | `notebook`  | Page tree building and cycle detection                  |
//! | `wizard`    | Order wizard steps and the public intake form           |
//! | `listing`   | Filter/sort of order and build tables                   |
//! | `branding`  | Per-workshop colors, logo and print footer              |
//! | `export`    | Printable HTML work orders and build sheets             |
//!
//! ## Typical Request Flow (mechanic ticks off a checklist item)
//!
//! 1. `POST /api/workshops/{wid}/orders/{id}/checklist` with a
//!    `ChecklistAction` → `api::order_checklist_action()`
//! 2. `DbHandle::call` runs `ShopDb::apply_order_checklist_action` on the
//!    blocking pool; the order is loaded through its workshop, so another
//!    workshop's id is a 404.
//! 3. `checklist::apply` edits the item list and the whole list is written
//!    back in one statement.
//! 4. The updated order is broadcast as `WsMessage::OrderUpdated` and
//!    returned to the caller.

pub mod api;
pub mod branding;
pub mod checklist;
pub mod db;
pub mod export;
pub mod listing;
pub mod middleware;
pub mod models;
pub mod notebook;
pub mod ordering;
pub mod server;
pub mod wizard;
pub mod ws;
