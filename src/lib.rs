pub mod config;
pub mod errors;
pub mod shop;
pub mod telemetry;
