//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled             |
//! |----------|------------------------------|
//! | `serve`  | `Serve`                      |
//! | `init`   | `Init`                       |
//! | `config` | `Config`                     |
//! | `print`  | `PrintOrder`, `PrintBuild`   |

pub mod config;
pub mod init;
pub mod print;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use print::{PrintTarget, cmd_print};
pub use serve::{ServeOverrides, cmd_serve};
