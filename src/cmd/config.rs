//! Configuration view and validation commands (`shopfloor config`).

use anyhow::Result;
use std::path::Path;

use shopfloor::config::ShopConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Shopfloor Configuration").bold().cyan());
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No shopfloor.toml found at {}", config_path.display());
                println!("Using defaults. Run 'shopfloor config init' to create one.");
            }
            println!();

            let mut config = ShopConfig::load_or_default(config_path)?;
            config.apply_env()?;

            println!("Effective values (with env overrides):");
            println!();
            let mut shown = config.clone();
            if !shown.auth.api_keys.is_empty() {
                shown.auth.api_keys = vec!["********".to_string(); shown.auth.api_keys.len()];
            }
            print!("{}", toml::to_string_pretty(&shown)?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No shopfloor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = ShopConfig::load(config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("{}", console::style("Configuration is valid.").green());
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("shopfloor.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            ShopConfig::default().save(config_path)?;

            println!("Created shopfloor.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev_mode");
            println!("  - [database] path");
            println!("  - [logging] level, format, directory");
            println!("  - [auth] api_keys");
            println!("  - [intake] enabled, default_template");
            println!();
        }
    }

    Ok(())
}
