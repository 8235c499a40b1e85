//! Configuration management command
//!
//! Provides CLI interface to view and edit the vault's sync configuration.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::vault::Vault;

pub async fn run(
    _list: bool,
    get: Option<String>,
    set: Option<Vec<String>>,
    path: bool,
) -> Result<()> {
    if let Some(pair) = set {
        run_set(&pair[0], &pair[1]).await
    } else if let Some(key) = get {
        run_get(&key).await
    } else if path {
        run_path().await
    } else {
        // Plain `vellum config` behaves as --list
        run_list().await
    }
}

/// List all configuration values
async fn run_list() -> Result<()> {
    let vault = Vault::find()?;
    let config = vault.load_config()?;

    println!("{}", "Vault Configuration".bold());
    println!(
        "{}: {}\n",
        "Location".dimmed(),
        vault.config_path().display().dimmed()
    );

    println!("{}", "[sync]".yellow());
    println!(
        "  {} = {} {}",
        "write_debounce_ms".cyan(),
        config.write_debounce_ms,
        secs(config.write_debounce_ms).dimmed()
    );
    println!(
        "  {} = {}",
        "watch_debounce_ms".cyan(),
        config.watch_debounce_ms
    );
    println!("  {} = {}", "settle_poll_ms".cyan(), config.settle_poll_ms);
    println!(
        "  {} = {}",
        "settle_window_ms".cyan(),
        config.settle_window_ms
    );
    println!(
        "  {} = {} {}",
        "expectation_ttl_ms".cyan(),
        config.expectation_ttl_ms,
        secs(config.expectation_ttl_ms).dimmed()
    );
    println!(
        "  {} = {}",
        "write_flag_linger_ms".cyan(),
        config.write_flag_linger_ms
    );
    println!(
        "  {} = {} {}",
        "rename_window_ms".cyan(),
        config.rename_window_ms,
        secs(config.rename_window_ms).dimmed()
    );
    println!(
        "  {} = {}",
        "detect_conflicts".cyan(),
        config.detect_conflicts
    );

    println!("\n{}", "[ignore]".yellow());
    println!(
        "  {} = {}",
        "ignore.use_gitignore".cyan(),
        config.ignore.use_gitignore
    );
    println!(
        "  {} = {}",
        "ignore.use_vault_ignore".cyan(),
        config.ignore.use_vault_ignore
    );
    println!(
        "  {} = {}",
        "ignore.additional_patterns".cyan(),
        if config.ignore.additional_patterns.is_empty() {
            "(none)".to_string()
        } else {
            config.ignore.additional_patterns.join(",")
        }
    );

    println!("\n{}", "Valid Ranges:".bold());
    println!("  write_debounce_ms: 0-60000 (0 = flush immediately)");
    println!("  watch_debounce_ms: 10-10000");
    println!("  settle_poll_ms: 10-5000");
    println!("  settle_window_ms: 0-10000");
    println!("  expectation_ttl_ms: 1000-600000");
    println!("  write_flag_linger_ms: 100-60000");
    println!("  rename_window_ms: 100-10000");

    Ok(())
}

/// Get a single configuration value
async fn run_get(key: &str) -> Result<()> {
    let vault = Vault::find()?;
    let config = vault.load_config()?;

    let value = match key {
        "write_debounce_ms" => config.write_debounce_ms.to_string(),
        "watch_debounce_ms" => config.watch_debounce_ms.to_string(),
        "settle_poll_ms" => config.settle_poll_ms.to_string(),
        "settle_window_ms" => config.settle_window_ms.to_string(),
        "expectation_ttl_ms" => config.expectation_ttl_ms.to_string(),
        "write_flag_linger_ms" => config.write_flag_linger_ms.to_string(),
        "rename_window_ms" => config.rename_window_ms.to_string(),
        "detect_conflicts" => config.detect_conflicts.to_string(),
        "ignore.use_gitignore" => config.ignore.use_gitignore.to_string(),
        "ignore.use_vault_ignore" => config.ignore.use_vault_ignore.to_string(),
        "ignore.additional_patterns" => config.ignore.additional_patterns.join(","),
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'vellum config --list' to see available keys.",
            key
        ),
    };

    println!("{}", value);
    Ok(())
}

/// Set a configuration value
async fn run_set(key: &str, value: &str) -> Result<()> {
    let vault = Vault::find()?;
    let mut config = vault.load_config()?;

    match key {
        "write_debounce_ms" => {
            config.write_debounce_ms = parse_ms(value)?;
        }
        "watch_debounce_ms" => {
            config.watch_debounce_ms = parse_ms(value)?;
        }
        "settle_poll_ms" => {
            config.settle_poll_ms = parse_ms(value)?;
        }
        "settle_window_ms" => {
            config.settle_window_ms = parse_ms(value)?;
        }
        "expectation_ttl_ms" => {
            config.expectation_ttl_ms = parse_ms(value)?;
        }
        "write_flag_linger_ms" => {
            config.write_flag_linger_ms = parse_ms(value)?;
        }
        "rename_window_ms" => {
            config.rename_window_ms = parse_ms(value)?;
        }
        "detect_conflicts" => {
            config.detect_conflicts = parse_bool(value)?;
        }
        "ignore.use_gitignore" => {
            config.ignore.use_gitignore = parse_bool(value)?;
        }
        "ignore.use_vault_ignore" => {
            config.ignore.use_vault_ignore = parse_bool(value)?;
        }
        "ignore.additional_patterns" => {
            config.ignore.additional_patterns = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'vellum config --list' to see available keys.",
            key
        ),
    }

    // Validate before saving
    config.validate().context("Invalid configuration value")?;

    vault.save_config(&config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    println!(
        "{}",
        "Note: Restart the watcher for changes to take effect".yellow()
    );

    Ok(())
}

/// Show the config file path
async fn run_path() -> Result<()> {
    let vault = Vault::find()?;
    let path = vault.config_path();

    println!("{}", path.display());
    if !path.exists() {
        println!("{}", "File does not exist; defaults are in effect.".yellow());
    }
    Ok(())
}

fn parse_ms(value: &str) -> Result<u64> {
    value
        .parse()
        .context("Invalid value: must be a non-negative integer of milliseconds")
}

fn parse_bool(value: &str) -> Result<bool> {
    value.parse().context("Invalid value: must be 'true' or 'false'")
}

fn secs(ms: u64) -> String {
    format!("({}s)", ms as f64 / 1000.0)
}
