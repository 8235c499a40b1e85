//! Initialize a vault

use anyhow::Result;
use std::path::PathBuf;

use crate::vault::Vault;

pub async fn run(path: Option<PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let target = match path {
        Some(p) if p.is_absolute() => p,
        Some(p) => cwd.join(p),
        None => cwd,
    };
    std::fs::create_dir_all(&target)?;

    println!("Initializing vault at {}", target.display());

    match Vault::init(&target) {
        Ok(_) => {
            println!("Vault initialized");
            println!();
            println!("Created .vellum/ directory structure:");
            println!("  - .vellum/config.toml   (sync configuration)");
            println!("  - .vellum/index.sqlite  (note index)");
            println!("  - .vellum/logs/         (watcher logs)");
            println!("  - .vellum/locks/        (watcher exclusivity)");
            println!();
            println!("Next steps:");
            println!("  - Run 'vellum new <title>' to create your first note");
            println!("  - Run 'vellum watch' to keep the index live");
            Ok(())
        }
        Err(e) => {
            if e.to_string().contains("already initialized") {
                println!("Error: vault already initialized");
                println!("Location: {}/{}", target.display(), vellum_core::VAULT_DIR);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
