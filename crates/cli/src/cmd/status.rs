//! Show vault and watcher status

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::locks::VaultLock;
use crate::util;
use crate::vault::Vault;

pub async fn run() -> Result<()> {
    // 1. Find the vault
    let vault = Vault::find().context("Failed to find vault")?;

    // 2. Watcher liveness via the lock file
    let holder = VaultLock::holder(&vault.internal_dir())?;

    // 3. Index stats
    let index = vault.open_index()?;
    let note_count = index.note_count()?;
    let mut notes = index.list_notes()?;
    notes.sort_by_key(|n| std::cmp::Reverse(n.modified_at));

    // 4. Internal directory size
    let internal_size = util::calculate_dir_size(&vault.internal_dir())?;

    // 5. Display output
    println!("{}", "Vault Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Vault:         {}", vault.root().display().to_string().cyan());
    println!();

    print!("Watcher:       ");
    let watcher_running = holder.is_some();
    match holder {
        Some(lock) => {
            println!("{}", "Running ✓".green());
            println!("  PID:         {}", lock.pid);
            println!(
                "  Since:       {} ({})",
                util::format_relative_time(lock.started_at),
                util::format_absolute_time(lock.started_at).dimmed()
            );
        }
        None => {
            println!("{}", "Not running".yellow());
            println!("  {}", "Tip: Start with 'vellum watch'".dimmed());
        }
    }
    println!();

    println!("Index:");
    println!("  Notes:       {}", note_count);
    println!("  Size:        {}", util::format_size(internal_size));
    println!();

    if notes.is_empty() {
        println!(
            "{}",
            "Tip: Create your first note with 'vellum new <title>'".dimmed()
        );
    } else {
        println!("Recent notes:");
        for note in notes.iter().take(5) {
            println!(
                "  {} {}",
                note.title,
                format!(
                    "({}, {})",
                    note.path,
                    util::format_relative_time(note.modified_at)
                )
                .dimmed()
            );
        }
        if notes.len() > 5 {
            println!("  ... and {} more", notes.len() - 5);
        }
        if !watcher_running {
            println!();
            println!(
                "{}",
                "Note: Watcher is not running. External edits are picked up on the next sync."
                    .dimmed()
            );
        }
    }

    Ok(())
}
