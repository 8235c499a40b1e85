//! Foreground watch loop
//!
//! Builds the full engine (coordinator, reconciler, watcher) over the vault,
//! prints change events as they arrive, and runs until ctrl-c. The vault
//! lock keeps a second watcher from racing the first.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::sync::Arc;

use vellum_sync::{
    ChangeWatcher, IgnoreRules, IndexReconciler, NoteEvent, Reconciler, WriteCoordinator,
};

use crate::locks::VaultLock;
use crate::vault::Vault;

pub async fn run() -> Result<()> {
    let vault = Vault::find()?;
    let config = vault.load_config()?;

    // Exclusive per vault; released when the lock drops
    let _lock = VaultLock::acquire(&vault.internal_dir())?;

    let index = vault.open_index()?;
    let ignore = Arc::new(IgnoreRules::load(vault.root(), config.ignore.clone())?);
    let coordinator = WriteCoordinator::new(vault.root(), config.clone());
    let reconciler: Arc<dyn Reconciler> =
        Arc::new(IndexReconciler::new(vault.root(), index.clone(), ignore.clone()));
    let watcher = ChangeWatcher::new(
        vault.root(),
        config,
        index.clone(),
        reconciler,
        coordinator.expectations(),
        ignore,
    );

    watcher.events().on(print_event);
    watcher.start()?;
    let stats = watcher.initial_sync().await?;

    println!(
        "Initial sync: {} added, {} updated, {} removed",
        stats.added, stats.updated, stats.deleted
    );
    println!("Tracking {} notes", index.note_count()?);
    println!(
        "Watching {} (ctrl-c to stop)",
        vault.root().display().to_string().cyan()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    println!();
    println!("Shutting down");
    coordinator.flush_all().await;
    watcher.stop().await;
    coordinator.destroy();
    Ok(())
}

fn print_event(event: &NoteEvent) {
    match event {
        NoteEvent::ExternalAdd { path, .. } => {
            println!("{} {}", "add".green(), path.display());
        }
        NoteEvent::ExternalChange { path, .. } => {
            println!("{} {}", "change".cyan(), path.display());
        }
        NoteEvent::ExternalDelete { path, .. } => {
            println!("{} {}", "delete".red(), path.display());
        }
        NoteEvent::ExternalRename { old_path, new_path, .. } => {
            println!(
                "{} {} -> {}",
                "rename".yellow(),
                old_path.display(),
                new_path.display()
            );
        }
        NoteEvent::EditConflict { path, .. } => {
            println!(
                "{} {} changed under an open editor",
                "conflict".red(),
                path.display()
            );
        }
        NoteEvent::SyncStarted | NoteEvent::SyncCompleted { .. } => {}
    }
}
