//! One reconciliation pass against the files on disk

use anyhow::Result;
use owo_colors::OwoColorize;
use std::sync::Arc;

use vellum_sync::{IgnoreRules, IndexReconciler, Reconciler};

use crate::vault::Vault;

pub async fn run() -> Result<()> {
    let vault = Vault::find()?;
    let config = vault.load_config()?;

    let index = vault.open_index()?;
    let ignore = Arc::new(IgnoreRules::load(vault.root(), config.ignore.clone())?);
    let reconciler = IndexReconciler::new(vault.root(), index, ignore);

    let stats = reconciler.reconcile().await?;

    if stats.is_empty() {
        println!("{} index already up to date", "✓".green());
    } else {
        println!(
            "{} index reconciled: {} added, {} updated, {} removed",
            "✓".green(),
            stats.added,
            stats.updated,
            stats.deleted
        );
    }
    Ok(())
}
