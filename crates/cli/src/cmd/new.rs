//! Create a note with identity frontmatter

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use vellum_core::{compose_note, hash_str, now_ms, rel_display, NoteId};
use vellum_index::NoteRecord;
use vellum_sync::WriteCoordinator;

use crate::vault::Vault;

pub async fn run(title: &str, folder: Option<&str>) -> Result<()> {
    let vault = Vault::find()?;
    let config = vault.load_config()?;

    let file_name = format!("{}.md", slug(title));
    let rel = match folder {
        Some(dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };
    let abs = vault.root().join(&rel);
    if abs.exists() {
        bail!("{} already exists", rel.display());
    }
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let id = NoteId::generate();
    let content = compose_note(id, title, "");

    // Index row first, then the file. A watcher running in another process
    // resolves the appearance against this row and stays quiet.
    let index = vault.open_index()?;
    let now = now_ms();
    let record = NoteRecord {
        id,
        path: rel_display(&rel),
        title: title.to_string(),
        content_hash: hash_str(&content),
        size_bytes: content.len() as u64,
        created_at: now,
        modified_at: now,
    };
    index.upsert_note(&record).context("Failed to index new note")?;

    let coordinator = WriteCoordinator::new(vault.root(), config);
    coordinator.queue_write(&abs, content)?;
    coordinator.flush_all().await;

    println!("{} {}", "✓".green(), rel.display());
    println!("  {}", format!("id: {}", id).dimmed());
    Ok(())
}

/// Lowercase the title into a safe file stem
fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("My First Note"), "my-first-note");
        assert_eq!(slug("Hello, World!"), "hello-world");
        assert_eq!(slug("  spaced  out  "), "spaced-out");
        assert_eq!(slug("---"), "untitled");
        assert_eq!(slug("Café Notes"), "café-notes");
    }
}
