//! Vault discovery and on-disk layout
//!
//! A vault is a directory of markdown notes with a `.vellum/` internal
//! directory holding the index database, the sync configuration, watcher
//! logs, and the watcher lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use vellum_core::VAULT_DIR;
use vellum_index::VaultIndex;
use vellum_sync::SyncConfig;

use crate::util;

#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    /// Create the `.vellum/` layout under `root`
    pub fn init(root: &Path) -> Result<Self> {
        let internal = root.join(VAULT_DIR);
        if internal.exists() {
            bail!("vault already initialized at {}", root.display());
        }

        std::fs::create_dir_all(internal.join("logs"))
            .context("Failed to create .vellum/logs")?;
        std::fs::create_dir_all(internal.join("locks"))
            .context("Failed to create .vellum/locks")?;

        let vault = Self {
            root: root.to_path_buf(),
        };
        vault.save_config(&SyncConfig::default())?;
        // Creating the database up front keeps the first status/sync cheap
        VaultIndex::open(&vault.index_path()).context("Failed to create vault index")?;
        Ok(vault)
    }

    /// Open an existing vault rooted at `root`
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join(VAULT_DIR).is_dir() {
            bail!(
                "Not a vellum vault (no {} directory in {})",
                VAULT_DIR,
                root.display()
            );
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Walk up from the current directory to the nearest vault
    pub fn find() -> Result<Self> {
        let root = util::find_vault_root()?;
        Self::open(&root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn internal_dir(&self) -> PathBuf {
        self.root.join(VAULT_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.internal_dir().join("index.sqlite")
    }

    pub fn config_path(&self) -> PathBuf {
        self.internal_dir().join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.internal_dir().join("logs")
    }

    /// Read `.vellum/config.toml`; a missing file means defaults
    pub fn load_config(&self) -> Result<SyncConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(SyncConfig::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn save_config(&self, config: &SyncConfig) -> Result<()> {
        let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
        std::fs::write(self.config_path(), text)
            .with_context(|| format!("Failed to write {}", self.config_path().display()))
    }

    pub fn open_index(&self) -> Result<Arc<VaultIndex>> {
        let index = VaultIndex::open(&self.index_path())
            .with_context(|| format!("Failed to open index at {}", self.index_path().display()))?;
        Ok(Arc::new(index))
    }
}
