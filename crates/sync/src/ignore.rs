//! Ignore pattern management for the vault watcher
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (.vellum/, .git/, OS metadata, editor temps - always active)
//! 2. .gitignore patterns (optional, enabled by default)
//! 3. .vellum/ignore patterns (vault-specific, optional)
//! 4. Config-based patterns (additional custom patterns)

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ignore rule manager
///
/// Combines multiple sources of ignore patterns with proper precedence:
/// 1. Built-in patterns (highest priority - always enforced)
/// 2. .vellum/ignore patterns (override .gitignore)
/// 3. .gitignore patterns (lowest priority)
pub struct IgnoreRules {
    /// Vault root directory
    vault_root: PathBuf,

    /// Gitignore patterns (optional)
    gitignore: Option<Gitignore>,

    /// Vault-specific ignore patterns (optional)
    vault_ignore: Option<Gitignore>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a vault
    pub fn load(vault_root: &Path, config: IgnoreConfig) -> Result<Self> {
        // Match the symlink-resolved paths watcher backends report
        let vault_root = vault_root
            .canonicalize()
            .unwrap_or_else(|_| vault_root.to_path_buf());
        let mut rules = Self {
            vault_root,
            gitignore: None,
            vault_ignore: None,
            config,
        };

        rules.reload_ignore_files()?;
        Ok(rules)
    }

    /// Reload ignore files from disk
    ///
    /// This can be called to pick up changes to .gitignore or .vellum/ignore
    pub fn reload_ignore_files(&mut self) -> Result<()> {
        // Build .gitignore
        if self.config.use_gitignore {
            let gitignore_path = self.vault_root.join(".gitignore");
            if gitignore_path.exists() {
                let mut builder = GitignoreBuilder::new(&self.vault_root);
                builder.add(&gitignore_path);
                self.gitignore = Some(builder.build()?);
            } else {
                self.gitignore = None;
            }
        } else {
            self.gitignore = None;
        }

        // Build .vellum/ignore
        if self.config.use_vault_ignore {
            let vault_ignore_path = self.vault_root.join(".vellum").join("ignore");
            if vault_ignore_path.exists() {
                let mut builder = GitignoreBuilder::new(&self.vault_root);
                builder.add(&vault_ignore_path);
                self.vault_ignore = Some(builder.build()?);
            } else {
                self.vault_ignore = None;
            }
        } else {
            self.vault_ignore = None;
        }

        Ok(())
    }

    /// Check if path should be ignored
    ///
    /// Returns true if the path matches any ignore pattern
    pub fn should_ignore(&self, path: &Path) -> bool {
        // 1. Built-in patterns (highest priority - always enforced)
        if self.is_builtin_ignored(path) {
            return true;
        }

        // Gitignore matching wants vault-relative paths, and a directory
        // pattern like `drafts/` has to suppress files underneath it too,
        // so parents are consulted as well as the path itself.
        let rel: &Path = match path.strip_prefix(&self.vault_root) {
            Ok(stripped) => stripped,
            // Absolute but outside the vault: nothing of ours to match
            Err(_) if path.is_absolute() => return false,
            Err(_) => path,
        };
        let is_dir = self.vault_root.join(rel).is_dir();

        // 2. .vellum/ignore (overrides .gitignore, including negations)
        if let Some(ref vault_ignore) = self.vault_ignore {
            let matched = vault_ignore.matched_path_or_any_parents(rel, is_dir);
            if matched.is_ignore() {
                return true;
            }
            if matched.is_whitelist() {
                return false;
            }
        }

        // 3. .gitignore (lowest priority)
        if let Some(ref gitignore) = self.gitignore {
            if gitignore.matched_path_or_any_parents(rel, is_dir).is_ignore() {
                return true;
            }
        }

        // 4. Additional config patterns
        for pattern in &self.config.additional_patterns {
            if self.matches_glob_pattern(path, pattern) {
                return true;
            }
        }

        false
    }

    /// Check if path matches built-in ignore patterns
    ///
    /// These are always enforced regardless of configuration
    fn is_builtin_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        // Internal vault directory
        if path_str.contains("/.vellum/")
            || path_str.ends_with("/.vellum")
            || path_str.starts_with(".vellum/")
            || path_str == ".vellum" {
            return true;
        }

        // Git repository
        if path_str.contains("/.git/")
            || path_str.ends_with("/.git")
            || path_str.starts_with(".git/")
            || path_str == ".git" {
            return true;
        }

        // Other tools' vault-internal directories
        if path_str.contains("/.obsidian/")
            || path_str.starts_with(".obsidian/")
            || path_str.contains("/.trash/")
            || path_str.starts_with(".trash/") {
            return true;
        }

        // Editor temp files and dependency directories
        if self.matches_editor_temp(&path_str) {
            return true;
        }

        false
    }

    /// Check if path matches common editor temporary files
    ///
    /// Covers: Vim, Emacs, VS Code, MacOS/Windows system files, dependency dirs
    fn matches_editor_temp(&self, path_str: &str) -> bool {
        let filename = Path::new(path_str)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        // Vim swap files (.swp, .swo, .swn, .swm)
        if filename.ends_with(".swp")
            || filename.ends_with(".swo")
            || filename.ends_with(".swn")
            || filename.ends_with(".swm") {
            return true;
        }

        // Vim's pre-write permission check file
        if filename == "4913" {
            return true;
        }

        // Vim/Emacs backup files (~)
        if filename.ends_with('~') {
            return true;
        }

        // Emacs auto-save files (#*#)
        if filename.starts_with('#') && filename.ends_with('#') {
            return true;
        }

        // Emacs lock files (.#*)
        if filename.starts_with(".#") {
            return true;
        }

        // Generic temp suffixes, VS Code crash-recovery files
        if filename.ends_with(".tmp") || filename.ends_with(".crswap") {
            return true;
        }

        // MacOS system files
        if filename == ".DS_Store" || filename.starts_with("._") {
            return true;
        }

        // Windows system files
        if filename == "Thumbs.db" || filename == "desktop.ini" {
            return true;
        }

        // Dependency and IDE directories (full path check)
        if path_str.contains("/node_modules/")
            || path_str.starts_with("node_modules/")
            || path_str.contains("/.vscode/")
            || path_str.contains("/.idea/") {
            return true;
        }

        false
    }

    /// Match glob pattern (simple implementation)
    ///
    /// For more complex patterns, the ignore crate handles it via .vellum/ignore
    fn matches_glob_pattern(&self, path: &Path, pattern: &str) -> bool {
        let path_str = path.to_string_lossy();

        if pattern.contains('*') {
            // Basic wildcard support
            let pattern_parts: Vec<&str> = pattern.split('*').collect();
            if pattern_parts.len() == 2 {
                let prefix = pattern_parts[0];
                let suffix = pattern_parts[1];
                return path_str.starts_with(prefix) && path_str.ends_with(suffix);
            }
        } else {
            // Exact match
            return path_str.contains(pattern);
        }

        false
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 1; // Built-in always active
        if self.gitignore.is_some() {
            count += 1;
        }
        if self.vault_ignore.is_some() {
            count += 1;
        }
        if !self.config.additional_patterns.is_empty() {
            count += 1;
        }
        count
    }

    /// Get vault root
    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }
}

/// Ignore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Use .vellum/ignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_vault_ignore: bool,

    /// Additional patterns from config
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            use_vault_ignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_patterns_always_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig::default();
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        // Built-in patterns should always be ignored
        assert!(rules.should_ignore(Path::new(".vellum/index.sqlite")));
        assert!(rules.should_ignore(Path::new("foo/.vellum/config.toml")));
        assert!(rules.should_ignore(Path::new(".git/objects/ab/cd")));
        assert!(rules.should_ignore(Path::new("src/.git/config")));
        assert!(rules.should_ignore(Path::new(".obsidian/workspace.json")));
        assert!(rules.should_ignore(Path::new(".trash/old.md")));

        // Normal notes should not be ignored
        assert!(!rules.should_ignore(Path::new("daily/2024-01-01.md")));
        assert!(!rules.should_ignore(Path::new("README.md")));
    }

    #[test]
    fn test_editor_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();

        assert!(rules.should_ignore(Path::new("notes/.note.md.swp")));
        assert!(rules.should_ignore(Path::new("notes/note.md~")));
        assert!(rules.should_ignore(Path::new("notes/#note.md#")));
        assert!(rules.should_ignore(Path::new("notes/.#note.md")));
        assert!(rules.should_ignore(Path::new("notes/4913")));
        assert!(rules.should_ignore(Path::new("notes/draft.tmp")));
        assert!(rules.should_ignore(Path::new(".DS_Store")));
        assert!(rules.should_ignore(Path::new("notes/._resource.md")));
        assert!(rules.should_ignore(Path::new("Thumbs.db")));
        assert!(rules.should_ignore(Path::new("node_modules/pkg/readme.md")));

        assert!(!rules.should_ignore(Path::new("notes/note.md")));
    }

    #[test]
    fn test_gitignore_parsing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let gitignore_path = temp_dir.path().join(".gitignore");

        fs::write(&gitignore_path, "*.log\ndrafts/\n")?;

        // Create the dir so the ignore crate can check is_dir
        fs::create_dir_all(temp_dir.path().join("drafts"))?;
        fs::write(temp_dir.path().join("test.log"), b"log")?;

        let config = IgnoreConfig {
            use_gitignore: true,
            use_vault_ignore: false,
            additional_patterns: vec![],
        };

        let rules = IgnoreRules::load(temp_dir.path(), config)?;

        assert!(rules.should_ignore(Path::new("test.log")));
        assert!(rules.should_ignore(Path::new("drafts")));
        // A directory pattern covers files below it
        assert!(rules.should_ignore(Path::new("drafts/wip.md")));

        assert!(!rules.should_ignore(Path::new("notes/keep.md")));
        assert!(!rules.should_ignore(Path::new("README.md")));

        Ok(())
    }

    #[test]
    fn test_vault_ignore_overrides_gitignore() -> Result<()> {
        let temp_dir = TempDir::new()?;

        // .gitignore ignores *.md under archive/
        fs::write(temp_dir.path().join(".gitignore"), "archive/*.md\n")?;

        // .vellum/ignore whitelists one of them (negation pattern)
        fs::create_dir_all(temp_dir.path().join(".vellum"))?;
        fs::write(
            temp_dir.path().join(".vellum/ignore"),
            "!archive/keep.md\n",
        )?;

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default())?;

        assert!(rules.should_ignore(Path::new("archive/old.md")));
        // keep.md is whitelisted by the vault ignore file
        assert!(!rules.should_ignore(Path::new("archive/keep.md")));

        Ok(())
    }

    #[test]
    fn test_additional_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig {
            use_gitignore: false,
            use_vault_ignore: false,
            additional_patterns: vec!["*.bak".to_string(), "scratch/".to_string()],
        };

        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();

        assert!(rules.should_ignore(Path::new("note.md.bak")));
        assert!(rules.should_ignore(Path::new("scratch/")));
        assert!(rules.should_ignore(Path::new("scratch/wip.md")));

        assert!(!rules.should_ignore(Path::new("notes/real.md")));
    }

    #[test]
    fn test_gitignore_disabled() -> Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join(".gitignore"), "*.log\n")?;

        let config = IgnoreConfig {
            use_gitignore: false,
            use_vault_ignore: false,
            additional_patterns: vec![],
        };

        let rules = IgnoreRules::load(temp_dir.path(), config)?;

        // .gitignore patterns should NOT be applied
        assert!(!rules.should_ignore(Path::new("test.log")));

        // But built-in patterns should still work
        assert!(rules.should_ignore(Path::new(".vellum/index.sqlite")));

        Ok(())
    }

    #[test]
    fn test_reload_ignore_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let gitignore_path = temp_dir.path().join(".gitignore");

        let config = IgnoreConfig {
            use_gitignore: true,
            use_vault_ignore: false,
            additional_patterns: vec![],
        };

        let mut rules = IgnoreRules::load(temp_dir.path(), config)?;

        // Initially no .gitignore
        assert!(!rules.should_ignore(Path::new("test.log")));

        fs::write(&gitignore_path, "*.log\n")?;
        rules.reload_ignore_files()?;

        assert!(rules.should_ignore(Path::new("test.log")));

        Ok(())
    }

    #[test]
    fn test_active_sources_count() {
        let temp_dir = TempDir::new().unwrap();

        let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();
        assert_eq!(rules.active_sources(), 1); // Only built-in

        let config = IgnoreConfig {
            use_gitignore: false,
            use_vault_ignore: false,
            additional_patterns: vec!["*.bak".to_string()],
        };
        let rules = IgnoreRules::load(temp_dir.path(), config).unwrap();
        assert_eq!(rules.active_sources(), 2); // Built-in + additional
    }
}
