//! Vault path conventions
//!
//! Index rows, watcher maps, and events all speak vault-relative paths;
//! absolute paths appear only at the filesystem boundary.

use std::path::{Path, PathBuf};
use anyhow::{bail, Result};

/// Name of the internal directory at the vault root
pub const VAULT_DIR: &str = ".vellum";

/// Markdown extension check (the only file type the engine tracks)
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Normalize a path to its vault-relative form
///
/// Accepts either a path already relative to the root or an absolute path
/// under it; anything outside the vault is an error.
pub fn vault_relative(root: &Path, path: &Path) -> Result<PathBuf> {
    let rel = if path.is_absolute() {
        match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => bail!(
                "Path {} is outside the vault root {}",
                path.display(),
                root.display()
            ),
        }
    } else {
        path
    };
    if rel.as_os_str().is_empty() {
        bail!("Path resolves to the vault root itself");
    }
    Ok(rel.to_path_buf())
}

/// Display form of a relative path with forward slashes on every platform
pub fn rel_display(rel: &Path) -> String {
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_markdown() {
        assert!(is_markdown(Path::new("notes/a.md")));
        assert!(is_markdown(Path::new("A.MD")));
        assert!(!is_markdown(Path::new("notes/a.txt")));
        assert!(!is_markdown(Path::new("noext")));
        assert!(!is_markdown(Path::new(".md")));
    }

    #[test]
    fn test_vault_relative_absolute_inside() {
        let root = Path::new("/vault");
        let rel = vault_relative(root, Path::new("/vault/notes/a.md")).unwrap();
        assert_eq!(rel, PathBuf::from("notes/a.md"));
    }

    #[test]
    fn test_vault_relative_already_relative() {
        let root = Path::new("/vault");
        let rel = vault_relative(root, Path::new("notes/a.md")).unwrap();
        assert_eq!(rel, PathBuf::from("notes/a.md"));
    }

    #[test]
    fn test_vault_relative_outside() {
        let root = Path::new("/vault");
        assert!(vault_relative(root, Path::new("/elsewhere/a.md")).is_err());
    }

    #[test]
    fn test_vault_relative_root_itself() {
        let root = Path::new("/vault");
        assert!(vault_relative(root, Path::new("/vault")).is_err());
    }
}
