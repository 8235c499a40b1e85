//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use vellum_core::VAULT_DIR;

/// Find the vault root by walking up from cwd to find .vellum/
pub fn find_vault_root() -> Result<PathBuf> {
    let mut current = std::env::current_dir()
        .context("Failed to get current directory")?;

    loop {
        let marker = current.join(VAULT_DIR);
        if marker.exists() && marker.is_dir() {
            return Ok(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => anyhow::bail!("Not a vellum vault (no {} directory found)", VAULT_DIR),
        }
    }
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts_ms: i64) -> String {
    let delta_ms = vellum_core::now_ms() - ts_ms;
    if delta_ms < 0 {
        return "in the future".to_string();
    }

    let seconds = (delta_ms / 1000) as u64;

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format timestamp as absolute time ("2024-01-03 14:30:00")
pub fn format_absolute_time(ts_ms: i64) -> String {
    let secs = if ts_ms > 0 { (ts_ms / 1000) as u64 } else { 0 };
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    // Civil calendar from days since the Unix epoch
    // Algorithm from http://howardhinnant.github.io/date_algorithms.html
    let epoch_days = days + 719468; // Days from 0000-01-01 to 1970-01-01
    let era = epoch_days / 146097;
    let doe = epoch_days - era * 146097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 }; // [1, 12]
    let year = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, m, d, hours, minutes, seconds
    )
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Calculate directory size recursively
pub fn calculate_dir_size(dir: &Path) -> Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut total = 0u64;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            total += entry.metadata()?.len();
        } else if path.is_dir() {
            total += calculate_dir_size(&path)?;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_size(1536), "1.50 KB");
    }

    #[test]
    fn test_format_relative_time() {
        let now = vellum_core::now_ms();

        let result = format_relative_time(now);
        assert!(result.contains("seconds ago"));

        let one_hour_ago = now - 3600 * 1000;
        let result = format_relative_time(one_hour_ago);
        assert!(result.contains("hour"));

        let one_day_ago = now - 86400 * 1000;
        let result = format_relative_time(one_day_ago);
        assert!(result.contains("day"));

        let future = now + 60_000;
        assert_eq!(format_relative_time(future), "in the future");
    }

    #[test]
    fn test_format_absolute_time() {
        assert_eq!(format_absolute_time(0), "1970-01-01 00:00:00");
        // 2024-01-01T00:00:00Z
        assert_eq!(format_absolute_time(1_704_067_200_000), "2024-01-01 00:00:00");
        // Leap day: 2024-02-29T12:30:45Z
        assert_eq!(format_absolute_time(1_709_209_845_000), "2024-02-29 12:30:45");
    }

    #[test]
    fn test_calculate_dir_size() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), vec![0u8; 50]).unwrap();

        assert_eq!(calculate_dir_size(dir.path()).unwrap(), 150);
        assert_eq!(calculate_dir_size(&dir.path().join("missing")).unwrap(), 0);
    }
}
