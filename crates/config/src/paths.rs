//! Path utilities

use std::path::{Path, PathBuf};

/// Aura data directory (~/.aura)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aura")
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default apprentices' workspace
pub fn workspace_path() -> PathBuf {
    data_dir().join("workshop")
}

/// Archived session reports
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Sanitize a name for use as a file name
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
