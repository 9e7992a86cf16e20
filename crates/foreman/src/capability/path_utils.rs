//! Path validation for workspace-confined apprentices

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path validation failures
#[derive(Error, Debug)]
pub enum PathValidationError {
    #[error("Path {path} is outside workspace {workspace}")]
    OutsideWorkspace { path: String, workspace: String },

    #[error("Cannot resolve path {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve `path` and require it to sit inside `workspace_root`.
///
/// Relative paths are taken from the workspace root and `~/` expands to the
/// home directory. The deepest existing ancestor is canonicalized (so
/// symlinks cannot escape) and the not-yet-existing remainder is folded
/// lexically.
pub async fn validate_workspace_path(
    path: &str,
    workspace_root: &Path,
) -> Result<PathBuf, PathValidationError> {
    let io_err = |source| PathValidationError::Io {
        path: path.to_string(),
        source,
    };

    let expanded = if path.starts_with('/') || path.starts_with('~') {
        expand_tilde(path)
    } else {
        workspace_root.join(path)
    };
    let expanded = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().map_err(io_err)?.join(expanded)
    };

    let absolute = canonicalize_existing_prefix(&expanded)
        .await
        .map_err(io_err)?;

    let canonical_workspace = if workspace_root.exists() {
        tokio::fs::canonicalize(workspace_root)
            .await
            .unwrap_or_else(|_| workspace_root.to_path_buf())
    } else {
        normalize_lexically(workspace_root)
    };

    if !is_path_within_workspace(&absolute, &canonical_workspace) {
        return Err(PathValidationError::OutsideWorkspace {
            path: path.to_string(),
            workspace: canonical_workspace.display().to_string(),
        });
    }

    Ok(absolute)
}

async fn canonicalize_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut rest = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(normalized.clone()),
        }
    }

    let mut resolved = tokio::fs::canonicalize(existing).await?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Fold `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Component-wise prefix check
fn is_path_within_workspace(path: &Path, workspace: &Path) -> bool {
    path.starts_with(workspace)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
