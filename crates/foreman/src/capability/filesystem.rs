//! APPRENTICES: workshop file handling

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::path_utils::validate_workspace_path;
use super::{
    parse_params, Capability, CapabilityDescriptor, CapabilityError, InvocationContext, ParamType,
};

/// Reads a text file from the workshop
pub struct FileReader {
    workspace: PathBuf,
    descriptor: CapabilityDescriptor,
}

impl FileReader {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            descriptor: CapabilityDescriptor::new(
                "file_reader",
                "Read a text file from the workshop and return its contents.",
            )
            .required("filename", ParamType::String, "Path of the file to read"),
        }
    }
}

#[derive(Deserialize)]
struct ReadArgs {
    filename: String,
}

#[async_trait]
impl Capability for FileReader {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: ReadArgs = parse_params(params)?;
        let path = validate_workspace_path(&args.filename, &self.workspace).await?;

        debug!("◆ READING: {:?}", path);
        if !path.exists() {
            return Err(CapabilityError::new(format!(
                "File not found: {}",
                args.filename
            )));
        }
        if !path.is_file() {
            return Err(CapabilityError::new(format!(
                "Not a regular file: {}",
                args.filename
            )));
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Value::String(content)),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(
                CapabilityError::new(format!("Access denied: {}", args.filename)),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Err(CapabilityError::new(
                format!("Not a UTF-8 text file: {}", args.filename),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes or appends to a file, creating parent directories
pub struct FileWriter {
    workspace: PathBuf,
    descriptor: CapabilityDescriptor,
}

impl FileWriter {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            descriptor: CapabilityDescriptor::new(
                "file_writer",
                "Write content to a file in the workshop. Arrays and objects are saved as JSON.",
            )
            .required("filename", ParamType::String, "Path of the file to write")
            .required("content", ParamType::Any, "Text, or any JSON value")
            .optional(
                "action",
                ParamType::String,
                "'write' (default, overwrite) or 'append'",
            ),
        }
    }
}

#[derive(Deserialize)]
struct WriteArgs {
    filename: String,
    content: Value,
    action: Option<String>,
}

/// Text a value is stored as on disk
fn render_content(content: &Value) -> Result<String, CapabilityError> {
    Ok(match content {
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string_pretty(content)?,
        other => other.to_string(),
    })
}

#[async_trait]
impl Capability for FileWriter {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: WriteArgs = parse_params(params)?;
        let mode = args
            .action
            .as_deref()
            .unwrap_or("write")
            .to_ascii_lowercase();
        if mode != "write" && mode != "append" {
            return Err(CapabilityError::new(format!(
                "Unknown action '{}': use 'write' or 'append'",
                mode
            )));
        }

        let path = validate_workspace_path(&args.filename, &self.workspace).await?;
        let text = render_content(&args.content)?;

        debug!("◆ WRITING ({}): {:?}", mode, path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if mode == "append" {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(text.as_bytes()).await?;
            file.flush().await?;
        } else {
            tokio::fs::write(&path, &text).await?;
        }

        Ok(json!({
            "path": path.display().to_string(),
            "bytes": text.len(),
            "mode": mode,
        }))
    }
}

/// Lists, moves, copies, deletes and creates workshop entries
pub struct FileManager {
    workspace: PathBuf,
    descriptor: CapabilityDescriptor,
}

impl FileManager {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            descriptor: CapabilityDescriptor::new(
                "file_manager",
                "Manage workshop files: list, move, copy, delete or mkdir.",
            )
            .required(
                "action",
                ParamType::String,
                "One of 'list', 'move', 'copy', 'delete', 'mkdir'",
            )
            .required("path", ParamType::String, "Target path (source for move/copy)")
            .optional(
                "destination",
                ParamType::String,
                "Destination path for move/copy",
            ),
        }
    }

    async fn destination(
        &self,
        destination: Option<&str>,
        action: &str,
    ) -> Result<PathBuf, CapabilityError> {
        let dest = destination.ok_or_else(|| {
            CapabilityError::new(format!("Missing 'destination' for '{}'", action))
        })?;
        let dest = validate_workspace_path(dest, &self.workspace).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(dest)
    }
}

#[derive(Deserialize)]
struct ManageArgs {
    action: String,
    path: String,
    destination: Option<String>,
}

async fn list_dir(path: &Path) -> Result<Value, CapabilityError> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let meta = entry.metadata().await?;
        let kind = if meta.is_dir() { "directory" } else { "file" };
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "kind": kind,
            "size": meta.len(),
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(Value::Array(entries))
}

fn copy_tree<'a>(
    from: &'a Path,
    to: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<u64>> + Send + 'a>> {
    Box::pin(async move {
        if !tokio::fs::metadata(from).await?.is_dir() {
            return tokio::fs::copy(from, to).await.map(|_| 1);
        }
        tokio::fs::create_dir_all(to).await?;
        let mut copied = 0;
        let mut dir = tokio::fs::read_dir(from).await?;
        while let Some(entry) = dir.next_entry().await? {
            copied += copy_tree(&entry.path(), &to.join(entry.file_name())).await?;
        }
        Ok(copied)
    })
}

#[async_trait]
impl Capability for FileManager {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        let args: ManageArgs = parse_params(params)?;
        let action = args.action.to_ascii_lowercase();
        let target = validate_workspace_path(&args.path, &self.workspace).await?;

        debug!("◆ FILE MANAGER {}: {:?}", action, target);
        match action.as_str() {
            "list" => {
                if !target.is_dir() {
                    return Err(CapabilityError::new(format!(
                        "Not a directory: {}",
                        args.path
                    )));
                }
                list_dir(&target).await
            }
            "mkdir" => {
                tokio::fs::create_dir_all(&target).await?;
                Ok(json!({ "created": target.display().to_string() }))
            }
            "delete" => {
                if !target.exists() {
                    return Err(CapabilityError::new(format!(
                        "Path does not exist: {}",
                        args.path
                    )));
                }
                let root = tokio::fs::canonicalize(&self.workspace)
                    .await
                    .unwrap_or_else(|_| self.workspace.clone());
                if target == root {
                    return Err(CapabilityError::new("Refusing to delete the workshop root"));
                }
                if target.is_dir() {
                    tokio::fs::remove_dir_all(&target).await?;
                } else {
                    tokio::fs::remove_file(&target).await?;
                }
                Ok(json!({ "deleted": target.display().to_string() }))
            }
            "move" | "copy" => {
                if !target.exists() {
                    return Err(CapabilityError::new(format!(
                        "Source does not exist: {}",
                        args.path
                    )));
                }
                let dest = self.destination(args.destination.as_deref(), &action).await?;
                if action == "move" {
                    tokio::fs::rename(&target, &dest).await?;
                    Ok(json!({
                        "moved": target.display().to_string(),
                        "to": dest.display().to_string(),
                    }))
                } else {
                    let files = copy_tree(&target, &dest).await?;
                    Ok(json!({
                        "copied": target.display().to_string(),
                        "to": dest.display().to_string(),
                        "files": files,
                    }))
                }
            }
            other => Err(CapabilityError::new(format!(
                "Unknown action '{}': use list, move, copy, delete or mkdir",
                other
            ))),
        }
    }
}
