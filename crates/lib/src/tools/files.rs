//! Workspace-rooted file access. Paths from the model are resolved under the workspace root;
//! anything that would escape it is refused.

use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// Maximum characters returned by a read.
const MAX_READ_CHARS: usize = 20_000;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path under the root. Absolute paths must already lie inside it.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(ToolError::InvalidArguments("path is empty".to_string()));
        }
        let path = Path::new(requested);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| ToolError::OutsideWorkspace(requested.to_string()))?
        } else {
            path
        };
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(ToolError::OutsideWorkspace(requested.to_string())),
            }
        }
        Ok(resolved)
    }

    pub async fn read(&self, requested: &str) -> Result<String, ToolError> {
        let path = self.resolve(requested)?;
        let mut content = tokio::fs::read_to_string(&path).await?;
        if content.chars().count() > MAX_READ_CHARS {
            content = content.chars().take(MAX_READ_CHARS).collect();
            content.push_str("\n[truncated]");
        }
        Ok(content)
    }

    /// Write (creating parent directories) and return the resolved path.
    pub async fn write(&self, requested: &str, content: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(requested)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Entry names in a directory, directories suffixed with `/`, sorted.
    pub async fn list(&self, requested: &str) -> Result<Vec<String>, ToolError> {
        let dir = if requested.trim().is_empty() || requested.trim() == "." {
            self.root.clone()
        } else {
            self.resolve(requested)?
        };
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
