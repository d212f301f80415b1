//! Lexical path helpers for keeping tool access inside a project

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Normalize a path without touching the filesystem: drop `.`, fold `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => components.push(Component::Prefix(p)),
            Component::RootDir => {
                components.retain(|c| matches!(c, Component::Prefix(_)));
                components.push(Component::RootDir);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                _ => components.push(Component::ParentDir),
            },
            Component::Normal(name) => components.push(Component::Normal(name)),
        }
    }

    components.iter().collect()
}

/// Resolve `file_path` against `project_dir`, refusing anything that lands
/// outside it. Works for files that do not exist yet.
pub fn resolve_in_project(project_dir: &Path, file_path: &str) -> Result<PathBuf, ToolError> {
    let project = dunce::canonicalize(project_dir).unwrap_or_else(|_| normalize_path(project_dir));

    let requested = Path::new(file_path);
    let candidate = if requested.is_absolute() {
        normalize_path(requested)
    } else {
        normalize_path(&project.join(requested))
    };

    if candidate.starts_with(&project) {
        Ok(candidate)
    } else {
        Err(ToolError::PathOutsideProject(file_path.to_string()))
    }
}
