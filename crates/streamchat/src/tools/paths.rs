//! Workspace-root confinement for filesystem tools.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::{ToolError, ToolResult};

/// Resolve `relative` inside `root`, rejecting anything that could escape it.
///
/// The path is built component by component: parent references, absolute
/// components and NUL bytes are refused outright, as is any `..` sequence in
/// the raw text. If the target (or, for new files, its parent) already
/// exists, it is canonicalized and checked against the canonical root so a
/// symlink inside the workspace cannot point outside of it.
pub fn resolve_confined(root: &Path, relative: &str) -> ToolResult<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() || relative == "." {
        return Ok(root.to_path_buf());
    }

    if relative.contains("..") {
        warn!(path = %relative, "path traversal attempt rejected");
        return Err(ToolError::PathEscape(relative.to_string()));
    }

    let mut built = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => {
                if name.to_string_lossy().contains('\0') {
                    return Err(ToolError::PathEscape(relative.to_string()));
                }
                built.push(name);
            }
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!(path = %relative, "absolute or parent path component rejected");
                return Err(ToolError::PathEscape(relative.to_string()));
            }
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| ToolError::failed(format!("workspace root unavailable: {e}")))?;

    let probe = if built.exists() {
        Some(built.clone())
    } else {
        built.ancestors().skip(1).find(|p| p.exists()).map(Path::to_path_buf)
    };

    if let Some(probe) = probe {
        let canonical = probe
            .canonicalize()
            .map_err(|e| ToolError::failed(format!("cannot resolve {}: {e}", probe.display())))?;
        if !canonical.starts_with(&canonical_root) {
            warn!(
                path = %relative,
                resolved = %canonical.display(),
                "symlink escape attempt rejected"
            );
            return Err(ToolError::PathEscape(relative.to_string()));
        }
    }

    Ok(built)
}

/// Strip path separators, control and reserved characters from a file name.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ');
    if sanitized.is_empty() {
        return None;
    }

    Some(sanitized.chars().take(255).collect())
}

/// First path in `dir` named `filename` or `stem_N.ext` that does not exist yet.
pub async fn next_free_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let original = Path::new(filename);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{ext}"));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        counter += 1;
    }
}
