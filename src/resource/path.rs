use crate::error::{GuardError, RejectReason, Result};
use std::path::{Component, Path, PathBuf};

/// Reject segments that could walk out of the storage root.
pub fn sanitize_segments<S: AsRef<str>>(segments: &[S]) -> Result<()> {
    if segments.is_empty() {
        return Err(GuardError::Forbidden(RejectReason::InvalidPath));
    }

    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\0') {
            return Err(GuardError::Forbidden(RejectReason::InvalidPath));
        }
    }

    Ok(())
}

/// Join `segments` onto `root` and prove the result is still inside it.
///
/// Runs even for sanitized segments: a segment carrying a separator or an
/// absolute path is caught here after normalization.
pub fn resolve_within<S: AsRef<str>>(root: &Path, segments: &[S]) -> Result<PathBuf> {
    let mut joined = root.to_path_buf();
    for segment in segments {
        joined.push(segment.as_ref());
    }

    let resolved = normalize_path(&joined);

    if resolved == root || !resolved.starts_with(root) {
        return Err(GuardError::Forbidden(RejectReason::OutsideRoot));
    }

    Ok(resolved)
}

/// Lexical normalization: drops `.` and folds `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }

    result
}

/// Lowercased text after the final `.`, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Filename safe for a `Content-Disposition` header
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
