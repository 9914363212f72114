// src/filesystem/path.rs

//! Path sanitization for names that come from batches and configuration
//!
//! Archive member names, file keys from a project configuration and batch
//! names typed by an operator all end up joined onto real directories. None
//! of them may climb out of the directory they are joined to.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an archive member name
///
/// `.` components are dropped and trailing slashes removed, so
/// `sets/s1/` and `sets/./s1` both become `sets/s1`. The archive root
/// itself normalizes to the empty string.
///
/// Absolute names and `..` components are rejected.
///
/// # Examples
///
/// ```
/// use provsys::filesystem::path::normalize_member;
///
/// assert_eq!(normalize_member("sets/s1/").unwrap(), "sets/s1");
/// assert_eq!(normalize_member("./config.json").unwrap(), "config.json");
/// assert!(normalize_member("sets/../../etc/shadow").is_err());
/// ```
pub fn normalize_member(name: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(c) => {
                let part = c
                    .to_str()
                    .ok_or_else(|| Error::InvalidPath(format!("Non-UTF8 member name: {name}")))?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathTraversal(name.to_string()));
            }
        }
    }

    Ok(parts.join("/"))
}

/// Join an untrusted relative path onto `root`
///
/// The result is guaranteed to stay below `root`; absolute paths, `..`
/// components and empty paths are refused.
pub fn safe_join(root: impl AsRef<Path>, path: &str) -> Result<PathBuf> {
    let root = root.as_ref();
    let relative = normalize_member(path)?;
    if relative.is_empty() {
        return Err(Error::InvalidPath(format!("Empty path below {}", root.display())));
    }

    let joined = root.join(&relative);

    // Catches symlinked components when both ends already exist
    if let (Ok(canonical_root), Ok(canonical_joined)) = (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Validate a name that must be a single path component
///
/// Used for batch and backup names.
pub fn single_component(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::InvalidPath("Empty name".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::PathTraversal(name.to_string()));
    }
    Ok(name)
}
