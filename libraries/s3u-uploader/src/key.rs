//! Object key derivation

use crate::error::{Result, UploadError};
use std::path::{Component, Path};

/// Derive the object key for a path relative to the watch root
///
/// `.` segments, redundant separators and any root prefix are dropped, `..`
/// is resolved lexically and segments are joined with `/`.
pub fn object_key(relative: &Path) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();

    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(UploadError::InvalidKey(format!(
                        "{} escapes the watch root",
                        relative.display()
                    )));
                }
            }
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| {
                    UploadError::InvalidKey(format!("{} is not valid UTF-8", relative.display()))
                })?;
                segments.push(segment);
            }
        }
    }

    if segments.is_empty() {
        return Err(UploadError::InvalidKey(format!(
            "{} does not name a file",
            relative.display()
        )));
    }

    Ok(segments.join("/"))
}
