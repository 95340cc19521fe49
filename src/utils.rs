//! Utility functions for the remote test runner.
//!
//! This module provides path arithmetic matching what the deployment tool
//! expects (lexically normalized, relative to the source root), shell quoting
//! for on-device scripts, and TOML loading.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Lexically normalizes a path, resolving `.` and `..` components.
///
/// The filesystem is never consulted, so symlinks are left untouched.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_parent = matches!(normalized.components().next_back(), Some(Component::ParentDir));
                if (at_parent || !normalized.pop()) && !path.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Makes `path` absolute by joining it onto `base` if needed, then normalizes it.
///
/// # Parameters
///
/// - `path`: The path to resolve.
/// - `base`: The directory relative paths are resolved against.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Computes `path` relative to `base`. Both are expected to be absolute.
///
/// # Returns
///
/// A relative path that may start with `..` components. Returns `.` when
/// both paths are the same.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path = normalize_path(path);
    let base = normalize_path(base);
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Renders a path for use on a command line.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Quotes a string for a POSIX shell.
///
/// Strings made only of safe characters are returned untouched; everything
/// else is wrapped in single quotes.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%_+=:,./-".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r#"'"'"'"#))
    }
}

/// Reads a TOML file into an arbitrary struct.
///
/// # Parameters
///
/// - `path`: The path of the TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or data parsing fails.
pub fn read_toml_from_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
}
