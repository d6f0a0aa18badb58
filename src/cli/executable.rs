//! Root command validation and executable lookup.
//!
//! A root name is checked for shape before any filesystem access, then
//! resolved with `which` against `$PATH` (or the configured search dirs).
//! Nothing here ever spawns a process.

use std::path::{Path, PathBuf};

use crate::error::CartographerError;

/// Characters that carry meaning to a shell or a path and are never part of a root name.
const FORBIDDEN: &[char] = &[
    '/', '\\', ';', '|', '&', '$', '`', '>', '<', '(', ')', '{', '}', '[', ']', '*', '?', '!',
    '~', '\'', '"', '#', '=', '%', '^', ',', ':',
];

/// Validate a root command name.
///
/// Accepts a single token starting with an ASCII letter, digit or `_`, made of
/// ASCII alphanumerics and `.`, `_`, `+`, `-`. Rejects path traversal (`..`),
/// path separators, whitespace and shell metacharacters.
pub fn validate_root_name(name: &str) -> crate::Result<()> {
    let invalid = |why: &str| {
        Err(CartographerError::InvalidArgument(format!(
            "invalid command name '{}': {}",
            name, why
        )))
    };

    let Some(first) = name.chars().next() else {
        return invalid("empty");
    };
    if name.contains("..") {
        return invalid("path traversal");
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return invalid(&format!("forbidden character '{}'", c));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("whitespace or control character");
    }
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return invalid("must start with a letter, digit or '_'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
    {
        return invalid("only ASCII letters, digits, '.', '_', '+' and '-' are allowed");
    }
    Ok(())
}

/// Validate `name` and resolve it to an absolute executable path.
///
/// Searches `search_path` when non-empty, `$PATH` otherwise. Returns
/// `CommandNotFound` when nothing executable matches.
pub fn resolve_executable(name: &str, search_path: &[PathBuf]) -> crate::Result<PathBuf> {
    validate_root_name(name)?;

    let found = if search_path.is_empty() {
        which::which(name)
    } else {
        let joined = std::env::join_paths(search_path).map_err(|e| {
            CartographerError::InvalidConfig(format!("invalid search_path entry: {}", e))
        })?;
        which::which_in(name, Some(joined), Path::new("/"))
    };

    found.map_err(|e| {
        CartographerError::CommandNotFound(format!(
            "'{}' is not an executable on the search path: {}",
            name, e
        ))
    })
}
