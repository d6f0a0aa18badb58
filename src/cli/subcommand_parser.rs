//! Subcommand section parser: extracts subcommand names from CLI help output.
//!
//! Pure text, no I/O. Finds a section header (`Commands:`, `Available
//! Commands`, `SUBCOMMANDS`, `GROUPS`, or a free-form line such as "These are
//! common Git commands used in various situations:") and collects the
//! `name   description` rows beneath it. `help_parser` handles flags and the
//! summary line.

use std::collections::HashSet;

/// One row of a subcommand section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSubcommand {
    pub name: String,
    pub description: Option<String>,
}

/// Entries every CLI framework adds that are not real subcommands.
const NOISE: &[&str] = &["help", "version", "completion", "completions"];

/// Exact headers (compared lowercase, trailing colon ignored).
const SECTION_HEADERS: &[&str] = &[
    "commands",
    "available commands",
    "subcommands",
    "available subcommands",
    "groups",
    "core commands",
    "management commands",
    "other commands",
    "additional commands",
];

#[derive(Debug, Clone, Copy)]
enum Scan {
    Outside,
    /// Inside a section; the column of its first row once seen.
    Inside { row_indent: Option<usize> },
}

/// Parse subcommand rows from help text, in order of first appearance.
///
/// A row is indented by at least 2 columns and sits at the section's row
/// indentation (deeper lines continue the previous description). Its first
/// token must look like a command name and be followed by a column gap:
/// 2+ spaces, a tab, or a name ending in `:` or `,` (`repo:`, `build, b`).
pub fn parse_subcommands(help_text: &str) -> Vec<DiscoveredSubcommand> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut scan = Scan::Outside;

    for line in help_text.lines() {
        let text = line.trim();
        if text.is_empty() {
            // Sections may contain blank gaps
            continue;
        }

        let indent = indent_width(line);
        if indent <= 1 && is_section_header(text) {
            scan = Scan::Inside { row_indent: None };
            continue;
        }

        let Scan::Inside { row_indent } = scan else {
            continue;
        };
        if indent == 0 {
            scan = Scan::Outside;
            continue;
        }
        if indent < 2 {
            continue;
        }
        match row_indent {
            Some(col) if indent > col => continue,
            Some(col) if indent == col => {}
            _ => scan = Scan::Inside { row_indent: Some(indent) },
        }

        let Some((name, description)) = split_row(text) else {
            continue;
        };
        if NOISE.contains(&name) || !seen.insert(name.to_string()) {
            continue;
        }
        found.push(DiscoveredSubcommand {
            name: name.to_string(),
            description: Some(description.to_string()).filter(|d| !d.is_empty()),
        });
    }

    found
}

/// Split a row into `(name, description)`; `None` for prose or flags.
fn split_row(text: &str) -> Option<(&str, &str)> {
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (token, rest) = text.split_at(end);

    let separated = token.ends_with(':') || token.ends_with(',');
    let name = token.trim_end_matches([':', ',']);
    if !is_command_name(name) {
        return None;
    }

    let description = rest.trim();
    if rest.is_empty() || separated || rest.starts_with('\t') {
        return Some((name, strip_aliases(token, description)));
    }
    let gap = rest.len() - rest.trim_start().len();
    (gap >= 2).then_some((name, description))
}

/// For `build, b    Compile` drop the alias list ahead of the description.
fn strip_aliases<'a>(token: &str, description: &'a str) -> &'a str {
    if !token.ends_with(',') {
        return description;
    }
    let mut rest = description;
    loop {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (alias, tail) = rest.split_at(end);
        rest = tail.trim_start();
        if !alias.ends_with(',') {
            return rest;
        }
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn is_section_header(text: &str) -> bool {
    let lower = text.trim_end_matches(':').to_lowercase();
    if SECTION_HEADERS.contains(&lower.as_str()) {
        return true;
    }
    text.ends_with(':') && lower.contains("command") && !lower.starts_with("usage")
}

/// `[a-zA-Z][a-zA-Z0-9_-]*`
fn is_command_name(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
