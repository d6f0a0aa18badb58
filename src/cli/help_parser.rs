//! Help text parser: extracts the summary line, flag tokens and per-option
//! parameter rows from a CLI tool's --help output, and combines them with the
//! subcommand section parser into one `ParsedHelp`.
//!
//! Best-effort by nature: nothing here fails. Unrecognized layouts simply
//! yield fewer options.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::cli::subcommand_parser::{parse_subcommands, DiscoveredSubcommand};
use crate::tree::Parameter;

/// Everything recovered from one help text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHelp {
    pub summary: String,
    pub options: BTreeSet<String>,
    pub parameters: Vec<Parameter>,
    pub subcommands: Vec<DiscoveredSubcommand>,
}

impl ParsedHelp {
    /// True if neither options nor subcommands were recognized.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.subcommands.is_empty()
    }
}

/// Parse summary, options and subcommands from raw --help text.
pub fn parse_help(help_text: &str) -> ParsedHelp {
    ParsedHelp {
        summary: extract_summary(help_text),
        options: parse_flag_tokens(help_text),
        parameters: parse_parameters(help_text),
        subcommands: parse_subcommands(help_text),
    }
}

/// A flag token preceded by start-of-text or a separator, so that dashes
/// inside value placeholders (`FILE-NAME`) are not taken as flags.
fn flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s,/|\[(])(--?[a-zA-Z0-9][a-zA-Z0-9_-]*)").expect("valid regex")
    })
}

/// Bracketed groups in usage lines, e.g. `[-v | --version]` or `[-C <path>]`.
fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"))
}

/// A token that starts with a flag; the rest of it (`=PATH`, `[=<path>]`) is a value.
fn leading_flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^--?[a-zA-Z0-9][a-zA-Z0-9_-]*").expect("valid regex"))
}

fn required_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(required|mandatory)\b").expect("valid regex"))
}

/// `(default: 3)`, `[default: json]`, `(default "text")` or `Defaults to 10`.
fn default_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)[(\[]default[:=]?\s*([^)\]]+)[)\]]|\bdefaults to\s+([^\s,;]+)"#)
            .expect("valid regex")
    })
}

/// `[possible values: a, b]` or `choices: {a,b}`.
fn choices_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)possible values:\s*([^\]\n]+)|(?:choices|one of)[: ]+\{([^}]+)\}")
            .expect("valid regex")
    })
}

/// Extract the set of flag tokens (with leading dashes) from help text.
///
/// Recognizes:
/// - option rows: indented lines starting with `-`, where the flag column ends
///   at the first gap of two or more spaces (`-n, --namespace string   ...`)
/// - `--flag=VALUE` (recorded as `--flag`)
/// - bracketed flags in the usage block (`usage: git [-v | --version] [-C <path>]`)
pub fn parse_flag_tokens(help_text: &str) -> BTreeSet<String> {
    let mut options = BTreeSet::new();
    let mut in_usage = false;

    for line in help_text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            in_usage = false;
            continue;
        }
        if trimmed.to_lowercase().starts_with("usage:") {
            in_usage = true;
        }

        if in_usage {
            for group in bracket_re().captures_iter(trimmed) {
                collect_flags(&group[1], &mut options);
            }
            continue;
        }

        if trimmed.starts_with('-') {
            collect_flags(flag_column(trimmed), &mut options);
        }
    }

    options
}

/// The leading flag column of an option row, up to the description gap.
fn flag_column(trimmed: &str) -> &str {
    let gap = trimmed
        .find("  ")
        .into_iter()
        .chain(trimmed.find('\t'))
        .min()
        .unwrap_or(trimmed.len());
    &trimmed[..gap]
}

fn collect_flags(text: &str, options: &mut BTreeSet<String>) {
    for caps in flag_re().captures_iter(text) {
        options.insert(caps[1].to_string());
    }
}

/// Extract one `Parameter` per option row, in order of appearance.
///
/// The flag column yields the spellings and the value placeholder
/// (`--profile PROFILE_NAME`, `-n, --namespace string`, `--kubeconfig=PATH`);
/// the description column, plus any deeper-indented continuation lines,
/// yields the description, `required`, default and choices. Flags that only
/// appear in bracketed usage groups (`[-C <path>]`) are appended without a
/// description.
pub fn parse_parameters(help_text: &str) -> Vec<Parameter> {
    let mut rows: Vec<Parameter> = Vec::new();
    let mut from_usage: Vec<Parameter> = Vec::new();
    let mut in_usage = false;
    // Indentation of the last option row while its description may continue
    let mut open_row: Option<usize> = None;

    for line in help_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            in_usage = false;
            open_row = None;
            continue;
        }
        if trimmed.to_lowercase().starts_with("usage:") {
            in_usage = true;
        }
        if in_usage {
            for group in bracket_re().captures_iter(trimmed) {
                let (flags, value) = split_flag_column(&group[1]);
                if !flags.is_empty() {
                    from_usage.push(Parameter {
                        flags,
                        value,
                        ..Parameter::default()
                    });
                }
            }
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if trimmed.starts_with('-') {
            let column = flag_column(trimmed);
            let (flags, value) = split_flag_column(column);
            if flags.is_empty() {
                open_row = None;
                continue;
            }
            rows.push(Parameter {
                flags,
                value,
                description: trimmed[column.len()..].trim().to_string(),
                ..Parameter::default()
            });
            open_row = Some(indent);
            continue;
        }

        match (open_row, rows.last_mut()) {
            (Some(row_indent), Some(last)) if indent > row_indent => {
                if !last.description.is_empty() {
                    last.description.push(' ');
                }
                last.description.push_str(trimmed);
            }
            _ => open_row = None,
        }
    }

    for param in &mut rows {
        describe(param);
    }
    for param in from_usage {
        let known = rows
            .iter()
            .any(|row| row.flags.iter().any(|f| param.flags.contains(f)));
        if !known {
            rows.push(param);
        }
    }
    rows
}

/// Split a flag column into its flag spellings and the first value placeholder.
fn split_flag_column(column: &str) -> (Vec<String>, Option<String>) {
    let mut flags = Vec::new();
    let mut value = None;
    let tokens = column
        .split(|c: char| c.is_whitespace() || c == '|')
        .map(|t| t.trim_end_matches(','))
        .filter(|t| !t.is_empty());

    for token in tokens {
        if let Some(flag) = leading_flag_re().find(token) {
            flags.push(flag.as_str().to_string());
            let inline = token[flag.end()..].trim_matches(|c| matches!(c, '[' | ']' | '='));
            if !inline.is_empty() {
                value.get_or_insert_with(|| inline.to_string());
            }
        } else if !flags.is_empty() {
            value.get_or_insert_with(|| token.to_string());
        }
    }
    (flags, value)
}

/// Fill `required`, `default` and `choices` from the value and description.
fn describe(param: &mut Parameter) {
    let description = param.description.as_str();
    param.required = required_re().is_match(description);

    param.default = default_re().captures(description).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().trim_end_matches('.').trim_matches('"').to_string())
    });

    let braced = param
        .value
        .as_deref()
        .and_then(|v| v.strip_prefix('{'))
        .and_then(|v| v.strip_suffix('}'));
    let listed = braced.or_else(|| {
        choices_re()
            .captures(description)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
    });
    param.choices = listed
        .map(|list| {
            list.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();
}

/// Pick a one-line summary: the first paragraph that is not a usage block,
/// a section header, or a separator rule, falling back to the first paragraph.
pub fn extract_summary(help_text: &str) -> String {
    let paragraphs: Vec<&str> = help_text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let chosen = paragraphs
        .iter()
        .find(|p| {
            let first = p.lines().next().unwrap_or("").trim();
            !first.to_lowercase().starts_with("usage:")
                && !first.ends_with(':')
                && !first.chars().all(|c| matches!(c, '-' | '=' | '_'))
        })
        .or_else(|| paragraphs.first());

    chosen
        .and_then(|p| p.lines().next())
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}
