//! Command tree model: nodes discovered by a crawl, the resource
//! descriptors derived from them, and the plain-text rendering served as
//! resource content.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CartographerError;

/// URI scheme for command resources.
pub const URI_SCHEME: &str = "cli://";

/// MIME type of every command resource.
pub const MIME_TYPE: &str = "text/plain";

/// Why a node's discovery stopped short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Truncation {
    /// The node sits at the depth cap but advertised subcommands.
    DepthExceeded,
    /// The node advertised a subcommand already present in its ancestor chain.
    CycleDetected { name: String },
    /// The crawl-wide node budget ran out before all children were added.
    BudgetExhausted,
    /// The help invocation timed out, failed to spawn, or produced nothing.
    InvocationFailed { reason: String },
    /// The help invocation exited non-zero and nothing could be parsed from it.
    Unparsable,
    /// The help output was cut at `limit` bytes before parsing.
    OutputTruncated { limit: usize },
}

/// One option row recovered from help text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Every spelling of the option, e.g. `["-n", "--namespace"]`.
    pub flags: Vec<String>,
    /// Value placeholder or type as written, e.g. `PROFILE_NAME`, `<path>`, `string`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// One node of a discovered command hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNode {
    pub name: String,
    /// Names from the tree root to this node, root first.
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub help_text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, CommandNode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub options: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<Truncation>,
}

impl CommandNode {
    /// A node with no help text, children or options yet.
    pub fn new(path: Vec<String>) -> Self {
        let name = path.last().cloned().unwrap_or_default();
        Self {
            name,
            path,
            summary: String::new(),
            help_text: String::new(),
            children: BTreeMap::new(),
            options: BTreeSet::new(),
            parameters: Vec::new(),
            incomplete: None,
        }
    }

    /// True if discovery of this node was truncated or failed.
    pub fn parse_incomplete(&self) -> bool {
        self.incomplete.is_some()
    }

    /// Follow `rest` through `children`, starting at this node.
    pub fn descend(&self, rest: &[String]) -> Option<&CommandNode> {
        let mut node = self;
        for name in rest {
            node = node.children.get(name)?;
        }
        Some(node)
    }

    /// Visit this node and all descendants depth-first, children in name order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a CommandNode)) {
        visit(self);
        for child in self.children.values() {
            child.walk(visit);
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Number of nodes in this subtree marked incomplete.
    pub fn incomplete_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if node.parse_incomplete() {
                count += 1;
            }
        });
        count
    }

    /// Resource descriptor addressing this node.
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::for_path(&self.path)
    }

    /// Compare everything except the subtrees below the children.
    pub(crate) fn same_content(&self, other: &CommandNode) -> bool {
        self.summary == other.summary
            && self.help_text == other.help_text
            && self.options == other.options
            && self.parameters == other.parameters
            && self.incomplete == other.incomplete
            && self.children.keys().eq(other.children.keys())
    }

    /// Render this subtree as indented plain text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{}{}", indent, self.name);
        if !self.summary.is_empty() {
            let _ = write!(out, " - {}", self.summary);
        }
        if let Some(reason) = &self.incomplete {
            let _ = write!(out, " [incomplete: {}]", describe_truncation(reason));
        }
        out.push('\n');
        if depth == 0 && !self.options.is_empty() {
            let flags: Vec<&str> = self.options.iter().map(String::as_str).collect();
            let _ = writeln!(out, "  options: {}", flags.join(" "));
        }
        for child in self.children.values() {
            child.render_into(out, depth + 1);
        }
    }
}

fn describe_truncation(reason: &Truncation) -> String {
    match reason {
        Truncation::DepthExceeded => "depth limit reached".to_string(),
        Truncation::CycleDetected { name } => format!("cycle via '{}'", name),
        Truncation::BudgetExhausted => "node budget exhausted".to_string(),
        Truncation::InvocationFailed { reason } => format!("help failed: {}", reason),
        Truncation::Unparsable => "help output not parseable".to_string(),
        Truncation::OutputTruncated { limit } => format!("help output cut at {} bytes", limit),
    }
}

/// A crawled tree together with the executable it was crawled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTree {
    /// Absolute path resolved for the root command at crawl time.
    pub executable: PathBuf,
    pub root: CommandNode,
}

impl CommandTree {
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// Every node's descriptor in depth-first order.
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        let mut out = Vec::new();
        self.root.walk(&mut |node| out.push(node.descriptor()));
        out
    }
}

/// Queryable view of one command node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
}

impl ResourceDescriptor {
    pub fn for_path(path: &[String]) -> Self {
        Self {
            uri: format!("{}{}", URI_SCHEME, path.join("/")),
            name: path.join(" "),
            mime_type: MIME_TYPE.to_string(),
        }
    }
}

/// Parse a command path written as `cli://git/remote`, `git/remote` or `git remote`.
pub fn parse_command_path(input: &str) -> crate::Result<Vec<String>> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix(URI_SCHEME).unwrap_or(trimmed);
    let path: Vec<String> = body
        .split(|c: char| c == '/' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if path.is_empty() {
        return Err(CartographerError::InvalidArgument(format!(
            "empty command path: '{}'",
            input
        )));
    }
    Ok(path)
}

/// Parse a resource URI, rejecting any scheme other than `cli://`.
pub fn parse_resource_uri(uri: &str) -> crate::Result<Vec<String>> {
    if !uri.starts_with(URI_SCHEME) {
        return Err(CartographerError::InvalidArgument(format!(
            "unsupported URI scheme: '{}'",
            uri
        )));
    }
    parse_command_path(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn sample_tree() -> CommandNode {
        let mut root = CommandNode::new(path(&["git"]));
        root.summary = "the stupid content tracker".to_string();
        root.options.insert("--version".to_string());
        let mut remote = CommandNode::new(path(&["git", "remote"]));
        remote
            .children
            .insert("add".into(), CommandNode::new(path(&["git", "remote", "add"])));
        let mut status = CommandNode::new(path(&["git", "status"]));
        status.incomplete = Some(Truncation::Unparsable);
        root.children.insert("status".into(), status);
        root.children.insert("remote".into(), remote);
        root
    }

    #[test]
    fn test_descriptor_uri_scheme() {
        let d = ResourceDescriptor::for_path(&path(&["git", "remote", "add"]));
        assert_eq!(d.uri, "cli://git/remote/add");
        assert_eq!(d.name, "git remote add");
        assert_eq!(d.mime_type, "text/plain");
    }

    #[test]
    fn test_walk_is_depth_first_in_name_order() {
        let root = sample_tree();
        let mut seen = Vec::new();
        root.walk(&mut |n| seen.push(n.path.join(" ")));
        assert_eq!(seen, vec!["git", "git remote", "git remote add", "git status"]);
        assert_eq!(root.node_count(), 4);
        assert_eq!(root.incomplete_count(), 1);
    }

    #[test]
    fn test_descend() {
        let root = sample_tree();
        let add = root.descend(&path(&["remote", "add"])).unwrap();
        assert_eq!(add.name, "add");
        assert!(root.descend(&path(&["remote", "rm"])).is_none());
        assert_eq!(root.descend(&[]).unwrap().name, "git");
    }

    #[test]
    fn test_render_indents_children_and_marks_incomplete() {
        let text = sample_tree().render();
        assert!(text.starts_with("git - the stupid content tracker\n"));
        assert!(text.contains("  options: --version\n"));
        assert!(text.contains("\n  remote\n    add\n"));
        assert!(text.contains("  status [incomplete: help output not parseable]"));
    }

    #[test]
    fn test_parse_command_path_forms() {
        let expected = path(&["git", "remote", "add"]);
        assert_eq!(parse_command_path("git remote add").unwrap(), expected);
        assert_eq!(parse_command_path("git/remote/add").unwrap(), expected);
        assert_eq!(parse_command_path("cli://git/remote/add").unwrap(), expected);
        assert!(matches!(
            parse_command_path("  "),
            Err(CartographerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_resource_uri_rejects_other_schemes() {
        assert!(matches!(
            parse_resource_uri("file:///etc/passwd"),
            Err(CartographerError::InvalidArgument(_))
        ));
        assert_eq!(parse_resource_uri("cli://git").unwrap(), path(&["git"]));
    }

    #[test]
    fn test_serializes_truncation_kind() {
        let mut node = CommandNode::new(path(&["loop"]));
        node.incomplete = Some(Truncation::CycleDetected { name: "loop".into() });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["incomplete"]["kind"], "cycle_detected");
        assert_eq!(json["incomplete"]["name"], "loop");
        assert!(json.get("children").is_none());
    }
}
