//! Cartographer: maps command-line tools into queryable command trees.
//! Crawls a tool's `--help` output recursively, keeps one tree per root
//! command, runs stored commands with literal arguments, and serves all of
//! it over MCP as tools plus `cli://` resources.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod standalone;
pub mod store;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use catalog::{AddSummary, CommandCatalog};
pub use cli::discovery::{CrawlConfig, HelpCrawler};
pub use cli::executable::{resolve_executable, validate_root_name};
pub use cli::help_parser::{parse_help, ParsedHelp};
pub use config::{CartographerConfig, CrawlSection, RunSection};
pub use error::{CartographerError, Result};
pub use runner::{CommandRunner, RunConfig, RunOutput};
pub use standalone::notify::{PeerList, PeerNotifier};
pub use standalone::server::CartographerMcpServer;
pub use store::{DefinitionStore, NoopNotifier, ResourceChange, ResourceNotifier, StoredTree};
pub use tree::{
    parse_command_path, parse_resource_uri, CommandNode, CommandTree, Parameter,
    ResourceDescriptor, Truncation,
};
