//! Help crawling for command-line tools.
//!
//! A root command name is validated and resolved to an executable, its
//! `--help` output is captured with timeout-kill semantics (never through a
//! shell), and the text is parsed for a summary, option flags and
//! subcommands. `discovery` drives the recursion over the whole tree.

pub mod discovery;
pub mod executable;
pub mod help_parser;
pub mod process;
pub mod subcommand_parser;

pub use discovery::{CrawlConfig, HelpCrawler};
pub use executable::{resolve_executable, validate_root_name};
pub use help_parser::{parse_help, ParsedHelp};
pub use subcommand_parser::{parse_subcommands, DiscoveredSubcommand};
