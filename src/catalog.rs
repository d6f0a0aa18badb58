//! CommandCatalog exposes the client operations: add a command by
//! crawling its help tree, query stored nodes, run stored commands, and list
//! or read node resources.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cli::discovery::{CrawlConfig, HelpCrawler};
use crate::config::CartographerConfig;
use crate::runner::{CommandRunner, RunConfig, RunOutput};
use crate::store::{DefinitionStore, ResourceNotifier};
use crate::tree::{parse_command_path, parse_resource_uri, CommandNode, CommandTree, ResourceDescriptor};

/// Result of a successful `add`.
#[derive(Debug, Clone, Serialize)]
pub struct AddSummary {
    pub root: String,
    pub version: u64,
    pub nodes: usize,
    pub incomplete_nodes: usize,
    pub tree: CommandTree,
}

pub struct CommandCatalog {
    crawler: HelpCrawler,
    store: Arc<DefinitionStore>,
    runner: CommandRunner,
}

impl CommandCatalog {
    pub fn new(crawl: CrawlConfig, run: RunConfig, notifier: Arc<dyn ResourceNotifier>) -> Self {
        let store = Arc::new(DefinitionStore::new(notifier));
        Self {
            crawler: HelpCrawler::new(crawl),
            runner: CommandRunner::new(store.clone(), run),
            store,
        }
    }

    pub fn from_config(config: &CartographerConfig, notifier: Arc<dyn ResourceNotifier>) -> Self {
        Self::new(config.crawl_config(), config.run_config(), notifier)
    }

    pub fn store(&self) -> &Arc<DefinitionStore> {
        &self.store
    }

    /// Crawl `cmd` and store its tree, replacing any previous tree for the same root.
    pub async fn add(&self, cmd: &str) -> crate::Result<AddSummary> {
        let root = cmd.trim();
        let tree = self.crawler.crawl(root).await?;
        let version = self.store.put(root, tree.clone()).await?;

        Ok(AddSummary {
            root: root.to_string(),
            version,
            nodes: tree.root.node_count(),
            incomplete_nodes: tree.root.incomplete_count(),
            tree,
        })
    }

    /// The stored subtree for a path written as `git remote`, `git/remote` or `cli://git/remote`.
    pub async fn help(&self, cmd: &str) -> crate::Result<CommandNode> {
        let path = parse_command_path(cmd)?;
        self.store.resolve(&path).await
    }

    /// Run a stored command path with literal arguments.
    pub async fn run(&self, cmd: &str, args: Option<Vec<String>>) -> crate::Result<RunOutput> {
        let path = parse_command_path(cmd)?;
        self.runner.run(&path, args).await
    }

    pub async fn list_resources(&self) -> Vec<ResourceDescriptor> {
        self.store.list().await
    }

    /// Rendered subtree text for one `cli://` URI.
    pub async fn read_resource(&self, uri: &str) -> crate::Result<String> {
        let path = parse_resource_uri(uri)?;
        Ok(self.store.resolve(&path).await?.render())
    }

    /// Add each command, logging failures instead of returning them.
    /// Returns how many were added.
    pub async fn preload(&self, commands: &[String]) -> usize {
        let mut added = 0;
        for cmd in commands {
            let start = Instant::now();
            match self.add(cmd).await {
                Ok(summary) => {
                    added += 1;
                    tracing::info!(
                        command = %summary.root,
                        nodes = %summary.nodes,
                        incomplete = %summary.incomplete_nodes,
                        duration_ms = %start.elapsed().as_millis(),
                        "preloaded command"
                    );
                }
                Err(e) => {
                    tracing::warn!(command = %cmd, error = %e, "failed to preload command");
                }
            }
        }
        added
    }
}
