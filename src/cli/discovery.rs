//! Recursive help crawler: walks a CLI tool's `--help` tree breadth-first
//! with bounded fan-out and builds a `CommandTree`.
//!
//! Every tier of the tree is crawled concurrently behind a semaphore, so total
//! latency follows depth rather than node count. The workers of one crawl share
//! a `CrawlBudget`: a visited-path set and a node counter. Hitting the depth
//! cap, a cycle, or the node budget truncates that branch and marks the node;
//! it never fails the crawl.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::cli::executable::resolve_executable;
use crate::cli::help_parser::{parse_help, ParsedHelp};
use crate::cli::process::{invoke, CapturedOutput, InvokeError};
use crate::error::CartographerError;
use crate::tree::{CommandNode, CommandTree, Truncation};

/// Default per-stream capture limit for help and run output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// A child path granted by the budget, with the description its parent listed for it.
struct ChildJob {
    path: Vec<String>,
    listed_summary: Option<String>,
}

/// Limits for a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Deepest level whose subcommands are expanded; the root is depth 0. Default: 5.
    pub max_depth: u8,
    /// Node budget for the whole crawl, root included. Default: 256.
    pub max_nodes: usize,
    /// Timeout per individual help subprocess. Default: 5s.
    pub help_timeout: Duration,
    /// Concurrent help invocations. Default: 8.
    pub concurrency: usize,
    /// Bytes kept per output stream of one help invocation. Default: 1 MiB.
    pub max_output_bytes: usize,
    /// Directories searched for the root executable instead of `$PATH` when non-empty.
    pub search_path: Vec<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_nodes: 256,
            help_timeout: Duration::from_secs(5),
            concurrency: 8,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            search_path: Vec::new(),
        }
    }
}

/// Outcome of trying to reserve a path in the crawl budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Granted,
    Visited,
    Exhausted,
}

/// Visited set and node counter shared by all workers of one crawl.
struct CrawlBudget {
    max_nodes: usize,
    claimed: AtomicUsize,
    visited: Mutex<HashSet<Vec<String>>>,
}

impl CrawlBudget {
    /// A budget with the root path already claimed.
    fn new(max_nodes: usize, root: &[String]) -> Self {
        Self {
            max_nodes,
            claimed: AtomicUsize::new(1),
            visited: Mutex::new(HashSet::from([root.to_vec()])),
        }
    }

    fn claim(&self, path: &[String]) -> Claim {
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        if visited.contains(path) {
            return Claim::Visited;
        }
        let reserved = self
            .claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_nodes).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return Claim::Exhausted;
        }
        visited.insert(path.to_vec());
        Claim::Granted
    }

    fn claimed(&self) -> usize {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Builds command trees by recursively interrogating `--help` output.
#[derive(Debug, Clone, Default)]
pub struct HelpCrawler {
    config: Arc<CrawlConfig>,
}

impl HelpCrawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl `root_name` and return its command tree.
    ///
    /// # Errors
    /// - `InvalidArgument` for malformed names (checked before anything runs)
    /// - `CommandNotFound` if the name is not an executable, cannot be started,
    ///   or its help invocation exits non-zero without any output
    /// - `TimedOut` if the root help invocation exceeds the timeout
    ///
    /// Failures below the root are recorded on the affected node instead.
    pub async fn crawl(&self, root_name: &str) -> crate::Result<CommandTree> {
        let executable = resolve_executable(root_name, &self.config.search_path)?;
        let started = Instant::now();
        let root_path = vec![root_name.to_string()];

        tracing::info!(
            command = %root_name,
            executable = %executable.display(),
            max_depth = %self.config.max_depth,
            max_nodes = %self.config.max_nodes,
            "starting help crawl"
        );

        let captured = match run_help(&executable, &[], &self.config).await {
            Ok(captured) => captured,
            Err(InvokeError::TimedOut(after)) => {
                return Err(CartographerError::TimedOut(
                    root_name.to_string(),
                    after.as_millis(),
                ));
            }
            Err(e) => {
                return Err(CartographerError::CommandNotFound(format!(
                    "'{}': {}",
                    root_name, e
                )));
            }
        };
        if captured.is_blank() && captured.exit_code != 0 {
            return Err(CartographerError::CommandNotFound(format!(
                "'{}' produced no help output (exit code {})",
                root_name, captured.exit_code
            )));
        }

        let budget = Arc::new(CrawlBudget::new(self.config.max_nodes, &root_path));
        let parsed = parse_help(captured.help_text());
        let (root, mut queue) =
            build_node(root_path.clone(), 0, &captured, parsed, &self.config, &budget);

        let mut arena: HashMap<Vec<String>, CommandNode> = HashMap::new();
        arena.insert(root_path.clone(), root);

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut depth: u8 = 1;

        while !queue.is_empty() {
            let tier: Vec<ChildJob> = std::mem::take(&mut queue);
            let mut paths = Vec::with_capacity(tier.len());
            let mut handles = Vec::with_capacity(tier.len());

            for job in tier {
                let executable = executable.clone();
                let config = self.config.clone();
                let budget = budget.clone();
                let sem = semaphore.clone();

                paths.push(job.path.clone());
                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await;
                    crawl_nested(&executable, job, depth, &config, &budget).await
                }));
            }

            let results = futures::future::join_all(handles).await;
            for (path, result) in paths.into_iter().zip(results) {
                let (node, children) = match result {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        tracing::warn!(
                            command = %root_name,
                            path = ?path,
                            error = %join_err,
                            "help crawl worker failed"
                        );
                        let mut node = CommandNode::new(path.clone());
                        node.incomplete = Some(Truncation::InvocationFailed {
                            reason: format!("worker failed: {}", join_err),
                        });
                        (node, Vec::new())
                    }
                };
                queue.extend(children);
                arena.insert(path, node);
            }

            depth = depth.saturating_add(1);
        }

        let root = assemble(arena, &root_path);

        tracing::info!(
            command = %root_name,
            nodes = %budget.claimed(),
            incomplete = %root.incomplete_count(),
            duration_ms = %started.elapsed().as_millis(),
            "help crawl complete"
        );

        Ok(CommandTree { executable, root })
    }
}

/// Crawl one node below the root. Never fails: problems become a `Truncation`.
///
/// A node whose own help yields no summary takes the description its parent listed.
async fn crawl_nested(
    executable: &Path,
    job: ChildJob,
    depth: u8,
    config: &CrawlConfig,
    budget: &CrawlBudget,
) -> (CommandNode, Vec<ChildJob>) {
    let ChildJob { path, listed_summary } = job;
    let failure = match run_help(executable, &path[1..], config).await {
        Ok(captured) if captured.is_blank() && captured.exit_code != 0 => {
            format!("no help output (exit code {})", captured.exit_code)
        }
        Ok(captured) => {
            let parsed = parse_help(captured.help_text());
            let unparsable = captured.exit_code != 0 && parsed.is_empty();
            let (mut node, children) = build_node(path, depth, &captured, parsed, config, budget);
            if unparsable {
                node.incomplete.get_or_insert(Truncation::Unparsable);
            }
            if node.summary.is_empty() {
                node.summary = listed_summary.unwrap_or_default();
            }
            return (node, children);
        }
        Err(e) => e.to_string(),
    };

    tracing::warn!(path = ?path, reason = %failure, "help invocation failed for subcommand path");
    let mut node = CommandNode::new(path);
    node.summary = listed_summary.unwrap_or_default();
    node.incomplete = Some(Truncation::InvocationFailed { reason: failure });
    (node, Vec::new())
}

/// Run `executable [subcommands...] --help`, retrying with `-h` when `--help`
/// exits non-zero without printing anything.
async fn run_help(
    executable: &Path,
    subcommands: &[String],
    config: &CrawlConfig,
) -> std::result::Result<CapturedOutput, InvokeError> {
    let mut args = subcommands.to_vec();
    args.push("--help".to_string());
    let captured = invoke(executable, &args, config.help_timeout, config.max_output_bytes).await?;
    if captured.exit_code == 0 || !captured.is_blank() {
        return Ok(captured);
    }

    if let Some(flag) = args.last_mut() {
        *flag = "-h".to_string();
    }
    invoke(executable, &args, config.help_timeout, config.max_output_bytes).await
}

/// Fill a node from captured help output and claim its children.
///
/// Returns the node (children still empty) and the child paths granted by the
/// budget, which the caller crawls in the next tier.
fn build_node(
    path: Vec<String>,
    depth: u8,
    captured: &CapturedOutput,
    parsed: ParsedHelp,
    config: &CrawlConfig,
    budget: &CrawlBudget,
) -> (CommandNode, Vec<ChildJob>) {
    let mut node = CommandNode::new(path);
    node.summary = parsed.summary;
    node.options = parsed.options;
    node.parameters = parsed.parameters;
    node.help_text = captured.help_text().to_string();
    if captured.truncated {
        tracing::debug!(path = ?node.path, limit = %config.max_output_bytes, "help output truncated");
        node.incomplete = Some(Truncation::OutputTruncated {
            limit: config.max_output_bytes,
        });
    }

    let mut children = Vec::new();
    for sub in parsed.subcommands {
        // A name already in the ancestor chain would loop forever
        if node.path.contains(&sub.name) {
            tracing::debug!(path = ?node.path, child = %sub.name, "cycle detected, child dropped");
            node.incomplete
                .get_or_insert(Truncation::CycleDetected { name: sub.name });
            continue;
        }

        if depth >= config.max_depth {
            tracing::debug!(path = ?node.path, "depth limit reached, subcommands dropped");
            node.incomplete.get_or_insert(Truncation::DepthExceeded);
            break;
        }

        let mut child_path = node.path.clone();
        child_path.push(sub.name);
        match budget.claim(&child_path) {
            Claim::Granted => children.push(ChildJob {
                path: child_path,
                listed_summary: sub.description,
            }),
            Claim::Visited => continue,
            Claim::Exhausted => {
                tracing::debug!(path = ?node.path, "node budget exhausted, subcommands dropped");
                node.incomplete.get_or_insert(Truncation::BudgetExhausted);
                break;
            }
        }
    }

    (node, children)
}

/// Link arena nodes into a tree, deepest first so each subtree is complete
/// before it moves into its parent.
fn assemble(mut arena: HashMap<Vec<String>, CommandNode>, root_path: &[String]) -> CommandNode {
    let mut paths: Vec<Vec<String>> = arena.keys().cloned().collect();
    paths.sort_by(|a, b| b.len().cmp(&a.len()));

    for path in paths {
        if path.len() <= root_path.len() {
            continue;
        }
        let Some(node) = arena.remove(&path) else {
            continue;
        };
        if let Some(parent) = arena.get_mut(&path[..path.len() - 1]) {
            parent.children.insert(node.name.clone(), node);
        }
    }

    arena
        .remove(root_path)
        .unwrap_or_else(|| CommandNode::new(root_path.to_vec()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{crawler_in, write_script, FLEET_SCRIPT};

    #[test]
    fn test_crawl_config_defaults() {
        let config = CrawlConfig::default();
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_nodes, 256);
        assert_eq!(config.help_timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_output_bytes, 1024 * 1024);
    }

    #[test]
    fn test_budget_claims() {
        let root = vec!["x".to_string()];
        let budget = CrawlBudget::new(3, &root);
        let a = vec!["x".to_string(), "a".to_string()];
        let b = vec!["x".to_string(), "b".to_string()];
        let c = vec!["x".to_string(), "c".to_string()];
        assert_eq!(budget.claim(&root), Claim::Visited);
        assert_eq!(budget.claim(&a), Claim::Granted);
        assert_eq!(budget.claim(&a), Claim::Visited);
        assert_eq!(budget.claim(&b), Claim::Granted);
        assert_eq!(budget.claim(&c), Claim::Exhausted);
        assert_eq!(budget.claimed(), 3);
    }

    #[tokio::test]
    async fn test_crawl_builds_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "fleet", FLEET_SCRIPT);

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("fleet")
            .await
            .unwrap();
        let root = &tree.root;
        assert_eq!(root.name, "fleet");
        assert_eq!(root.summary, "Manage a fleet of servers.");
        assert!(root.options.contains("--verbose"));
        assert!(root.options.contains("-v"));
        assert_eq!(
            root.children.keys().collect::<Vec<_>>(),
            vec!["deploy", "status"]
        );

        let deploy = &root.children["deploy"];
        assert_eq!(deploy.path, vec!["fleet", "deploy"]);
        assert_eq!(deploy.children.keys().collect::<Vec<_>>(), vec!["canary", "rollout"]);
        let canary = &deploy.children["canary"];
        assert!(canary.options.contains("--percent"));
        assert_eq!(canary.parameters.len(), 1);
        assert_eq!(canary.parameters[0].value.as_deref(), Some("N"));
        assert_eq!(canary.parameters[0].description, "Share of hosts");
        assert!(root.children["status"].options.contains("--json"));
        assert!(!root.parse_incomplete());
        assert_eq!(root.incomplete_count(), 0);
        assert_eq!(root.node_count(), 5);
    }

    #[tokio::test]
    async fn test_leaf_command_yields_single_node() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "solo",
            "#!/bin/sh\nprintf 'Usage: solo [-q]\\n\\nDo exactly one thing.\\n'\n",
        );

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("solo")
            .await
            .unwrap();
        assert!(tree.root.children.is_empty());
        assert!(!tree.root.parse_incomplete());
        assert!(tree.root.options.contains("-q"));
        assert_eq!(tree.root.summary, "Do exactly one thing.");
    }

    #[tokio::test]
    async fn test_crawl_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "fleet", FLEET_SCRIPT);
        let crawler = crawler_in(dir.path(), CrawlConfig::default());

        let first = crawler.crawl("fleet").await.unwrap();
        let second = crawler.crawl("fleet").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_self_listing_command_terminates() {
        let dir = tempfile::tempdir().unwrap();
        // Advertises itself and one other name at every level
        write_script(
            dir.path(),
            "ouroboros",
            "#!/bin/sh\nprintf 'Commands:\\n  ouroboros   Myself again\\n  again       Go round\\n'\n",
        );

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("ouroboros")
            .await
            .unwrap();
        let root = &tree.root;
        assert_eq!(
            root.incomplete,
            Some(Truncation::CycleDetected {
                name: "ouroboros".to_string()
            })
        );
        let again = &root.children["again"];
        assert!(again.children.is_empty());
        assert!(again.parse_incomplete());
        assert_eq!(root.node_count(), 2);
    }

    #[tokio::test]
    async fn test_ever_deeper_command_stops_at_depth_cap() {
        let dir = tempfile::tempdir().unwrap();
        // Each level advertises a fresh name derived from the argument count
        write_script(
            dir.path(),
            "abyss",
            "#!/bin/sh\nprintf 'Commands:\\n  level%s   Go deeper\\n' \"$#\"\n",
        );

        let config = CrawlConfig {
            max_depth: 3,
            ..Default::default()
        };
        let tree = crawler_in(dir.path(), config).crawl("abyss").await.unwrap();
        let deepest = tree
            .root
            .descend(&["level1".to_string(), "level2".to_string(), "level3".to_string()])
            .unwrap();
        assert!(deepest.children.is_empty());
        assert_eq!(deepest.incomplete, Some(Truncation::DepthExceeded));
        assert_eq!(tree.root.node_count(), 4);
    }

    #[tokio::test]
    async fn test_node_budget_truncates_branch() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "wide",
            "#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then\nprintf 'Commands:\\n  a   A\\n  b   B\\n  c   C\\n  d   D\\n  e   E\\n'\nelse\necho 'leaf command'\nfi\n",
        );

        let config = CrawlConfig {
            max_nodes: 3,
            ..Default::default()
        };
        let tree = crawler_in(dir.path(), config).crawl("wide").await.unwrap();
        assert_eq!(tree.root.node_count(), 3);
        assert_eq!(tree.root.incomplete, Some(Truncation::BudgetExhausted));
    }

    #[tokio::test]
    async fn test_nested_failures_are_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "flaky",
            r#"#!/bin/sh
case "$*" in
  "--help") printf 'Commands:\n  ok      Works\n  hang    Never returns\n  broken  Exits silently\n' ;;
  "ok --help") echo "Usage: flaky ok [--fast]" ;;
  "hang --help") sleep 10 ;;
  *) exit 3 ;;
esac
"#,
        );

        let config = CrawlConfig {
            help_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let tree = crawler_in(dir.path(), config).crawl("flaky").await.unwrap();
        let root = &tree.root;
        assert!(!root.parse_incomplete());
        assert!(!root.children["ok"].parse_incomplete());
        assert!(root.children["ok"].options.contains("--fast"));

        for name in ["hang", "broken"] {
            let node = &root.children[name];
            assert!(node.children.is_empty());
            assert!(
                matches!(node.incomplete, Some(Truncation::InvocationFailed { .. })),
                "{name} should be marked as a failed invocation"
            );
        }
    }

    #[tokio::test]
    async fn test_error_output_is_unparsable() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "grumpy",
            "#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then\nprintf 'Commands:\\n  sulk   Refuses\\n'\nelse\necho 'error: no' >&2; exit 2\nfi\n",
        );

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("grumpy")
            .await
            .unwrap();
        let sulk = &tree.root.children["sulk"];
        assert_eq!(sulk.incomplete, Some(Truncation::Unparsable));
        assert_eq!(sulk.help_text, "error: no\n");
    }

    #[tokio::test]
    async fn test_short_help_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "terse",
            "#!/bin/sh\nif [ \"$1\" = \"-h\" ]; then\necho 'usage: terse [-n]'\nelse\nexit 1\nfi\n",
        );

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("terse")
            .await
            .unwrap();
        assert!(tree.root.options.contains("-n"));
    }

    #[tokio::test]
    async fn test_flooding_help_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "flood",
            "#!/bin/sh\nprintf 'Usage: flood [-q]\\n\\nFloods the terminal.\\n\\n'\nyes xxxxxxxxxxxxxxx | head -c 5000000\n",
        );

        let config = CrawlConfig {
            max_output_bytes: 4096,
            ..Default::default()
        };
        let tree = crawler_in(dir.path(), config).crawl("flood").await.unwrap();
        let root = &tree.root;
        assert_eq!(root.help_text.len(), 4096);
        assert_eq!(root.summary, "Floods the terminal.");
        assert!(root.options.contains("-q"));
        assert_eq!(root.incomplete, Some(Truncation::OutputTruncated { limit: 4096 }));
    }

    #[tokio::test]
    async fn test_tier_runs_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        // Every child takes a second to print its help
        write_script(
            dir.path(),
            "sluggish",
            r#"#!/bin/sh
if [ "$1" = "--help" ]; then
  printf 'Commands:\n  a   A\n  b   B\n  c   C\n  d   D\n  e   E\n  f   F\n'
else
  sleep 1
  echo "Usage: sluggish $1"
fi
"#,
        );

        let start = Instant::now();
        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("sluggish")
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(tree.root.node_count(), 7);
        assert!(
            elapsed < Duration::from_secs(4),
            "six one-second children took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_failed_child_keeps_listed_description() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "patchy",
            "#!/bin/sh\nif [ \"$1\" = \"--help\" ]; then\nprintf 'Commands:\\n  gone   Vanished helper\\n'\nelse\nexit 4\nfi\n",
        );

        let tree = crawler_in(dir.path(), CrawlConfig::default())
            .crawl("patchy")
            .await
            .unwrap();
        let gone = &tree.root.children["gone"];
        assert!(matches!(gone.incomplete, Some(Truncation::InvocationFailed { .. })));
        assert_eq!(gone.summary, "Vanished helper");
    }

    #[tokio::test]
    async fn test_silent_failing_root_is_command_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "mute", "#!/bin/sh\nexit 1\n");

        let result = crawler_in(dir.path(), CrawlConfig::default()).crawl("mute").await;
        assert!(matches!(result, Err(CartographerError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn test_slow_root_times_out() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "sloth", "#!/bin/sh\nsleep 10\n");

        let config = CrawlConfig {
            help_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let result = crawler_in(dir.path(), config).crawl("sloth").await;
        assert!(matches!(result, Err(CartographerError::TimedOut(name, 300)) if name == "sloth"));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_roots() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler_in(dir.path(), CrawlConfig::default());
        assert!(matches!(
            crawler.crawl("cartographer-test-nonexistent-12345").await,
            Err(CartographerError::CommandNotFound(_))
        ));
        assert!(matches!(
            crawler.crawl("fleet; rm -rf /").await,
            Err(CartographerError::InvalidArgument(_))
        ));
    }

    #[cfg(feature = "integration-tests")]
    mod integration {
        use super::*;

        #[tokio::test]
        async fn test_real_git_crawl() {
            let config = CrawlConfig {
                max_depth: 1,
                ..Default::default()
            };
            let tree = HelpCrawler::new(config).crawl("git").await.unwrap();
            assert!(!tree.root.children.is_empty(), "git should have subcommands");
        }
    }
}
