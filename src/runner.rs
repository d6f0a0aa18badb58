//! CommandRunner: executes a stored command path with caller arguments.
//!
//! Arguments are passed as a literal argv vector after the subcommand path,
//! never through a shell, so metacharacters reach the program untouched.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::discovery::DEFAULT_MAX_OUTPUT_BYTES;
use crate::cli::process::{invoke, InvokeError};
use crate::error::CartographerError;
use crate::store::DefinitionStore;

/// Runtime knobs for command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Wall-clock limit for one run; the child is killed when it elapses.
    pub timeout: Duration,
    /// Reject flag arguments the resolved node never advertised.
    pub strict_options: bool,
    /// Bytes kept per output stream; the rest is discarded.
    pub max_output_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            strict_options: false,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Result of a finished run. A non-zero exit is still a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Command path that ran, space-joined.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// True if stdout or stderr went past `max_output_bytes` and was cut.
    pub truncated: bool,
}

impl RunOutput {
    /// Convert a non-zero exit into `CommandFailed`.
    pub fn ensure_success(self) -> crate::Result<Self> {
        if self.exit_code == 0 {
            Ok(self)
        } else {
            Err(CartographerError::CommandFailed(
                self.command,
                self.exit_code,
                self.stderr.trim().to_string(),
            ))
        }
    }
}

pub struct CommandRunner {
    store: Arc<DefinitionStore>,
    config: RunConfig,
}

impl CommandRunner {
    pub fn new(store: Arc<DefinitionStore>, config: RunConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `path` (root name first) with `args`.
    ///
    /// # Errors
    /// - `CommandNotFound` if the path is not in the store (nothing is spawned)
    /// - `UnknownOption` in strict mode for an unadvertised flag
    /// - `TimedOut` if the process outlives the configured timeout
    /// - `Spawn` if the process could not be started or read
    pub async fn run(&self, path: &[String], args: Option<Vec<String>>) -> crate::Result<RunOutput> {
        let command = path.join(" ");
        let (executable, node) = self
            .store
            .resolve_with_tree(path)
            .await
            .map_err(|e| CartographerError::CommandNotFound(e.to_string()))?;

        let args = args.unwrap_or_default();
        if self.config.strict_options {
            if let Some(flag) = find_unknown_option(&args, &node.options) {
                return Err(CartographerError::UnknownOption(command, flag.to_string()));
            }
        }

        let mut argv: Vec<String> = path[1..].to_vec();
        argv.extend(args);

        let start = Instant::now();
        let limit = self.config.max_output_bytes;
        let output = invoke(&executable, &argv, self.config.timeout, limit)
            .await
            .map_err(|e| match e {
                InvokeError::TimedOut(after) => {
                    CartographerError::TimedOut(command.clone(), after.as_millis())
                }
                other => CartographerError::Spawn(command.clone(), other.to_string()),
            })?;

        tracing::info!(
            command = %command,
            args = ?&argv[path.len() - 1..],
            exit_code = %output.exit_code,
            duration_ms = %start.elapsed().as_millis(),
            "command run"
        );
        if output.truncated {
            tracing::warn!(
                command = %command,
                limit = %limit,
                "command output truncated"
            );
        }
        if !output.stderr.is_empty() {
            tracing::debug!(command = %command, stderr = %output.stderr, "command stderr");
        }

        Ok(RunOutput {
            command,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            truncated: output.truncated,
        })
    }
}

/// First flag-syntax argument not covered by `known`, if any.
///
/// Stops at a bare `--`. `-` alone and negative numbers are positional.
/// `--flag=value` is checked as `--flag`; bundled short flags like `-abc`
/// pass when `-abc` itself or each of `-a`, `-b`, `-c` is known.
fn find_unknown_option<'a>(args: &'a [String], known: &BTreeSet<String>) -> Option<&'a str> {
    for arg in args {
        if arg == "--" {
            break;
        }
        if !arg.starts_with('-') || arg == "-" || arg.parse::<f64>().is_ok() {
            continue;
        }

        let flag = arg.split_once('=').map_or(arg.as_str(), |(flag, _)| flag);
        if known.contains(flag) {
            continue;
        }

        let bundled = !flag.starts_with("--")
            && flag.len() > 2
            && flag[1..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() && known.contains(&format!("-{}", c)));
        if !bundled {
            return Some(arg);
        }
    }
    None
}
