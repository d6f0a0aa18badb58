//! Process invocation: spawns an executable with a literal argv (never a
//! shell), drains stdout and stderr concurrently, and kills the child when
//! the timeout elapses. Each stream keeps at most `max_output_bytes`; the
//! rest is read and discarded so the child never blocks on a full pipe.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Output captured from a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was terminated by a signal.
    pub exit_code: i32,
    /// True if either stream went past the byte limit and was cut.
    pub truncated: bool,
}

impl CapturedOutput {
    /// Help text: stdout, falling back to stderr (many CLIs write help to stderr).
    pub fn help_text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }

    /// True if neither stream carried any non-whitespace output.
    pub fn is_blank(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

/// Why an invocation produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The timeout elapsed; the child was killed.
    TimedOut(Duration),
    /// The executable could not be started.
    Spawn(String),
    /// Reading the pipes or waiting on the child failed.
    Io(String),
}

impl std::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeError::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
            InvokeError::Spawn(e) => write!(f, "failed to spawn: {}", e),
            InvokeError::Io(e) => write!(f, "process I/O error: {}", e),
        }
    }
}

/// Run `program args...` and capture its output.
///
/// Stdin is closed so interactive prompts fail fast instead of hanging until
/// the timeout. On timeout the child is killed (not just the future dropped).
pub async fn invoke(
    program: &Path,
    args: &[String],
    timeout: Duration,
    max_output_bytes: usize,
) -> std::result::Result<CapturedOutput, InvokeError> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| InvokeError::Spawn(e.to_string()))?;

    // Take pipes so `child` stays borrowable for kill()
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let (stdout, stderr, status) = tokio::select! {
        result = async {
            let (stdout, stderr) = tokio::try_join!(
                read_capped(stdout_pipe, max_output_bytes),
                read_capped(stderr_pipe, max_output_bytes),
            )?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((stdout, stderr, status))
        } => result.map_err(|e| InvokeError::Io(e.to_string()))?,
        _ = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            return Err(InvokeError::TimedOut(timeout));
        }
    };

    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout.0).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.0).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        truncated: stdout.1 || stderr.1,
    })
}

/// Keep the first `limit` bytes of `pipe` and discard the rest.
/// Returns the kept bytes and whether anything was discarded.
async fn read_capped<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    limit: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    let Some(mut pipe) = pipe else {
        return Ok((kept, false));
    };
    (&mut pipe).take(limit as u64).read_to_end(&mut kept).await?;
    let discarded = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok((kept, discarded > 0))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    const LIMIT: usize = 64 * 1024;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let out = invoke(
            Path::new("/bin/sh"),
            &sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(5),
            LIMIT,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn test_output_past_limit_is_cut_and_drained() {
        let out = invoke(
            Path::new("/bin/sh"),
            &sh("yes xxxxxxxx | head -c 2000000; echo done >&2"),
            Duration::from_secs(10),
            1000,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.len(), 1000);
        assert_eq!(out.stderr, "done\n");
        assert_eq!(out.exit_code, 0);
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let start = Instant::now();
        let result = invoke(
            Path::new("/bin/sh"),
            &sh("sleep 10"),
            Duration::from_millis(200),
            LIMIT,
        )
        .await;
        assert_eq!(result, Err(InvokeError::TimedOut(Duration::from_millis(200))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = invoke(
            Path::new("/nonexistent/cartographer-test-binary"),
            &[],
            Duration::from_secs(1),
            LIMIT,
        )
        .await;
        assert!(matches!(result, Err(InvokeError::Spawn(_))));
    }

    #[test]
    fn test_help_text_falls_back_to_stderr() {
        let out = CapturedOutput {
            stdout: "  \n".to_string(),
            stderr: "usage: tool".to_string(),
            exit_code: 1,
            truncated: false,
        };
        assert_eq!(out.help_text(), "usage: tool");
        assert!(!out.is_blank());
    }
}
