//! Fake executables for tests: shell scripts written into a temp dir that
//! print canned help text.

use std::path::{Path, PathBuf};

use crate::cli::discovery::{CrawlConfig, HelpCrawler};

/// A three-level tool: `fleet {deploy {canary, rollout}, status}`.
pub const FLEET_SCRIPT: &str = r#"#!/bin/sh
case "$*" in
  "--help")
    cat <<'EOF'
Usage: fleet [OPTIONS] <COMMAND>

Manage a fleet of servers.

Commands:
  deploy     Deploy a release
  status     Show fleet status

Options:
  -v, --verbose    Verbose output
EOF
    ;;
  "deploy --help")
    cat <<'EOF'
Usage: fleet deploy <COMMAND>

Deploy a release.

Commands:
  canary     Deploy to a slice of hosts
  rollout    Deploy everywhere
EOF
    ;;
  "deploy canary --help")
    printf 'Usage: fleet deploy canary [--percent N]\n\nDeploy to a slice of hosts.\n\nOptions:\n  --percent N    Share of hosts\n'
    ;;
  "deploy rollout --help")
    printf 'Usage: fleet deploy rollout\n\nDeploy everywhere.\n'
    ;;
  "status --help")
    printf 'Usage: fleet status [--json]\n\nShow fleet status.\n\nOptions:\n  --json    Machine-readable output\n'
    ;;
  status*)
    echo "all green"
    ;;
  *)
    echo "fleet: unknown command: $*" >&2
    exit 2
    ;;
esac
"#;

/// A runnable tool: `parrot say ARGS...` prints each argument on its own
/// line, `parrot fail` writes to stderr and exits 7, `parrot nap` sleeps.
pub const PARROT_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  --help)
    printf 'Usage: parrot [OPTIONS] <COMMAND>\n\nRepeat things back.\n\nCommands:\n  say     Print each argument on its own line\n  fail    Complain and exit 7\n  nap     Sleep for a while\n\nOptions:\n  -q, --quiet    Say less\n'
    ;;
  say)
    if [ "$2" = "--help" ]; then
      printf 'Usage: parrot say [--loud] [ARGS]...\n\nPrint each argument on its own line.\n'
      exit 0
    fi
    shift
    for arg in "$@"; do
      printf '%s\n' "$arg"
    done
    ;;
  fail)
    if [ "$2" = "--help" ]; then
      printf 'Usage: parrot fail\n\nComplain and exit 7.\n'
      exit 0
    fi
    echo "parrot: no crackers left" >&2
    exit 7
    ;;
  nap)
    if [ "$2" = "--help" ]; then
      printf 'Usage: parrot nap\n\nSleep for a while.\n'
      exit 0
    fi
    sleep 10
    ;;
  *)
    echo "parrot: unknown command: $*" >&2
    exit 2
    ;;
esac
"#;

/// Write an executable script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

/// A crawler that only resolves executables inside `dir`.
pub fn crawler_in(dir: &Path, config: CrawlConfig) -> HelpCrawler {
    HelpCrawler::new(CrawlConfig {
        search_path: vec![dir.to_path_buf()],
        ..config
    })
}
