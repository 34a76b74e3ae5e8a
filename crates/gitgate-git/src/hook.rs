//! Server-side push hook
//!
//! Every repository gets a `post-receive` hook that appends one block per push
//! to `push.log` in the repository directory. Git runs it with the repository
//! as working directory and feeds `<old-id> <new-id> <ref-name>` lines on
//! stdin. The hook must exit 0, so it never validates its input.

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hook run after refs are updated, before success is reported to the client
pub const POST_RECEIVE: &str = "post-receive";

/// Environment variable carrying the pusher identity
pub const PUSHER_ENV: &str = "PUSHER_NAME";

/// Log file written by the hook, relative to the repository path
pub const PUSH_LOG_FILE: &str = "push.log";

/// The block is built in memory and appended with a single write.
const POST_RECEIVE_SCRIPT: &str = r##"#!/usr/bin/env bash
# Installed by gitgate: records every push in push.log
set -euo pipefail

REPO_DIR="$(pwd)"
LOG_FILE="$REPO_DIR/push.log"
PUSHER="${PUSHER_NAME:-unknown}"
TS="$(date -u +"%Y-%m-%dT%H:%M:%SZ")"

BLOCK="=== PUSH ===
time_utc=$TS
pusher=$PUSHER
repo=$REPO_DIR
updates:"

while read -r oldrev newrev refname || [ -n "${oldrev:-}" ]; do
  BLOCK="$BLOCK
  $refname $oldrev -> $newrev"
done

printf '%s\n\n' "$BLOCK" >> "$LOG_FILE"
"##;

/// Write the post-receive hook into `repo_path/hooks`, replacing any existing one.
pub fn install(repo_path: &Path) -> Result<PathBuf> {
    let hooks_dir = repo_path.join("hooks");
    fs::create_dir_all(&hooks_dir)?;

    let hook_path = hooks_dir.join(POST_RECEIVE);
    fs::write(&hook_path, POST_RECEIVE_SCRIPT)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o755);
        fs::set_permissions(&hook_path, perms)?;
    }

    debug!("Installed {} hook at {}", POST_RECEIVE, hook_path.display());
    Ok(hook_path)
}
