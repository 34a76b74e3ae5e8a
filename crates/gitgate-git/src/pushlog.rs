//! Structured view of `push.log`
//!
//! The log is a sequence of blocks written by the post-receive hook:
//!
//! ```text
//! === PUSH ===
//! time_utc=2024-05-01T12:00:00Z
//! pusher=alice
//! repo=/srv/repos/gov/portal.git
//! updates:
//!   refs/heads/main 0000000000000000000000000000000000000000 -> 3f78...
//!
//! ```
//!
//! Parsing is lenient: the hook writes malformed input through as-is, so
//! unrecognised lines are skipped instead of failing the whole log.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// First line of every block
pub const BLOCK_MARKER: &str = "=== PUSH ===";

/// A single ref transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefUpdate {
    pub ref_name: String,
    pub old_id: String,
    pub new_id: String,
}

impl RefUpdate {
    /// Parse `<ref-name> <old-id> -> <new-id>`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let ref_name = parts.next()?;
        let old_id = parts.next()?;
        if parts.next()? != "->" {
            return None;
        }
        let new_id = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            ref_name: ref_name.to_string(),
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
        })
    }

    /// Ref did not exist before the push
    pub fn is_create(&self) -> bool {
        is_zero_id(&self.old_id)
    }

    /// Ref was removed by the push
    pub fn is_delete(&self) -> bool {
        is_zero_id(&self.new_id)
    }
}

fn is_zero_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b == b'0')
}

/// One push transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushLogEntry {
    /// `None` when the timestamp line is missing or unparsable
    pub time_utc: Option<DateTime<Utc>>,
    pub pusher: String,
    pub repo: String,
    pub updates: Vec<RefUpdate>,
}

impl PushLogEntry {
    fn empty() -> Self {
        Self {
            time_utc: None,
            pusher: String::new(),
            repo: String::new(),
            updates: Vec::new(),
        }
    }
}

/// Parse every block in a log, oldest first.
pub fn parse_push_log(text: &str) -> Vec<PushLogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PushLogEntry> = None;

    for line in text.lines() {
        if line.trim_end() == BLOCK_MARKER {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(PushLogEntry::empty());
            continue;
        }

        // Anything before the first marker is not ours
        let Some(entry) = current.as_mut() else {
            continue;
        };

        if let Some(ts) = line.strip_prefix("time_utc=") {
            entry.time_utc = DateTime::parse_from_rfc3339(ts.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc));
        } else if let Some(pusher) = line.strip_prefix("pusher=") {
            entry.pusher = pusher.to_string();
        } else if let Some(repo) = line.strip_prefix("repo=") {
            entry.repo = repo.to_string();
        } else if line.starts_with("  ") {
            if let Some(update) = RefUpdate::parse(line) {
                entry.updates.push(update);
            }
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }

    entries
}
