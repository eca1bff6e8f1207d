//! Append-only JSON-lines log of mutating commands.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CONFIG_DIR, ProviderKind};
use crate::model::IssueState;

pub const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderKind,
    pub command: String,
    pub id: String,
    pub status: IssueState,
    pub url: String,
    pub dry_run: bool,
}

pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(CONFIG_DIR).join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Most recent `limit` entries, oldest first. Unparseable lines are skipped.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };

        let entries: Vec<HistoryEntry> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(line = index + 1, error = %err, "skipping malformed history line");
                    None
                }
            })
            .collect();

        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            provider: ProviderKind::Github,
            command: "issue-close".to_string(),
            id: id.to_string(),
            status: IssueState::Closed,
            url: format!("https://github.com/acme/widgets/issues/{id}"),
            dry_run: false,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        assert!(history.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_append_then_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        for id in ["1", "2", "3"] {
            history.append(&entry(id)).unwrap();
        }

        let recent = history.recent(2).unwrap();
        let ids: Vec<_> = recent.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(history.path().ends_with(".claude/history.jsonl"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        history.append(&entry("1")).unwrap();
        let mut file = OpenOptions::new().append(true).open(history.path()).unwrap();
        writeln!(file, "{{ garbage").unwrap();
        history.append(&entry("2")).unwrap();

        assert_eq!(history.recent(10).unwrap().len(), 2);
    }
}
