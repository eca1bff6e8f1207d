use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ProviderKind;
use crate::error::{ProviderError, Result};
use crate::process::{CommandOutput, CommandRunner, Invocation, spawn_error};

/// Conventional working branch for an item.
pub fn branch_name(provider: ProviderKind, id: &str) -> String {
    match provider {
        ProviderKind::Azure => format!("feature/task-{id}"),
        ProviderKind::Github | ProviderKind::Local => format!("feature/issue-{id}"),
    }
}

/// Parse `owner/repo` out of a GitHub remote url (https or ssh form).
pub fn parse_github_remote(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let path = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Thin wrapper over the git CLI, scoped to the project root.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
        }
    }

    async fn git<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new("git").args(args).current_dir(&self.root);
        self.runner
            .run(&invocation)
            .await
            .map_err(|err| spawn_error("git", err))
    }

    async fn git_checked<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let output = self.git(args).await?;
        if !output.success {
            return Err(ProviderError::Backend(format!(
                "git: {}",
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .git([
                "rev-parse".to_string(),
                "--verify".to_string(),
                "--quiet".to_string(),
                format!("refs/heads/{name}"),
            ])
            .await?;
        Ok(output.success)
    }

    pub async fn create_branch(&self, name: &str) -> Result<()> {
        self.git_checked(["checkout", "-b", name]).await?;
        Ok(())
    }

    /// Delete a local branch; git refuses unmerged branches.
    pub async fn delete_branch(&self, name: &str) -> Result<()> {
        self.git_checked(["branch", "-d", name]).await?;
        Ok(())
    }

    pub async fn delete_remote_branch(&self, name: &str) -> Result<()> {
        self.git_checked(["push", "origin", "--delete", name]).await?;
        Ok(())
    }

    pub async fn remote_url(&self) -> Option<String> {
        match self.git(["remote", "get-url", "origin"]).await {
            Ok(output) if output.success => {
                let url = output.stdout.trim();
                (!url.is_empty()).then(|| url.to_string())
            }
            _ => None,
        }
    }
}
