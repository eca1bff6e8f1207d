//! The issue-provider seam and the branch sub-steps shared by adapters.

pub mod azure;
pub mod dry_run;
pub mod github;

use async_trait::async_trait;

use crate::config::ProviderKind;
use crate::error::{ProviderError, Result};
use crate::git::Git;
use crate::model::{ActionLog, CloseOptions, CloseOutcome, ShowResult, StartOptions, StartOutcome};

pub use azure::AzureProvider;
pub use dry_run::DryRunProvider;
pub use github::GithubProvider;

/// One backend's implementation of the issue commands.
///
/// `show` is a pure read. `close` and `start` perform one mandatory state
/// transition, whose failure is returned as an error, followed by
/// best-effort sub-steps recorded in the returned [`ActionLog`].
#[async_trait]
pub trait IssueProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn show(&self, id: &str) -> Result<ShowResult>;

    async fn close(&self, id: &str, options: &CloseOptions) -> Result<CloseOutcome>;

    async fn start(&self, id: &str, options: &StartOptions) -> Result<StartOutcome>;
}

/// Parse a provider-native numeric id (`42` or `#42`).
pub(crate) fn parse_numeric_id(id: &str) -> Result<u64> {
    let trimmed = id.trim().trim_start_matches('#');
    match trimmed.parse::<u64>() {
        Ok(0) | Err(_) => Err(ProviderError::InvalidId {
            id: id.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
        Ok(n) => Ok(n),
    }
}

/// Delete the local and remote working branch, recording each outcome.
pub(crate) async fn delete_branch_steps(git: &Git, branch: &str, log: &mut ActionLog) {
    let remote_skip = match git.branch_exists(branch).await {
        Ok(true) => log
            .record(
                format!("Deleted local branch {branch}"),
                git.delete_branch(branch).await,
            )
            .map_or(Some("local branch not merged"), |()| None),
        Ok(false) => {
            log.skipped(
                format!("Delete local branch {branch}"),
                "branch does not exist",
            );
            None
        }
        Err(err) => {
            log.failed(format!("Delete local branch {branch}"), err);
            Some("local branch state unknown")
        }
    };

    // Never drop the remote copy of a branch that is unmerged locally.
    match remote_skip {
        Some(reason) => log.skipped(format!("Delete remote branch {branch}"), reason),
        None => {
            log.record(
                format!("Deleted remote branch {branch}"),
                git.delete_remote_branch(branch).await,
            );
        }
    }
}

/// Create the working branch unless it exists. Returns the branch name when
/// it exists afterwards.
pub(crate) async fn create_branch_step(
    git: &Git,
    branch: &str,
    log: &mut ActionLog,
) -> Option<String> {
    match git.branch_exists(branch).await {
        Ok(true) => {
            tracing::warn!(branch, "branch already exists, reusing it");
            log.skipped(format!("Create branch {branch}"), "branch already exists");
            Some(branch.to_string())
        }
        Ok(false) => log
            .record(format!("Created branch {branch}"), git.create_branch(branch).await)
            .map(|()| branch.to_string()),
        Err(err) => {
            log.failed(format!("Create branch {branch}"), err);
            None
        }
    }
}
