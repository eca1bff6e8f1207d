//! Stand-in used unless `AUTOPM_USE_REAL_API` is set. Describes what the
//! real adapter would do without touching the network or git.

use async_trait::async_trait;
use chrono::Utc;

use super::{IssueProvider, parse_numeric_id};
use crate::config::ProviderKind;
use crate::error::Result;
use crate::format::{DisplayContext, render};
use crate::git::branch_name;
use crate::model::{
    ActionLog, CloseOptions, CloseOutcome, CloseSummary, DEFAULT_START_COMMENT, IN_PROGRESS_TAG,
    IssueState, NormalizedIssue, ShowResult, StartOptions, StartOutcome, StartSummary,
};

const REASON: &str = "dry run";

pub struct DryRunProvider {
    kind: ProviderKind,
    context: DisplayContext,
}

impl DryRunProvider {
    pub fn new(kind: ProviderKind, context: DisplayContext) -> Self {
        Self { kind, context }
    }

    fn url(&self, id: &str) -> String {
        self.context.fallback_url(id).unwrap_or_default()
    }
}

#[async_trait]
impl IssueProvider for DryRunProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn show(&self, id: &str) -> Result<ShowResult> {
        let number = parse_numeric_id(id)?.to_string();
        let id = number.as_str();
        tracing::info!(provider = %self.kind, id, "dry run: not fetching");

        let mut issue = NormalizedIssue::new(id, format!("Dry run: {} item {id}", self.kind));
        issue.description =
            Some("Set AUTOPM_USE_REAL_API=true to fetch the real item.".to_string());
        issue.url = self.url(id);
        let formatted = render(&issue, &self.context);
        Ok(ShowResult { issue, formatted })
    }

    async fn close(&self, id: &str, options: &CloseOptions) -> Result<CloseOutcome> {
        let number = parse_numeric_id(id)?.to_string();
        let id = number.as_str();
        let mut log = ActionLog::new();

        log.skipped(format!("Close {id}"), REASON);
        if let Some(resolution) = &options.resolution {
            log.skipped(format!("Add resolution: {resolution}"), REASON);
        }
        if options.comment.is_some() {
            log.skipped("Add closing comment", REASON);
        }
        if !options.skip_branch_delete {
            log.skipped(
                format!("Delete branch {}", branch_name(self.kind, id)),
                REASON,
            );
        }

        Ok(CloseOutcome {
            log,
            summary: CloseSummary {
                id: id.to_string(),
                status: IssueState::Closed,
                resolution: options.resolution.clone(),
                url: self.url(id),
                closed_at: Utc::now(),
            },
        })
    }

    async fn start(&self, id: &str, options: &StartOptions) -> Result<StartOutcome> {
        let number = parse_numeric_id(id)?.to_string();
        let id = number.as_str();
        let mut log = ActionLog::new();

        log.skipped(format!("Mark {id} in progress"), REASON);
        log.skipped(format!("Add tag: {IN_PROGRESS_TAG}"), REASON);
        let branch = options.create_branch.then(|| branch_name(self.kind, id));
        if let Some(branch) = &branch {
            log.skipped(format!("Create branch {branch}"), REASON);
        }
        if options.assign {
            log.skipped("Assign current user", REASON);
        }
        let comment = options.comment.as_deref().unwrap_or(DEFAULT_START_COMMENT);
        log.skipped(format!("Add comment: {comment}"), REASON);
        if let Some(sprint) = &options.sprint {
            log.skipped(format!("Move to sprint {sprint}"), REASON);
        }

        Ok(StartOutcome {
            log,
            summary: StartSummary {
                id: id.to_string(),
                status: IssueState::InProgress,
                branch,
                assignee: None,
                sprint: options.sprint.clone(),
                url: self.url(id),
                started_at: Utc::now(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::StepOutcome;

    fn provider() -> DryRunProvider {
        DryRunProvider::new(
            ProviderKind::Azure,
            DisplayContext::Azure {
                organization: "acme".to_string(),
                project: "Widgets".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_show_returns_placeholder() {
        let result = provider().show("77").await.unwrap();
        assert_eq!(result.issue.id, "77");
        assert!(result.formatted.contains("Dry run: azure item 77"));
        assert!(result.issue.url.ends_with("/_workitems/edit/77"));
    }

    #[tokio::test]
    async fn test_close_only_skips() {
        let options = CloseOptions {
            resolution: Some("duplicate".to_string()),
            ..CloseOptions::default()
        };
        let outcome = provider().close("77", &options).await.unwrap();
        assert!(
            outcome
                .log
                .steps()
                .iter()
                .all(|step| matches!(step.outcome, StepOutcome::Skipped { .. }))
        );
        assert!(outcome.log.mentions("Delete branch feature/task-77"));
    }

    #[tokio::test]
    async fn test_start_reports_branch() {
        let outcome = provider()
            .start("77", &StartOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.summary.branch.as_deref(), Some("feature/task-77"));
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        assert!(matches!(
            provider().show("  ").await,
            Err(ProviderError::InvalidId { .. })
        ));
        assert!(matches!(
            provider().close("abc", &CloseOptions::default()).await,
            Err(ProviderError::InvalidId { .. })
        ));
        assert!(matches!(
            provider().start("0", &StartOptions::default()).await,
            Err(ProviderError::InvalidId { .. })
        ));
    }

    #[tokio::test]
    async fn test_hash_prefixed_id_is_normalized() {
        let outcome = provider()
            .start("#77", &StartOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.summary.id, "77");
        assert_eq!(outcome.summary.branch.as_deref(), Some("feature/task-77"));
    }
}
