//! GitHub adapter backed by the `gh` CLI.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{IssueProvider, create_branch_step, delete_branch_steps, parse_numeric_id};
use crate::config::{GithubSettings, ProviderKind};
use crate::error::{ProviderError, Result};
use crate::format::{DisplayContext, render};
use crate::git::{Git, branch_name};
use crate::mapping::{map_state, map_type};
use crate::model::{
    ActionLog, CloseOptions, CloseOutcome, CloseSummary, DEFAULT_START_COMMENT, IN_PROGRESS_TAG,
    IssueState, IssueType, NormalizedIssue, ShowResult, StartOptions, StartOutcome, StartSummary,
};
use crate::process::{CommandOutput, CommandRunner, Invocation, spawn_error};

const VIEW_FIELDS: &str =
    "number,title,body,state,stateReason,author,assignees,labels,createdAt,updatedAt,url,milestone";
const IN_REVIEW_LABEL: &str = "in-review";

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhMilestone {
    title: String,
}

/// Shape of `gh issue view --json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    state_reason: Option<String>,
    #[serde(default)]
    author: Option<GhUser>,
    #[serde(default)]
    assignees: Vec<GhUser>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    milestone: Option<GhMilestone>,
}

impl GhIssue {
    fn into_normalized(self) -> NormalizedIssue {
        let labels: Vec<String> = self.labels.into_iter().map(|label| label.name).collect();
        let has_label = |name: &str| labels.iter().any(|label| label.eq_ignore_ascii_case(name));

        let state = match map_state(&self.state) {
            IssueState::Closed
                if self
                    .state_reason
                    .as_deref()
                    .is_some_and(|reason| reason.eq_ignore_ascii_case("NOT_PLANNED")) =>
            {
                IssueState::Cancelled
            }
            IssueState::Open if has_label(IN_REVIEW_LABEL) => IssueState::InReview,
            IssueState::Open if has_label(IN_PROGRESS_TAG) => IssueState::InProgress,
            other => other,
        };

        let issue_type = labels
            .iter()
            .map(|label| map_type(label))
            .find(|kind| *kind != IssueType::Issue)
            .unwrap_or(IssueType::Issue);

        let priority = labels.iter().find_map(|label| {
            label
                .strip_prefix("priority:")
                .or_else(|| label.strip_prefix("priority/"))
                .map(|value| value.trim().to_string())
        });

        NormalizedIssue {
            id: self.number.to_string(),
            issue_type,
            provider_type: capitalize(issue_type.as_str()),
            title: self.title,
            description: self.body.filter(|body| !body.trim().is_empty()),
            state,
            provider_state: self.state,
            assignee: self.assignees.into_iter().next().map(|user| user.login),
            creator: self.author.map(|user| user.login),
            created_at: self.created_at,
            updated_at: self.updated_at,
            priority,
            iteration: self.milestone.map(|milestone| milestone.title),
            tags: labels,
            parent: None,
            children: Vec::new(),
            metrics: None,
            url: self.url,
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `gh issue close --reason` for a resolution.
fn close_reason(resolution: Option<&str>) -> &'static str {
    match resolution.map(str::to_ascii_lowercase).as_deref() {
        Some("duplicate" | "wontfix" | "won't fix" | "invalid" | "not_planned" | "not planned") => {
            "not planned"
        }
        _ => "completed",
    }
}

pub struct GithubProvider {
    settings: GithubSettings,
    runner: Arc<dyn CommandRunner>,
    git: Git,
    root: PathBuf,
}

impl GithubProvider {
    pub fn new(
        settings: GithubSettings,
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
    ) -> Self {
        let root = root.into();
        Self {
            git: Git::new(runner.clone(), root.clone()),
            settings,
            runner,
            root,
        }
    }

    fn token(&self) -> Result<&str> {
        self.settings.token.as_deref().ok_or_else(|| {
            ProviderError::Authentication(
                "GITHUB_TOKEN is not set; export a token with repo scope".to_string(),
            )
        })
    }

    fn display_context(&self) -> DisplayContext {
        DisplayContext::Github {
            owner: self.settings.owner.clone(),
            repo: self.settings.repo.clone(),
        }
    }

    /// Run `gh <args> --repo owner/repo` and return its output as is.
    async fn gh_raw(&self, args: &[&str]) -> Result<CommandOutput> {
        let token = self.token()?;
        let invocation = Invocation::new("gh")
            .args(args.iter().copied())
            .args(["--repo".to_string(), self.settings.slug()])
            .env("GH_TOKEN", token)
            .current_dir(&self.root);

        self.runner
            .run(&invocation)
            .await
            .map_err(|err| spawn_error("gh", err))
    }

    /// Run `gh <args> --repo owner/repo`, classifying failures.
    async fn gh(&self, number: u64, args: &[&str]) -> Result<CommandOutput> {
        let output = self.gh_raw(args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(self.classify(number, &output.stderr))
        }
    }

    /// Create `label` in the repository, or update it if it already exists.
    async fn ensure_label(&self, number: u64, label: &str) -> Result<()> {
        self.gh(number, &["label", "create", label, "--force"]).await?;
        Ok(())
    }

    fn classify(&self, number: u64, stderr: &str) -> ProviderError {
        let lower = stderr.to_ascii_lowercase();
        if lower.contains("could not resolve to an issue") || lower.contains("http 404") {
            ProviderError::NotFound {
                id: format!("issue #{number}"),
                context: self.settings.slug(),
            }
        } else if lower.contains("http 401")
            || lower.contains("bad credentials")
            || lower.contains("gh auth login")
        {
            ProviderError::Authentication(stderr.trim().to_string())
        } else if lower.contains("http 403")
            || lower.contains("permission")
            || lower.contains("forbidden")
        {
            ProviderError::Authorization(stderr.trim().to_string())
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("http 429")
            || lower.contains("http 5")
        {
            ProviderError::Transient(stderr.trim().to_string())
        } else {
            ProviderError::Backend(format!("gh: {}", stderr.trim()))
        }
    }

    /// Failure of an edit that adds `label`. gh reports a label missing from
    /// the repository as `'<label>' not found`.
    fn classify_label_edit(&self, number: u64, label: &str, stderr: &str) -> ProviderError {
        let missing = format!("'{}' not found", label.to_ascii_lowercase());
        if stderr.to_ascii_lowercase().contains(&missing) {
            ProviderError::Configuration(format!(
                "label '{label}' does not exist in {} and could not be created; \
                 run `gh label create {label}` with a token that can manage labels",
                self.settings.slug()
            ))
        } else {
            self.classify(number, stderr)
        }
    }

    async fn fetch(&self, number: u64) -> Result<NormalizedIssue> {
        let number_arg = number.to_string();
        let output = self
            .gh(number, &["issue", "view", &number_arg, "--json", VIEW_FIELDS])
            .await?;
        let raw: GhIssue = serde_json::from_str(&output.stdout)?;
        Ok(raw.into_normalized())
    }

    fn url_for(&self, issue: &NormalizedIssue) -> String {
        if issue.url.is_empty() {
            self.display_context()
                .fallback_url(&issue.id)
                .unwrap_or_default()
        } else {
            issue.url.clone()
        }
    }
}

#[async_trait]
impl IssueProvider for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    async fn show(&self, id: &str) -> Result<ShowResult> {
        let number = parse_numeric_id(id)?;
        tracing::debug!(number, repo = %self.settings.slug(), "fetching issue");
        let issue = self.fetch(number).await?;
        let formatted = render(&issue, &self.display_context());
        Ok(ShowResult { issue, formatted })
    }

    async fn close(&self, id: &str, options: &CloseOptions) -> Result<CloseOutcome> {
        let number = parse_numeric_id(id)?;
        let issue = self.fetch(number).await?;
        if issue.state.is_terminal() {
            return Err(ProviderError::InvalidStateTransition {
                id: format!("issue #{number}"),
                state: issue.state.to_string(),
                action: "close".to_string(),
            });
        }

        let number_arg = number.to_string();
        let mut log = ActionLog::new();

        let reason = close_reason(options.resolution.as_deref());
        self.gh(number, &["issue", "close", &number_arg, "--reason", reason])
            .await?;
        tracing::info!(number, reason, "closed issue");
        log.completed(format!("Closed issue #{number}"));

        if let Some(resolution) = &options.resolution {
            let label = format!("resolution:{resolution}");
            let result = match self.ensure_label(number, &label).await {
                Ok(()) => self
                    .gh(number, &["issue", "edit", &number_arg, "--add-label", &label])
                    .await
                    .map(|_| ()),
                Err(err) => Err(err),
            };
            log.record(format!("Added resolution: {resolution}"), result);
        }

        if let Some(comment) = &options.comment {
            let result = self
                .gh(number, &["issue", "comment", &number_arg, "--body", comment])
                .await;
            log.record("Added closing comment", result);
        }

        let branch = branch_name(ProviderKind::Github, &number_arg);
        if options.skip_branch_delete {
            log.skipped(format!("Delete branch {branch}"), "--no-branch-delete");
        } else {
            delete_branch_steps(&self.git, &branch, &mut log).await;
        }

        Ok(CloseOutcome {
            log,
            summary: CloseSummary {
                id: number_arg,
                status: IssueState::Closed,
                resolution: options.resolution.clone(),
                url: self.url_for(&issue),
                closed_at: Utc::now(),
            },
        })
    }

    async fn start(&self, id: &str, options: &StartOptions) -> Result<StartOutcome> {
        let number = parse_numeric_id(id)?;
        let issue = self.fetch(number).await?;
        if issue.state.is_terminal() {
            return Err(ProviderError::InvalidStateTransition {
                id: format!("issue #{number}"),
                state: issue.state.to_string(),
                action: "start".to_string(),
            });
        }

        let number_arg = number.to_string();
        let mut log = ActionLog::new();

        if let Err(err) = self.ensure_label(number, IN_PROGRESS_TAG).await {
            tracing::warn!(number, error = %err, "could not create the in-progress label");
        }

        let review_label = issue
            .tags
            .iter()
            .find(|label| label.eq_ignore_ascii_case(IN_REVIEW_LABEL));
        let mut args = vec!["issue", "edit", number_arg.as_str(), "--add-label", IN_PROGRESS_TAG];
        if let Some(label) = review_label {
            args.extend(["--remove-label", label.as_str()]);
        }
        let output = self.gh_raw(&args).await?;
        if !output.success {
            return Err(self.classify_label_edit(number, IN_PROGRESS_TAG, &output.stderr));
        }
        tracing::info!(number, "marked issue in progress");
        log.completed(format!("Marked issue #{number} in progress"));
        log.completed(format!("Added tag: {IN_PROGRESS_TAG}"));
        if let Some(label) = review_label {
            log.completed(format!("Removed label: {label}"));
        }

        let branch_target = branch_name(ProviderKind::Github, &number_arg);
        let branch = if options.create_branch {
            create_branch_step(&self.git, &branch_target, &mut log).await
        } else {
            log.skipped(format!("Create branch {branch_target}"), "--no-branch");
            None
        };

        let mut assignee = issue.assignee.clone();
        if options.assign || assignee.is_none() {
            let result = self
                .gh(number, &["issue", "edit", &number_arg, "--add-assignee", "@me"])
                .await;
            if log.record("Assigned to @me", result).is_some() {
                assignee = Some("@me".to_string());
            }
        }

        let comment = options.comment.as_deref().unwrap_or(DEFAULT_START_COMMENT);
        let result = self
            .gh(number, &["issue", "comment", &number_arg, "--body", comment])
            .await;
        log.record("Added comment", result);

        if let Some(sprint) = &options.sprint {
            let result = self
                .gh(number, &["issue", "edit", &number_arg, "--milestone", sprint])
                .await;
            log.record(format!("Moved to milestone {sprint}"), result);
        }

        Ok(StartOutcome {
            log,
            summary: StartSummary {
                id: number_arg,
                status: IssueState::InProgress,
                branch,
                assignee,
                sprint: options.sprint.clone(),
                url: self.url_for(&issue),
                started_at: Utc::now(),
            },
        })
    }
}
