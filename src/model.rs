//! Normalized read model shared by every provider, plus the option and
//! outcome types for the mutating commands.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    InProgress,
    InReview,
    Closed,
    Cancelled,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Issue,
    Bug,
    Task,
    Epic,
    Feature,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Bug => "bug",
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Feature => "feature",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling numbers. Absent provider values read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub story_points: f64,
    pub effort: f64,
    pub remaining_work: f64,
    pub completed_work: f64,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        self.story_points == 0.0
            && self.effort == 0.0
            && self.remaining_work == 0.0
            && self.completed_work == 0.0
    }
}

/// Transient view over one remote issue or work item. Built fresh on every
/// read and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIssue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// The provider's own name for the type, e.g. "User Story".
    pub provider_type: String,
    pub title: String,
    pub description: Option<String>,
    pub state: IssueState,
    /// The provider's own state string, e.g. "Resolved".
    pub provider_state: String,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub priority: Option<String>,
    pub iteration: Option<String>,
    pub tags: Vec<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub metrics: Option<Metrics>,
    pub url: String,
}

impl NormalizedIssue {
    /// A minimal issue with every optional field empty.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issue_type: IssueType::Issue,
            provider_type: "Issue".to_string(),
            title: title.into(),
            description: None,
            state: IssueState::Open,
            provider_state: "open".to_string(),
            assignee: None,
            creator: None,
            created_at: None,
            updated_at: None,
            priority: None,
            iteration: None,
            tags: Vec::new(),
            parent: None,
            children: Vec::new(),
            metrics: None,
            url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub issue: NormalizedIssue,
    #[serde(skip)]
    pub formatted: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseOptions {
    pub comment: Option<String>,
    pub resolution: Option<String>,
    pub skip_branch_delete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub comment: Option<String>,
    pub assign: bool,
    pub sprint: Option<String>,
    pub create_branch: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            comment: None,
            assign: false,
            sprint: None,
            create_branch: true,
        }
    }
}

pub const DEFAULT_START_COMMENT: &str = "Started work on this item.";
pub const IN_PROGRESS_TAG: &str = "in-progress";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub action: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StepOutcome::Completed => write!(f, "✓ {}", self.action),
            StepOutcome::Skipped { reason } => write!(f, "- {} (skipped: {reason})", self.action),
            StepOutcome::Failed { error } => write!(f, "⚠ {} failed: {error}", self.action),
        }
    }
}

/// Ordered record of what a mutating command did, including the sub-steps
/// that were skipped or failed without aborting the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionLog {
    steps: Vec<Step>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&mut self, action: impl Into<String>) {
        self.push(action, StepOutcome::Completed);
    }

    pub fn skipped(&mut self, action: impl Into<String>, reason: impl Into<String>) {
        self.push(
            action,
            StepOutcome::Skipped {
                reason: reason.into(),
            },
        );
    }

    pub fn failed(&mut self, action: impl Into<String>, error: impl fmt::Display) {
        let action = action.into();
        tracing::warn!(action = %action, error = %error, "best-effort step failed");
        self.push(
            action,
            StepOutcome::Failed {
                error: error.to_string(),
            },
        );
    }

    /// Record a best-effort step from its result.
    pub fn record<T, E: fmt::Display>(
        &mut self,
        action: impl Into<String>,
        result: std::result::Result<T, E>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.completed(action);
                Some(value)
            }
            Err(err) => {
                self.failed(action, err);
                None
            }
        }
    }

    fn push(&mut self, action: impl Into<String>, outcome: StepOutcome) {
        self.steps.push(Step {
            action: action.into(),
            outcome,
        });
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn failures(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed { .. }))
    }

    /// True if any step's action text contains `needle`.
    #[cfg(test)]
    pub fn mentions(&self, needle: &str) -> bool {
        self.steps.iter().any(|step| step.action.contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSummary {
    pub id: String,
    pub status: IssueState,
    pub resolution: Option<String>,
    pub url: String,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOutcome {
    pub log: ActionLog,
    pub summary: CloseSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSummary {
    pub id: String,
    pub status: IssueState,
    pub branch: Option<String>,
    pub assignee: Option<String>,
    pub sprint: Option<String>,
    pub url: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOutcome {
    pub log: ActionLog,
    pub summary: StartSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = [
            IssueState::Open,
            IssueState::InProgress,
            IssueState::InReview,
            IssueState::Closed,
            IssueState::Cancelled,
        ]
        .into_iter()
        .filter(IssueState::is_terminal)
        .collect();
        assert_eq!(terminal, vec![IssueState::Closed, IssueState::Cancelled]);
    }

    #[test]
    fn test_issue_serializes_type_and_snake_case_state() {
        let mut issue = NormalizedIssue::new("42", "Broken login");
        issue.state = IssueState::InProgress;
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "issue");
        assert_eq!(json["state"], "in_progress");
        assert_eq!(json["providerState"], "open");
    }

    #[test]
    fn test_action_log_records_results() {
        let mut log = ActionLog::new();
        log.completed("Closed issue #1");
        log.skipped("Delete branch feature/issue-1", "branch does not exist");
        let value = log.record("Post comment", Err::<(), _>("boom"));
        assert!(value.is_none());

        assert_eq!(log.steps().len(), 3);
        assert_eq!(log.failures().count(), 1);
        assert!(log.mentions("Closed issue"));
        assert_eq!(log.steps()[2].to_string(), "⚠ Post comment failed: boom");
    }

    #[test]
    fn test_step_serializes_flat() {
        let mut log = ActionLog::new();
        log.skipped("Create branch", "dry run");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["action"], "Create branch");
        assert_eq!(json[0]["outcome"], "skipped");
        assert_eq!(json[0]["reason"], "dry run");
    }

    #[test]
    fn test_metrics_empty_by_default() {
        assert!(Metrics::default().is_empty());
    }
}
