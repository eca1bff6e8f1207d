//! Azure DevOps adapter over the work-item REST api.

mod client;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use self::client::{AzureClient, PatchOperation, WorkItem};
use super::{IssueProvider, create_branch_step, delete_branch_steps, parse_numeric_id};
use crate::config::{AzureSettings, ProviderKind};
use crate::error::{ProviderError, Result};
use crate::format::{DisplayContext, render};
use crate::git::{Git, branch_name};
use crate::mapping::{
    azure_active_state, azure_closed_state, extract_id_from_relation_url,
    is_terminal_provider_state, map_state, map_type,
};
use crate::model::{
    ActionLog, CloseOptions, CloseOutcome, CloseSummary, DEFAULT_START_COMMENT, IN_PROGRESS_TAG,
    IssueState, Metrics, NormalizedIssue, ShowResult, StartOptions, StartOutcome, StartSummary,
};
use crate::process::CommandRunner;

const PARENT_REL: &str = "System.LinkTypes.Hierarchy-Reverse";
const CHILD_REL: &str = "System.LinkTypes.Hierarchy-Forward";

/// Reduce work-item HTML to plain text.
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr")
                    && !text.ends_with('\n')
                {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => text.push(c),
        }
    }

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn related_ids(item: &WorkItem, rel: &str) -> Vec<String> {
    item.relations
        .iter()
        .filter(|relation| relation.rel == rel)
        .filter_map(|relation| extract_id_from_relation_url(&relation.url))
        .map(|id| id.to_string())
        .collect()
}

fn join_tags(tags: &[String]) -> String {
    tags.join("; ")
}

fn with_tag(mut tags: Vec<String>, tag: &str) -> Vec<String> {
    if !tags.iter().any(|existing| existing.eq_ignore_ascii_case(tag)) {
        tags.push(tag.to_string());
    }
    tags
}

pub struct AzureProvider {
    settings: AzureSettings,
    client: AzureClient,
    git: Git,
}

impl AzureProvider {
    pub fn new(
        settings: AzureSettings,
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            client: AzureClient::new(&settings)?,
            git: Git::new(runner, root),
            settings,
        })
    }

    fn display_context(&self) -> DisplayContext {
        DisplayContext::Azure {
            organization: self.settings.organization.clone(),
            project: self.settings.project.clone(),
        }
    }

    fn normalize(&self, item: &WorkItem) -> NormalizedIssue {
        let fields = &item.fields;

        let metric_values = [
            fields.story_points,
            fields.effort,
            fields.remaining_work,
            fields.completed_work,
        ];
        let metrics = metric_values.iter().any(Option::is_some).then(|| Metrics {
            story_points: fields.story_points.unwrap_or_default(),
            effort: fields.effort.unwrap_or_default(),
            remaining_work: fields.remaining_work.unwrap_or_default(),
            completed_work: fields.completed_work.unwrap_or_default(),
        });

        let url = item
            .links
            .html
            .as_ref()
            .map(|link| link.href.clone())
            .unwrap_or_else(|| self.client.edit_url(item.id));

        NormalizedIssue {
            id: item.id.to_string(),
            issue_type: map_type(&fields.work_item_type),
            provider_type: fields.work_item_type.clone(),
            title: fields.title.clone(),
            description: fields
                .description
                .as_deref()
                .map(html_to_text)
                .filter(|text| !text.is_empty()),
            state: map_state(&fields.state),
            provider_state: fields.state.clone(),
            assignee: fields.assigned_to.as_ref().map(|who| who.display_name.clone()),
            creator: fields.created_by.as_ref().map(|who| who.display_name.clone()),
            created_at: fields.created_date.clone(),
            updated_at: fields.changed_date.clone(),
            priority: fields.priority.map(|p| p.to_string()),
            iteration: fields.iteration_path.clone(),
            tags: fields.tag_list(),
            parent: related_ids(item, PARENT_REL).into_iter().next(),
            children: related_ids(item, CHILD_REL),
            metrics,
            url,
        }
    }

    /// Fetch and reject items already in a terminal state.
    async fn fetch_open(&self, id: u64, action: &str) -> Result<WorkItem> {
        let item = self.client.get_work_item(id).await?;
        if is_terminal_provider_state(&item.fields.state) {
            return Err(ProviderError::InvalidStateTransition {
                id: format!("work item {id}"),
                state: item.fields.state.clone(),
                action: action.to_string(),
            });
        }
        Ok(item)
    }

    fn iteration_path(&self, sprint: &str) -> String {
        if sprint.contains('\\') {
            sprint.to_string()
        } else {
            format!("{}\\{sprint}", self.settings.project)
        }
    }
}

#[async_trait]
impl IssueProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    async fn show(&self, id: &str) -> Result<ShowResult> {
        let id = parse_numeric_id(id)?;
        tracing::debug!(id, context = %self.settings.context(), "fetching work item");
        let item = self.client.get_work_item(id).await?;
        let issue = self.normalize(&item);
        let formatted = render(&issue, &self.display_context());
        Ok(ShowResult { issue, formatted })
    }

    async fn close(&self, id: &str, options: &CloseOptions) -> Result<CloseOutcome> {
        let id = parse_numeric_id(id)?;
        let item = self.fetch_open(id, "close").await?;
        let target = azure_closed_state(&item.fields.work_item_type);

        let mut log = ActionLog::new();
        let updated = self
            .client
            .update_work_item(id, &[PatchOperation::set_field("System.State", target)])
            .await?;
        tracing::info!(id, state = target, "closed work item");
        log.completed(format!("Closed work item #{id} (state: {target})"));

        if let Some(resolution) = &options.resolution {
            let tags = with_tag(
                updated.fields.tag_list(),
                &format!("resolution:{resolution}"),
            );
            let result = self
                .client
                .update_work_item(
                    id,
                    &[PatchOperation::set_field("System.Tags", join_tags(&tags))],
                )
                .await;
            log.record(format!("Added resolution: {resolution}"), result);
        }

        if let Some(comment) = &options.comment {
            log.record(
                "Added closing comment",
                self.client.add_comment(id, comment).await,
            );
        }

        let branch = branch_name(ProviderKind::Azure, &id.to_string());
        if options.skip_branch_delete {
            log.skipped(format!("Delete branch {branch}"), "--no-branch-delete");
        } else {
            delete_branch_steps(&self.git, &branch, &mut log).await;
        }

        Ok(CloseOutcome {
            log,
            summary: CloseSummary {
                id: id.to_string(),
                status: IssueState::Closed,
                resolution: options.resolution.clone(),
                url: self.normalize(&updated).url,
                closed_at: Utc::now(),
            },
        })
    }

    async fn start(&self, id: &str, options: &StartOptions) -> Result<StartOutcome> {
        let id = parse_numeric_id(id)?;
        let item = self.fetch_open(id, "start").await?;
        let target = azure_active_state(&item.fields.work_item_type);
        let tags = with_tag(item.fields.tag_list(), IN_PROGRESS_TAG);

        let mut log = ActionLog::new();
        let updated = self
            .client
            .update_work_item(
                id,
                &[
                    PatchOperation::set_field("System.State", target),
                    PatchOperation::set_field("System.Tags", join_tags(&tags)),
                ],
            )
            .await?;
        tracing::info!(id, state = target, "started work item");
        log.completed(format!("Set work item #{id} to {target}"));
        log.completed(format!("Added tag: {IN_PROGRESS_TAG}"));

        let branch_target = branch_name(ProviderKind::Azure, &id.to_string());
        let branch = if options.create_branch {
            create_branch_step(&self.git, &branch_target, &mut log).await
        } else {
            log.skipped(format!("Create branch {branch_target}"), "--no-branch");
            None
        };

        if let Some(branch) = &branch {
            match &self.settings.repository {
                Some(repository) => {
                    let link = PatchOperation::add_hyperlink(
                        &self.client.branch_url(repository, branch),
                        &format!("Branch {branch}"),
                    );
                    let result = self.client.update_work_item(id, &[link]).await;
                    log.record(format!("Linked branch {branch}"), result);
                }
                None => log.skipped(
                    format!("Link branch {branch}"),
                    "no repository configured",
                ),
            }
        }

        let mut assignee = item.fields.assigned_to.as_ref().map(|who| who.display_name.clone());
        if options.assign || assignee.is_none() {
            match self.client.current_user().await {
                Ok(name) => {
                    let result = self
                        .client
                        .update_work_item(
                            id,
                            &[PatchOperation::set_field("System.AssignedTo", name.as_str())],
                        )
                        .await;
                    if log.record(format!("Assigned to {name}"), result).is_some() {
                        assignee = Some(name);
                    }
                }
                Err(err) => log.failed("Assign current user", err),
            }
        }

        let comment = options.comment.as_deref().unwrap_or(DEFAULT_START_COMMENT);
        log.record("Added comment", self.client.add_comment(id, comment).await);

        if let Some(sprint) = &options.sprint {
            let path = self.iteration_path(sprint);
            let result = self
                .client
                .update_work_item(
                    id,
                    &[PatchOperation::set_field("System.IterationPath", path.as_str())],
                )
                .await;
            log.record(format!("Moved to iteration {path}"), result);
        }

        Ok(StartOutcome {
            log,
            summary: StartSummary {
                id: id.to_string(),
                status: IssueState::InProgress,
                branch,
                assignee,
                sprint: options.sprint.clone(),
                url: self.normalize(&updated).url,
                started_at: Utc::now(),
            },
        })
    }
}
