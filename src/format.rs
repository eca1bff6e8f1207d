//! Terminal rendering of a [`NormalizedIssue`].

use std::fmt::Write;

use crate::config::{ProviderKind, Settings};
use crate::model::NormalizedIssue;

const UNASSIGNED: &str = "Unassigned";
const NO_DESCRIPTION: &str = "_No description provided_";

/// Where the item lives, used when the provider returned no url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayContext {
    Github { owner: String, repo: String },
    Azure { organization: String, project: String },
    None,
}

impl DisplayContext {
    pub fn for_provider(settings: &Settings, kind: ProviderKind) -> Self {
        match (kind, &settings.github, &settings.azure) {
            (ProviderKind::Github, Some(github), _) => Self::Github {
                owner: github.owner.clone(),
                repo: github.repo.clone(),
            },
            (ProviderKind::Azure, _, Some(azure)) => Self::Azure {
                organization: azure.organization.clone(),
                project: azure.project.clone(),
            },
            _ => Self::None,
        }
    }

    pub fn fallback_url(&self, id: &str) -> Option<String> {
        match self {
            Self::Github { owner, repo } => {
                Some(format!("https://github.com/{owner}/{repo}/issues/{id}"))
            }
            Self::Azure {
                organization,
                project,
            } => Some(format!(
                "https://dev.azure.com/{organization}/{project}/_workitems/edit/{id}"
            )),
            Self::None => None,
        }
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

fn refs(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render `issue` as a fixed-structure text block. Pure; missing optional
/// fields degrade to placeholders.
pub fn render(issue: &NormalizedIssue, context: &DisplayContext) -> String {
    let mut out = String::new();

    let title = if issue.title.trim().is_empty() {
        "(untitled)"
    } else {
        issue.title.as_str()
    };
    let _ = writeln!(out, "# {} #{}: {}", issue.provider_type, issue.id, title);
    out.push('\n');

    let _ = writeln!(
        out,
        "Status:    {} ({})",
        issue.provider_state, issue.state
    );
    let _ = writeln!(
        out,
        "Assignee:  {}",
        issue.assignee.as_deref().unwrap_or(UNASSIGNED)
    );
    let _ = writeln!(
        out,
        "Priority:  {}",
        issue.priority.as_deref().unwrap_or("-")
    );
    if let Some(iteration) = &issue.iteration {
        let _ = writeln!(out, "Iteration: {iteration}");
    }
    if let Some(created) = &issue.created_at {
        match &issue.creator {
            Some(creator) => {
                let _ = writeln!(out, "Created:   {created} by {creator}");
            }
            None => {
                let _ = writeln!(out, "Created:   {created}");
            }
        }
    }
    if let Some(updated) = &issue.updated_at {
        let _ = writeln!(out, "Updated:   {updated}");
    }

    if !issue.tags.is_empty() {
        let _ = writeln!(out, "\nTags: {}", issue.tags.join(", "));
    }

    if issue.parent.is_some() || !issue.children.is_empty() {
        out.push_str("\nRelationships:\n");
        if let Some(parent) = &issue.parent {
            let _ = writeln!(out, "  Parent:   #{parent}");
        }
        if !issue.children.is_empty() {
            let _ = writeln!(out, "  Children: {}", refs(&issue.children));
        }
    }

    if let Some(metrics) = issue.metrics.as_ref().filter(|m| !m.is_empty()) {
        out.push_str("\nMetrics:\n");
        for (label, value) in [
            ("Story points", metrics.story_points),
            ("Effort", metrics.effort),
            ("Remaining", metrics.remaining_work),
            ("Completed", metrics.completed_work),
        ] {
            if value != 0.0 {
                let _ = writeln!(out, "  {label}: {}", number(value));
            }
        }
    }

    out.push_str("\n## Description\n\n");
    match issue.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            let _ = writeln!(out, "{text}");
        }
        _ => {
            let _ = writeln!(out, "{NO_DESCRIPTION}");
        }
    }

    let url = if issue.url.is_empty() {
        context.fallback_url(&issue.id)
    } else {
        Some(issue.url.clone())
    };
    out.push_str("\n---\n");
    match url {
        Some(url) => {
            let _ = writeln!(out, "View: {url}");
        }
        None => out.push_str("View: (no link available)\n"),
    }

    out
}
