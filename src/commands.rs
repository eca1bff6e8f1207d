//! Command handlers: load settings, dispatch through the router, print.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use crate::cli::{Cli, Commands};
use crate::config::{ConfigFile, EnvVars, ExecutionMode, ProviderKind, Settings};
use crate::git::Git;
use crate::history::{History, HistoryEntry};
use crate::model::{ActionLog, CloseOutcome, IssueState, StartOutcome};
use crate::process::{CommandRunner, ProcessRunner};
use crate::router::{IssueRequest, IssueResponse, Router};

const DRY_RUN_BANNER: &str = "[dry run] Set AUTOPM_USE_REAL_API=true to apply these changes.";

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let root = resolve_root(cli.root.as_deref())?;

    let request = match cli.command {
        Commands::History { limit } => return show_history(&root, limit, cli.json),
        Commands::ConfigShow => None,
        Commands::IssueShow { id } => Some(IssueRequest::Show { id }),
        Commands::IssueClose {
            id,
            comment,
            resolution,
            no_branch_delete,
        } => Some(IssueRequest::Close {
            id,
            options: Commands::close_options(comment, resolution, no_branch_delete),
        }),
        Commands::IssueStart {
            id,
            comment,
            assign,
            sprint,
            no_branch,
        } => Some(IssueRequest::Start {
            id,
            options: Commands::start_options(comment, assign, sprint, no_branch),
        }),
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let settings = load_settings(&root, runner.clone()).await?;
    let Some(request) = request else {
        return show_config(&settings, cli.json);
    };

    let router = Router::from_settings(&settings, runner)?;
    let command = request.command();
    let id = request.id().to_string();
    let response = router.execute(request).await?;
    let dry_run = settings.mode == ExecutionMode::DryRun;

    match &response {
        IssueResponse::Show(result) => {
            if cli.json {
                print_json(&result.issue)?;
            } else {
                print!("{}", result.formatted);
            }
            return Ok(());
        }
        IssueResponse::Close(outcome) => {
            if cli.json {
                print_json(outcome)?;
            } else {
                print!("{}", close_report(outcome, dry_run));
            }
        }
        IssueResponse::Start(outcome) => {
            if cli.json {
                print_json(outcome)?;
            } else {
                print!("{}", start_report(outcome, dry_run));
            }
        }
    }

    if let Some((status, url)) = response_status(&response) {
        let history = History::new(&settings.root);
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            provider: router.active(),
            command: command.to_string(),
            id,
            status,
            url,
            dry_run,
        };
        if let Err(err) = history.append(&entry) {
            tracing::warn!(path = %history.path().display(), error = %err, "failed to record history");
        }
    }

    Ok(())
}

fn resolve_root(root: Option<&Path>) -> anyhow::Result<PathBuf> {
    match root {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().context("failed to determine current directory"),
    }
}

/// Only asks git for the origin remote when GitHub owner/repo are not
/// configured.
async fn load_settings(root: &Path, runner: Arc<dyn CommandRunner>) -> anyhow::Result<Settings> {
    let file = ConfigFile::load(root)?;
    let configured = file
        .providers
        .github
        .as_ref()
        .is_some_and(|github| github.owner.is_some() && github.repo.is_some());
    let remote = if configured {
        None
    } else {
        Git::new(runner, root).remote_url().await
    };

    let settings = Settings::resolve(root, &file, &EnvVars::from_process(), remote.as_deref())?;
    tracing::debug!(provider = %settings.provider, mode = ?settings.mode, "settings resolved");
    Ok(settings)
}

fn response_status(response: &IssueResponse) -> Option<(IssueState, String)> {
    match response {
        IssueResponse::Show(_) => None,
        IssueResponse::Close(outcome) => {
            Some((outcome.summary.status, outcome.summary.url.clone()))
        }
        IssueResponse::Start(outcome) => {
            Some((outcome.summary.status, outcome.summary.url.clone()))
        }
    }
}

fn push_log(out: &mut String, log: &ActionLog, dry_run: bool) {
    if dry_run {
        let _ = writeln!(out, "{DRY_RUN_BANNER}\n");
    }
    for step in log.steps() {
        let _ = writeln!(out, "{step}");
    }
    let failures = log.failures().count();
    if failures > 0 {
        let _ = writeln!(out, "\n{failures} step(s) did not complete; see above.");
    }
}

fn close_report(outcome: &CloseOutcome, dry_run: bool) -> String {
    let mut out = String::new();
    push_log(&mut out, &outcome.log, dry_run);

    let summary = &outcome.summary;
    let _ = write!(out, "\nClosed #{} (status: {}", summary.id, summary.status);
    if let Some(resolution) = &summary.resolution {
        let _ = write!(out, ", resolution: {resolution}");
    }
    out.push_str(")\n");
    let _ = writeln!(out, "View: {}", summary.url);
    out
}

fn start_report(outcome: &StartOutcome, dry_run: bool) -> String {
    let mut out = String::new();
    push_log(&mut out, &outcome.log, dry_run);

    let summary = &outcome.summary;
    let _ = writeln!(out, "\nStarted #{} (status: {})", summary.id, summary.status);
    if let Some(branch) = &summary.branch {
        let _ = writeln!(out, "Branch:   {branch}");
    }
    if let Some(assignee) = &summary.assignee {
        let _ = writeln!(out, "Assignee: {assignee}");
    }
    if let Some(sprint) = &summary.sprint {
        let _ = writeln!(out, "Sprint:   {sprint}");
    }
    let _ = writeln!(out, "View: {}", summary.url);
    out
}

fn show_history(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let entries = History::new(root).recent(limit)?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history yet.");
        return Ok(());
    }
    print!("{}", history_lines(&entries));
    Ok(())
}

fn history_lines(entries: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {:<6}  {:<11}  #{:<6}  {}{}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.provider.as_str(),
            entry.command,
            entry.id,
            entry.status,
            if entry.dry_run { "  (dry run)" } else { "" }
        );
    }
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport<'a> {
    #[serde(flatten)]
    settings: &'a Settings,
    github_token: bool,
    azure_token: bool,
}

fn set_or_unset(token: Option<&String>) -> &'static str {
    if token.is_some() { "set" } else { "unset" }
}

fn show_config(settings: &Settings, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&ConfigReport {
            settings,
            github_token: settings.github.as_ref().is_some_and(|g| g.token.is_some()),
            azure_token: settings.azure.as_ref().is_some_and(|a| a.token.is_some()),
        });
    }
    print!("{}", config_text(settings));
    Ok(())
}

fn config_text(settings: &Settings) -> String {
    let mut out = String::new();
    let mode = match settings.mode {
        ExecutionMode::DryRun => "dry run",
        ExecutionMode::Live => "live",
    };
    let _ = writeln!(out, "Provider: {} ({mode})", settings.provider);
    let _ = writeln!(out, "Root:     {}", settings.root.display());

    match &settings.github {
        Some(github) => {
            let _ = writeln!(
                out,
                "GitHub:   {} (token: {})",
                github.slug(),
                set_or_unset(github.token.as_ref())
            );
        }
        None => out.push_str("GitHub:   not configured\n"),
    }
    match &settings.azure {
        Some(azure) => {
            let _ = writeln!(
                out,
                "Azure:    {} at {} (token: {})",
                azure.context(),
                azure.base_url,
                set_or_unset(azure.token.as_ref())
            );
            if let Some(repository) = &azure.repository {
                let _ = writeln!(out, "          repository {repository}");
            }
        }
        None => out.push_str("Azure:    not configured\n"),
    }
    if settings.provider == ProviderKind::Local {
        out.push_str("\nThe local provider has no issue adapters.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CloseSummary, StartSummary};

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let file: ConfigFile = serde_json::from_str(
            r#"{ "providers": { "github": { "owner": "acme", "repo": "widgets" } } }"#,
        )
        .unwrap();
        Settings::resolve(
            Path::new("/work"),
            &file,
            &EnvVars::from_pairs(pairs.iter().copied()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_close_report_lists_steps_and_summary() {
        let mut log = ActionLog::new();
        log.completed("Closed issue #42");
        log.failed("Added closing comment", "HTTP 502");
        let outcome = CloseOutcome {
            log,
            summary: CloseSummary {
                id: "42".to_string(),
                status: IssueState::Cancelled,
                resolution: Some("duplicate".to_string()),
                url: "https://github.com/acme/widgets/issues/42".to_string(),
                closed_at: Utc::now(),
            },
        };

        let text = close_report(&outcome, false);
        assert!(text.starts_with("✓ Closed issue #42\n"));
        assert!(text.contains("⚠ Added closing comment failed: HTTP 502"));
        assert!(text.contains("1 step(s) did not complete"));
        assert!(text.contains("Closed #42 (status: cancelled, resolution: duplicate)"));
        assert!(text.ends_with("View: https://github.com/acme/widgets/issues/42\n"));
        assert!(!text.contains("[dry run]"));
    }

    #[test]
    fn test_start_report_in_dry_run_has_banner() {
        let mut log = ActionLog::new();
        log.skipped("Create branch feature/issue-7", "dry run");
        let outcome = StartOutcome {
            log,
            summary: StartSummary {
                id: "7".to_string(),
                status: IssueState::InProgress,
                branch: Some("feature/issue-7".to_string()),
                assignee: None,
                sprint: Some("Sprint 3".to_string()),
                url: String::new(),
                started_at: Utc::now(),
            },
        };

        let text = start_report(&outcome, true);
        assert!(text.starts_with(DRY_RUN_BANNER));
        assert!(text.contains("Started #7 (status: in_progress)"));
        assert!(text.contains("Branch:   feature/issue-7"));
        assert!(text.contains("Sprint:   Sprint 3"));
        assert!(!text.contains("Assignee:"));
    }

    #[test]
    fn test_config_text_reports_tokens_without_values() {
        let text = config_text(&settings(&[("GITHUB_TOKEN", "ghp_secret")]));
        assert!(text.contains("Provider: github (dry run)"));
        assert!(text.contains("GitHub:   acme/widgets (token: set)"));
        assert!(text.contains("Azure:    not configured"));
        assert!(!text.contains("ghp_secret"));
    }

    #[test]
    fn test_config_report_json_hides_token() {
        let settings = settings(&[("GITHUB_TOKEN", "ghp_secret"), ("AUTOPM_USE_REAL_API", "1")]);
        let report = ConfigReport {
            settings: &settings,
            github_token: true,
            azure_token: false,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["provider"], "github");
        assert_eq!(json["mode"], "live");
        assert_eq!(json["github"]["owner"], "acme");
        assert_eq!(json["githubToken"], true);
        assert!(!json.to_string().contains("ghp_secret"));
    }

    #[test]
    fn test_history_lines_mark_dry_runs() {
        let entries = vec![HistoryEntry {
            timestamp: Utc::now(),
            provider: ProviderKind::Azure,
            command: "issue-close".to_string(),
            id: "123".to_string(),
            status: IssueState::Closed,
            url: String::new(),
            dry_run: true,
        }];
        let text = history_lines(&entries);
        assert!(text.contains("azure"));
        assert!(text.contains("issue-close"));
        assert!(text.contains("#123"));
        assert!(text.trim_end().ends_with("closed  (dry run)"));
    }

    #[test]
    fn test_resolve_root_prefers_flag() {
        assert_eq!(
            resolve_root(Some(Path::new("/tmp/project"))).unwrap(),
            PathBuf::from("/tmp/project")
        );
    }

    #[tokio::test]
    async fn test_load_settings_skips_git_when_configured() {
        use crate::process::fake::FakeRunner;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(
            dir.path().join(".claude/config.json"),
            r#"{ "provider": "github", "providers": { "github": { "owner": "acme", "repo": "widgets" } } }"#,
        )
        .unwrap();
        let runner = Arc::new(FakeRunner::new());

        let settings = load_settings(dir.path(), runner.clone()).await.unwrap();
        assert_eq!(settings.github.unwrap().slug(), "acme/widgets");
        assert!(runner.calls().is_empty());
    }
}
