//! Typed registry from provider to adapter, resolved once at startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ExecutionMode, ProviderKind, Settings};
use crate::error::{ProviderError, Result};
use crate::format::DisplayContext;
use crate::model::{CloseOptions, CloseOutcome, ShowResult, StartOptions, StartOutcome};
use crate::process::CommandRunner;
use crate::provider::{AzureProvider, DryRunProvider, GithubProvider, IssueProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueCommand {
    Show,
    Close,
    Start,
}

impl IssueCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Show => "issue-show",
            Self::Close => "issue-close",
            Self::Start => "issue-start",
        }
    }
}

impl fmt::Display for IssueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueRequest {
    Show { id: String },
    Close { id: String, options: CloseOptions },
    Start { id: String, options: StartOptions },
}

impl IssueRequest {
    pub fn command(&self) -> IssueCommand {
        match self {
            Self::Show { .. } => IssueCommand::Show,
            Self::Close { .. } => IssueCommand::Close,
            Self::Start { .. } => IssueCommand::Start,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Show { id } | Self::Close { id, .. } | Self::Start { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IssueResponse {
    Show(ShowResult),
    Close(CloseOutcome),
    Start(StartOutcome),
}

pub struct Router {
    active: ProviderKind,
    adapters: HashMap<ProviderKind, Arc<dyn IssueProvider>>,
}

impl Router {
    pub fn new(active: ProviderKind) -> Self {
        Self {
            active,
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn IssueProvider>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Register an adapter for every provider the settings describe.
    pub fn from_settings(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let mut router = Self::new(settings.provider);

        match settings.mode {
            ExecutionMode::DryRun => {
                for kind in [ProviderKind::Github, ProviderKind::Azure] {
                    let context = DisplayContext::for_provider(settings, kind);
                    if context != DisplayContext::None {
                        router.register(Arc::new(DryRunProvider::new(kind, context)));
                    }
                }
            }
            ExecutionMode::Live => {
                if let Some(github) = &settings.github {
                    router.register(Arc::new(GithubProvider::new(
                        github.clone(),
                        runner.clone(),
                        settings.root.clone(),
                    )));
                }
                if let Some(azure) = &settings.azure {
                    router.register(Arc::new(AzureProvider::new(
                        azure.clone(),
                        runner.clone(),
                        settings.root.clone(),
                    )?));
                }
            }
        }

        tracing::debug!(
            active = %router.active,
            registered = router.adapters.len(),
            mode = ?settings.mode,
            "router ready"
        );
        Ok(router)
    }

    pub fn active(&self) -> ProviderKind {
        self.active
    }

    pub fn resolve(&self, command: IssueCommand) -> Result<&Arc<dyn IssueProvider>> {
        self.adapters
            .get(&self.active)
            .ok_or_else(|| ProviderError::ProviderNotFound {
                provider: self.active.to_string(),
                command: command.to_string(),
            })
    }

    /// Delegate to the active adapter and return its result unchanged.
    pub async fn execute(&self, request: IssueRequest) -> Result<IssueResponse> {
        let adapter = self.resolve(request.command())?;
        tracing::debug!(
            provider = %self.active,
            command = %request.command(),
            id = request.id(),
            "dispatching"
        );

        match request {
            IssueRequest::Show { id } => adapter.show(&id).await.map(IssueResponse::Show),
            IssueRequest::Close { id, options } => {
                adapter.close(&id, &options).await.map(IssueResponse::Close)
            }
            IssueRequest::Start { id, options } => {
                adapter.start(&id, &options).await.map(IssueResponse::Start)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::config::{ConfigFile, EnvVars};
    use crate::process::CommandOutput;
    use crate::process::fake::FakeRunner;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let file: ConfigFile = serde_json::from_str(
            r#"{ "providers": {
                "github": { "owner": "acme", "repo": "widgets" },
                "azure": { "organization": "acme", "project": "Widgets" } } }"#,
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
    fn test_command_names() {
        assert_eq!(IssueCommand::Show.name(), "issue-show");
        assert_eq!(IssueCommand::Close.name(), "issue-close");
        assert_eq!(IssueCommand::Start.to_string(), "issue-start");
        let request = IssueRequest::Start {
            id: "5".to_string(),
            options: StartOptions::default(),
        };
        assert_eq!(request.command(), IssueCommand::Start);
        assert_eq!(request.id(), "5");
    }

    #[tokio::test]
    async fn test_local_provider_has_no_adapter() {
        let runner = Arc::new(FakeRunner::new());
        let router =
            Router::from_settings(&settings(&[("AUTOPM_PROVIDER", "local")]), runner).unwrap();

        let err = router
            .execute(IssueRequest::Show {
                id: "1".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ProviderNotFound { .. }));
        assert!(err.to_string().contains("'issue-show'"));
        assert!(err.to_string().contains("'local'"));
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let runner = Arc::new(FakeRunner::new());
        let router = Router::from_settings(&settings(&[]), runner.clone()).unwrap();
        assert_eq!(router.active(), ProviderKind::Github);

        let response = router
            .execute(IssueRequest::Close {
                id: "42".to_string(),
                options: CloseOptions::default(),
            })
            .await
            .unwrap();

        assert!(matches!(response, IssueResponse::Close(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_mode_routes_to_github_adapter() {
        let runner = Arc::new(FakeRunner::new());
        runner.on(
            "gh issue view",
            CommandOutput::ok(
                r#"{"number":42,"title":"t","state":"OPEN","url":"https://github.com/acme/widgets/issues/42"}"#,
            ),
        );
        let settings = settings(&[("AUTOPM_USE_REAL_API", "true"), ("GITHUB_TOKEN", "t")]);
        let router = Router::from_settings(&settings, runner.clone()).unwrap();

        let response = router
            .execute(IssueRequest::Show {
                id: "42".to_string(),
            })
            .await
            .unwrap();

        let IssueResponse::Show(result) = response else {
            panic!("expected show response");
        };
        assert_eq!(result.issue.title, "t");
        assert_eq!(
            runner.invocations()[0].cwd.as_deref(),
            Some(PathBuf::from("/work").as_path())
        );
    }

    #[tokio::test]
    async fn test_registered_adapter_is_resolved_by_kind() {
        let mut router = Router::new(ProviderKind::Azure);
        assert!(router.resolve(IssueCommand::Start).is_err());

        router.register(Arc::new(DryRunProvider::new(
            ProviderKind::Azure,
            DisplayContext::None,
        )));
        assert_eq!(
            router.resolve(IssueCommand::Start).unwrap().kind(),
            ProviderKind::Azure
        );
    }
}
