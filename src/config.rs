//! Project configuration: `.claude/config.json` merged with an environment
//! snapshot into a validated [`Settings`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::git::parse_github_remote;

pub const CONFIG_DIR: &str = ".claude";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_AZURE_BASE_URL: &str = "https://dev.azure.com";

const ENV_VARS: &[&str] = &[
    "AUTOPM_PROVIDER",
    "AUTOPM_USE_REAL_API",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "AZURE_DEVOPS_TOKEN",
    "AZURE_DEVOPS_PAT",
    "AZURE_DEVOPS_ORG",
    "AZURE_DEVOPS_PROJECT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Azure,
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Azure => "azure",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "gh" => Ok(Self::Github),
            "azure" | "azure-devops" | "azuredevops" | "ado" => Ok(Self::Azure),
            "local" => Ok(Self::Local),
            other => Err(ProviderError::Configuration(format!(
                "unknown provider '{other}' (expected github, azure or local)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Print intended actions; no network or subprocess calls.
    DryRun,
    Live,
}

/// Snapshot of the environment variables autopm reads.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    pub fn from_process() -> Self {
        let vars = ENV_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { vars }
    }

    #[cfg(test)]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Non-empty value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key)).map(str::to_string)
    }
}

/// On-disk shape of `.claude/config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub providers: ProviderSections,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSections {
    #[serde(default)]
    pub github: Option<GithubSection>,
    #[serde(default)]
    pub azure: Option<AzureSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithubSection {
    pub owner: Option<String>,
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSection {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub base_url: Option<String>,
}

impl ConfigFile {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load the project config. A missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(ProviderError::Configuration(format!(
                    "cannot read {}: {err}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content).map_err(|err| {
            ProviderError::Configuration(format!("invalid {}: {err}", path.display()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubSettings {
    pub owner: String,
    pub repo: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl GithubSettings {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSettings {
    pub organization: String,
    pub project: String,
    pub repository: Option<String>,
    pub base_url: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl AzureSettings {
    pub fn context(&self) -> String {
        format!("{}/{}", self.organization, self.project)
    }
}

/// Validated configuration handed to the router at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub provider: ProviderKind,
    pub mode: ExecutionMode,
    pub root: PathBuf,
    pub github: Option<GithubSettings>,
    pub azure: Option<AzureSettings>,
}

impl Settings {
    /// Merge file and environment. `git_remote` is the `origin` url, used
    /// when GitHub owner/repo are not configured.
    pub fn resolve(
        root: &Path,
        file: &ConfigFile,
        env: &EnvVars,
        git_remote: Option<&str>,
    ) -> Result<Self> {
        let provider = match env.get("AUTOPM_PROVIDER").or(file.provider.as_deref()) {
            Some(name) => name.parse()?,
            None => ProviderKind::Github,
        };

        let mode = match env.get("AUTOPM_USE_REAL_API").map(str::to_ascii_lowercase) {
            Some(flag) if matches!(flag.as_str(), "true" | "1" | "yes") => ExecutionMode::Live,
            _ => ExecutionMode::DryRun,
        };

        let github = resolve_github(file.providers.github.as_ref(), env, git_remote);
        let azure = resolve_azure(file.providers.azure.as_ref(), env);

        let settings = Self {
            provider,
            mode,
            root: root.to_path_buf(),
            github,
            azure,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// The selected provider must have its settings.
    fn validate(&self) -> Result<()> {
        match self.provider {
            ProviderKind::Github if self.github.is_none() => Err(ProviderError::Configuration(
                "GitHub owner/repo not configured and not derivable from the origin remote"
                    .to_string(),
            )),
            ProviderKind::Azure if self.azure.is_none() => Err(ProviderError::Configuration(
                "Azure DevOps organization and project are required (providers.azure in config \
                 or AZURE_DEVOPS_ORG/AZURE_DEVOPS_PROJECT)"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn resolve_github(
    section: Option<&GithubSection>,
    env: &EnvVars,
    git_remote: Option<&str>,
) -> Option<GithubSettings> {
    let owner = section.and_then(|s| non_empty(s.owner.as_ref()));
    let repo = section.and_then(|s| non_empty(s.repo.as_ref()));

    let (owner, repo) = match (owner, repo) {
        (Some(owner), Some(repo)) => (owner, repo),
        (owner, repo) => {
            let (remote_owner, remote_repo) = git_remote.and_then(parse_github_remote)?;
            (owner.unwrap_or(remote_owner), repo.unwrap_or(remote_repo))
        }
    };

    Some(GithubSettings {
        owner,
        repo,
        token: env.first(&["GITHUB_TOKEN", "GH_TOKEN"]),
    })
}

fn resolve_azure(section: Option<&AzureSection>, env: &EnvVars) -> Option<AzureSettings> {
    let organization = env
        .first(&["AZURE_DEVOPS_ORG"])
        .or_else(|| section.and_then(|s| non_empty(s.organization.as_ref())))?;
    let project = env
        .first(&["AZURE_DEVOPS_PROJECT"])
        .or_else(|| section.and_then(|s| non_empty(s.project.as_ref())))?;

    Some(AzureSettings {
        organization,
        project,
        repository: section.and_then(|s| non_empty(s.repository.as_ref())),
        base_url: section
            .and_then(|s| non_empty(s.base_url.as_ref()))
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_AZURE_BASE_URL.to_string()),
        token: env.first(&["AZURE_DEVOPS_TOKEN", "AZURE_DEVOPS_PAT"]),
    })
}
