//! Minimal Azure DevOps work-item REST client.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::AzureSettings;
use crate::error::{ProviderError, Result};

const API_VERSION: &str = "7.0";
const COMMENTS_API_VERSION: &str = "7.0-preview.3";

#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemFields {
    #[serde(rename = "System.Title")]
    pub title: String,
    #[serde(rename = "System.State")]
    pub state: String,
    #[serde(rename = "System.WorkItemType")]
    pub work_item_type: String,
    #[serde(rename = "System.Description", default)]
    pub description: Option<String>,
    #[serde(rename = "System.AssignedTo", default)]
    pub assigned_to: Option<Identity>,
    #[serde(rename = "System.CreatedBy", default)]
    pub created_by: Option<Identity>,
    #[serde(rename = "System.CreatedDate", default)]
    pub created_date: Option<String>,
    #[serde(rename = "System.ChangedDate", default)]
    pub changed_date: Option<String>,
    #[serde(rename = "System.Tags", default)]
    pub tags: Option<String>,
    #[serde(rename = "System.IterationPath", default)]
    pub iteration_path: Option<String>,
    #[serde(rename = "Microsoft.VSTS.Common.Priority", default)]
    pub priority: Option<i64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.StoryPoints", default)]
    pub story_points: Option<f64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.Effort", default)]
    pub effort: Option<f64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.RemainingWork", default)]
    pub remaining_work: Option<f64>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.CompletedWork", default)]
    pub completed_work: Option<f64>,
}

impl WorkItemFields {
    /// `System.Tags` is a single `; `-separated string.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relation {
    pub rel: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub html: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    pub fields: WorkItemFields,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(rename = "_links", default)]
    pub links: Links,
}

/// One JSON Patch operation against a work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: &'static str,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn set_field(field: &str, value: impl Into<Value>) -> Self {
        Self {
            op: "add",
            path: format!("/fields/{field}"),
            value: value.into(),
        }
    }

    pub fn add_hyperlink(url: &str, comment: &str) -> Self {
        Self {
            op: "add",
            path: "/relations/-".to_string(),
            value: json!({
                "rel": "Hyperlink",
                "url": url,
                "attributes": { "comment": comment },
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionData {
    #[serde(rename = "authenticatedUser")]
    authenticated_user: AuthenticatedUser,
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    #[serde(rename = "providerDisplayName")]
    provider_display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub struct AzureClient {
    http: reqwest::Client,
    base_url: String,
    organization: String,
    project: String,
    token: Option<String>,
}

impl AzureClient {
    pub fn new(settings: &AzureSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("autopm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProviderError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            organization: settings.organization.clone(),
            project: settings.project.clone(),
            token: settings.token.clone(),
        })
    }

    fn context(&self) -> String {
        format!("{}/{}", self.organization, self.project)
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            ProviderError::Authentication(
                "AZURE_DEVOPS_TOKEN (or AZURE_DEVOPS_PAT) is not set".to_string(),
            )
        })
    }

    fn work_item_url(&self, id: u64) -> String {
        format!(
            "{}/{}/{}/_apis/wit/workitems/{id}",
            self.base_url, self.organization, self.project
        )
    }

    /// Web UI link used when the api omits `_links.html`.
    pub fn edit_url(&self, id: u64) -> String {
        format!(
            "{}/{}/{}/_workitems/edit/{id}",
            self.base_url, self.organization, self.project
        )
    }

    /// Azure Repos link to a branch of `repository`.
    pub fn branch_url(&self, repository: &str, branch: &str) -> String {
        format!(
            "{}/{}/{}/_git/{repository}?version=GB{}",
            self.base_url,
            self.organization,
            self.project,
            branch.replace('/', "%2F")
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        id: Option<u64>,
    ) -> Result<reqwest::Response> {
        let token = self.token()?;
        let response = request
            .basic_auth("", Some(token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| ProviderError::Transient(format!("Azure DevOps request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());
        tracing::debug!(%status, %message, "Azure DevOps request rejected");

        Err(match status {
            StatusCode::UNAUTHORIZED => ProviderError::Authentication(format!(
                "Azure DevOps rejected the token: {message}"
            )),
            StatusCode::FORBIDDEN => ProviderError::Authorization(message),
            StatusCode::NOT_FOUND => ProviderError::NotFound {
                id: id.map_or_else(|| "resource".to_string(), |id| format!("work item {id}")),
                context: self.context(),
            },
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                ProviderError::Transient(message)
            }
            status if status.is_server_error() => ProviderError::Transient(message),
            status => ProviderError::Backend(format!("Azure DevOps returned {status}: {message}")),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|err| ProviderError::Transient(format!("reading response: {err}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get_work_item(&self, id: u64) -> Result<WorkItem> {
        let url = format!(
            "{}?$expand=relations&api-version={API_VERSION}",
            self.work_item_url(id)
        );
        let response = self.send(self.http.get(url), Some(id)).await?;
        Self::decode(response).await
    }

    pub async fn update_work_item(&self, id: u64, operations: &[PatchOperation]) -> Result<WorkItem> {
        let url = format!("{}?api-version={API_VERSION}", self.work_item_url(id));
        let body = serde_json::to_vec(operations)?;
        let request = self
            .http
            .patch(url)
            .header(CONTENT_TYPE, "application/json-patch+json")
            .body(body);
        let response = self.send(request, Some(id)).await?;
        Self::decode(response).await
    }

    pub async fn add_comment(&self, id: u64, text: &str) -> Result<()> {
        let url = format!(
            "{}/{}/{}/_apis/wit/workItems/{id}/comments?api-version={COMMENTS_API_VERSION}",
            self.base_url, self.organization, self.project
        );
        let body = serde_json::to_vec(&json!({ "text": text }))?;
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(request, Some(id)).await?;
        Ok(())
    }

    /// Display name of the user the token belongs to.
    pub async fn current_user(&self) -> Result<String> {
        let url = format!("{}/{}/_apis/connectionData", self.base_url, self.organization);
        let response = self.send(self.http.get(url), None).await?;
        let data: ConnectionData = Self::decode(response).await?;
        Ok(data.authenticated_user.provider_display_name)
    }
}
