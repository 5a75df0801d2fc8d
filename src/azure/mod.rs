//! Azure Resource Manager implementation of [`CloudClient`].
//!
//! The client is a thin authenticated handle: it issues lookups, create
//! calls, and actions against resource identifiers and classifies the
//! long-running operations they return. Sequencing lives in the
//! provisioners.

mod auth;
mod error;
mod operation;

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::cloud::{CloudClient, CloudFuture, Operation, OperationState, Resource, ResourceId};
use crate::config::AzureConfig;

pub use auth::{ClientCredentials, MANAGEMENT_SCOPE, TokenCache};
pub use error::{AzureClientError, api_error};
pub use operation::{ASYNC_OPERATION_HEADER, Progress, classify, poll_url_from_headers};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Authenticated Resource Manager client shared by every request.
#[derive(Debug)]
pub struct AzureClient {
    http: reqwest::Client,
    credentials: ClientCredentials,
    subscription_id: String,
    management_endpoint: String,
    tokens: TokenCache,
}

struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl ApiResponse {
    fn into_success(self) -> Result<Self, AzureClientError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            let text = match &self.body {
                Value::Null => self
                    .status
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_owned(),
                body => body.to_string(),
            };
            Err(api_error(self.status.as_u16(), &text))
        }
    }

    fn progress(&self) -> Progress {
        classify(self.status.as_u16(), &self.body)
    }
}

#[derive(Debug, Deserialize)]
struct ResourceBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    properties: Option<Value>,
}

/// Renders the request URL for `path` at `api_version`.
#[must_use]
pub fn resource_url(endpoint: &str, path: &str, api_version: &str) -> String {
    format!(
        "{}{path}?api-version={api_version}",
        endpoint.trim_end_matches('/')
    )
}

/// Renders the request URL of an action on the resource at `path`.
#[must_use]
pub fn action_url(endpoint: &str, path: &str, action: &str, api_version: &str) -> String {
    resource_url(endpoint, &format!("{path}/{action}"), api_version)
}

impl AzureClient {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AzureClientError::Config`] when the configuration is
    /// incomplete and [`AzureClientError::Http`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: &AzureConfig) -> Result<Self, AzureClientError> {
        config
            .validate()
            .map_err(|err| AzureClientError::Config(err.to_string()))?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            credentials: ClientCredentials {
                tenant_id: config.tenant_id.trim().to_owned(),
                client_id: config.client_id.trim().to_owned(),
                client_secret: config.client_secret.clone(),
                authority_host: config.authority_host.clone(),
            },
            subscription_id: config.subscription_id.trim().to_owned(),
            management_endpoint: config.management_endpoint.clone(),
            tokens: TokenCache::default(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<ApiResponse, AzureClientError> {
        let token = self.tokens.bearer(&self.http, &self.credentials).await?;
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, url, request_id = %request_id, "sending management request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(CLIENT_REQUEST_ID_HEADER, request_id);
        request = match payload {
            Some(json) => request.json(json),
            // Actions without a payload still need an explicit empty body.
            None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
        };

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|err| {
                if status.is_success() {
                    AzureClientError::Decode(err.to_string())
                } else {
                    api_error(status.as_u16(), &text)
                }
            })?
        };
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn operation_from(
        &self,
        id: &ResourceId,
        action: &str,
        fallback_poll_url: Option<String>,
        response: &ApiResponse,
    ) -> Operation {
        let mut operation = Operation::submitted(id.clone(), action);
        operation.poll_url = poll_url_from_headers(&response.headers).or(fallback_poll_url);
        if response.headers.contains_key(ASYNC_OPERATION_HEADER)
            || response.headers.contains_key(reqwest::header::LOCATION)
        {
            return operation;
        }
        apply_progress(&mut operation, response.progress());
        debug!(target_resource = %id, action, state = %operation.state, "operation submitted");
        operation
    }
}

fn apply_progress(operation: &mut Operation, progress: Progress) {
    match progress {
        Progress::Running => operation.state = OperationState::Polling,
        Progress::Succeeded(output) => {
            operation.state = OperationState::Succeeded;
            operation.output = output;
        }
        Progress::Failed(reason) => {
            operation.state = OperationState::Failed;
            operation.fault = Some(reason);
        }
    }
}

impl CloudClient for AzureClient {
    type Error = AzureClientError;

    fn qualify(&self, id: &ResourceId) -> String {
        id.arm_path(&self.subscription_id)
    }

    fn get<'a>(&'a self, id: &'a ResourceId) -> CloudFuture<'a, Option<Resource>, Self::Error> {
        Box::pin(async move {
            let url = resource_url(
                &self.management_endpoint,
                &self.qualify(id),
                id.kind.api_version(),
            );
            let reply = self.send(Method::GET, &url, None).await?;
            if reply.status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = reply.into_success()?;
            let body: ResourceBody = serde_json::from_value(response.body)
                .map_err(|err| AzureClientError::Decode(err.to_string()))?;
            Ok(Some(Resource {
                id: body.id.unwrap_or_else(|| self.qualify(id)),
                properties: body.properties.unwrap_or(Value::Null),
            }))
        })
    }

    fn create<'a>(
        &'a self,
        id: &'a ResourceId,
        body: Value,
    ) -> CloudFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = resource_url(
                &self.management_endpoint,
                &self.qualify(id),
                id.kind.api_version(),
            );
            let response = self
                .send(Method::PUT, &url, Some(&body))
                .await?
                .into_success()?;
            // Without a status URL the resource itself reports provisioningState.
            Ok(self.operation_from(id, "create", Some(url), &response))
        })
    }

    fn action<'a>(
        &'a self,
        id: &'a ResourceId,
        action: &'a str,
        body: Option<Value>,
    ) -> CloudFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = action_url(
                &self.management_endpoint,
                &self.qualify(id),
                action,
                id.kind.api_version(),
            );
            let response = self
                .send(Method::POST, &url, body.as_ref())
                .await?
                .into_success()?;
            Ok(self.operation_from(id, action, None, &response))
        })
    }

    fn poll<'a>(&'a self, operation: &'a Operation) -> CloudFuture<'a, Operation, Self::Error> {
        Box::pin(async move {
            let url = operation.poll_url.as_deref().ok_or_else(|| {
                AzureClientError::Decode(format!(
                    "{} on {} has no status URL",
                    operation.action, operation.target
                ))
            })?;
            let response = self.send(Method::GET, url, None).await?.into_success()?;
            let mut next = operation.clone();
            apply_progress(&mut next, response.progress());
            Ok(next)
        })
    }
}
