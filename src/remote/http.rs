use async_trait::async_trait;
use crate::error::{ResolveError, Result};
use crate::remote::{ExecutionService, ResolveRequest, ResolveResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct HttpExecutionService {
    client: Client,
    base_url: String,
}

impl HttpExecutionService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn authorize(builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse> {
        let url = format!("{}/api/core/derived-variable/{}", self.base_url, request.uid);
        debug!(url = %url, "Requesting derived variable");

        let builder = self.client.post(&url).json(&request);
        let response = Self::authorize(builder, request.session_token.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::Remote(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        Ok(response.json::<ResolveResponse>().await?)
    }

    async fn cancel(&self, task_id: &str, session_token: Option<&str>) -> Result<()> {
        let url = format!("{}/api/core/tasks/{}", self.base_url, task_id);
        let builder = self.client.delete(&url);
        Self::authorize(builder, session_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
