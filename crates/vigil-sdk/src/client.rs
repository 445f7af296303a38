use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Shared HTTP plumbing for the service clients: base URL, optional bearer
/// token and the status check every call goes through.
#[derive(Clone)]
pub(crate) struct HttpCore {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCore {
    pub(crate) fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Validation(format!(
                "unsupported base url scheme '{}'",
                parsed.scheme()
            )));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        tracing::trace!(target: "vigil.api", %method, %url, "request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let res = builder.send().await?;
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            tracing::debug!(target: "vigil.api", %status, "request rejected");
            Err(ApiError::UnexpectedStatus { status, body })
        }
    }

    pub(crate) async fn send_json<T>(&self, builder: RequestBuilder) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self.send(builder).await?;
        Ok(res.json::<T>().await?)
    }
}
