use {
    concierge_config::BackendConfig,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    tracing::debug,
};

use crate::error::{Error, Result};

/// HTTP client for `POST {base_url}/functions/v1/{name}` calls.
///
/// A single attempt per call; retries are layered on top.
#[derive(Clone)]
pub struct FunctionsClient {
    http: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl FunctionsClient {
    pub fn new(base_url: impl Into<String>, api_key: Secret<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.url.clone(), config.api_key.clone())
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }

    /// Invoke function `name` with a JSON body.
    ///
    /// Any non-2xx status is an error. An empty response body yields
    /// `Value::Null`.
    pub async fn invoke<B>(&self, name: &str, body: &B) -> Result<serde_json::Value>
    where
        B: Serialize + ?Sized,
    {
        let url = self.function_url(name);
        debug!(function = name, %url, "invoking backend function");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|source| Error::Request {
                function: name.to_string(),
                source,
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| Error::Request {
            function: name.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(Error::Status {
                function: name.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| Error::Decode {
            function: name.to_string(),
            source,
        })
    }
}
