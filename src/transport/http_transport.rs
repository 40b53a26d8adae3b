use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use http::HeaderMap;
use reqwest::Client;
use tracing::debug;

use crate::config::settings::SettingsConfig;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// reqwest-backed transport. Cookies are kept between calls so the refresh
/// endpoint can read its own credential.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration, default_headers: HeaderMap) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn from_settings(settings: &SettingsConfig) -> Result<Self> {
        Self::new(
            &settings.base_url,
            Duration::from_millis(settings.request_timeout_ms),
            settings.default_headers.clone(),
        )
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        match path.starts_with('/') {
            true => format!("{}{}", self.base_url, path),
            false => format!("{}/{}", self.base_url, path),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let transport =
            HttpTransport::new("http://127.0.0.1:8000/", Duration::from_secs(1), HeaderMap::new())
                .unwrap();
        assert_eq!(transport.url("/api/jobs/"), "http://127.0.0.1:8000/api/jobs/");
        assert_eq!(transport.url("api/jobs/"), "http://127.0.0.1:8000/api/jobs/");
        assert_eq!(transport.url("https://other.host/x"), "https://other.host/x");
    }
}
