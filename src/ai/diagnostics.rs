//! Connectivity checks that run outside the completion path.
//!
//! [`ConnectivityProbe::precheck`] runs before each chat request and only
//! stops it on a definite authentication failure. [`ConnectivityProbe::diagnose`]
//! backs the `/test_api` route and reports which API root it believes in.

use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

use super::endpoint::{EndpointResolver, chat_completions_url, looks_like_html};
use crate::core::models::DiagnosticReport;
use crate::errors::RelayError;

const HEAD_TIMEOUT: Duration = Duration::from_secs(5);
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);
const MODELS_FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

const HTML_PAGE_ERROR: &str = "The API address returned an HTML page instead of an API endpoint. \
     Check the address; it usually needs a path such as /api/v1 or /v1.";
const UNREACHABLE_ERROR: &str =
    "Could not connect to the API. Check that the API address and key are correct.";

#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    http: Client,
    resolver: EndpointResolver,
}

impl ConnectivityProbe {
    #[must_use]
    pub fn new(http: Client, resolver: EndpointResolver) -> Self {
        Self { http, resolver }
    }

    /// Lightweight reachability check ahead of a completion.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Authentication`] when the models listing answers
    /// 401. Every other outcome is logged and tolerated, since some proxies
    /// serve chat completions without exposing `/models`.
    #[tracing::instrument(level = "info", skip(self, api_key))]
    pub async fn precheck(&self, base_url: &str, api_key: &str) -> Result<(), RelayError> {
        match self.http.head(base_url).timeout(HEAD_TIMEOUT).send().await {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                warn!(status = %response.status(), "API host answered HEAD with an error status");
            }
            Ok(response) => info!(status = %response.status(), "API host is up"),
            Err(e) => warn!("HEAD request to API host failed: {}", e),
        }

        let primary = format!("{base_url}/v1/models");
        let mut response = match self.get_models(&primary, api_key, MODELS_TIMEOUT).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Connectivity check failed: {}", e);
                return Ok(());
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            let alternate = format!("{base_url}/models");
            info!(url = %alternate, "Standard models path missing, trying alternate");
            response = match self
                .get_models(&alternate, api_key, MODELS_FALLBACK_TIMEOUT)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Connectivity check failed: {}", e);
                    return Ok(());
                }
            };
        }

        match response.status() {
            StatusCode::OK => info!("Connectivity check passed"),
            StatusCode::UNAUTHORIZED => {
                return Err(RelayError::Authentication(format!(
                    "upstream answered {}",
                    StatusCode::UNAUTHORIZED
                )));
            }
            status => warn!(status = %status, "Connectivity check returned a non-200 status"),
        }

        Ok(())
    }

    /// Works out which API root `base_url` should use, for display.
    ///
    /// Input validation (key present, http(s) scheme) is the caller's job.
    #[tracing::instrument(level = "info", skip(self, api_key))]
    pub async fn diagnose(&self, base_url: &str, api_key: &str) -> DiagnosticReport {
        let stripped = base_url.trim_end_matches('/');

        let chat_url = chat_completions_url(stripped);
        match self
            .http
            .request(Method::OPTIONS, &chat_url)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .timeout(HEAD_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status() != StatusCode::NOT_FOUND => {
                info!(url = %chat_url, "Chat completions endpoint may exist");
                return DiagnosticReport::detected(
                    version_root(stripped),
                    "Found a likely API endpoint: /v1/chat/completions",
                );
            }
            Ok(_) => {}
            Err(e) => warn!(url = %chat_url, "OPTIONS probe failed: {}", e),
        }

        let mut detected: Option<String> = None;
        let mut html_response = false;

        let models_url = format!("{stripped}/v1/models");
        match self.get_models(&models_url, api_key, MODELS_TIMEOUT).await {
            Ok(response) => {
                let status = response.status();
                let content_type = content_type_of(&response);
                info!(content_type = %content_type, "Models endpoint answered");
                let body = response.text().await.unwrap_or_default();

                if content_type.contains("text/html") || looks_like_html(&body) {
                    html_response = true;
                    warn!("API address returned HTML, probably not the API endpoint");
                    if let Some(title) = page_title(&body) {
                        info!(title = %title, "HTML page title");
                    }
                } else if status == StatusCode::OK && content_type.contains("application/json") {
                    info!("Connected to API endpoint");
                    detected = Some(base_url.to_string());
                }
            }
            Err(e) => warn!(url = %models_url, "Direct probe failed: {}", e),
        }

        if html_response || detected.is_none() {
            let normalized = self.resolver.resolve(base_url).await;
            if normalized != base_url {
                info!(url = %normalized, "Trying normalized URL");
                let normalized_root = normalized.trim_end_matches('/');
                for candidate in [
                    format!("{normalized_root}/models"),
                    format!("{normalized_root}/v1/models"),
                ] {
                    if self.models_answer_json(&candidate, api_key).await {
                        info!(url = %normalized, "Normalized URL connected");
                        detected = Some(normalized.clone());
                        break;
                    }
                }
            }
        }

        match detected {
            Some(url) => DiagnosticReport::detected(url, "API connection succeeded"),
            None if html_response => DiagnosticReport::failed(HTML_PAGE_ERROR),
            None => DiagnosticReport::failed(UNREACHABLE_ERROR),
        }
    }

    async fn get_models(
        &self,
        url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .get(url)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
    }

    async fn models_answer_json(&self, url: &str, api_key: &str) -> bool {
        match self.get_models(url, api_key, MODELS_TIMEOUT).await {
            Ok(response) => {
                response.status() == StatusCode::OK
                    && content_type_of(&response).contains("application/json")
            }
            Err(e) => {
                warn!(url = %url, "Normalized URL probe failed: {}", e);
                false
            }
        }
    }
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// `{base}/v1`, without producing a doubled `/v1/v1`.
fn version_root(stripped: &str) -> String {
    let root = format!("{stripped}/v1");
    match root.strip_suffix("/v1/v1") {
        Some(prefix) => format!("{prefix}/v1"),
        None => root,
    }
}

fn page_title(body: &str) -> Option<String> {
    static TITLE_RE: std::sync::LazyLock<Option<Regex>> =
        std::sync::LazyLock::new(|| Regex::new(r"(?is)<title>(.*?)</title>").ok());

    TITLE_RE
        .as_ref()?
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_root_never_doubles() {
        assert_eq!(version_root("https://a.test"), "https://a.test/v1");
        assert_eq!(version_root("https://a.test/v1"), "https://a.test/v1");
    }

    #[test]
    fn extracts_title_case_insensitively() {
        let html = "<!DOCTYPE html><html><head><TITLE> Acme Gateway </TITLE></head></html>";
        assert_eq!(page_title(html).as_deref(), Some("Acme Gateway"));
        assert_eq!(page_title("{}"), None);
    }
}
