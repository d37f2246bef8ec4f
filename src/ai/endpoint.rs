//! Endpoint discovery for OpenAI-compatible deployments.
//!
//! Self-hosted gateways and proxies mount the API under different prefixes,
//! and a bare host often serves a web front end instead of the API. The
//! resolver probes a handful of well-known prefixes and returns the first one
//! that looks like a real API root.
//!
//! Both signals used here are heuristics. A probe that is not answered with
//! 404 is taken as "the route exists" (gateways commonly answer `HEAD` on a
//! valid route with 200, 401 or 405), and a `/models` body that is neither
//! JSON nor an HTML page is accepted as a weaker hint.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefixes tried, in order, when the base URL looks like a site root.
pub const CANDIDATE_PATHS: [&str; 4] = ["/v1", "/api/v1", "/api", "/openai/v1"];

#[derive(Debug, Clone)]
pub struct EndpointResolver {
    http: Client,
    probe_timeout: Duration,
}

impl EndpointResolver {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self {
            http,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Returns the most likely API root for `base_url`.
    ///
    /// Never fails. When no probe succeeds the input is returned with its
    /// trailing slashes removed.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn resolve(&self, base_url: &str) -> String {
        let base = strip_trailing_slash(base_url);

        if base.ends_with("/v1") {
            debug!("Base URL already ends with /v1");
            return base;
        }

        if !is_site_root(&base) {
            debug!("Base URL has a specific path, leaving it alone");
            return base;
        }

        info!(base_url = %base, "Base URL looks like a site root, probing for the API");

        let direct = format!("{base}/v1/chat/completions");
        if self.route_exists(&direct).await == Some(true) {
            let root = format!("{base}/v1");
            info!(api_root = %root, "Chat completions endpoint answered");
            return root;
        }

        for path in CANDIDATE_PATHS {
            let root = format!("{base}{path}");

            if self.route_exists(&chat_completions_url(&root)).await == Some(true) {
                info!(api_root = %root, "Found API root via chat completions");
                return root;
            }

            if self.models_look_like_api(&root).await {
                info!(api_root = %root, "Found API root via models listing");
                return root;
            }
        }

        info!(base_url = %base, "No API root detected, keeping base URL");
        base
    }

    /// `Some(true)` when the route answered with anything but 404, `None`
    /// when the probe itself failed.
    async fn route_exists(&self, url: &str) -> Option<bool> {
        debug!(url = %url, "HEAD probe");
        match self
            .http
            .head(url)
            .header(ACCEPT, "application/json")
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => Some(response.status() != StatusCode::NOT_FOUND),
            Err(e) => {
                warn!(url = %url, "Probe failed: {}", e);
                None
            }
        }
    }

    async fn models_look_like_api(&self, root: &str) -> bool {
        let url = format!("{root}/models");
        debug!(url = %url, "GET probe");

        let response = match self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, "Probe failed: {}", e);
                return false;
            }
        };

        if is_json_content_type(&response) {
            return true;
        }

        match response.text().await {
            Ok(body) => !looks_like_html(&body),
            Err(e) => {
                warn!(url = %url, "Failed to read probe body: {}", e);
                false
            }
        }
    }
}

#[must_use]
pub fn strip_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Chat completions URL for an API root, without doubling `/v1`.
#[must_use]
pub fn chat_completions_url(root: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.ends_with("/v1") {
        format!("{root}/chat/completions")
    } else {
        format!("{root}/v1/chat/completions")
    }
}

pub(crate) fn is_json_content_type(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

pub(crate) fn looks_like_html(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html")
}

fn is_site_root(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.path(), "" | "/"),
        Err(e) => {
            debug!(url = %url, "Base URL does not parse: {}", e);
            false
        }
    }
}
