use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub default_model: String,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns an error if `RELAY_PORT` is set but is not a valid port number.
    pub fn from_env() -> Result<Self, String> {
        let port = match env::var("RELAY_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| format!("RELAY_PORT: {e}"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            host: env::var("RELAY_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn stored_defaults(&self) -> StoredConfig {
        StoredConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_api_base.clone(),
            model: self.default_model.clone(),
        }
    }
}

/// Defaults used by every chat request that doesn't override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Partial update as posted by the configuration form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Display form of the stored configuration, safe to hand back to a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl From<&StoredConfig> for MaskedConfig {
    fn from(config: &StoredConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.as_deref().map(mask_api_key).unwrap_or_default(),
        }
    }
}

/// Shared handle to the stored defaults.
///
/// Cloning the handle shares the underlying configuration. Updates only
/// replace fields for which a non-empty value was supplied.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<StoredConfig>>,
}

impl ConfigStore {
    #[must_use]
    pub fn new(initial: StoredConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn snapshot(&self) -> StoredConfig {
        self.inner.read().await.clone()
    }

    pub async fn update(&self, update: ConfigUpdate) -> StoredConfig {
        let mut current = self.inner.write().await;

        if let Some(key) = non_empty(update.api_key) {
            current.api_key = Some(key);
            tracing::info!("API key updated");
        }
        if let Some(base_url) = non_empty(update.base_url) {
            tracing::info!(base_url = %base_url, "Base URL updated");
            current.base_url = base_url;
        }
        if let Some(model) = non_empty(update.model) {
            tracing::info!(model = %model, "Model updated");
            current.model = model;
        }

        current.clone()
    }

    pub async fn masked(&self) -> MaskedConfig {
        MaskedConfig::from(&*self.inner.read().await)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Shows only the first 6 and last 4 characters of a key.
///
/// Keys shorter than 10 characters are hidden entirely.
#[must_use]
pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() < 10 {
        return String::new();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        ConfigStore::new(StoredConfig {
            api_key: Some("sk-original-key-1234".to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    #[test]
    fn masks_long_keys() {
        assert_eq!(mask_api_key("sk-abcdefghijklmnop"), "sk-abc***mnop");
    }

    #[test]
    fn hides_short_keys() {
        assert_eq!(mask_api_key("sk-short"), "");
        assert_eq!(mask_api_key(""), "");
    }

    #[tokio::test]
    async fn update_keeps_fields_that_are_absent_or_empty() {
        let store = store();
        let updated = store
            .update(ConfigUpdate {
                api_key: Some(String::new()),
                base_url: None,
                model: Some("gpt-4o-mini".to_string()),
            })
            .await;

        assert_eq!(updated.api_key.as_deref(), Some("sk-original-key-1234"));
        assert_eq!(updated.base_url, DEFAULT_BASE_URL);
        assert_eq!(updated.model, "gpt-4o-mini");
        assert_eq!(store.snapshot().await, updated);
    }

    #[tokio::test]
    async fn clones_share_the_same_configuration() {
        let store = store();
        let other = store.clone();
        other
            .update(ConfigUpdate {
                base_url: Some("https://proxy.example.com".to_string()),
                ..ConfigUpdate::default()
            })
            .await;

        assert_eq!(store.snapshot().await.base_url, "https://proxy.example.com");
    }

    #[tokio::test]
    async fn masked_update_reflects_that_write_only() {
        let store = store();
        let written = store
            .update(ConfigUpdate {
                api_key: Some("sk-first-written-key".to_string()),
                ..ConfigUpdate::default()
            })
            .await;
        store
            .update(ConfigUpdate {
                api_key: Some("sk-second-written-key".to_string()),
                model: Some("gpt-4o".to_string()),
                ..ConfigUpdate::default()
            })
            .await;

        let masked = MaskedConfig::from(&written);
        assert_eq!(masked.api_key, "sk-fir***-key");
        assert_eq!(masked.model, DEFAULT_MODEL);
        assert_ne!(masked, store.masked().await);
    }

    #[tokio::test]
    async fn masked_view_never_exposes_the_key() {
        let masked = store().masked().await;
        assert_eq!(masked.api_key, "sk-ori***1234");
        assert_eq!(masked.model, DEFAULT_MODEL);
    }
}
