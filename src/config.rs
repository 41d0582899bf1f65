use std::fmt;

use anyhow::Context;
use serde::Deserialize;

use crate::chat::profile::ListMergePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Clone, Deserialize)]
pub struct GenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for GenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub genai: GenAiConfig,
    pub jwt: JwtConfig,
    pub profile_list_merge: ListMergePolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = var("GEMINI_API_KEY")
            .or_else(|| var("API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .context("GEMINI_API_KEY (or API_KEY) must be set")?;

        let genai = GenAiConfig {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".into()),
            base_url: var("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: var("GEMINI_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };

        // Sessions die with the process, so a per-process secret is enough by default.
        let jwt = JwtConfig {
            secret: var("JWT_SECRET").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "nutrilens".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "nutrilens-app".into()),
            ttl_minutes: var("JWT_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(12 * 60),
        };

        let profile_list_merge = match var("PROFILE_LIST_MERGE") {
            Some(v) => v
                .parse::<ListMergePolicy>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("PROFILE_LIST_MERGE")?,
            None => ListMergePolicy::default(),
        };

        Ok(Self {
            genai,
            jwt,
            profile_list_merge,
        })
    }
}
