use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::genai::{GeminiClient, GenerativeModel};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub genai: Arc<dyn GenerativeModel>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let genai = Arc::new(GeminiClient::new(&config.genai)?) as Arc<dyn GenerativeModel>;
        info!(model = %config.genai.model, merge = ?config.profile_list_merge, "state ready");

        Ok(Self::from_parts(config, genai))
    }

    pub fn from_parts(config: Arc<AppConfig>, genai: Arc<dyn GenerativeModel>) -> Self {
        Self {
            config,
            genai,
            sessions: SessionStore::default(),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(Arc::new(crate::genai::testing::ScriptedModel::new()))
    }

    #[cfg(test)]
    pub fn fake_with(genai: Arc<dyn GenerativeModel>) -> Self {
        use crate::chat::profile::ListMergePolicy;
        use crate::config::{GenAiConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            genai: GenAiConfig {
                api_key: "fake".into(),
                model: "fake-model".into(),
                base_url: "http://127.0.0.1:0/v1beta".into(),
                timeout_secs: 1,
            },
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            profile_list_merge: ListMergePolicy::Accumulate,
        });

        Self::from_parts(config, genai)
    }
}
