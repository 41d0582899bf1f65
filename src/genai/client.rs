use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use super::dto::{GenerateContentRequest, GenerateContentResponse};
use super::error::GenAiError;
use crate::config::GenAiConfig;

/// A hosted model answering `generateContent` calls.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenAiError>;
}

/// Sends `request` and returns the response text, failing when there is none.
pub async fn generate_text(
    model: &dyn GenerativeModel,
    request: &GenerateContentRequest,
) -> Result<String, GenAiError> {
    let response = model.generate_content(request).await?;
    response.text().ok_or_else(|| GenAiError::EmptyResponse {
        reason: response.empty_reason(),
    })
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(cfg: &GenAiConfig) -> Result<Self, GenAiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenAiError> {
        let started = Instant::now();
        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timeout = e.is_timeout(), "generateContent transport error");
                GenAiError::from(e)
            })?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            warn!(%status, "generateContent rejected");
            return Err(GenAiError::from_status(status.as_u16(), &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            candidates = parsed.candidates.len(),
            "generateContent ok"
        );
        Ok(parsed)
    }
}
