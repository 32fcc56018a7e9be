//! Replicate predictions for the Flux and SDXL models.
//!
//! Predictions are created with `Prefer: wait`; anything still running when
//! the response comes back is polled until it settles.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Duration, Instant, sleep};

use super::{GeneratedImage, GenerationRequest, ImageGenerator, ProviderKind};
use crate::error::{ProviderError, assert_ok_response};

const REPLICATE_API_ROOT: &str = "https://api.replicate.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 5 * 60 * 1_000;

/// Which hosted model a [`ReplicateClient`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicateModel {
    Flux,
    Sdxl,
}

impl ReplicateModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            ReplicateModel::Flux => "black-forest-labs/flux-2-dev",
            ReplicateModel::Sdxl => "stability-ai/sdxl",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ReplicateModel::Flux => ProviderKind::Flux,
            ReplicateModel::Sdxl => ProviderKind::Sdxl,
        }
    }

    /// Model input; only SDXL takes a negative prompt.
    pub fn input(&self, request: &GenerationRequest) -> Value {
        match self {
            ReplicateModel::Flux => json!({
                "prompt": request.prompt,
                "guidance": 3.5,
                "num_outputs": 1,
            }),
            ReplicateModel::Sdxl => json!({
                "prompt": request.prompt,
                "negative_prompt": request.negative_prompt.as_deref().unwrap_or(""),
                "num_outputs": 1,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: Option<String>,
    status: Option<String>,
    output: Option<Value>,
    error: Option<Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

/// Pull the first URL out of a prediction output, which is either a single
/// string or an array of strings.
fn first_output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.iter().find_map(|item| item.as_str().map(str::to_string)),
        _ => None,
    }
}

pub struct ReplicateClient {
    client: Client,
    api_token: String,
    model: ReplicateModel,
    api_root: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ReplicateClient {
    pub fn new(client: Client, api_token: &str, model: ReplicateModel) -> Self {
        Self {
            client,
            api_token: api_token.to_string(),
            model,
            api_root: REPLICATE_API_ROOT.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }

    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    async fn create_prediction(&self, request: &GenerationRequest) -> Result<Prediction, ProviderError> {
        let name = self.model.kind().as_str();
        let response = self
            .client
            .post(format!(
                "{}/models/{}/predictions",
                self.api_root,
                self.model.model_id()
            ))
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": self.model.input(request) }))
            .send()
            .await
            .map_err(|err| ProviderError::request(name, err))?;

        let response = assert_ok_response(name, response).await?;
        response
            .json()
            .await
            .map_err(|err| ProviderError::decode(name, err))
    }

    async fn poll_prediction(&self, mut prediction: Prediction) -> Result<String, ProviderError> {
        let name = self.model.kind().as_str();
        let deadline = Instant::now() + self.poll_timeout;
        let mut poll_count = 0u32;

        loop {
            let job_id = prediction.id.clone().unwrap_or_default();
            let status = prediction.status.clone().unwrap_or_default();
            match status.as_str() {
                "succeeded" => {
                    return prediction
                        .output
                        .as_ref()
                        .and_then(first_output_url)
                        .ok_or_else(|| ProviderError::empty(name));
                }
                "failed" | "canceled" => {
                    let message = prediction
                        .error
                        .map(|err| match err {
                            Value::String(text) => text,
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(ProviderError::Job {
                        provider: name.to_string(),
                        job_id,
                        status,
                        message,
                    });
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout {
                    provider: name.to_string(),
                    timeout_ms: self.poll_timeout.as_millis() as u64,
                });
            }
            let get_url = prediction
                .urls
                .as_ref()
                .and_then(|urls| urls.get.clone())
                .ok_or_else(|| ProviderError::decode(name, "prediction has no polling url"))?;

            poll_count += 1;
            tracing::debug!(provider = name, job_id = %job_id, status = %status, poll_count, "waiting for prediction");
            sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&get_url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|err| ProviderError::request(name, err))?;
            let response = assert_ok_response(name, response).await?;
            prediction = response
                .json()
                .await
                .map_err(|err| ProviderError::decode(name, err))?;
        }
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    fn kind(&self) -> ProviderKind {
        self.model.kind()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        let prediction = self.create_prediction(request).await?;
        let url = self.poll_prediction(prediction).await?;
        Ok(GeneratedImage::Url(url))
    }
}
