//! Google Generative Language API: `gemini-2.5-flash` for style analysis
//! and `imagen-4.0-generate-001` for image generation.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    AnalysisRequest, GeneratedImage, GenerationRequest, ImageGenerator, ImageInput, ProviderKind,
    StyleAnalyzer,
};
use crate::error::{ProviderError, assert_ok_response};

const GEMINI_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_ANALYSIS_MODEL: &str = "gemini-2.5-flash";
const IMAGEN_MODEL: &str = "imagen-4.0-generate-001";
const ANALYZER_NAME: &str = "gemini-analysis";

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

impl RequestPart {
    fn inline(image: &ImageInput) -> Self {
        RequestPart::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    predictions: Option<Vec<Prediction>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// One client for both Gemini roles; they share the API key and HTTP client.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_root: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self::with_api_root(client, api_key, GEMINI_API_ROOT)
    }

    pub fn with_api_root(client: Client, api_key: &str, api_root: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            api_root: api_root.trim_end_matches('/').to_string(),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.api_root)
    }
}

fn collect_text(payload: GenerateContentResponse) -> String {
    payload
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .map(|parts| {
            parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl StyleAnalyzer for GeminiClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError> {
        let mut parts = vec![
            RequestPart::Text {
                text: request.instruction.clone(),
            },
            RequestPart::inline(&request.style_image),
        ];
        if let Some(pose) = &request.pose_image {
            parts.push(RequestPart::inline(pose));
        }
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
        };

        let response = self
            .client
            .post(self.model_url(GEMINI_ANALYSIS_MODEL, "generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::request(ANALYZER_NAME, err))?;

        let response = assert_ok_response(ANALYZER_NAME, response).await?;
        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::decode(ANALYZER_NAME, err))?;
        Ok(collect_text(payload))
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        let name = self.kind().as_str();
        let response = self
            .client
            .post(self.model_url(IMAGEN_MODEL, "predict"))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "instances": [{ "prompt": request.prompt }],
                "parameters": {
                    "sampleCount": 1,
                    "outputOptions": { "mimeType": "image/png" }
                }
            }))
            .send()
            .await
            .map_err(|err| ProviderError::request(name, err))?;

        let response = assert_ok_response(name, response).await?;
        let payload: PredictResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::decode(name, err))?;
        let prediction = payload
            .predictions
            .and_then(|predictions| predictions.into_iter().next())
            .ok_or_else(|| ProviderError::empty(name))?;
        let encoded = prediction
            .bytes_base64_encoded
            .ok_or_else(|| ProviderError::empty(name))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| ProviderError::decode(name, err))?;

        Ok(GeneratedImage::Bytes {
            data,
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| "image/png".to_string()),
        })
    }
}
