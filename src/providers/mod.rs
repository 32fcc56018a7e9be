//! Upstream provider clients.
//!
//! Every image generator sits behind [`ImageGenerator`]; the style analysis
//! model sits behind [`StyleAnalyzer`]. Clients are constructed explicitly
//! from configuration and handed to the pipeline, so tests can swap in
//! fakes.

pub mod gemini;
pub mod openai;
pub mod replicate;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use url::Url;

use crate::error::{ProviderError, assert_ok_response};

pub use gemini::GeminiClient;
pub use openai::OpenAiImageClient;
pub use replicate::{ReplicateClient, ReplicateModel};

/// The four integrated image generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Flux,
    Sdxl,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Flux,
        ProviderKind::Sdxl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Flux => "flux",
            ProviderKind::Sdxl => "sdxl",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded reference image held in memory.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: &str, file_name: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            file_name: file_name.to_string(),
        }
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Everything a generator may use; each provider reads only what it supports.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub reference_images: Vec<ImageInput>,
}

/// A generator either hands back bytes directly or a URL to fetch them from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Bytes { data: Vec<u8>, mime_type: String },
    Url(String),
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError>;
}

/// Inputs for the single style-analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub instruction: String,
    pub style_image: ImageInput,
    pub pose_image: Option<ImageInput>,
}

#[async_trait]
pub trait StyleAnalyzer: Send + Sync {
    /// Raw model text; parsing is the caller's job.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError>;
}

pub fn validate_http_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("url is empty".to_string());
    }
    let parsed = Url::parse(trimmed).map_err(|err| format!("invalid url: {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("unsupported url scheme: {scheme}")),
    }
}

/// Retrieves images that providers host themselves.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, provider: ProviderKind, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// [`ImageFetcher`] over plain HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, provider: ProviderKind, url: &str) -> Result<Vec<u8>, ProviderError> {
        fetch_remote_image(&self.client, provider, url).await
    }
}

/// Download a provider-hosted image so it can be re-hosted.
pub async fn fetch_remote_image(
    client: &Client,
    provider: ProviderKind,
    raw_url: &str,
) -> Result<Vec<u8>, ProviderError> {
    let name = provider.as_str();
    let url = validate_http_url(raw_url).map_err(|err| ProviderError::decode(name, err))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| ProviderError::request(name, err))?;
    let response = assert_ok_response(name, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProviderError::request(name, err))?;
    if bytes.is_empty() {
        return Err(ProviderError::empty(name));
    }
    Ok(bytes.to_vec())
}
