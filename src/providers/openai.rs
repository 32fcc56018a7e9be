//! OpenAI image edits (`gpt-image-1`) using the uploaded references.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;

use super::{GeneratedImage, GenerationRequest, ImageGenerator, ProviderKind};
use crate::error::{ProviderError, assert_ok_response};

const OPENAI_EDITS_URL: &str = "https://api.openai.com/v1/images/edits";
const OPENAI_IMAGE_MODEL: &str = "gpt-image-1";
const OPENAI_IMAGE_SIZE: &str = "1024x1024";

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Option<Vec<ImageData>>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

pub struct OpenAiImageClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiImageClient {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self::with_endpoint(client, api_key, OPENAI_EDITS_URL)
    }

    pub fn with_endpoint(client: Client, api_key: &str, endpoint: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    fn build_form(&self, request: &GenerationRequest) -> Result<Form, ProviderError> {
        let name = ProviderKind::OpenAi.as_str();
        let mut form = Form::new()
            .text("model", OPENAI_IMAGE_MODEL)
            .text("prompt", request.prompt.clone())
            .text("size", OPENAI_IMAGE_SIZE);
        for image in &request.reference_images {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)
                .map_err(|err| ProviderError::request(name, err))?;
            form = form.part("image[]", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        let name = self.kind().as_str();
        if request.reference_images.is_empty() {
            return Err(ProviderError::decode(name, "image edits need at least one reference image"));
        }
        let form = self.build_form(request)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ProviderError::request(name, err))?;

        let response = assert_ok_response(name, response).await?;
        let payload: ImagesResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::decode(name, err))?;
        let b64 = payload
            .data
            .and_then(|items| items.into_iter().next())
            .and_then(|item| item.b64_json)
            .ok_or_else(|| ProviderError::empty(name))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|err| ProviderError::decode(name, err))?;

        Ok(GeneratedImage::Bytes {
            data,
            mime_type: "image/png".to_string(),
        })
    }
}
