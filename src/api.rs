//! Axum request handlers for the HTTP API.

use anyhow::anyhow;
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::config::MAX_HISTORY_LIMIT;
use crate::error::{
    ApiError, MISSING_CREDENTIALS_MESSAGE, MISSING_INPUT_MESSAGE, PAYLOAD_TOO_LARGE_MESSAGE,
};
use crate::image_processing::{looks_like_image, resolve_content_type};
use crate::pipeline::{GenerateInput, GenerationResponse};
use crate::providers::ImageInput;
use crate::records::GenerationRecord;

const UNSUPPORTED_FILE_MESSAGE: &str = "Envie apenas arquivos de imagem.";
const INVALID_FORM_MESSAGE: &str = "Envie o formulario como multipart/form-data.";
const INVALID_LIMIT_MESSAGE: &str = "Parametro limit invalido.";

#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl UploadedFile {
    fn into_image(self, default_name: &str) -> Result<ImageInput, ApiError> {
        if !looks_like_image(self.content_type.as_deref(), &self.bytes) {
            return Err(ApiError::Validation(UNSUPPORTED_FILE_MESSAGE.to_string()));
        }
        let mime_type = resolve_content_type(self.content_type.as_deref(), &self.bytes);
        let file_name = if self.file_name.trim().is_empty() {
            default_name.to_string()
        } else {
            self.file_name
        };
        Ok(ImageInput::new(self.bytes.to_vec(), &mime_type, &file_name))
    }
}

/// Oversized bodies are the client's problem; any other read failure is
/// reported generically.
fn read_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(PAYLOAD_TOO_LARGE_MESSAGE.to_string());
    }
    ApiError::Internal(anyhow!("read multipart body: {}", err.body_text()))
}

#[derive(Debug, Default)]
struct GenerateForm {
    style: Option<UploadedFile>,
    pose: Option<UploadedFile>,
    prompt: String,
}

impl GenerateForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = GenerateForm::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) => return Err(read_error(err)),
            };
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "style" | "pose" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(|value| value.to_lowercase());
                    let bytes = field.bytes().await.map_err(read_error)?;
                    // Browsers send an empty part for an unset file input.
                    if bytes.is_empty() {
                        continue;
                    }
                    let upload = UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    };
                    if name == "style" {
                        form.style = Some(upload);
                    } else {
                        form.pose = Some(upload);
                    }
                }
                "prompt" => {
                    form.prompt = field.text().await.map_err(read_error)?;
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_input(self) -> Result<GenerateInput, ApiError> {
        let user_prompt = self.prompt.trim().to_string();
        let style = match self.style {
            Some(style) if !user_prompt.is_empty() => style,
            _ => return Err(ApiError::Validation(MISSING_INPUT_MESSAGE.to_string())),
        };
        Ok(GenerateInput {
            user_prompt,
            style_image: style.into_image("style.png")?,
            pose_image: self
                .pose
                .map(|pose| pose.into_image("pose.png"))
                .transpose()?,
        })
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn generate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("rejected generate body: {rejection}");
        ApiError::Validation(INVALID_FORM_MESSAGE.to_string())
    })?;
    let input = GenerateForm::read(&mut multipart).await?.into_input()?;
    let Some(pipeline) = state.pipeline.as_ref() else {
        return Err(ApiError::Config(MISSING_CREDENTIALS_MESSAGE.to_string()));
    };
    let response = pipeline.run(input).await?;
    tracing::info!(id = %response.id, "generation finished");
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<GenerationRecord>,
}

pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        tracing::debug!("rejected history query: {rejection}");
        ApiError::Validation(INVALID_LIMIT_MESSAGE.to_string())
    })?;
    let limit = query
        .limit
        .unwrap_or(state.history_limit)
        .clamp(1, MAX_HISTORY_LIMIT);
    let items = state.records.list_recent(limit).await?;
    Ok(Json(HistoryResponse { items }))
}
