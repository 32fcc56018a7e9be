//! The generate request pipeline.
//!
//! Inputs are uploaded first so the record always points at stable URLs,
//! then the style analyzer engineers a prompt (falling back to a fixed
//! triple), then the four generators run as independent branches whose
//! outputs are re-hosted on the blob store. One record is written at the end.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::image_processing::resolve_content_type;
use crate::prompts::{StylePrompt, build_style_prompt_request, parse_style_prompt};
use crate::providers::{
    AnalysisRequest, GeneratedImage, GenerationRequest, ImageFetcher, ImageGenerator, ImageInput,
    StyleAnalyzer,
};
use crate::records::{GenerationRecord, GenerationStore, ManualPrompts, ProviderResults};
use crate::settle::{Settled, bounded, settle_all};
use crate::storage::{BlobStore, get_extension_from_mime_type, sanitize_file_name};

/// Validated user input for one generate request.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub user_prompt: String,
    pub style_image: ImageInput,
    pub pose_image: Option<ImageInput>,
}

/// JSON body returned by the generate endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub id: String,
    pub user_prompt: String,
    pub style_prompt: String,
    pub final_prompt: String,
    pub negative_prompt: String,
    pub style_image_url: String,
    pub pose_image_url: Option<String>,
    pub results: ProviderResults,
    pub manual_prompts: ManualPrompts,
}

impl From<&GenerationRecord> for GenerationResponse {
    fn from(record: &GenerationRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_prompt: record.user_prompt.clone(),
            style_prompt: record.style_prompt.clone(),
            final_prompt: record.final_prompt.clone(),
            negative_prompt: record.negative_prompt.clone().unwrap_or_default(),
            style_image_url: record.style_image_url.clone(),
            pose_image_url: record.pose_image_url.clone(),
            results: record.results.clone(),
            manual_prompts: record.manual_prompts.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Deadline for the analysis call and for each generation branch.
    /// `None` leaves upstream calls unbounded.
    pub provider_timeout: Option<Duration>,
}

/// Collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub blob_store: Arc<dyn BlobStore>,
    pub records: Arc<dyn GenerationStore>,
    pub analyzer: Arc<dyn StyleAnalyzer>,
    pub generators: Vec<Arc<dyn ImageGenerator>>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

pub struct Pipeline {
    deps: PipelineDeps,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, options: PipelineOptions) -> Self {
        Self { deps, options }
    }

    pub async fn run(&self, input: GenerateInput) -> Result<GenerationResponse> {
        let id = Uuid::new_v4().to_string();
        tracing::info!(id = %id, has_pose = input.pose_image.is_some(), "generation started");

        let style_image_url = self
            .upload_input(&input.style_image)
            .await
            .context("upload style reference")?;
        let pose_image_url = match &input.pose_image {
            Some(pose) => Some(self.upload_input(pose).await.context("upload pose reference")?),
            None => None,
        };

        let style_prompt = self.engineer_prompt(&input).await;

        let mut reference_images = vec![input.style_image.clone()];
        if let Some(pose) = &input.pose_image {
            reference_images.push(pose.clone());
        }
        let request = GenerationRequest {
            prompt: style_prompt.final_prompt.clone(),
            negative_prompt: Some(style_prompt.negative_prompt.clone())
                .filter(|negative| !negative.is_empty()),
            reference_images,
        };

        let results = self.generate_all(&request).await;
        tracing::info!(
            id = %id,
            succeeded = results.succeeded(),
            "generation branches settled"
        );

        let record = GenerationRecord {
            id,
            created_at: Utc::now(),
            user_prompt: input.user_prompt,
            style_prompt: style_prompt.style_summary,
            manual_prompts: ManualPrompts::from_final_prompt(&style_prompt.final_prompt),
            final_prompt: style_prompt.final_prompt,
            negative_prompt: Some(style_prompt.negative_prompt),
            style_image_url,
            pose_image_url,
            results,
        };
        self.deps
            .records
            .insert(&record)
            .await
            .context("persist generation record")?;

        Ok(GenerationResponse::from(&record))
    }

    async fn upload_input(&self, image: &ImageInput) -> Result<String> {
        let path = format!(
            "inputs/{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(&image.file_name)
        );
        self.deps
            .blob_store
            .store(&path, &image.bytes, &image.mime_type)
            .await
    }

    /// Never fails: analysis errors and unparseable output both fall back.
    async fn engineer_prompt(&self, input: &GenerateInput) -> StylePrompt {
        let request = AnalysisRequest {
            instruction: build_style_prompt_request(&input.user_prompt),
            style_image: input.style_image.clone(),
            pose_image: input.pose_image.clone(),
        };
        let analysis = bounded(
            self.options.provider_timeout,
            self.deps.analyzer.analyze(&request),
            |limit| ProviderError::Timeout {
                provider: "gemini-analysis".to_string(),
                timeout_ms: limit.as_millis() as u64,
            },
        )
        .await;

        let parsed = match analysis {
            Ok(text) => {
                let parsed = parse_style_prompt(&text);
                if parsed.is_none() {
                    tracing::warn!("style analysis output was not usable JSON, using fallback prompt");
                }
                parsed
            }
            Err(err) => {
                tracing::warn!("style analysis failed, using fallback prompt: {err}");
                None
            }
        };
        parsed
            .unwrap_or_else(|| StylePrompt::fallback(&input.user_prompt))
            .trimmed()
    }

    async fn generate_all(&self, request: &GenerationRequest) -> ProviderResults {
        let kinds: Vec<_> = self.deps.generators.iter().map(|g| g.kind()).collect();
        let settled = settle_all(
            self.deps
                .generators
                .iter()
                .map(|generator| self.run_branch(generator.as_ref(), request)),
        )
        .await;

        let mut results = ProviderResults::default();
        for (kind, outcome) in kinds.into_iter().zip(settled) {
            match outcome {
                Settled::Fulfilled(url) => results.set(kind, Some(url)),
                Settled::Rejected(err) => {
                    tracing::warn!(provider = %kind, "generation branch failed: {err:#}");
                    results.set(kind, None);
                }
            }
        }
        results
    }

    /// Generate with one provider and re-host the output on the blob store.
    async fn run_branch(
        &self,
        generator: &dyn ImageGenerator,
        request: &GenerationRequest,
    ) -> Result<String> {
        let kind = generator.kind();
        let branch = async {
            let (data, mime_type) = match generator.generate(request).await? {
                GeneratedImage::Bytes { data, mime_type } => (data, mime_type),
                GeneratedImage::Url(url) => {
                    let data = self.deps.fetcher.fetch(kind, &url).await?;
                    let mime_type = resolve_content_type(None, &data);
                    (data, mime_type)
                }
            };
            let ext = match get_extension_from_mime_type(&mime_type) {
                "bin" => "png",
                ext => ext,
            };
            let path = format!("outputs/{kind}-{}.{ext}", Uuid::new_v4());
            self.deps.blob_store.store(&path, &data, &mime_type).await
        };
        bounded(self.options.provider_timeout, branch, |limit| {
            anyhow::Error::from(ProviderError::Timeout {
                provider: kind.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })
        })
        .await
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;
    use crate::providers::ProviderKind;

    fn input(with_pose: bool) -> GenerateInput {
        GenerateInput {
            user_prompt: "a heron".to_string(),
            style_image: ImageInput::new(vec![1, 2, 3], "image/png", "style ref.png"),
            pose_image: with_pose.then(|| ImageInput::new(vec![4, 5], "image/jpeg", "pose.jpg")),
        }
    }

    #[tokio::test]
    async fn test_all_providers_succeed() {
        let harness = Harness::new(
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [
                Script::Bytes,
                Script::Bytes,
                Script::Url("https://replicate.delivery/flux.png".to_string()),
                Script::Url("https://replicate.delivery/sdxl.png".to_string()),
            ],
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(true))
            .await
            .unwrap();

        assert_eq!(response.style_prompt, "ink wash, muted greens");
        assert_eq!(response.final_prompt, "a heron in ink wash");
        assert_eq!(response.negative_prompt, "neon");
        assert_eq!(response.manual_prompts.sora, "a heron in ink wash");
        assert_eq!(response.results.succeeded(), 4);
        assert!(response.style_image_url.starts_with("https://blob.test/inputs/"));
        assert!(response.style_image_url.ends_with("-style_ref.png"));
        assert!(response.pose_image_url.is_some());

        let flux = response.results.flux.as_deref().unwrap();
        assert!(flux.starts_with("https://blob.test/outputs/flux-"));
        assert!(flux.ends_with(".jpg"));
        assert_eq!(harness.fetcher.fetched.lock().unwrap().len(), 2);

        let openai_seen = harness.generators[0].seen.lock().unwrap();
        assert_eq!(openai_seen[0].reference_images.len(), 2);
        assert_eq!(openai_seen[0].negative_prompt.as_deref(), Some("neon"));

        let stored = harness.records.list_recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, response.id);
    }

    #[tokio::test]
    async fn test_single_failure_leaves_other_results() {
        let harness = Harness::new(
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [
                Script::Bytes,
                Script::Fail,
                Script::Bytes,
                Script::Url("https://replicate.delivery/sdxl.png".to_string()),
            ],
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap();

        assert!(response.results.gemini.is_none());
        assert!(response.results.openai.is_some());
        assert!(response.results.flux.is_some());
        assert!(response.results.sdxl.is_some());
        assert!(response.pose_image_url.is_none());
        assert_eq!(harness.provider_calls(), 4);
    }

    #[tokio::test]
    async fn test_all_providers_fail_still_returns_prompt() {
        let harness = Harness::new(
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [Script::Fail, Script::Fail, Script::Fail, Script::Fail],
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap();

        assert_eq!(response.final_prompt, "a heron in ink wash");
        assert_eq!(response.results, ProviderResults::default());
        assert_eq!(harness.records.len().await, 1);
    }

    #[tokio::test]
    async fn test_unparseable_analysis_uses_fallback() {
        let harness = Harness::new(
            FakeAnalyzer::replying("Sorry, I can't describe this image."),
            [Script::Fail, Script::Fail, Script::Fail, Script::Fail],
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap();

        let fallback = StylePrompt::fallback("a heron");
        assert_eq!(response.final_prompt, fallback.final_prompt);
        assert_eq!(response.style_prompt, fallback.style_summary);
        assert_eq!(response.negative_prompt, fallback.negative_prompt);
    }

    #[tokio::test]
    async fn test_analysis_error_does_not_block_generation() {
        let harness = Harness::new(
            FakeAnalyzer::failing("connection reset"),
            [Script::Bytes, Script::Bytes, Script::Bytes, Script::Bytes],
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(true))
            .await
            .unwrap();

        assert!(response.final_prompt.starts_with("a heron. Render in"));
        assert_eq!(response.results.succeeded(), 4);
        assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*harness.analyzer.last_pose.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_failed_refetch_or_upload_nulls_only_that_branch() {
        let mut fetcher = FakeFetcher::default();
        fetcher.broken = HashSet::from(["https://replicate.delivery/gone.png".to_string()]);
        let harness = Harness::with_parts(
            FakeBlobStore::default(),
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [
                Script::Bytes,
                Script::Bytes,
                Script::Url("https://replicate.delivery/gone.png".to_string()),
                Script::Url("https://replicate.delivery/sdxl.png".to_string()),
            ],
            fetcher,
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap();

        assert!(response.results.flux.is_none());
        assert!(response.results.sdxl.is_some());
    }

    #[tokio::test]
    async fn test_output_store_failure_is_branch_local() {
        let blob_store = FakeBlobStore {
            fail_prefix: Some("outputs/openai-".to_string()),
            ..Default::default()
        };
        let harness = Harness::with_parts(
            blob_store,
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [Script::Bytes, Script::Bytes, Script::Bytes, Script::Bytes],
            FakeFetcher::default(),
        );

        let response = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap();

        assert!(response.results.openai.is_none());
        assert_eq!(response.results.succeeded(), 3);
    }

    #[tokio::test]
    async fn test_input_upload_failure_aborts_before_providers() {
        let blob_store = FakeBlobStore {
            fail_prefix: Some("inputs/".to_string()),
            ..Default::default()
        };
        let harness = Harness::with_parts(
            blob_store,
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [Script::Bytes, Script::Bytes, Script::Bytes, Script::Bytes],
            FakeFetcher::default(),
        );

        let err = harness
            .pipeline(PipelineOptions::default())
            .run(input(false))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("upload style reference"));
        assert_eq!(harness.provider_calls(), 0);
        assert_eq!(harness.analyzer.calls.load(Ordering::SeqCst), 0);
        assert!(harness.records.is_empty().await);
    }

    #[tokio::test]
    async fn test_hanging_provider_is_cut_off_by_timeout() {
        let harness = Harness::new(
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [Script::Bytes, Script::Hang, Script::Bytes, Script::Bytes],
        );
        let options = PipelineOptions {
            provider_timeout: Some(Duration::from_millis(50)),
        };

        let response = harness.pipeline(options).run(input(false)).await.unwrap();

        assert!(response.results.gemini.is_none());
        assert_eq!(response.results.succeeded(), 3);
    }

    #[tokio::test]
    async fn test_identical_requests_get_distinct_ids() {
        let harness = Harness::new(
            FakeAnalyzer::replying(ANALYSIS_JSON),
            [Script::Bytes, Script::Bytes, Script::Bytes, Script::Bytes],
        );
        let pipeline = harness.pipeline(PipelineOptions::default());

        let first = pipeline.run(input(false)).await.unwrap();
        let second = pipeline.run(input(false)).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(harness.records.len().await, 2);
        let outputs: HashSet<String> = harness
            .blob_store
            .paths()
            .into_iter()
            .filter(|path| path.starts_with("outputs/"))
            .collect();
        assert_eq!(outputs.len(), 8);
    }

    #[test]
    fn test_response_json_shape() {
        let record = GenerationRecord {
            id: "id-1".to_string(),
            created_at: Utc::now(),
            user_prompt: "u".to_string(),
            style_prompt: "s".to_string(),
            final_prompt: "f".to_string(),
            negative_prompt: None,
            style_image_url: "https://blob.test/inputs/a.png".to_string(),
            pose_image_url: None,
            results: ProviderResults::default(),
            manual_prompts: ManualPrompts::from_final_prompt("f"),
        };
        let value = serde_json::to_value(GenerationResponse::from(&record)).unwrap();
        for key in [
            "id",
            "userPrompt",
            "stylePrompt",
            "finalPrompt",
            "negativePrompt",
            "styleImageUrl",
            "poseImageUrl",
            "results",
            "manualPrompts",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["negativePrompt"], "");
        for provider in ProviderKind::ALL {
            assert!(value["results"][provider.as_str()].is_null());
        }
    }
}
