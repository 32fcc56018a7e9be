//! Generation records and the stores that persist them.
//!
//! One record is written per generate request and never touched again;
//! history reads are a recency-ordered listing.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;

pub use memory::MemoryGenerationStore;
pub use postgres::PgGenerationStore;

/// Persisted output URL per provider; `None` marks a failed branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResults {
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub flux: Option<String>,
    pub sdxl: Option<String>,
}

impl ProviderResults {
    pub fn set(&mut self, kind: ProviderKind, url: Option<String>) {
        let slot = match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Flux => &mut self.flux,
            ProviderKind::Sdxl => &mut self.sdxl,
        };
        *slot = url;
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_deref(),
            ProviderKind::Gemini => self.gemini.as_deref(),
            ProviderKind::Flux => self.flux.as_deref(),
            ProviderKind::Sdxl => self.sdxl.as_deref(),
        }
    }

    pub fn succeeded(&self) -> usize {
        ProviderKind::ALL
            .iter()
            .filter(|kind| self.get(**kind).is_some())
            .count()
    }
}

/// Prompts for tools that have no API integration and are used by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPrompts {
    pub sora: String,
    pub imagefx: String,
}

impl ManualPrompts {
    pub fn from_final_prompt(final_prompt: &str) -> Self {
        Self {
            sora: final_prompt.to_string(),
            imagefx: final_prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub user_prompt: String,
    pub style_prompt: String,
    pub final_prompt: String,
    pub negative_prompt: Option<String>,
    pub style_image_url: String,
    pub pose_image_url: Option<String>,
    pub results: ProviderResults,
    pub manual_prompts: ManualPrompts,
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn insert(&self, record: &GenerationRecord) -> Result<()>;

    /// Most recent records first, at most `limit` of them.
    async fn list_recent(&self, limit: usize) -> Result<Vec<GenerationRecord>>;
}
