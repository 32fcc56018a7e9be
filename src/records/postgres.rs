use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgPool,
    postgres::PgPoolOptions,
    types::Json,
};
use tokio::sync::OnceCell;

use super::{GenerationRecord, GenerationStore, ManualPrompts, ProviderResults};

/// Applied in order on first use. Tables created by earlier deployments lack
/// `final_prompt`, so it is added when missing.
const SCHEMA_SQL: [&str; 2] = [
    r#"
CREATE TABLE IF NOT EXISTS generations (
    id text PRIMARY KEY,
    created_at timestamptz NOT NULL DEFAULT now(),
    user_prompt text NOT NULL,
    style_prompt text NOT NULL,
    final_prompt text NOT NULL DEFAULT '',
    negative_prompt text,
    style_image_url text NOT NULL,
    pose_image_url text,
    results jsonb NOT NULL,
    manual_prompts jsonb NOT NULL
)
"#,
    "ALTER TABLE generations ADD COLUMN IF NOT EXISTS final_prompt text NOT NULL DEFAULT ''",
];

const INSERT_SQL: &str = r#"
INSERT INTO generations (
    id,
    created_at,
    user_prompt,
    style_prompt,
    final_prompt,
    negative_prompt,
    style_image_url,
    pose_image_url,
    results,
    manual_prompts
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

const LIST_RECENT_SQL: &str = r#"
SELECT id, COALESCE(created_at, now()) AS created_at, user_prompt, style_prompt, final_prompt, negative_prompt,
       style_image_url, pose_image_url, results, manual_prompts
FROM generations
ORDER BY created_at DESC
LIMIT $1
"#;

/// Row shape of the `generations` table.
#[derive(Debug, sqlx::FromRow)]
struct GenerationRow {
    id: String,
    created_at: DateTime<Utc>,
    user_prompt: String,
    style_prompt: String,
    final_prompt: String,
    negative_prompt: Option<String>,
    style_image_url: String,
    pose_image_url: Option<String>,
    results: Json<ProviderResults>,
    manual_prompts: Json<ManualPrompts>,
}

impl From<GenerationRow> for GenerationRecord {
    fn from(row: GenerationRow) -> Self {
        Self {
            id: row.id,
            created_at: row.created_at,
            user_prompt: row.user_prompt,
            style_prompt: row.style_prompt,
            final_prompt: row.final_prompt,
            negative_prompt: row.negative_prompt,
            style_image_url: row.style_image_url,
            pose_image_url: row.pose_image_url,
            results: row.results.0,
            manual_prompts: row.manual_prompts.0,
        }
    }
}

/// Postgres-backed store. The table is created lazily on first use.
pub struct PgGenerationStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PgGenerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Build a lazily connecting pool; no connection is attempted until the
    /// first query.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .context("invalid DATABASE_URL")?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA_SQL {
                    sqlx::query(statement)
                        .execute(&self.pool)
                        .await
                        .context("prepare generations table")?;
                }
                tracing::debug!("generations table ready");
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    async fn insert(&self, record: &GenerationRecord) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(INSERT_SQL)
            .bind(&record.id)
            .bind(record.created_at)
            .bind(&record.user_prompt)
            .bind(&record.style_prompt)
            .bind(&record.final_prompt)
            .bind(record.negative_prompt.as_deref())
            .bind(&record.style_image_url)
            .bind(record.pose_image_url.as_deref())
            .bind(Json(&record.results))
            .bind(Json(&record.manual_prompts))
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert generation {}", record.id))?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<GenerationRecord>> {
        self.ensure_schema().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<GenerationRow> = sqlx::query_as(LIST_RECENT_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("list generations")?;
        Ok(rows.into_iter().map(GenerationRecord::from).collect())
    }
}
