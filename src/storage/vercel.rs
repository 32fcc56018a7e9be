use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::BlobStore;

const VERCEL_BLOB_API: &str = "https://blob.vercel-storage.com";
const VERCEL_BLOB_API_VERSION: &str = "7";

/// Blob store backed by Vercel Blob; objects are uploaded with public access.
#[derive(Clone, Debug)]
pub struct VercelBlobStorage {
    client: Client,
    token: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct PutBlobResponse {
    url: Option<String>,
}

impl VercelBlobStorage {
    pub fn new(client: Client, token: String) -> Self {
        Self {
            client,
            token,
            endpoint: VERCEL_BLOB_API.to_string(),
        }
    }

    pub fn with_endpoint(client: Client, token: String, endpoint: &str) -> Self {
        Self {
            client,
            token,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for VercelBlobStorage {
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let pathname = path.trim_start_matches('/');
        let response = self
            .client
            .put(format!("{}/{pathname}", self.endpoint))
            .bearer_auth(&self.token)
            .header("x-api-version", VERCEL_BLOB_API_VERSION)
            .header("x-content-type", content_type)
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("blob upload failed for {pathname}: {status} {text}"));
        }
        let payload: PutBlobResponse = response.json().await?;
        payload
            .url
            .ok_or_else(|| anyhow!("blob upload for {pathname} returned no url"))
    }
}
