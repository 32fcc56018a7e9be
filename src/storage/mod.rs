pub mod local;
pub mod vercel;

use anyhow::Result;
use async_trait::async_trait;

pub use local::{LocalFileStorage, normalize_base_url};
pub use vercel::VercelBlobStorage;

/// Durable byte storage that hands back a publicly reachable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

pub fn get_extension_from_mime_type(mime_type: &str) -> &str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Reduce a client-supplied file name to a safe single path segment.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
