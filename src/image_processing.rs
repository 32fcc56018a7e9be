//! Content-type handling for uploads and provider outputs.

/// MIME type recognized from the leading magic bytes, if any.
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Content type to store an upload under: the declared one when it names an
/// image, otherwise whatever the magic bytes say, otherwise PNG.
pub fn resolve_content_type(declared: Option<&str>, bytes: &[u8]) -> String {
    let declared = declared
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_lowercase())
        .filter(|value| value.starts_with("image/"));
    declared
        .or_else(|| detect_mime_type(bytes).map(str::to_string))
        .unwrap_or_else(|| "image/png".to_string())
}

/// True when the declared type or the magic bytes identify an image.
pub fn looks_like_image(declared: Option<&str>, bytes: &[u8]) -> bool {
    declared.is_some_and(|value| value.trim().to_lowercase().starts_with("image/"))
        || detect_mime_type(bytes).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbaImage};

    fn tiny_png() -> Vec<u8> {
        let mut output = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(3, 2))
            .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
            .unwrap();
        output
    }

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(detect_mime_type(&tiny_png()), Some("image/png"));
        assert_eq!(detect_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(detect_mime_type(b"GIF89a...."), Some("image/gif"));
        assert_eq!(detect_mime_type(b"hello"), None);
    }

    #[test]
    fn test_resolve_content_type() {
        let png = tiny_png();
        assert_eq!(resolve_content_type(Some("image/webp"), &png), "image/webp");
        assert_eq!(resolve_content_type(Some("Image/JPEG; q=1"), &png), "image/jpeg");
        assert_eq!(resolve_content_type(Some("application/octet-stream"), &png), "image/png");
        assert_eq!(resolve_content_type(None, &[0xFF, 0xD8, 0xFF]), "image/jpeg");
        assert_eq!(resolve_content_type(None, b"????"), "image/png");
    }

    #[test]
    fn test_looks_like_image() {
        assert!(looks_like_image(Some("image/heic"), b"opaque"));
        assert!(looks_like_image(Some("application/octet-stream"), &tiny_png()));
        assert!(looks_like_image(None, &[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!looks_like_image(Some("text/plain"), b"just some text"));
        assert!(!looks_like_image(None, b""));
    }
}
