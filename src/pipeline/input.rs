//! Input resolution: turn a data URL, an uploaded file, a local path or an
//! HTTP URL into a [`DocumentInput`].
//!
//! The content itself decides what it is. `%PDF` magic bytes mean a PDF;
//! anything `image::guess_format` recognises is an image. A declared content
//! type is only consulted when sniffing finds nothing.

use crate::error::DatasheetError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::{debug, info};

/// A document ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentInput {
    /// A single raster image, sent to the model as-is.
    Image { bytes: Vec<u8>, mime_type: String },
    /// A paginated document, rasterised page by page.
    Pdf { bytes: Vec<u8> },
}

impl DocumentInput {
    pub fn is_paginated(&self) -> bool {
        matches!(self, DocumentInput::Pdf { .. })
    }

    pub fn kind(&self) -> &str {
        match self {
            DocumentInput::Image { mime_type, .. } => mime_type,
            DocumentInput::Pdf { .. } => "application/pdf",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DocumentInput::Image { bytes, .. } | DocumentInput::Pdf { bytes } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Decode a `data:<mime>;base64,<payload>` URL.
///
/// Accepts image types and `application/pdf`. Only base64 payloads are
/// supported.
pub fn parse_data_url(url: &str) -> Result<DocumentInput, DatasheetError> {
    let invalid = |reason: &str| DatasheetError::InvalidDataUrl {
        reason: reason.to_string(),
    };

    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| invalid("must start with 'data:'"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' before the payload"))?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or("").trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(invalid("only base64 payloads are supported"));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(&format!("base64 decode failed: {e}")))?;
    if bytes.is_empty() {
        return Err(invalid("empty payload"));
    }

    if mime_type.starts_with("image/") {
        debug!("Decoded {} data URL: {} bytes", mime_type, bytes.len());
        Ok(DocumentInput::Image { bytes, mime_type })
    } else if mime_type == "application/pdf" {
        Ok(DocumentInput::Pdf { bytes })
    } else {
        Err(DatasheetError::UnsupportedMediaType {
            content_type: if mime_type.is_empty() {
                "(none)".to_string()
            } else {
                mime_type
            },
        })
    }
}

/// Classify uploaded bytes, falling back to the declared content type.
pub fn from_upload(
    bytes: Vec<u8>,
    declared: Option<&str>,
) -> Result<DocumentInput, DatasheetError> {
    if bytes.is_empty() {
        return Err(DatasheetError::InvalidInput("uploaded file is empty".into()));
    }

    if bytes.starts_with(b"%PDF") {
        return Ok(DocumentInput::Pdf { bytes });
    }
    if let Ok(format) = image::guess_format(&bytes) {
        return Ok(DocumentInput::Image {
            mime_type: format.to_mime_type().to_string(),
            bytes,
        });
    }

    let declared = declared
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    match declared.as_str() {
        "application/pdf" => Ok(DocumentInput::Pdf { bytes }),
        ct if ct.starts_with("image/") => Ok(DocumentInput::Image {
            mime_type: declared.clone(),
            bytes,
        }),
        "" => Err(DatasheetError::UnsupportedMediaType {
            content_type: "(unknown)".to_string(),
        }),
        _ => Err(DatasheetError::UnsupportedMediaType {
            content_type: declared.clone(),
        }),
    }
}

/// Load a local file or download an HTTP(S) URL.
pub async fn load_source(source: &str, timeout_secs: u64) -> Result<DocumentInput, DatasheetError> {
    if source.starts_with("data:") {
        return parse_data_url(source);
    }
    if is_url(source) {
        let (bytes, content_type) = download_url(source, timeout_secs).await?;
        return from_upload(bytes, content_type.as_deref());
    }

    let bytes = read_local(Path::new(source)).await?;
    from_upload(bytes, None)
}

async fn read_local(path: &Path) -> Result<Vec<u8>, DatasheetError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DatasheetError::UnreadableInput {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Download a URL into memory, returning the body and its content type.
async fn download_url(
    url: &str,
    timeout_secs: u64,
) -> Result<(Vec<u8>, Option<String>), DatasheetError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DatasheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DatasheetError::Timeout {
                context: format!("download of {url}"),
                secs: timeout_secs,
            }
        } else {
            DatasheetError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DatasheetError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DatasheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok((bytes.to_vec(), content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn data_url_image() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(PNG_MAGIC));
        let input = parse_data_url(&url).unwrap();
        assert_eq!(
            input,
            DocumentInput::Image {
                bytes: PNG_MAGIC.to_vec(),
                mime_type: "image/png".into()
            }
        );
        assert!(!input.is_paginated());
    }

    #[test]
    fn data_url_pdf_is_paginated() {
        let url = format!("data:application/pdf;base64,{}", STANDARD.encode(b"%PDF-1.7"));
        assert!(parse_data_url(&url).unwrap().is_paginated());
    }

    #[test]
    fn data_url_errors() {
        assert!(matches!(
            parse_data_url("image/png;base64,AAAA"),
            Err(DatasheetError::InvalidDataUrl { .. })
        ));
        assert!(matches!(
            parse_data_url("data:image/png,rawtext"),
            Err(DatasheetError::InvalidDataUrl { .. })
        ));
        assert!(matches!(
            parse_data_url("data:image/png;base64,!!!"),
            Err(DatasheetError::InvalidDataUrl { .. })
        ));
        assert!(matches!(
            parse_data_url("data:text/plain;base64,aGVsbG8="),
            Err(DatasheetError::UnsupportedMediaType { .. })
        ));
    }

    #[test]
    fn upload_sniffs_content_before_declared_type() {
        let pdf = from_upload(b"%PDF-1.4 ...".to_vec(), Some("image/png")).unwrap();
        assert!(pdf.is_paginated());

        let png = from_upload(PNG_MAGIC.to_vec(), Some("application/octet-stream")).unwrap();
        assert_eq!(png.kind(), "image/png");
    }

    #[test]
    fn upload_falls_back_to_declared_type() {
        let img = from_upload(b"opaque".to_vec(), Some("image/x-custom; q=1")).unwrap();
        assert_eq!(img.kind(), "image/x-custom");

        let err = from_upload(b"hello".to_vec(), Some("text/plain")).unwrap_err();
        assert!(matches!(err, DatasheetError::UnsupportedMediaType { ref content_type } if content_type == "text/plain"));

        assert!(matches!(
            from_upload(Vec::new(), Some("image/png")),
            Err(DatasheetError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn load_source_reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();

        let input = load_source(path.to_str().unwrap(), 5).await.unwrap();
        assert!(input.is_paginated());

        let err = load_source("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, DatasheetError::UnreadableInput { .. }));
    }
}
