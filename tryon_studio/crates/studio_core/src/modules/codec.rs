use crate::modules::protocol::ImagePayload;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognized image format: {0}")]
    UnknownFormat(String),
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// In-memory stand-in for a browser `File`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let bytes = read_all(path).await?;
        let mime = sniff_mime(&bytes, Some(path))
            .ok_or_else(|| CodecError::UnknownFormat(path.display().to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("image.{}", extension_for_mime(mime)));
        Ok(Self {
            name,
            mime_type: mime.to_string(),
            bytes,
        })
    }

    pub fn from_payload(payload: &ImagePayload, name: &str) -> Result<Self, CodecError> {
        Ok(Self {
            name: name.to_string(),
            mime_type: payload.mime_type.clone(),
            bytes: BASE64.decode(payload.data.as_bytes())?,
        })
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload {
            mime_type: self.mime_type.clone(),
            data: self.to_base64(),
        }
    }

    pub fn to_data_url(&self) -> String {
        to_data_url(&self.mime_type, &self.to_base64())
    }
}

/// Reads a file fully and returns its base64 payload (no `data:` prefix).
pub async fn file_to_base64(path: impl AsRef<Path>) -> Result<String, CodecError> {
    let bytes = read_all(path.as_ref()).await?;
    Ok(BASE64.encode(bytes))
}

pub fn to_data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

pub fn payload_to_data_url(payload: &ImagePayload) -> String {
    to_data_url(&payload.mime_type, &payload.data)
}

/// Parses `data:<mime>;base64,<payload>`. Malformed input yields `None`.
pub fn data_url_to_file(data_url: &str, name: &str) -> Option<ImageFile> {
    let (mime_type, payload) = split_data_url(data_url)?;
    let bytes = BASE64.decode(payload.trim().as_bytes()).ok()?;
    Some(ImageFile {
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        bytes,
    })
}

fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let (header, payload) = data_url.trim().split_once(',')?;
    let meta = header.strip_prefix("data:")?;
    let mime = meta.strip_suffix(";base64")?;
    if mime.is_empty() || !mime.contains('/') {
        return None;
    }
    Some((mime, payload))
}

pub fn sniff_mime(bytes: &[u8], path: Option<&Path>) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }

    let ext = path?
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "image/heif" => "heif",
        _ => "png",
    }
}

async fn read_all(path: &Path) -> Result<Vec<u8>, CodecError> {
    tokio::fs::read(path).await.map_err(|source| CodecError::Read {
        path: path.to_path_buf(),
        source,
    })
}
