use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, ImageReader};
use sha2::{Digest, Sha256};

use crate::error::ExpanderError;

const DEFAULT_MIME: &str = "image/png";

/// Where an upload's bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes { name: String, bytes: Vec<u8> },
}

impl UploadSource {
    pub fn name(&self) -> String {
        match self {
            UploadSource::Path(path) => file_label(path),
            UploadSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// An uploaded original together with its transport encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub name: String,
    pub mime_type: String,
    /// Base64 text with no `data:` header.
    pub data: String,
    pub byte_len: usize,
    pub dimensions: Option<(u32, u32)>,
    pub sha256: String,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.byte_len)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl EncodedImage {
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], extension_hint: Option<&Path>) -> Self {
        let mime_type = sniff_mime(bytes)
            .or_else(|| extension_hint.and_then(mime_for_path))
            .unwrap_or(DEFAULT_MIME);
        Self {
            name: name.into(),
            mime_type: mime_type.to_string(),
            data: encode_bytes(bytes),
            byte_len: bytes.len(),
            dimensions: read_dimensions(bytes),
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Reads the source and encodes it. Only the read itself can fail.
pub fn read_source(source: &UploadSource) -> Result<EncodedImage, ExpanderError> {
    match source {
        UploadSource::Path(path) => {
            let bytes = fs::read(path).map_err(|source| ExpanderError::Read {
                path: path.clone(),
                source,
            })?;
            Ok(EncodedImage::from_bytes(
                file_label(path),
                &bytes,
                Some(path.as_path()),
            ))
        }
        UploadSource::Bytes { name, bytes } => Ok(EncodedImage::from_bytes(
            name.clone(),
            bytes,
            Some(Path::new(name)),
        )),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Drops a `data:<mime>;base64,` header if one is present.
pub fn strip_data_uri_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    match trimmed.split_once(',') {
        Some((_, payload)) => payload,
        None => trimmed,
    }
}

pub fn to_data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

/// Splits a data URI into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), ExpanderError> {
    let trimmed = uri.trim();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        return Err(ExpanderError::Decode("missing data: scheme".to_string()));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(ExpanderError::Decode("missing data URI payload".to_string()));
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return Err(ExpanderError::Decode(
            "only base64 data URIs are supported".to_string(),
        ));
    };
    let bytes = BASE64
        .decode(payload.as_bytes())
        .map_err(|err| ExpanderError::Decode(err.to_string()))?;
    let mime_type = if mime_type.is_empty() {
        DEFAULT_MIME
    } else {
        mime_type
    };
    Ok((mime_type.to_string(), bytes))
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
