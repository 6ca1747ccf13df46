//! Core data types for the Picflow upload pipeline.
//!
//! An [`Artifact`] is one image moving from the transformer to the uploader.
//! It owns its payload until upload, after which it is reduced to a URL plus
//! small metadata.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::hash::content_hash;

/// The authoritative image payload of an [`Artifact`].
///
/// Only one representation exists at a time, so raw bytes and their base64
/// form can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw encoded image bytes
    Bytes(Vec<u8>),
    /// Standard base64 of the encoded image bytes
    Base64(String),
}

/// One image in the output set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Image payload, dropped after upload
    #[serde(skip)]
    pub payload: Option<Payload>,

    /// Logical file name including the extension
    pub file_name: String,

    /// Extension with a leading dot, e.g. ".png"
    pub extname: String,

    /// Pixel width, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Pixel height, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Remote URL assigned by the uploader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,

    /// Id of the uploader that handled this artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_type: Option<String>,

    /// BLAKE3 hash of the payload at creation time
    pub content_hash: String,

    /// Opaque per-backend result (delete tokens, object keys, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Artifact {
    /// Build an artifact owning raw bytes.
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>, extname: impl Into<String>) -> Self {
        let content_hash = content_hash(&bytes);
        Self {
            payload: Some(Payload::Bytes(bytes)),
            file_name: file_name.into(),
            extname: normalize_extname(&extname.into()),
            content_hash,
            ..Default::default()
        }
    }

    /// Build an artifact owning a base64 payload.
    pub fn from_base64(
        encoded: String,
        file_name: impl Into<String>,
        extname: impl Into<String>,
    ) -> PipelineResult<Self> {
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| PipelineError::Image {
            message: format!("invalid base64 payload: {e}"),
        })?;
        let content_hash = content_hash(&bytes);
        Ok(Self {
            payload: Some(Payload::Base64(encoded)),
            file_name: file_name.into(),
            extname: normalize_extname(&extname.into()),
            content_hash,
            ..Default::default()
        })
    }

    /// Whether a payload is still attached.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Raw bytes of the payload, decoding base64 when needed.
    pub fn bytes(&self) -> PipelineResult<Option<Vec<u8>>> {
        match &self.payload {
            None => Ok(None),
            Some(Payload::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(Payload::Base64(encoded)) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| PipelineError::Image {
                    message: format!("invalid base64 payload: {e}"),
                }),
        }
    }

    /// Switch the authoritative payload to its base64 form.
    pub fn to_base64(&mut self) {
        if let Some(Payload::Bytes(bytes)) = self.payload.take() {
            self.payload = Some(Payload::Base64(STANDARD.encode(bytes)));
        }
    }

    /// Drop the payload, leaving URL and metadata only.
    pub fn clear_payload(&mut self) {
        self.payload = None;
    }

    /// Record a successful upload and release the payload.
    pub fn mark_uploaded(&mut self, url: impl Into<String>) {
        self.img_url = Some(url.into());
        self.clear_payload();
    }

    /// Fill in pixel dimensions from the payload if not already known.
    pub fn ensure_dimensions(&mut self) -> Option<(u32, u32)> {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            return Some((w, h));
        }
        let bytes = self.bytes().ok().flatten()?;
        let (w, h) = crate::pipeline::decode::probe_dimensions(&bytes)?;
        self.width = Some(w);
        self.height = Some(h);
        Some((w, h))
    }
}

/// Lowercase an extension and make sure it carries a leading dot.
pub fn normalize_extname(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_lowercase())
    }
}

/// Kind of a user-facing configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Input,
    Confirm,
    List,
}

/// Describes one configurable option of a handler for configuration UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Config key relative to the handler's table
    pub name: String,

    /// Widget kind
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Human-readable label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Whether a value must be provided
    pub required: bool,

    /// Current or default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Allowed values for list fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FieldDescriptor {
    /// Free-text field.
    pub fn input(name: &str, alias: &str, default: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Input,
            alias: Some(alias.to_string()),
            required: false,
            default: Some(default.into()),
            choices: Vec::new(),
        }
    }

    /// Boolean toggle.
    pub fn confirm(name: &str, alias: &str, default: bool) -> Self {
        Self {
            kind: FieldKind::Confirm,
            ..Self::input(name, alias, default)
        }
    }

    /// Choice among fixed values.
    pub fn list(name: &str, alias: &str, default: &str, choices: &[&str]) -> Self {
        Self {
            kind: FieldKind::List,
            choices: choices.iter().map(|c| c.to_string()).collect(),
            ..Self::input(name, alias, default)
        }
    }

    /// Mark the field as mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_hashes_payload() {
        let artifact = Artifact::from_bytes(b"abc".to_vec(), "a.png", "PNG");
        assert_eq!(artifact.extname, ".png");
        assert_eq!(artifact.content_hash, blake3::hash(b"abc").to_hex().to_string());
        assert!(artifact.has_payload());
    }

    #[test]
    fn test_base64_payload_is_exclusive() {
        let mut artifact = Artifact::from_bytes(b"hello".to_vec(), "a.jpg", ".jpg");
        artifact.to_base64();
        assert!(matches!(artifact.payload, Some(Payload::Base64(_))));
        assert_eq!(artifact.bytes().unwrap().unwrap(), b"hello");
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(Artifact::from_base64("***".to_string(), "a.png", ".png").is_err());
    }

    #[test]
    fn test_mark_uploaded_clears_payload() {
        let mut artifact = Artifact::from_bytes(vec![1, 2, 3], "a.png", ".png");
        artifact.mark_uploaded("https://cdn.example.com/a.png");
        assert!(!artifact.has_payload());
        assert_eq!(artifact.img_url.as_deref(), Some("https://cdn.example.com/a.png"));
    }

    #[test]
    fn test_serialized_artifact_omits_payload() {
        let artifact = Artifact::from_bytes(vec![0; 64], "a.png", ".png");
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(!json.contains("payload"));
        assert!(json.contains("\"fileName\":\"a.png\""));
    }

    #[test]
    fn test_normalize_extname() {
        assert_eq!(normalize_extname("JPG"), ".jpg");
        assert_eq!(normalize_extname(".webp"), ".webp");
        assert_eq!(normalize_extname(""), "");
    }

    #[test]
    fn test_field_descriptor_list() {
        let field = FieldDescriptor::list("watermarkType", "Type", "text", &["text", "image"]);
        assert_eq!(field.kind, FieldKind::List);
        assert_eq!(field.choices.len(), 2);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "list");
    }
}
