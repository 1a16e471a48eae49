use std::time::Duration;

use expander_contracts::ratio::AspectRatio;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::codec::{to_data_uri, EncodedImage};
use crate::config::EngineConfig;
use crate::credentials::ApiKey;
use crate::error::ExpanderError;

const API_KEY_HEADER: &str = "x-goog-api-key";
const DEFAULT_RESULT_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct ExpandRequest {
    pub image: EncodedImage,
    pub ratio: AspectRatio,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data_uri: String,
}

/// One remote outpainting call. Implementations keep no state between calls
/// and never retry.
pub trait OutpaintProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ExpandRequest, key: &ApiKey)
        -> Result<GeneratedImage, ExpanderError>;
}

pub struct GeminiProvider {
    api_base: String,
    model: String,
    image_size: String,
    request_timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            image_size: config.image_size.clone(),
            request_timeout: Duration::from_secs_f64(config.request_timeout_s),
            http: HttpClient::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(&self, request: &ExpandRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type,
                            "data": request.image.data,
                        }
                    },
                    { "text": request.prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.ratio.as_str(),
                    "imageSize": self.image_size,
                },
            },
        })
    }
}

impl OutpaintProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(
        &self,
        request: &ExpandRequest,
        key: &ApiKey,
    ) -> Result<GeneratedImage, ExpanderError> {
        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, key.expose())
            .timeout(self.request_timeout)
            .json(&self.build_payload(request))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }
        let payload: Value = serde_json::from_str(&body)?;
        extract_first_image(&payload)
    }
}

/// First inline image across all candidates, in response order.
fn extract_first_image(response_payload: &Value) -> Result<GeneratedImage, ExpanderError> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|mime| !mime.is_empty())
                .unwrap_or(DEFAULT_RESULT_MIME);
            return Ok(GeneratedImage {
                mime_type: mime_type.to_string(),
                data_uri: to_data_uri(mime_type, data),
            });
        }
    }

    Err(ExpanderError::NoImage)
}

fn parse_error_body(status: u16, body: &str) -> ExpanderError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));

    let reason = error
        .and_then(|error| error.get("details"))
        .and_then(Value::as_array)
        .and_then(|details| {
            details
                .iter()
                .find_map(|detail| detail.get("reason").and_then(Value::as_str))
        });
    let code = reason
        .or_else(|| error.and_then(|error| error.get("status")).and_then(Value::as_str))
        .map(str::to_string);
    let message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(body.trim(), 512));

    ExpanderError::Api {
        status,
        code,
        message,
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_data_uri, EncodedImage};

    fn provider() -> GeminiProvider {
        GeminiProvider::new(&EngineConfig::default())
    }

    fn request(ratio: AspectRatio) -> ExpandRequest {
        ExpandRequest {
            image: EncodedImage::from_bytes("beach.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0x00], None),
            ratio,
            prompt: "expand it".to_string(),
        }
    }

    #[test]
    fn endpoint_targets_generate_content() {
        assert_eq!(
            provider().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );

        let mut config = EngineConfig::default();
        config.model = "models/custom-image".to_string();
        assert!(GeminiProvider::new(&config)
            .endpoint()
            .ends_with("/models/custom-image:generateContent"));
    }

    #[test]
    fn hand_built_config_is_normalized() {
        let config = EngineConfig {
            api_base: "http://localhost:9000/v1beta/".to_string(),
            model: "  ".to_string(),
            image_size: "8k".to_string(),
            request_timeout_s: f64::NAN,
        };
        let provider = GeminiProvider::new(&config);
        assert_eq!(provider.request_timeout, Duration::from_secs(90));
        assert_eq!(provider.model(), "gemini-3-pro-image-preview");
        assert_eq!(provider.image_size, "2K");
        assert!(provider
            .endpoint()
            .starts_with("http://localhost:9000/v1beta/models/"));

        let negative = EngineConfig {
            request_timeout_s: -4.0,
            ..EngineConfig::default()
        };
        assert_eq!(
            GeminiProvider::new(&negative).request_timeout,
            Duration::from_secs(15)
        );
    }

    #[test]
    fn payload_carries_image_prompt_ratio_and_size() {
        let req = request(AspectRatio::Story);
        let payload = provider().build_payload(&req);

        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!(req.image.data));
        assert_eq!(parts[1]["text"], json!("expand it"));
        assert_eq!(
            payload["generationConfig"]["imageConfig"],
            json!({"aspectRatio": "9:16", "imageSize": "2K"})
        );
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
    }

    #[test]
    fn extract_takes_first_inline_part_after_text() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/png", "data": "QUJD"}},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "REVG"}},
                    ]
                }
            }]
        });
        let image = extract_first_image(&response)?;
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data_uri, "data:image/png;base64,QUJD");
        let (_, bytes) = decode_data_uri(&image.data_uri)?;
        assert_eq!(bytes, b"ABC");
        Ok(())
    }

    #[test]
    fn extract_accepts_snake_case_and_defaults_mime() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [
                {"content": {"parts": [{"inline_data": {"data": ""}}]}},
                {"content": {"parts": [{"inline_data": {"data": "QUJD"}}]}},
            ]
        });
        let image = extract_first_image(&response)?;
        assert_eq!(image.data_uri, "data:image/png;base64,QUJD");
        Ok(())
    }

    #[test]
    fn extract_without_inline_parts_is_no_image() {
        let text_only = json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot do that."}]}}]
        });
        assert!(matches!(
            extract_first_image(&text_only),
            Err(ExpanderError::NoImage)
        ));
        assert!(matches!(
            extract_first_image(&json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            Err(ExpanderError::NoImage)
        ));
    }

    #[test]
    fn error_body_prefers_detail_reason_over_status() {
        let body = json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
            }
        })
        .to_string();
        let err = parse_error_body(400, &body);
        match &err {
            ExpanderError::Api { status, code, message } => {
                assert_eq!(*status, 400);
                assert_eq!(code.as_deref(), Some("API_KEY_INVALID"));
                assert!(message.starts_with("API key not valid"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_credential_failure());
    }

    #[test]
    fn error_body_falls_back_to_raw_text() {
        let err = parse_error_body(503, "upstream unavailable");
        match err {
            ExpanderError::Api { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let quota = parse_error_body(
            429,
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(!quota.is_credential_failure());
        assert_eq!(quota.user_message(), "Quota exceeded");
    }
}
