use std::io;
use std::path::PathBuf;

use thiserror::Error;

const CREDENTIAL_STATUS_CODES: &[&str] = &["UNAUTHENTICATED", "PERMISSION_DENIED", "API_KEY_INVALID"];

// Text the remote service uses when the selected key does not resolve to a
// project. Matched as a fallback when no structured code is present.
const CREDENTIAL_MESSAGE_MARKERS: &[&str] = &["Requested entity was not found.", "API key not valid"];

pub const READ_FAILURE_MESSAGE: &str = "Failed to process image. Please try another.";
pub const NO_IMAGE_MESSAGE: &str = "No image data found in response.";
pub const CREDENTIAL_FAILURE_MESSAGE: &str =
    "API key invalid or not found. Please select your key again.";

#[derive(Debug, Error)]
pub enum ExpanderError {
    #[error("failed reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no API key available (set GEMINI_API_KEY or GOOGLE_API_KEY)")]
    MissingCredential,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Gemini request failed ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Gemini returned invalid JSON payload: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Gemini response contained no image data")]
    NoImage,

    #[error("image data could not be decoded: {0}")]
    Decode(String),
}

impl ExpanderError {
    /// Whether the failure means the key is missing or no longer accepted.
    pub fn is_credential_failure(&self) -> bool {
        match self {
            ExpanderError::MissingCredential => true,
            ExpanderError::Api {
                status,
                code,
                message,
            } => {
                if matches!(status, 401 | 403) {
                    return true;
                }
                if code
                    .as_deref()
                    .is_some_and(|code| CREDENTIAL_STATUS_CODES.contains(&code))
                {
                    return true;
                }
                mentions_credential_marker(message)
            }
            other => mentions_credential_marker(&other.to_string()),
        }
    }

    /// Text shown in the session's error state.
    pub fn user_message(&self) -> String {
        if self.is_credential_failure() {
            return CREDENTIAL_FAILURE_MESSAGE.to_string();
        }
        match self {
            ExpanderError::Read { .. } | ExpanderError::Decode(_) => {
                READ_FAILURE_MESSAGE.to_string()
            }
            ExpanderError::NoImage => NO_IMAGE_MESSAGE.to_string(),
            ExpanderError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn mentions_credential_marker(text: &str) -> bool {
    CREDENTIAL_MESSAGE_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: Option<&str>, message: &str) -> ExpanderError {
        ExpanderError::Api {
            status,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn structured_codes_flag_credential_failures() {
        assert!(api(400, Some("API_KEY_INVALID"), "bad key").is_credential_failure());
        assert!(api(403, None, "forbidden").is_credential_failure());
        assert!(api(401, Some("UNAUTHENTICATED"), "who").is_credential_failure());
        assert!(!api(429, Some("RESOURCE_EXHAUSTED"), "quota").is_credential_failure());
        assert!(!api(500, Some("INTERNAL"), "boom").is_credential_failure());
        assert!(ExpanderError::MissingCredential.is_credential_failure());
    }

    #[test]
    fn entity_not_found_message_is_a_credential_failure() {
        let err = api(404, Some("NOT_FOUND"), "Requested entity was not found.");
        assert!(err.is_credential_failure());
        assert_eq!(err.user_message(), CREDENTIAL_FAILURE_MESSAGE);
        assert!(err.user_message().contains("select your key again"));
    }

    #[test]
    fn user_messages_follow_failure_kind() {
        let read = ExpanderError::Read {
            path: PathBuf::from("/tmp/missing.jpg"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(read.user_message(), READ_FAILURE_MESSAGE);
        assert!(read.to_string().contains("/tmp/missing.jpg"));

        assert_eq!(ExpanderError::NoImage.user_message(), NO_IMAGE_MESSAGE);

        let quota = api(429, Some("RESOURCE_EXHAUSTED"), "Quota exceeded for model.");
        assert_eq!(quota.user_message(), "Quota exceeded for model.");
    }
}
