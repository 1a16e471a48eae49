use serde::Serialize;

use crate::ratio::AspectRatio;

/// Coarse lifecycle label, mirrored from the engine's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Generating,
    Success,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Generating => "generating",
            SessionStatus::Success => "success",
            SessionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Ready,
    NeedsCredential,
}

/// What the presentation layer gets to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub credential: CredentialState,
    pub ratio: AspectRatio,
    pub has_original: bool,
    pub has_encoded: bool,
    pub original_name: Option<String>,
    pub original_mime: Option<String>,
    pub original_dimensions: Option<(u32, u32)>,
    pub preview_frame: Option<(u32, u32)>,
    /// A remote call is still running, even if a reset or upload already
    /// moved the status away from `Generating`.
    pub generation_in_flight: bool,
    pub generated_image: Option<String>,
    pub error: Option<String>,
}

impl SessionView {
    pub fn can_generate(&self) -> bool {
        self.has_encoded
            && self.status != SessionStatus::Generating
            && !self.generation_in_flight
            && self.credential == CredentialState::Ready
    }
}
