use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use expander_contracts::events::{EventPayload, EventWriter};
use expander_contracts::ratio::AspectRatio;
use expander_contracts::session::{CredentialState, SessionStatus, SessionView};
use serde_json::{json, Value};

use crate::codec::{read_source, EncodedImage, UploadSource};
use crate::credentials::CredentialHost;
use crate::error::ExpanderError;
use crate::prompt::prompt_with_guidance;
use crate::provider::{ExpandRequest, GeneratedImage, OutpaintProvider};

/// Lifecycle of the current original. Result and message live inside the
/// variant that owns them.
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Generating,
    Success(GeneratedImage),
    Error(String),
}

impl Phase {
    fn status(&self) -> SessionStatus {
        match self {
            Phase::Idle => SessionStatus::Idle,
            Phase::Generating => SessionStatus::Generating,
            Phase::Success(_) => SessionStatus::Success,
            Phase::Error(_) => SessionStatus::Error,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    original: Option<EncodedImage>,
    ratio: AspectRatio,
    guidance: Option<String>,
    phase: Phase,
    credential: CredentialState,
    // Bumped by upload and reset so a late result cannot land on newer state.
    epoch: u64,
    in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoImage,
    AlreadyGenerating,
    NeedsCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Completed(SessionStatus),
    Skipped(SkipReason),
    /// The session was reset or re-uploaded while the request was in flight;
    /// its result was dropped.
    Superseded,
}

pub struct SessionBuilder {
    provider: Arc<dyn OutpaintProvider>,
    credentials: Arc<dyn CredentialHost>,
    events: Option<EventWriter>,
    ratio: AspectRatio,
    guidance: Option<String>,
}

impl SessionBuilder {
    pub fn new(provider: Arc<dyn OutpaintProvider>, credentials: Arc<dyn CredentialHost>) -> Self {
        Self {
            provider,
            credentials,
            events: None,
            ratio: AspectRatio::default(),
            guidance: None,
        }
    }

    pub fn events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ratio(mut self, ratio: AspectRatio) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn guidance(mut self, guidance: Option<String>) -> Self {
        self.guidance = guidance;
        self
    }

    pub fn build(self) -> Session {
        let events = self
            .events
            .unwrap_or_else(|| EventWriter::in_memory(uuid::Uuid::new_v4().to_string()));
        let credential = if self.credentials.has_credential() {
            CredentialState::Ready
        } else {
            CredentialState::NeedsCredential
        };
        let session = Session {
            state: Mutex::new(SessionState {
                original: None,
                ratio: self.ratio,
                guidance: self.guidance,
                phase: Phase::Idle,
                credential,
                epoch: 0,
                in_flight: false,
            }),
            provider: self.provider,
            credentials: self.credentials,
            events,
        };
        session.log(
            "session_created",
            json!({
                "provider": session.provider.name(),
                "ratio": session.ratio_label(),
                "credential": credential_label(credential),
            }),
        );
        session
    }
}

/// Upload, configure, generate, result. All mutations go through one lock;
/// the lock is released for the remote call.
pub struct Session {
    state: Mutex<SessionState>,
    provider: Arc<dyn OutpaintProvider>,
    credentials: Arc<dyn CredentialHost>,
    events: EventWriter,
}

impl Session {
    pub fn id(&self) -> &str {
        self.events.session_id()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().phase.status()
    }

    pub fn ratio(&self) -> AspectRatio {
        self.lock().ratio
    }

    pub fn credential_state(&self) -> CredentialState {
        self.lock().credential
    }

    pub fn generated_image(&self) -> Option<GeneratedImage> {
        match &self.lock().phase {
            Phase::Success(image) => Some(image.clone()),
            _ => None,
        }
    }

    /// Replaces the original. Valid from any state; any result or error is
    /// dropped. A read failure leaves no original behind.
    pub fn upload(&self, source: UploadSource) -> SessionStatus {
        let outcome = read_source(&source);

        let mut state = self.lock();
        state.epoch += 1;
        match outcome {
            Ok(image) => {
                let payload = json!({
                    "name": image.name,
                    "mime_type": image.mime_type,
                    "bytes": image.byte_len,
                    "dimensions": image.dimensions,
                    "sha256": image.sha256,
                });
                state.original = Some(image);
                state.phase = Phase::Idle;
                drop(state);
                self.log("image_uploaded", payload);
                SessionStatus::Idle
            }
            Err(err) => {
                state.original = None;
                state.phase = Phase::Error(err.user_message());
                drop(state);
                self.log(
                    "upload_failed",
                    json!({
                        "source": source.name(),
                        "error": err.to_string(),
                    }),
                );
                SessionStatus::Error
            }
        }
    }

    /// Ignored while generating. Never touches an existing result.
    pub fn select_ratio(&self, ratio: AspectRatio) -> bool {
        let mut state = self.lock();
        if state.phase == Phase::Generating {
            return false;
        }
        state.ratio = ratio;
        drop(state);
        self.log("ratio_selected", json!({ "ratio": ratio.as_str() }));
        true
    }

    /// Extra text appended to the outpainting instruction on the next run.
    pub fn set_guidance(&self, guidance: Option<String>) {
        self.lock().guidance = guidance
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
    }

    pub fn generate(&self) -> GenerateOutcome {
        let (request, epoch, key) = {
            let mut state = self.lock();
            if state.in_flight || state.phase == Phase::Generating {
                return GenerateOutcome::Skipped(SkipReason::AlreadyGenerating);
            }
            let Some(image) = state
                .original
                .clone()
                .filter(|image| !image.data.is_empty())
            else {
                return GenerateOutcome::Skipped(SkipReason::NoImage);
            };
            if state.credential == CredentialState::NeedsCredential {
                return GenerateOutcome::Skipped(SkipReason::NeedsCredential);
            }
            let Some(key) = self.credentials.credential() else {
                state.credential = CredentialState::NeedsCredential;
                drop(state);
                self.log(
                    "credential_demoted",
                    json!({
                        "reason": "missing",
                        "error": ExpanderError::MissingCredential.to_string(),
                    }),
                );
                return GenerateOutcome::Skipped(SkipReason::NeedsCredential);
            };
            state.phase = Phase::Generating;
            state.in_flight = true;
            let request = ExpandRequest {
                image,
                ratio: state.ratio,
                prompt: prompt_with_guidance(state.ratio, state.guidance.as_deref()),
            };
            (request, state.epoch, key)
        };

        self.log(
            "generation_started",
            json!({
                "provider": self.provider.name(),
                "ratio": request.ratio.as_str(),
                "mime_type": request.image.mime_type,
                "prompt_chars": request.prompt.chars().count(),
            }),
        );
        let started = Instant::now();
        let result = self.provider.generate(&request, &key);
        let latency_s = started.elapsed().as_secs_f64();

        let mut state = self.lock();
        state.in_flight = false;
        if state.epoch != epoch {
            drop(state);
            self.log(
                "generation_superseded",
                json!({ "latency_s": latency_s, "ok": result.is_ok() }),
            );
            return GenerateOutcome::Superseded;
        }

        match result {
            Ok(image) => {
                let mime_type = image.mime_type.clone();
                state.phase = Phase::Success(image);
                drop(state);
                self.log(
                    "generation_succeeded",
                    json!({ "mime_type": mime_type, "latency_s": latency_s }),
                );
                GenerateOutcome::Completed(SessionStatus::Success)
            }
            Err(err) => {
                let message = err.user_message();
                let demote = err.is_credential_failure();
                if demote {
                    state.credential = CredentialState::NeedsCredential;
                }
                state.phase = Phase::Error(message.clone());
                drop(state);
                if demote {
                    self.credentials.invalidate();
                    self.log("credential_demoted", json!({ "reason": "rejected" }));
                }
                self.log(
                    "generation_failed",
                    json!({
                        "error": err.to_string(),
                        "message": message,
                        "latency_s": latency_s,
                    }),
                );
                GenerateOutcome::Completed(SessionStatus::Error)
            }
        }
    }

    /// Back to an empty idle session. The selected ratio is kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.original = None;
        state.phase = Phase::Idle;
        drop(state);
        self.log("session_reset", EventPayload::new().into());
    }

    /// Drops a successful result but keeps the original for another run.
    pub fn discard_result(&self) -> bool {
        let mut state = self.lock();
        if !matches!(state.phase, Phase::Success(_)) {
            return false;
        }
        state.phase = Phase::Idle;
        drop(state);
        self.log("result_discarded", EventPayload::new().into());
        true
    }

    /// Runs the host's key flow and lifts the demotion when it succeeds.
    pub fn request_credential(&self) -> bool {
        let granted = self.credentials.request_credential();
        let mut state = self.lock();
        state.credential = if granted {
            CredentialState::Ready
        } else {
            CredentialState::NeedsCredential
        };
        drop(state);
        if granted {
            self.log("credential_restored", EventPayload::new().into());
        }
        granted
    }

    pub fn view(&self) -> SessionView {
        let state = self.lock();
        let original = state.original.as_ref();
        let (generated_image, error) = match &state.phase {
            Phase::Success(image) => (Some(image.data_uri.clone()), None),
            Phase::Error(message) => (None, Some(message.clone())),
            Phase::Idle | Phase::Generating => (None, None),
        };
        SessionView {
            session_id: self.id().to_string(),
            status: state.phase.status(),
            credential: state.credential,
            ratio: state.ratio,
            has_original: original.is_some(),
            has_encoded: original.is_some_and(|image| !image.data.is_empty()),
            original_name: original.map(|image| image.name.clone()),
            original_mime: original.map(|image| image.mime_type.clone()),
            original_dimensions: original.and_then(|image| image.dimensions),
            preview_frame: original
                .and_then(|image| image.dimensions)
                .map(|(width, height)| state.ratio.frame_for(width, height)),
            generation_in_flight: state.in_flight,
            generated_image,
            error,
        }
    }

    fn ratio_label(&self) -> &'static str {
        self.lock().ratio.as_str()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, event_type: &str, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = self.events.emit(event_type, payload) {
            eprintln!("expander: event log write failed ({event_type}): {err:#}");
        }
    }
}

fn credential_label(state: CredentialState) -> &'static str {
    match state {
        CredentialState::Ready => "ready",
        CredentialState::NeedsCredential => "needs_credential",
    }
}
