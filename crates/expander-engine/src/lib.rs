pub mod codec;
pub mod config;
pub mod credentials;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod session;

pub use codec::{EncodedImage, UploadSource};
pub use config::EngineConfig;
pub use credentials::{ApiKey, CredentialHost, EnvCredentials, SharedCredentials};
pub use error::ExpanderError;
pub use provider::{ExpandRequest, GeminiProvider, GeneratedImage, OutpaintProvider};
pub use session::{GenerateOutcome, Session, SessionBuilder, SkipReason};
