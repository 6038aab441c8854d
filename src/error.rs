use once_cell::sync::OnceCell;
use regex::Regex;
use thiserror::Error;

use crate::pipeline::PipelineStage;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("malformed {what} response: {detail}")]
    MalformedResponse { what: &'static str, detail: String },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("speech synthesis returned an empty audio payload")]
    EmptyAudioPayload,

    #[error("render finished without a downloadable video")]
    RenderProducedNoOutput,

    #[error("video download failed: {0}")]
    DownloadFailed(String),

    #[error("authorization expired: {0}")]
    AuthorizationExpired(String),

    #[error("credentials have not been confirmed")]
    CredentialsNotReady,

    #[error("render still running after {attempts} status checks")]
    RenderTimedOut { attempts: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation requires stage {expected:?}, pipeline is at {actual:?}")]
    WrongStage {
        expected: PipelineStage,
        actual: PipelineStage,
    },

    #[error("another request is still in flight")]
    Busy,

    #[error("response discarded after reset")]
    Discarded,
}

fn auth_signature_regex() -> Option<&'static Regex> {
    static AUTH_RE: OnceCell<Regex> = OnceCell::new();
    AUTH_RE
        .get_or_try_init(|| {
            Regex::new(
                r"(?i)requested entity was not found|api key not valid|api_key_invalid|permission_denied",
            )
        })
        .ok()
}

pub fn is_auth_signature(message: &str) -> bool {
    auth_signature_regex()
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}

impl PipelineError {
    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            what,
            detail: detail.into(),
        }
    }

    pub fn from_remote(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_auth_signature(&message) {
            Self::AuthorizationExpired(message)
        } else {
            Self::GenerationFailed(message)
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::AuthorizationExpired(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedResponse { what, .. } => format!(
                "Failed to generate {what}. The model might have returned an unexpected format."
            ),
            Self::GenerationFailed(msg) => format!("Generation failed: {msg}"),
            Self::EmptyAudioPayload => {
                "Failed to generate audio: received empty audio data.".to_string()
            }
            Self::RenderProducedNoOutput => {
                "Video generation finished without a video.".to_string()
            }
            Self::DownloadFailed(msg) => format!("Could not download the generated video: {msg}"),
            Self::AuthorizationExpired(_) => {
                "API Key error. Please try selecting your API key again.".to_string()
            }
            Self::CredentialsNotReady => "Please select an API key first.".to_string(),
            Self::RenderTimedOut { attempts } => {
                format!("Video generation did not finish after {attempts} status checks.")
            }
            Self::InvalidInput(msg) => msg.clone(),
            Self::WrongStage { expected, .. } => {
                format!("That step is only available at the {} stage.", expected.label())
            }
            Self::Busy => "Please wait for the current request to finish.".to_string(),
            Self::Discarded => "The pipeline was reset; the late response was ignored.".to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::GenerationFailed(err.to_string())
    }
}
