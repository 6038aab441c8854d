#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Mutex;
use story_video::Result;
use story_video::api::{Gateway, SpeechPayload, VideoOperation, VideoRequest};
use story_video::credentials::CredentialSelector;
use story_video::error::PipelineError;

pub struct AlwaysSelected;

#[async_trait]
impl CredentialSelector for AlwaysSelected {
    async fn has_selected_credential(&self) -> bool {
        true
    }

    async fn prompt_for_credential(&self) -> Result<()> {
        Ok(())
    }
}

/// Gateway double for the space-detective walkthrough.
pub struct StudioGateway {
    pub speech_base64: String,
    /// Segment prompts whose render is rejected with the auth signature.
    pub auth_failures: HashSet<String>,
    pub rendered: Mutex<Vec<String>>,
}

impl StudioGateway {
    pub fn new() -> Self {
        Self {
            speech_base64: "SUQz".to_string(),
            auth_failures: HashSet::new(),
            rendered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Gateway for StudioGateway {
    async fn list_story_ideas(&self, theme: &str) -> Result<String> {
        let ideas: Vec<_> = (1..=10)
            .map(|i| {
                serde_json::json!({
                    "id": i,
                    "title": format!("{theme} #{i}"),
                    "description": "A case on the red planet.",
                })
            })
            .collect();
        Ok(serde_json::json!({ "ideas": ideas }).to_string())
    }

    async fn draft_script(&self, title: &str, _description: &str) -> Result<String> {
        Ok(format!("INT. MARS STATION - NIGHT\n{title}"))
    }

    async fn synthesize_speech(&self, _text: &str) -> Result<SpeechPayload> {
        Ok(SpeechPayload {
            data_base64: self.speech_base64.clone(),
            mime_type: Some("audio/mpeg".to_string()),
        })
    }

    async fn decompose_script(&self, _script: &str) -> Result<String> {
        let prompts: Vec<_> = (1..=8)
            .map(|i| serde_json::json!({"segment": i, "prompt": format!("shot {i}")}))
            .collect();
        Ok(serde_json::json!({ "prompts": prompts }).to_string())
    }

    async fn start_video(&self, request: &VideoRequest) -> Result<VideoOperation> {
        self.rendered.lock().unwrap().push(request.prompt.clone());
        if self.auth_failures.contains(&request.prompt) {
            return Err(PipelineError::from_remote("Requested entity was not found."));
        }
        Ok(VideoOperation {
            name: format!("operations/{}", request.prompt),
            done: false,
            state: Some("RUNNING".to_string()),
            ..VideoOperation::default()
        })
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        Ok(VideoOperation {
            done: true,
            video_uri: Some(format!("mem://{}", operation.name)),
            ..operation.clone()
        })
    }

    async fn download_media(&self, uri: &str) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(uri.as_bytes()))
    }
}
