use super::{Gateway, SourceImage, SpeechPayload, VideoOperation, VideoRequest};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) fn ideas_json(count: usize) -> String {
    let ideas: Vec<_> = (1..=count)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "title": format!("Idea {i}"),
                "description": format!("Description {i}"),
            })
        })
        .collect();
    serde_json::json!({ "ideas": ideas }).to_string()
}

pub(crate) fn prompts_json(count: u32) -> String {
    let prompts: Vec<_> = (1..=count)
        .map(|i| serde_json::json!({"segment": i, "prompt": format!("shot {i}")}))
        .collect();
    serde_json::json!({ "prompts": prompts }).to_string()
}

pub(crate) struct ScriptedGateway {
    pub ideas: Result<String>,
    pub script: Result<String>,
    pub speech: Result<SpeechPayload>,
    pub prompts: Result<String>,
    pub render_failures: HashMap<String, PipelineError>,
    pub requests: Mutex<Vec<VideoRequest>>,
    // Renders report `done` on the first poll instead of at submission.
    pub slow_renders: bool,
    pub hold_ideas: Option<Arc<Notify>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            ideas: Ok(ideas_json(10)),
            script: Ok("INT. MARS STATION - NIGHT".to_string()),
            speech: Ok(SpeechPayload {
                data_base64: BASE64.encode(b"ID3-audio"),
                mime_type: Some("audio/mpeg".to_string()),
            }),
            prompts: Ok(prompts_json(8)),
            render_failures: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            slow_renders: false,
            hold_ideas: None,
        }
    }

    pub fn fail_render(mut self, prompt: &str, err: PipelineError) -> Self {
        self.render_failures.insert(prompt.to_string(), err);
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.prompt).collect()
    }

    pub fn images(&self) -> Vec<Option<SourceImage>> {
        self.requests().into_iter().map(|r| r.image).collect()
    }

    pub fn requests(&self) -> Vec<VideoRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn list_story_ideas(&self, _theme: &str) -> Result<String> {
        if let Some(hold) = &self.hold_ideas {
            hold.notified().await;
        }
        self.ideas.clone()
    }

    async fn draft_script(&self, _title: &str, _description: &str) -> Result<String> {
        self.script.clone()
    }

    async fn synthesize_speech(&self, _text: &str) -> Result<SpeechPayload> {
        self.speech.clone()
    }

    async fn decompose_script(&self, _script: &str) -> Result<String> {
        self.prompts.clone()
    }

    async fn start_video(&self, request: &VideoRequest) -> Result<VideoOperation> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        if let Some(err) = self.render_failures.get(&request.prompt) {
            return Err(err.clone());
        }
        let done = !self.slow_renders;
        Ok(VideoOperation {
            name: format!("operations/{}", request.prompt),
            done,
            state: if done { None } else { Some("RUNNING".to_string()) },
            video_uri: done.then(|| format!("mem://{}", request.prompt)),
            error: None,
        })
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        let prompt = operation.name.trim_start_matches("operations/");
        Ok(VideoOperation {
            done: true,
            video_uri: Some(format!("mem://{prompt}")),
            ..operation.clone()
        })
    }

    async fn download_media(&self, uri: &str) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(uri.as_bytes()))
    }
}
