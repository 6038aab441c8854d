use super::{Gateway, SpeechPayload, VideoOperation, VideoRequest};
use crate::config::Config;
use crate::credentials::ApiKey;
use crate::error::{PipelineError, Result};
use crate::logw;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";
const BODY_SNIPPET_CHARS: usize = 800;

pub struct GeminiGateway {
    client: Client,
    key: ApiKey,
    base_url: String,
    text_model: String,
    tts_model: String,
    tts_voice: String,
    video_model: String,
    video_resolution: String,
    idea_count: u32,
    segment_count: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    metadata: Option<Value>,
    response: Option<Value>,
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

impl RemoteError {
    fn describe(&self) -> String {
        match &self.status {
            Some(status) => format!("{} ({})", self.message, status),
            None => self.message.clone(),
        }
    }
}

fn snippet(raw: &str) -> String {
    raw.chars().take(BODY_SNIPPET_CHARS).collect()
}

fn remote_failure(status: reqwest::StatusCode, raw: &str) -> PipelineError {
    let detail = serde_json::from_str::<ErrorEnvelope>(raw)
        .map(|env| env.error.describe())
        .unwrap_or_else(|_| snippet(raw));
    logw(format!("Gemini HTTP {}: {}", status.as_u16(), detail));
    PipelineError::from_remote(format!("HTTP {}: {}", status.as_u16(), detail))
}

fn operation_from_response(op: OperationResponse) -> VideoOperation {
    let state = op
        .metadata
        .as_ref()
        .and_then(|m| m.get("state"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let video_uri = op
        .response
        .as_ref()
        .and_then(|r| r.pointer("/generateVideoResponse/generatedSamples/0/video/uri"))
        .and_then(Value::as_str)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string);

    VideoOperation {
        name: op.name,
        done: op.done,
        state,
        video_uri,
        error: op.error.map(|e| e.describe()),
    }
}

fn joined_text(resp: &GenerateContentResponse) -> Option<String> {
    let parts = &resp.candidates.first()?.content.as_ref()?.parts;
    let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if text.is_empty() { None } else { Some(text) }
}

fn ideas_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "ideas": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": {"type": "INTEGER"},
                        "title": {"type": "STRING"},
                        "description": {"type": "STRING"},
                    },
                    "required": ["id", "title", "description"],
                }
            }
        },
        "required": ["ideas"],
    })
}

fn prompts_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "prompts": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "segment": {"type": "INTEGER"},
                        "prompt": {"type": "STRING"},
                    },
                    "required": ["segment", "prompt"],
                }
            }
        },
        "required": ["prompts"],
    })
}

impl GeminiGateway {
    pub fn new(cfg: &Config, key: ApiKey) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build reqwest client: {e}"))?;
        Ok(Self::with_client(client, cfg, key))
    }

    pub fn with_client(client: Client, cfg: &Config, key: ApiKey) -> Self {
        Self {
            client,
            key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            text_model: cfg.text_model.clone(),
            tts_model: cfg.tts_model.clone(),
            tts_voice: cfg.tts_voice.clone(),
            video_model: cfg.video_model.clone(),
            video_resolution: cfg.video_resolution.clone(),
            idea_count: cfg.idea_count,
            segment_count: cfg.segment_count,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let key = self.key.get().ok_or_else(|| {
            PipelineError::AuthorizationExpired("no API key has been selected".to_string())
        })?;
        Ok(builder.header(API_KEY_HEADER, key))
    }

    async fn read_success(resp: Response) -> Result<String> {
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(remote_failure(status, &raw));
        }
        Ok(raw)
    }

    async fn generate_content(&self, model: &str, body: Value) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(%url, "generateContent");
        let resp = self
            .authorized(self.client.post(&url).json(&body))?
            .send()
            .await?;
        let raw = Self::read_success(resp).await?;
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::GenerationFailed(format!("unreadable Gemini response: {e}"))
        })
    }

    async fn generate_text(&self, prompt: String, schema: Option<Value>) -> Result<String> {
        let mut body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        if let Some(schema) = schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            });
        }

        let resp = self.generate_content(&self.text_model, body).await?;
        joined_text(&resp).ok_or_else(|| {
            PipelineError::GenerationFailed("no text in Gemini response".to_string())
        })
    }

    async fn fetch_operation(&self, name: &str) -> Result<VideoOperation> {
        let url = format!("{}/{}", self.base_url, name.trim_start_matches('/'));
        let resp = self.authorized(self.client.get(&url))?.send().await?;
        let raw = Self::read_success(resp).await?;
        let op: OperationResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::GenerationFailed(format!("unreadable operation status: {e}"))
        })?;
        Ok(operation_from_response(op))
    }
}

#[async_trait]
impl Gateway for GeminiGateway {
    async fn list_story_ideas(&self, theme: &str) -> Result<String> {
        let prompt = format!(
            "Based on the theme \"{}\", generate {} unique and compelling short story ideas. \
             Each idea should have a title and a one-sentence description.",
            theme, self.idea_count
        );
        self.generate_text(prompt, Some(ideas_schema())).await
    }

    async fn draft_script(&self, title: &str, description: &str) -> Result<String> {
        let prompt = format!(
            "Write a short story script based on the following idea:\nTitle: {}\n\
             Description: {}\nThe script should be engaging and suitable for a short video.",
            title, description
        );
        self.generate_text(prompt, None).await
    }

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechPayload> {
        let body = json!({
            "contents": [{"parts": [{"text": text}]}],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": self.tts_voice}},
                },
            },
        });

        let resp = self.generate_content(&self.tts_model, body).await?;
        let inline = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data));

        Ok(match inline {
            Some(data) => SpeechPayload {
                data_base64: data.data,
                mime_type: data.mime_type,
            },
            None => SpeechPayload::default(),
        })
    }

    async fn decompose_script(&self, script: &str) -> Result<String> {
        let prompt = format!(
            "Take the following script and break it down into {} distinct visual segments \
             for a video. For each segment, create a concise, descriptive prompt suitable for \
             a text-to-video AI model like Veo. The prompts should be purely visual \
             descriptions.\n\nScript:\n{}",
            self.segment_count, script
        );
        self.generate_text(prompt, Some(prompts_schema())).await
    }

    async fn start_video(&self, request: &VideoRequest) -> Result<VideoOperation> {
        let mut instance = json!({"prompt": request.prompt});
        if let Some(image) = &request.image {
            instance["image"] = json!({
                "bytesBase64Encoded": BASE64.encode(&image.bytes),
                "mimeType": image.mime_type,
            });
        }
        let body = json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": request.aspect_ratio.as_str(),
                "resolution": self.video_resolution,
            },
        });

        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.video_model);
        let resp = self
            .authorized(self.client.post(&url).json(&body))?
            .send()
            .await?;
        let raw = Self::read_success(resp).await?;
        let op: OperationResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::GenerationFailed(format!("unreadable render submission: {e}"))
        })?;
        Ok(operation_from_response(op))
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        self.fetch_operation(&operation.name).await
    }

    async fn download_media(&self, uri: &str) -> Result<Bytes> {
        let resp = self
            .authorized(self.client.get(uri))?
            .send()
            .await
            .map_err(|e| PipelineError::DownloadFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            logw(format!("Video download HTTP {}: {}", status.as_u16(), snippet(&raw)));
            return Err(PipelineError::DownloadFailed(format!("HTTP {}", status.as_u16())));
        }

        resp.bytes()
            .await
            .map_err(|e| PipelineError::DownloadFailed(e.to_string()))
    }
}
