use crate::api::{Gateway, VideoOperation, VideoRequest};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use bytes::Bytes;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info};

pub const POLLING_MESSAGES: &[&str] = &[
    "Warming up the video synthesizer...",
    "Gathering pixels from the digital ether...",
    "Teaching photons how to dance...",
    "Rendering cinematic brilliance, one frame at a time...",
    "The director is reviewing the dailies...",
    "This is taking a moment, your masterpiece is worth the wait.",
    "Finalizing the color grade and special effects...",
    "Polishing the final cut...",
];

pub fn flavor_message(tick: usize) -> &'static str {
    POLLING_MESSAGES[tick % POLLING_MESSAGES.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

impl PollSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.poll_interval(),
            max_attempts: cfg.max_poll_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoClip {
    pub bytes: Bytes,
    pub mime_type: String,
    pub source_uri: String,
}

fn status_line(op: &VideoOperation) -> String {
    format!(
        "Operation status: {}. Please wait...",
        op.state.as_deref().unwrap_or("processing")
    )
}

pub async fn render_video<G, F>(
    gateway: &G,
    request: &VideoRequest,
    settings: &PollSettings,
    mut on_progress: F,
) -> Result<VideoClip>
where
    G: Gateway + ?Sized,
    F: FnMut(&str) -> ControlFlow<()> + Send,
{
    let mut op = gateway.start_video(request).await?;
    info!(operation = %op.name, aspect = %request.aspect_ratio, "video render submitted");

    let mut checks: u32 = 0;
    while !op.done {
        if settings.max_attempts.is_some_and(|max| checks >= max) {
            return Err(PipelineError::RenderTimedOut { attempts: checks });
        }
        if on_progress(&status_line(&op)).is_break() {
            debug!(operation = %op.name, checks, "render abandoned by listener");
            return Err(PipelineError::Discarded);
        }
        tokio::time::sleep(settings.interval).await;
        op = gateway.poll_video(&op).await?;
        checks += 1;
        debug!(operation = %op.name, checks, done = op.done, "polled render");
    }

    if let Some(message) = op.error {
        return Err(PipelineError::from_remote(message));
    }
    let uri = op.video_uri.ok_or(PipelineError::RenderProducedNoOutput)?;

    let bytes = gateway.download_media(&uri).await?;
    if bytes.is_empty() {
        return Err(PipelineError::DownloadFailed("empty response body".to_string()));
    }
    info!(operation = %op.name, size = bytes.len(), "video downloaded");

    Ok(VideoClip {
        bytes,
        mime_type: "video/mp4".to_string(),
        source_uri: uri,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AspectRatio, SpeechPayload};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Reports `done` after `polls_until_done` status checks.
    struct SlowRender {
        polls_until_done: u32,
        polls: Mutex<u32>,
        uri: Option<String>,
        op_error: Option<String>,
        download: Result<Bytes>,
    }

    impl SlowRender {
        fn new(polls_until_done: u32) -> Self {
            Self {
                polls_until_done,
                polls: Mutex::new(0),
                uri: Some("https://files.example/v.mp4".into()),
                op_error: None,
                download: Ok(Bytes::from_static(b"mp4")),
            }
        }

        fn op(&self, done: bool) -> VideoOperation {
            VideoOperation {
                name: "operations/1".into(),
                done,
                state: Some("RUNNING".into()),
                video_uri: if done { self.uri.clone() } else { None },
                error: if done { self.op_error.clone() } else { None },
            }
        }
    }

    #[async_trait]
    impl Gateway for SlowRender {
        async fn list_story_ideas(&self, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn draft_script(&self, _: &str, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn synthesize_speech(&self, _: &str) -> Result<SpeechPayload> {
            unreachable!()
        }
        async fn decompose_script(&self, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn start_video(&self, _: &VideoRequest) -> Result<VideoOperation> {
            Ok(self.op(self.polls_until_done == 0))
        }
        async fn poll_video(&self, _: &VideoOperation) -> Result<VideoOperation> {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            Ok(self.op(*polls >= self.polls_until_done))
        }
        async fn download_media(&self, _: &str) -> Result<Bytes> {
            self.download.clone()
        }
    }

    fn keep_going(_: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn request() -> VideoRequest {
        VideoRequest {
            prompt: "red dunes".into(),
            aspect_ratio: AspectRatio::Landscape,
            image: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_and_reports_progress() {
        let gateway = SlowRender::new(3);
        let mut progress = Vec::new();
        let started = tokio::time::Instant::now();

        let clip = render_video(&gateway, &request(), &PollSettings::default(), |msg| {
            progress.push(msg.to_string());
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

        assert_eq!(&clip.bytes[..], b"mp4");
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[0], "Operation status: RUNNING. Please wait...");
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_without_uri_is_no_output() {
        let mut gateway = SlowRender::new(1);
        gateway.uri = None;
        let err = render_video(&gateway, &request(), &PollSettings::default(), keep_going)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::RenderProducedNoOutput);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_error_is_classified() {
        let mut gateway = SlowRender::new(1);
        gateway.op_error = Some("Requested entity was not found.".into());
        let err = render_video(&gateway, &request(), &PollSettings::default(), keep_going)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_surfaces_separately() {
        let mut gateway = SlowRender::new(0);
        gateway.download = Err(PipelineError::DownloadFailed("HTTP 500".into()));
        let err = render_video(&gateway, &request(), &PollSettings::default(), keep_going)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::DownloadFailed("HTTP 500".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_ceiling_stops_polling() {
        let gateway = SlowRender::new(100);
        let settings = PollSettings {
            interval: Duration::from_secs(10),
            max_attempts: Some(2),
        };
        let err = render_video(&gateway, &request(), &settings, keep_going)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::RenderTimedOut { attempts: 2 });
        assert_eq!(*gateway.polls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_break_abandons_the_operation() {
        let gateway = SlowRender::new(100);
        let started = tokio::time::Instant::now();
        let err = render_video(&gateway, &request(), &PollSettings::default(), |_| {
            ControlFlow::Break(())
        })
        .await
        .unwrap_err();

        assert_eq!(err, PipelineError::Discarded);
        assert_eq!(*gateway.polls.lock().unwrap(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn flavor_messages_rotate() {
        assert_eq!(flavor_message(0), POLLING_MESSAGES[0]);
        assert_eq!(flavor_message(POLLING_MESSAGES.len() + 1), POLLING_MESSAGES[1]);
    }
}
