use crate::api::{AspectRatio, Gateway, SourceImage};
use crate::audio::{AudioArtifact, decode_speech};
use crate::credentials::{CredentialGate, CredentialSelector};
use crate::error::{PipelineError, Result};
use crate::render::PollSettings;
use crate::segments::{RunEvent, RunOutcome, SegmentBoard, SegmentRunner, VideoSegment};
use crate::story::{StoryIdea, parse_shot_prompts, parse_story_ideas};
use crate::{logi, logok, logw};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PipelineStage {
    #[default]
    Idea,
    Selecting,
    Scripted,
    Rendering,
}

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Idea => "idea",
            PipelineStage::Selecting => "idea selection",
            PipelineStage::Scripted => "script review",
            PipelineStage::Rendering => "video generation",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSnapshot {
    pub stage: PipelineStage,
    pub idea_prompt: Option<String>,
    pub ideas: Vec<StoryIdea>,
    pub selected_idea: Option<StoryIdea>,
    pub script: Option<String>,
    pub audio: Option<AudioArtifact>,
    pub segments: SegmentBoard,
    pub aspect_ratio: AspectRatio,
    pub has_source_image: bool,
    pub error: Option<String>,
    pub progress: Option<String>,
    pub busy: bool,
    pub credentials_ready: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    stage: PipelineStage,
    idea_prompt: Option<String>,
    ideas: Vec<StoryIdea>,
    selected_idea: Option<StoryIdea>,
    script: Option<String>,
    audio: Option<AudioArtifact>,
    segments: SegmentBoard,
    aspect_ratio: AspectRatio,
    source_image: Option<SourceImage>,
    error: Option<String>,
    progress: Option<String>,
    busy: bool,
    epoch: u64,
}

pub struct StoryPipeline {
    gateway: Arc<dyn Gateway>,
    selector: Arc<dyn CredentialSelector>,
    gate: CredentialGate,
    poll: PollSettings,
    state: Mutex<SessionState>,
}

impl StoryPipeline {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        selector: Arc<dyn CredentialSelector>,
        poll: PollSettings,
    ) -> Self {
        Self {
            gateway,
            selector,
            gate: CredentialGate::default(),
            poll,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let st = self.lock();
        PipelineSnapshot {
            stage: st.stage,
            idea_prompt: st.idea_prompt.clone(),
            ideas: st.ideas.clone(),
            selected_idea: st.selected_idea.clone(),
            script: st.script.clone(),
            audio: st.audio.clone(),
            segments: st.segments.clone(),
            aspect_ratio: st.aspect_ratio,
            has_source_image: st.source_image.is_some(),
            error: st.error.clone(),
            progress: st.progress.clone(),
            busy: st.busy,
            credentials_ready: self.gate.is_ready(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.lock().stage
    }

    pub fn credentials_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn set_aspect_ratio(&self, ratio: AspectRatio) {
        self.lock().aspect_ratio = ratio;
    }

    pub fn set_source_image(&self, image: Option<SourceImage>) {
        self.lock().source_image = image;
    }

    pub async fn check_credentials(&self) -> bool {
        if self.selector.has_selected_credential().await {
            self.gate.mark_ready();
        }
        self.gate.is_ready()
    }

    // Readiness flips on as soon as the prompt returns, without asking the
    // selector again. A closed prompt still counts as "ready" until the
    // remote side rejects the key.
    pub async fn confirm_credentials(&self) -> Result<()> {
        match self.selector.prompt_for_credential().await {
            Ok(()) => {
                self.gate.mark_ready();
                self.lock().error = None;
                logok("Credential selection confirmed");
                Ok(())
            }
            Err(err) => {
                logw(format!("Credential selection failed: {}", err));
                self.lock().error = Some(err.user_message());
                Err(err)
            }
        }
    }

    // Rendering options survive a reset.
    pub fn reset(&self) {
        let mut st = self.lock();
        let next = SessionState {
            aspect_ratio: st.aspect_ratio,
            source_image: st.source_image.take(),
            epoch: st.epoch + 1,
            ..SessionState::default()
        };
        *st = next;
        logi("Pipeline reset");
    }

    fn begin(&self, expected: PipelineStage) -> Result<u64> {
        self.begin_checked(expected, |_| Ok(()))
    }

    fn begin_checked<F>(&self, expected: PipelineStage, check: F) -> Result<u64>
    where
        F: FnOnce(&SessionState) -> Result<()>,
    {
        let mut st = self.lock();
        if st.busy {
            return Err(PipelineError::Busy);
        }
        if st.stage != expected {
            return Err(PipelineError::WrongStage {
                expected,
                actual: st.stage,
            });
        }
        check(&*st)?;
        st.busy = true;
        st.error = None;
        Ok(st.epoch)
    }

    fn settle<T, F>(&self, epoch: u64, outcome: Result<T>, apply: F) -> Result<T>
    where
        F: FnOnce(&mut SessionState, &T),
    {
        let mut st = self.lock();
        if st.epoch != epoch {
            logw("Dropping a response that arrived after reset");
            return Err(PipelineError::Discarded);
        }
        st.busy = false;
        match &outcome {
            Ok(value) => apply(&mut st, value),
            Err(err) => {
                if err.is_authorization() {
                    self.gate.clear();
                }
                st.error = Some(err.user_message());
            }
        }
        outcome
    }

    fn current_script(&self) -> Result<String> {
        self.lock()
            .script
            .clone()
            .ok_or_else(|| {
                PipelineError::InvalidInput("No script has been generated yet.".to_string())
            })
    }

    pub async fn submit_idea_prompt(&self, prompt: &str) -> Result<Vec<StoryIdea>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::InvalidInput(
                "Enter a theme to generate story ideas.".to_string(),
            ));
        }
        let epoch = self.begin(PipelineStage::Idea)?;
        logi(format!("Requesting story ideas for \"{}\"", prompt));

        let outcome = match self.gateway.list_story_ideas(prompt).await {
            Ok(text) => parse_story_ideas(&text),
            Err(err) => Err(err),
        };

        self.settle(epoch, outcome, |st, ideas| {
            logok(format!("Received {} story ideas", ideas.len()));
            st.idea_prompt = Some(prompt.to_string());
            st.ideas = ideas.clone();
            st.stage = PipelineStage::Selecting;
        })
    }

    pub async fn select_idea(&self, idea: &StoryIdea) -> Result<String> {
        let epoch = self.begin_checked(PipelineStage::Selecting, |st| {
            if st.ideas.contains(idea) {
                Ok(())
            } else {
                Err(PipelineError::InvalidInput(
                    "Pick one of the generated story ideas.".to_string(),
                ))
            }
        })?;
        logi(format!("Drafting script for \"{}\"", idea.title));

        let outcome = match self.gateway.draft_script(&idea.title, &idea.description).await {
            Ok(script) if script.trim().is_empty() => Err(PipelineError::GenerationFailed(
                "the model returned an empty script".to_string(),
            )),
            Ok(script) => Ok(script),
            Err(
                err @ (PipelineError::GenerationFailed(_) | PipelineError::AuthorizationExpired(_)),
            ) => Err(err),
            Err(err) => Err(PipelineError::GenerationFailed(err.to_string())),
        };

        self.settle(epoch, outcome, |st, script| {
            logok(format!("Script ready ({} chars)", script.len()));
            st.selected_idea = Some(idea.clone());
            st.script = Some(script.clone());
            st.stage = PipelineStage::Scripted;
        })
    }

    pub async fn request_audio(&self) -> Result<AudioArtifact> {
        let epoch = self.begin(PipelineStage::Scripted)?;
        let outcome = match self.current_script() {
            Ok(script) => {
                logi("Synthesizing narration");
                match self.gateway.synthesize_speech(&script).await {
                    Ok(payload) => decode_speech(&payload),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        self.settle(epoch, outcome, |st, audio| {
            logok(format!("Narration ready ({} bytes, {})", audio.bytes.len(), audio.mime_type));
            st.audio = Some(audio.clone());
        })
    }

    pub async fn decompose_script(&self) -> Result<Vec<VideoSegment>> {
        let epoch = self.begin(PipelineStage::Scripted)?;
        let outcome = match self.current_script() {
            Ok(script) => {
                logi("Breaking the script into video segments");
                match self.gateway.decompose_script(&script).await {
                    Ok(text) => parse_shot_prompts(&text).map(SegmentBoard::from_prompts),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        self.settle(epoch, outcome, |st, board| {
            logok(format!("Script split into {} segments", board.len()));
            st.segments = board.clone();
            st.stage = PipelineStage::Rendering;
        })
        .map(|board| board.segments().to_vec())
    }

    /// Per-segment results live on the returned board; `Err` only means the
    /// run could not start or was overtaken by a reset.
    pub async fn render_segments(&self) -> Result<RunOutcome> {
        let (epoch, board, aspect_ratio, image) = {
            let mut st = self.lock();
            if st.busy {
                return Err(PipelineError::Busy);
            }
            if st.stage != PipelineStage::Rendering {
                return Err(PipelineError::WrongStage {
                    expected: PipelineStage::Rendering,
                    actual: st.stage,
                });
            }
            if !self.gate.is_ready() {
                let err = PipelineError::CredentialsNotReady;
                st.error = Some(err.user_message());
                return Err(err);
            }
            st.busy = true;
            st.error = None;
            (st.epoch, st.segments.clone(), st.aspect_ratio, st.source_image.clone())
        };

        logi(format!("Rendering {} segments at {}", board.len(), aspect_ratio));
        let runner = SegmentRunner::new(self.gateway.as_ref(), self.poll);
        let outcome = runner
            .run(board, aspect_ratio, image.as_ref(), |event| {
                let mut st = self.lock();
                if st.epoch != epoch {
                    return ControlFlow::Break(());
                }
                match event {
                    RunEvent::Board(board) => {
                        st.segments = board.clone();
                        st.progress = None;
                    }
                    RunEvent::Progress { text, .. } => st.progress = Some(text.to_string()),
                }
                ControlFlow::Continue(())
            })
            .await;

        let mut st = self.lock();
        if outcome.interrupted || st.epoch != epoch {
            logw("Dropping render results that arrived after reset");
            return Err(PipelineError::Discarded);
        }
        st.busy = false;
        st.progress = None;
        st.segments = outcome.board.clone();
        match &outcome.failure {
            Some(failure) if failure.error.is_authorization() => {
                self.gate.clear();
                st.error = Some(failure.error.user_message());
            }
            Some(failure) => {
                st.error = Some(format!(
                    "Error on segment {}: {}",
                    failure.position,
                    failure.error.user_message()
                ));
            }
            None => logok(format!("All {} segments rendered", outcome.board.len())),
        }
        Ok(outcome)
    }
}
