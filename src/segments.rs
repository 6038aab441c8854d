use crate::api::{AspectRatio, Gateway, SourceImage, VideoRequest};
use crate::error::PipelineError;
use crate::render::{PollSettings, VideoClip, render_video};
use crate::story::ShotPrompt;
use crate::{logi, logok, logw};
use serde::Serialize;
use std::ops::ControlFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Pending,
    Generating,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoSegment {
    pub segment: u32,
    pub prompt: String,
    pub status: SegmentStatus,
    #[serde(skip)]
    pub video: Option<VideoClip>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentBoard {
    segments: Vec<VideoSegment>,
    version: u64,
}

impl SegmentBoard {
    pub fn from_prompts(prompts: Vec<ShotPrompt>) -> Self {
        let segments = prompts
            .into_iter()
            .map(|p| VideoSegment {
                segment: p.segment,
                prompt: p.prompt,
                status: SegmentStatus::Pending,
                video: None,
            })
            .collect();
        Self {
            segments,
            version: 0,
        }
    }

    pub fn segments(&self) -> &[VideoSegment] {
        &self.segments
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, segment: u32) -> Option<&VideoSegment> {
        self.segments.iter().find(|s| s.segment == segment)
    }

    pub fn count(&self, status: SegmentStatus) -> usize {
        self.segments.iter().filter(|s| s.status == status).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.segments.is_empty() && self.count(SegmentStatus::Done) == self.segments.len()
    }

    pub fn statuses(&self) -> Vec<SegmentStatus> {
        self.segments.iter().map(|s| s.status).collect()
    }

    // Unknown segment numbers leave the board as is.
    pub fn with_segment<F>(&self, segment: u32, change: F) -> Self
    where
        F: FnOnce(&mut VideoSegment),
    {
        let Some(idx) = self.segments.iter().position(|s| s.segment == segment) else {
            return self.clone();
        };
        let mut next = self.clone();
        change(&mut next.segments[idx]);
        next.version += 1;
        next
    }

    pub fn with_status(&self, segment: u32, status: SegmentStatus) -> Self {
        self.with_segment(segment, |s| s.status = status)
    }

    pub fn with_video(&self, segment: u32, clip: VideoClip) -> Self {
        self.with_segment(segment, |s| {
            s.status = SegmentStatus::Done;
            s.video = Some(clip);
        })
    }
}

#[derive(Debug)]
pub enum RunEvent<'a> {
    Board(&'a SegmentBoard),
    Progress { segment: u32, text: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    pub segment: u32,
    pub position: usize,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub board: SegmentBoard,
    pub failure: Option<SegmentFailure>,
    pub interrupted: bool,
}

pub struct SegmentRunner<'a, G: Gateway + ?Sized> {
    gateway: &'a G,
    poll: PollSettings,
}

impl<'a, G: Gateway + ?Sized> SegmentRunner<'a, G> {
    pub fn new(gateway: &'a G, poll: PollSettings) -> Self {
        Self { gateway, poll }
    }

    /// Renders every segment not yet `Done`, in order, stopping at the first error.
    pub async fn run<F>(
        &self,
        board: SegmentBoard,
        aspect_ratio: AspectRatio,
        image: Option<&SourceImage>,
        mut publish: F,
    ) -> RunOutcome
    where
        F: FnMut(RunEvent<'_>) -> ControlFlow<()> + Send,
    {
        let total = board.len();
        let order: Vec<(usize, u32, String, SegmentStatus)> = board
            .segments()
            .iter()
            .enumerate()
            .map(|(i, s)| (i + 1, s.segment, s.prompt.clone(), s.status))
            .collect();

        let mut board = board;
        for (position, segment, prompt, status) in order {
            if status == SegmentStatus::Done {
                continue;
            }

            board = board.with_status(segment, SegmentStatus::Generating);
            if publish(RunEvent::Board(&board)).is_break() {
                return interrupted(board);
            }
            logi(format!("Rendering segment {}/{}: {}", position, total, prompt));

            let request = VideoRequest {
                prompt,
                aspect_ratio,
                image: image.cloned(),
            };
            let mut stale = false;
            let result = render_video(self.gateway, &request, &self.poll, |text| {
                let line = format!("Segment {}/{}: {}", position, total, text);
                let flow = publish(RunEvent::Progress {
                    segment,
                    text: &line,
                });
                stale = flow.is_break();
                flow
            })
            .await;
            if stale {
                return interrupted(board);
            }

            match result {
                Ok(clip) => {
                    board = board.with_video(segment, clip);
                    logok(format!("Segment {}/{} done", position, total));
                    if publish(RunEvent::Board(&board)).is_break() {
                        return interrupted(board);
                    }
                }
                Err(error) => {
                    board = board.with_status(segment, SegmentStatus::Error);
                    logw(format!("Segment {}/{} failed: {}", position, total, error));
                    let _ = publish(RunEvent::Board(&board));
                    return RunOutcome {
                        board,
                        failure: Some(SegmentFailure {
                            segment,
                            position,
                            error,
                        }),
                        interrupted: false,
                    };
                }
            }
        }

        RunOutcome {
            board,
            failure: None,
            interrupted: false,
        }
    }
}

fn interrupted(board: SegmentBoard) -> RunOutcome {
    RunOutcome {
        board,
        failure: None,
        interrupted: true,
    }
}
