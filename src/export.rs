use crate::pipeline::PipelineSnapshot;
use crate::segments::SegmentStatus;
use crate::story::StoryIdea;
use crate::{logi, logok};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Serialize)]
struct SessionManifest<'a> {
    created_at: String,
    theme: Option<&'a str>,
    idea: Option<&'a StoryIdea>,
    aspect_ratio: &'static str,
    script_file: Option<String>,
    audio_file: Option<String>,
    segments: Vec<ManifestSegment<'a>>,
}

#[derive(Debug, Serialize)]
struct ManifestSegment<'a> {
    segment: u32,
    prompt: &'a str,
    status: SegmentStatus,
    file: Option<String>,
    source_uri: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

fn slug(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    trimmed.chars().take(48).collect()
}

fn session_dir_name(now: DateTime<Local>, title: Option<&str>) -> String {
    let stamp = now.format("%Y%m%d-%H%M%S").to_string();
    match title.map(slug).filter(|s| !s.is_empty()) {
        Some(slug) => format!("{}-{}", stamp, slug),
        None => stamp,
    }
}

async fn write_file(
    dir: &Path,
    name: &str,
    data: &[u8],
    files: &mut Vec<PathBuf>,
) -> Result<String> {
    let path = dir.join(name);
    fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    files.push(path);
    Ok(name.to_string())
}

pub async fn export_session(
    snapshot: &PipelineSnapshot,
    output_dir: &Path,
) -> Result<ExportSummary> {
    let title = snapshot.selected_idea.as_ref().map(|i| i.title.as_str());
    let dir = output_dir.join(session_dir_name(Local::now(), title));
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create dir {}", dir.display()))?;
    logi(format!("Exporting session to {}", dir.display()));

    let mut files = Vec::new();

    let script_file = match &snapshot.script {
        Some(script) => Some(write_file(&dir, "script.txt", script.as_bytes(), &mut files).await?),
        None => None,
    };

    let audio_file = match &snapshot.audio {
        Some(audio) => {
            let name = format!("narration.{}", audio.file_extension());
            Some(write_file(&dir, &name, &audio.bytes, &mut files).await?)
        }
        None => None,
    };

    let mut segments = Vec::with_capacity(snapshot.segments.len());
    for seg in snapshot.segments.segments() {
        let file = match &seg.video {
            Some(clip) if seg.status == SegmentStatus::Done => {
                let name = format!("segment_{:02}.mp4", seg.segment);
                Some(write_file(&dir, &name, &clip.bytes, &mut files).await?)
            }
            _ => None,
        };
        segments.push(ManifestSegment {
            segment: seg.segment,
            prompt: &seg.prompt,
            status: seg.status,
            file,
            source_uri: seg.video.as_ref().map(|c| c.source_uri.as_str()),
        });
    }

    let manifest = SessionManifest {
        created_at: Local::now().to_rfc3339(),
        theme: snapshot.idea_prompt.as_deref(),
        idea: snapshot.selected_idea.as_ref(),
        aspect_ratio: snapshot.aspect_ratio.as_str(),
        script_file,
        audio_file,
        segments,
    };
    let json = serde_json::to_vec_pretty(&manifest).context("Failed to encode session manifest")?;
    write_file(&dir, "session.json", &json, &mut files).await?;

    logok(format!("Exported {} files to {}", files.len(), dir.display()));
    Ok(ExportSummary { dir, files })
}
