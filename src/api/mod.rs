pub mod gemini;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::{PipelineError, Result};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            "4:3" => Ok(AspectRatio::Standard),
            "3:4" => Ok(AspectRatio::StandardPortrait),
            other => Err(PipelineError::InvalidInput(format!(
                "Unknown aspect ratio '{other}'. Use one of 1:1, 16:9, 9:16, 4:3, 3:4."
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl SourceImage {
    pub fn mime_for_path(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "webp" => Some("image/webp"),
            _ => None,
        }
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mime_type = Self::mime_for_path(path).ok_or_else(|| {
            anyhow::anyhow!("unsupported image type: {} (use png, jpg or webp)", path.display())
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(Self {
            bytes: Bytes::from(bytes),
            mime_type: mime_type.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub image: Option<SourceImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub state: Option<String>,
    pub video_uri: Option<String>,
    /// Error reported by the operation itself after it finished.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechPayload {
    pub data_base64: String,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Raw JSON text shaped like `{"ideas":[{"id","title","description"}]}`.
    async fn list_story_ideas(&self, theme: &str) -> Result<String>;

    async fn draft_script(&self, title: &str, description: &str) -> Result<String>;

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechPayload>;

    /// Raw JSON text shaped like `{"prompts":[{"segment","prompt"}]}`.
    async fn decompose_script(&self, script: &str) -> Result<String>;

    async fn start_video(&self, request: &VideoRequest) -> Result<VideoOperation>;

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation>;

    async fn download_media(&self, uri: &str) -> Result<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parses_names_and_ratios() {
        assert_eq!("landscape".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!(" 3:4 ".parse::<AspectRatio>().unwrap(), AspectRatio::StandardPortrait);
        assert!("21:9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn source_image_mime_follows_extension() {
        assert_eq!(SourceImage::mime_for_path(Path::new("a/b.JPG")), Some("image/jpeg"));
        assert_eq!(SourceImage::mime_for_path(Path::new("still.png")), Some("image/png"));
        assert_eq!(SourceImage::mime_for_path(Path::new("clip.gif")), None);
    }

    #[tokio::test]
    async fn source_image_loads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.webp");
        std::fs::write(&path, b"RIFFWEBP").unwrap();
        let image = SourceImage::load(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(&image.bytes[..], b"RIFFWEBP");
    }

    #[test]
    fn aspect_ratio_serializes_as_ratio_string() {
        let json = serde_json::to_string(&AspectRatio::Standard).unwrap();
        assert_eq!(json, "\"4:3\"");
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.as_str().parse::<AspectRatio>().unwrap(), ratio);
        }
    }
}
