use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use story_video::api::gemini::GeminiGateway;
use story_video::api::{AspectRatio, SourceImage};
use story_video::config::{API_KEY_ENV, Config};
use story_video::credentials::{ApiKey, TerminalKeySelector};
use story_video::export::export_session;
use story_video::init;
use story_video::render::PollSettings;
use story_video::segments::SegmentStatus;
use story_video::StoryPipeline;

/// Runs the whole story-to-video pipeline without prompts.
#[derive(Debug, Parser)]
#[command(name = "story-video-cli", version)]
struct Args {
    /// Theme for the story ideas.
    #[arg(long)]
    theme: String,

    /// 1-based index of the idea to script.
    #[arg(long, default_value_t = 1)]
    idea: usize,

    /// 1:1, 16:9, 9:16, 4:3 or 3:4.
    #[arg(long, default_value = "16:9")]
    aspect: AspectRatio,

    /// Also synthesize narration for the script.
    #[arg(long)]
    audio: bool,

    /// Still image that seeds every segment.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Stop after the segment prompts are created.
    #[arg(long)]
    skip_video: bool,

    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Overrides `output_dir` from the config.
    #[arg(long)]
    output: Option<PathBuf>,
}

async fn run(args: Args) -> Result<i32> {
    let mut cfg = Config::load_or_default(&args.config).await?.with_env_key();
    if let Some(output) = args.output {
        cfg.output_dir = output;
    }
    init::ensure_directories(&cfg).await?;

    let key = ApiKey::new(cfg.api_key.clone());
    if !key.is_set() {
        bail!("No API key: set gemini_api_key in {} or {}", args.config.display(), API_KEY_ENV);
    }
    let gateway = Arc::new(GeminiGateway::new(&cfg, key.clone())?);
    let selector = Arc::new(TerminalKeySelector::new(key));
    let pipeline = StoryPipeline::new(gateway, selector, PollSettings::from_config(&cfg));
    pipeline.set_aspect_ratio(args.aspect);
    if let Some(path) = &args.image {
        pipeline.set_source_image(Some(SourceImage::load(path).await?));
    }

    let ideas = pipeline
        .submit_idea_prompt(&args.theme)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    for (i, idea) in ideas.iter().enumerate() {
        println!("{:>2}. {} - {}", i + 1, idea.title, idea.description);
    }
    let idea = args
        .idea
        .checked_sub(1)
        .and_then(|i| ideas.get(i))
        .with_context(|| format!("--idea must be between 1 and {}", ideas.len()))?;

    let script = pipeline
        .select_idea(idea)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("\n{}\n", script);

    if args.audio {
        if let Err(err) = pipeline.request_audio().await {
            eprintln!("[WARN] {}", err.user_message());
        }
    }

    let segments = pipeline
        .decompose_script()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    for seg in &segments {
        println!("Segment {}: {}", seg.segment, seg.prompt);
    }

    let mut code = 0;
    if !args.skip_video {
        pipeline.check_credentials().await;
        let outcome = pipeline
            .render_segments()
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        let done = outcome.board.count(SegmentStatus::Done);
        println!("Rendered {}/{} segments", done, outcome.board.len());
        if let Some(err) = pipeline.snapshot().error {
            eprintln!("[WARN] {}", err);
            code = 1;
        }
    }

    let summary = export_session(&pipeline.snapshot(), &cfg.output_dir).await?;
    println!("Saved session to {}", summary.dir.display());
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init::init_tracing();

    let code = run(Args::parse()).await?;
    std::process::exit(code);
}
