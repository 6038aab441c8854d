use anyhow::Result;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use story_video::api::AspectRatio;
use story_video::api::gemini::GeminiGateway;
use story_video::config::Config;
use story_video::credentials::{ApiKey, TerminalKeySelector};
use story_video::export::export_session;
use story_video::init;
use story_video::render::{PollSettings, flavor_message};
use story_video::segments::SegmentStatus;
use story_video::{PipelineSnapshot, PipelineStage, StoryPipeline, set_log_hook};

const LOG_MAX_LINES: usize = 300;
const LOG_LINE_MAX: usize = 600;
const STATUS_TICK: Duration = Duration::from_secs(4);

fn push_log_line(buffer: &Arc<Mutex<Vec<String>>>, line: &str) {
    let mut guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
    if guard.len() >= LOG_MAX_LINES {
        let excess = guard.len() + 1 - LOG_MAX_LINES;
        guard.drain(0..excess);
    }
    let mut text = line.to_string();
    if text.len() > LOG_LINE_MAX {
        let mut cut = LOG_LINE_MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    guard.push(text);
}

fn print_logs(buffer: &Arc<Mutex<Vec<String>>>) {
    for line in buffer.lock().unwrap_or_else(|e| e.into_inner()).iter() {
        println!("{}", line);
    }
}

async fn ask(label: &str) -> Result<Option<String>> {
    let label = label.to_string();
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        print!("{}> ", label);
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    })
    .await??;
    Ok(line)
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Quit,
    Reset,
    Log,
    Export,
    SelectKey,
    // Anything else is input for the current stage.
    Stage,
}

impl Command {
    fn parse(input: &str) -> Self {
        match input.trim() {
            "" => Command::Empty,
            "quit" | "q" => Command::Quit,
            "reset" => Command::Reset,
            "log" => Command::Log,
            "export" => Command::Export,
            "key" => Command::SelectKey,
            _ => Command::Stage,
        }
    }
}

fn show_error(snap: &PipelineSnapshot) {
    if let Some(err) = &snap.error {
        println!("!! {}", err);
    }
}

fn show_segments(snap: &PipelineSnapshot) {
    for seg in snap.segments.segments() {
        let mark = match seg.status {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Generating => "generating",
            SegmentStatus::Done => "done",
            SegmentStatus::Error => "error",
        };
        println!("  [{:>10}] {:>2}. {}", mark, seg.segment, seg.prompt);
    }
}

async fn render_with_status(pipeline: &Arc<StoryPipeline>) {
    let worker = {
        let pipeline = Arc::clone(pipeline);
        tokio::spawn(async move { pipeline.render_segments().await })
    };
    tokio::pin!(worker);

    let mut ticker = tokio::time::interval(STATUS_TICK);
    let mut tick = 0usize;
    loop {
        tokio::select! {
            joined = &mut worker => {
                if let Ok(Err(err)) = joined {
                    println!("!! {}", err.user_message());
                }
                break;
            }
            _ = ticker.tick() => {
                let snap = pipeline.snapshot();
                println!("{}", flavor_message(tick));
                if let Some(progress) = &snap.progress {
                    println!("   {}", progress);
                }
                tick += 1;
            }
        }
    }
}

async fn export(pipeline: &StoryPipeline, cfg: &Config) {
    match export_session(&pipeline.snapshot(), &cfg.output_dir).await {
        Ok(summary) => println!("Saved {} files to {}", summary.files.len(), summary.dir.display()),
        Err(err) => println!("!! Export failed: {:#}", err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init::init_tracing();

    let cfg = Config::load_or_default("config.json").await?.with_env_key();
    init::ensure_directories(&cfg).await?;

    let log_buffer = Arc::new(Mutex::new(Vec::with_capacity(LOG_MAX_LINES)));
    let hook_buffer = Arc::clone(&log_buffer);
    set_log_hook(Some(Arc::new(Mutex::new(move |line: &str| {
        push_log_line(&hook_buffer, line);
    }))));

    let key = ApiKey::new(cfg.api_key.clone());
    let gateway = Arc::new(GeminiGateway::new(&cfg, key.clone())?);
    let selector = Arc::new(TerminalKeySelector::new(key));
    let pipeline = Arc::new(StoryPipeline::new(
        gateway,
        selector,
        PollSettings::from_config(&cfg),
    ));
    if !pipeline.check_credentials().await {
        println!("No Gemini API key configured.");
        if let Err(err) = pipeline.confirm_credentials().await {
            println!("!! {}", err.user_message());
        }
    }

    println!("Story-to-Video Pipeline. Commands: 'key', 'reset', 'log', 'export', 'quit'.");

    loop {
        let snap = pipeline.snapshot();
        let label = match snap.stage {
            PipelineStage::Idea => {
                println!("\n1. Start with an idea (e.g. A space detective series set on Mars)");
                if !snap.credentials_ready {
                    println!("No API key selected yet. Type 'key' to enter one.");
                }
                "theme"
            }
            PipelineStage::Selecting => {
                println!("\n2. Select a story concept");
                for (i, idea) in snap.ideas.iter().enumerate() {
                    println!("  {:>2}. {} - {}", i + 1, idea.title, idea.description);
                }
                "idea number"
            }
            PipelineStage::Scripted => {
                println!("\n3. Review your script\n");
                println!("{}", snap.script.as_deref().unwrap_or_default());
                if snap.audio.is_some() {
                    println!("\n(narration ready; 'export' saves it)");
                }
                println!("\n[a] generate audio (TTS)  [s] create video segments  [export]");
                "choice"
            }
            PipelineStage::Rendering => {
                println!("\n4. Generate videos ({})", snap.aspect_ratio);
                show_segments(&snap);
                if snap.credentials_ready {
                    println!("[g] generate all videos  [l] landscape  [p] portrait  [export]");
                } else {
                    println!("Veo video generation requires an API key. [k] select API key");
                }
                "choice"
            }
        };
        show_error(&snap);

        let Some(input) = ask(label).await? else {
            break;
        };
        match Command::parse(&input) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Reset => {
                pipeline.reset();
                continue;
            }
            Command::Log => {
                print_logs(&log_buffer);
                continue;
            }
            Command::Export => {
                export(&pipeline, &cfg).await;
                continue;
            }
            Command::SelectKey => {
                let _ = pipeline.confirm_credentials().await;
                continue;
            }
            Command::Stage => {}
        }

        // Failures are recorded on the snapshot and shown on the next pass.
        match snap.stage {
            PipelineStage::Idea => {
                if let Err(err) = pipeline.submit_idea_prompt(&input).await {
                    println!("!! {}", err.user_message());
                }
            }
            PipelineStage::Selecting => {
                let picked = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| snap.ideas.get(i));
                match picked {
                    Some(idea) => {
                        let _ = pipeline.select_idea(idea).await;
                    }
                    None => println!("Pick a number between 1 and {}.", snap.ideas.len()),
                }
            }
            PipelineStage::Scripted => match input.as_str() {
                "a" => {
                    let _ = pipeline.request_audio().await;
                }
                "s" => {
                    let _ = pipeline.decompose_script().await;
                }
                _ => println!("Unknown choice."),
            },
            PipelineStage::Rendering => match input.as_str() {
                "k" => {
                    let _ = pipeline.confirm_credentials().await;
                }
                "l" => pipeline.set_aspect_ratio(AspectRatio::Landscape),
                "p" => pipeline.set_aspect_ratio(AspectRatio::Portrait),
                "g" => {
                    render_with_status(&pipeline).await;
                    show_segments(&pipeline.snapshot());
                }
                _ => println!("Unknown choice."),
            },
        }
    }

    set_log_hook(None);
    Ok(())
}
