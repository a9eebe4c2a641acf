use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_ui::{
    album_layout::{container_size, layout_album},
    attachments::{filter_for_intent, popup_title, AttachIntent},
    config::load_settings_from,
    load_settings,
    media_sizes::MediaSize,
    MediaSizes, Settings,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use shared::domain::FileSource;
use tracing_subscriber::EnvFilter;

mod simulate;

#[derive(Parser, Debug)]
#[command(name = "chat-ui-tools", about = "Inspect composer layout and banner behaviour")]
struct Cli {
    /// Settings file; falls back to CHAT_UI_CONFIG or chat_ui.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lays out an album of media with the given pixel sizes.
    AlbumLayout {
        #[arg(long = "size", value_parser = parse_size, required = true)]
        sizes: Vec<MediaSize>,
    },
    /// Classifies a viewport width.
    Viewport {
        #[arg(long)]
        width: u32,
    },
    /// Title of the attach popup for files of the given MIME types.
    PopupTitle {
        #[arg(long, value_enum)]
        intent: IntentArg,
        #[arg(long = "mime", required = true)]
        mimes: Vec<String>,
    },
    /// Drives a composer and pinned banner through a scripted session.
    Simulate {
        #[arg(long, default_value_t = 400)]
        width: u32,
        #[arg(long, default_value = "check https://example.com")]
        text: String,
        #[arg(long, default_value = "holiday")]
        caption: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IntentArg {
    Media,
    Document,
}

impl From<IntentArg> for AttachIntent {
    fn from(value: IntentArg) -> Self {
        match value {
            IntentArg::Media => AttachIntent::Media,
            IntentArg::Document => AttachIntent::Document,
        }
    }
}

fn parse_size(raw: &str) -> Result<MediaSize, String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| *value > 0.0)
            .ok_or_else(|| format!("invalid dimension '{value}' in '{raw}'"))
    };
    Ok(MediaSize::new(parse(width)?, parse(height)?))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings: Settings = match &cli.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };

    match cli.command {
        Command::AlbumLayout { sizes } => {
            let layout = layout_album(&sizes, &settings.album_params());
            let (width, height) = container_size(&layout);
            print_json(&json!({
                "items": layout,
                "container": { "width": width, "height": height },
            }))?;
        }
        Command::Viewport { width } => {
            let sizes = MediaSizes::new(width);
            print_json(&json!({
                "width": width,
                "screen": sizes.active_screen(),
                "is_mobile": sizes.is_mobile(),
                "sizes": sizes.active(),
            }))?;
        }
        Command::PopupTitle { intent, mimes } => {
            let intent = AttachIntent::from(intent);
            let files: Vec<FileSource> = mimes
                .iter()
                .enumerate()
                .map(|(idx, mime)| FileSource::new(format!("file-{idx}"), mime.as_str(), Vec::new()))
                .collect();
            let kept = filter_for_intent(intent, files);
            print_json(&json!({
                "intent": intent,
                "kept": kept.len(),
                "title": popup_title(intent, &kept),
            }))?;
        }
        Command::Simulate {
            width,
            text,
            caption,
        } => {
            let report = simulate::run(settings, width, &text, &caption).await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
