//! bdrow command-line client
//!
//! Drives a single session: submit a prompt with up to four images, touch up
//! an image locally, play back a second-mark timeline, or manage the stored
//! API key.
//!
//! Usage:
//!   bdrow generate --prompt "generate image of a banana" --output banana.png
//!   bdrow edit --input in.png --output out.png --text "Hello@20,20"
//!   bdrow timeline --pin 0=a.png --pin 5=b.png --speed 2
//!   bdrow key set AIza...

mod edit;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bdrow::gemini::ImageConfig;
use bdrow::timeline::player;
use bdrow::{
    BdrowError, Config, CredentialStore, FileCredentialStore, GeminiClient, Generator, ImageRef,
    MemoryCredentialStore, PictureExporter, SessionManager, SubmitStatus,
};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bdrow",
    about = "Generate and touch up images with Gemini from the command line",
    version
)]
struct Args {
    /// Config file (defaults to ~/.config/bdrow/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a prompt (and optional images) for generation
    Generate(GenerateArgs),
    /// Paint, erase and stamp text onto an image locally
    Edit(edit::EditArgs),
    /// Pin images to seconds and play the timeline back
    Timeline(TimelineArgs),
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Prompt text
    #[arg(short = 'p', long, default_value = "")]
    prompt: String,

    /// Input images (up to 4)
    #[arg(short = 'i', long = "image")]
    images: Vec<PathBuf>,

    /// API key for this run only (or set GEMINI_API_KEY env var)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Requested aspect ratio for generated images, e.g. 16:9
    #[arg(long)]
    aspect_ratio: Option<String>,

    /// Requested image size, e.g. 1K
    #[arg(long)]
    image_size: Option<String>,

    /// Write the result image here
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Also save the result into the picture directory
    #[arg(long)]
    save: bool,

    /// Print the request/response trace
    #[arg(long)]
    debug: bool,
}

#[derive(clap::Args)]
struct TimelineArgs {
    /// SECOND=IMAGE pairs
    #[arg(long = "pin", value_parser = edit::parse_pin, required = true)]
    pins: Vec<(u32, PathBuf)>,

    /// Start position in seconds
    #[arg(long, default_value_t = 0)]
    from: u32,

    /// Steps per second
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Wrap to 0 at the end
    #[arg(long = "loop")]
    looping: bool,

    /// Stop after this many seconds of wall time
    #[arg(long)]
    duration: Option<f32>,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a key (encrypted) and enable it
    Set { key: String },
    /// Show a masked version of the stored key
    Show,
    /// Remove the stored key
    Clear,
    /// Enable or disable the stored key
    Use {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Report whether a usable key is configured
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref()).context("loading config")?;

    match args.command {
        Command::Generate(generate) => run_generate(&config, generate).await,
        Command::Edit(edit_args) => edit::run(&config, edit_args),
        Command::Timeline(timeline) => run_timeline(&config, timeline).await,
        Command::Key { action } => run_key(&config, action),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bdrow={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn file_store(config: &Config) -> FileCredentialStore {
    FileCredentialStore::new(config.credential_path(), &config.storage.store_secret)
}

fn build_session(
    config: &Config,
    api_key: Option<&str>,
    image_config: Option<ImageConfig>,
) -> anyhow::Result<SessionManager> {
    let client = GeminiClient::from_config(&config.api).context("building HTTP client")?;
    let mut generator = Generator::new(Arc::new(client), config.api.clone());
    if let Some(image_config) = image_config {
        generator = generator.with_image_config(image_config);
    }

    let credentials: Arc<dyn CredentialStore> = match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Arc::new(MemoryCredentialStore::with_key(key)),
        None => Arc::new(file_store(config)),
    };

    Ok(SessionManager::new(generator, credentials).with_max_seconds(config.timeline.max_seconds))
}

pub(crate) fn load_image(path: &Path) -> anyhow::Result<ImageRef> {
    let image = image::open(path)
        .with_context(|| format!("reading image {}", path.display()))?
        .to_rgba8();
    Ok(Arc::new(image))
}

async fn run_generate(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let image_config = (args.aspect_ratio.is_some() || args.image_size.is_some()).then(|| ImageConfig {
        aspect_ratio: args.aspect_ratio.clone(),
        image_size: args.image_size.clone(),
    });
    let session = build_session(config, args.api_key.as_deref(), image_config)?;

    for path in &args.images {
        if !session.snapshot().can_add_image() {
            eprintln!("Warning: only the first 4 images are used; skipping {}", path.display());
            continue;
        }
        session.add_input_image(load_image(path)?);
    }
    session.set_prompt_text(args.prompt.as_str());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message("Generating...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let status = session.submit().await;
    spinner.finish_and_clear();

    let snapshot = session.snapshot();
    if args.debug {
        if let Some(trace) = &snapshot.debug_info {
            eprintln!("{}", trace);
        }
    }

    match status {
        SubmitStatus::Completed => {}
        SubmitStatus::Failed => {
            anyhow::bail!(snapshot
                .error_message
                .clone()
                .unwrap_or_else(|| "generation failed".to_string()));
        }
        SubmitStatus::Busy => anyhow::bail!("another submission is already running"),
    }

    if let Some(text) = &snapshot.result_text {
        println!("{}", text);
    }

    if let Some(image) = &snapshot.result_image {
        if let Some(output) = &args.output {
            image
                .save(output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {}x{} image to {}", image.width(), image.height(), output.display());
        }
        if args.save {
            let mut notices = session.notifications();
            let exporter = Arc::new(PictureExporter::new(config.export_dir()));
            session.save_result_image(exporter).await;
            if let Ok(notice) = notices.try_recv() {
                println!("{}", notice);
            }
        }
    } else if args.output.is_some() || args.save {
        eprintln!("Warning: the response carried no image");
    }

    Ok(())
}

async fn run_timeline(config: &Config, args: TimelineArgs) -> anyhow::Result<()> {
    if args.looping && args.duration.is_none() {
        anyhow::bail!("--loop needs --duration to end");
    }

    let session = Arc::new(build_session(config, None, None)?);
    let max = session.max_seconds();

    let mut names = std::collections::BTreeMap::new();
    for (second, path) in &args.pins {
        if *second > max {
            return Err(BdrowError::index_out_of_bounds(*second as usize, max as usize + 1).into());
        }
        let image = load_image(path)?;
        session.update_state(|s| s.result_image = Some(image));
        session.add_image_to_timeline(Some(*second));
        names.insert(*second, path.display().to_string());
    }

    session.set_playback_speed(args.speed);
    if args.looping {
        session.toggle_loop();
    }
    session.set_time_position(args.from);
    session.set_playing(true);

    let mut rx = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = None;
        loop {
            let position = rx.borrow_and_update().playback.position;
            if last != Some(position) {
                let shown = bdrow::timeline::resolve(position, &names)
                    .map(String::as_str)
                    .unwrap_or("-");
                println!("{:>3}s  {}", position, shown);
                last = Some(position);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    let mut playback = player::spawn(Arc::clone(&session));
    if let Some(secs) = args.duration.filter(|s| s.is_finite() && *s > 0.0) {
        tokio::select! {
            finished = &mut playback => finished?,
            _ = tokio::time::sleep(Duration::from_secs_f32(secs)) => {
                session.set_playing(false);
                playback.await?;
            }
        }
    } else {
        playback.await?;
    }

    // Closing the channel lets the printer drain and exit.
    drop(session);
    printer.await?;
    Ok(())
}

fn run_key(config: &Config, action: KeyAction) -> anyhow::Result<()> {
    let store = file_store(config);
    match action {
        KeyAction::Set { key } => {
            store.save_api_key(&key)?;
            store.set_use_api_key(true)?;
            println!("API key saved to {}", store.path().display());
        }
        KeyAction::Show => match store.api_key()? {
            Some(key) => println!("{}", mask(&key)),
            None => println!("No API key stored"),
        },
        KeyAction::Clear => {
            store.clear_api_key()?;
            println!("API key cleared");
        }
        KeyAction::Use { enabled } => {
            store.set_use_api_key(enabled)?;
            println!("Use API key: {}", enabled);
        }
        KeyAction::Status => {
            let has_key = store.api_key()?.is_some();
            let enabled = store.use_api_key()?;
            println!("Key stored: {}", has_key);
            println!("Key enabled: {}", enabled);
            println!("Authenticated: {}", has_key && enabled);
        }
    }
    Ok(())
}

fn mask(key: &str) -> String {
    let prefix: String = key.chars().take(10).collect();
    format!("{}... ({} chars)", prefix, key.chars().count())
}
