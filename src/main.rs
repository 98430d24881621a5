use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dialogue_tui::app::App;
use dialogue_tui::tui::{self, EventHandler, EventScheduler};
use dialogue_tui::{handler, ui, ChatBackend, Config, HttpBackend};

const DEFAULT_LOG_FILTER: &str = "dialogue_tui=info,dialogue=info";

#[derive(Parser)]
#[command(name = "dialogue")]
#[command(version, about = "Terminal chat client for a local DialoGPT backend")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(short, long, env = "DIALOGUE_URL")]
    url: Option<String>,

    /// Path to the config file
    #[arg(short, long, env = "DIALOGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory exported conversations are written to
    #[arg(long)]
    export_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the backend status once and exit
    Status,
    /// Send a single message and print the reply
    Ask {
        /// Your message
        message: String,
    },
    /// Write the default config file and print its path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(dir) = cli.export_dir {
        config.export_dir = Some(dir);
    }

    match cli.command {
        None => {
            init_file_logging()?;
            run_tui(config).await
        }
        Some(command) => {
            init_stderr_logging();
            match command {
                Commands::Status => print_status(&config).await,
                Commands::Ask { message } => ask(&config, &message).await,
                Commands::InitConfig => init_config(&config, cli.config),
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// The TUI owns the terminal, so logs go to a file.
fn init_file_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dialogue");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("dialogue.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn backend_for(config: &Config) -> Result<HttpBackend> {
    HttpBackend::new(&config.base_url, config.request_timeout())
}

async fn run_tui(config: Config) -> Result<()> {
    let backend = Arc::new(backend_for(&config)?);
    tracing::info!(url = backend.base_url(), "starting chat client");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let scheduler = Arc::new(EventScheduler::new(events.sender()));
    let mut app = App::new(&config, backend, scheduler, events.sender());

    app.check_status();

    let result: Result<()> = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok(())
    }
    .await;

    tui::restore()?;
    tracing::info!("chat client stopped");
    result
}

async fn print_status(config: &Config) -> Result<()> {
    let backend = backend_for(config)?;
    let status = backend
        .status()
        .await
        .with_context(|| format!("could not reach {}", backend.base_url()))?;

    println!("Backend: {}", backend.base_url());
    if let Some(model) = &status.model_name {
        println!("Model:   {}", model);
    }
    if let Some(device) = &status.device_info {
        println!("Device:  {}", device.label());
    }
    if status.model_loaded {
        println!("Status:  model loaded");
    } else {
        let label = status.loading_status.as_deref().unwrap_or("Loading model...");
        println!("Status:  {}", label);
    }
    Ok(())
}

async fn ask(config: &Config, message: &str) -> Result<()> {
    let message = message.trim();
    if message.is_empty() {
        anyhow::bail!("message cannot be empty");
    }

    let backend = backend_for(config)?;
    match backend.chat(message).await {
        Ok(reply) => {
            println!("{}", reply.response);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.display_message());
            Err(err.into())
        }
    }
}

fn init_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => {
            config.save_to(&path)?;
            path
        }
        None => config.save()?,
    };
    println!("Wrote {}", path.display());
    Ok(())
}
