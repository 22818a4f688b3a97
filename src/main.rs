use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod app;
mod config;
mod exchange;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use config::Config;
use exchange::AnswerClient;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "dandar")]
#[command(version, about = "Chat with a local answering service from the terminal")]
struct Cli {
    /// Answering service URL (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Seconds to wait for an answer before showing a connection error
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write the effective settings back to the config file before starting
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Command-line flags layered over the file settings.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let config = cli.apply(Config::load_from(&config_path)?);

    if cli.save_config {
        config.save_to(&config_path)?;
    }

    let _log_guard = logging::init(config.log_level.as_deref(), cli.log_dir.as_deref())?;
    tracing::info!(endpoint = %config.endpoint, timeout_secs = ?config.timeout_secs, "starting chat");

    let client = match config.timeout() {
        Some(timeout) => AnswerClient::with_timeout(&config.endpoint, timeout)?,
        None => AnswerClient::new(&config.endpoint),
    };
    let mut app = App::new(client);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app).await;

    tui::restore()?;
    if let Err(err) = &result {
        tracing::error!(error = %err, "chat loop failed");
    }
    result
}

async fn run(terminal: &mut Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();
    let sender = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, &sender),
            None => break,
        }
    }

    Ok(())
}
