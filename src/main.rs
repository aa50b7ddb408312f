mod api;
mod board;
mod clock;
mod display;
mod prayer;
mod provider;
mod runtime;
mod settings;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use crate::api::{ApiServer, ApiServerConfig, ApiSharedState};
use crate::clock::{Clock, FixedClock, SystemClock, parse_local_datetime};
use crate::display::render_text;
use crate::prayer::alert::{AlertPlayer, BellPlayer, CommandPlayer};
use crate::provider::{AladhanSource, DEFAULT_PROVIDER_URL, FileSource, TimingSource};
use crate::runtime::{Runtime, RuntimeConfig, run_once};
use crate::settings::load_settings;

#[derive(Parser, Debug)]
#[command(
    name = "azanboard",
    version,
    about = "Masjid prayer board with Azan/Iqamah countdowns and alerts"
)]
struct Cli {
    #[arg(long, default_value = "masjid.json")]
    settings: PathBuf,

    /// Read timings from a local JSON file instead of the remote provider.
    #[arg(long)]
    timings: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_PROVIDER_URL)]
    provider_url: String,

    /// Print one snapshot and exit.
    #[arg(long)]
    once: bool,

    /// Evaluate at a fixed local instant (YYYY-MM-DDTHH:MM[:SS]).
    #[arg(long)]
    at: Option<String>,

    #[arg(long, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    #[arg(long)]
    no_api: bool,

    /// Command run as the audible alert, e.g. "mpv azan.mp3".
    #[arg(long)]
    alert_command: Option<String>,

    #[arg(long, default_value_t = 5_000)]
    ring_duration_ms: u64,

    #[arg(long)]
    quiet: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.ring_duration_ms == 0 {
        bail!("--ring-duration-ms must be greater than zero");
    }

    let clock: Box<dyn Clock> = match cli.at.as_deref() {
        Some(at) => Box::new(FixedClock(parse_local_datetime(at)?)),
        None => Box::new(SystemClock),
    };
    let settings = load_settings(&cli.settings)
        .with_context(|| format!("failed to load {}", cli.settings.display()))?;
    let source: Arc<dyn TimingSource> = match cli.timings {
        Some(path) => Arc::new(FileSource::new(path)),
        None => Arc::new(
            AladhanSource::new(cli.provider_url.clone())
                .context("failed to build timing provider client")?,
        ),
    };
    let mut player: Box<dyn AlertPlayer> = match cli.alert_command.as_deref() {
        Some(command) => Box::new(CommandPlayer::from_command_line(command)?),
        None => Box::new(BellPlayer::new(cli.ring_duration_ms)),
    };

    if cli.once {
        let snapshot = run_once(settings, source.as_ref(), clock.now(), player.as_mut())?;
        print!("{}", render_text(&snapshot));
        return Ok(());
    }

    let (commands_tx, commands_rx) = mpsc::channel();
    let api_server = if cli.no_api {
        None
    } else {
        Some(
            ApiServer::start(
                ApiServerConfig {
                    bind_addr: cli.api_bind.clone(),
                    port: cli.api_port,
                },
                settings.clone(),
                commands_tx,
            )
            .with_context(|| {
                format!(
                    "failed to start local API at {}:{}",
                    cli.api_bind, cli.api_port
                )
            })?,
        )
    };
    let api_state: Option<Arc<Mutex<ApiSharedState>>> =
        api_server.as_ref().map(|server| Arc::clone(&server.state));

    let mut runtime = Runtime::new(
        settings,
        source,
        clock,
        player,
        commands_rx,
        api_state,
        RuntimeConfig {
            settings_path: cli.settings,
            render: !cli.quiet,
        },
    );
    let result = runtime.run();

    info!("shutting down");
    drop(api_server);
    result
}
