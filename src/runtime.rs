use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{error, info, warn};

use crate::api::{ApiSharedState, RuntimeCommand};
use crate::board::PrayerBoard;
use crate::clock::{Clock, sleep_until, until_next_second};
use crate::display::{BoardSnapshot, render_text};
use crate::prayer::alert::AlertPlayer;
use crate::prayer::model::RawTimings;
use crate::provider::{FetchError, TimingSource};
use crate::settings::{MasjidSettings, save_settings};

pub const RETRY_DELAY_SECS: i64 = 5;

struct FetchReport {
    generation: u64,
    date: NaiveDate,
    result: Result<RawTimings, FetchError>,
}

pub struct RuntimeConfig {
    pub settings_path: PathBuf,
    pub render: bool,
}

/// Single control thread. Ticks, fetch completions and API commands are
/// handled one at a time; only the fetch itself runs on a worker thread.
pub struct Runtime {
    board: PrayerBoard,
    source: Arc<dyn TimingSource>,
    clock: Box<dyn Clock>,
    player: Box<dyn AlertPlayer>,
    api_state: Option<Arc<Mutex<ApiSharedState>>>,
    commands: Receiver<RuntimeCommand>,
    reports_tx: Sender<FetchReport>,
    reports_rx: Receiver<FetchReport>,
    generation: u64,
    in_flight: bool,
    retry_at: Option<NaiveDateTime>,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(
        settings: MasjidSettings,
        source: Arc<dyn TimingSource>,
        clock: Box<dyn Clock>,
        player: Box<dyn AlertPlayer>,
        commands: Receiver<RuntimeCommand>,
        api_state: Option<Arc<Mutex<ApiSharedState>>>,
        config: RuntimeConfig,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel();
        Self {
            board: PrayerBoard::new(settings),
            source,
            clock,
            player,
            api_state,
            commands,
            reports_tx,
            reports_rx,
            generation: 0,
            in_flight: false,
            retry_at: None,
            config,
        }
    }

    /// Runs the 1 Hz loop until the process is stopped or a step fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "starting prayer board with {} clock and timings from {}",
            self.clock.label(),
            self.source.label()
        );
        self.board.ensure_current_day(self.clock.now().date());
        self.request_fetch();

        loop {
            let snapshot = self.step()?;
            if self.config.render {
                print!("\x1b[2J\x1b[H{}", render_text(&snapshot));
            }
            sleep_until(Instant::now() + until_next_second(self.clock.now()));
        }
    }

    /// One pass of the control loop.
    pub fn step(&mut self) -> Result<BoardSnapshot> {
        self.drain_commands();
        self.drain_fetch_reports();

        let now = self.clock.now();
        if self.board.ensure_current_day(now.date()) {
            self.request_fetch();
        }
        if let Some(retry_at) = self.retry_at
            && now >= retry_at
            && !self.in_flight
        {
            self.retry_at = None;
            info!("retrying prayer timings fetch");
            self.request_fetch();
        }

        let snapshot = self.board.tick(now, self.player.as_mut());
        self.publish(&snapshot)?;
        Ok(snapshot)
    }

    /// Starts a fetch on a worker thread. Results from superseded fetches
    /// are dropped when they arrive.
    fn request_fetch(&mut self) {
        if !self.board.settings().location.is_configured() {
            warn!("location not configured, skipping fetch");
            self.retry_at = None;
            return;
        }
        self.generation += 1;
        self.in_flight = true;
        self.retry_at = None;
        self.board.fetch_started();

        let generation = self.generation;
        let date = self.clock.now().date();
        let location = self.board.settings().location.clone();
        let source = Arc::clone(&self.source);
        let reports = self.reports_tx.clone();
        info!("fetching prayer timings for {} on {date}", location.display());
        thread::spawn(move || {
            let result = source.fetch(&location, date);
            let _ = reports.send(FetchReport {
                generation,
                date,
                result,
            });
        });
    }

    fn drain_fetch_reports(&mut self) {
        while let Ok(report) = self.reports_rx.try_recv() {
            if report.generation != self.generation {
                continue;
            }
            self.in_flight = false;
            match report.result {
                Ok(raw) => {
                    info!("prayer timings loaded for {}", report.date);
                    let today = self.clock.now().date();
                    self.board.replace_timings(raw, today);
                }
                Err(err) => {
                    let retry_at = self.clock.now() + Duration::seconds(RETRY_DELAY_SECS);
                    warn!("prayer timings fetch failed: {err}; retrying in {RETRY_DELAY_SECS}s");
                    self.board.fetch_failed();
                    self.retry_at = Some(retry_at);
                }
            }
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply_command(command),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            }
        }
    }

    fn apply_command(&mut self, command: RuntimeCommand) {
        let today = self.clock.now().date();
        match command {
            RuntimeCommand::ReplaceSettings(settings) => {
                info!("settings replaced for {}", settings.location.display());
                self.board
                    .replace_settings(settings, today, self.player.as_mut());
                self.persist_settings();
                self.request_fetch();
            }
            RuntimeCommand::SetAlertEnabled(enabled) => {
                info!("azan alert {}", if enabled { "enabled" } else { "disabled" });
                self.board.set_alert_enabled(enabled, self.player.as_mut());
                self.persist_settings();
            }
        }
    }

    fn persist_settings(&self) {
        if let Err(err) = save_settings(&self.config.settings_path, self.board.settings()) {
            error!("failed to persist settings: {err:#}");
        }
    }

    fn publish(&self, snapshot: &BoardSnapshot) -> Result<()> {
        let Some(shared) = &self.api_state else {
            return Ok(());
        };
        let mut guard = shared
            .lock()
            .map_err(|_| anyhow!("failed to lock API state"))?;
        guard.snapshot = Some(snapshot.clone());
        guard.settings = self.board.settings().clone();
        Ok(())
    }
}

/// Fetches once and evaluates a single snapshot at `now`, without retries.
pub fn run_once(
    settings: MasjidSettings,
    source: &dyn TimingSource,
    now: NaiveDateTime,
    player: &mut dyn AlertPlayer,
) -> Result<BoardSnapshot> {
    let mut board = PrayerBoard::new(settings);
    board.ensure_current_day(now.date());
    if board.settings().location.is_configured() {
        let raw = source
            .fetch(&board.settings().location, now.date())
            .with_context(|| format!("failed to load prayer timings from {}", source.label()))?;
        board.replace_timings(raw, now.date());
    }
    Ok(board.tick(now, player))
}
