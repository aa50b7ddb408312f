use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use log::{info, warn};

use crate::prayer::tracker::{Tracking, TrackingState};

/// Countdown window, in milliseconds, in which an awaited Azan fires early.
pub const FIRE_WINDOW_MS: i64 = 1_000;
pub const DEFAULT_LATE_TOLERANCE_MS: i64 = 60_000;

/// Something that can sound the Azan alert.
pub trait AlertPlayer: Send {
    fn start(&mut self) -> Result<()>;
    /// Stops playback and rewinds to the beginning.
    fn stop(&mut self);
    fn is_playing(&mut self) -> bool;
}

/// Rings the terminal bell and reports itself as playing for a fixed duration.
pub struct BellPlayer {
    ring_duration: Duration,
    started_at: Option<Instant>,
}

impl BellPlayer {
    pub fn new(ring_duration_ms: u64) -> Self {
        Self {
            ring_duration: Duration::from_millis(ring_duration_ms.max(1)),
            started_at: None,
        }
    }
}

impl AlertPlayer for BellPlayer {
    fn start(&mut self) -> Result<()> {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(b"\x07")
            .and_then(|_| stdout.flush())
            .context("failed to ring terminal bell")?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.started_at = None;
    }

    fn is_playing(&mut self) -> bool {
        match self.started_at {
            Some(started) if started.elapsed() < self.ring_duration => true,
            Some(_) => {
                self.started_at = None;
                false
            }
            None => false,
        }
    }
}

/// Runs an external command (for example an audio player) as the alert.
/// Stopping kills the child, so the next start plays from the beginning.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandPlayer {
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("alert command must not be empty");
        };
        Ok(Self {
            program,
            args: parts.collect(),
            child: None,
        })
    }
}

impl AlertPlayer for CommandPlayer {
    fn start(&mut self) -> Result<()> {
        self.stop();
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start alert command '{}'", self.program))?;
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn is_playing(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.child = None;
                false
            }
        }
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    state: TrackingState,
    target: NaiveDateTime,
}

/// Fires the alert once per awaited Azan instant.
///
/// A tick fires when the awaited Azan is less than a second away, or when the
/// Azan awaited on the previous tick has been passed since then. The second
/// rule covers ticks that arrive late and skip the one-second window.
pub struct AlertTrigger {
    enabled: bool,
    late_tolerance: chrono::Duration,
    previous: Option<Observation>,
    fired_for: Option<NaiveDateTime>,
}

impl AlertTrigger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            late_tolerance: chrono::Duration::milliseconds(DEFAULT_LATE_TOLERANCE_MS),
            previous: None,
            fired_for: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling stops any alert that is currently sounding.
    pub fn set_enabled(&mut self, enabled: bool, player: &mut dyn AlertPlayer) {
        self.enabled = enabled;
        if !enabled {
            if player.is_playing() {
                info!("alerting disabled, stopping alert in progress");
            }
            player.stop();
        }
    }

    /// Observes one tick. Returns whether the alert was started.
    pub fn observe(
        &mut self,
        tracking: &Tracking,
        now: NaiveDateTime,
        player: &mut dyn AlertPlayer,
    ) -> bool {
        let due = self.due_target(tracking, now);
        self.previous = Some(Observation {
            state: tracking.state,
            target: tracking.target,
        });

        let Some(target) = due else {
            return false;
        };
        if self.fired_for == Some(target) {
            return false;
        }
        self.fired_for = Some(target);

        if !self.enabled || player.is_playing() {
            return false;
        }
        match player.start() {
            Ok(()) => {
                info!("azan alert started for {target}");
                true
            }
            Err(err) => {
                warn!("azan alert could not start: {err:#}");
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn due_target(&self, tracking: &Tracking, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if tracking.state.is_awaiting_azan() {
            let remaining_ms = tracking.remaining().num_milliseconds();
            if remaining_ms > 0 && remaining_ms <= FIRE_WINDOW_MS {
                return Some(tracking.target);
            }
        }

        let previous = self.previous?;
        let crossed = previous.state.is_awaiting_azan()
            && now >= previous.target
            && now - previous.target <= self.late_tolerance;
        crossed.then_some(previous.target)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::prayer::model::{Adjustments, IqamahSettings};
    use crate::prayer::schedule::tests::{sample_timings, thursday};
    use crate::prayer::schedule::{DailySchedule, build_schedule};
    use crate::prayer::tracker::evaluate;

    #[derive(Default)]
    pub(crate) struct RecordingPlayer {
        pub starts: usize,
        pub stops: usize,
        pub playing: bool,
    }

    impl AlertPlayer for RecordingPlayer {
        fn start(&mut self) -> Result<()> {
            self.starts += 1;
            self.playing = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.stops += 1;
            self.playing = false;
        }

        fn is_playing(&mut self) -> bool {
            self.playing
        }
    }

    fn schedule() -> DailySchedule {
        build_schedule(
            Some(&sample_timings()),
            &Adjustments::default(),
            &IqamahSettings::default(),
            thursday(),
        )
        .expect("schedule")
    }

    fn at_ms(date: NaiveDate, hour: u32, minute: u32, second: u32, milli: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_milli_opt(hour, minute, second, milli).expect("time"))
    }

    fn run_ticks(
        trigger: &mut AlertTrigger,
        player: &mut RecordingPlayer,
        ticks: &[NaiveDateTime],
    ) -> usize {
        let schedule = schedule();
        ticks
            .iter()
            .filter(|now| {
                let tracking = evaluate(&schedule, **now);
                trigger.observe(&tracking, **now, player)
            })
            .count()
    }

    #[test]
    fn fires_once_inside_final_second() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        let fired = run_ticks(
            &mut trigger,
            &mut player,
            &[
                at_ms(day, 12, 29, 58, 400),
                at_ms(day, 12, 29, 59, 400),
                at_ms(day, 12, 30, 0, 400),
                at_ms(day, 12, 30, 1, 400),
            ],
        );
        assert_eq!(fired, 1);
        assert_eq!(player.starts, 1);
    }

    #[test]
    fn fires_on_crossing_when_a_tick_is_late() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        let fired = run_ticks(
            &mut trigger,
            &mut player,
            &[at_ms(day, 12, 29, 57, 0), at_ms(day, 12, 30, 2, 500)],
        );
        assert_eq!(fired, 1);
    }

    #[test]
    fn does_not_fire_for_iqamah_targets() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        let fired = run_ticks(
            &mut trigger,
            &mut player,
            &[
                at_ms(day, 12, 44, 58, 500),
                at_ms(day, 12, 44, 59, 500),
                at_ms(day, 12, 45, 0, 500),
            ],
        );
        assert_eq!(fired, 0);
    }

    #[test]
    fn does_not_fire_when_starting_after_the_instant() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        let fired = run_ticks(&mut trigger, &mut player, &[at_ms(day, 12, 30, 0, 500)]);
        assert_eq!(fired, 0);
    }

    #[test]
    fn skips_instants_missed_beyond_tolerance() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        let fired = run_ticks(
            &mut trigger,
            &mut player,
            &[at_ms(day, 12, 0, 0, 0), at_ms(day, 12, 40, 0, 0)],
        );
        assert_eq!(fired, 0);
    }

    #[test]
    fn disabled_or_busy_player_suppresses_the_alert() {
        let day = thursday();
        let ticks = [at_ms(day, 15, 44, 59, 200), at_ms(day, 15, 45, 0, 200)];

        let mut disabled = AlertTrigger::new(false);
        let mut player = RecordingPlayer::default();
        assert_eq!(run_ticks(&mut disabled, &mut player, &ticks), 0);

        let mut busy = AlertTrigger::new(true);
        let mut player = RecordingPlayer {
            playing: true,
            ..RecordingPlayer::default()
        };
        assert_eq!(run_ticks(&mut busy, &mut player, &ticks), 0);
        assert_eq!(player.starts, 0);
    }

    #[test]
    fn disabling_stops_playback_immediately() {
        let mut trigger = AlertTrigger::new(true);
        let mut player = RecordingPlayer::default();
        let day = thursday();
        run_ticks(&mut trigger, &mut player, &[at_ms(day, 18, 19, 59, 500)]);
        assert!(player.playing);

        trigger.set_enabled(false, &mut player);
        assert!(!player.playing);
        assert_eq!(player.stops, 1);
        assert!(!trigger.is_enabled());
    }

    #[test]
    fn bell_player_stops_on_request() {
        let mut player = BellPlayer::new(60_000);
        player.started_at = Some(Instant::now());
        assert!(player.is_playing());
        player.stop();
        assert!(!player.is_playing());
    }

    #[cfg(unix)]
    #[test]
    fn command_player_kills_child_on_stop() {
        let mut player = CommandPlayer::from_command_line("sleep 30").expect("command");
        player.start().expect("spawn sleep");
        assert!(player.is_playing());
        player.stop();
        assert!(!player.is_playing());
    }

    #[test]
    fn empty_alert_command_is_rejected() {
        assert!(CommandPlayer::from_command_line("   ").is_err());
    }
}
