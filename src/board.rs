use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};

use crate::display::{BoardSnapshot, SnapshotInput, build_snapshot};
use crate::prayer::alert::{AlertPlayer, AlertTrigger};
use crate::prayer::model::RawTimings;
use crate::prayer::schedule::{DailySchedule, ScheduleError, build_schedule};
use crate::prayer::tracker::evaluate;
use crate::settings::MasjidSettings;

pub const STATUS_LOADING: &str = "Loading prayer times...";
pub const STATUS_RETRYING: &str = "Network Error. Retrying...";
pub const STATUS_UNCONFIGURED: &str = "Location not configured";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Failed,
    Unconfigured,
}

/// Owns the settings snapshot, the last fetched timings and the derived
/// schedule. Every change to either input rebuilds the schedule.
pub struct PrayerBoard {
    settings: MasjidSettings,
    raw: Option<RawTimings>,
    schedule: Option<DailySchedule>,
    trigger: AlertTrigger,
    fetch_status: FetchStatus,
    current_day: Option<NaiveDate>,
}

impl PrayerBoard {
    pub fn new(settings: MasjidSettings) -> Self {
        let fetch_status = if settings.location.is_configured() {
            FetchStatus::Idle
        } else {
            FetchStatus::Unconfigured
        };
        Self {
            trigger: AlertTrigger::new(settings.alert_enabled),
            settings,
            raw: None,
            schedule: None,
            fetch_status,
            current_day: None,
        }
    }

    pub fn settings(&self) -> &MasjidSettings {
        &self.settings
    }

    pub fn fetch_started(&mut self) {
        self.fetch_status = FetchStatus::Loading;
    }

    pub fn fetch_failed(&mut self) {
        self.fetch_status = FetchStatus::Failed;
    }

    /// Stores freshly fetched timings and rebuilds for `today`.
    pub fn replace_timings(&mut self, raw: RawTimings, today: NaiveDate) {
        self.raw = Some(raw);
        self.fetch_status = FetchStatus::Idle;
        self.rebuild(today);
    }

    /// Swaps in a new settings snapshot. The caller is expected to refetch
    /// when the location is configured.
    pub fn replace_settings(
        &mut self,
        settings: MasjidSettings,
        today: NaiveDate,
        player: &mut dyn AlertPlayer,
    ) {
        self.trigger.set_enabled(settings.alert_enabled, player);
        self.fetch_status = if settings.location.is_configured() {
            FetchStatus::Idle
        } else {
            FetchStatus::Unconfigured
        };
        self.settings = settings;
        self.rebuild(today);
    }

    pub fn set_alert_enabled(&mut self, enabled: bool, player: &mut dyn AlertPlayer) {
        self.settings.alert_enabled = enabled;
        self.trigger.set_enabled(enabled, player);
    }

    /// Returns true when the calendar day changed since the last call. The
    /// previous day's timings are rebuilt against the new date until a
    /// fresh fetch replaces them.
    pub fn ensure_current_day(&mut self, today: NaiveDate) -> bool {
        let previous = self.current_day.replace(today);
        match previous {
            Some(day) if day != today => {
                info!("day changed from {day} to {today}");
                self.rebuild(today);
                true
            }
            _ => false,
        }
    }

    pub fn status_text(&self) -> String {
        match self.fetch_status {
            FetchStatus::Unconfigured => STATUS_UNCONFIGURED.to_string(),
            FetchStatus::Failed => STATUS_RETRYING.to_string(),
            FetchStatus::Loading if self.schedule.is_none() => STATUS_LOADING.to_string(),
            FetchStatus::Loading | FetchStatus::Idle => self.settings.location.display(),
        }
    }

    /// One 1 Hz step: evaluates tracking, feeds the alert trigger, and
    /// returns what to present. Tracking is skipped while no schedule exists.
    pub fn tick(&mut self, now: NaiveDateTime, player: &mut dyn AlertPlayer) -> BoardSnapshot {
        let tracking = self.schedule.as_ref().map(|schedule| evaluate(schedule, now));
        if let Some(tracking) = tracking.as_ref() {
            self.trigger.observe(tracking, now, player);
        }

        build_snapshot(SnapshotInput {
            now,
            schedule: self.schedule.as_ref(),
            tracking: tracking.as_ref(),
            status: self.status_text(),
            announcement: &self.settings.announcement,
            alert_enabled: self.trigger.is_enabled(),
            alert_playing: player.is_playing(),
        })
    }

    /// The trigger forgets its previous target, which may not exist in the
    /// new schedule.
    fn rebuild(&mut self, today: NaiveDate) {
        self.current_day = Some(today);
        self.trigger.reset();
        match build_schedule(
            self.raw.as_ref(),
            &self.settings.adjustments,
            &self.settings.iqamah,
            today,
        ) {
            Ok(schedule) => {
                if schedule.is_friday() {
                    debug!("schedule rebuilt for {} with Jumuah", schedule.date());
                } else {
                    debug!("schedule rebuilt for {}", schedule.date());
                }
                self.schedule = Some(schedule);
            }
            Err(ScheduleError::MissingTimings) => {
                debug!("no timings loaded yet for {today}");
                self.schedule = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::prayer::alert::tests::RecordingPlayer;
    use crate::prayer::model::PrayerName;
    use crate::prayer::schedule::tests::{friday, sample_timings, thursday};
    use crate::prayer::tracker::AlertLevel;

    fn at(date: NaiveDate, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(hour, minute, second).expect("time"))
    }

    fn at_ms(date: NaiveDate, hour: u32, minute: u32, second: u32, ms: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_milli_opt(hour, minute, second, ms).expect("time"))
    }

    #[test]
    fn tick_without_timings_is_not_ready() {
        let mut board = PrayerBoard::new(MasjidSettings::default());
        let mut player = RecordingPlayer::default();
        board.fetch_started();

        let snapshot = board.tick(at(thursday(), 9, 0, 0), &mut player);
        assert!(!snapshot.ready);
        assert_eq!(snapshot.status, STATUS_LOADING);
    }

    #[test]
    fn timings_produce_a_countdown_and_location_status() {
        let mut board = PrayerBoard::new(MasjidSettings::default());
        let mut player = RecordingPlayer::default();
        board.fetch_started();
        board.replace_timings(sample_timings(), thursday());

        let snapshot = board.tick(at(thursday(), 12, 35, 0), &mut player);
        let tracking = snapshot.tracking.expect("tracking");
        assert_eq!(tracking.label, "Dhuhr Iqamah");
        assert_eq!(tracking.countdown, "00:10:00");
        assert_eq!(tracking.alert_level, AlertLevel::None);
        assert_eq!(snapshot.status, "Kalpetta, India");
    }

    #[test]
    fn failed_fetch_keeps_previous_schedule_and_reports_retry() {
        let mut board = PrayerBoard::new(MasjidSettings::default());
        let mut player = RecordingPlayer::default();
        board.replace_timings(sample_timings(), thursday());
        board.fetch_started();
        board.fetch_failed();

        let snapshot = board.tick(at(thursday(), 12, 35, 0), &mut player);
        assert!(snapshot.ready);
        assert_eq!(snapshot.status, STATUS_RETRYING);
    }

    #[test]
    fn day_change_rebuilds_previous_timings_for_the_new_date() {
        let mut board = PrayerBoard::new(MasjidSettings::default());
        assert!(!board.ensure_current_day(thursday()));
        board.replace_timings(sample_timings(), thursday());
        assert!(!board.ensure_current_day(thursday()));

        assert!(board.ensure_current_day(friday()));
        let schedule = board.schedule.as_ref().expect("schedule");
        assert_eq!(schedule.date(), friday());
        let dhuhr = schedule.entry(PrayerName::Dhuhr).expect("dhuhr");
        assert_eq!(dhuhr.display_name, "Jumuah");
    }

    #[test]
    fn replacing_settings_rebuilds_and_updates_alerting() {
        let mut board = PrayerBoard::new(MasjidSettings::default());
        let mut player = RecordingPlayer::default();
        board.replace_timings(sample_timings(), thursday());

        let mut settings = MasjidSettings::default();
        settings.adjustments.set(PrayerName::Asr, 5);
        settings.alert_enabled = true;
        board.replace_settings(settings, thursday(), &mut player);

        let asr = board
            .schedule
            .as_ref()
            .and_then(|schedule| schedule.entry(PrayerName::Asr))
            .expect("asr");
        assert_eq!(asr.azan.to_string(), "15:50");
        assert_eq!(asr.iqamah.map(|t| t.to_string()).as_deref(), Some("16:05"));

        board.tick(at(thursday(), 15, 49, 59), &mut player);
        board.tick(at(thursday(), 15, 50, 0), &mut player);
        assert_eq!(player.starts, 1);

        board.set_alert_enabled(false, &mut player);
        assert!(!player.playing);
        assert!(!board.settings().alert_enabled);
    }

    #[test]
    fn moved_azan_does_not_fire_at_its_old_time() {
        let mut settings = MasjidSettings::default();
        settings.alert_enabled = true;
        let mut board = PrayerBoard::new(settings.clone());
        let mut player = RecordingPlayer::default();
        board.replace_timings(sample_timings(), thursday());
        board.tick(at(thursday(), 15, 44, 58), &mut player);

        settings.adjustments.set(PrayerName::Asr, 5);
        board.replace_settings(settings, thursday(), &mut player);
        board.tick(at_ms(thursday(), 15, 45, 0, 500), &mut player);
        assert_eq!(player.starts, 0);

        board.tick(at_ms(thursday(), 15, 49, 59, 500), &mut player);
        assert_eq!(player.starts, 1);
    }

    #[test]
    fn extreme_adjustments_from_settings_do_not_break_the_schedule() {
        let settings = crate::settings::parse_settings_text(
            r#"{ "adjustments": { "Fajr": 9223372036854775807, "Asr": -9223372036854775807 } }"#,
        );
        let mut board = PrayerBoard::new(settings);
        let mut player = RecordingPlayer::default();
        board.replace_timings(sample_timings(), thursday());

        let snapshot = board.tick(at(thursday(), 4, 0, 0), &mut player);
        let tracking = snapshot.tracking.expect("tracking");
        assert_eq!(tracking.label, "Fajr");
        assert_eq!(tracking.countdown, "01:00:00");
    }

    #[test]
    fn blank_location_reports_unconfigured() {
        let mut settings = MasjidSettings::default();
        settings.location.city = " ".to_string();
        let mut board = PrayerBoard::new(settings);
        let mut player = RecordingPlayer::default();
        assert_eq!(board.fetch_status, FetchStatus::Unconfigured);
        let snapshot = board.tick(at(thursday(), 8, 0, 0), &mut player);
        assert_eq!(snapshot.status, STATUS_UNCONFIGURED);
    }
}
