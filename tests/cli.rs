use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn provider_payload() -> &'static str {
    r#"
{
  "code": 200,
  "status": "OK",
  "data": {
    "timings": {
      "Fajr": "05:00 (IST)",
      "Sunrise": "06:14 (IST)",
      "Dhuhr": "12:30 (IST)",
      "Asr": "15:45 (IST)",
      "Maghrib": "18:20 (IST)",
      "Isha": "19:45 (IST)"
    },
    "date": {
      "hijri": { "day": "17", "month": { "en": "Shaban" }, "year": "1447" }
    }
  }
}
"#
}

#[test]
fn once_prints_iqamah_countdown_from_timings_file() {
    let dir = tempdir().expect("tempdir");
    let timings = dir.path().join("timings.json");
    fs::write(&timings, provider_payload()).expect("write timings");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(dir.path().join("masjid.json"))
        .arg("--timings")
        .arg(&timings)
        .arg("--at")
        .arg("2026-02-05T12:35:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Next: Dhuhr Iqamah in 00:10:00"))
        .stdout(predicate::str::contains("Kalpetta, India"))
        .stdout(predicate::str::contains("17 Shaban 1447"))
        .stdout(predicate::str::contains("Ishraq"));
}

#[test]
fn friday_shows_jumuah_in_place_of_dhuhr() {
    let dir = tempdir().expect("tempdir");
    let timings = dir.path().join("timings.json");
    fs::write(&timings, provider_payload()).expect("write timings");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(dir.path().join("masjid.json"))
        .arg("--timings")
        .arg(&timings)
        .arg("--at")
        .arg("2026-02-06T12:20:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Next: Jumuah in 00:10:00"))
        .stdout(predicate::str::contains("> Jumuah"));
}

#[test]
fn settings_file_adjusts_schedule() {
    let dir = tempdir().expect("tempdir");
    let timings = dir.path().join("timings.json");
    fs::write(&timings, provider_payload()).expect("write timings");
    let settings = dir.path().join("masjid.json");
    fs::write(
        &settings,
        r#"{ "version": 1, "city": "Leeds", "country": "UK",
             "adjustments": { "Maghrib": 2 },
             "iqamah": { "Maghrib": "+5", "Isha": "20:15" } }"#,
    )
    .expect("write settings");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(&settings)
        .arg("--timings")
        .arg(&timings)
        .arg("--at")
        .arg("2026-02-05T18:23:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Leeds, UK"))
        .stdout(predicate::str::contains("Next: Maghrib Iqamah in 00:04:00 [warning]"))
        .stdout(predicate::str::contains("8:15 PM"));
}

#[test]
fn malformed_settings_fall_back_to_defaults() {
    let dir = tempdir().expect("tempdir");
    let timings = dir.path().join("timings.json");
    fs::write(&timings, provider_payload()).expect("write timings");
    let settings = dir.path().join("masjid.json");
    fs::write(&settings, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(&settings)
        .arg("--timings")
        .arg(&timings)
        .arg("--at")
        .arg("2026-02-05T21:00:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Next: Fajr in 08:00:00"))
        .stderr(predicate::str::contains("invalid settings JSON"));
}

#[test]
fn missing_timings_file_fails() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(dir.path().join("masjid.json"))
        .arg("--timings")
        .arg(dir.path().join("absent.json"))
        .arg("--at")
        .arg("2026-02-05T12:00:00")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load prayer timings"));
}

#[test]
fn incomplete_timings_fail_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let timings = dir.path().join("timings.json");
    fs::write(&timings, r#"{ "code": 200, "data": { "timings": { "Fajr": "05:00" } } }"#)
        .expect("write timings");

    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--settings")
        .arg(dir.path().join("masjid.json"))
        .arg("--timings")
        .arg(&timings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed timing payload"));
}

#[test]
fn invalid_at_value_is_rejected() {
    let mut cmd = cargo_bin_cmd!("azanboard");
    cmd.arg("--once")
        .arg("--at")
        .arg("tomorrow")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid local datetime"));
}
