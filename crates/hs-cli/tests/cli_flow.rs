//! End-to-end tests driving the `hs` binary.
//!
//! Covers the main flow: roster setup → booking → conflict → calendar → report → export.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn hs_binary() -> String {
    env!("CARGO_BIN_EXE_hs").to_string()
}

/// Runs `hs` with its config and data isolated under `home`.
fn hs(home: &Path, args: &[&str]) -> Output {
    Command::new(hs_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("HS_DATABASE_PATH", home.join("hs.db"))
        .env_remove("HS_EDIT_LOCK_HOURS")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run hs")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "hs should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// The ID printed in parentheses at the end of an "Added ..." line.
fn added_id(stdout: &str) -> String {
    let start = stdout.rfind('(').unwrap() + 1;
    let end = stdout.rfind(')').unwrap();
    stdout[start..end].to_string()
}

struct Roster {
    resident: String,
    worker: String,
}

fn setup_roster(home: &Path) -> Roster {
    let property = added_id(&stdout_of(&hs(
        home,
        &["property", "add", "--name", "Elm House", "--capacity", "4"],
    )));
    let resident = added_id(&stdout_of(&hs(
        home,
        &[
            "resident",
            "add",
            "--name",
            "Alex",
            "--property",
            &property,
            "--hours",
            "10",
            "--start-date",
            "2024-01-01",
        ],
    )));
    let worker = added_id(&stdout_of(&hs(
        home,
        &[
            "worker",
            "add",
            "--name",
            "Sam",
            "--weekly-hours",
            "37.5",
            "--monthly-hours",
            "150",
            "--specialization",
            "medication",
        ],
    )));
    Roster { resident, worker }
}

fn book(home: &Path, roster: &Roster, start: &str, end: &str, status: &str) -> Output {
    hs(
        home,
        &[
            "session",
            "add",
            "--resident",
            &roster.resident,
            "--worker",
            &roster.worker,
            "--type",
            "personal_care",
            "--date",
            "2024-03-05",
            "--start",
            start,
            "--end",
            end,
            "--status",
            status,
        ],
    )
}

#[test]
fn test_no_command_prints_help() {
    let temp = TempDir::new().unwrap();
    let output = stdout_of(&hs(temp.path(), &[]));
    assert!(output.contains("Usage: hs"));
}

#[test]
fn test_booking_conflict_and_reports() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();
    let roster = setup_roster(home);

    let booked = stdout_of(&book(home, &roster, "09:00", "10:30", "completed"));
    assert!(booked.starts_with("Booked session "));
    let session_id = booked.split_whitespace().nth(2).unwrap().to_string();

    // Overlaps 09:00–10:30 by half an hour.
    let conflict = book(home, &roster, "10:00", "11:00", "planned");
    assert!(!conflict.status.success());
    let stderr = String::from_utf8_lossy(&conflict.stderr);
    assert!(stderr.contains("worker already scheduled"), "{stderr}");
    assert!(stderr.contains(&session_id), "{stderr}");

    // Back-to-back is fine.
    stdout_of(&book(home, &roster, "10:30", "11:00", "planned"));

    let calendar = stdout_of(&hs(home, &["calendar", "--year", "2024", "--month", "3"]));
    assert!(calendar.starts_with("March 2024\n"));
    assert!(calendar.contains(" 5 (2)"));

    let day = stdout_of(&hs(
        home,
        &["calendar", "--view", "daily", "--date", "2024-03-05"],
    ));
    assert!(day.contains("09:00–10:30  Alex with Sam"));

    let report = stdout_of(&hs(home, &["report", "--year", "2024", "--month", "3", "--json"]));
    let summary: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(summary["totals"]["used_hours"], 1.5);
    assert_eq!(summary["totals"]["sessions"]["total"], 2);
    assert_eq!(summary["residents"][0]["resident_name"], "Alex");

    let exported = stdout_of(&hs(
        home,
        &[
            "export",
            "--year",
            "2024",
            "--month",
            "3",
            "--out-dir",
            home.to_str().unwrap(),
        ],
    ));
    assert!(exported.starts_with("Wrote "));
    let csv = std::fs::read_to_string(home.join("monthly-summary-2024-03.csv")).unwrap();
    assert_eq!(
        csv,
        "\"Resident\",\"Property\",\"Allocated Hours\",\"Hours Used\",\
         \"Utilization %\",\"Remaining Hours\"\n\
         \"Alex\",\"Elm House\",\"10.0\",\"1.5\",\"15.0\",\"8.5\"\n"
    );
}

#[test]
fn test_session_lifecycle() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();
    let roster = setup_roster(home);

    let booked = stdout_of(&book(home, &roster, "14:00", "15:00", "planned"));
    let session_id = booked.split_whitespace().nth(2).unwrap().to_string();

    stdout_of(&hs(home, &["session", "status", &session_id, "no_show"]));
    let shown = stdout_of(&hs(home, &["session", "show", &session_id, "--json"]));
    let session: serde_json::Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(session["status"], "no_show");

    let listed = stdout_of(&hs(
        home,
        &["session", "list", "--from", "2024-03-01", "--to", "2024-03-31"],
    ));
    assert!(listed.contains("14:00–15:00"));

    stdout_of(&hs(home, &["session", "delete", &session_id]));
    let listed = stdout_of(&hs(home, &["session", "list", "--from", "2024-03-05"]));
    assert_eq!(listed, "No sessions found.\n");
}
