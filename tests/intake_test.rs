mod helpers;

use helpers::{log_source, open_dual, pool_source, write_log, StubProvider};
use mnemo::config::MnemoConfig;
use mnemo::memory::intake::{intake_process, intake_status};
use mnemo::memory::rollover::SourceState;

fn write_doc(dir: &std::path::Path, name: &str, text: &str) {
    std::fs::write(dir.join(name), text).unwrap();
}

#[test]
fn sweep_archives_pool_docs_and_rolls_logs() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.jsonl");
    write_log(&log, 30);
    let pool = dir.path().join("pool");
    std::fs::create_dir_all(&pool).unwrap();
    write_doc(&pool, "vacuum.md", "notes on sqlite incremental vacuum");
    write_doc(&pool, "channels.md", "notes on bounded channel backpressure");

    let config = MnemoConfig {
        sources: vec![log_source(&log, 20, 15), pool_source(&pool, 10)],
        ..Default::default()
    };
    let mut dual = open_dual(dir.path());

    let report = intake_process(&config, &mut dual, &StubProvider).unwrap();
    assert!(report.all_ok());
    assert_eq!(report.sources.len(), 2);

    let log_report = &report.sources[0];
    assert_eq!(log_report.processed, 15); // 30 lines, keep 15
    let pool_report = &report.sources[1];
    assert_eq!(pool_report.processed, 2);

    assert_eq!(dual.local.count("session_log").unwrap(), 15);
    assert_eq!(dual.local.count("pool_docs").unwrap(), 2);
}

#[test]
fn double_sweep_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pool = dir.path().join("pool");
    std::fs::create_dir_all(&pool).unwrap();
    write_doc(&pool, "vacuum.md", "notes on sqlite incremental vacuum");

    let config = MnemoConfig {
        sources: vec![pool_source(&pool, 10)],
        ..Default::default()
    };
    let mut dual = open_dual(dir.path());

    intake_process(&config, &mut dual, &StubProvider).unwrap();
    let second = intake_process(&config, &mut dual, &StubProvider).unwrap();

    assert_eq!(second.sources[0].processed, 0);
    assert_eq!(second.sources[0].skipped, 1);
    assert_eq!(dual.local.count("pool_docs").unwrap(), 1);
}

#[test]
fn status_reflects_limits_and_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.jsonl");
    write_log(&log, 30);

    let config = MnemoConfig {
        sources: vec![log_source(&log, 20, 15)],
        ..Default::default()
    };
    let dual = open_dual(dir.path());

    let status = intake_status(&config, &dual.local).unwrap();
    assert_eq!(status.sources[0].current_size, 30);
    assert_eq!(status.sources[0].state, SourceState::OverLimit);
    assert_eq!(status.sources[0].unprocessed, 15);

    // Status is read-only: the log is untouched.
    assert_eq!(
        std::fs::read_to_string(&log).unwrap().lines().count(),
        30
    );
}

#[test]
fn json_pool_docs_flow_through_the_normalizer() {
    let dir = tempfile::tempdir().unwrap();
    let pool = dir.path().join("pool");
    std::fs::create_dir_all(&pool).unwrap();
    // Legacy field names: "content" instead of "text", "timestamp" instead
    // of "created_at".
    write_doc(
        &pool,
        "legacy.json",
        r#"{"content": "a doc using legacy field names", "timestamp": "2026-01-10T00:00:00Z", "author": "kw"}"#,
    );

    let config = MnemoConfig {
        sources: vec![pool_source(&pool, 10)],
        ..Default::default()
    };
    let mut dual = open_dual(dir.path());

    let report = intake_process(&config, &mut dual, &StubProvider).unwrap();
    assert!(report.all_ok());

    let records = dual.local.list("pool_docs").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "a doc using legacy field names");
    // Unmapped leftover fields ride along as metadata.
    assert_eq!(
        records[0]
            .metadata
            .as_ref()
            .and_then(|m| m.get("author"))
            .and_then(|v| v.as_str()),
        Some("kw")
    );
}
