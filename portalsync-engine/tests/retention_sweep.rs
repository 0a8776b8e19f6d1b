mod support;

use rstest::rstest;
use serde_json::json;

use portalsync_core::RetentionTask;
use portalsync_engine::retention::{sweep, TaskSkip, TaskStatus};
use portalsync_engine::{RunLog, Severity};

use support::{at, now, remote, remote_aged, FakePlatform};

fn task(value: serde_json::Value) -> RetentionTask {
    serde_json::from_value(value).expect("task")
}

fn weekly_task() -> RetentionTask {
    task(json!({
        "searchstring": "Basemap_",
        "olderthandays": 7,
        "owner": "publisher",
        "contenttype": "Vector Tile Package",
        "summary": "basemap packages",
        "sync": { "frequency": "weekly", "last": "2026-10-01" }
    }))
}

#[test]
fn old_deletable_item_is_deleted() {
    support::init_logging();
    let platform = FakePlatform::new();
    platform.state().retention_results = vec![remote("old1", "Basemap_20260101_000000")];
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert_eq!(report.status, TaskStatus::Swept);
    assert_eq!(report.deleted, vec!["old1".to_string()]);
    let state = platform.state();
    assert_eq!(
        state.queries,
        vec!["title:\"Basemap_\" AND owner:publisher AND type:\"Vector Tile Package\"".to_string()]
    );
    assert_eq!(state.dry_runs, vec!["old1".to_string()]);
    assert_eq!(state.deleted, vec!["old1".to_string()]);
    assert!(log.contains(Severity::Pass, "Deleted Basemap_20260101_000000 (old1)"));
}

#[rstest]
#[case::created_recently(at(2026, 10, 15, 0, 0, 0), at(2020, 1, 1, 0, 0, 0))]
#[case::modified_recently(at(2020, 1, 1, 0, 0, 0), at(2026, 10, 17, 12, 0, 0))]
#[case::exactly_at_cutoff(at(2026, 10, 11, 9, 30, 0), at(2026, 10, 11, 9, 30, 0))]
fn item_inside_the_window_is_kept(
    #[case] created: chrono::NaiveDateTime,
    #[case] modified: chrono::NaiveDateTime,
) {
    let platform = FakePlatform::new();
    platform.state().retention_results =
        vec![remote_aged("recent", "Basemap_recent", created, modified)];
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(report.is_swept());
    assert!(report.deleted.is_empty());
    assert_eq!(report.kept, 1);
    assert!(platform.state().dry_runs.is_empty());
    assert!(platform.state().deleted.is_empty());
}

#[test]
fn item_just_past_cutoff_is_deleted() {
    let platform = FakePlatform::new();
    let past = at(2026, 10, 11, 9, 29, 59);
    platform.state().retention_results = vec![remote_aged("edge", "Basemap_edge", past, past)];
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert_eq!(report.deleted, vec!["edge".to_string()]);
}

#[test]
fn protected_item_is_kept_regardless_of_age() {
    let platform = FakePlatform::new();
    let mut item = remote("locked", "Basemap_locked");
    item.protected = true;
    platform.state().retention_results = vec![item];
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(report.deleted.is_empty());
    assert_eq!(report.kept, 1);
    assert!(platform.state().dry_runs.is_empty());
    assert!(log.contains(Severity::Info, "delete protected"));
}

#[test]
fn item_the_portal_refuses_to_delete_is_kept() {
    let platform = FakePlatform::new();
    {
        let mut state = platform.state();
        state.retention_results = vec![remote("dep", "Basemap_dep")];
        state.refuse_delete.insert("dep".to_string());
    }
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(report.deleted.is_empty());
    assert_eq!(platform.state().dry_runs, vec!["dep".to_string()]);
    assert!(platform.state().deleted.is_empty());
    assert!(log.contains(Severity::Info, "item has dependents"));
}

#[test]
fn title_prefix_is_case_sensitive() {
    let platform = FakePlatform::new();
    platform.state().retention_results = vec![
        remote("lower", "basemap_old"),
        remote("other", "Parcels_Basemap_old"),
    ];
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(report.is_swept());
    assert!(report.deleted.is_empty());
    assert!(platform.state().dry_runs.is_empty());
    assert_eq!(log.count(Severity::Skip), 2);
}

#[test]
fn one_delete_error_does_not_stop_the_sweep() {
    let platform = FakePlatform::new();
    {
        let mut state = platform.state();
        state.retention_results = vec![
            remote("bad", "Basemap_bad"),
            remote("good", "Basemap_good"),
        ];
        state.fail_delete.insert("bad".to_string());
    }
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(report.is_swept());
    assert_eq!(report.deleted, vec!["good".to_string()]);
    assert_eq!(report.errors, 1);
    assert!(report.has_failures());
    assert!(log.contains(Severity::Fail, "Failed to delete Basemap_bad (bad)"));
}

#[test]
fn search_failure_reports_failed() {
    let platform = FakePlatform::new();
    platform.state().fail_search = true;
    let mut log = RunLog::in_memory();

    let report = sweep(&weekly_task(), &platform, now(), &mut log);

    assert!(matches!(report.status, TaskStatus::Failed { .. }));
    assert!(!report.is_swept());
    assert!(log.contains(Severity::Fail, "Failed to search for items matching Basemap_"));
}

#[rstest]
#[case::no_search_string(json!({ "sync": { "frequency": "daily", "last": "1999-01-01" } }), TaskSkip::NoSearchString)]
#[case::empty_search_string(json!({ "searchstring": "", "sync": { "frequency": "daily" } }), TaskSkip::NoSearchString)]
#[case::no_sync_block(json!({ "searchstring": "Basemap_" }), TaskSkip::NoSchedule)]
#[case::not_due(json!({ "searchstring": "Basemap_", "sync": { "frequency": "weekly", "last": "2026-10-15" } }), TaskSkip::NotDue)]
fn unrunnable_tasks_are_skipped(#[case] raw: serde_json::Value, #[case] reason: TaskSkip) {
    let platform = FakePlatform::new();
    platform.state().retention_results = vec![remote("old1", "Basemap_old")];
    let mut log = RunLog::in_memory();

    let report = sweep(&task(raw), &platform, now(), &mut log);

    assert_eq!(report.status, TaskStatus::Skipped { reason });
    assert!(platform.state().queries.is_empty());
    assert_eq!(log.count(Severity::Skip), 1);
}

#[test]
fn query_shape_follows_configured_filters() {
    let platform = FakePlatform::new();
    let mut log = RunLog::in_memory();
    let bare = task(json!({
        "searchstring": "tmp_",
        "sync": { "frequency": "daily", "last": "1999-01-01" }
    }));

    sweep(&bare, &platform, now(), &mut log);

    assert_eq!(platform.state().queries, vec!["title:\"tmp_\"".to_string()]);
}
