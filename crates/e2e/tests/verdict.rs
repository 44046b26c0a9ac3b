//! The CI-facing verdict contract, exercised through the public API.

use esperit_e2e::events::{EventKind, ObservedEvent};
use esperit_e2e::locator::{Strategy, Target};
use esperit_e2e::report::RunArtifact;
use esperit_e2e::{Issue, RunReport, Severity};

#[test]
fn clean_run_exits_zero() {
    let report = RunReport::new("https://example.test");
    assert_eq!(report.summary().exit_code, 0);
}

#[test]
fn any_issue_or_console_error_exits_one() {
    let mut with_issue = RunReport::new("https://example.test");
    with_issue.record_issue(Issue::new(Severity::Warning, "minor deviation"));
    assert_eq!(with_issue.summary().exit_code, 1);

    let mut with_error = RunReport::new("https://example.test");
    with_error.record_events(vec![ObservedEvent {
        kind: EventKind::UncaughtException,
        text: "TypeError: personas is undefined".to_string(),
        location: Some("https://example.test/app.js:10:3".to_string()),
    }]);
    assert_eq!(with_error.summary().exit_code, 1);
}

#[test]
fn artifact_round_trips_through_json() {
    let mut report = RunReport::new("https://example.test");
    report.record_issue(
        Issue::blocking("cross-session leak (A->B): persona visible to the wrong user")
            .with_url("https://example.test/personas")
            .with_target(&Target::new(
                "the persona list",
                vec![Strategy::css(".persona-card")],
            )),
    );
    report.record_events(vec![ObservedEvent {
        kind: EventKind::Error,
        text: "GET /api/personas 500".to_string(),
        location: None,
    }]);

    let dir = std::env::temp_dir().join(format!("esperit-e2e-verdict-{}", std::process::id()));
    let path = report.write_artifact(&dir).expect("artifact written");

    let raw = std::fs::read_to_string(&path).expect("artifact readable");
    let artifact: RunArtifact = serde_json::from_str(&raw).expect("artifact parses");

    assert_eq!(artifact.url, "https://example.test");
    assert_eq!(artifact.issues.len(), 1);
    assert_eq!(artifact.console_events.len(), 1);
    assert_eq!(artifact.summary.exit_code, 1);
    assert_eq!(artifact.summary.blocking, 1);

    let context = artifact.issues[0].context.as_ref().expect("context kept");
    assert_eq!(
        context.selectors_tried.as_deref(),
        Some("css:.persona-card")
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn rendered_report_names_the_leak_direction() {
    let mut report = RunReport::new("https://example.test");
    report.record_issue(Issue::blocking(
        "cross-session leak (B->A): persona 'User 2 Persona' created by user-b is visible to user-a after reload",
    ));

    let rendered = report.render();
    assert!(rendered.contains("(B->A)"));
    assert!(rendered.contains("FAIL"));
}
