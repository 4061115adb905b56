mod common;

use common::{Journal, case, failing, scripted_registry};
use pretty_assertions::assert_eq;
use testset::engine::{RunOptions, run_set};
use testset::engine_async::run_set_async;
use testset::junit::render_junit;
use testset::report::{OutputKind, ReportOptions, render_human};
use testset::testset::TestSet;
use testset::types::{CaseStatus, Parameters, RunContext, Summary, TestCaseSpec};

fn set_of(journal: &Journal, specs: Vec<TestCaseSpec>, stop_on_fail: bool) -> TestSet {
    TestSet::new("run", specs, &scripted_registry(journal), &Parameters::new())
        .unwrap()
        .with_stop_on_fail(stop_on_fail)
}

fn statuses(summary: &Summary) -> Vec<(String, CaseStatus)> {
    summary
        .cases
        .iter()
        .map(|c| (c.name.clone(), c.status))
        .collect()
}

fn sequential() -> RunOptions {
    RunOptions {
        jobs: 1,
        ..Default::default()
    }
}

#[test]
fn stop_on_fail_skips_dependents_of_a_failure() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![case("A", &[]), failing("B", &["A"]), case("C", &["B"])],
        true,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    assert_eq!(
        statuses(&summary),
        vec![
            ("A".to_string(), CaseStatus::Passed),
            ("B".to_string(), CaseStatus::Failed),
            ("C".to_string(), CaseStatus::Skipped),
        ]
    );
    assert_eq!(journal.ran(), vec!["A", "B"]);
    let reason = summary.cases[2].message.as_deref().unwrap();
    assert!(reason.contains("dependency B failed"), "{reason}");
    assert!(!summary.success());
}

#[test]
fn stop_on_fail_still_runs_always_execute_cases() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![
            failing("Unrelated", &[]),
            case("Bringup", &[]),
            case("Shutdown", &["Bringup"]).always_execute(true),
            case("Other", &["Bringup"]),
        ],
        true,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    assert_eq!(journal.ran(), vec!["Unrelated", "Shutdown"]);
    assert_eq!(
        statuses(&summary),
        vec![
            ("Unrelated".to_string(), CaseStatus::Failed),
            ("Bringup".to_string(), CaseStatus::Skipped),
            ("Shutdown".to_string(), CaseStatus::Passed),
            ("Other".to_string(), CaseStatus::Skipped),
        ]
    );
    let reason = summary.cases[1].message.as_deref().unwrap();
    assert!(reason.contains("Unrelated failed"), "{reason}");
}

#[test]
fn keep_going_runs_everything_and_reports_failure() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![case("A", &[]), failing("B", &["A"]), case("C", &["B"])],
        false,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    assert_eq!(journal.ran(), vec!["A", "B", "C"]);
    assert_eq!((summary.passed, summary.failed, summary.skipped), (2, 1, 0));
    assert!(!summary.success());
}

#[test]
fn cli_override_beats_set_configuration() {
    let journal = Journal::default();
    let set = set_of(&journal, vec![failing("A", &[]), case("B", &[])], true);
    let opts = RunOptions {
        stop_on_fail: Some(false),
        ..sequential()
    };
    let summary = run_set(&set, &RunContext::default(), &opts).unwrap();
    assert_eq!(summary.skipped, 0);
    assert_eq!(journal.ran(), vec!["A", "B"]);
}

#[test]
fn errors_and_panics_become_failed_results() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![
            case("Refused", &[]).param("behaviour", "error"),
            case("Boom", &[]).param("behaviour", "panic"),
            case("Fine", &[]),
        ],
        false,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.passed, 1);
    assert!(summary.cases[0].message.as_deref().unwrap().contains("connection refused"));
    assert!(summary.cases[1].message.as_deref().unwrap().contains("Boom blew up"));
}

#[test]
fn target_selection_runs_prerequisites_only() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![case("Boot", &[]), case("S3", &["Boot"]), case("Block", &["Boot"])],
        false,
    );
    let opts = RunOptions {
        targets: vec!["Block".into()],
        ..sequential()
    };
    let summary = run_set(&set, &RunContext::default(), &opts).unwrap();
    assert_eq!(journal.ran(), vec!["Boot", "Block"]);
    assert!(summary.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_run_respects_dependencies_and_reports_in_order() {
    let journal = Journal::default();
    let slow = |name: &str, deps: &[&str], ms: u64| case(name, deps).param("delay_ms", ms);
    let set = set_of(
        &journal,
        vec![
            slow("Root", &[], 20),
            slow("Slow", &["Root"], 80),
            slow("Fast", &["Root"], 5),
            slow("Join", &["Slow", "Fast"], 5),
        ],
        false,
    );
    let opts = RunOptions {
        jobs: 4,
        ..Default::default()
    };
    let summary = run_set_async(&set, &RunContext::default(), &opts).await.unwrap();

    assert_eq!(
        summary.cases.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        set.order_names()
    );
    assert!(summary.success());
    assert!(journal.position("end:Root") < journal.position("start:Slow"));
    assert!(journal.position("end:Root") < journal.position("start:Fast"));
    assert!(journal.position("end:Slow") < journal.position("start:Join"));
    assert!(journal.position("end:Fast") < journal.position("start:Join"));
    // Both branches were in flight together.
    assert!(journal.position("start:Fast") < journal.position("end:Slow"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_run_with_stop_on_fail_skips_downstream() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![
            failing("Root", &[]),
            case("Mid", &["Root"]),
            case("Leaf", &["Mid"]),
            case("Teardown", &["Leaf"]).always_execute(true),
        ],
        true,
    );
    let opts = RunOptions {
        jobs: 3,
        ..Default::default()
    };
    let summary = run_set_async(&set, &RunContext::default(), &opts).await.unwrap();
    assert_eq!(
        statuses(&summary),
        vec![
            ("Root".to_string(), CaseStatus::Failed),
            ("Mid".to_string(), CaseStatus::Skipped),
            ("Leaf".to_string(), CaseStatus::Skipped),
            ("Teardown".to_string(), CaseStatus::Passed),
        ]
    );
    assert_eq!(journal.ran(), vec!["Root", "Teardown"]);
}

#[test]
fn human_report_lists_every_status() {
    colored::control::set_override(false);
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![case("A", &[]), failing("B", &["A"]), case("C", &["B"])],
        true,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    let text = render_human(&summary, &ReportOptions::default());
    assert!(text.contains("[PASS] A"));
    assert!(text.contains("[FAIL] B"));
    assert!(text.contains("[SKIP] C"));
    assert!(text.contains("B did not hold"));
    assert!(text.contains("Total: 3, Passed: 1, Failed: 1, Skipped: 1"));

    let terse = render_human(
        &summary,
        &ReportOptions {
            kind: OutputKind::Terse,
            ..Default::default()
        },
    );
    assert!(terse.starts_with(".FS\n"));

    let hidden = render_human(
        &summary,
        &ReportOptions {
            hide_passes: true,
            ..Default::default()
        },
    );
    assert!(!hidden.contains("[PASS]"));
}

#[test]
fn junit_report_has_failure_and_skip_elements() {
    let journal = Journal::default();
    let set = set_of(
        &journal,
        vec![case("A", &[]), failing("B", &["A"]), case("C", &["B"])],
        true,
    );
    let summary = run_set(&set, &RunContext::default(), &sequential()).unwrap();
    let xml = render_junit("testset", &[summary]).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<testsuites name=\"testset\" tests=\"3\" failures=\"1\" errors=\"0\" skipped=\"1\""));
    assert!(xml.contains("<testsuite name=\"run\""));
    assert!(xml.contains("<testcase name=\"B\" classname=\"run.scripted\""));
    assert!(xml.contains("<failure message=\"B did not hold\">"));
    assert!(xml.contains("<skipped message="));
    assert!(xml.contains("<system-out>A ok</system-out>"));
}
