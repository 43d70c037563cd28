mod common;

use reward_ledger::merge::{MergeError, fetch_batch, merge};
use reward_ledger::source::{CsvFileSource, SourceError, TableSource};

use common::{StaticSource, TestWorkspace, fixture_path, table};

#[tokio::test]
async fn failed_source_is_skipped_when_others_succeed() {
    let sources = vec![
        StaticSource::ok(
            "ip1",
            table(&["Register No", "Quiz"], &[&["21A01", "5"], &["21A02", "3"]]),
        ),
        StaticSource::failing("ip2", "connection reset"),
        StaticSource::ok("ip3", table(&["Roll", "Seminar"], &[&["21a01", "4"]])),
    ];
    let merged = merge(&sources).await.expect("partial merge");

    assert_eq!(merged.columns, vec!["Register No", "Quiz", "Roll", "Seminar"]);
    assert_eq!(merged.rows.len(), 2);
    let student = merged.student("21A01").expect("student");
    assert_eq!(student.number("Quiz"), 5.0);
    assert_eq!(student.number("Seminar"), 4.0);
}

#[tokio::test]
async fn all_sources_failing_is_a_batch_error() {
    let sources = vec![
        StaticSource::failing("ip1", "timeout"),
        StaticSource::failing("ip2", "timeout"),
    ];
    let err = merge(&sources).await.expect_err("no source loaded");
    let MergeError::BatchUnavailable { failures } = &err;
    assert_eq!(failures.len(), 2);
    assert!(err.to_string().contains("no data for this scope"));
}

#[tokio::test]
async fn empty_batch_is_unavailable() {
    let sources: Vec<StaticSource> = Vec::new();
    assert!(merge(&sources).await.is_err());
}

#[tokio::test]
async fn source_without_identifier_counts_as_failed() {
    let sources = vec![
        StaticSource::ok("names", table(&["Name", "Quiz"], &[&["Asha", "5"]])),
        StaticSource::ok("ip1", table(&["Register No", "Quiz"], &[&["21A01", "2"]])),
    ];
    let fetched = fetch_batch(&sources).await.expect("one usable source");
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].source, "ip1");

    let merged = merge(&sources).await.expect("merge");
    assert_eq!(merged.columns, vec!["Register No", "Quiz"]);

    let only_names = vec![StaticSource::ok("names", table(&["Name"], &[&["Asha"]]))];
    let err = fetch_batch(&only_names).await.expect_err("nothing usable");
    let MergeError::BatchUnavailable { failures } = err;
    assert!(matches!(failures[0], SourceError::MissingIdentifier { .. }));
}

#[tokio::test]
async fn conflicts_resolve_in_configuration_order_not_completion_order() {
    // the first source settles last; its value must still be overwritten
    let sources = vec![
        StaticSource::ok("slow", table(&["Register No", "Quiz"], &[&["21A01", "1"]])).delayed(40),
        StaticSource::ok("fast", table(&["Register No", "Quiz"], &[&["21A01", "9"]])),
    ];
    for _ in 0..3 {
        let merged = merge(&sources).await.expect("merge");
        assert_eq!(merged.student("21a01").and_then(|s| s.get("Quiz")), Some("9"));
    }
}

#[tokio::test]
async fn csv_sources_merge_from_disk() {
    let workspace = TestWorkspace::new();
    let extra = workspace.write("extra.tsv", "Reg No\tWorkshop\n21A01\t7\n");
    let sources: Vec<Box<dyn TableSource>> = vec![
        Box::new(CsvFileSource::new("ip1", fixture_path("rewards_ip1.csv"))),
        Box::new(CsvFileSource::new("extra", extra)),
        Box::new(CsvFileSource::new("gone", workspace.path().join("missing.csv"))),
    ];
    let merged = merge(&sources).await.expect("merge");
    assert_eq!(merged.rows.len(), 3);
    assert_eq!(merged.student("21A01").expect("student").number("Workshop"), 7.0);
    assert_eq!(merged.departments(), vec!["B.Com", "B.Com CA"]);
}
