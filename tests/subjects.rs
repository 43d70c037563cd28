use proptest::prelude::*;

use reward_ledger::label::Vocabulary;
use reward_ledger::subjects::{
    DefaultMaxMarks, MarksTotals, SubjectExtractor, SubjectMark, SubjectRule, SubjectType,
};

fn columns(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

fn rule(code: &str, subject_type: SubjectType, max_marks: f64) -> SubjectRule {
    SubjectRule {
        code: code.to_string(),
        subject_type,
        max_marks,
    }
}

#[test]
fn configured_mode_matches_exact_then_substring() {
    let vocabulary = Vocabulary::default();
    let rules = vec![
        rule("25BCM1CA", SubjectType::Theory, 15.0),
        rule("25BCM1ZP", SubjectType::Lab, 15.0),
        rule("25BCM9XX", SubjectType::Theory, 15.0),
    ];
    let cols = columns(&["Register No", "25BCM1CA", "25BCM1CA_RP", "25BCM1ZP Lab"]);
    let values = [("Register No", "21A01"), ("25BCM1CA", "12"), ("25BCM1CA_RP", "2"), ("25BCM1ZP Lab", "16")];
    let extractor = SubjectExtractor::new(&rules, DefaultMaxMarks::default(), &vocabulary);
    let subjects = extractor.extract(&cols, |c| {
        values.iter().find(|(k, _)| *k == c).map(|(_, v)| *v)
    });

    assert_eq!(subjects.len(), 2, "unmatched rules are omitted");
    assert_eq!(subjects[0].subject_code, "25BCM1CA");
    assert_eq!(subjects[0].reward_points_allotted, 2.0);
    assert_eq!(subjects[0].max_marks, 15.0);
    assert_eq!(subjects[1].subject_code, "25BCM1ZP Lab");
    assert_eq!(subjects[1].subject_type, SubjectType::Lab);
    assert_eq!(subjects[1].reward_points_allotted, 0.0);
    assert_eq!(subjects[1].max_marks, 16.0, "max raised to marks");
}

#[test]
fn heuristic_mode_infers_types_and_defaults() {
    let vocabulary = Vocabulary::default();
    let defaults = DefaultMaxMarks {
        theory: 20.0,
        lab: 10.0,
        lab_theory: 25.0,
    };
    let cols = columns(&[
        "Register No",
        "Name",
        "24BCS301",
        "24BCS301_RP",
        "24BCS302 Lab",
        "24BCS303 Lab + Theory",
        "Total 2024",
        "Reward Balance",
    ]);
    let extractor = SubjectExtractor::new(&[], defaults, &vocabulary);
    let subjects = extractor.extract(&cols, |c| match c {
        "24BCS301" => Some("18"),
        "24BCS301_RP" => Some("3"),
        "24BCS302 Lab" => Some("abs"),
        "24BCS303 Lab + Theory" => Some("30"),
        _ => None,
    });

    let codes = subjects.iter().map(|s| s.subject_code.as_str()).collect::<Vec<_>>();
    assert_eq!(codes, vec!["24BCS301", "24BCS302 Lab", "24BCS303 Lab + Theory"]);
    assert_eq!(subjects[0].max_marks, 20.0);
    assert_eq!(subjects[0].reward_points_allotted, 3.0);
    assert_eq!(subjects[1].marks_obtained, 0.0);
    assert_eq!(subjects[1].max_marks, 10.0);
    assert_eq!(subjects[2].subject_type, SubjectType::LabTheory);
    assert_eq!(subjects[2].max_marks, 30.0);

    let totals = MarksTotals::of(&subjects);
    assert_eq!(totals.obtained, 48.0);
    assert_eq!(totals.max, 60.0);
    assert_eq!(totals.reward_points, 3.0);
}

#[test]
fn subject_type_serializes_with_display_labels() {
    let json = serde_json::to_string(&SubjectType::LabTheory).expect("serialize");
    assert_eq!(json, "\"Lab + Theory\"");
    let parsed: SubjectType = serde_json::from_str("\"Lab+Theory\"").expect("alias");
    assert_eq!(parsed, SubjectType::LabTheory);
}

proptest! {
    #[test]
    fn max_never_below_marks(marks in -50.0f64..500.0, max in 0.0f64..100.0) {
        let mark = SubjectMark::new("25BCM1CA", SubjectType::Theory, marks, 0.0, max);
        prop_assert!(mark.max_marks >= mark.marks_obtained);
    }

    #[test]
    fn configured_extraction_clamps(marks in 0u32..200, configured in 1u32..50) {
        let vocabulary = Vocabulary::default();
        let rules = vec![rule("25BCM1CA", SubjectType::Theory, f64::from(configured))];
        let cols = columns(&["25BCM1CA"]);
        let raw = marks.to_string();
        let extractor = SubjectExtractor::new(&rules, DefaultMaxMarks::default(), &vocabulary);
        let subjects = extractor.extract(&cols, |_| Some(raw.as_str()));
        prop_assert_eq!(subjects.len(), 1);
        prop_assert!(subjects[0].max_marks >= subjects[0].marks_obtained);
        prop_assert_eq!(subjects[0].max_marks, f64::from(configured.max(marks)));
    }
}
