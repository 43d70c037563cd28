//! Subject mark extraction from internal-assessment rows.
//!
//! A department with configured [`SubjectRule`]s is extracted in configured
//! mode: every rule is matched against the row's columns. Without rules the
//! extractor classifies columns heuristically. Either way a subject whose
//! column is missing is omitted, and a missing reward-point column counts as
//! zero.

use std::{collections::HashMap, fmt};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::label::{Vocabulary, coerce_number, normalize_label};

const RP_SUFFIXES: &[&str] = &["_rp", " rp", "rp"];
const EXCLUDED_FRAGMENTS: &[&str] = &["total", "allocated", "balance", "reward"];
const MIN_SUBJECT_LABEL_LEN: usize = 4;
const FALLBACK_MAX_MARKS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectType {
    Theory,
    Lab,
    #[serde(rename = "Lab + Theory", alias = "Lab+Theory")]
    LabTheory,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SubjectType::Theory => "Theory",
            SubjectType::Lab => "Lab",
            SubjectType::LabTheory => "Lab + Theory",
        };
        f.write_str(label)
    }
}

impl SubjectType {
    /// Type implied by a column label when no rule names it.
    pub fn infer(label: &str) -> Self {
        let normalized = normalize_label(label);
        if normalized.contains("lab+theory") || normalized.contains("lab + theory") {
            SubjectType::LabTheory
        } else if normalized.contains("lab") {
            SubjectType::Lab
        } else {
            SubjectType::Theory
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRule {
    pub code: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    #[serde(alias = "maxMarks")]
    pub max_marks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultMaxMarks {
    #[serde(alias = "Theory")]
    pub theory: f64,
    #[serde(alias = "Lab")]
    pub lab: f64,
    #[serde(alias = "Lab + Theory")]
    pub lab_theory: f64,
}

impl Default for DefaultMaxMarks {
    fn default() -> Self {
        Self {
            theory: FALLBACK_MAX_MARKS,
            lab: FALLBACK_MAX_MARKS,
            lab_theory: FALLBACK_MAX_MARKS,
        }
    }
}

impl DefaultMaxMarks {
    pub fn for_type(&self, subject_type: SubjectType) -> f64 {
        let configured = match subject_type {
            SubjectType::Theory => self.theory,
            SubjectType::Lab => self.lab,
            SubjectType::LabTheory => self.lab_theory,
        };
        if configured > 0.0 {
            configured
        } else {
            FALLBACK_MAX_MARKS
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMark {
    pub subject_code: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub marks_obtained: f64,
    pub reward_points_allotted: f64,
    pub max_marks: f64,
}

impl SubjectMark {
    /// Creates a record, raising `max_marks` to the obtained marks when the
    /// configured maximum is exceeded.
    pub fn new(
        subject_code: impl Into<String>,
        subject_type: SubjectType,
        marks_obtained: f64,
        reward_points_allotted: f64,
        max_marks: f64,
    ) -> Self {
        Self {
            subject_code: subject_code.into(),
            subject_type,
            marks_obtained,
            reward_points_allotted,
            max_marks: max_marks.max(marks_obtained),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarksTotals {
    pub obtained: f64,
    pub max: f64,
    pub reward_points: f64,
}

impl MarksTotals {
    pub fn of(subjects: &[SubjectMark]) -> Self {
        subjects.iter().fold(Self::default(), |acc, s| Self {
            obtained: acc.obtained + s.marks_obtained,
            max: acc.max + s.max_marks,
            reward_points: acc.reward_points + s.reward_points_allotted,
        })
    }
}

/// Row columns indexed by normalized label, plus the lookups both extraction
/// modes share.
struct ColumnIndex<'a> {
    columns: &'a [String],
    by_normalized: HashMap<String, &'a String>,
}

impl<'a> ColumnIndex<'a> {
    fn new(columns: &'a [String]) -> Self {
        let mut by_normalized = HashMap::new();
        for column in columns {
            by_normalized.entry(normalize_label(column)).or_insert(column);
        }
        Self {
            columns,
            by_normalized,
        }
    }

    fn find_subject(&self, code: &str) -> Option<&'a String> {
        let wanted = normalize_label(code);
        self.columns
            .iter()
            .find(|c| normalize_label(c) == wanted)
            .or_else(|| self.columns.iter().find(|c| normalize_label(c).contains(&wanted)))
    }

    fn find_reward_points(&self, base: &str) -> Option<&'a String> {
        let base = normalize_label(base);
        RP_SUFFIXES
            .iter()
            .find_map(|suffix| self.by_normalized.get(&format!("{base}{suffix}")).copied())
            .or_else(|| {
                self.columns.iter().find(|c| {
                    let normalized = normalize_label(c);
                    normalized.ends_with("_rp") && normalized.contains(&base)
                })
            })
    }
}

/// Whether a column looks like a subject when no rules are configured.
pub fn looks_like_subject(label: &str, vocabulary: &Vocabulary) -> bool {
    let normalized = normalize_label(label);
    if vocabulary.is_system_header(label) {
        return false;
    }
    if EXCLUDED_FRAGMENTS.iter().any(|f| normalized.contains(f)) {
        return false;
    }
    normalized.chars().any(|c| c.is_ascii_lowercase())
        && normalized.chars().any(|c| c.is_ascii_digit())
        && normalized.chars().count() >= MIN_SUBJECT_LABEL_LEN
        && !normalized.ends_with("_rp")
}

pub struct SubjectExtractor<'a> {
    pub rules: &'a [SubjectRule],
    pub default_max: DefaultMaxMarks,
    pub vocabulary: &'a Vocabulary,
}

impl<'a> SubjectExtractor<'a> {
    pub fn new(rules: &'a [SubjectRule], default_max: DefaultMaxMarks, vocabulary: &'a Vocabulary) -> Self {
        Self {
            rules,
            default_max,
            vocabulary,
        }
    }

    /// Extracts one student's subject records. `value` resolves a column
    /// header to that student's raw cell.
    pub fn extract<'r, F>(&self, columns: &[String], value: F) -> Vec<SubjectMark>
    where
        F: Fn(&str) -> Option<&'r str>,
    {
        let index = ColumnIndex::new(columns);
        let read = |column: Option<&String>| {
            column
                .and_then(|c| value(c.as_str()))
                .map(coerce_number)
                .unwrap_or(0.0)
        };

        if !self.rules.is_empty() {
            let subjects = self
                .rules
                .iter()
                .filter_map(|rule| {
                    let column = index.find_subject(&rule.code)?;
                    let marks = read(Some(column));
                    let reward_points = read(index.find_reward_points(column));
                    Some(SubjectMark::new(
                        column.clone(),
                        rule.subject_type,
                        marks,
                        reward_points,
                        rule.max_marks,
                    ))
                })
                .collect::<Vec<_>>();
            debug!(
                "Matched {} of {} configured subject(s)",
                subjects.len(),
                self.rules.len()
            );
            return subjects;
        }

        columns
            .iter()
            .filter(|c| looks_like_subject(c, self.vocabulary))
            .map(|column| {
                let subject_type = SubjectType::infer(column);
                SubjectMark::new(
                    column.clone(),
                    subject_type,
                    read(Some(column)),
                    read(index.find_reward_points(column)),
                    self.default_max.for_type(subject_type),
                )
            })
            .collect()
    }
}
