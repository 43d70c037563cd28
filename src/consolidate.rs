//! Combine per-period records into semester totals.
//!
//! Subjects are summed component-wise by subject code, so a consolidated
//! maximum is the sum of each period's maximum. Activities are collected from
//! each period's reward table with the period they came from.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    header::{ActivityDescriptor, HeaderParser},
    label::coerce_number,
    source::Table,
    subjects::SubjectMark,
};

/// Sums subject records across periods, keeping first-appearance order.
pub fn consolidate_subjects<'a, I>(per_period: I) -> Vec<SubjectMark>
where
    I: IntoIterator<Item = (&'a str, &'a [SubjectMark])>,
{
    let mut merged: Vec<SubjectMark> = Vec::new();
    for (period, subjects) in per_period {
        debug!("Consolidating {} subject(s) from {period}", subjects.len());
        for subject in subjects {
            match merged
                .iter_mut()
                .find(|m| m.subject_code == subject.subject_code)
            {
                Some(existing) => {
                    existing.marks_obtained += subject.marks_obtained;
                    existing.reward_points_allotted += subject.reward_points_allotted;
                    existing.max_marks += subject.max_marks;
                }
                None => merged.push(subject.clone()),
            }
        }
    }
    merged
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub period: String,
    pub descriptor: ActivityDescriptor,
    pub points: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityLedger {
    pub entries: Vec<ActivityEntry>,
    pub total_points: f64,
}

impl ActivityLedger {
    pub fn activities_undertaken(&self) -> usize {
        self.entries.len()
    }

    /// The scoped view of a consolidated ledger.
    pub fn for_period(&self, period: &str) -> ActivityLedger {
        let entries = self
            .entries
            .iter()
            .filter(|e| e.period == period)
            .cloned()
            .collect::<Vec<_>>();
        ActivityLedger {
            total_points: entries.iter().map(|e| e.points).sum(),
            entries,
        }
    }
}

/// Collects one student's positive-valued activity columns from every
/// period's reward table. Periods where the student has no row contribute
/// nothing.
pub fn consolidate_activities<'a, I>(
    per_period: I,
    identifier: &str,
    parser: &HeaderParser,
) -> ActivityLedger
where
    I: IntoIterator<Item = (&'a str, &'a Table)>,
{
    let vocabulary = parser.vocabulary();
    let mut ledger = ActivityLedger::default();
    for (period, table) in per_period {
        let Some(row) = table.find_row(identifier) else {
            debug!("No reward row for '{identifier}' in {period}");
            continue;
        };
        for column in vocabulary.relevant_columns(&table.columns) {
            let points = row.get(column).map(|v| coerce_number(v)).unwrap_or(0.0);
            ledger.total_points += points;
            if points > 0.0 {
                ledger.entries.push(ActivityEntry {
                    period: period.to_string(),
                    descriptor: parser.parse(column),
                    points,
                });
            }
        }
    }
    ledger
}
