//! Cohort-level statistics over a merged reward table.
//!
//! Everything here is a pure function of its inputs: recomputing over the
//! same table yields identical results, so callers simply recompute whenever
//! the table or the scope changes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    header::{ActivityDescriptor, HeaderParser},
    label::Vocabulary,
    merge::{MergedTable, StudentRecord},
    subjects::SubjectMark,
};

pub const DEFAULT_BUCKET_WIDTH: u32 = 100;
pub const DISTRIBUTION_FLOOR: f64 = 200.0;
pub const LOW_POINTS_THRESHOLD: f64 = 100.0;
/// Upper bound on distribution buckets; larger totals share the last one.
pub const MAX_BUCKETS: usize = 1000;
const MID_TIER_RATIO: f64 = 0.6;
const LOW_TIER_RATIO: f64 = 0.5;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub range_label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStatistics {
    pub total_students: usize,
    /// Full precision; use [`CohortStatistics::average_display()`] for output.
    pub average_points: f64,
    pub global_total: f64,
    pub distribution: Vec<DistributionBucket>,
    pub activity_count: usize,
    pub category_counts: Vec<CategoryCount>,
    pub low_point_students: Vec<String>,
}

impl CohortStatistics {
    pub fn average_display(&self) -> f64 {
        round2(self.average_points)
    }

    pub fn points_needed(&self, yours: f64) -> f64 {
        points_needed(self.average_points, yours)
    }
}

pub fn points_needed(average: f64, yours: f64) -> f64 {
    round2((average - yours).max(0.0))
}

pub fn student_total(record: &StudentRecord, relevant: &[&String]) -> f64 {
    relevant.iter().map(|column| record.number(column)).sum()
}

/// Histogram of totals in fixed-width buckets covering at least
/// `0..DISTRIBUTION_FLOOR`, capped at [`MAX_BUCKETS`]. Values outside the
/// range land in the last bucket.
pub fn distribution(totals: &[f64], bucket_width: u32) -> Vec<DistributionBucket> {
    let width = f64::from(bucket_width.max(1));
    let ceiling = totals.iter().copied().fold(DISTRIBUTION_FLOOR, f64::max);
    // float to usize casts saturate, so huge or infinite ceilings clamp here
    let bucket_count = ((ceiling / width).ceil() as usize).clamp(1, MAX_BUCKETS);

    let mut counts = vec![0usize; bucket_count];
    for total in totals {
        let index = (total / width).floor();
        let slot = if index >= 0.0 && (index as usize) < bucket_count {
            index as usize
        } else {
            bucket_count - 1
        };
        counts[slot] += 1;
    }

    let step = u64::from(bucket_width.max(1));
    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| DistributionBucket {
            range_label: format!("{}-{}", idx as u64 * step, (idx as u64 + 1) * step),
            count,
        })
        .collect()
}

fn category_counts<'a, I>(descriptors: I, vocabulary: &Vocabulary) -> Vec<CategoryCount>
where
    I: IntoIterator<Item = &'a ActivityDescriptor>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for descriptor in descriptors {
        *counts.entry(descriptor.category.as_str()).or_insert(0) += 1;
    }
    vocabulary
        .category_codes
        .iter()
        .filter_map(|code| {
            let count = counts.get(code.to_uppercase().as_str()).copied()?;
            Some(CategoryCount {
                category: code.to_uppercase(),
                count,
            })
        })
        .collect()
}

pub fn compute_stats(table: &MergedTable, parser: &HeaderParser) -> CohortStatistics {
    compute_stats_with_width(table, parser, DEFAULT_BUCKET_WIDTH)
}

pub fn compute_stats_with_width(
    table: &MergedTable,
    parser: &HeaderParser,
    bucket_width: u32,
) -> CohortStatistics {
    let vocabulary = parser.vocabulary();
    let relevant = vocabulary.relevant_columns(&table.columns);
    let descriptors = relevant.iter().map(|c| parser.parse(c)).collect::<Vec<_>>();

    let mut totals = Vec::with_capacity(table.rows.len());
    let mut low_point_students = Vec::new();
    for (identifier, record) in &table.rows {
        let total = student_total(record, &relevant);
        if total <= LOW_POINTS_THRESHOLD {
            low_point_students.push(identifier.clone());
        }
        totals.push(total);
    }

    let global_total: f64 = totals.iter().sum();
    let average_points = if totals.is_empty() {
        0.0
    } else {
        global_total / totals.len() as f64
    };
    debug!(
        "Cohort of {} student(s), average {:.2} over {} activity column(s)",
        totals.len(),
        average_points,
        relevant.len()
    );

    CohortStatistics {
        total_students: totals.len(),
        average_points,
        global_total,
        distribution: distribution(&totals, bucket_width),
        activity_count: relevant.len(),
        category_counts: category_counts(&descriptors, vocabulary),
        low_point_students,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Top,
    Mid,
    Low,
}

/// Tier of a mark against its effective maximum. Marks from 50% up to (but
/// excluding) 60% belong to no tier.
pub fn classify_tier(mark: f64, effective_max: f64) -> Option<Tier> {
    if mark >= effective_max {
        Some(Tier::Top)
    } else if mark >= effective_max * MID_TIER_RATIO {
        Some(Tier::Mid)
    } else if mark < effective_max * LOW_TIER_RATIO {
        Some(Tier::Low)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentMark {
    pub identifier: String,
    pub mark: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectCohortSummary {
    pub subject_code: String,
    pub total_students: usize,
    pub average: f64,
    pub top: Vec<StudentMark>,
    pub mid: Vec<StudentMark>,
    pub low: Vec<StudentMark>,
}

impl SubjectCohortSummary {
    pub fn pass_rate(&self) -> f64 {
        if self.total_students == 0 {
            0.0
        } else {
            1.0 - self.low.len() as f64 / self.total_students as f64
        }
    }
}

/// Per-subject tiers across a cohort, given each student's subject records
/// (scoped or consolidated).
pub fn subject_cohort_report(
    marks: &BTreeMap<String, Vec<SubjectMark>>,
) -> Vec<SubjectCohortSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_subject: BTreeMap<String, Vec<StudentMark>> = BTreeMap::new();
    for (identifier, subjects) in marks {
        for subject in subjects {
            if !by_subject.contains_key(&subject.subject_code) {
                order.push(subject.subject_code.clone());
            }
            by_subject
                .entry(subject.subject_code.clone())
                .or_default()
                .push(StudentMark {
                    identifier: identifier.clone(),
                    mark: subject.marks_obtained,
                    max: subject.max_marks,
                });
        }
    }

    order
        .into_iter()
        .map(|code| {
            let students = by_subject.remove(&code).unwrap_or_default();
            let mut summary = SubjectCohortSummary {
                subject_code: code,
                total_students: students.len(),
                average: 0.0,
                top: Vec::new(),
                mid: Vec::new(),
                low: Vec::new(),
            };
            if !students.is_empty() {
                let sum: f64 = students.iter().map(|s| s.mark).sum();
                summary.average = round1(sum / students.len() as f64);
            }
            for student in students {
                match classify_tier(student.mark, student.max) {
                    Some(Tier::Top) => summary.top.push(student),
                    Some(Tier::Mid) => summary.mid.push(student),
                    Some(Tier::Low) => summary.low.push(student),
                    None => {}
                }
            }
            summary.top.sort_by(|a, b| b.mark.total_cmp(&a.mark));
            summary.mid.sort_by(|a, b| b.mark.total_cmp(&a.mark));
            summary.low.sort_by(|a, b| a.mark.total_cmp(&b.mark));
            summary
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ActivityFilter {
    fn accepts(&self, descriptor: &ActivityDescriptor) -> bool {
        if let Some(category) = &self.category
            && !descriptor.category.eq_ignore_ascii_case(category)
        {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(start) = descriptor.start_date() else {
            return false;
        };
        self.from.is_none_or(|from| start >= from) && self.to.is_none_or(|to| start <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStat {
    pub descriptor: ActivityDescriptor,
    pub participants: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Declared maximum, or the highest observed value when none is declared.
    pub max_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityAnalytics {
    pub activities: Vec<ActivityStat>,
    pub total_max_points: f64,
    pub category_counts: Vec<CategoryCount>,
}

pub fn activity_analytics(
    table: &MergedTable,
    parser: &HeaderParser,
    filter: &ActivityFilter,
) -> ActivityAnalytics {
    let vocabulary = parser.vocabulary();
    let mut activities = vocabulary
        .relevant_columns(&table.columns)
        .into_iter()
        .map(|column| (column, parser.parse(column)))
        .filter(|(_, descriptor)| filter.accepts(descriptor))
        .map(|(column, descriptor)| {
            let scores = table
                .rows
                .values()
                .map(|record| record.number(column))
                .filter(|value| *value > 0.0)
                .collect::<Vec<_>>();
            let participants = scores.len();
            let (min, max) = scores
                .iter()
                .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                    Some((lo, hi)) => Some((lo.min(*v), hi.max(*v))),
                    None => Some((*v, *v)),
                })
                .unwrap_or((0.0, 0.0));
            let average = if participants > 0 {
                round1(scores.iter().sum::<f64>() / participants as f64)
            } else {
                0.0
            };
            let max_points = descriptor
                .max_points
                .filter(|m| *m > 0)
                .map(|m| m as f64)
                .unwrap_or(max);
            ActivityStat {
                descriptor,
                participants,
                average,
                min,
                max,
                max_points,
            }
        })
        .collect::<Vec<_>>();
    activities.sort_by(|a, b| b.participants.cmp(&a.participants));

    ActivityAnalytics {
        total_max_points: activities.iter().map(|a| a.max_points).sum(),
        category_counts: category_counts(activities.iter().map(|a| &a.descriptor), vocabulary),
        activities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_has_floor_of_two_buckets() {
        let buckets = distribution(&[0.0, 50.0, 150.0], DEFAULT_BUCKET_WIDTH);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].range_label, "0-100");
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].count, 1);
    }

    #[test]
    fn distribution_folds_out_of_range_values_into_last_bucket() {
        let buckets = distribution(&[200.0, -5.0, 250.0], DEFAULT_BUCKET_WIDTH);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].range_label, "200-300");
        assert_eq!(buckets[2].count, 3);
        let at_floor = distribution(&[200.0], DEFAULT_BUCKET_WIDTH);
        assert_eq!(at_floor.len(), 2);
        assert_eq!(at_floor[1].count, 1);
    }

    #[test]
    fn distribution_caps_bucket_count_for_huge_totals() {
        for huge in [1e12, 1e300, f64::INFINITY] {
            let buckets = distribution(&[10.0, huge], DEFAULT_BUCKET_WIDTH);
            assert_eq!(buckets.len(), MAX_BUCKETS);
            assert_eq!(buckets[0].count, 1);
            assert_eq!(buckets[MAX_BUCKETS - 1].count, 1);
            assert_eq!(buckets[MAX_BUCKETS - 1].range_label, "99900-100000");
        }
    }

    #[test]
    fn tiers_leave_fifty_to_sixty_percent_unclassified() {
        assert_eq!(classify_tier(15.0, 15.0), Some(Tier::Top));
        assert_eq!(classify_tier(9.0, 15.0), Some(Tier::Mid));
        assert_eq!(classify_tier(8.0, 15.0), None);
        assert_eq!(classify_tier(7.5, 15.0), None);
        assert_eq!(classify_tier(7.4, 15.0), Some(Tier::Low));
    }

    #[test]
    fn points_needed_never_negative() {
        assert_eq!(points_needed(10.456, 3.0), 7.46);
        assert_eq!(points_needed(3.0, 10.0), 0.0);
    }

    #[test]
    fn activity_filter_requires_date_when_range_set() {
        let filter = ActivityFilter {
            category: None,
            from: NaiveDate::from_ymd_opt(2024, 6, 1),
            to: None,
        };
        let dated = crate::header::parse_header("All 1yr 12.06.2024 SM 20 Quiz");
        let undated = crate::header::parse_header("Quiz");
        assert!(filter.accepts(&dated));
        assert!(!filter.accepts(&undated));
    }
}
