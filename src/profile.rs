//! Student lookup and the per-student dashboard values.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    header::{ActivityDescriptor, HeaderParser},
    label::{
        find_department_header, find_email_header, find_identifier_header, find_name_header,
        normalize_label,
    },
    merge::{MergedTable, StudentRecord},
    stats::{CohortStatistics, points_needed, round2},
    subjects::MarksTotals,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentQuery {
    pub reg_no: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
}

fn criterion(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl StudentQuery {
    pub fn by_reg_no(reg_no: impl Into<String>) -> Self {
        Self {
            reg_no: Some(reg_no.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        criterion(&self.reg_no).is_none()
            && criterion(&self.email).is_none()
            && criterion(&self.name).is_none()
            && criterion(&self.department).is_none()
    }

    fn matches(&self, table: &MergedTable, record: &StudentRecord) -> bool {
        let field = |column: Option<&String>| {
            column
                .and_then(|c| record.get(c))
                .map(|v| v.trim().to_lowercase())
        };
        // A criterion whose column is missing from the table does not filter.
        if let (Some(wanted), Some(column)) =
            (criterion(&self.reg_no), find_identifier_header(&table.columns))
            && field(Some(column)).as_deref() != Some(wanted.to_lowercase().as_str())
        {
            return false;
        }
        if let (Some(wanted), Some(column)) =
            (criterion(&self.email), find_email_header(&table.columns))
            && field(Some(column)).as_deref() != Some(wanted.to_lowercase().as_str())
        {
            return false;
        }
        if let (Some(wanted), Some(column)) =
            (criterion(&self.name), find_name_header(&table.columns))
            && !field(Some(column)).is_some_and(|v| v.contains(&wanted.to_lowercase()))
        {
            return false;
        }
        if let (Some(wanted), Some(column)) =
            (criterion(&self.department), find_department_header(&table.columns))
            && record.get(column).map(str::trim) != Some(wanted)
        {
            return false;
        }
        true
    }
}

/// Every record matching all given criteria, in identifier order.
pub fn find_students<'t>(
    table: &'t MergedTable,
    query: &StudentQuery,
) -> Result<Vec<(&'t String, &'t StudentRecord)>> {
    if query.is_empty() {
        bail!("Please provide at least one search criterion (register no, email, name or department)");
    }
    Ok(table
        .rows
        .iter()
        .filter(|(_, record)| query.matches(table, record))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub header_name: String,
    pub descriptor: ActivityDescriptor,
    pub points: f64,
}

/// The student's positive-valued activity columns. With a filter, only that
/// column is returned, whatever its value.
pub fn activity_rows(
    table: &MergedTable,
    record: &StudentRecord,
    parser: &HeaderParser,
    activity_filter: Option<&str>,
) -> Vec<ActivityRow> {
    let filter = activity_filter.map(normalize_label);
    parser
        .vocabulary()
        .relevant_columns(&table.columns)
        .into_iter()
        .filter_map(|column| {
            let points = record.number(column);
            match &filter {
                Some(wanted) if normalize_label(column) != *wanted => None,
                None if points <= 0.0 => None,
                _ => Some(ActivityRow {
                    header_name: column.clone(),
                    descriptor: parser.parse(column),
                    points,
                }),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub average: f64,
    pub yours: f64,
    pub needed: f64,
}

impl StudentSummary {
    pub fn new(stats: &CohortStatistics, rows: &[ActivityRow]) -> Self {
        let yours = rows.iter().map(|r| r.points).sum();
        Self {
            average: stats.average_display(),
            yours,
            needed: points_needed(stats.average_points, yours),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBalance {
    pub total: f64,
    pub allocated: f64,
    pub balance: f64,
}

impl RewardBalance {
    /// Reward points still unallocated after the subject claims.
    pub fn new(total: f64, subjects: &MarksTotals) -> Self {
        Self {
            total,
            allocated: subjects.reward_points,
            balance: round2((total - subjects.reward_points).max(0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_tables;
    use crate::source::Table;

    fn cohort() -> MergedTable {
        let columns = ["Register No", "Name", "Email Address", "Department", "Quiz", "Seminar"];
        let rows = [
            ["21A01", "Asha Raman", "asha@example.edu", "B.Com", "5", "0"],
            ["21A02", "Ravi Kumar", "ravi@example.edu", "B.Com CA", "0", "x"],
            ["21A03", "Asha Devi", "devi@example.edu", "B.Com", "2", "4"],
        ];
        let table = Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| {
                    columns
                        .iter()
                        .zip(r.iter())
                        .map(|(c, v)| (c.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        };
        merge_tables([&table])
    }

    #[test]
    fn empty_query_is_rejected() {
        let table = cohort();
        let query = StudentQuery {
            name: Some("  ".into()),
            ..StudentQuery::default()
        };
        assert!(find_students(&table, &query).is_err());
    }

    #[test]
    fn query_combines_criteria() {
        let table = cohort();
        let query = StudentQuery {
            name: Some("asha".into()),
            department: Some("B.Com".into()),
            ..StudentQuery::default()
        };
        let found = find_students(&table, &query).expect("query");
        assert_eq!(found.len(), 2);

        let found = find_students(&table, &StudentQuery::by_reg_no(" 21a02 ")).expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "21a02");
    }

    #[test]
    fn activity_rows_skip_zero_unless_filtered() {
        let table = cohort();
        let parser = HeaderParser::default();
        let record = table.student("21A01").expect("student");
        let rows = activity_rows(&table, record, &parser, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].header_name, "Quiz");

        let rows = activity_rows(&table, record, &parser, Some("seminar"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points, 0.0);
    }

    #[test]
    fn balance_never_negative() {
        let totals = MarksTotals {
            obtained: 20.0,
            max: 30.0,
            reward_points: 12.0,
        };
        assert_eq!(RewardBalance::new(10.0, &totals).balance, 0.0);
        assert_eq!(RewardBalance::new(15.5, &totals).balance, 3.5);
    }
}
