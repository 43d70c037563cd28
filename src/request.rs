//! Explicit selection requests and their computed views.
//!
//! A [`Request`] carries every selection parameter. Computing a view fetches
//! the request's sheets and then runs the pure pipeline over what came back.
//! [`RequestTracker`] makes sure only the most recently started request can
//! publish its result.

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::{BoxedSource, LedgerConfig, SemesterConfig},
    consolidate::{ActivityLedger, consolidate_activities, consolidate_subjects},
    header::HeaderParser,
    label::normalize_identifier,
    merge::{FetchedTable, MergedTable, fetch_batch, merge_tables},
    profile::{ActivityRow, RewardBalance, StudentSummary, activity_rows},
    stats::{CohortStatistics, SubjectCohortSummary, compute_stats, subject_cohort_report},
    subjects::{MarksTotals, SubjectExtractor, SubjectMark},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Consolidated,
    Period(String),
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            bail!("Scope must be 'consolidated' or a period id");
        }
        if trimmed.eq_ignore_ascii_case("consolidated") {
            Ok(Scope::Consolidated)
        } else {
            Ok(Scope::Period(trimmed.to_string()))
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Consolidated => f.write_str("Consolidated"),
            Scope::Period(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub batch_id: String,
    pub semester_id: String,
    pub scope: Scope,
    pub department: Option<String>,
}

impl Request {
    pub fn new(batch_id: impl Into<String>, semester_id: impl Into<String>, scope: Scope) -> Self {
        Self {
            batch_id: batch_id.into(),
            semester_id: semester_id.into(),
            scope,
            department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        let department = department.into();
        self.department = (!department.trim().is_empty()).then_some(department);
        self
    }

    /// Periods this request covers, in semester order.
    pub fn periods(&self, semester: &SemesterConfig) -> Result<Vec<String>> {
        match &self.scope {
            Scope::Consolidated => Ok(semester.periods()),
            Scope::Period(id) if semester.periods().contains(id) => Ok(vec![id.clone()]),
            Scope::Period(id) => Err(anyhow!(
                "Unknown period '{id}' in semester '{}'",
                self.semester_id
            )),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.batch_id, self.semester_id, self.scope)?;
        if let Some(department) = &self.department {
            write!(f, " ({department})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodTable {
    pub period: String,
    pub table: crate::source::Table,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeView {
    pub request: Request,
    pub tables: Vec<PeriodTable>,
    pub merged: MergedTable,
    pub stats: CohortStatistics,
}

impl ScopeView {
    fn period_tables(&self) -> impl Iterator<Item = (&str, &crate::source::Table)> {
        self.tables.iter().map(|t| (t.period.as_str(), &t.table))
    }
}

/// The pure half of [`compute`]: merges already fetched period tables.
pub fn build_view(request: &Request, fetched: Vec<FetchedTable>, parser: &HeaderParser) -> ScopeView {
    let merged = merge_tables(fetched.iter().map(|f| &f.table));
    let merged = match &request.department {
        Some(department) => merged.restrict_to_department(department),
        None => merged,
    };
    let stats = compute_stats(&merged, parser);
    ScopeView {
        request: request.clone(),
        tables: fetched
            .into_iter()
            .map(|f| PeriodTable {
                period: f.source,
                table: f.table,
            })
            .collect(),
        merged,
        stats,
    }
}

fn reward_sources(
    request: &Request,
    config: &LedgerConfig,
    semester: &SemesterConfig,
) -> Result<Vec<BoxedSource>> {
    request
        .periods(semester)?
        .into_iter()
        .filter_map(|period| {
            let sheet = semester.reward_sheet(&period)?;
            Some(config.source(period, sheet))
        })
        .collect()
}

pub async fn compute(request: &Request, config: &LedgerConfig) -> Result<ScopeView> {
    let semester = config.semester(&request.batch_id, &request.semester_id)?;
    let sources = reward_sources(request, config, semester)?;
    info!("Computing {request} from {} reward sheet(s)", sources.len());
    let fetched = fetch_batch(&sources)
        .await
        .with_context(|| format!("Loading reward sheets for {request}"))?;
    Ok(build_view(request, fetched, &config.parser()))
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSubjects {
    pub period: String,
    pub subjects: Vec<SubjectMark>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentView {
    pub identifier: String,
    pub department: Option<String>,
    pub activities: Vec<ActivityRow>,
    pub ledger: ActivityLedger,
    pub summary: StudentSummary,
    pub period_subjects: Vec<PeriodSubjects>,
    pub subjects: Vec<SubjectMark>,
    pub subject_totals: MarksTotals,
    pub balance: RewardBalance,
}

/// Fetches the marks sheets for one department, keyed by period. A period
/// whose sheet failed to load is absent.
async fn marks_tables(
    request: &Request,
    config: &LedgerConfig,
    semester: &SemesterConfig,
    department: &str,
) -> Result<Vec<FetchedTable>> {
    let sources = request
        .periods(semester)?
        .into_iter()
        .filter_map(|period| {
            let sheet = semester.marks_sheet(&period, department)?;
            Some(config.source(period, sheet))
        })
        .collect::<Result<Vec<_>>>()?;
    if sources.is_empty() {
        debug!("No marks sheets configured for '{department}' in {request}");
        return Ok(Vec::new());
    }
    match fetch_batch(&sources).await {
        Ok(fetched) => Ok(fetched),
        Err(err) => {
            warn!("Marks for '{department}' unavailable: {err}");
            Ok(Vec::new())
        }
    }
}

pub async fn compute_student(
    request: &Request,
    config: &LedgerConfig,
    reg_no: &str,
) -> Result<StudentView> {
    let view = compute(request, config).await?;
    student_view(&view, config, reg_no).await
}

/// One student's dashboard within an already computed scope.
pub async fn student_view(view: &ScopeView, config: &LedgerConfig, reg_no: &str) -> Result<StudentView> {
    let request = &view.request;
    let parser = config.parser();
    let identifier = normalize_identifier(reg_no);
    let record = view
        .merged
        .student(&identifier)
        .ok_or_else(|| anyhow!("No records found for register number '{}'", reg_no.trim()))?;

    let department = request.department.clone().or_else(|| {
        view.merged
            .department_column()
            .and_then(|column| record.get(column))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    });

    let activities = activity_rows(&view.merged, record, &parser, None);
    let summary = StudentSummary::new(&view.stats, &activities);
    let ledger = consolidate_activities(view.period_tables(), &identifier, &parser);

    let semester = config.semester(&request.batch_id, &request.semester_id)?;
    let mut period_subjects = Vec::new();
    if let Some(department) = &department {
        let extractor = SubjectExtractor::new(
            semester.subject_config.rules_for(department),
            semester.subject_config.default_max_marks,
            &config.vocabulary,
        );
        for fetched in marks_tables(request, config, semester, department).await? {
            let Some(row) = fetched.table.find_row(&identifier) else {
                debug!("'{identifier}' has no marks row in {}", fetched.source);
                continue;
            };
            period_subjects.push(PeriodSubjects {
                period: fetched.source.clone(),
                subjects: extractor.extract(&fetched.table.columns, |c| {
                    row.get(c).map(String::as_str)
                }),
            });
        }
    }

    let subjects = consolidate_subjects(
        period_subjects
            .iter()
            .map(|p| (p.period.as_str(), p.subjects.as_slice())),
    );
    let subject_totals = MarksTotals::of(&subjects);
    let balance = RewardBalance::new(ledger.total_points, &subject_totals);

    Ok(StudentView {
        identifier,
        department,
        activities,
        ledger,
        summary,
        period_subjects,
        subjects,
        subject_totals,
        balance,
    })
}

/// Subject tiers for every student of the request's department.
pub async fn compute_subject_report(
    request: &Request,
    config: &LedgerConfig,
) -> Result<Vec<SubjectCohortSummary>> {
    let department = request
        .department
        .as_deref()
        .ok_or_else(|| anyhow!("A department is required for the subject report"))?;
    let semester = config.semester(&request.batch_id, &request.semester_id)?;
    let extractor = SubjectExtractor::new(
        semester.subject_config.rules_for(department),
        semester.subject_config.default_max_marks,
        &config.vocabulary,
    );

    let mut per_student: BTreeMap<String, Vec<(String, Vec<SubjectMark>)>> = BTreeMap::new();
    for fetched in marks_tables(request, config, semester, department).await? {
        let Some(id_column) = fetched.table.identifier_column() else {
            continue;
        };
        for row in &fetched.table.rows {
            let identifier = row.get(id_column).map(|v| normalize_identifier(v)).unwrap_or_default();
            if identifier.is_empty() {
                continue;
            }
            let subjects = extractor.extract(&fetched.table.columns, |c| row.get(c).map(String::as_str));
            per_student
                .entry(identifier)
                .or_default()
                .push((fetched.source.clone(), subjects));
        }
    }

    let consolidated = per_student
        .into_iter()
        .map(|(identifier, periods)| {
            let subjects =
                consolidate_subjects(periods.iter().map(|(p, s)| (p.as_str(), s.as_slice())));
            (identifier, subjects)
        })
        .collect::<BTreeMap<_, _>>();
    Ok(subject_cohort_report(&consolidated))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    pub request: Request,
}

#[derive(Debug)]
struct TrackerState<T> {
    generation: u64,
    committed: Option<(Request, T)>,
}

/// Keeps the result of the latest request only. Starting a new request
/// invalidates every ticket handed out before it.
#[derive(Debug)]
pub struct RequestTracker<T> {
    state: Mutex<TrackerState<T>>,
}

impl<T> Default for RequestTracker<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                generation: 0,
                committed: None,
            }),
        }
    }
}

impl<T: Clone> RequestTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, request: Request) -> Ticket {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        Ticket {
            generation: state.generation,
            request,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation == ticket.generation
    }

    /// Stores `value` if no newer request has begun. Returns whether it was
    /// accepted.
    pub fn commit(&self, ticket: Ticket, value: T) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != ticket.generation {
            debug!("Discarding superseded result for {}", ticket.request);
            return false;
        }
        state.committed = Some((ticket.request, value));
        true
    }

    pub fn latest(&self) -> Option<(Request, T)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.committed.clone()
    }
}
