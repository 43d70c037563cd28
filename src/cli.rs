use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::{header::parse_day_month_year, request::Scope};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge reward and internal-marks sheets into student ledgers",
    long_about = None
)]
pub struct Cli {
    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode activity column headers into their metadata
    ParseHeader(ParseHeaderArgs),
    /// Merge one or more reward sheets keyed by register number
    Merge(MergeArgs),
    /// Cohort statistics and point distribution for a scope
    Stats(ScopeArgs),
    /// Per-activity participation analytics for a scope
    Activities(ActivitiesArgs),
    /// Activities, subject marks and reward balance for one student
    Student(StudentArgs),
    /// Subject tiers across a department's internal marks
    Internals(ScopeArgs),
}

#[derive(Debug, Args)]
pub struct ParseHeaderArgs {
    /// Column headers to decode
    #[arg(required = true)]
    pub headers: Vec<String>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Input sheets, merged in the order given
    #[arg(short, long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScopeArgs {
    /// Ledger configuration file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Batch id
    #[arg(short, long)]
    pub batch: String,
    /// Semester id within the batch
    #[arg(short, long)]
    pub semester: String,
    /// `consolidated` or an assessment period id such as IP1
    #[arg(long, default_value = "consolidated", value_parser = parse_scope)]
    pub scope: Scope,
    /// Restrict to one department
    #[arg(short, long)]
    pub department: Option<String>,
}

#[derive(Debug, Args)]
pub struct ActivitiesArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
    /// Only activities of this category code
    #[arg(long)]
    pub category: Option<String>,
    /// Earliest activity start date (yyyy-mm-dd or dd.mm.yyyy)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Latest activity start date (yyyy-mm-dd or dd.mm.yyyy)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct StudentArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
    /// Register number
    #[arg(long = "reg-no")]
    pub reg_no: Option<String>,
    /// Email address
    #[arg(long)]
    pub email: Option<String>,
    /// Part of the student's name
    #[arg(long)]
    pub name: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    if value.is_empty() {
        return Err("Delimiter cannot be empty".to_string());
    }
    crate::io_utils::parse_delimiter(value).map_err(|err| err.to_string())
}

pub fn parse_scope(value: &str) -> Result<Scope, String> {
    value.parse::<Scope>().map_err(|err| err.to_string())
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_day_month_year(value))
        .ok_or_else(|| format!("Invalid date '{value}'; expected yyyy-mm-dd or dd.mm.yyyy"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_both_orders() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 12);
        assert_eq!(parse_date("2024-06-12").ok(), expected);
        assert_eq!(parse_date("12.06.2024").ok(), expected);
        assert!(parse_date("June").is_err());
    }

    #[test]
    fn student_args_flatten_scope() {
        let cli = Cli::try_parse_from([
            "reward-ledger",
            "student",
            "-c",
            "ledger.yaml",
            "-b",
            "b1",
            "-s",
            "1",
            "--scope",
            "IP1",
            "--reg-no",
            "21A01",
            "--json",
        ])
        .expect("parse");
        assert!(cli.json);
        let Commands::Student(args) = cli.command else {
            panic!("expected student command");
        };
        assert_eq!(args.scope.scope, Scope::Period("IP1".into()));
        assert_eq!(args.reg_no.as_deref(), Some("21A01"));
    }
}
