pub mod cli;
pub mod config;
pub mod consolidate;
pub mod header;
pub mod io_utils;
pub mod label;
pub mod merge;
pub mod profile;
pub mod request;
pub mod source;
pub mod stats;
pub mod subjects;
pub mod table;
pub mod yaml_provider;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info};
use serde::Serialize;

use crate::{
    cli::{ActivitiesArgs, Cli, Commands, MergeArgs, ParseHeaderArgs, ScopeArgs, StudentArgs},
    config::LedgerConfig,
    header::{HeaderParser, parse_header},
    profile::{StudentQuery, find_students},
    request::Request,
    source::CsvFileSource,
    stats::{ActivityFilter, activity_analytics},
    table::{format_points, print_table},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("reward_ledger", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::ParseHeader(args) => handle_parse_header(&args, json),
        Commands::Merge(args) => handle_merge(&args, json).await,
        Commands::Stats(args) => handle_stats(&args, json).await,
        Commands::Activities(args) => handle_activities(&args, json).await,
        Commands::Student(args) => handle_student(&args, json).await,
        Commands::Internals(args) => handle_internals(&args, json).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing output")?;
    println!("{rendered}");
    Ok(())
}

fn load_scope(args: &ScopeArgs) -> Result<(LedgerConfig, Request)> {
    let config = LedgerConfig::load(&args.config)?;
    let mut request = Request::new(&args.batch, &args.semester, args.scope.clone());
    if let Some(department) = &args.department {
        request = request.with_department(department);
    }
    Ok((config, request))
}

fn handle_parse_header(args: &ParseHeaderArgs, json: bool) -> Result<()> {
    let descriptors = args.headers.iter().map(|h| parse_header(h)).collect::<Vec<_>>();
    if json {
        return print_json(&descriptors);
    }
    let rows = descriptors
        .iter()
        .map(|d| {
            vec![
                d.display_name.clone(),
                d.category.clone(),
                d.for_who.clone(),
                d.year.clone(),
                d.date_start.clone(),
                d.date_end.clone(),
                d.max_points.map(|m| m.to_string()).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    print_table(
        &["Activity", "Category", "For", "Year", "Start", "End", "Max"],
        &rows,
    );
    Ok(())
}

async fn handle_merge(args: &MergeArgs, json: bool) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let sources = args
        .inputs
        .iter()
        .map(|path| {
            CsvFileSource::new(path.display().to_string(), path)
                .with_delimiter(io_utils::resolve_input_delimiter(path, args.delimiter))
                .with_encoding(encoding)
        })
        .collect::<Vec<_>>();
    info!("Merging {} sheet(s)", sources.len());
    let merged = merge::merge(&sources).await?;
    if json {
        return print_json(&merged);
    }
    let stats = stats::compute_stats(&merged, &HeaderParser::default());
    println!(
        "{} student(s), {} column(s), {} activity column(s)",
        merged.rows.len(),
        merged.columns.len(),
        stats.activity_count
    );
    let rows = merged
        .columns
        .iter()
        .map(|column| {
            let filled = merged
                .rows
                .values()
                .filter(|r| r.get(column).is_some_and(|v| !v.is_empty()))
                .count();
            vec![column.clone(), filled.to_string()]
        })
        .collect::<Vec<_>>();
    print_table(&["Column", "Filled"], &rows);
    Ok(())
}

async fn handle_stats(args: &ScopeArgs, json: bool) -> Result<()> {
    let (config, request) = load_scope(args)?;
    let view = request::compute(&request, &config).await?;
    if json {
        return print_json(&view.stats);
    }
    let stats = &view.stats;
    println!("Scope: {request}");
    println!("Students: {}", stats.total_students);
    println!("Average points: {:.2}", stats.average_display());
    println!("Total points: {}", format_points(stats.global_total));
    println!("Activities: {}", stats.activity_count);
    println!("Students at or below 100 points: {}", stats.low_point_students.len());
    let rows = stats
        .distribution
        .iter()
        .map(|b| vec![b.range_label.clone(), b.count.to_string()])
        .collect::<Vec<_>>();
    print_table(&["Range", "Students"], &rows);
    if !stats.category_counts.is_empty() {
        let rows = stats
            .category_counts
            .iter()
            .map(|c| vec![c.category.clone(), c.count.to_string()])
            .collect::<Vec<_>>();
        print_table(&["Category", "Activities"], &rows);
    }
    Ok(())
}

async fn handle_activities(args: &ActivitiesArgs, json: bool) -> Result<()> {
    let (config, request) = load_scope(&args.scope)?;
    let view = request::compute(&request, &config).await?;
    let filter = ActivityFilter {
        category: args.category.clone(),
        from: args.from,
        to: args.to,
    };
    let analytics = activity_analytics(&view.merged, &config.parser(), &filter);
    if json {
        return print_json(&analytics);
    }
    let rows = analytics
        .activities
        .iter()
        .map(|a| {
            vec![
                a.descriptor.display_name.clone(),
                a.descriptor.category.clone(),
                a.descriptor.date_start.clone(),
                a.participants.to_string(),
                format_points(a.average),
                format_points(a.min),
                format_points(a.max),
                format_points(a.max_points),
            ]
        })
        .collect::<Vec<_>>();
    print_table(
        &["Activity", "Category", "Date", "Students", "Avg", "Min", "Max", "Out of"],
        &rows,
    );
    println!(
        "{} activity column(s), {} points on offer",
        analytics.activities.len(),
        format_points(analytics.total_max_points)
    );
    Ok(())
}

async fn handle_student(args: &StudentArgs, json: bool) -> Result<()> {
    let (config, request) = load_scope(&args.scope)?;
    let query = StudentQuery {
        reg_no: args.reg_no.clone(),
        email: args.email.clone(),
        name: args.name.clone(),
        department: args.scope.department.clone(),
    };
    // Look up against the scope first so email and name queries resolve to
    // a register number.
    let view = request::compute(&request, &config).await?;
    let (identifier, _) = find_students(&view.merged, &query)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No records found"))?;
    let student = request::student_view(&view, &config, identifier).await?;
    if json {
        return print_json(&student);
    }

    println!("Student: {}", student.identifier);
    if let Some(department) = &student.department {
        println!("Department: {department}");
    }
    println!(
        "Your points: {}  Cohort average: {:.2}  Needed to reach average: {}",
        format_points(student.summary.yours),
        student.summary.average,
        format_points(student.summary.needed)
    );
    let rows = student
        .ledger
        .entries
        .iter()
        .map(|e| {
            vec![
                e.period.clone(),
                e.descriptor.display_name.clone(),
                e.descriptor.category.clone(),
                e.descriptor.date_start.clone(),
                format_points(e.points),
            ]
        })
        .collect::<Vec<_>>();
    print_table(&["Period", "Activity", "Category", "Date", "Points"], &rows);

    if !student.subjects.is_empty() {
        let rows = student
            .subjects
            .iter()
            .map(|s| {
                vec![
                    s.subject_code.clone(),
                    s.subject_type.to_string(),
                    format_points(s.marks_obtained),
                    format_points(s.max_marks),
                    format_points(s.reward_points_allotted),
                ]
            })
            .collect::<Vec<_>>();
        print_table(&["Subject", "Type", "Marks", "Max", "RP"], &rows);
    }
    println!(
        "Reward points: {} total, {} allocated, {} balance",
        format_points(student.balance.total),
        format_points(student.balance.allocated),
        format_points(student.balance.balance)
    );
    Ok(())
}

async fn handle_internals(args: &ScopeArgs, json: bool) -> Result<()> {
    let (config, request) = load_scope(args)?;
    let report = request::compute_subject_report(&request, &config).await?;
    if json {
        return print_json(&report);
    }
    let rows = report
        .iter()
        .map(|s| {
            vec![
                s.subject_code.clone(),
                s.total_students.to_string(),
                format!("{:.1}", s.average),
                s.top.len().to_string(),
                s.mid.len().to_string(),
                s.low.len().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print_table(&["Subject", "Students", "Avg", "Top", "Mid", "Low"], &rows);
    Ok(())
}
