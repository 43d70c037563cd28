//! Activity metadata encoded in reward-sheet column names.
//!
//! Reward sheets name each activity column with a loose positional
//! convention, for example `RP All 1styear 12.06.2024_To_14.06.2024 SM 20 Blood_Donation`:
//!
//! - an optional leading `RP` marker,
//! - the audience (`All`, a department, ...),
//! - the year (`1styear`, `2yr`, ...),
//! - a date or date range in one of three encodings,
//! - a category code from the configured vocabulary, usually adjacent to the
//!   maximum points the activity awards,
//! - the free-text activity name.
//!
//! [`HeaderParser::parse()`] decodes a header by running [`PIPELINE`], an
//! ordered list of small rules that each read and extend a [`ParseState`].
//! Parsing is total: anything that does not fit degrades to the default
//! descriptor.

use std::sync::OnceLock;

use chrono::NaiveDate;
use log::trace;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::label::{DEFAULT_CATEGORY, Vocabulary};

const MIN_METADATA_TOKENS: usize = 3;
const LEADING_MARKER: &str = "RP";
const DEFAULT_AUDIENCE: &str = "All";

static DEFAULT_PARSER: OnceLock<HeaderParser> = OnceLock::new();
static INLINE_RANGE: OnceLock<Regex> = OnceLock::new();
static DATE_LIKE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDescriptor {
    pub raw_header: String,
    pub display_name: String,
    pub category: String,
    pub date_start: String,
    pub date_end: String,
    pub for_who: String,
    pub year: String,
    pub max_points: Option<u64>,
}

impl ActivityDescriptor {
    fn fallback(raw: &str) -> Self {
        Self {
            raw_header: raw.to_string(),
            display_name: raw.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            date_start: String::new(),
            date_end: String::new(),
            for_who: String::new(),
            year: String::new(),
            max_points: None,
        }
    }

    /// Start date as a calendar date when written as `dd.mm.yyyy`
    /// (`-` and `/` separators are accepted too).
    pub fn start_date(&self) -> Option<NaiveDate> {
        parse_day_month_year(&self.date_start)
    }
}

pub fn parse_day_month_year(value: &str) -> Option<NaiveDate> {
    let unified = value.trim().replace(['-', '/'], ".");
    let parts = unified.split('.').collect::<Vec<_>>();
    if parts.len() != 3 {
        return None;
    }
    let day = parts[0].parse().ok()?;
    let month = parts[1].parse().ok()?;
    let year = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Partially decoded header threaded through the rule pipeline.
#[derive(Debug, Clone)]
pub struct ParseState {
    pub tokens: Vec<String>,
    /// Position of the next unconsumed positional token.
    pub cursor: usize,
    pub year_index: Option<usize>,
    pub category_index: Option<usize>,
    pub descriptor: ActivityDescriptor,
}

impl ParseState {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            tokens: tokenize(raw),
            cursor: 0,
            year_index: None,
            category_index: None,
            descriptor: ActivityDescriptor::fallback(raw),
        }
    }

    fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    fn remaining(&self) -> &[String] {
        self.tokens.get(self.cursor..).unwrap_or(&[])
    }
}

pub fn tokenize(raw: &str) -> Vec<String> {
    raw.split(['_', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_strictly_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// `Some` for any all-digit token, holding `None` when it overflows `u64`.
/// An overflowing token still occupies its place in the precedence chain.
fn numeric_token(token: Option<&str>) -> Option<Option<u64>> {
    token
        .filter(|t| is_strictly_numeric(t))
        .map(|t| t.parse().ok())
}

pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&mut ParseState, &Vocabulary),
}

/// Rules in precedence order. Each rule only reads what earlier rules left
/// in the state.
pub const PIPELINE: &[Rule] = &[
    Rule {
        name: "leading-marker",
        apply: leading_marker_rule,
    },
    Rule {
        name: "audience",
        apply: audience_rule,
    },
    Rule {
        name: "year",
        apply: year_rule,
    },
    Rule {
        name: "date",
        apply: date_rule,
    },
    Rule {
        name: "category",
        apply: category_rule,
    },
    Rule {
        name: "max-points",
        apply: max_points_rule,
    },
    Rule {
        name: "display-name",
        apply: display_name_rule,
    },
];

pub fn leading_marker_rule(state: &mut ParseState, _: &Vocabulary) {
    if state
        .token(0)
        .is_some_and(|t| t.eq_ignore_ascii_case(LEADING_MARKER))
    {
        state.cursor = 1;
    }
}

pub fn audience_rule(state: &mut ParseState, _: &Vocabulary) {
    state.descriptor.for_who = state
        .token(state.cursor)
        .unwrap_or(DEFAULT_AUDIENCE)
        .to_string();
    state.cursor += 1;
}

pub fn year_rule(state: &mut ParseState, _: &Vocabulary) {
    if let Some(year) = state.token(state.cursor) {
        state.descriptor.year = year.to_string();
        state.year_index = Some(state.cursor);
    }
    state.cursor += 1;
}

fn inline_range() -> &'static Regex {
    INLINE_RANGE.get_or_init(|| Regex::new("(?i)to").expect("static range pattern"))
}

fn date_like() -> &'static Regex {
    DATE_LIKE.get_or_init(|| {
        Regex::new(r"\d{1,2}[./-]\d{1,2}[./-]\d{2,4}").expect("static date pattern")
    })
}

/// A header without a category code whose date position holds no date is
/// plain text, such as an already decoded display name.
pub fn carries_metadata(tokens: &[String], vocabulary: &Vocabulary) -> bool {
    if tokens.iter().any(|t| vocabulary.is_category_code(t)) {
        return true;
    }
    let marker = usize::from(
        tokens
            .first()
            .is_some_and(|t| t.eq_ignore_ascii_case(LEADING_MARKER)),
    );
    tokens
        .get(marker + 2)
        .is_some_and(|t| date_like().is_match(t))
}

fn tidy_date_half(half: Option<&str>) -> String {
    half.map(|h| h.replace(['_', '-'], ".").trim().to_string())
        .unwrap_or_default()
}

/// Dates come as `start_To_end` in one token, as `start To end` across three
/// tokens, or as `starttoend` inside one token. Anything else is a single day.
pub fn date_rule(state: &mut ParseState, _: &Vocabulary) {
    let token = state.token(state.cursor).unwrap_or("").to_string();
    let standalone_to = state
        .token(state.cursor + 1)
        .is_some_and(|next| next.eq_ignore_ascii_case("to"));

    if token.contains("_To_") {
        let mut halves = token.split("_To_");
        state.descriptor.date_start = halves.next().unwrap_or("").to_string();
        state.descriptor.date_end = halves.next().unwrap_or("").to_string();
        state.cursor += 1;
    } else if standalone_to {
        state.descriptor.date_start = token;
        state.descriptor.date_end = state.token(state.cursor + 2).unwrap_or("").to_string();
        state.cursor += 3;
    } else if token.to_lowercase().contains("to") {
        let mut halves = inline_range().split(&token);
        state.descriptor.date_start = tidy_date_half(halves.next());
        state.descriptor.date_end = tidy_date_half(halves.next());
        state.cursor += 1;
    } else {
        state.descriptor.date_start = token.clone();
        state.descriptor.date_end = token;
        state.cursor += 1;
    }
}

pub fn category_rule(state: &mut ParseState, vocabulary: &Vocabulary) {
    if let Some((index, token)) = state
        .tokens
        .iter()
        .enumerate()
        .find(|(_, t)| vocabulary.is_category_code(t))
    {
        state.descriptor.category = token.to_uppercase();
        state.category_index = Some(index);
    }
}

/// The token after the category wins, then the token before it (unless it
/// sits in the year position), then a trailing number.
pub fn max_points_rule(state: &mut ParseState, _: &Vocabulary) {
    let Some(category_index) = state.category_index else {
        return;
    };
    let after = numeric_token(state.token(category_index + 1));
    let before = category_index
        .checked_sub(1)
        .filter(|before_index| Some(*before_index) != state.year_index)
        .and_then(|before_index| numeric_token(state.token(before_index)));
    let last = numeric_token(state.tokens.last().map(String::as_str));
    state.descriptor.max_points = after.or(before).or(last).flatten();
}

pub fn display_name_rule(state: &mut ParseState, vocabulary: &Vocabulary) {
    let name = if state.category_index.is_some() {
        let max_points = state.descriptor.max_points.map(|m| m.to_string());
        state
            .remaining()
            .iter()
            .filter(|t| !vocabulary.is_category_code(t))
            .filter(|t| max_points.as_deref() != Some(t.as_str()))
            .filter(|t| !t.to_lowercase().contains("yr"))
            .filter(|t| !is_strictly_numeric(t))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        state.remaining().join(" ")
    };
    state.descriptor.display_name = name;
}

#[derive(Debug, Clone, Default)]
pub struct HeaderParser {
    vocabulary: Vocabulary,
}

impl HeaderParser {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn parse(&self, header: &str) -> ActivityDescriptor {
        let mut state = ParseState::new(header);
        if state.tokens.len() < MIN_METADATA_TOKENS
            || !carries_metadata(&state.tokens, &self.vocabulary)
        {
            return state.descriptor;
        }
        for rule in PIPELINE {
            (rule.apply)(&mut state, &self.vocabulary);
            trace!("{} -> cursor {} for '{}'", rule.name, state.cursor, header);
        }
        state.descriptor
    }
}

/// Parses with the default vocabulary.
pub fn parse_header(header: &str) -> ActivityDescriptor {
    DEFAULT_PARSER.get_or_init(HeaderParser::default).parse(header)
}
