//! Column label normalization and the fixed vocabularies shared by every
//! other component.
//!
//! Labels exported from spreadsheets carry stray whitespace, mixed case and
//! invisible zero-width characters. [`normalize_label()`] canonicalizes them
//! for comparison; the original spelling is kept wherever a label is shown.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY_CODES: &[&str] = &["CD", "PCDP", "SM", "AC", "RPA", "SPL", "OT"];
pub const DEFAULT_SYSTEM_HEADERS: &[&str] =
    &["email address", "name", "register no", "department", "total"];
pub const DEFAULT_CATEGORY: &str = "OT";

static IDENTIFIER_PATTERN: OnceLock<Regex> = OnceLock::new();

pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect()
}

/// Numeric coercion used wherever a cell feeds a sum: blank, unparsable and
/// non-finite values all count as zero.
pub fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

fn identifier_pattern() -> &'static Regex {
    IDENTIFIER_PATTERN
        .get_or_init(|| Regex::new(r"(?i)register|reg no|roll").expect("static identifier pattern"))
}

pub fn is_identifier_header(label: &str) -> bool {
    identifier_pattern().is_match(label)
}

pub fn find_identifier_header(headers: &[String]) -> Option<&String> {
    headers.iter().find(|h| is_identifier_header(h))
}

pub fn find_department_header(headers: &[String]) -> Option<&String> {
    headers
        .iter()
        .find(|h| normalize_label(h).contains("dept") || normalize_label(h).contains("department"))
}

pub fn find_email_header(headers: &[String]) -> Option<&String> {
    headers.iter().find(|h| normalize_label(h).contains("email"))
}

pub fn find_name_header(headers: &[String]) -> Option<&String> {
    headers.iter().find(|h| normalize_label(h).contains("name"))
}

/// Normalized registration identifier used as the merge key.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Static vocabularies that separate metadata columns from activity and
/// subject columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub category_codes: Vec<String>,
    pub system_headers: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            category_codes: DEFAULT_CATEGORY_CODES.iter().map(|c| c.to_string()).collect(),
            system_headers: DEFAULT_SYSTEM_HEADERS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Vocabulary {
    pub fn is_category_code(&self, token: &str) -> bool {
        let upper = token.to_uppercase();
        self.category_codes
            .iter()
            .any(|code| code.eq_ignore_ascii_case(&upper))
    }

    pub fn is_system_header(&self, label: &str) -> bool {
        let normalized = normalize_label(label);
        self.system_headers
            .iter()
            .any(|system| normalize_label(system) == normalized)
    }

    /// Columns that carry activity or subject values rather than identity.
    pub fn relevant_columns<'a>(&self, columns: &'a [String]) -> Vec<&'a String> {
        columns
            .iter()
            .filter(|column| !self.is_system_header(column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_label_strips_zero_width_and_case() {
        assert_eq!(normalize_label("  \u{200B}Register No\u{FEFF} "), "register no");
        assert_eq!(normalize_label("25BCM1CA_RP"), "25bcm1ca_rp");
    }

    #[test]
    fn coerce_number_treats_garbage_as_zero() {
        assert_eq!(coerce_number(" 12.5 "), 12.5);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("AB"), 0.0);
        assert_eq!(coerce_number("NaN"), 0.0);
        assert_eq!(coerce_number("inf"), 0.0);
    }

    #[test]
    fn identifier_header_matches_common_spellings() {
        assert!(is_identifier_header("Register Number"));
        assert!(is_identifier_header("REG NO"));
        assert!(is_identifier_header("Roll No"));
        assert!(!is_identifier_header("Email Address"));
    }

    #[test]
    fn system_headers_compare_normalized() {
        let vocabulary = Vocabulary::default();
        assert!(vocabulary.is_system_header(" Email Address"));
        assert!(vocabulary.is_system_header("TOTAL"));
        assert!(!vocabulary.is_system_header("All 1styear 12.06.2024 SM 20 Quiz"));
    }

    #[test]
    fn category_codes_are_case_insensitive() {
        let vocabulary = Vocabulary::default();
        assert!(vocabulary.is_category_code("sm"));
        assert!(vocabulary.is_category_code("PCDP"));
        assert!(!vocabulary.is_category_code("RP"));
    }
}
