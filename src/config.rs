//! Ledger configuration: batches, semesters, assessment periods and where
//! each period's sheets live.
//!
//! ```yaml
//! batches:
//!   - id: batch-2025-2028
//!     label: Batch 2025 - 2028
//!     semesters:
//!       "1":
//!         label: Semester 1
//!         internals: [IP1, IP2]
//!         reward_sheets:
//!           IP1: { path: rewards/ip1.csv }
//!         internal_marks_sheets:
//!           IP1:
//!             B.Com: { path: marks/ip1_bcom.csv }
//!         subject_config:
//!           default_max_marks: { theory: 15, lab: 15, lab_theory: 15 }
//!           departments:
//!             B.Com:
//!               - { code: 25BCM1CA, type: Theory, max_marks: 15 }
//! retry: { max_retries: 2, base_delay_ms: 500 }
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    header::HeaderParser,
    io_utils,
    label::Vocabulary,
    source::{CsvFileSource, RetryPolicy, RetryingSource, TableSource},
    subjects::{DefaultMaxMarks, SubjectRule},
    yaml_provider,
};

pub type BoxedSource = Box<dyn TableSource>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectConfig {
    #[serde(alias = "defaultMaxMarks")]
    pub default_max_marks: DefaultMaxMarks,
    pub departments: BTreeMap<String, Vec<SubjectRule>>,
}

impl SubjectConfig {
    /// Rules for a department; empty means heuristic extraction.
    pub fn rules_for(&self, department: &str) -> &[SubjectRule] {
        self.departments
            .get(department.trim())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemesterConfig {
    pub label: String,
    #[serde(default)]
    pub internals: Vec<String>,
    #[serde(default, alias = "rewardSheets")]
    pub reward_sheets: BTreeMap<String, SheetConfig>,
    #[serde(default, alias = "internalMarksSheets")]
    pub internal_marks_sheets: BTreeMap<String, BTreeMap<String, SheetConfig>>,
    #[serde(default, alias = "subjectConfig")]
    pub subject_config: SubjectConfig,
}

impl SemesterConfig {
    /// Periods in declared order, followed by any period that only appears
    /// in the sheet maps.
    pub fn periods(&self) -> Vec<String> {
        let mut periods = self.internals.clone();
        for period in self
            .reward_sheets
            .keys()
            .chain(self.internal_marks_sheets.keys())
        {
            if !periods.contains(period) {
                periods.push(period.clone());
            }
        }
        periods
    }

    pub fn reward_sheet(&self, period: &str) -> Option<&SheetConfig> {
        self.reward_sheets.get(period)
    }

    pub fn marks_sheet(&self, period: &str, department: &str) -> Option<&SheetConfig> {
        self.internal_marks_sheets
            .get(period)
            .and_then(|by_dept| by_dept.get(department.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub semesters: BTreeMap<String, SemesterConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub batches: Vec<BatchConfig>,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Directory that relative sheet paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl LedgerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: LedgerConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading ledger configuration from {path:?}"))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn batch(&self, batch_id: &str) -> Result<&BatchConfig> {
        self.batches
            .iter()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| anyhow!("Unknown batch '{batch_id}'"))
    }

    pub fn semester(&self, batch_id: &str, semester_id: &str) -> Result<&SemesterConfig> {
        self.batch(batch_id)?
            .semesters
            .get(semester_id)
            .ok_or_else(|| anyhow!("Unknown semester '{semester_id}' in batch '{batch_id}'"))
    }

    pub fn parser(&self) -> HeaderParser {
        HeaderParser::new(self.vocabulary.clone())
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Builds the retrying file source for one sheet entry.
    pub fn source(&self, name: impl Into<String>, sheet: &SheetConfig) -> Result<BoxedSource> {
        let name = name.into();
        let path = self.resolve_path(&sheet.path);
        let delimiter = sheet
            .delimiter
            .as_deref()
            .map(io_utils::parse_delimiter)
            .transpose()
            .with_context(|| format!("Delimiter for sheet '{name}'"))?;
        let encoding = io_utils::resolve_encoding(sheet.encoding.as_deref())
            .with_context(|| format!("Encoding for sheet '{name}'"))?;
        let source = CsvFileSource::new(name, &path)
            .with_delimiter(io_utils::resolve_input_delimiter(&path, delimiter))
            .with_encoding(encoding);
        Ok(Box::new(RetryingSource::new(source, self.retry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
batches:
  - id: b1
    label: Batch 1
    semesters:
      "1":
        label: Semester 1
        internals: [IP1, IP2]
        rewardSheets:
          IP2: { path: ip2.csv }
          IP1: { path: /data/ip1.tsv, delimiter: tab }
          IP3: { path: ip3.csv }
        subjectConfig:
          defaultMaxMarks: { Theory: 20, Lab: 10, "Lab + Theory": 25 }
          departments:
            B.Com:
              - { code: 25BCM1CA, type: Theory, maxMarks: 15 }
              - { code: 25BCM1ZP, type: "Lab + Theory", max_marks: 25 }
"#;

    fn sample() -> LedgerConfig {
        let mut config: LedgerConfig = yaml_provider::parse_str(SAMPLE).expect("config");
        config.base_dir = PathBuf::from("/etc/ledger");
        config
    }

    #[test]
    fn parses_nested_semesters_and_rules() {
        let config = sample();
        let semester = config.semester("b1", "1").expect("semester");
        assert_eq!(semester.periods(), vec!["IP1", "IP2", "IP3"]);
        let rules = semester.subject_config.rules_for(" B.Com ");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].max_marks, 25.0);
        assert_eq!(semester.subject_config.default_max_marks.lab, 10.0);
        assert!(semester.subject_config.rules_for("B.Sc").is_empty());
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let config = sample();
        assert!(config.batch("b2").is_err());
        let err = config.semester("b1", "9").expect_err("missing semester");
        assert!(err.to_string().contains("'9'"));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = sample();
        assert_eq!(
            config.resolve_path(Path::new("ip2.csv")),
            PathBuf::from("/etc/ledger/ip2.csv")
        );
        assert_eq!(
            config.resolve_path(Path::new("/data/ip1.tsv")),
            PathBuf::from("/data/ip1.tsv")
        );
    }

    #[test]
    fn bad_delimiter_is_reported() {
        let config = sample();
        let sheet = SheetConfig {
            path: "x.csv".into(),
            delimiter: Some("::".into()),
            encoding: None,
        };
        assert!(config.source("x", &sheet).is_err());
    }
}
