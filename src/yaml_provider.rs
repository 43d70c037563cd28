//! YAML reading for ledger configuration files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

pub fn parse_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    let value: serde_yaml::Value = serde_yaml::from_str(input).context("Parsing YAML")?;
    serde_yaml::from_value(value).context("Interpreting YAML document")
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    parse_str(&raw).with_context(|| format!("Loading {path:?}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn loads_a_document_from_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("doc.yaml");
        fs::write(&path, "IP1: 15\nIP2: 20\n").expect("write");
        let loaded: BTreeMap<String, u32> = load_from_path(&path).expect("load");
        assert_eq!(loaded.get("IP1"), Some(&15));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(parse_str::<BTreeMap<String, u32>>("IP1: [unclosed").is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_from_path::<BTreeMap<String, u32>>(Path::new("/nonexistent/ledger.yaml"))
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("ledger.yaml"));
    }
}
