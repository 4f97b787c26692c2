//! Project rules: guidance documents under `<folder>/rules/*.md`.
//!
//! A rule file carries a small header between marker lines:
//!
//! ```markdown
//! --------------
//! name: rust-style
//! description: Formatting and lint expectations for Rust code.
//! files: src/**/*.rs, tests/**/*.rs
//! --------------
//!
//! Run cargo fmt before committing...
//! ```

pub mod selector;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use selector::{select_rules, RuleSelection};

const HEADER_MARKER: &str = "--------------";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHeader {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFile {
    pub file_path: PathBuf,
    pub header: RuleHeader,
    pub body: String,
}

/// Parse rule text into its header and body.
///
/// Returns `None` unless the header names the rule and describes it.
pub fn parse_rule(content: &str) -> Option<(RuleHeader, String)> {
    let parts: Vec<&str> = content.split(HEADER_MARKER).map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }

    let mut header = RuleHeader::default();
    for line in parts[1].lines() {
        let Some((raw_key, value)) = line.split_once(':') else {
            continue;
        };
        let key = raw_key.trim().to_lowercase();
        let value = value.trim();
        match key.as_str() {
            "name" => header.name = value.to_string(),
            "description" => header.description = value.to_string(),
            "files" => {
                header.files = value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            }
            _ => {}
        }
    }

    if header.name.is_empty() || header.description.is_empty() {
        return None;
    }

    let body = parts[2..]
        .join(&format!("\n{}\n", HEADER_MARKER))
        .trim()
        .to_string();
    Some((header, body))
}

pub fn parse_rule_file(path: &Path) -> Option<RuleFile> {
    let content = std::fs::read_to_string(path).ok()?;
    let (header, body) = parse_rule(&content)?;
    Some(RuleFile {
        file_path: path.to_path_buf(),
        header,
        body,
    })
}

/// Load every valid `.md` rule in `rules_dir`, ordered by file name.
///
/// A missing directory yields no rules; unparseable files are skipped.
pub fn list_rules(rules_dir: &Path) -> Vec<RuleFile> {
    let entries = match std::fs::read_dir(rules_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "md").unwrap_or(false))
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| {
            let rule = parse_rule_file(path);
            if rule.is_none() {
                tracing::debug!("[Rules] Skipping {}", path.display());
            }
            rule
        })
        .collect()
}
