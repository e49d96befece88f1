//! Read-only status reports over a memory bank on disk.

use crate::{Category, DocumentType};
use derive_more::Display;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

/// Why a single document failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Invalidity {
    #[display("missing")]
    Missing,
    #[display("not a regular file")]
    NotAFile,
    #[display("not accessible")]
    Inaccessible,
}

/// Per-document result of an initialization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationStatus {
    pub root_exists: bool,
    /// Documents that failed validation; empty when the bank is initialized.
    pub invalid: BTreeMap<DocumentType, Invalidity>,
}
impl InitializationStatus {
    pub fn is_initialized(&self) -> bool {
        self.root_exists && self.invalid.is_empty()
    }

    pub fn missing(&self) -> impl Iterator<Item = DocumentType> + '_ {
        self.invalid.iter().filter(|(_, invalidity)| **invalidity == Invalidity::Missing).map(|(document, _)| *document)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Problem {
    #[display("root directory is missing")]
    MissingRoot,
    #[display("{category} folder is missing")]
    MissingFolder { category: Category },
    #[display("{document} is {invalidity}")]
    Document { document: DocumentType, invalidity: Invalidity },
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "camelCase")]
#[display("{problem} ({})", path.display())]
pub struct HealthIssue {
    pub path: PathBuf,
    pub problem: Problem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub root_exists: bool,
    pub issues: Vec<HealthIssue>,
    pub summary: String,
}
impl HealthReport {
    pub(crate) fn new(root_exists: bool, issues: Vec<HealthIssue>) -> Self {
        let summary = match issues.len() {
            0 => format!("Memory bank is healthy: all {} documents present", DocumentType::ALL.len()),
            count => {
                let mut summary = format!("Memory bank has {count} issue(s):");
                for issue in &issues {
                    // Writing to a String cannot fail.
                    let _ = write!(summary, "\n- {issue}");
                }
                summary
            },
        };
        Self { healthy: issues.is_empty(), root_exists, issues, summary }
    }
}
