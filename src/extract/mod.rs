//! Reverse extraction: recover a [`TestSpec`] from an existing test file
//!
//! Extraction is best-effort by design: handwritten or drifted test files
//! never cause a hard failure. Constructs the parsers cannot map become
//! warnings, and whatever was recovered is still returned. Files this
//! crate generated carry scenario markers and extract losslessly at the
//! scenario-structure level.

pub mod pgtap;
pub mod pytest;

use crate::testspec::{Category, TestSpec};
use serde::Serialize;
use std::fmt;

/// The test-file flavors the extractors understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PgTap,
    Pytest,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::PgTap => f.write_str("pgtap"),
            Dialect::Pytest => f.write_str("pytest"),
        }
    }
}

/// Content sniffing, no file extension needed
pub fn detect_dialect(source: &str) -> Option<Dialect> {
    if source.contains("SELECT plan(") || source.contains("has_table(") {
        return Some(Dialect::PgTap);
    }
    if source.contains("def test_") || source.contains("import pytest") {
        return Some(Dialect::Pytest);
    }
    None
}

/// What came back from a source file
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub spec: TestSpec,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionWarning {
    /// 1-based source line
    pub line: usize,
    pub detail: String,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.detail)
    }
}

/// Extract a test specification from `source`
pub fn extract(source: &str, dialect: Dialect) -> Extraction {
    match dialect {
        Dialect::PgTap => pgtap::extract(source),
        Dialect::Pytest => pytest::extract(source),
    }
}

pub(crate) fn parse_category(name: &str) -> Option<Category> {
    match name {
        "structure" => Some(Category::Structure),
        "crud" => Some(Category::Crud),
        "action" => Some(Category::Action),
        "integration" => Some(Category::Integration),
        _ => None,
    }
}

/// Fallback category inference from a scenario or test name
pub(crate) fn infer_category(name: &str) -> Category {
    if name.contains("structure") || name.contains("schema") || name.contains("column") {
        Category::Structure
    } else if name.starts_with("create")
        || name.starts_with("update")
        || name.starts_with("delete")
        || name.starts_with("soft_delete")
    {
        Category::Crud
    } else if name.contains("workflow") || name.contains("lifecycle") || name.contains("full_") {
        Category::Integration
    } else {
        Category::Action
    }
}
