//! Coverage analysis
//!
//! Compares a recovered test specification against the synthesized one
//! for the same entity and reports which expected scenarios existing
//! tests already cover. Matching is structural, on category and target
//! action, so renamed tests still count. A recovered strict subset is
//! the normal state of a hand-maintained suite, not an error.

use crate::testspec::{Category, TestScenario, TestSpec};
use crate::util::to_snake_case;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct CoverageReport {
    pub entity: String,
    /// Expected scenario names fully matched by recovered ones
    pub covered: Vec<String>,
    /// Matched on category and action, but with fewer assertions
    pub partial: Vec<String>,
    /// Expected scenario names with no recovered counterpart
    pub missing: Vec<String>,
    pub categories: Vec<CategoryCoverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct CategoryCoverage {
    pub category: Category,
    pub expected: usize,
    pub covered: usize,
    /// covered / expected, in percent; 100 when nothing was expected
    pub percent: u8,
}

/// Partition `expected` scenarios by what `recovered` already exercises
pub fn analyze(recovered: &TestSpec, expected: &TestSpec) -> CoverageReport {
    let mut covered = Vec::new();
    let mut partial = Vec::new();
    let mut missing = Vec::new();

    for scenario in &expected.scenarios {
        match best_match(recovered, scenario) {
            Some(found) if found.assertions.len() >= scenario.assertions.len() => {
                covered.push(scenario.name.clone());
            }
            Some(_) => partial.push(scenario.name.clone()),
            None => missing.push(scenario.name.clone()),
        }
    }

    let categories = Category::ALL
        .iter()
        .map(|&category| {
            let expected_count = expected.scenarios_in(category).count();
            let covered_count = expected
                .scenarios_in(category)
                .filter(|s| covered.contains(&s.name) || partial.contains(&s.name))
                .count();
            let percent = if expected_count == 0 {
                100
            } else {
                (covered_count * 100 / expected_count) as u8
            };
            CategoryCoverage {
                category,
                expected: expected_count,
                covered: covered_count,
                percent,
            }
        })
        .collect();

    CoverageReport {
        entity: expected.entity.clone(),
        covered,
        partial,
        missing,
        categories,
    }
}

/// A recovered scenario matches an expected one when category and target
/// action agree; failure paths additionally require the same expected
/// status
fn best_match<'a>(recovered: &'a TestSpec, expected: &TestScenario) -> Option<&'a TestScenario> {
    recovered
        .scenarios
        .iter()
        .filter(|r| r.category == expected.category)
        .filter(|r| normalize_action(r.action.as_deref()) == normalize_action(expected.action.as_deref()))
        .find(|r| expected_status(expected).is_none_or(|status| scenario_has_status(r, status)))
}

fn normalize_action(action: Option<&str>) -> Option<String> {
    action.map(to_snake_case)
}

fn expected_status(scenario: &TestScenario) -> Option<&str> {
    scenario
        .assertions
        .iter()
        .find(|a| a.target == "status")
        .and_then(|a| a.expected.as_deref())
}

fn scenario_has_status(scenario: &TestScenario, status: &str) -> bool {
    scenario
        .assertions
        .iter()
        .any(|a| a.target == "status" && a.expected.as_deref() == Some(status))
}

impl CoverageReport {
    /// Machine-readable form, for tooling that diffs reports
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Coverage for {}\n", self.entity));
        for cat in &self.categories {
            out.push_str(&format!(
                "  {:<12} {}/{} ({}%)\n",
                cat.category.name(),
                cat.covered,
                cat.expected,
                cat.percent
            ));
        }
        if !self.missing.is_empty() {
            out.push_str("Missing scenarios:\n");
            for name in &self.missing {
                out.push_str(&format!("  - {}\n", name));
            }
        }
        out
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
