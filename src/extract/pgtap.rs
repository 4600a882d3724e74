//! Best-effort pgTAP parser
//!
//! Marker comments written by the pgTAP renderer are authoritative when
//! present. Without them, assertions are recognized line by line and
//! grouped into recovered scenarios by category heuristics, so
//! handwritten suites still come back as something coverage analysis can
//! use. Lines that look like tap test calls but match no known function
//! are reported as warnings, never as errors.

use crate::extract::{infer_category, parse_category, Extraction, ExtractionWarning};
use crate::testspec::{Assertion, AssertionKind, Category, TestScenario, TestSpec, TestStep};
use crate::util::{to_pascal_case, to_snake_case};
use regex::Regex;
use std::sync::LazyLock;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^--\s*Entity:\s*(\w+)\s*\|\s*Schema:\s*(\w+)").expect("valid pattern")
});
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^--\s*Scenario:\s*(\S+)\s*\|\s*category:\s*(\w+)(?:\s*\|\s*action:\s*(\S+))?")
        .expect("valid pattern")
});
static HAS_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"has_table\(\s*'(\w+)'(?:::name)?\s*,\s*'(\w+)'").expect("valid pattern")
});
static COL_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(col_is_pk|col_is_unique|has_column|col_type_is)\(\s*'(\w+)'\s*,\s*'(\w+)'\s*,\s*'(\w+)'")
        .expect("valid pattern")
});
static STATUS_IS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\)\.status\s*,\s*'([^']+)'").expect("valid pattern")
});
static ROUTINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)\.(\w+)\(").expect("valid pattern")
});
static THROWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"throws_ok\(\$\$(.+?)\$\$\s*,\s*'([^']*)'(?:\s*,\s*'([^']*)')?")
        .expect("valid pattern")
});
static LIVES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"lives_ok\(\$\$(.+?)\$\$(?:\s*,\s*'([^']*)')?").expect("valid pattern")
});
static ISNT_EMPTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"isnt_empty\(\$\$.*?FROM\s+(?:\w+\.)?(\w+)").expect("valid pattern")
});
static TB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\.tb_(\w+)").expect("valid pattern"));
static TAP_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SELECT\s+(\w+)\(").expect("valid pattern"));

const KNOWN_TAP: &[&str] = &[
    "plan", "finish", "has_table", "has_column", "col_is_pk", "col_is_unique", "col_type_is",
    "is", "isnt", "isnt_empty", "lives_ok", "throws_ok", "pass",
];

pub fn extract(source: &str) -> Extraction {
    let mut warnings = Vec::new();
    let (entity, schema) = identify(source, &mut warnings);
    let entity_snake = to_snake_case(&entity);

    let markers: Vec<(usize, regex::Captures)> = MARKER
        .captures_iter(source)
        .map(|c| (c.get(0).map(|m| m.start()).unwrap_or(0), c))
        .collect();

    let scenarios = if markers.is_empty() {
        recover_unmarked(source, &entity_snake, &mut warnings)
    } else {
        let mut scenarios = Vec::new();
        for (i, (start, caps)) in markers.iter().enumerate() {
            let end = markers
                .get(i + 1)
                .map(|(s, _)| *s)
                .unwrap_or(source.len());
            let block = &source[*start..end];
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("recovered");
            let category = caps
                .get(2)
                .and_then(|m| parse_category(m.as_str()))
                .unwrap_or_else(|| infer_category(name));
            let action = caps.get(3).map(|m| m.as_str().to_string());
            scenarios.push(parse_block(
                block,
                name,
                category,
                action,
                &entity_snake,
                line_of(source, *start),
                &mut warnings,
            ));
        }
        scenarios
    };

    Extraction {
        spec: TestSpec {
            entity,
            schema,
            scenarios,
        },
        warnings,
    }
}

fn identify(source: &str, warnings: &mut Vec<ExtractionWarning>) -> (String, String) {
    if let Some(caps) = HEADER.captures(source) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    if let Some(caps) = HAS_TABLE.captures(source) {
        let table = caps[2].to_string();
        let bare = table.strip_prefix("tb_").unwrap_or(&table);
        return (to_pascal_case(bare), caps[1].to_string());
    }
    if let Some(caps) = TB.captures(source) {
        return (to_pascal_case(&caps[2]), caps[1].to_string());
    }
    warnings.push(ExtractionWarning {
        line: 1,
        detail: "could not identify entity or schema".to_string(),
    });
    ("Unknown".to_string(), "public".to_string())
}

#[allow(clippy::too_many_arguments)]
fn parse_block(
    block: &str,
    name: &str,
    category: Category,
    action: Option<String>,
    entity_snake: &str,
    first_line: usize,
    warnings: &mut Vec<ExtractionWarning>,
) -> TestScenario {
    let mut scenario = TestScenario {
        category,
        name: name.to_string(),
        description: String::new(),
        action,
        setup: Vec::new(),
        steps: Vec::new(),
        assertions: Vec::new(),
    };

    for (offset, line) in block.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if let Some(w) = classify_line(line, entity_snake, &mut scenario, || ExtractionWarning {
            line: first_line + offset,
            detail: format!("unrecognized construct: {}", line),
        }) {
            warnings.push(w);
        }
    }

    if scenario.action.is_none() && scenario.category == Category::Action {
        scenario.action = recover_action_name(block, entity_snake);
    }
    scenario
}

/// Map one statement to an assertion or step; returns a warning for
/// test-looking lines that match nothing
fn classify_line(
    line: &str,
    entity_snake: &str,
    scenario: &mut TestScenario,
    warn: impl FnOnce() -> ExtractionWarning,
) -> Option<ExtractionWarning> {
    if let Some(caps) = HAS_TABLE.captures(line) {
        scenario.assertions.push(Assertion {
            kind: AssertionKind::Existence,
            target: format!("table:{}", &caps[2]),
            expected: None,
            message: String::new(),
        });
        return None;
    }
    if let Some(caps) = COL_FN.captures(line) {
        let (kind, prefix) = match &caps[1] {
            "col_is_pk" => (AssertionKind::Existence, "pk"),
            "col_is_unique" => (AssertionKind::Existence, "unique"),
            "col_type_is" => (AssertionKind::TypeMatch, "column"),
            _ => (AssertionKind::Existence, "column"),
        };
        scenario.assertions.push(Assertion {
            kind,
            target: format!("{}:{}", prefix, &caps[4]),
            expected: None,
            message: String::new(),
        });
        return None;
    }
    if let Some(caps) = THROWS.captures(line) {
        scenario.steps.push(TestStep {
            description: String::new(),
            operation: caps[1].to_string(),
        });
        scenario.assertions.push(Assertion {
            kind: AssertionKind::ErrorThrown,
            target: "step".to_string(),
            expected: None,
            message: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        });
        return None;
    }
    if let Some(caps) = LIVES.captures(line) {
        scenario.steps.push(TestStep {
            description: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            operation: caps[1].to_string(),
        });
        return None;
    }
    if let Some(caps) = STATUS_IS.captures(line) {
        let expected = caps[1].to_string();
        let kind = if expected.starts_with("failed:") {
            AssertionKind::ErrorThrown
        } else {
            AssertionKind::Equality
        };
        if scenario.action.is_none() {
            scenario.action = recover_action_name(line, entity_snake);
        }
        scenario.assertions.push(Assertion {
            kind,
            target: "status".to_string(),
            expected: Some(expected),
            message: String::new(),
        });
        return None;
    }
    if let Some(caps) = ISNT_EMPTY.captures(line) {
        scenario.assertions.push(Assertion {
            kind: AssertionKind::Existence,
            target: format!("row:{}", &caps[1]),
            expected: None,
            message: String::new(),
        });
        return None;
    }
    if line.starts_with("SELECT isnt(") {
        scenario.assertions.push(Assertion {
            kind: AssertionKind::NonNull,
            target: recover_column_target(line).unwrap_or_else(|| "value".to_string()),
            expected: None,
            message: String::new(),
        });
        return None;
    }
    if line.starts_with("SELECT is(") {
        scenario.assertions.push(Assertion {
            kind: AssertionKind::Equality,
            target: recover_column_target(line).unwrap_or_else(|| "value".to_string()),
            expected: last_quoted(line),
            message: String::new(),
        });
        return None;
    }
    if line.starts_with("INSERT") || line.starts_with("UPDATE") || line.starts_with("DELETE") {
        scenario.setup.push(TestStep {
            description: String::new(),
            operation: line.trim_end_matches(';').to_string(),
        });
        return None;
    }
    if let Some(caps) = TAP_CALL.captures(line) {
        let function = &caps[1];
        if KNOWN_TAP.contains(&function) {
            return None;
        }
        // a bare action invocation is an exercise step
        if ROUTINE.is_match(line) {
            scenario.steps.push(TestStep {
                description: String::new(),
                operation: line.trim_end_matches(';').to_string(),
            });
            return None;
        }
        return Some(warn());
    }
    None
}

static COLUMN_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(SELECT\s+(\w+)\s+FROM").expect("valid pattern"));

fn recover_column_target(line: &str) -> Option<String> {
    COLUMN_SELECT
        .captures(line)
        .map(|caps| format!("column:{}", &caps[1]))
}

fn last_quoted(line: &str) -> Option<String> {
    // second-to-last quoted chunk is the expected value; the last is the
    // message
    let chunks: Vec<&str> = line.split('\'').collect();
    if chunks.len() >= 5 {
        Some(chunks[chunks.len() - 4].to_string())
    } else {
        None
    }
}

fn recover_action_name(text: &str, entity_snake: &str) -> Option<String> {
    let prefix = format!("{}_", entity_snake);
    ROUTINE
        .captures_iter(text)
        .map(|caps| caps[2].to_string())
        .find_map(|name| name.strip_prefix(&prefix).map(|a| a.to_string()))
}

/// No markers: group recognized constructs into per-category scenarios
fn recover_unmarked(
    source: &str,
    entity_snake: &str,
    warnings: &mut Vec<ExtractionWarning>,
) -> Vec<TestScenario> {
    let mut all = TestScenario {
        category: Category::Integration,
        name: "recovered".to_string(),
        description: String::new(),
        action: None,
        setup: Vec::new(),
        steps: Vec::new(),
        assertions: Vec::new(),
    };

    for (i, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if let Some(w) = classify_line(line, entity_snake, &mut all, || ExtractionWarning {
            line: i + 1,
            detail: format!("unrecognized construct: {}", line),
        }) {
            warnings.push(w);
        }
    }

    let mut scenarios = Vec::new();

    let structural: Vec<Assertion> = all
        .assertions
        .iter()
        .filter(|a| {
            a.target.starts_with("table:")
                || a.target.starts_with("pk:")
                || a.target.starts_with("unique:")
                || (a.target.starts_with("column:") && a.kind != AssertionKind::Equality)
        })
        .cloned()
        .collect();
    if !structural.is_empty() {
        scenarios.push(TestScenario {
            category: Category::Structure,
            name: "recovered_structure".to_string(),
            description: String::new(),
            action: None,
            setup: Vec::new(),
            steps: Vec::new(),
            assertions: structural,
        });
    }

    let status: Vec<Assertion> = all
        .assertions
        .iter()
        .filter(|a| a.target == "status")
        .cloned()
        .collect();
    if !status.is_empty() {
        let action = recover_action_name(source, entity_snake);
        let name = action
            .as_deref()
            .map(|a| format!("recovered_{}", a))
            .unwrap_or_else(|| "recovered_action".to_string());
        scenarios.push(TestScenario {
            category: Category::Action,
            name,
            description: String::new(),
            action,
            setup: Vec::new(),
            steps: Vec::new(),
            assertions: status,
        });
    }

    let remaining: Vec<Assertion> = all
        .assertions
        .iter()
        .filter(|a| {
            a.target != "status"
                && !a.target.starts_with("table:")
                && !a.target.starts_with("pk:")
                && !a.target.starts_with("unique:")
                && !(a.target.starts_with("column:") && a.kind != AssertionKind::Equality)
        })
        .cloned()
        .collect();
    if !remaining.is_empty() || !all.steps.is_empty() {
        scenarios.push(TestScenario {
            category: Category::Crud,
            name: "recovered_crud".to_string(),
            description: String::new(),
            action: None,
            setup: all.setup,
            steps: all.steps,
            assertions: remaining,
        });
    }

    scenarios
}

fn line_of(source: &str, byte: usize) -> usize {
    source[..byte].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Entity;
    use crate::testgen::{pgtap, synthesize};
    use crate::validate::validate;

    fn generated() -> String {
        let ir = validate(&[Entity::from_yaml(
            r#"
entity: Contact
schema: crm
fields:
  email: text! unique
  status: enum(lead, customer) = lead
actions:
  - name: promote
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#,
        )
        .unwrap()])
        .unwrap();
        let specs = synthesize(&ir);
        pgtap::render(&specs[0])["tests/pgtap/test_contact.sql"].clone()
    }

    #[test]
    fn generated_file_round_trips_scenario_structure() {
        let sql = generated();
        let extraction = extract(&sql);
        assert_eq!(extraction.spec.entity, "Contact");
        assert_eq!(extraction.spec.schema, "crm");

        let names: Vec<&str> = extraction
            .spec
            .scenarios
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert!(names.contains(&"table_structure"));
        assert!(names.contains(&"promote_happy_path"));
        assert!(names.contains(&"promote_rejects_when_not_a_lead"));

        let happy = extraction
            .spec
            .scenarios
            .iter()
            .find(|s| s.name == "promote_happy_path")
            .unwrap();
        assert_eq!(happy.category, Category::Action);
        assert_eq!(happy.action.as_deref(), Some("promote"));
    }

    #[test]
    fn handwritten_file_without_markers_is_recovered() {
        let sql = r#"
BEGIN;
SELECT plan(3);
SELECT has_table('crm'::name, 'tb_contact'::name, 'table');
SELECT has_column('crm', 'tb_contact', 'email', 'col');
SELECT is((crm.contact_promote('00000000-0000-0000-0000-000000000000'::uuid)).status, 'success', 'works');
SELECT * FROM finish();
ROLLBACK;
"#;
        let extraction = extract(sql);
        assert_eq!(extraction.spec.entity, "Contact");
        let action = extraction
            .spec
            .scenarios
            .iter()
            .find(|s| s.category == Category::Action)
            .unwrap();
        assert_eq!(action.action.as_deref(), Some("promote"));
    }

    #[test]
    fn unknown_constructs_become_warnings_not_errors() {
        let sql = "SELECT plan(1);\nSELECT frobnicate('x');\nSELECT has_table('a','tb_b','t');\n";
        let extraction = extract(sql);
        assert!(!extraction.warnings.is_empty());
        assert!(extraction
            .warnings
            .iter()
            .any(|w| w.detail.contains("frobnicate")));
        // the recognized assertion still came back
        assert_eq!(extraction.spec.scenarios.len(), 1);
    }

    #[test]
    fn garbage_never_fails() {
        let extraction = extract("complete nonsense ωωω");
        assert_eq!(extraction.spec.entity, "Unknown");
        assert!(extraction.spec.scenarios.is_empty());
    }
}
